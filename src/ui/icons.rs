//! Shared UI icons, with plain-text fallbacks for terminals without emoji.

use console::Emoji;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR] ");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "* ");
pub static BLOCKER: Emoji<'_, '_> = Emoji("🚧 ", "[BLOCK] ");
pub static WAVE: Emoji<'_, '_> = Emoji("🌊 ", "[W] ");
pub static HAND: Emoji<'_, '_> = Emoji("✋ ", "[?] ");
pub static FLAG: Emoji<'_, '_> = Emoji("🏁 ", "[DONE] ");
