//! Terminal rendering of pipeline events.

pub mod icons;
mod run_progress;

pub use run_progress::{RunUi, UiMode};
