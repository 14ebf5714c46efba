//! Tracing subscriber setup.
//!
//! - `FOUNDRY_LOG` overrides the filter (`EnvFilter` syntax)
//! - `FOUNDRY_LOG_FORMAT=json` switches stderr output to JSON lines
//! - When a log directory is given, a daily rolling plain-text file is
//!   written there as well

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when `FOUNDRY_LOG` is unset.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "foundry=debug" } else { "foundry=info" }
}

fn wants_json(value: Option<String>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("json"))
}

/// Install the global subscriber. The returned guard flushes the log file on
/// drop and must be held for the life of the process.
pub fn init(verbose: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_env("FOUNDRY_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
    let json = wants_json(std::env::var("FOUNDRY_LOG_FORMAT").ok());

    let console = (!json).then(|| {
        fmt::layer()
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
    });
    let console_json = json.then(|| fmt::layer().json().with_writer(std::io::stderr));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = Builder::new()
                .rotation(Rotation::DAILY)
                .filename_prefix("foundry")
                .filename_suffix("log")
                .build(dir)
                .context("Failed to create log file appender")?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // A second init (tests, embedding) keeps the first subscriber.
    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(console_json)
        .with(file_layer)
        .try_init()
        .ok();

    Ok(guard)
}
