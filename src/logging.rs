//! Log sink wiring: every action is reported both to the console and to the
//! operator-supplied log file.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize a tracing subscriber writing to stdout and appending to
/// `log_path`.
///
/// The `RUST_LOG` environment variable controls the level filter,
/// defaulting to "info" if not set. The file layer has ANSI styling
/// disabled so the log stays grep-friendly.
pub fn init(log_path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .append(true)
        .open(log_path)
        .with_context(|| format!("failed to open log file '{}'", log_path.display()))?;

    let stdout_layer = fmt::layer().with_target(false).compact();
    let file_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to set global subscriber: {}", e))?;

    Ok(())
}
