//! Command-line argument parsing and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

/// Synchronization of folders: keep a replica in one-way agreement with a
/// source directory tree.
#[derive(Parser, Debug)]
#[command(name = "replisync", version, about)]
pub struct Args {
    /// Source folder path
    #[arg(long, value_name = "DIR")]
    pub source_path: PathBuf,

    /// Replica folder path
    #[arg(long, value_name = "DIR")]
    pub replica_path: PathBuf,

    /// Log file path (must already exist)
    #[arg(long, value_name = "FILE")]
    pub logfile_path: PathBuf,

    /// Synchronization interval in seconds
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..=10))]
    pub sync_interval: u64,
}

/// Validated configuration handed to the supervisor.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub source_root: PathBuf,
    pub replica_root: PathBuf,
    pub log_path: PathBuf,
    pub interval: Duration,
}

impl Args {
    /// Resolve and validate all paths into absolute, correctly-typed handles.
    pub fn validate(self) -> Result<SyncSettings> {
        let source_root = resolve_dir(&self.source_path, "source")?;
        let replica_root = resolve_dir(&self.replica_path, "replica")?;
        let log_path = resolve_file(&self.logfile_path, "log")?;

        if source_root == replica_root {
            bail!("source and replica must be different directories");
        }

        Ok(SyncSettings {
            source_root,
            replica_root,
            log_path,
            interval: Duration::from_secs(self.sync_interval),
        })
    }
}

fn resolve_dir(path: &Path, role: &str) -> Result<PathBuf> {
    let abs = path
        .canonicalize()
        .with_context(|| format!("{} path '{}' does not exist", role, path.display()))?;
    if !abs.is_dir() {
        bail!("{} path '{}' is not a directory", role, abs.display());
    }
    Ok(abs)
}

fn resolve_file(path: &Path, role: &str) -> Result<PathBuf> {
    let abs = path
        .canonicalize()
        .with_context(|| format!("{} path '{}' does not exist", role, path.display()))?;
    if !abs.is_file() {
        bail!("{} path '{}' is not a file", role, abs.display());
    }
    Ok(abs)
}
