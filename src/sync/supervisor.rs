//! Polling supervisor: owns the interval timer and cancellation.
//!
//! One logical worker runs each diff+apply pass to completion before
//! sleeping; passes never overlap. The cancellation flag is observed at the
//! top of each iteration and again before sleeping, so the loop exits
//! between passes, never in the middle of one.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::engine::{CycleOutcome, SyncCycle};
use super::error::SyncError;

/// Externally-settable stop signal shared with the supervisor.
///
/// The supervisor's only contract with its setter is "observe a boolean at
/// defined points"; how the flag gets set (console reader, test harness,
/// signal handler) is not its concern.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives repeated reconciliation passes until cancelled or a fatal
/// condition occurs.
pub struct Supervisor {
    source_root: PathBuf,
    replica_root: PathBuf,
    log_path: PathBuf,
    interval: Duration,
    cancel: CancelFlag,
}

impl Supervisor {
    pub fn new(
        source_root: &Path,
        replica_root: &Path,
        log_path: &Path,
        interval: Duration,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            source_root: source_root.to_path_buf(),
            replica_root: replica_root.to_path_buf(),
            log_path: log_path.to_path_buf(),
            interval,
            cancel,
        }
    }

    /// Run the polling loop.
    ///
    /// Returns `Ok(())` on cancellation. Any error escaping a reconciliation
    /// pass is not locally recoverable: it is logged and returned rather
    /// than silently retried next cycle, so a persistent misconfiguration
    /// can never hide behind blind retries.
    pub async fn run(&self) -> Result<(), SyncError> {
        info!(
            "supervising '{}' -> '{}' every {}s",
            self.source_root.display(),
            self.replica_root.display(),
            self.interval.as_secs()
        );

        loop {
            if self.cancel.is_cancelled() {
                info!("cancellation requested; stopping synchronization");
                return Ok(());
            }

            if let Err(e) = self.check_roots() {
                error!("{}", e);
                return Err(e);
            }

            let cycle = SyncCycle::new(&self.source_root, &self.replica_root);
            match cycle.run() {
                Ok(stats) => match stats.outcome() {
                    CycleOutcome::Success if stats.actions() > 0 => {
                        info!(
                            "pass complete: {} deleted, {} created, {} replaced",
                            stats.deleted, stats.copied, stats.replaced
                        );
                    }
                    CycleOutcome::Success => {}
                    CycleOutcome::PartialFailure => {
                        warn!(
                            "pass completed with {} contained failure(s); affected items will be retried next cycle",
                            stats.item_failures
                        );
                    }
                },
                Err(e) => {
                    error!("reconciliation pass failed: {}", e);
                    return Err(e);
                }
            }

            if self.cancel.is_cancelled() {
                info!("cancellation requested; stopping synchronization");
                return Ok(());
            }

            tokio::time::sleep(self.interval).await;
        }
    }

    /// The externally-supplied paths must still resolve to the right kinds
    /// of objects at the start of every cycle.
    fn check_roots(&self) -> Result<(), SyncError> {
        if !self.source_root.is_dir() {
            return Err(SyncError::RootMissing {
                path: self.source_root.clone(),
                expected: "a directory",
            });
        }
        if !self.replica_root.is_dir() {
            return Err(SyncError::RootMissing {
                path: self.replica_root.clone(),
                expected: "a directory",
            });
        }
        if !self.log_path.is_file() {
            return Err(SyncError::RootMissing {
                path: self.log_path.clone(),
                expected: "a file",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_visible_across_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }
}
