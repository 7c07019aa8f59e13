//! Reconciler: applies a directory partition onto the replica.
//!
//! The only mutation primitive is delete-then-recopy; nothing is ever
//! patched in place. Per directory level the order is fixed: delete extra
//! replica entries, create source-only entries, then re-verify common
//! entries (recursing into directories). Each individual action is wrapped
//! so that one locked or vanished item never stalls the rest of the level.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::compare::files_equal;
use super::diff::{diff, Partition};
use super::entry::{stat_entry, EntryKind};
use super::error::SyncError;
use super::scan::subtree_diverged;

/// Counters accumulated over one poll cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleStats {
    /// Entries removed from the replica.
    pub deleted: usize,
    /// Entries newly copied into the replica.
    pub copied: usize,
    /// Common entries refreshed by delete-then-recopy.
    pub replaced: usize,
    /// Entries left for manual synchronization.
    pub skipped_funny: usize,
    /// Individual actions that failed and were contained.
    pub item_failures: usize,
}

impl CycleStats {
    /// Total number of mutations performed this cycle.
    pub fn actions(&self) -> usize {
        self.deleted + self.copied + self.replaced
    }

    pub fn outcome(&self) -> CycleOutcome {
        if self.item_failures > 0 {
            CycleOutcome::PartialFailure
        } else {
            CycleOutcome::Success
        }
    }
}

/// How a completed cycle ended. A fatal failure never produces stats; it
/// surfaces as the `Err` arm of [`SyncCycle::run`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Success,
    PartialFailure,
}

/// Transient context for a single diff+apply pass over the full tree.
///
/// Created at the start of each poll and discarded at the end; no state is
/// carried across cycles. Every cycle re-derives the full diff from scratch.
pub struct SyncCycle {
    source_root: PathBuf,
    replica_root: PathBuf,
    stats: CycleStats,
}

impl SyncCycle {
    pub fn new(source_root: &Path, replica_root: &Path) -> Self {
        Self {
            source_root: source_root.to_path_buf(),
            replica_root: replica_root.to_path_buf(),
            stats: CycleStats::default(),
        }
    }

    /// Run the full depth-first reconciliation pass.
    ///
    /// Per-item failures are contained and counted; any error returned here
    /// escaped the whole pass and is fatal to the caller's loop.
    pub fn run(mut self) -> Result<CycleStats, SyncError> {
        let source = self.source_root.clone();
        let replica = self.replica_root.clone();
        self.reconcile_dir(&source, &replica)?;
        Ok(self.stats)
    }

    /// Reconcile one directory level, recursing into common subdirectories.
    fn reconcile_dir(&mut self, source_dir: &Path, replica_dir: &Path) -> Result<(), SyncError> {
        let partition = diff(source_dir, replica_dir)?;
        self.delete_phase(&partition, replica_dir);
        self.create_phase(&partition, source_dir, replica_dir);
        self.verify_phase(&partition, source_dir, replica_dir)
    }

    /// Remove every replica-only entry.
    fn delete_phase(&mut self, partition: &Partition, replica_dir: &Path) {
        for name in &partition.replica_only {
            let target = replica_dir.join(name);
            match remove_entry(&target) {
                Ok(()) => {
                    info!("'{}' was deleted from replica", target.display());
                    self.stats.deleted += 1;
                }
                Err(e) => self.contain(e),
            }
        }
    }

    /// Copy every source-only entry that is not funny.
    fn create_phase(&mut self, partition: &Partition, source_dir: &Path, replica_dir: &Path) {
        for name in &partition.source_only {
            if partition.funny.contains(name) {
                self.manual_sync(&source_dir.join(name));
                continue;
            }

            let src = source_dir.join(name);
            let dst = replica_dir.join(name);
            match copy_entry(&src, &dst) {
                Ok(()) => {
                    info!("'{}' was created in replica", dst.display());
                    self.stats.copied += 1;
                }
                Err(e) => self.contain(e),
            }
        }
    }

    /// Re-validate every common entry; recurse into directories.
    fn verify_phase(
        &mut self,
        partition: &Partition,
        source_dir: &Path,
        replica_dir: &Path,
    ) -> Result<(), SyncError> {
        for name in &partition.common {
            let src = source_dir.join(name);
            let dst = replica_dir.join(name);

            // Ambiguous entries are never auto-copied: the replica side is
            // discarded and the operator is told to resolve the source.
            if partition.funny.contains(name) {
                self.manual_sync(&src);
                self.discard_replica(&dst);
                continue;
            }

            let kind = match stat_entry(&src) {
                Ok(entry) => entry.kind,
                Err(e) => {
                    // Vanished or became unreadable since the diff.
                    self.contain(e);
                    continue;
                }
            };

            match kind {
                EntryKind::File => match files_equal(&src, &dst) {
                    Ok(true) => {}
                    Ok(false) => self.replace(&src, &dst),
                    Err(e @ SyncError::Hash { .. }) => {
                        // A digest failure means the entry cannot be proven
                        // equal; escalate it down the funny path so the
                        // replica side is discarded rather than kept stale.
                        warn!("{}", e);
                        self.manual_sync(&src);
                        self.discard_replica(&dst);
                    }
                    Err(e) => self.contain(e),
                },
                EntryKind::Symlink => match links_equal(&src, &dst) {
                    Ok(true) => {}
                    Ok(false) => self.replace(&src, &dst),
                    Err(e) => self.contain(e),
                },
                EntryKind::Dir => {
                    self.reconcile_dir(&src, &dst)?;

                    // Belt-and-suspenders: a subtree that still diverges
                    // after the per-child pass is replaced wholesale.
                    match subtree_diverged(&src, &dst) {
                        Ok(true) => {
                            warn!(
                                "subtree '{}' still diverges from source; replacing it entirely",
                                dst.display()
                            );
                            self.replace(&src, &dst);
                        }
                        Ok(false) => {}
                        Err(e) => self.contain(e),
                    }
                }
                EntryKind::Other => {
                    self.manual_sync(&src);
                }
            }
        }

        Ok(())
    }

    /// Delete-then-recopy a replica entry from its source counterpart.
    fn replace(&mut self, src: &Path, dst: &Path) {
        let result = remove_entry(dst).and_then(|()| copy_entry(src, dst));
        match result {
            Ok(()) => {
                info!("'{}' was replaced from source", dst.display());
                self.stats.replaced += 1;
            }
            Err(e) => self.contain(e),
        }
    }

    /// Discard the replica side of an entry that cannot be safely
    /// reconciled; the next cycle recopies it if the source becomes
    /// readable.
    fn discard_replica(&mut self, dst: &Path) {
        match remove_entry(dst) {
            Ok(()) => {
                info!("'{}' was deleted from replica", dst.display());
                self.stats.deleted += 1;
            }
            Err(e) => self.contain(e),
        }
    }

    fn manual_sync(&mut self, path: &Path) {
        warn!(
            "'{}' requires manual synchronization [check permissions, file corruption or symbolic links]",
            path.display()
        );
        self.stats.skipped_funny += 1;
    }

    /// Log a per-item failure and keep going with the rest of the level.
    fn contain(&mut self, err: SyncError) {
        warn!("{}", err);
        self.stats.item_failures += 1;
    }
}

/// Remove a replica entry of any kind. Symlinks are unlinked themselves,
/// never their targets.
fn remove_entry(path: &Path) -> Result<(), SyncError> {
    let meta = fs::symlink_metadata(path)
        .map_err(|e| SyncError::from_io(e, "reading metadata of", path))?;

    if meta.file_type().is_dir() {
        fs::remove_dir_all(path).map_err(|e| SyncError::from_io(e, "removing directory", path))
    } else {
        fs::remove_file(path).map_err(|e| SyncError::from_io(e, "removing", path))
    }
}

/// Copy a source entry into the replica, dispatching on its kind.
fn copy_entry(src: &Path, dst: &Path) -> Result<(), SyncError> {
    let entry = stat_entry(src)?;
    match entry.kind {
        EntryKind::File => copy_file(src, dst),
        EntryKind::Dir => copy_dir(src, dst),
        EntryKind::Symlink => copy_symlink(src, dst),
        EntryKind::Other => Err(SyncError::Io {
            path: src.to_path_buf(),
            operation: "copying".to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "special file has no copy primitive",
            ),
        }),
    }
}

/// Copy a regular file together with its permission bits.
fn copy_file(src: &Path, dst: &Path) -> Result<(), SyncError> {
    fs::copy(src, dst)
        .map(|_| ())
        .map_err(|e| SyncError::from_io(e, "copying", src))
}

/// Recreate a symlink as a link; the target path is copied verbatim.
fn copy_symlink(src: &Path, dst: &Path) -> Result<(), SyncError> {
    let target = fs::read_link(src).map_err(|e| SyncError::from_io(e, "reading link", src))?;
    std::os::unix::fs::symlink(&target, dst)
        .map_err(|e| SyncError::from_io(e, "creating link", dst))
}

/// Copy a whole directory subtree in one step.
///
/// The destination must not already exist; one that does at this point is a
/// staleness bug and fails this single item rather than the cycle.
fn copy_dir(src: &Path, dst: &Path) -> Result<(), SyncError> {
    fs::create_dir(dst).map_err(|e| SyncError::from_io(e, "creating directory", dst))?;

    let iter = fs::read_dir(src).map_err(|e| SyncError::from_io(e, "listing", src))?;
    for dirent in iter {
        let dirent = dirent.map_err(|e| SyncError::from_io(e, "listing", src))?;
        let child_src = dirent.path();
        let child_dst = dst.join(dirent.file_name());
        copy_entry(&child_src, &child_dst)?;
    }

    // Directory permission bits come over too.
    let meta = fs::metadata(src).map_err(|e| SyncError::from_io(e, "reading metadata of", src))?;
    fs::set_permissions(dst, meta.permissions())
        .map_err(|e| SyncError::from_io(e, "setting permissions on", dst))?;

    Ok(())
}

/// Compare two symlinks by their target paths.
fn links_equal(src: &Path, dst: &Path) -> Result<bool, SyncError> {
    let src_target = fs::read_link(src).map_err(|e| SyncError::from_io(e, "reading link", src))?;
    let dst_target = fs::read_link(dst).map_err(|e| SyncError::from_io(e, "reading link", dst))?;
    Ok(src_target == dst_target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_copy_dir_rejects_existing_destination() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        fs::create_dir(&dst).unwrap();

        assert!(copy_dir(&src, &dst).is_err());
    }

    #[test]
    fn test_remove_entry_unlinks_symlink_not_target() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target");
        let link = dir.path().join("link");
        fs::write(&target, b"keep me").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        remove_entry(&link).unwrap();
        assert!(!link.exists());
        assert!(target.exists());
    }

    #[test]
    fn test_cycle_stats_outcome() {
        let mut stats = CycleStats::default();
        assert_eq!(stats.outcome(), CycleOutcome::Success);
        stats.item_failures = 1;
        assert_eq!(stats.outcome(), CycleOutcome::PartialFailure);
    }
}
