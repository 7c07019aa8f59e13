//! Diff engine: single-level three-way partition of directory children.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::warn;

use super::entry::{is_broken_symlink, DirListing};
use super::error::SyncError;

/// Partition of one directory level's child names.
///
/// `source_only`, `replica_only` and `common` are pairwise disjoint and
/// union to every distinct name seen on either side. `funny` is a subset of
/// that union flagging entries whose kind or accessibility differs or is
/// ambiguous; those require special handling and are never auto-copied.
#[derive(Debug, Default)]
pub struct Partition {
    pub source_only: BTreeSet<String>,
    pub replica_only: BTreeSet<String>,
    pub common: BTreeSet<String>,
    pub funny: BTreeSet<String>,
}

/// Compute the partition for the immediate children of the two directories.
///
/// Enumeration is non-recursive; descent is the reconciler's job. Name
/// comparison is an exact byte-wise match: no case folding, no Unicode
/// normalization. On case-insensitive filesystems the filesystem itself, not
/// this engine, decides collision behavior.
pub fn diff(source_dir: &Path, replica_dir: &Path) -> Result<Partition, SyncError> {
    let source = DirListing::read(source_dir)?;
    let replica = DirListing::read(replica_dir)?;

    let mut partition = Partition::default();

    let all_names: BTreeSet<String> = source.names().union(&replica.names()).cloned().collect();

    for name in all_names {
        let on_source = source.entries.contains_key(&name) || source.unreadable.contains(&name);
        let on_replica = replica.entries.contains_key(&name) || replica.unreadable.contains(&name);

        match (on_source, on_replica) {
            (true, false) => {
                // An unreadable source entry can never be safely reconciled;
                // escalate for the operator rather than guessing.
                if source.unreadable.contains(&name) {
                    warn!(
                        "source entry '{}' is unreadable and requires manual intervention",
                        source_dir.join(&name).display()
                    );
                    partition.funny.insert(name.clone());
                }
                partition.source_only.insert(name);
            }
            (false, true) => {
                partition.replica_only.insert(name);
            }
            (true, true) => {
                let src_entry = source.entries.get(&name);
                let rep_entry = replica.entries.get(&name);

                let ambiguous = match (src_entry, rep_entry) {
                    (Some(s), Some(r)) => {
                        s.kind != r.kind
                            || is_broken_symlink(&source_dir.join(&name), s.kind)
                            || is_broken_symlink(&replica_dir.join(&name), r.kind)
                    }
                    // Either side failed the access check.
                    _ => true,
                };

                if ambiguous {
                    if source.unreadable.contains(&name) {
                        warn!(
                            "source entry '{}' is unreadable and requires manual intervention",
                            source_dir.join(&name).display()
                        );
                    }
                    partition.funny.insert(name.clone());
                }
                partition.common.insert(name);
            }
            (false, false) => unreachable!("name came from one of the two listings"),
        }
    }

    Ok(partition)
}
