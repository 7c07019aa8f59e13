//! One-way reconciliation engine.
//!
//! Keeps a replica directory tree in agreement with a source tree: diffs a
//! directory level into source-only/replica-only/common/funny names, replays
//! the differences onto the replica, and repeats on a fixed poll interval.

pub mod compare;
pub mod diff;
pub mod engine;
pub mod entry;
pub mod error;
pub mod scan;
pub mod supervisor;

pub use compare::{files_equal, hash_file};
pub use diff::{diff, Partition};
pub use engine::{CycleOutcome, CycleStats, SyncCycle};
pub use entry::{Entry, EntryKind};
pub use error::SyncError;
pub use scan::{subtree_diverged, tree_size};
pub use supervisor::{CancelFlag, Supervisor};
