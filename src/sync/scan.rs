//! Tree sizer: a cheap divergence signal for directory subtrees.

use std::fs;
use std::path::Path;

use super::entry::DirListing;
use super::error::SyncError;

/// Recursive byte total of all regular files under `path`.
///
/// Symlinks are never followed: symlinked subtrees are not descended into,
/// to avoid cycles and double-counting.
pub fn tree_size(path: &Path) -> Result<u64, SyncError> {
    let mut total = 0u64;

    let iter = fs::read_dir(path).map_err(|e| SyncError::from_io(e, "listing", path))?;
    for dirent in iter {
        let dirent = dirent.map_err(|e| SyncError::from_io(e, "listing", path))?;
        let child = dirent.path();
        let meta = fs::symlink_metadata(&child)
            .map_err(|e| SyncError::from_io(e, "reading metadata of", &child))?;

        let ft = meta.file_type();
        if ft.is_file() {
            total += meta.len();
        } else if ft.is_dir() {
            total += tree_size(&child)?;
        }
    }

    Ok(total)
}

/// Fast pre-check for a pair of corresponding directories.
///
/// Declares the subtree divergent when the immediate child-name sets differ
/// or the recursive byte totals differ. An optimization only; a divergent
/// verdict still ends in a full recursive recopy, never a partial one.
pub fn subtree_diverged(source: &Path, replica: &Path) -> Result<bool, SyncError> {
    let src_names = DirListing::read(source)?.names();
    let rep_names = DirListing::read(replica)?.names();
    if src_names != rep_names {
        return Ok(true);
    }

    Ok(tree_size(source)? != tree_size(replica)?)
}
