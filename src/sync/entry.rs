//! Filesystem entry model.
//!
//! Entries are stat snapshots taken fresh every poll cycle; there is no
//! persistent identity beyond the path they were read from.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use super::error::SyncError;

/// Kind of filesystem object, as seen without following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    /// Fifos, sockets, devices. No safe copy primitive exists for these.
    Other,
}

impl EntryKind {
    fn from_file_type(ft: fs::FileType) -> Self {
        if ft.is_file() {
            EntryKind::File
        } else if ft.is_dir() {
            EntryKind::Dir
        } else if ft.is_symlink() {
            EntryKind::Symlink
        } else {
            EntryKind::Other
        }
    }
}

/// A named filesystem object directly under some directory.
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub kind: EntryKind,
    /// Byte size; meaningful for files only.
    pub size: u64,
    /// Unix permission bits, masked to the rwx/setuid range.
    pub mode: u32,
}

/// Stat a single path into an `Entry`, without following symlinks.
pub fn stat_entry(path: &Path) -> Result<Entry, SyncError> {
    let meta = fs::symlink_metadata(path)
        .map_err(|e| SyncError::from_io(e, "reading metadata of", path))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(Entry {
        name,
        kind: EntryKind::from_file_type(meta.file_type()),
        size: meta.len(),
        mode: meta.permissions().mode() & 0o7777,
    })
}

/// A symlink whose target cannot be resolved.
pub fn is_broken_symlink(path: &Path, kind: EntryKind) -> bool {
    kind == EntryKind::Symlink && fs::metadata(path).is_err()
}

/// One directory level's children, enumerated non-recursively.
#[derive(Debug, Default)]
pub struct DirListing {
    /// Successfully stat-ed children, keyed by name.
    pub entries: BTreeMap<String, Entry>,
    /// Children whose metadata could not be read.
    pub unreadable: BTreeSet<String>,
}

impl DirListing {
    /// Enumerate the immediate children of `dir`.
    ///
    /// A failure to read the directory itself propagates; a failure to stat
    /// an individual child lands that name in `unreadable` instead.
    pub fn read(dir: &Path) -> Result<Self, SyncError> {
        let mut listing = DirListing::default();

        let iter = fs::read_dir(dir).map_err(|e| SyncError::from_io(e, "listing", dir))?;
        for dirent in iter {
            let dirent = dirent.map_err(|e| SyncError::from_io(e, "listing", dir))?;
            let name = dirent.file_name().to_string_lossy().into_owned();
            match stat_entry(&dirent.path()) {
                Ok(entry) => {
                    listing.entries.insert(name, entry);
                }
                Err(_) => {
                    listing.unreadable.insert(name);
                }
            }
        }

        Ok(listing)
    }

    /// All names seen at this level, readable or not.
    pub fn names(&self) -> BTreeSet<String> {
        self.entries
            .keys()
            .chain(self.unreadable.iter())
            .cloned()
            .collect()
    }
}
