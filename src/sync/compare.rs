//! Content comparator for same-named file pairs.
//!
//! Equality checks run cheap-to-expensive and short-circuit: permission
//! bits, then size, then a full BLAKE3 content digest. Digesting is only
//! reached when the metadata already matches.

use std::fs;
use std::io::Read;
use std::path::Path;

use tracing::warn;

use super::entry::stat_entry;
use super::error::SyncError;

/// Files above this size are read whole and hashed across cores.
const PARALLEL_HASH_THRESHOLD: u64 = 1024 * 1024;

fn hash_err(path: &Path) -> impl FnOnce(std::io::Error) -> SyncError + '_ {
    move |e| SyncError::Hash {
        path: path.to_path_buf(),
        source: e,
    }
}

/// Hash a file's full contents with BLAKE3.
pub fn hash_file(path: &Path) -> Result<blake3::Hash, SyncError> {
    let file = fs::File::open(path).map_err(hash_err(path))?;
    let size = file.metadata().map_err(hash_err(path))?.len();

    let mut hasher = blake3::Hasher::new();

    if size > PARALLEL_HASH_THRESHOLD {
        let data = fs::read(path).map_err(hash_err(path))?;
        hasher.update_rayon(&data);
        return Ok(hasher.finalize());
    }

    let mut file = file;
    let mut buffer = [0u8; 65536]; // 64KB buffer
    loop {
        let bytes_read = file.read(&mut buffer).map_err(hash_err(path))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}

/// Decide whether a source file and its replica counterpart are equal.
///
/// Both paths must already be known to exist and be regular files. A
/// permission drift alone forces not-equal: metadata consistency is treated
/// as a correctness requirement, not cosmetic. Digest collisions count as
/// equality.
pub fn files_equal(source: &Path, replica: &Path) -> Result<bool, SyncError> {
    let src_entry = stat_entry(source)?;
    let rep_entry = stat_entry(replica)?;

    if src_entry.mode != rep_entry.mode {
        warn!(
            "permissions differ for '{}' (source {:o}, replica {:o})",
            source.display(),
            src_entry.mode,
            rep_entry.mode
        );
        return Ok(false);
    }

    if src_entry.size != rep_entry.size {
        return Ok(false);
    }

    Ok(hash_file(source)? == hash_file(replica)?)
}
