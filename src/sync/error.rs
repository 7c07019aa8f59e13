// Error types for the reconciliation engine
// Distinguishes cycle-fatal conditions from per-item recoverable failures

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Main error type for reconciliation.
///
/// `RootMissing` is always fatal to the polling loop. `Io` and `Hash` are
/// contained to a single item when caught at a reconciler action; an instance
/// that escapes the whole cycle is treated as fatal by the supervisor.
#[derive(Debug)]
pub enum SyncError {
    /// A configured root (or the log target) no longer resolves to the
    /// expected kind of filesystem object.
    RootMissing { path: PathBuf, expected: &'static str },

    /// A source-side entry cannot be read; it can never be safely reconciled.
    AccessDenied { path: PathBuf, operation: String },

    /// Content digesting failed mid-read.
    Hash { path: PathBuf, source: io::Error },

    /// A read/write/copy/delete failed.
    Io {
        path: PathBuf,
        operation: String,
        source: io::Error,
    },
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SyncError::RootMissing { path, expected } => {
                write!(f, "path '{}' is missing or is not {}", path.display(), expected)
            }
            SyncError::AccessDenied { path, operation } => {
                write!(f, "permission denied while {} '{}'", operation, path.display())
            }
            SyncError::Hash { path, source } => {
                write!(f, "failed to digest contents of '{}': {}", path.display(), source)
            }
            SyncError::Io { path, operation, source } => {
                write!(f, "I/O error while {} '{}': {}", operation, path.display(), source)
            }
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Hash { source, .. } => Some(source),
            SyncError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl SyncError {
    /// Wrap an `io::Error` with the operation and path it occurred on,
    /// promoting permission failures to `AccessDenied`.
    pub fn from_io(err: io::Error, operation: &str, path: &std::path::Path) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => SyncError::AccessDenied {
                path: path.to_path_buf(),
                operation: operation.to_string(),
            },
            _ => SyncError::Io {
                path: path.to_path_buf(),
                operation: operation.to_string(),
                source: err,
            },
        }
    }
}
