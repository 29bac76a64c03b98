//! Error types for recsched-cache

use thiserror::Error;

use crate::git::GitError;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Cache error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Relational store failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Git driver failure.
    #[error(transparent)]
    Git(#[from] GitError),

    /// I/O failure (database file management, blob compression).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot payload problems surfaced by the core layer.
    #[error(transparent)]
    Core(#[from] recsched_core::Error),

    /// The database was written by an incompatible schema version. Fatal
    /// unless the caller reopens with `reset`.
    #[error("unsupported schema version {found} (wanted {wanted})")]
    UnsupportedSchema { found: i64, wanted: i64 },

    /// A commit was skipped during import: duplicate payload, missing
    /// required file, or no usable dates. The import loop continues.
    #[error("skipped: {0}")]
    Skip(String),
}

impl Error {
    /// Create a skip error
    pub fn skip(msg: impl Into<String>) -> Self {
        Error::Skip(msg.into())
    }

    /// True for failures the import loop steps over.
    pub fn is_skip(&self) -> bool {
        matches!(self, Error::Skip(_) | Error::Git(GitError::NotFound(_)))
    }
}
