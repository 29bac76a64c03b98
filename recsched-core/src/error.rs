//! Error types shared across the recsched crates.

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Workspace-wide error taxonomy.
///
/// Variants map to how the failure is handled at the edge: validation and
/// not-found surface as client errors, cancellation produces no response
/// write, storage problems are retryable server errors, and consistency
/// faults indicate a broken internal invariant.
#[derive(Error, Debug)]
pub enum Error {
    /// Ill-formed input from a caller (bad spec string, out-of-range limit,
    /// unknown format).
    #[error("invalid: {0}")]
    Validation(String),

    /// The referenced row or blob does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation was cancelled cooperatively.
    #[error("cancelled")]
    Cancelled,

    /// The durable store was created by an incompatible schema version.
    #[error("unsupported schema version {found} (wanted {wanted})")]
    UnsupportedSchema { found: i64, wanted: i64 },

    /// Transient storage failure (I/O, lock contention exhaustion).
    #[error("storage error: {0}")]
    Storage(String),

    /// An internal invariant was violated; unrecoverable for the operation.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// A commit was skipped during ingest (duplicate, missing file, or no
    /// usable dates). The import loop continues past these.
    #[error("ingest skip: {0}")]
    IngestSkip(String),

    /// Snapshot payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Create a consistency error
    pub fn consistency(msg: impl Into<String>) -> Self {
        Error::Consistency(msg.into())
    }

    /// Create an ingest-skip error
    pub fn ingest_skip(msg: impl Into<String>) -> Self {
        Error::IngestSkip(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Error::Decode(msg.into())
    }

    /// True for failures the import loop may step over.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Error::IngestSkip(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
