//! Error types for recsched-export

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Export error type. Both variants are unrecoverable for the export that
/// hit them; callers report upward.
#[derive(Error, Debug)]
pub enum Error {
    /// A list column element contains the list separator and cannot be
    /// represented in CSV.
    #[error("column {column}: list item {value:?} contains a comma")]
    InvalidListItem {
        column: &'static str,
        value: String,
    },

    /// Zip container assembly failed.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// I/O error while writing the bundle.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
