//! Error types for reading the attendance file.

use std::path::PathBuf;

use thiserror::Error;

/// Failures at the input boundary. Field-level problems are never errors;
/// they coerce to defaults inside the parser.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The resolved input file does not exist
    #[error("attendance file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The file exists but could not be read
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Neither the primary nor the fallback encoding could decode the bytes
    #[error("input is not valid text in any of: {tried}")]
    Decode { tried: String },

    /// Unknown encoding label in configuration
    #[error("unknown encoding label: {label}")]
    UnknownEncoding { label: String },

    /// The CSV reader failed on the header row or on the underlying reader
    #[error("failed to read CSV input")]
    Csv(#[from] csv::Error),
}
