//! Error types for the checksum crate

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while fingerprinting a path
#[derive(Error, Debug)]
pub enum Error {
    /// Path does not exist
    #[error("path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    /// Failed to read a file or its metadata
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory traversal failed
    #[error("failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// Checksum method name not recognised
    #[error("unknown checksum method: {0}")]
    UnknownMethod(String),
}

/// Result type for checksum operations
pub type Result<T> = std::result::Result<T, Error>;
