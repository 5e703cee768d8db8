//! Error types for the ledger crate

use thiserror::Error;

/// Errors that can occur while reading or writing the store
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;
