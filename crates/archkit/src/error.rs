//! Error types for archiving runs
//!
//! Configuration, missing-source and store errors abort a run. Errors
//! raised while staging or compressing one target only fail that target.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for archkit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving or archiving targets
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value is missing or invalid
    #[error("[{section}]{key}: {message}")]
    Config {
        /// Configuration section, e.g. `arch:logs`
        section: String,
        /// Key within the section
        key: String,
        /// What is wrong with the value
        message: String,
    },

    /// The configuration file is not valid TOML
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A declared source disappeared before it could be fingerprinted
    #[error("source does not exist: {}", .0.display())]
    NotFound(PathBuf),

    /// Fingerprinting failed
    #[error("checksum failed: {0}")]
    Checksum(checksum::Error),

    /// The persisted store could not be read or written
    #[error("store error: {0}")]
    Store(#[from] ledger::Error),

    /// A compression scheme handler failed
    #[error("compression scheme {scheme} failed: {message}")]
    Compression {
        /// Scheme name
        scheme: String,
        /// Failure details, usually the tool's stderr
        message: String,
    },

    /// Filesystem error while staging
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        /// Path involved in the error
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Parallel worker pool could not be created
    #[error("failed to create thread pool: {0}")]
    ThreadPool(String),
}

impl Error {
    /// Build a configuration error
    pub fn config(section: &str, key: &str, message: impl Into<String>) -> Self {
        Self::Config {
            section: section.to_string(),
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Build an IO error for a path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error must abort the whole run
    ///
    /// Non-fatal errors mark the affected target as failed and the run
    /// carries on with its siblings.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Compression { .. } | Self::Io { .. })
    }
}

impl From<checksum::Error> for Error {
    fn from(err: checksum::Error) -> Self {
        match err {
            checksum::Error::NotFound(path) => Self::NotFound(path),
            other => Self::Checksum(other),
        }
    }
}
