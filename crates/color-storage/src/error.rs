//! Storage errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by [`DurableLog`](crate::DurableLog).
#[derive(Error, Debug)]
pub enum StorageError {
    /// `append` was called before any destination was configured.
    #[error("Log destination not configured")]
    NotConfigured,

    /// Opening or creating the log file failed.
    #[error("Failed to open log file '{}': {source}", path.display())]
    Open {
        /// Log file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Writing or flushing a row failed.
    #[error("Failed to write log file '{}': {source}", path.display())]
    Write {
        /// Log file path
        path: PathBuf,
        /// Underlying CSV error
        #[source]
        source: csv::Error,
    },
}

impl StorageError {
    pub(crate) fn write(path: &std::path::Path, source: impl Into<csv::Error>) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            source: source.into(),
        }
    }
}
