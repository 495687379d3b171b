//! Segment store error types
//!
//! Error codes:
//! - SHARD_STORE_IO_ERROR (ERROR severity)
//! - SHARD_STORE_CORRUPTED (FATAL severity)
//! - SHARD_STORE_INVALID_COMMIT (FATAL severity)
//! - SHARD_STORE_CLOSED (ERROR severity)

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::errors::Severity;

/// Segment store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem access to the store directory failed
    #[error("store I/O failure on {}: {message}", path.display())]
    Io {
        path: PathBuf,
        message: String,
        #[source]
        source: io::Error,
    },

    /// A corruption marker is present in the store
    #[error("store is corrupted: {reason} (marker: {marker})")]
    Corrupted { marker: String, reason: String },

    /// The last commit point could not be decoded
    #[error("invalid commit point {file}: {reason}")]
    InvalidCommit { file: String, reason: String },

    /// The store has been closed and can no longer be referenced
    #[error("store at {} is closed", path.display())]
    Closed { path: PathBuf },
}

impl StoreError {
    /// Create an I/O error with context
    pub fn io(path: impl Into<PathBuf>, message: impl Into<String>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            message: message.into(),
            source,
        }
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Io { .. } => "SHARD_STORE_IO_ERROR",
            StoreError::Corrupted { .. } => "SHARD_STORE_CORRUPTED",
            StoreError::InvalidCommit { .. } => "SHARD_STORE_INVALID_COMMIT",
            StoreError::Closed { .. } => "SHARD_STORE_CLOSED",
        }
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        match self {
            StoreError::Io { .. } | StoreError::Closed { .. } => Severity::Error,
            StoreError::Corrupted { .. } | StoreError::InvalidCommit { .. } => Severity::Fatal,
        }
    }

    /// Returns whether this error means the on-disk data cannot be trusted
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StoreError::Corrupted { .. } | StoreError::InvalidCommit { .. }
        )
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corruption_is_fatal() {
        let err = StoreError::Corrupted {
            marker: "corrupted_1".into(),
            reason: "checksum failed".into(),
        };
        assert!(err.is_fatal());
        assert!(err.is_corruption());
        assert_eq!(err.code(), "SHARD_STORE_CORRUPTED");
    }

    #[test]
    fn test_io_error_keeps_source() {
        let err = StoreError::io(
            "/tmp/x",
            "listing failed",
            io::Error::new(io::ErrorKind::Other, "disk gone"),
        );
        assert!(!err.is_fatal());
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("listing failed"));
    }
}
