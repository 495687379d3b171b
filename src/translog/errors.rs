//! Translog error types
//!
//! Error codes:
//! - SHARD_TRANSLOG_IO_FAILURE (FATAL severity)
//! - SHARD_TRANSLOG_TRUNCATED (RECOVERABLE severity, end of log)
//! - SHARD_TRANSLOG_CORRUPTION (FATAL severity)
//! - SHARD_TRANSLOG_ALREADY_CLAIMED (ERROR severity)
//! - SHARD_TRANSLOG_OUT_OF_ORDER (ERROR severity)
//! - SHARD_TRANSLOG_CLOSED (ERROR severity)

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::errors::Severity;
use crate::seqno::SeqNo;

/// Translog errors
#[derive(Debug, Error)]
pub enum TranslogError {
    /// Device read/write/fsync failed. The shard must be failed.
    #[error("translog I/O failure on {}: {message}", path.display())]
    Io {
        path: PathBuf,
        message: String,
        #[source]
        source: io::Error,
    },

    /// The tail record was only partially written (crash during append)
    #[error("truncated translog record in {} at offset {offset}: {reason}", path.display())]
    Truncated {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    /// A complete record failed validation
    #[error("corrupted translog {} at offset {offset}: {reason}", path.display())]
    Corrupt {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    /// Another recovery already holds this generation
    #[error("translog generation {generation} is already claimed for replay ({})", path.display())]
    AlreadyClaimed { generation: u64, path: PathBuf },

    /// Append with a sequence number not above the last appended one
    #[error("operation seq_no {attempted} is not above last appended seq_no {last}")]
    OutOfOrder { last: SeqNo, attempted: SeqNo },

    /// No generation is open for writing
    #[error("translog is closed")]
    Closed,

    /// The encoded operation does not fit in one record
    #[error("operation seq_no {seq_no} encodes to {size} bytes, records are limited to {max}")]
    OperationTooLarge { seq_no: SeqNo, size: usize, max: u32 },
}

impl TranslogError {
    /// Create an I/O error with context
    pub fn io(path: impl Into<PathBuf>, message: impl Into<String>, source: io::Error) -> Self {
        TranslogError::Io {
            path: path.into(),
            message: message.into(),
            source,
        }
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            TranslogError::Io { .. } => "SHARD_TRANSLOG_IO_FAILURE",
            TranslogError::Truncated { .. } => "SHARD_TRANSLOG_TRUNCATED",
            TranslogError::Corrupt { .. } => "SHARD_TRANSLOG_CORRUPTION",
            TranslogError::AlreadyClaimed { .. } => "SHARD_TRANSLOG_ALREADY_CLAIMED",
            TranslogError::OutOfOrder { .. } => "SHARD_TRANSLOG_OUT_OF_ORDER",
            TranslogError::Closed => "SHARD_TRANSLOG_CLOSED",
            TranslogError::OperationTooLarge { .. } => "SHARD_TRANSLOG_OPERATION_TOO_LARGE",
        }
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        match self {
            TranslogError::Io { .. } | TranslogError::Corrupt { .. } => Severity::Fatal,
            TranslogError::Truncated { .. } => Severity::Recoverable,
            TranslogError::AlreadyClaimed { .. }
            | TranslogError::OutOfOrder { .. }
            | TranslogError::Closed
            | TranslogError::OperationTooLarge { .. } => Severity::Error,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// A partially written tail record; replay treats it as end of log.
    pub fn is_truncation(&self) -> bool {
        matches!(self, TranslogError::Truncated { .. })
    }
}

/// Result type for translog operations
pub type TranslogResult<T> = Result<T, TranslogError>;
