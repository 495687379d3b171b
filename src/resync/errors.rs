//! Resync error types
//!
//! Error codes:
//! - SHARD_RESYNC_SHARD_CLOSED (RECOVERABLE, cooperative cancellation)
//! - SHARD_RESYNC_REPLICATION_FAILED (ERROR)
//! - SHARD_RESYNC_HISTORY_UNAVAILABLE (ERROR)

use thiserror::Error;

use crate::errors::Severity;
use crate::shard::ShardId;

/// A replica rejected a resync request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ReplicationFailure {
    pub reason: String,
}

impl ReplicationFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ResyncError {
    /// The shard closed; no further batches were sent
    #[error("shard {shard} closed during resync")]
    ShardClosed { shard: ShardId },

    /// A batch was not acknowledged; the whole resync fails
    #[error("resync batch {batch} of shard {shard} failed: {source}")]
    ReplicationFailed {
        shard: ShardId,
        batch: u64,
        #[source]
        source: ReplicationFailure,
    },

    /// The operation history could not be read
    #[error("operation history of shard {shard} unavailable: {reason}")]
    History { shard: ShardId, reason: String },
}

impl ResyncError {
    pub fn code(&self) -> &'static str {
        match self {
            ResyncError::ShardClosed { .. } => "SHARD_RESYNC_SHARD_CLOSED",
            ResyncError::ReplicationFailed { .. } => "SHARD_RESYNC_REPLICATION_FAILED",
            ResyncError::History { .. } => "SHARD_RESYNC_HISTORY_UNAVAILABLE",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ResyncError::ShardClosed { .. } => Severity::Recoverable,
            _ => Severity::Error,
        }
    }

    /// True for cooperative cancellation, as opposed to a genuine failure
    pub fn is_shard_closed(&self) -> bool {
        matches!(self, ResyncError::ShardClosed { .. })
    }
}

pub type ResyncResult<T> = Result<T, ResyncError>;
