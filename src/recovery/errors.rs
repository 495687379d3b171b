//! Recovery error types
//!
//! Error codes:
//! - SHARD_RECOVERY_CORRUPT_STORE (FATAL)
//! - SHARD_RECOVERY_MISSING_DATA (FATAL)
//! - SHARD_RECOVERY_STORE_FAILURE (FATAL)
//! - SHARD_RECOVERY_TRANSLOG_FAILURE (FATAL, or ERROR when already claimed)
//! - SHARD_RECOVERY_REPLAY_FAILED (FATAL)
//! - SHARD_RECOVERY_INVALID_STAGE (ERROR)
//! - SHARD_RECOVERY_SHARD_CLOSED (RECOVERABLE, cooperative cancellation)

use thiserror::Error;

use super::engine::ApplyError;
use super::state::Stage;
use crate::errors::Severity;
use crate::seqno::SeqNo;
use crate::shard::ShardId;
use crate::store::StoreError;
use crate::translog::TranslogError;

/// Failure of a local shard recovery
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// The store carries a corruption marker
    #[error("shard {shard} store is corrupted")]
    CorruptStore {
        shard: ShardId,
        #[source]
        source: StoreError,
    },

    /// The store is empty but the shard was expected to hold data
    #[error("shard {shard} was expected to hold data but the store is empty: {reason}")]
    MissingData { shard: ShardId, reason: String },

    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("translog failure: {0}")]
    Translog(#[from] TranslogError),

    /// The engine rejected an operation in a way that cannot be skipped
    #[error("failed to replay operation seq_no {seq_no}: {source}")]
    ReplayFailed {
        seq_no: SeqNo,
        #[source]
        source: ApplyError,
    },

    /// Stages only move forward
    #[error("illegal recovery stage transition {from} -> {to}")]
    InvalidStage { from: Stage, to: Stage },

    /// The shard closed while recovering
    #[error("shard {shard} closed during recovery")]
    ShardClosed { shard: ShardId },
}

impl RecoveryError {
    pub fn code(&self) -> &'static str {
        match self {
            RecoveryError::CorruptStore { .. } => "SHARD_RECOVERY_CORRUPT_STORE",
            RecoveryError::MissingData { .. } => "SHARD_RECOVERY_MISSING_DATA",
            RecoveryError::Store(_) => "SHARD_RECOVERY_STORE_FAILURE",
            RecoveryError::Translog(_) => "SHARD_RECOVERY_TRANSLOG_FAILURE",
            RecoveryError::ReplayFailed { .. } => "SHARD_RECOVERY_REPLAY_FAILED",
            RecoveryError::InvalidStage { .. } => "SHARD_RECOVERY_INVALID_STAGE",
            RecoveryError::ShardClosed { .. } => "SHARD_RECOVERY_SHARD_CLOSED",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            RecoveryError::ShardClosed { .. } => Severity::Recoverable,
            RecoveryError::InvalidStage { .. } => Severity::Error,
            RecoveryError::Translog(TranslogError::AlreadyClaimed { .. }) => Severity::Error,
            _ => Severity::Fatal,
        }
    }

    /// Fatal errors fail the shard copy; allocation is retried elsewhere
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// True for cooperative cancellation, as opposed to a genuine failure
    pub fn is_shard_closed(&self) -> bool {
        matches!(self, RecoveryError::ShardClosed { .. })
    }
}

/// Result type for recovery operations
pub type RecoveryResult<T> = Result<T, RecoveryError>;
