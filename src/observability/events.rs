//! Observable shard lifecycle events
//!
//! Events are explicit and typed. Each one carries a fixed level so the
//! same condition is always reported the same way.

use std::fmt;

use tracing::Level;

/// Observable events of recovery, replay, resync and translog maintenance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Local recovery
    /// Local recovery started
    RecoveryStart,
    /// Recovery moved to a new stage
    RecoveryStageChanged,
    /// Store held data although none was expected; wiped
    RecoveryDanglingDataCleaned,
    /// Fresh shard, empty commit written
    RecoveryEmptyCommit,
    /// Recovery finished
    RecoveryComplete,
    /// Recovery aborted (FATAL for the shard copy)
    RecoveryFailed,

    // Translog replay
    /// Translog generation claimed for replay
    TranslogReplayBegin,
    /// Translog replay finished
    TranslogReplayComplete,
    /// A single operation was skipped during replay
    TranslogEntrySkipped,
    /// Partially written tail record reached
    TranslogTruncatedTail,
    /// Periodic translog fsync failed
    TranslogSyncFailed,

    // Mapping updates
    /// Mapping update acknowledged by the master
    MappingUpdateAcknowledged,
    /// Mapping update not acknowledged within the bounded wait
    MappingUpdateTimedOut,
    /// Mapping update rejected
    MappingUpdateFailed,

    // Primary-replica resync
    /// Resync started
    ResyncStart,
    /// One resync request acknowledged by the replicas
    ResyncBatchSent,
    /// Resync finished
    ResyncComplete,
    /// Resync stopped because the shard closed
    ResyncCancelled,
    /// Resync failed
    ResyncFailed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::RecoveryStart => "RECOVERY_BEGIN",
            Event::RecoveryStageChanged => "RECOVERY_STAGE_CHANGED",
            Event::RecoveryDanglingDataCleaned => "RECOVERY_DANGLING_DATA_CLEANED",
            Event::RecoveryEmptyCommit => "RECOVERY_EMPTY_COMMIT",
            Event::RecoveryComplete => "RECOVERY_COMPLETE",
            Event::RecoveryFailed => "RECOVERY_FAILED",

            Event::TranslogReplayBegin => "TRANSLOG_REPLAY_BEGIN",
            Event::TranslogReplayComplete => "TRANSLOG_REPLAY_COMPLETE",
            Event::TranslogEntrySkipped => "TRANSLOG_ENTRY_SKIPPED",
            Event::TranslogTruncatedTail => "TRANSLOG_TRUNCATED_TAIL",
            Event::TranslogSyncFailed => "TRANSLOG_SYNC_FAILED",

            Event::MappingUpdateAcknowledged => "MAPPING_UPDATE_ACKNOWLEDGED",
            Event::MappingUpdateTimedOut => "MAPPING_UPDATE_TIMED_OUT",
            Event::MappingUpdateFailed => "MAPPING_UPDATE_FAILED",

            Event::ResyncStart => "RESYNC_BEGIN",
            Event::ResyncBatchSent => "RESYNC_BATCH_SENT",
            Event::ResyncComplete => "RESYNC_COMPLETE",
            Event::ResyncCancelled => "RESYNC_CANCELLED",
            Event::ResyncFailed => "RESYNC_FAILED",
        }
    }

    /// Level the event is emitted at
    pub fn level(&self) -> Level {
        match self {
            Event::RecoveryFailed | Event::ResyncFailed | Event::TranslogSyncFailed => Level::ERROR,
            Event::RecoveryDanglingDataCleaned
            | Event::TranslogEntrySkipped
            | Event::MappingUpdateTimedOut
            | Event::MappingUpdateFailed
            | Event::ResyncCancelled => Level::WARN,
            Event::RecoveryStageChanged
            | Event::TranslogTruncatedTail
            | Event::MappingUpdateAcknowledged
            | Event::ResyncBatchSent => Level::DEBUG,
            _ => Level::INFO,
        }
    }

    /// Returns true if this event means the shard copy cannot be used
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::RecoveryFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
