//! Where resync reads its operations from
//!
//! The promoted primary resends operations from its retained history. The
//! history must yield operations in ascending seq_no order.

use std::sync::Arc;

use async_trait::async_trait;

use super::errors::{ReplicationFailure, ResyncError, ResyncResult};
use super::request::{ResyncReplicationRequest, ResyncReplicationResponse};
use crate::seqno::{SeqNo, SeqNoStats};
use crate::shard::{ShardId, ShardLifecycle};
use crate::translog::{Operation, Translog, TranslogReader};

/// Lazily read operations, ascending by seq_no
pub type OperationHistory<'a> = Box<dyn Iterator<Item = ResyncResult<Operation>> + Send + 'a>;

/// The promoted primary, as seen by the resync
pub trait ResyncSource: Send + Sync {
    fn shard_id(&self) -> &ShardId;

    /// Checkpoints captured in one consistent read
    fn seq_no_stats(&self) -> SeqNoStats;

    /// Operations with seq_no at or above `from_seq_no`
    fn history_from(&self, from_seq_no: SeqNo) -> ResyncResult<OperationHistory<'_>>;

    fn is_closed(&self) -> bool;
}

/// Sends resync requests to every replica and waits for all of them
#[async_trait]
pub trait ResyncReplication: Send + Sync {
    async fn sync(
        &self,
        request: ResyncReplicationRequest,
    ) -> Result<ResyncReplicationResponse, ReplicationFailure>;
}

/// History backed by the open translog generation of the primary
pub struct TranslogResyncSource {
    lifecycle: Arc<ShardLifecycle>,
    translog: Arc<Translog>,
    global_checkpoint: SeqNo,
}

impl TranslogResyncSource {
    pub fn new(
        lifecycle: Arc<ShardLifecycle>,
        translog: Arc<Translog>,
        global_checkpoint: SeqNo,
    ) -> Self {
        Self {
            lifecycle,
            translog,
            global_checkpoint,
        }
    }

    fn history_error(&self, reason: impl Into<String>) -> ResyncError {
        ResyncError::History {
            shard: self.shard_id().clone(),
            reason: reason.into(),
        }
    }
}

impl ResyncSource for TranslogResyncSource {
    fn shard_id(&self) -> &ShardId {
        self.lifecycle.shard_id()
    }

    /// The translog is fully processed locally, so the local checkpoint is
    /// its last seq_no. The global checkpoint never exceeds it.
    fn seq_no_stats(&self) -> SeqNoStats {
        let max_seq_no = self.translog.last_seq_no();
        SeqNoStats::new(
            max_seq_no,
            max_seq_no,
            self.global_checkpoint.min(max_seq_no),
        )
    }

    fn history_from(&self, from_seq_no: SeqNo) -> ResyncResult<OperationHistory<'_>> {
        let path = self
            .translog
            .current_path()
            .ok_or_else(|| self.history_error("no open translog generation"))?;
        let reader =
            TranslogReader::open(&path).map_err(|e| self.history_error(e.to_string()))?;

        let shard = self.shard_id().clone();
        Ok(Box::new(
            reader
                .map(move |item| {
                    item.map_err(|e| ResyncError::History {
                        shard: shard.clone(),
                        reason: e.to_string(),
                    })
                })
                .filter(move |item| match item {
                    Ok(op) => op.seq_no() >= from_seq_no,
                    Err(_) => true,
                }),
        ))
    }

    fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }
}
