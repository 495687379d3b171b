//! Resync wire messages

use serde::{Deserialize, Serialize};

use crate::seqno::{SeqNo, UNASSIGNED_SEQ_NO};
use crate::shard::ShardId;
use crate::translog::Operation;

/// One batch of operations sent to every replica.
///
/// `trim_above_seq_no` is `UNASSIGNED_SEQ_NO` (-2) on every request except
/// the first of a resync. There it tells the replica to discard whatever it
/// holds above that seq_no.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncReplicationRequest {
    pub shard_id: ShardId,
    pub trim_above_seq_no: SeqNo,
    pub operations: Vec<Operation>,
}

impl ResyncReplicationRequest {
    pub fn new(shard_id: ShardId, trim_above_seq_no: SeqNo, operations: Vec<Operation>) -> Self {
        Self {
            shard_id,
            trim_above_seq_no,
            operations,
        }
    }

    pub fn has_trim(&self) -> bool {
        self.trim_above_seq_no != UNASSIGNED_SEQ_NO
    }

    /// Sum of the serialized operation sizes
    pub fn estimated_size(&self) -> usize {
        self.operations.iter().map(Operation::estimate_size).sum()
    }
}

/// Acknowledgement, no payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResyncReplicationResponse {}
