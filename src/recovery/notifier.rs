//! Shard state reporting
//!
//! Routing and cluster-state bookkeeping live outside this crate. Recovery
//! reports stage transitions and the resulting local checkpoint through
//! this trait.

use crate::seqno::SeqNo;
use crate::shard::ShardId;

use super::state::Stage;

pub trait ShardStateNotifier: Send + Sync {
    fn on_stage(&self, _shard: &ShardId, _stage: Stage) {}

    /// Local checkpoint after recovery: highest replayed seq_no, or
    /// `NO_OPS_PERFORMED`
    fn on_checkpoint(&self, _shard: &ShardId, _local_checkpoint: SeqNo) {}
}

/// Discards every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl ShardStateNotifier for NoopNotifier {}
