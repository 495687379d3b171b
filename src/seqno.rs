//! Sequence numbers and checkpoints
//!
//! Every write operation on a shard is assigned a sequence number by the
//! primary. Sequence numbers are dense, start at 0 and never repeat.
//!
//! Two sentinels exist on the wire:
//! - `UNASSIGNED_SEQ_NO` (-2): no sequence number (used for "no trim")
//! - `NO_OPS_PERFORMED` (-1): the shard has never assigned a sequence number

use serde::{Deserialize, Serialize};

/// Per-shard sequence number.
pub type SeqNo = i64;

/// Sentinel for a sequence number that has not been assigned.
pub const UNASSIGNED_SEQ_NO: SeqNo = -2;

/// Sentinel for "no operations have been performed on this shard".
pub const NO_OPS_PERFORMED: SeqNo = -1;

/// Consistent snapshot of a shard's sequence number bookkeeping.
///
/// Captured under a single read so that `global_checkpoint <= local_checkpoint <= max_seq_no`
/// holds for the returned value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeqNoStats {
    /// Highest sequence number ever assigned locally
    pub max_seq_no: SeqNo,
    /// Highest sequence number below which every operation has been processed locally
    pub local_checkpoint: SeqNo,
    /// Highest sequence number acknowledged by all in-sync copies
    pub global_checkpoint: SeqNo,
}

impl SeqNoStats {
    /// Create a new stats snapshot.
    pub fn new(max_seq_no: SeqNo, local_checkpoint: SeqNo, global_checkpoint: SeqNo) -> Self {
        Self {
            max_seq_no,
            local_checkpoint,
            global_checkpoint,
        }
    }

    /// Stats of a shard that has never seen a write.
    pub fn empty() -> Self {
        Self::new(NO_OPS_PERFORMED, NO_OPS_PERFORMED, NO_OPS_PERFORMED)
    }

    /// Returns true if some operations above the global checkpoint may be
    /// missing on at least one replica.
    pub fn has_unacknowledged_operations(&self) -> bool {
        self.global_checkpoint < self.max_seq_no
    }

    /// Number of operations at or below the global checkpoint.
    pub fn acknowledged_operations(&self) -> i64 {
        if self.global_checkpoint < 0 {
            0
        } else {
            self.global_checkpoint + 1
        }
    }
}

/// Returns true if `seq_no` is a real, assigned sequence number.
pub fn is_assigned(seq_no: SeqNo) -> bool {
    seq_no >= 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_are_negative_and_distinct() {
        assert!(!is_assigned(UNASSIGNED_SEQ_NO));
        assert!(!is_assigned(NO_OPS_PERFORMED));
        assert_ne!(UNASSIGNED_SEQ_NO, NO_OPS_PERFORMED);
        assert!(is_assigned(0));
    }

    #[test]
    fn test_acknowledged_operations() {
        assert_eq!(SeqNoStats::empty().acknowledged_operations(), 0);
        assert_eq!(SeqNoStats::new(9, 9, 4).acknowledged_operations(), 5);
    }

    #[test]
    fn test_unacknowledged_operations() {
        assert!(SeqNoStats::new(9, 9, 4).has_unacknowledged_operations());
        assert!(!SeqNoStats::new(9, 9, 9).has_unacknowledged_operations());
        assert!(!SeqNoStats::empty().has_unacknowledged_operations());
    }

    #[test]
    fn test_stats_json_shape() {
        let json = serde_json::to_value(SeqNoStats::new(3, 2, 1)).unwrap();
        assert_eq!(json["maxSeqNo"], 3);
        assert_eq!(json["localCheckpoint"], 2);
        assert_eq!(json["globalCheckpoint"], 1);
    }
}
