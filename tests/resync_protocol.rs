//! Primary-Replica Resync Tests
//!
//! Covers:
//! - Only the first request of a resync carries the trim marker
//! - skipped + resynced accounts for every seq_no up to max_seq_no
//! - Nothing is sent when the global checkpoint is caught up
//! - Batches respect the chunk size
//! - Replication failures and shard closure end the resync

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shardgate::resync::{
    phase, OperationHistory, ReplicationFailure, ResyncCoordinator, ResyncError,
    ResyncReplication, ResyncReplicationRequest, ResyncReplicationResponse, ResyncResult,
    ResyncSource, TaskManager,
};
use shardgate::seqno::{SeqNo, SeqNoStats, UNASSIGNED_SEQ_NO};
use shardgate::shard::ShardId;
use shardgate::translog::Operation;

// =============================================================================
// Test Utilities
// =============================================================================

/// Operations with identical encoded sizes for seq_no 0..=9
fn op(seq_no: SeqNo) -> Operation {
    Operation::index(format!("d{}", seq_no), seq_no, r#"{"v":1}"#)
}

struct MockPrimary {
    shard_id: ShardId,
    stats: SeqNoStats,
    history: Vec<Operation>,
    closed: AtomicBool,
}

impl MockPrimary {
    fn new(max_seq_no: SeqNo, global_checkpoint: SeqNo) -> Self {
        Self::with_history(max_seq_no, global_checkpoint, (0..=max_seq_no).map(op).collect())
    }

    fn with_history(max_seq_no: SeqNo, global_checkpoint: SeqNo, history: Vec<Operation>) -> Self {
        Self {
            shard_id: ShardId::new("events", 1),
            stats: SeqNoStats::new(max_seq_no, max_seq_no, global_checkpoint),
            history,
            closed: AtomicBool::new(false),
        }
    }
}

impl ResyncSource for MockPrimary {
    fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    fn seq_no_stats(&self) -> SeqNoStats {
        self.stats
    }

    fn history_from(&self, from_seq_no: SeqNo) -> ResyncResult<OperationHistory<'_>> {
        Ok(Box::new(
            self.history
                .iter()
                .filter(move |op| op.seq_no() >= from_seq_no)
                .cloned()
                .map(Ok),
        ))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Records every request; can fail or trigger a hook after N requests
#[derive(Default)]
struct MockReplicas {
    requests: Mutex<Vec<ResyncReplicationRequest>>,
    fail_on: Option<usize>,
    after_first: Option<Box<dyn Fn() + Send + Sync>>,
}

impl MockReplicas {
    fn requests(&self) -> Vec<ResyncReplicationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResyncReplication for MockReplicas {
    async fn sync(
        &self,
        request: ResyncReplicationRequest,
    ) -> Result<ResyncReplicationResponse, ReplicationFailure> {
        let sent = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        if self.fail_on == Some(sent) {
            return Err(ReplicationFailure::new("replica [node-2] rejected the batch"));
        }
        if sent == 1 {
            if let Some(hook) = &self.after_first {
                hook();
            }
        }
        Ok(ResyncReplicationResponse::default())
    }
}

fn coordinator(chunk_size: usize) -> ResyncCoordinator {
    ResyncCoordinator::new(chunk_size, Arc::new(TaskManager::new()))
}

// =============================================================================
// Trim Marker and Counts
// =============================================================================

#[tokio::test]
async fn test_trim_only_on_first_request() {
    let primary = MockPrimary::new(9, -1);
    let replicas = MockReplicas::default();
    let chunk = op(0).estimate_size() * 3;

    let task = coordinator(chunk).resync(&primary, &replicas).await.unwrap();

    let requests = replicas.requests();
    assert_eq!(requests.len(), 4);
    assert_eq!(requests[0].trim_above_seq_no, 9);
    assert!(requests[1..]
        .iter()
        .all(|r| r.trim_above_seq_no == UNASSIGNED_SEQ_NO));
    assert_eq!(requests.iter().filter(|r| r.has_trim()).count(), 1);
    assert_eq!(task.resynced_operations(), 10);
}

#[tokio::test]
async fn test_counts_cover_every_seq_no() {
    for global_checkpoint in -1..9 {
        let primary = MockPrimary::new(9, global_checkpoint);
        let replicas = MockReplicas::default();

        let task = coordinator(64).resync(&primary, &replicas).await.unwrap();

        let status = task.status();
        assert_eq!(status.skipped_operations, global_checkpoint + 1);
        assert_eq!(status.resynced_operations, 9 - global_checkpoint);
        assert_eq!(status.skipped_operations + status.resynced_operations, 10);
        assert_eq!(status.total_operations, status.resynced_operations);
        assert_eq!(status.phase, phase::FINISHED);

        let sent: Vec<SeqNo> = replicas
            .requests()
            .iter()
            .flat_map(|r| r.operations.iter().map(Operation::seq_no))
            .collect();
        let expected: Vec<SeqNo> = (global_checkpoint + 1..=9).collect();
        assert_eq!(sent, expected);
    }
}

#[tokio::test]
async fn test_caught_up_replicas_get_nothing() {
    let primary = MockPrimary::new(9, 9);
    let replicas = MockReplicas::default();

    let task = coordinator(1024).resync(&primary, &replicas).await.unwrap();

    assert!(replicas.requests().is_empty());
    let status = task.status();
    assert_eq!(status.total_operations, 0);
    assert_eq!(status.skipped_operations, 0);
    assert_eq!(status.resynced_operations, 0);
    assert_eq!(status.phase, phase::FINISHED);
}

#[tokio::test]
async fn test_empty_history_still_sends_trim() {
    let primary = MockPrimary::with_history(9, 4, Vec::new());
    let replicas = MockReplicas::default();

    let task = coordinator(1024).resync(&primary, &replicas).await.unwrap();

    let requests = replicas.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].operations.is_empty());
    assert_eq!(requests[0].trim_above_seq_no, 9);
    assert_eq!(task.resynced_operations(), 0);
    assert_eq!(task.skipped_operations(), 5);
}

// =============================================================================
// Batching
// =============================================================================

#[tokio::test]
async fn test_two_per_batch_gives_three_batches() {
    let primary = MockPrimary::new(4, -1);
    let replicas = MockReplicas::default();
    let chunk = op(0).estimate_size() * 2;

    coordinator(chunk).resync(&primary, &replicas).await.unwrap();

    let requests = replicas.requests();
    let sizes: Vec<usize> = requests.iter().map(|r| r.operations.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert!(requests[0].has_trim());
    assert!(!requests[1].has_trim());
    assert!(!requests[2].has_trim());
    assert!(requests.iter().all(|r| r.estimated_size() <= chunk));
}

#[tokio::test]
async fn test_oversized_operation_gets_own_batch() {
    let big = Operation::index("d2", 2, format!(r#"{{"blob":"{}"}}"#, "x".repeat(500)));
    let history = vec![op(0), op(1), big, op(3)];
    let primary = MockPrimary::with_history(3, -1, history);
    let replicas = MockReplicas::default();

    coordinator(op(0).estimate_size() * 2)
        .resync(&primary, &replicas)
        .await
        .unwrap();

    let sizes: Vec<usize> = replicas
        .requests()
        .iter()
        .map(|r| r.operations.len())
        .collect();
    assert_eq!(sizes, vec![2, 1, 1]);
}

// =============================================================================
// Failures and Cancellation
// =============================================================================

#[tokio::test]
async fn test_replication_failure_fails_resync() {
    let primary = MockPrimary::new(9, -1);
    let replicas = MockReplicas {
        fail_on: Some(2),
        ..Default::default()
    };
    let coordinator = coordinator(op(0).estimate_size() * 3);

    let err = coordinator.resync(&primary, &replicas).await.unwrap_err();

    assert!(matches!(err, ResyncError::ReplicationFailed { batch: 1, .. }));
    assert_eq!(err.code(), "SHARD_RESYNC_REPLICATION_FAILED");
    assert!(!err.is_shard_closed());
    assert_eq!(replicas.requests().len(), 2);
    assert!(coordinator.task_manager().list().is_empty());
}

#[tokio::test]
async fn test_shard_closed_mid_resync() {
    let primary = Arc::new(MockPrimary::new(9, -1));
    let closer = Arc::clone(&primary);
    let replicas = MockReplicas {
        after_first: Some(Box::new(move || closer.closed.store(true, Ordering::SeqCst))),
        ..Default::default()
    };

    let err = coordinator(op(0).estimate_size() * 2)
        .resync(primary.as_ref(), &replicas)
        .await
        .unwrap_err();

    assert!(err.is_shard_closed());
    assert_eq!(replicas.requests().len(), 1);
}

#[tokio::test]
async fn test_cancelled_task_stops_and_freezes_counts() {
    let primary = MockPrimary::new(9, -1);
    let tasks = Arc::new(TaskManager::new());
    let canceller = Arc::clone(&tasks);
    let shard = primary.shard_id.clone();
    let replicas = MockReplicas {
        after_first: Some(Box::new(move || {
            canceller.cancel_for_shard(&shard);
        })),
        ..Default::default()
    };
    let coordinator = ResyncCoordinator::new(op(0).estimate_size() * 2, Arc::clone(&tasks));

    let err = coordinator.resync(&primary, &replicas).await.unwrap_err();

    assert!(err.is_shard_closed());
    assert_eq!(replicas.requests().len(), 1);
    assert!(tasks.list().is_empty());
}

#[tokio::test]
async fn test_closed_shard_is_rejected_up_front() {
    let primary = MockPrimary::new(9, -1);
    primary.closed.store(true, Ordering::SeqCst);
    let replicas = MockReplicas::default();

    let err = coordinator(1024).resync(&primary, &replicas).await.unwrap_err();

    assert!(err.is_shard_closed());
    assert!(replicas.requests().is_empty());
}

// =============================================================================
// Listener and Status
// =============================================================================

#[tokio::test]
async fn test_listener_called_exactly_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let primary = MockPrimary::new(9, 4);
    let replicas = MockReplicas::default();

    let seen = Arc::clone(&calls);
    coordinator(1024)
        .resync_with_listener(&primary, &replicas, move |result| {
            assert_eq!(result.unwrap().resynced_operations(), 5);
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .await;

    let failing = MockReplicas {
        fail_on: Some(1),
        ..Default::default()
    };
    let seen = Arc::clone(&calls);
    coordinator(1024)
        .resync_with_listener(&primary, &failing, move |result| {
            assert!(result.is_err());
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_status_serializes_camel_case() {
    let primary = MockPrimary::new(9, 4);
    let replicas = MockReplicas::default();

    let task = coordinator(1024).resync(&primary, &replicas).await.unwrap();
    let json = serde_json::to_value(task.status()).unwrap();

    assert_eq!(
        json,
        serde_json::json!({
            "phase": "finished",
            "totalOperations": 5,
            "resyncedOperations": 5,
            "skippedOperations": 5,
        })
    );
}
