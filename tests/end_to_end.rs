//! Crash, Recover, Promote
//!
//! Ten operations are durably appended and the eleventh is torn by a crash.
//! Local recovery must bring back exactly the ten. The recovered copy is
//! then promoted with a global checkpoint of 4 and resyncs the rest.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shardgate::recovery::{InMemoryEngine, RecoveryCoordinator};
use shardgate::resync::{
    ReplicationFailure, ResyncCoordinator, ResyncReplication, ResyncReplicationRequest,
    ResyncReplicationResponse, TaskManager, TranslogResyncSource,
};
use shardgate::seqno::{SeqNo, UNASSIGNED_SEQ_NO};
use shardgate::shard::{IndexShardState, ShardId, ShardLifecycle};
use shardgate::store::{FsSegmentStore, TRANSLOG_GENERATION_KEY};
use shardgate::translog::{frame_record, Operation, Translog};
use tempfile::TempDir;

#[derive(Default)]
struct RecordingReplicas {
    requests: Mutex<Vec<ResyncReplicationRequest>>,
}

#[async_trait]
impl ResyncReplication for RecordingReplicas {
    async fn sync(
        &self,
        request: ResyncReplicationRequest,
    ) -> Result<ResyncReplicationResponse, ReplicationFailure> {
        self.requests.lock().unwrap().push(request);
        Ok(ResyncReplicationResponse::default())
    }
}

fn op(seq_no: SeqNo) -> Operation {
    Operation::index(format!("doc-{}", seq_no), seq_no, format!(r#"{{"n": {}}}"#, seq_no))
}

#[tokio::test]
async fn test_crash_recover_and_resync() {
    let temp_dir = TempDir::new().unwrap();
    let store_dir = temp_dir.path().join("index");
    let translog_dir = temp_dir.path().join("translog");

    // Previous run: commit at generation 1, ten operations, torn eleventh
    {
        let store = FsSegmentStore::open(&store_dir).unwrap();
        let mut user_data = BTreeMap::new();
        user_data.insert(TRANSLOG_GENERATION_KEY.to_string(), "1".to_string());
        store.commit(Vec::new(), user_data).unwrap();

        let translog = Translog::open(vec![translog_dir.clone()], true).unwrap();
        translog.create_generation(1).unwrap();
        for seq_no in 0..10 {
            translog.append(&op(seq_no)).unwrap();
        }
        translog.close().unwrap();

        let torn = frame_record(&op(10)).unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(translog_dir.join("translog-1"))
            .unwrap();
        file.write_all(&torn[..torn.len() - 3]).unwrap();
    }

    // Restart: local recovery
    let lifecycle = Arc::new(ShardLifecycle::new(ShardId::new("orders", 2)));
    let store = Arc::new(FsSegmentStore::open(&store_dir).unwrap());
    let translog = Arc::new(Translog::open(vec![translog_dir.clone()], true).unwrap());
    let coordinator =
        RecoveryCoordinator::new(Arc::clone(&lifecycle), store, Arc::clone(&translog));

    let mut engine = InMemoryEngine::new();
    let state = coordinator.recover(&mut engine, true).unwrap();

    assert_eq!(state.translog().recovered_operations, 10);
    assert_eq!(state.translog().last_seq_no, 9);
    assert!(state.translog().truncated_tail);
    assert_eq!(engine.document_count(), 10);
    assert!(engine.document("doc-10").is_none());
    assert!(!translog_dir.join("translog-1.recovering").exists());
    lifecycle.transition(IndexShardState::Started);

    // Promotion: resync everything above the global checkpoint
    let source = TranslogResyncSource::new(Arc::clone(&lifecycle), Arc::clone(&translog), 4);
    let replicas = RecordingReplicas::default();
    let resync = ResyncCoordinator::new(1024, Arc::new(TaskManager::new()));

    let task = resync.resync(&source, &replicas).await.unwrap();

    let status = task.status();
    assert_eq!(status.resynced_operations, 5);
    assert_eq!(status.skipped_operations, 5);
    assert_eq!(status.total_operations, 5);

    let requests = replicas.requests.lock().unwrap();
    assert_eq!(requests[0].trim_above_seq_no, 9);
    assert!(requests[1..]
        .iter()
        .all(|r| r.trim_above_seq_no == UNASSIGNED_SEQ_NO));
    let sent: Vec<SeqNo> = requests
        .iter()
        .flat_map(|r| r.operations.iter().map(Operation::seq_no))
        .collect();
    assert_eq!(sent, vec![5, 6, 7, 8, 9]);
}
