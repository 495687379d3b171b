//! Resync task and its status
//!
//! The coordinator is the only writer. Status readers run concurrently, so
//! counters are atomics and the phase is replaced wholesale under a lock.
//! Once a task is cancelled its counters freeze.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shard::ShardId;

/// Phase labels, for observability only
pub mod phase {
    pub const STARTING: &str = "starting";
    pub const COLLECTING_OPS: &str = "collecting_ops";
    pub const SENDING_OPS: &str = "sending_ops";
    pub const FINISHED: &str = "finished";
}

/// Point-in-time view of a resync task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub phase: String,
    pub total_operations: i64,
    pub resynced_operations: i64,
    pub skipped_operations: i64,
}

/// One primary-replica resync
#[derive(Debug)]
pub struct ResyncTask {
    id: u64,
    shard_id: ShardId,
    created_at: DateTime<Utc>,
    phase: Mutex<String>,
    total_operations: AtomicI64,
    resynced_operations: AtomicI64,
    skipped_operations: AtomicI64,
    cancelled: AtomicBool,
}

impl ResyncTask {
    pub fn new(id: u64, shard_id: ShardId) -> Self {
        Self {
            id,
            shard_id,
            created_at: Utc::now(),
            phase: Mutex::new(phase::STARTING.to_string()),
            total_operations: AtomicI64::new(0),
            resynced_operations: AtomicI64::new(0),
            skipped_operations: AtomicI64::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn phase(&self) -> String {
        self.phase
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn total_operations(&self) -> i64 {
        self.total_operations.load(Ordering::Acquire)
    }

    pub fn resynced_operations(&self) -> i64 {
        self.resynced_operations.load(Ordering::Acquire)
    }

    pub fn skipped_operations(&self) -> i64 {
        self.skipped_operations.load(Ordering::Acquire)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Stop the resync before its next batch
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn status(&self) -> Status {
        Status {
            phase: self.phase(),
            total_operations: self.total_operations(),
            resynced_operations: self.resynced_operations(),
            skipped_operations: self.skipped_operations(),
        }
    }

    pub(crate) fn set_phase(&self, next: &str) {
        if self.is_cancelled() {
            return;
        }
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = next.to_string();
    }

    pub(crate) fn set_skipped_operations(&self, skipped: i64) {
        if !self.is_cancelled() {
            self.skipped_operations.store(skipped, Ordering::Release);
        }
    }

    pub(crate) fn add_total_operations(&self, count: i64) {
        if !self.is_cancelled() {
            self.total_operations.fetch_add(count, Ordering::AcqRel);
        }
    }

    pub(crate) fn add_resynced_operations(&self, count: i64) {
        if !self.is_cancelled() {
            self.resynced_operations.fetch_add(count, Ordering::AcqRel);
        }
    }
}

/// Registry of running resync tasks
#[derive(Debug, Default)]
pub struct TaskManager {
    next_id: AtomicU64,
    tasks: Mutex<BTreeMap<u64, Arc<ResyncTask>>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, Arc<ResyncTask>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, shard_id: ShardId) -> Arc<ResyncTask> {
        let id = self.next_id.fetch_add(1, Ordering::AcqRel) + 1;
        let task = Arc::new(ResyncTask::new(id, shard_id));
        self.tasks().insert(id, Arc::clone(&task));
        task
    }

    pub fn unregister(&self, id: u64) -> Option<Arc<ResyncTask>> {
        self.tasks().remove(&id)
    }

    pub fn get(&self, id: u64) -> Option<Arc<ResyncTask>> {
        self.tasks().get(&id).cloned()
    }

    /// Running tasks ordered by id
    pub fn list(&self) -> Vec<Arc<ResyncTask>> {
        self.tasks().values().cloned().collect()
    }

    /// Cancel every running task of `shard_id`. Returns how many were cancelled.
    pub fn cancel_for_shard(&self, shard_id: &ShardId) -> usize {
        let tasks = self.tasks();
        let mut cancelled = 0;
        for task in tasks.values().filter(|t| t.shard_id() == shard_id) {
            task.cancel();
            cancelled += 1;
        }
        cancelled
    }
}
