//! Primary-replica resync
//!
//! After a promotion the new primary resends every operation the replicas
//! may have missed: those in `(global_checkpoint, max_seq_no]`.
//!
//! # Rules
//!
//! - Nothing to resend (`global_checkpoint >= max_seq_no`): no request
//! - Otherwise the first request carries `trim_above_seq_no = max_seq_no`,
//!   every later one `UNASSIGNED_SEQ_NO`; with no operations to send the
//!   first request is trim-only
//! - A batch stays within `chunk_size` bytes unless a single operation
//!   alone exceeds it
//! - Batches go out one at a time, the next only after the previous ack
//! - A closed shard stops the resync before the next batch

use std::sync::Arc;

use tracing::debug;

use super::errors::{ResyncError, ResyncResult};
use super::request::ResyncReplicationRequest;
use super::source::{ResyncReplication, ResyncSource};
use super::task::{phase, ResyncTask, TaskManager};
use crate::config::ShardConfig;
use crate::observability::{log_event, Event, ObservationScope};
use crate::seqno::{SeqNo, NO_OPS_PERFORMED, UNASSIGNED_SEQ_NO};
use crate::translog::Operation;

/// Default upper bound on the operation bytes of one request
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

/// Drives resyncs and registers them with a `TaskManager`
pub struct ResyncCoordinator {
    chunk_size: usize,
    task_manager: Arc<TaskManager>,
}

impl ResyncCoordinator {
    pub fn new(chunk_size: usize, task_manager: Arc<TaskManager>) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            task_manager,
        }
    }

    pub fn from_config(config: &ShardConfig, task_manager: Arc<TaskManager>) -> Self {
        Self::new(config.resync_chunk_size_bytes, task_manager)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn task_manager(&self) -> &Arc<TaskManager> {
        &self.task_manager
    }

    /// Resync `source`'s unacknowledged operations to its replicas.
    ///
    /// The task is registered for the duration of the call and returned once
    /// finished.
    ///
    /// # Errors
    ///
    /// - `ShardClosed` if the shard closed or the task was cancelled
    /// - `ReplicationFailed` if a batch was not acknowledged
    /// - `History` if the operations could not be read
    pub async fn resync<S, R>(&self, source: &S, replication: &R) -> ResyncResult<Arc<ResyncTask>>
    where
        S: ResyncSource + ?Sized,
        R: ResyncReplication + ?Sized,
    {
        let shard = source.shard_id().clone();
        if source.is_closed() {
            return Err(ResyncError::ShardClosed { shard });
        }

        let task = self.task_manager.register(shard.clone());
        let scope = ObservationScope::new(
            Event::ResyncStart,
            Event::ResyncComplete,
            Event::ResyncFailed,
            vec![("shard", shard.to_string()), ("task", task.id().to_string())],
        );

        let result = self.run(&task, source, replication).await;
        self.task_manager.unregister(task.id());

        match result {
            Ok(()) => {
                task.set_phase(phase::FINISHED);
                let status = task.status();
                let total = status.total_operations.to_string();
                let resynced = status.resynced_operations.to_string();
                let skipped = status.skipped_operations.to_string();
                scope.complete(&[
                    ("total_operations", total.as_str()),
                    ("resynced_operations", resynced.as_str()),
                    ("skipped_operations", skipped.as_str()),
                ]);
                Ok(task)
            }
            Err(e) if e.is_shard_closed() => {
                let resynced = task.resynced_operations().to_string();
                scope.end(
                    Event::ResyncCancelled,
                    &[("resynced_operations", resynced.as_str())],
                );
                Err(e)
            }
            Err(e) => {
                scope.fail(&format!("[{}] {}", e.code(), e));
                Err(e)
            }
        }
    }

    /// Run `resync` and hand its result to `listener`, exactly once.
    pub async fn resync_with_listener<S, R, F>(&self, source: &S, replication: &R, listener: F)
    where
        S: ResyncSource + ?Sized,
        R: ResyncReplication + ?Sized,
        F: FnOnce(ResyncResult<Arc<ResyncTask>>) + Send,
    {
        let result = self.resync(source, replication).await;
        listener(result);
    }

    async fn run<S, R>(&self, task: &ResyncTask, source: &S, replication: &R) -> ResyncResult<()>
    where
        S: ResyncSource + ?Sized,
        R: ResyncReplication + ?Sized,
    {
        let shard = source.shard_id().clone();
        let stats = source.seq_no_stats();
        let max_seq_no = stats.max_seq_no;
        let global_checkpoint = stats.global_checkpoint.max(NO_OPS_PERFORMED);

        if global_checkpoint >= max_seq_no {
            debug!(shard = %shard, max_seq_no, global_checkpoint, "nothing to resync");
            return Ok(());
        }

        let starting_seq_no = global_checkpoint + 1;
        task.set_skipped_operations(starting_seq_no);
        task.set_phase(phase::COLLECTING_OPS);
        let mut history = source.history_from(starting_seq_no)?;

        let mut carried: Option<Operation> = None;
        let mut exhausted = false;
        let mut batch_number: u64 = 0;
        loop {
            let mut batch = Vec::new();
            let mut batch_size = 0usize;
            if let Some(op) = carried.take() {
                batch_size += op.estimate_size();
                batch.push(op);
            }
            while !exhausted {
                let op = match history.next() {
                    Some(item) => item?,
                    None => {
                        exhausted = true;
                        break;
                    }
                };
                if op.seq_no() > max_seq_no {
                    exhausted = true;
                    break;
                }
                if op.seq_no() < starting_seq_no {
                    continue;
                }
                task.add_total_operations(1);
                let op_size = op.estimate_size();
                if !batch.is_empty() && batch_size + op_size > self.chunk_size {
                    carried = Some(op);
                    break;
                }
                batch_size += op_size;
                batch.push(op);
            }

            let first = batch_number == 0;
            if batch.is_empty() && !first {
                break;
            }
            self.send_batch(task, source, replication, batch_number, first, max_seq_no, batch)
                .await?;
            batch_number += 1;

            if exhausted && carried.is_none() {
                break;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_batch<S, R>(
        &self,
        task: &ResyncTask,
        source: &S,
        replication: &R,
        batch_number: u64,
        first: bool,
        max_seq_no: SeqNo,
        operations: Vec<Operation>,
    ) -> ResyncResult<()>
    where
        S: ResyncSource + ?Sized,
        R: ResyncReplication + ?Sized,
    {
        let shard = source.shard_id().clone();
        if source.is_closed() || task.is_cancelled() {
            return Err(ResyncError::ShardClosed { shard });
        }

        task.set_phase(phase::SENDING_OPS);
        let trim_above_seq_no = if first { max_seq_no } else { UNASSIGNED_SEQ_NO };
        let count = operations.len() as i64;
        let request = ResyncReplicationRequest::new(shard.clone(), trim_above_seq_no, operations);
        let size = request.estimated_size();

        replication
            .sync(request)
            .await
            .map_err(|source| ResyncError::ReplicationFailed {
                shard: shard.clone(),
                batch: batch_number,
                source,
            })?;
        task.add_resynced_operations(count);

        let shard_name = shard.to_string();
        let batch = batch_number.to_string();
        let operations = count.to_string();
        let bytes = size.to_string();
        let trim = trim_above_seq_no.to_string();
        log_event(
            Event::ResyncBatchSent,
            &[
                ("shard", shard_name.as_str()),
                ("batch", batch.as_str()),
                ("operations", operations.as_str()),
                ("bytes", bytes.as_str()),
                ("trim_above_seq_no", trim.as_str()),
            ],
        );
        Ok(())
    }
}
