//! Periodic translog fsync
//!
//! With a non-zero sync interval, appends only reach the OS and this task
//! fsyncs the open generation whenever bytes are pending. The task:
//! - runs the blocking fsync off the async worker threads
//! - logs failures, at error level only while the shard is started
//! - stops rescheduling once the shard is closed or the handle is cancelled
//!   or dropped

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::writer::Translog;
use crate::observability::{log_event, Event};
use crate::shard::{IndexShardState, ShardLifecycle};

/// Handle of a running periodic sync task
pub struct TranslogSyncScheduler {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<u64>>,
}

impl TranslogSyncScheduler {
    /// Start syncing `translog` every `interval` on the current tokio runtime.
    pub fn start(
        translog: Arc<Translog>,
        lifecycle: Arc<ShardLifecycle>,
        interval: Duration,
    ) -> Self {
        let (stop, mut stopped) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;
            let mut syncs = 0u64;
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {}
                }
                if lifecycle.is_closed() {
                    debug!(shard = %lifecycle.shard_id(), "shard closed, stopping translog sync");
                    break;
                }
                if !translog.sync_needed() {
                    continue;
                }
                let target = Arc::clone(&translog);
                match tokio::task::spawn_blocking(move || target.sync()).await {
                    Ok(Ok(())) => {
                        syncs += 1;
                        trace!(shard = %lifecycle.shard_id(), "periodic translog sync");
                    }
                    Ok(Err(e)) => report_failure(&lifecycle, &e.to_string()),
                    Err(e) => report_failure(&lifecycle, &e.to_string()),
                }
            }
            syncs
        });

        Self {
            stop: Some(stop),
            task: Some(task),
        }
    }

    /// Stop the task and wait for it. Returns the number of syncs performed.
    pub async fn cancel(mut self) -> u64 {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        match self.task.take() {
            Some(task) => task.await.unwrap_or(0),
            None => 0,
        }
    }

    /// True once the task has exited
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }
}

impl Drop for TranslogSyncScheduler {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

fn report_failure(lifecycle: &ShardLifecycle, reason: &str) {
    let shard = lifecycle.shard_id().to_string();
    if lifecycle.state() == IndexShardState::Started {
        log_event(Event::TranslogSyncFailed, &[("shard", shard.as_str()), ("reason", reason)]);
    } else {
        debug!(shard = %shard, reason, "failed to sync translog");
    }
}
