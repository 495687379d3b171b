//! Post-recovery mapping updates
//!
//! Replay may change dynamic mappings. Each changed document type is sent to
//! the master once recovery finished replaying; the acknowledgement is
//! awaited for a bounded time. Neither a timeout nor a rejection fails the
//! recovery: both are logged and startup proceeds.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crate::observability::{log_event, Event};
use crate::shard::ShardId;

/// Acknowledgement of one mapping update
pub type MappingAck = Result<(), String>;

/// Pushes mapping changes to the cluster master
pub trait MappingUpdater: Send + Sync {
    /// Start sending the current mapping of `doc_type`.
    ///
    /// The returned receiver yields the acknowledgement. Dropping the sender
    /// without sending counts as a failure.
    fn update_mapping(&self, shard: &ShardId, doc_type: &str) -> Receiver<MappingAck>;
}

/// Acknowledges every update immediately
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMappingUpdater;

impl MappingUpdater for NoopMappingUpdater {
    fn update_mapping(&self, _shard: &ShardId, _doc_type: &str) -> Receiver<MappingAck> {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(Ok(()));
        rx
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingUpdateOutcome {
    Acknowledged,
    TimedOut,
    Failed(String),
}

/// Send every changed type and wait for the acknowledgements.
///
/// `timeout` bounds the whole wait, not each type: once the deadline has
/// passed, only acknowledgements that already arrived are counted.
pub fn push_mapping_updates<'a>(
    updater: &dyn MappingUpdater,
    shard: &ShardId,
    doc_types: impl IntoIterator<Item = &'a String>,
    timeout: Duration,
) -> Vec<(String, MappingUpdateOutcome)> {
    let pending: Vec<_> = doc_types
        .into_iter()
        .map(|doc_type| (doc_type.clone(), updater.update_mapping(shard, doc_type)))
        .collect();

    let deadline = Instant::now() + timeout;
    let shard_name = shard.to_string();
    let timeout_ms = timeout.as_millis().to_string();
    pending
        .into_iter()
        .map(|(doc_type, ack)| {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let outcome = match ack.recv_timeout(remaining) {
                Ok(Ok(())) => MappingUpdateOutcome::Acknowledged,
                Ok(Err(reason)) => MappingUpdateOutcome::Failed(reason),
                Err(RecvTimeoutError::Timeout) => MappingUpdateOutcome::TimedOut,
                Err(RecvTimeoutError::Disconnected) => {
                    MappingUpdateOutcome::Failed("update abandoned without acknowledgement".into())
                }
            };
            match &outcome {
                MappingUpdateOutcome::Acknowledged => log_event(
                    Event::MappingUpdateAcknowledged,
                    &[("shard", shard_name.as_str()), ("type", doc_type.as_str())],
                ),
                MappingUpdateOutcome::TimedOut => log_event(
                    Event::MappingUpdateTimedOut,
                    &[
                        ("shard", shard_name.as_str()),
                        ("type", doc_type.as_str()),
                        ("timeout_ms", timeout_ms.as_str()),
                    ],
                ),
                MappingUpdateOutcome::Failed(reason) => log_event(
                    Event::MappingUpdateFailed,
                    &[
                        ("shard", shard_name.as_str()),
                        ("type", doc_type.as_str()),
                        ("reason", reason.as_str()),
                    ],
                ),
            }
            (doc_type, outcome)
        })
        .collect()
}
