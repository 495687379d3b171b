//! Recovery progress
//!
//! Stage machine:
//!
//! ```text
//! NOT_STARTED -> INDEX -> START -> TRANSLOG -> DONE
//!                           \________________/
//! ```
//!
//! Stages never move backward and `TRANSLOG` is the only stage that may be
//! skipped. Mutation is crate-internal: the coordinator owns the state for
//! the duration of one recovery and hands it out read-only once done.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::errors::{RecoveryError, RecoveryResult};
use crate::seqno::{SeqNo, NO_OPS_PERFORMED};
use crate::shard::ShardId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    NotStarted,
    /// Inspecting the store
    Index,
    /// Store verified, engine about to start
    Start,
    /// Replaying the translog
    Translog,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::NotStarted => "NOT_STARTED",
            Stage::Index => "INDEX",
            Stage::Start => "START",
            Stage::Translog => "TRANSLOG",
            Stage::Done => "DONE",
        }
    }

    fn can_move_to(self, next: Stage) -> bool {
        matches!(
            (self, next),
            (Stage::NotStarted, Stage::Index)
                | (Stage::Index, Stage::Start)
                | (Stage::Start, Stage::Translog)
                | (Stage::Start, Stage::Done)
                | (Stage::Translog, Stage::Done)
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A store file seen during the index stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDetail {
    pub name: String,
    pub length: u64,
    /// Local recovery reuses every file it finds
    pub reused: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexDetails {
    /// Commit version, `None` for a fresh store
    pub version: Option<u64>,
    pub files: Vec<FileDetail>,
    pub total_bytes: u64,
    pub reused_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranslogDetails {
    pub generation: Option<u64>,
    /// Operations applied and re-appended
    pub recovered_operations: u64,
    /// Operations skipped as bad documents
    pub skipped_operations: u64,
    /// Highest replayed seq_no
    pub last_seq_no: SeqNo,
    /// Document types whose mapping changed during replay
    pub mapping_updates: BTreeSet<String>,
    /// True if the replayed file ended in a partially written record
    pub truncated_tail: bool,
}

impl Default for TranslogDetails {
    fn default() -> Self {
        Self {
            generation: None,
            recovered_operations: 0,
            skipped_operations: 0,
            last_seq_no: NO_OPS_PERFORMED,
            mapping_updates: BTreeSet::new(),
            truncated_tail: false,
        }
    }
}

/// When a stage started and how long it took
#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub started_at: DateTime<Utc>,
    /// Set once the next stage begins
    pub took_ms: Option<i64>,
}

/// Progress of one local recovery
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryState {
    shard_id: ShardId,
    stage: Stage,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    timings: Vec<StageTiming>,
    index: IndexDetails,
    translog: TranslogDetails,
}

impl RecoveryState {
    pub fn new(shard_id: ShardId) -> Self {
        Self {
            shard_id,
            stage: Stage::NotStarted,
            started_at: Utc::now(),
            finished_at: None,
            timings: Vec::new(),
            index: IndexDetails::default(),
            translog: TranslogDetails::default(),
        }
    }

    pub fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn timings(&self) -> &[StageTiming] {
        &self.timings
    }

    pub fn index(&self) -> &IndexDetails {
        &self.index
    }

    pub fn translog(&self) -> &TranslogDetails {
        &self.translog
    }

    /// Total time from creation to `DONE`
    pub fn took_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub(crate) fn set_stage(&mut self, next: Stage) -> RecoveryResult<()> {
        if !self.stage.can_move_to(next) {
            return Err(RecoveryError::InvalidStage {
                from: self.stage,
                to: next,
            });
        }
        let now = Utc::now();
        if let Some(last) = self.timings.last_mut() {
            last.took_ms = Some((now - last.started_at).num_milliseconds());
        }
        self.stage = next;
        if next == Stage::Done {
            self.finished_at = Some(now);
        } else {
            self.timings.push(StageTiming {
                stage: next,
                started_at: now,
                took_ms: None,
            });
        }
        Ok(())
    }

    fn ensure_open(&self) -> RecoveryResult<()> {
        if self.is_done() {
            return Err(RecoveryError::InvalidStage {
                from: Stage::Done,
                to: Stage::Done,
            });
        }
        Ok(())
    }

    pub(crate) fn set_version(&mut self, version: Option<u64>) -> RecoveryResult<()> {
        self.ensure_open()?;
        self.index.version = version;
        Ok(())
    }

    pub(crate) fn add_file(&mut self, name: String, length: u64, reused: bool) -> RecoveryResult<()> {
        self.ensure_open()?;
        self.index.total_bytes += length;
        if reused {
            self.index.reused_bytes += length;
        }
        self.index.files.push(FileDetail { name, length, reused });
        Ok(())
    }

    pub(crate) fn set_translog_generation(&mut self, generation: u64) -> RecoveryResult<()> {
        self.ensure_open()?;
        self.translog.generation = Some(generation);
        Ok(())
    }

    pub(crate) fn record_replayed(&mut self, seq_no: SeqNo) -> RecoveryResult<()> {
        self.ensure_open()?;
        self.translog.recovered_operations += 1;
        self.translog.last_seq_no = self.translog.last_seq_no.max(seq_no);
        Ok(())
    }

    pub(crate) fn record_skipped(&mut self) -> RecoveryResult<()> {
        self.ensure_open()?;
        self.translog.skipped_operations += 1;
        Ok(())
    }

    pub(crate) fn record_mapping_update(&mut self, doc_type: String) -> RecoveryResult<()> {
        self.ensure_open()?;
        self.translog.mapping_updates.insert(doc_type);
        Ok(())
    }

    pub(crate) fn set_truncated_tail(&mut self) -> RecoveryResult<()> {
        self.ensure_open()?;
        self.translog.truncated_tail = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> RecoveryState {
        RecoveryState::new(ShardId::new("idx", 0))
    }

    #[test]
    fn test_full_stage_sequence() {
        let mut state = state();
        for stage in [Stage::Index, Stage::Start, Stage::Translog, Stage::Done] {
            state.set_stage(stage).unwrap();
        }
        assert!(state.is_done());
        assert_eq!(state.timings().len(), 3);
        assert!(state.timings().iter().all(|t| t.took_ms.is_some()));
        assert!(state.took_ms().is_some());
    }

    #[test]
    fn test_translog_stage_can_be_skipped() {
        let mut state = state();
        state.set_stage(Stage::Index).unwrap();
        state.set_stage(Stage::Start).unwrap();
        state.set_stage(Stage::Done).unwrap();
        assert_eq!(state.stage(), Stage::Done);
    }

    #[test]
    fn test_stages_never_move_backward() {
        let mut state = state();
        state.set_stage(Stage::Index).unwrap();
        state.set_stage(Stage::Start).unwrap();

        let err = state.set_stage(Stage::Index).unwrap_err();
        assert!(matches!(
            err,
            RecoveryError::InvalidStage {
                from: Stage::Start,
                to: Stage::Index
            }
        ));
        assert!(state.set_stage(Stage::Start).is_err());
    }

    #[test]
    fn test_index_and_start_cannot_be_skipped() {
        let mut state = state();
        assert!(state.set_stage(Stage::Start).is_err());
        state.set_stage(Stage::Index).unwrap();
        assert!(state.set_stage(Stage::Done).is_err());
    }

    #[test]
    fn test_read_only_once_done() {
        let mut state = state();
        state.set_stage(Stage::Index).unwrap();
        state.add_file("segments_1".into(), 10, true).unwrap();
        state.set_stage(Stage::Start).unwrap();
        state.set_stage(Stage::Done).unwrap();

        assert!(state.add_file("late".into(), 1, true).is_err());
        assert!(state.record_replayed(3).is_err());
        assert!(state.set_stage(Stage::Done).is_err());
        assert_eq!(state.index().total_bytes, 10);
    }

    #[test]
    fn test_json_shape() {
        let mut state = state();
        state.set_stage(Stage::Index).unwrap();
        state.set_version(Some(4)).unwrap();
        state.set_stage(Stage::Start).unwrap();
        state.set_stage(Stage::Translog).unwrap();
        state.set_translog_generation(2).unwrap();
        state.record_replayed(0).unwrap();
        state.record_replayed(1).unwrap();
        state.record_skipped().unwrap();

        let json = state.to_json();
        assert_eq!(json["stage"], "TRANSLOG");
        assert_eq!(json["index"]["version"], 4);
        assert_eq!(json["translog"]["recovered_operations"], 2);
        assert_eq!(json["translog"]["skipped_operations"], 1);
        assert_eq!(json["translog"]["last_seq_no"], 1);
        assert_eq!(json["shard_id"]["index"], "idx");
    }
}
