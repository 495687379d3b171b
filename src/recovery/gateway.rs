//! Local shard recovery
//!
//! # Sequence
//!
//! 1. Take a store reference for the whole recovery
//! 2. INDEX: fail on a corruption marker; inspect the last commit
//!    - no commit, data expected: fail, never treat as a new shard
//!    - no commit, none expected: write an empty commit, START -> DONE
//!    - commit, none expected: dangling data, wipe it, START -> DONE
//! 3. START: resolve the translog generation from the commit user data
//! 4. Claim `translog-<g>` for replay; nothing to claim means START -> DONE
//! 5. TRANSLOG: replay into the engine in seq_no order, re-appending every
//!    applied operation to a fresh `translog-<g>`
//!    - bad documents are logged and skipped
//!    - a torn tail record ends the replay
//!    - anything else deletes the fresh file, keeps `.recovering`, fails
//! 6. Delete `.recovering`, finalize the engine, push mapping updates
//!
//! After a successful recovery `translog-<g>` is open for appends.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::engine::Engine;
use super::errors::{RecoveryError, RecoveryResult};
use super::mapping::{push_mapping_updates, MappingUpdater, NoopMappingUpdater};
use super::notifier::{NoopNotifier, ShardStateNotifier};
use super::state::{RecoveryState, Stage};
use crate::config::ShardConfig;
use crate::crash_point::{maybe_crash, points};
use crate::observability::{log_event, Event, ObservationScope};
use crate::seqno::NO_OPS_PERFORMED;
use crate::shard::{IndexShardState, ShardLifecycle};
use crate::store::{SegmentStore, StoreRef, TRANSLOG_GENERATION_KEY};
use crate::translog::{RecoveringHandle, Translog};

/// Tunables of a local recovery
#[derive(Debug, Clone)]
pub struct RecoveryOptions {
    /// Rename attempts when claiming the translog
    pub rename_retries: u32,
    /// Bounded wait per mapping update acknowledgement
    pub mapping_update_timeout: Duration,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            rename_retries: 3,
            mapping_update_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&ShardConfig> for RecoveryOptions {
    fn from(config: &ShardConfig) -> Self {
        Self {
            rename_retries: config.translog_rename_retries,
            mapping_update_timeout: config.mapping_update_timeout(),
        }
    }
}

/// Recovers one shard copy from its local store and translog
pub struct RecoveryCoordinator {
    lifecycle: Arc<ShardLifecycle>,
    store: Arc<dyn SegmentStore>,
    translog: Arc<Translog>,
    notifier: Arc<dyn ShardStateNotifier>,
    mapping_updater: Arc<dyn MappingUpdater>,
    options: RecoveryOptions,
}

impl RecoveryCoordinator {
    pub fn new(
        lifecycle: Arc<ShardLifecycle>,
        store: Arc<dyn SegmentStore>,
        translog: Arc<Translog>,
    ) -> Self {
        Self {
            lifecycle,
            store,
            translog,
            notifier: Arc::new(NoopNotifier),
            mapping_updater: Arc::new(NoopMappingUpdater),
            options: RecoveryOptions::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ShardStateNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_mapping_updater(mut self, updater: Arc<dyn MappingUpdater>) -> Self {
        self.mapping_updater = updater;
        self
    }

    pub fn with_options(mut self, options: RecoveryOptions) -> Self {
        self.options = options;
        self
    }

    /// Run local recovery.
    ///
    /// `index_should_exist` states whether the shard is expected to hold
    /// data from before this start.
    ///
    /// On success the shard is in `PostRecovery` and the returned state is
    /// `DONE`.
    pub fn recover(
        &self,
        engine: &mut dyn Engine,
        index_should_exist: bool,
    ) -> RecoveryResult<RecoveryState> {
        let shard = self.lifecycle.shard_id().clone();
        if self.lifecycle.transition(IndexShardState::Recovering).is_none() {
            return Err(RecoveryError::ShardClosed { shard });
        }

        let scope = ObservationScope::new(
            Event::RecoveryStart,
            Event::RecoveryComplete,
            Event::RecoveryFailed,
            vec![
                ("shard", shard.to_string()),
                ("index_should_exist", index_should_exist.to_string()),
            ],
        );

        let mut state = RecoveryState::new(shard.clone());
        match self.run(&mut state, engine, index_should_exist) {
            Ok(()) => {
                if self.lifecycle.transition(IndexShardState::PostRecovery).is_none() {
                    scope.fail("shard closed");
                    return Err(RecoveryError::ShardClosed { shard });
                }
                let recovered = state.translog().recovered_operations.to_string();
                let skipped = state.translog().skipped_operations.to_string();
                scope.complete(&[
                    ("recovered_operations", recovered.as_str()),
                    ("skipped_operations", skipped.as_str()),
                ]);
                Ok(state)
            }
            Err(e) => {
                scope.fail(&format!("[{}] {}", e.code(), e));
                Err(e)
            }
        }
    }

    fn run(
        &self,
        state: &mut RecoveryState,
        engine: &mut dyn Engine,
        index_should_exist: bool,
    ) -> RecoveryResult<()> {
        let store_ref = StoreRef::acquire(self.store.as_ref())?;
        let store = store_ref.store();
        let shard = self.lifecycle.shard_id().clone();

        self.enter(state, Stage::Index)?;
        if let Err(e) = store.fail_if_corrupted() {
            if e.is_corruption() {
                return Err(RecoveryError::CorruptStore { shard, source: e });
            }
            return Err(e.into());
        }

        let last_commit = store.read_last_commit()?;
        match store.list_files() {
            Ok(files) => {
                for file in files {
                    state.add_file(file.name, file.length, true)?;
                }
            }
            Err(e) => debug!(shard = %shard, error = %e, "failed to list store files"),
        }

        let commit = match last_commit {
            None if index_should_exist => {
                return Err(RecoveryError::MissingData {
                    shard,
                    reason: format!("no commit point found in {}", store.path().display()),
                });
            }
            None => {
                self.start_fresh(state, store, Event::RecoveryEmptyCommit)?;
                return Ok(());
            }
            Some(_) if !index_should_exist => {
                self.start_fresh(state, store, Event::RecoveryDanglingDataCleaned)?;
                return Ok(());
            }
            Some(commit) => commit,
        };

        state.set_version(Some(commit.version))?;
        self.enter(state, Stage::Start)?;
        let generation = commit.translog_generation()?;
        state.set_translog_generation(generation)?;
        self.ensure_open()?;

        let Some(handle) = self
            .translog
            .mark_recovering(generation, self.options.rename_retries)?
        else {
            debug!(shard = %shard, generation, "no translog to replay");
            self.translog.create_generation(generation)?;
            self.enter(state, Stage::Done)?;
            self.notifier.on_checkpoint(&shard, NO_OPS_PERFORMED);
            return Ok(());
        };
        maybe_crash(points::RECOVERY_AFTER_CLAIM);

        self.enter(state, Stage::Translog)?;
        let generation_str = generation.to_string();
        log_event(
            Event::TranslogReplayBegin,
            &[
                ("shard", shard.to_string().as_str()),
                ("generation", generation_str.as_str()),
                ("resumed", if handle.was_resumed() { "true" } else { "false" }),
            ],
        );

        if let Err(e) = self.replay_and_finalize(&handle, state, engine) {
            if let Err(delete_err) = self.translog.close_with_delete() {
                warn!(shard = %shard, error = %delete_err, "failed to delete translog after failed replay");
            }
            handle.retain();
            return Err(e);
        }

        if let Err(e) = handle.complete() {
            warn!(shard = %shard, error = %e, "failed to delete recovering translog");
        }

        let types = state.translog().mapping_updates.clone();
        if !types.is_empty() {
            push_mapping_updates(
                self.mapping_updater.as_ref(),
                &shard,
                &types,
                self.options.mapping_update_timeout,
            );
        }

        let last_seq_no = state.translog().last_seq_no;
        self.enter(state, Stage::Done)?;
        self.notifier.on_checkpoint(&shard, last_seq_no);
        Ok(())
    }

    /// Replay the claimed file, make the re-appended copy durable and
    /// finalize the engine. Any error here leaves the claim to the caller.
    fn replay_and_finalize(
        &self,
        handle: &RecoveringHandle,
        state: &mut RecoveryState,
        engine: &mut dyn Engine,
    ) -> RecoveryResult<()> {
        let shard = self.lifecycle.shard_id().to_string();
        self.translog.create_generation(handle.generation())?;

        let mut reader = handle.open_reader()?;
        while let Some(op) = reader.next_operation()? {
            self.ensure_open()?;
            match engine.apply_operation(&op) {
                Ok(outcome) => {
                    self.translog.append(&op)?;
                    state.record_replayed(op.seq_no())?;
                    if let Some(doc_type) = outcome.mapping_update {
                        state.record_mapping_update(doc_type)?;
                    }
                }
                Err(e) if e.is_skippable() => {
                    let seq_no = op.seq_no().to_string();
                    let reason = e.to_string();
                    log_event(
                        Event::TranslogEntrySkipped,
                        &[
                            ("shard", shard.as_str()),
                            ("seq_no", seq_no.as_str()),
                            ("id", op.id()),
                            ("reason", reason.as_str()),
                        ],
                    );
                    state.record_skipped()?;
                }
                Err(e) => {
                    return Err(RecoveryError::ReplayFailed {
                        seq_no: op.seq_no(),
                        source: e,
                    })
                }
            }
        }

        if let Some(offset) = reader.truncated_at() {
            let offset = offset.to_string();
            log_event(
                Event::TranslogTruncatedTail,
                &[("shard", shard.as_str()), ("offset", offset.as_str())],
            );
            state.set_truncated_tail()?;
        }
        maybe_crash(points::RECOVERY_AFTER_REPLAY);

        self.translog.sync()?;
        engine
            .finalize_recovery()
            .map_err(|source| RecoveryError::ReplayFailed {
                seq_no: state.translog().last_seq_no,
                source,
            })?;

        let recovered = state.translog().recovered_operations.to_string();
        let skipped = state.translog().skipped_operations.to_string();
        log_event(
            Event::TranslogReplayComplete,
            &[
                ("shard", shard.as_str()),
                ("recovered_operations", recovered.as_str()),
                ("skipped_operations", skipped.as_str()),
            ],
        );
        Ok(())
    }

    /// Replace whatever the store holds with an empty commit pointing at a
    /// translog generation no existing file uses.
    fn start_fresh(
        &self,
        state: &mut RecoveryState,
        store: &dyn SegmentStore,
        event: Event,
    ) -> RecoveryResult<()> {
        let generation = self
            .translog
            .list_generations()?
            .last()
            .map(|g| g + 1)
            .unwrap_or(1);
        let mut user_data = BTreeMap::new();
        user_data.insert(TRANSLOG_GENERATION_KEY.to_string(), generation.to_string());
        let commit = store.write_empty_commit(user_data)?;

        let shard = self.lifecycle.shard_id().to_string();
        let generation_str = generation.to_string();
        log_event(
            event,
            &[("shard", shard.as_str()), ("generation", generation_str.as_str())],
        );

        state.set_version(Some(commit.version))?;
        self.enter(state, Stage::Start)?;
        state.set_translog_generation(generation)?;
        self.translog.create_generation(generation)?;
        self.enter(state, Stage::Done)?;
        self.notifier
            .on_checkpoint(self.lifecycle.shard_id(), NO_OPS_PERFORMED);
        Ok(())
    }

    fn enter(&self, state: &mut RecoveryState, stage: Stage) -> RecoveryResult<()> {
        state.set_stage(stage)?;
        let shard = self.lifecycle.shard_id();
        log_event(
            Event::RecoveryStageChanged,
            &[("shard", shard.to_string().as_str()), ("stage", stage.as_str())],
        );
        self.notifier.on_stage(shard, stage);
        Ok(())
    }

    fn ensure_open(&self) -> RecoveryResult<()> {
        if self.lifecycle.is_closed() {
            return Err(RecoveryError::ShardClosed {
                shard: self.lifecycle.shard_id().clone(),
            });
        }
        Ok(())
    }
}
