//! Local shard recovery
//!
//! Brings a shard copy back from its own store and translog: verify the
//! store, find the translog generation of the last commit, replay it
//! through the engine, and report progress.
//!
//! # Rules
//!
//! - A corrupted store is never recovered from
//! - An empty store is never mistaken for a shard that should hold data
//! - A torn tail record ends replay; any other log damage is fatal
//! - Bad documents are skipped, every other apply failure is fatal
//! - Mapping update timeouts are logged, never fatal

mod engine;
mod errors;
mod gateway;
mod mapping;
mod notifier;
mod state;

pub use engine::{
    ApplyError, ApplyOutcome, Engine, FailureStatus, InMemoryEngine, DEFAULT_DOC_TYPE,
};
pub use errors::{RecoveryError, RecoveryResult};
pub use gateway::{RecoveryCoordinator, RecoveryOptions};
pub use mapping::{
    push_mapping_updates, MappingAck, MappingUpdateOutcome, MappingUpdater, NoopMappingUpdater,
};
pub use notifier::{NoopNotifier, ShardStateNotifier};
pub use state::{FileDetail, IndexDetails, RecoveryState, Stage, StageTiming, TranslogDetails};
