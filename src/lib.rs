//! shardgate - shard local recovery, translog replay and primary-replica resync
//!
//! A shard copy is recovered from its own segment store and translog
//! (`recovery`), and after a primary promotion the new primary resends the
//! operations its replicas may have missed (`resync`).

pub mod cli;
pub mod config;
pub mod crash_point;
pub mod errors;
pub mod observability;
pub mod recovery;
pub mod resync;
pub mod seqno;
pub mod shard;
pub mod store;
pub mod translog;
