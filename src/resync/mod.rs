//! Primary-replica resync
//!
//! Run once after a replica is promoted to primary so that every surviving
//! replica converges on the new primary's history.

mod errors;
mod request;
mod source;
mod syncer;
mod task;

pub use errors::{ReplicationFailure, ResyncError, ResyncResult};
pub use request::{ResyncReplicationRequest, ResyncReplicationResponse};
pub use source::{OperationHistory, ResyncReplication, ResyncSource, TranslogResyncSource};
pub use syncer::{ResyncCoordinator, DEFAULT_CHUNK_SIZE};
pub use task::{phase, ResyncTask, Status, TaskManager};
