//! Segment store
//!
//! The durable container of immutable index segments for one shard copy.
//! Recovery consumes it through a narrow interface: a corruption check,
//! file listing, and the last commit point with its user data.
//!
//! # Invariants
//!
//! - A store holding a corruption marker is never read for recovery
//! - Commit points are written atomically (temp file, fsync, rename)
//! - Every reader holds a reference for as long as it touches files

mod commit;
mod errors;
mod fs;
mod refcount;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use commit::{
    commit_file_name, parse_commit_file_name, CommitPoint, SegmentStoreState,
    LEGACY_TRANSLOG_ID_KEY, TRANSLOG_GENERATION_KEY,
};
pub use errors::{StoreError, StoreResult};
pub use fs::{FsSegmentStore, CORRUPTION_MARKER_PREFIX};
pub use refcount::{RefCount, StoreRef};

/// A file in the store and its length in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreFile {
    pub name: String,
    pub length: u64,
}

/// Durable segment store collaborator.
pub trait SegmentStore: Send + Sync {
    /// Directory backing this store
    fn path(&self) -> &Path;

    /// Fail with `StoreError::Corrupted` if the store has been marked corrupted.
    fn fail_if_corrupted(&self) -> StoreResult<()>;

    /// All files currently in the store, sorted by name.
    fn list_files(&self) -> StoreResult<Vec<StoreFile>>;

    /// The most recent commit point, or `None` if the store holds no commit.
    fn read_last_commit(&self) -> StoreResult<Option<CommitPoint>>;

    /// User data of the most recent commit (empty if there is none).
    fn read_last_commit_user_data(&self) -> StoreResult<BTreeMap<String, String>> {
        Ok(self
            .read_last_commit()?
            .map(|commit| commit.user_data)
            .unwrap_or_default())
    }

    /// Replace whatever the store holds with an empty commit.
    fn write_empty_commit(&self, user_data: BTreeMap<String, String>) -> StoreResult<CommitPoint>;

    /// Take a reference; false once the store is closed.
    fn try_inc_ref(&self) -> bool;

    /// Release a reference taken with `try_inc_ref`.
    fn dec_ref(&self);
}
