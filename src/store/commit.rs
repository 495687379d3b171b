//! Commit points and the store state derived from them
//!
//! A commit point is the durable record of which segments make up the index,
//! plus free-form user data. Recovery reads exactly one value from the user
//! data: the translog generation holding operations not yet in the commit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::errors::{StoreError, StoreResult};

/// User-data key recording the translog generation of a commit
pub const TRANSLOG_GENERATION_KEY: &str = "translog_generation";

/// Key used by stores written before the generation key existed
pub const LEGACY_TRANSLOG_ID_KEY: &str = "translog_id";

/// A durable commit point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPoint {
    /// Commit file generation (`segments_<generation>`)
    pub generation: u64,
    /// Monotonic index version
    pub version: u64,
    /// Segment files referenced by this commit
    #[serde(default)]
    pub segments: Vec<String>,
    /// Free-form commit user data
    #[serde(default)]
    pub user_data: BTreeMap<String, String>,
}

impl CommitPoint {
    /// Name of the file holding this commit
    pub fn file_name(&self) -> String {
        commit_file_name(self.generation)
    }

    /// Resolve the translog generation recorded in this commit.
    ///
    /// Lookup order: `translog_generation`, then legacy `translog_id`, then the
    /// commit version for stores that predate explicit generation tracking.
    pub fn translog_generation(&self) -> StoreResult<u64> {
        for key in [TRANSLOG_GENERATION_KEY, LEGACY_TRANSLOG_ID_KEY] {
            if let Some(raw) = self.user_data.get(key) {
                return raw.trim().parse::<u64>().map_err(|e| StoreError::InvalidCommit {
                    file: self.file_name(),
                    reason: format!("unparsable {} '{}': {}", key, raw, e),
                });
            }
        }
        Ok(self.version)
    }

    /// Immutable snapshot used by recovery
    pub fn store_state(&self) -> StoreResult<SegmentStoreState> {
        Ok(SegmentStoreState {
            version: self.version,
            translog_generation: Some(self.translog_generation()?),
        })
    }
}

/// Snapshot of the store read once at recovery start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentStoreState {
    pub version: u64,
    pub translog_generation: Option<u64>,
}

impl SegmentStoreState {
    /// State of a store with no usable commit
    pub fn fresh() -> Self {
        Self {
            version: 0,
            translog_generation: None,
        }
    }
}

/// File name of the commit with the given generation
pub fn commit_file_name(generation: u64) -> String {
    format!("segments_{}", generation)
}

/// Parse a commit file name back into its generation
pub fn parse_commit_file_name(name: &str) -> Option<u64> {
    name.strip_prefix("segments_")?.parse().ok()
}
