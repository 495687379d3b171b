//! Shard configuration
//!
//! Loaded from a JSON file. Every field except `data_dir` has a default:
//!
//! ```json
//! {
//!   "data_dir": "/var/lib/shardgate/logs-0",
//!   "translog_sync_interval_ms": 5000,
//!   "resync_chunk_size_bytes": 524288
//! }
//! ```
//!
//! The store lives at `<data_dir>/index`. Appends go to the first translog
//! location, `<data_dir>/translog` unless `translog_locations` names others.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shard::ShardId;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "SHARD_CONFIG_UNREADABLE",
            ConfigError::Parse(_) => "SHARD_CONFIG_PARSE_ERROR",
            ConfigError::Invalid(_) => "SHARD_CONFIG_INVALID",
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Per-shard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardConfig {
    /// Shard root directory (required)
    pub data_dir: PathBuf,

    /// Index name the shard belongs to
    #[serde(default = "default_index")]
    pub index: String,

    /// Shard number within the index
    #[serde(default)]
    pub shard: u32,

    /// Translog directories; empty means `<data_dir>/translog`
    #[serde(default)]
    pub translog_locations: Vec<PathBuf>,

    /// Periodic fsync interval, 0 syncs every append
    #[serde(default = "default_translog_sync_interval_ms")]
    pub translog_sync_interval_ms: u64,

    /// Bounded wait for each post-recovery mapping update
    #[serde(default = "default_wait_for_mapping_update_ms")]
    pub wait_for_mapping_update_post_recovery_ms: u64,

    /// Upper bound on the serialized size of one resync request
    #[serde(default = "default_resync_chunk_size_bytes")]
    pub resync_chunk_size_bytes: usize,

    /// Attempts to rename the translog before replay
    #[serde(default = "default_translog_rename_retries")]
    pub translog_rename_retries: u32,
}

fn default_index() -> String {
    "index".to_string()
}
fn default_translog_sync_interval_ms() -> u64 {
    5_000
}
fn default_wait_for_mapping_update_ms() -> u64 {
    30_000
}
fn default_resync_chunk_size_bytes() -> usize {
    512 * 1024
}
fn default_translog_rename_retries() -> u32 {
    3
}

impl ShardConfig {
    /// Configuration with defaults for everything but the data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            index: default_index(),
            shard: 0,
            translog_locations: Vec::new(),
            translog_sync_interval_ms: default_translog_sync_interval_ms(),
            wait_for_mapping_update_post_recovery_ms: default_wait_for_mapping_update_ms(),
            resync_chunk_size_bytes: default_resync_chunk_size_bytes(),
            translog_rename_retries: default_translog_rename_retries(),
        }
    }

    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ShardConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir must not be empty".into()));
        }
        if self.resync_chunk_size_bytes == 0 {
            return Err(ConfigError::Invalid("resync_chunk_size_bytes must be > 0".into()));
        }
        if self.translog_rename_retries == 0 {
            return Err(ConfigError::Invalid("translog_rename_retries must be > 0".into()));
        }
        if self.index.is_empty() {
            return Err(ConfigError::Invalid("index must not be empty".into()));
        }
        Ok(())
    }

    pub fn shard_id(&self) -> ShardId {
        ShardId::new(self.index.clone(), self.shard)
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("index")
    }

    /// Translog directories, the first one receives appends
    pub fn translog_paths(&self) -> Vec<PathBuf> {
        if self.translog_locations.is_empty() {
            vec![self.data_dir.join("translog")]
        } else {
            self.translog_locations.clone()
        }
    }

    /// `None` when every append is fsynced
    pub fn translog_sync_interval(&self) -> Option<Duration> {
        match self.translog_sync_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn mapping_update_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_for_mapping_update_post_recovery_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_applied() {
        let config: ShardConfig = serde_json::from_str(r#"{"data_dir": "/tmp/shard"}"#).unwrap();
        config.validate().unwrap();

        assert_eq!(config.translog_sync_interval_ms, 5000);
        assert_eq!(config.wait_for_mapping_update_post_recovery_ms, 30000);
        assert_eq!(config.resync_chunk_size_bytes, 524288);
        assert_eq!(config.translog_rename_retries, 3);
        assert_eq!(config.translog_paths(), vec![PathBuf::from("/tmp/shard/translog")]);
        assert_eq!(config.store_path(), PathBuf::from("/tmp/shard/index"));
        assert_eq!(config.shard_id().to_string(), "[index][0]");
    }

    #[test]
    fn test_zero_sync_interval_means_sync_each_append() {
        let mut config = ShardConfig::new("/tmp/shard");
        config.translog_sync_interval_ms = 0;
        assert_eq!(config.translog_sync_interval(), None);
    }

    #[test]
    fn test_validation_rejects_zero_chunk() {
        let mut config = ShardConfig::new("/tmp/shard");
        config.resync_chunk_size_bytes = 0;
        assert_eq!(config.validate().unwrap_err().code(), "SHARD_CONFIG_INVALID");
    }

    #[test]
    fn test_validation_rejects_zero_retries_and_empty_dir() {
        let mut config = ShardConfig::new("/tmp/shard");
        config.translog_rename_retries = 0;
        assert!(config.validate().is_err());
        assert!(ShardConfig::new("").validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shard.json");
        fs::write(
            &path,
            r#"{"data_dir": "/data", "index": "logs", "shard": 2, "translog_locations": ["/a", "/b"]}"#,
        )
        .unwrap();

        let config = ShardConfig::load(&path).unwrap();
        assert_eq!(config.shard_id(), ShardId::new("logs", 2));
        assert_eq!(config.translog_paths().len(), 2);
    }

    #[test]
    fn test_load_errors() {
        let temp_dir = TempDir::new().unwrap();
        let missing = ShardConfig::load(&temp_dir.path().join("none.json")).unwrap_err();
        assert_eq!(missing.code(), "SHARD_CONFIG_UNREADABLE");

        let path = temp_dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(ShardConfig::load(&path).unwrap_err().code(), "SHARD_CONFIG_PARSE_ERROR");
    }
}
