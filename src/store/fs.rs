//! Filesystem-backed segment store
//!
//! Layout of the store directory:
//! - `segments_<N>`: JSON commit point, highest N is the live commit
//! - `corrupted_<uuid>`: corruption marker holding the reason
//! - anything else: segment data files

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use super::commit::{commit_file_name, parse_commit_file_name, CommitPoint};
use super::errors::{StoreError, StoreResult};
use super::refcount::RefCount;
use super::{SegmentStore, StoreFile};

/// Prefix of corruption marker files
pub const CORRUPTION_MARKER_PREFIX: &str = "corrupted_";

const TEMP_SUFFIX: &str = ".tmp";

/// Segment store living in a single directory.
#[derive(Debug)]
pub struct FsSegmentStore {
    dir: PathBuf,
    refs: RefCount,
}

impl FsSegmentStore {
    /// Opens the store at `dir`, creating the directory if missing.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| StoreError::io(&dir, "failed to create store directory", e))?;
        Ok(Self {
            dir,
            refs: RefCount::new(),
        })
    }

    /// Drop the shard's own reference. Readers holding references keep the
    /// store usable until they release them.
    pub fn close(&self) {
        if self.refs.dec_ref() {
            debug!(store = %self.dir.display(), "store closed");
        }
    }

    pub fn ref_count(&self) -> usize {
        self.refs.ref_count()
    }

    /// Write a corruption marker. Subsequent `fail_if_corrupted` calls fail.
    pub fn mark_corrupted(&self, reason: &str) -> StoreResult<PathBuf> {
        let path = self
            .dir
            .join(format!("{}{}", CORRUPTION_MARKER_PREFIX, Uuid::new_v4().simple()));
        self.write_durably(&path, reason.as_bytes())?;
        warn!(store = %self.dir.display(), reason, "store marked as corrupted");
        Ok(path)
    }

    /// Write a new commit on top of the current one.
    ///
    /// The new commit gets the next generation and version.
    pub fn commit(
        &self,
        segments: Vec<String>,
        user_data: BTreeMap<String, String>,
    ) -> StoreResult<CommitPoint> {
        let previous = self.read_last_commit()?;
        let (generation, version) = match &previous {
            Some(c) => (c.generation + 1, c.version + 1),
            None => (1, 1),
        };
        let commit = CommitPoint {
            generation,
            version,
            segments,
            user_data,
        };
        let content = serde_json::to_vec_pretty(&commit).map_err(|e| StoreError::InvalidCommit {
            file: commit.file_name(),
            reason: format!("failed to serialize commit: {}", e),
        })?;
        self.write_durably(&self.dir.join(commit.file_name()), &content)?;
        debug!(
            store = %self.dir.display(),
            generation,
            version,
            "wrote commit point"
        );
        Ok(commit)
    }

    /// Write a file atomically: temp file, fsync, rename, directory fsync.
    fn write_durably(&self, path: &Path, content: &[u8]) -> StoreResult<()> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = self.dir.join(format!("{}{}", file_name, TEMP_SUFFIX));

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| StoreError::io(&temp_path, "failed to create temp file", e))?;
        file.write_all(content)
            .map_err(|e| StoreError::io(&temp_path, "failed to write temp file", e))?;
        file.sync_all()
            .map_err(|e| StoreError::io(&temp_path, "failed to fsync temp file", e))?;

        fs::rename(&temp_path, path)
            .map_err(|e| StoreError::io(path, "failed to rename temp file into place", e))?;

        sync_dir(&self.dir)
    }

    fn file_names(&self) -> StoreResult<Vec<String>> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| StoreError::io(&self.dir, "failed to list store directory", e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| StoreError::io(&self.dir, "failed to read directory entry", e))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if is_file {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Fsync a directory so a rename inside it is durable.
fn sync_dir(dir: &Path) -> StoreResult<()> {
    File::open(dir)
        .map_err(|e| StoreError::io(dir, "failed to open store directory for fsync", e))?
        .sync_all()
        .map_err(|e| StoreError::io(dir, "failed to fsync store directory", e))
}

impl SegmentStore for FsSegmentStore {
    fn path(&self) -> &Path {
        &self.dir
    }

    fn fail_if_corrupted(&self) -> StoreResult<()> {
        for name in self.file_names()? {
            if !name.starts_with(CORRUPTION_MARKER_PREFIX) || name.ends_with(TEMP_SUFFIX) {
                continue;
            }
            let path = self.dir.join(&name);
            let reason = fs::read_to_string(&path)
                .unwrap_or_else(|e| format!("unreadable corruption marker: {}", e));
            return Err(StoreError::Corrupted {
                marker: name,
                reason,
            });
        }
        Ok(())
    }

    fn list_files(&self) -> StoreResult<Vec<StoreFile>> {
        let mut files = Vec::new();
        for name in self.file_names()? {
            let path = self.dir.join(&name);
            let length = fs::metadata(&path)
                .map_err(|e| StoreError::io(&path, "failed to stat store file", e))?
                .len();
            files.push(StoreFile { name, length });
        }
        Ok(files)
    }

    fn read_last_commit(&self) -> StoreResult<Option<CommitPoint>> {
        let latest = self
            .file_names()?
            .into_iter()
            .filter_map(|name| parse_commit_file_name(&name))
            .max();

        let Some(generation) = latest else {
            return Ok(None);
        };

        let file = commit_file_name(generation);
        let path = self.dir.join(&file);
        let content = fs::read(&path).map_err(|e| StoreError::io(&path, "failed to read commit", e))?;
        let commit: CommitPoint =
            serde_json::from_slice(&content).map_err(|e| StoreError::InvalidCommit {
                file: file.clone(),
                reason: e.to_string(),
            })?;

        if commit.generation != generation {
            return Err(StoreError::InvalidCommit {
                file,
                reason: format!(
                    "commit records generation {} but file name says {}",
                    commit.generation, generation
                ),
            });
        }
        Ok(Some(commit))
    }

    fn write_empty_commit(&self, user_data: BTreeMap<String, String>) -> StoreResult<CommitPoint> {
        let commit = self.commit(Vec::new(), user_data)?;
        let keep = commit.file_name();

        for name in self.file_names()? {
            if name == keep || name.starts_with(CORRUPTION_MARKER_PREFIX) {
                continue;
            }
            let path = self.dir.join(&name);
            fs::remove_file(&path)
                .map_err(|e| StoreError::io(&path, "failed to remove stale store file", e))?;
        }
        debug!(store = %self.dir.display(), generation = commit.generation, "wrote empty commit");
        Ok(commit)
    }

    fn try_inc_ref(&self) -> bool {
        self.refs.try_inc_ref()
    }

    fn dec_ref(&self) {
        if self.refs.dec_ref() {
            debug!(store = %self.dir.display(), "last store reference released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{StoreRef, TRANSLOG_GENERATION_KEY};
    use tempfile::TempDir;

    fn user_data(generation: u64) -> BTreeMap<String, String> {
        let mut data = BTreeMap::new();
        data.insert(TRANSLOG_GENERATION_KEY.to_string(), generation.to_string());
        data
    }

    #[test]
    fn test_empty_store_has_no_commit() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsSegmentStore::open(temp_dir.path().join("index")).unwrap();

        assert!(store.read_last_commit().unwrap().is_none());
        assert!(store.read_last_commit_user_data().unwrap().is_empty());
        assert!(store.list_files().unwrap().is_empty());
    }

    #[test]
    fn test_commit_generations_increase() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsSegmentStore::open(temp_dir.path()).unwrap();

        let first = store.commit(vec!["_0.seg".into()], user_data(1)).unwrap();
        let second = store.commit(vec!["_1.seg".into()], user_data(2)).unwrap();

        assert_eq!(first.generation, 1);
        assert_eq!(second.generation, 2);
        assert_eq!(second.version, 2);

        let last = store.read_last_commit().unwrap().unwrap();
        assert_eq!(last, second);
        assert_eq!(last.translog_generation().unwrap(), 2);
    }

    #[test]
    fn test_corruption_marker_detected() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsSegmentStore::open(temp_dir.path()).unwrap();
        assert!(store.fail_if_corrupted().is_ok());

        store.mark_corrupted("checksum mismatch in _0.seg").unwrap();

        let err = store.fail_if_corrupted().unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_garbage_commit_is_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsSegmentStore::open(temp_dir.path()).unwrap();
        fs::write(temp_dir.path().join("segments_4"), b"{not json").unwrap();

        let err = store.read_last_commit().unwrap_err();
        assert_eq!(err.code(), "SHARD_STORE_INVALID_COMMIT");
    }

    #[test]
    fn test_write_empty_commit_wipes_old_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsSegmentStore::open(temp_dir.path()).unwrap();
        fs::write(temp_dir.path().join("_0.seg"), b"segment").unwrap();
        store.commit(vec!["_0.seg".into()], user_data(7)).unwrap();

        let empty = store.write_empty_commit(BTreeMap::new()).unwrap();

        let files = store.list_files().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, empty.file_name());
        assert!(empty.segments.is_empty());
    }

    #[test]
    fn test_list_files_reports_lengths() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsSegmentStore::open(temp_dir.path()).unwrap();
        fs::write(temp_dir.path().join("_0.seg"), vec![0u8; 42]).unwrap();

        let files = store.list_files().unwrap();
        assert_eq!(
            files,
            vec![StoreFile {
                name: "_0.seg".into(),
                length: 42
            }]
        );
    }

    #[test]
    fn test_directory_sync_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        assert!(sync_dir(temp_dir.path()).is_ok());

        let err = sync_dir(&temp_dir.path().join("gone")).unwrap_err();
        assert_eq!(err.code(), "SHARD_STORE_IO_ERROR");
        assert!(err.to_string().contains("fsync"));
    }

    #[test]
    fn test_commit_fails_when_store_directory_is_gone() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsSegmentStore::open(temp_dir.path().join("index")).unwrap();
        fs::remove_dir_all(temp_dir.path().join("index")).unwrap();

        let err = store.commit(Vec::new(), user_data(1)).unwrap_err();
        assert_eq!(err.code(), "SHARD_STORE_IO_ERROR");
    }

    #[test]
    fn test_store_ref_released_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsSegmentStore::open(temp_dir.path()).unwrap();
        {
            let _guard = StoreRef::acquire(&store).unwrap();
            assert_eq!(store.ref_count(), 2);
        }
        assert_eq!(store.ref_count(), 1);

        store.close();
        assert!(StoreRef::acquire(&store).is_err());
    }
}
