//! Translog writer
//!
//! A `Translog` owns at most one open generation at a time. Appends go to
//! `translog-<generation>` in the first configured location; the remaining
//! locations are only searched when looking for files to replay.
//!
//! Durability modes:
//! - sync on each operation: every append is followed by fsync
//! - deferred: appends reach the OS, a `TranslogSyncScheduler` fsyncs periodically
//!
//! An append or fsync failure is returned as `TranslogError::Io`, which is
//! fatal for the shard. Nothing is retried here.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, trace};
use uuid::Uuid;

use super::errors::{TranslogError, TranslogResult};
use super::format::{
    frame_record, parse_translog_file_name, recovering_file_name, translog_file_name,
    TranslogFileKind, TranslogHeader, HEADER_SIZE,
};
use super::operation::Operation;
use super::reader::TranslogReader;
use crate::crash_point::{maybe_crash, points};
use crate::seqno::{SeqNo, NO_OPS_PERFORMED};

/// Where an appended operation landed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogPosition {
    pub generation: u64,
    pub offset: u64,
    pub size: u64,
}

/// Open generation file state
struct GenerationWriter {
    generation: u64,
    path: PathBuf,
    file: File,
    translog_uuid: Uuid,
    offset: u64,
    synced_offset: u64,
    last_seq_no: SeqNo,
    operations: u64,
}

impl GenerationWriter {
    fn create(path: &Path, generation: u64) -> TranslogResult<Self> {
        let translog_uuid = Uuid::new_v4();
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(path)
            .map_err(|e| TranslogError::io(path, "failed to create translog file", e))?;
        file.write_all(&TranslogHeader::new(translog_uuid).encode())
            .map_err(|e| TranslogError::io(path, "failed to write translog header", e))?;
        file.sync_all()
            .map_err(|e| TranslogError::io(path, "failed to fsync translog header", e))?;
        if let Some(dir) = path.parent() {
            fsync_dir(dir)?;
        }

        Ok(Self {
            generation,
            path: path.to_path_buf(),
            file,
            translog_uuid,
            offset: HEADER_SIZE as u64,
            synced_offset: HEADER_SIZE as u64,
            last_seq_no: NO_OPS_PERFORMED,
            operations: 0,
        })
    }

    /// Reopen an existing generation for append.
    ///
    /// A partially written tail is cut off so new records follow the last
    /// complete one. Corruption is returned as-is.
    fn reopen(path: &Path, generation: u64) -> TranslogResult<Self> {
        let mut reader = TranslogReader::open(path)?;
        let Some(header) = reader.header().copied() else {
            // header never made it to disk, start the file over
            fs::remove_file(path)
                .map_err(|e| TranslogError::io(path, "failed to remove headerless translog", e))?;
            return Self::create(path, generation);
        };
        let operations = reader.read_all()?;
        let end = reader.offset();

        let mut file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| TranslogError::io(path, "failed to reopen translog file", e))?;
        if reader.truncated_at().is_some() {
            debug!(path = %path.display(), offset = end, "cutting partially written tail record");
            file.set_len(end)
                .map_err(|e| TranslogError::io(path, "failed to cut truncated tail", e))?;
            file.sync_all()
                .map_err(|e| TranslogError::io(path, "failed to fsync after cutting tail", e))?;
        }
        file.seek(SeekFrom::Start(end))
            .map_err(|e| TranslogError::io(path, "failed to seek to end of translog", e))?;

        Ok(Self {
            generation,
            path: path.to_path_buf(),
            file,
            translog_uuid: header.translog_uuid,
            offset: end,
            synced_offset: end,
            last_seq_no: reader.last_seq_no(),
            operations: operations.len() as u64,
        })
    }

    fn sync(&mut self) -> TranslogResult<()> {
        if self.synced_offset == self.offset {
            return Ok(());
        }
        self.file.sync_data().map_err(|e| {
            TranslogError::io(
                &self.path,
                format!("fsync failed at offset {}", self.offset),
                e,
            )
        })?;
        self.synced_offset = self.offset;
        Ok(())
    }
}

/// Append-only durable log of shard operations.
pub struct Translog {
    locations: Vec<PathBuf>,
    sync_on_each_operation: bool,
    current: Mutex<Option<GenerationWriter>>,
}

impl Translog {
    /// Opens a translog over `locations`, creating the directories if missing.
    ///
    /// No generation is open until `create_generation` is called.
    pub fn open(locations: Vec<PathBuf>, sync_on_each_operation: bool) -> TranslogResult<Self> {
        if locations.is_empty() {
            return Err(TranslogError::io(
                PathBuf::new(),
                "no translog locations configured",
                io::Error::new(io::ErrorKind::InvalidInput, "empty location list"),
            ));
        }
        for location in &locations {
            fs::create_dir_all(location).map_err(|e| {
                TranslogError::io(location, "failed to create translog directory", e)
            })?;
        }
        Ok(Self {
            locations,
            sync_on_each_operation,
            current: Mutex::new(None),
        })
    }

    /// All directories searched for translog files, the first one is written to
    pub fn locations(&self) -> &[PathBuf] {
        &self.locations
    }

    pub fn sync_on_each_operation(&self) -> bool {
        self.sync_on_each_operation
    }

    fn current(&self) -> MutexGuard<'_, Option<GenerationWriter>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open `translog-<generation>` for append, creating it if needed.
    ///
    /// A previously open generation is synced and closed first.
    pub fn create_generation(&self, generation: u64) -> TranslogResult<()> {
        let mut current = self.current();
        if let Some(mut previous) = current.take() {
            previous.sync()?;
        }

        let path = self.locations[0].join(translog_file_name(generation));
        let writer = if path.exists() {
            GenerationWriter::reopen(&path, generation)?
        } else {
            GenerationWriter::create(&path, generation)?
        };
        debug!(
            path = %path.display(),
            generation,
            translog_uuid = %writer.translog_uuid,
            operations = writer.operations,
            "opened translog generation"
        );
        *current = Some(writer);
        Ok(())
    }

    pub fn current_generation(&self) -> Option<u64> {
        self.current().as_ref().map(|w| w.generation)
    }

    pub fn current_path(&self) -> Option<PathBuf> {
        self.current().as_ref().map(|w| w.path.clone())
    }

    pub fn translog_uuid(&self) -> Option<Uuid> {
        self.current().as_ref().map(|w| w.translog_uuid)
    }

    /// Highest seq_no appended to the open generation
    pub fn last_seq_no(&self) -> SeqNo {
        self.current()
            .as_ref()
            .map(|w| w.last_seq_no)
            .unwrap_or(NO_OPS_PERFORMED)
    }

    /// Number of operations in the open generation
    pub fn operation_count(&self) -> u64 {
        self.current().as_ref().map(|w| w.operations).unwrap_or(0)
    }

    /// Durably append an operation.
    ///
    /// # Errors
    ///
    /// - `Closed` if no generation is open
    /// - `OutOfOrder` if `op.seq_no()` is not above the last appended seq_no
    /// - `OperationTooLarge` if the operation does not fit in one record;
    ///   nothing is written
    /// - `Io` if the write or fsync fails (fatal for the shard)
    pub fn append(&self, op: &Operation) -> TranslogResult<LogPosition> {
        let mut current = self.current();
        let writer = current.as_mut().ok_or(TranslogError::Closed)?;

        if op.seq_no() <= writer.last_seq_no || op.seq_no() < 0 {
            return Err(TranslogError::OutOfOrder {
                last: writer.last_seq_no,
                attempted: op.seq_no(),
            });
        }

        let record = frame_record(op)?;
        let position = LogPosition {
            generation: writer.generation,
            offset: writer.offset,
            size: record.len() as u64,
        };

        maybe_crash(points::TRANSLOG_BEFORE_APPEND);
        writer.file.write_all(&record).map_err(|e| {
            TranslogError::io(
                &writer.path,
                format!("failed to append seq_no {}", op.seq_no()),
                e,
            )
        })?;
        writer.offset += record.len() as u64;
        writer.last_seq_no = op.seq_no();
        writer.operations += 1;
        maybe_crash(points::TRANSLOG_AFTER_APPEND);

        if self.sync_on_each_operation {
            writer.sync()?;
            maybe_crash(points::TRANSLOG_AFTER_FSYNC);
        }

        trace!(
            generation = position.generation,
            offset = position.offset,
            seq_no = op.seq_no(),
            "appended translog operation"
        );
        Ok(position)
    }

    /// True if appended bytes have not been fsynced yet
    pub fn sync_needed(&self) -> bool {
        self.current()
            .as_ref()
            .map(|w| w.offset > w.synced_offset)
            .unwrap_or(false)
    }

    /// Fsync the open generation. No-op if nothing is pending or nothing is open.
    pub fn sync(&self) -> TranslogResult<()> {
        match self.current().as_mut() {
            Some(writer) => writer.sync(),
            None => Ok(()),
        }
    }

    /// Sync and close the open generation, keeping the file.
    pub fn close(&self) -> TranslogResult<()> {
        let mut current = self.current();
        if let Some(mut writer) = current.take() {
            writer.sync()?;
            debug!(path = %writer.path.display(), "closed translog generation");
        }
        Ok(())
    }

    /// Close the open generation and delete its file.
    pub fn close_with_delete(&self) -> TranslogResult<()> {
        let mut current = self.current();
        if let Some(writer) = current.take() {
            let path = writer.path.clone();
            drop(writer);
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "deleted translog generation"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(TranslogError::io(&path, "failed to delete translog file", e))
                }
            }
        }
        Ok(())
    }

    /// Find the file holding `generation` across all locations.
    ///
    /// A `.recovering` file takes precedence over an active one: it holds the
    /// operations of an earlier, unfinished replay.
    pub fn find_generation(&self, generation: u64) -> Option<(PathBuf, TranslogFileKind)> {
        for location in &self.locations {
            let recovering = location.join(recovering_file_name(generation));
            if recovering.exists() {
                return Some((recovering, TranslogFileKind::Recovering));
            }
            let active = location.join(translog_file_name(generation));
            if active.exists() {
                return Some((active, TranslogFileKind::Active));
            }
        }
        None
    }

    /// Open a reader over `generation`, or `None` if no file holds it.
    pub fn open_for_replay(&self, generation: u64) -> TranslogResult<Option<TranslogReader>> {
        match self.find_generation(generation) {
            Some((path, _)) => TranslogReader::open(&path).map(Some),
            None => Ok(None),
        }
    }

    /// Every translog generation present in any location, sorted and deduplicated.
    pub fn list_generations(&self) -> TranslogResult<Vec<u64>> {
        let mut generations = Vec::new();
        for location in &self.locations {
            let entries = fs::read_dir(location)
                .map_err(|e| TranslogError::io(location, "failed to list translog directory", e))?;
            for entry in entries {
                let entry = entry
                    .map_err(|e| TranslogError::io(location, "failed to read directory entry", e))?;
                if let Some((generation, _)) =
                    parse_translog_file_name(&entry.file_name().to_string_lossy())
                {
                    generations.push(generation);
                }
            }
        }
        generations.sort_unstable();
        generations.dedup();
        Ok(generations)
    }
}

/// Fsync a directory so renames and creations inside it are durable.
pub(crate) fn fsync_dir(dir: &Path) -> TranslogResult<()> {
    let handle = File::open(dir)
        .map_err(|e| TranslogError::io(dir, "failed to open directory for fsync", e))?;
    handle
        .sync_all()
        .map_err(|e| TranslogError::io(dir, "failed to fsync directory", e))
}
