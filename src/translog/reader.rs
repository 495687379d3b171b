//! Translog reader for sequential replay
//!
//! Replay rules:
//! - Records are read strictly forward, in file order
//! - Sequence numbers must be strictly increasing within a file
//! - A partially written tail record is end of log, not corruption
//! - Any other invalid record is corruption and stops replay
//!
//! A file shorter than the header (empty, or header half written at crash
//! time) is an empty log.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::trace;

use super::checksum::verify_checksum;
use super::errors::{TranslogError, TranslogResult};
use super::format::{TranslogHeader, HEADER_SIZE, MAX_RECORD_BODY};
use super::operation::Operation;
use crate::seqno::{SeqNo, NO_OPS_PERFORMED};

/// Lazy, finite, forward-only reader over one translog file.
pub struct TranslogReader {
    path: PathBuf,
    reader: BufReader<File>,
    header: Option<TranslogHeader>,
    offset: u64,
    file_size: u64,
    last_seq_no: SeqNo,
    operations_read: u64,
    truncated_at: Option<u64>,
    done: bool,
}

impl TranslogReader {
    /// Opens a translog file for replay.
    ///
    /// # Errors
    ///
    /// - `Io` if the file cannot be opened
    /// - `Corrupt` if a complete header fails validation
    pub fn open(path: &Path) -> TranslogResult<Self> {
        let file = File::open(path).map_err(|e| TranslogError::io(path, "failed to open translog", e))?;
        let file_size = file
            .metadata()
            .map_err(|e| TranslogError::io(path, "failed to read translog metadata", e))?
            .len();

        let mut reader = Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            header: None,
            offset: 0,
            file_size,
            last_seq_no: NO_OPS_PERFORMED,
            operations_read: 0,
            truncated_at: None,
            done: false,
        };

        if file_size < HEADER_SIZE as u64 {
            trace!(
                path = %path.display(),
                file_size,
                "translog is empty or its header was half written, nothing to replay"
            );
            if file_size > 0 {
                reader.truncated_at = Some(0);
            }
            reader.done = true;
            return Ok(reader);
        }

        let mut header_buf = [0u8; HEADER_SIZE];
        reader
            .reader
            .read_exact(&mut header_buf)
            .map_err(|e| TranslogError::io(path, "failed to read translog header", e))?;
        let header = TranslogHeader::decode(&header_buf).map_err(|reason| TranslogError::Corrupt {
            path: path.to_path_buf(),
            offset: 0,
            reason,
        })?;
        reader.header = Some(header);
        reader.offset = HEADER_SIZE as u64;
        Ok(reader)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header of the file, `None` if the header was never completely written
    pub fn header(&self) -> Option<&TranslogHeader> {
        self.header.as_ref()
    }

    /// Byte offset just past the last complete record read
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn last_seq_no(&self) -> SeqNo {
        self.last_seq_no
    }

    pub fn operations_read(&self) -> u64 {
        self.operations_read
    }

    /// Offset of a partially written tail record, if one was found
    pub fn truncated_at(&self) -> Option<u64> {
        self.truncated_at
    }

    /// Reads the next record without interpreting truncation.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(op))` for a complete, valid record
    /// - `Ok(None)` at a clean end of file
    /// - `Err(Truncated)` if the tail record is incomplete
    /// - `Err(Corrupt)` for any invalid complete record
    pub fn read_next(&mut self) -> TranslogResult<Option<Operation>> {
        if self.done || self.offset >= self.file_size {
            return Ok(None);
        }
        let remaining = self.file_size - self.offset;

        if remaining < 4 {
            return Err(self.truncated(format!(
                "{} bytes remaining, length prefix needs 4",
                remaining
            )));
        }
        let mut len_buf = [0u8; 4];
        self.read_exact(&mut len_buf)?;
        let body_len = u32::from_le_bytes(len_buf);

        if body_len == 0 || body_len > MAX_RECORD_BODY {
            return Err(self.corrupt(format!("invalid record length {}", body_len)));
        }

        let record_len = 4 + body_len as u64 + 4;
        if record_len > remaining {
            return Err(self.truncated(format!(
                "record needs {} bytes, {} remaining",
                record_len, remaining
            )));
        }

        let mut body = vec![0u8; body_len as usize];
        self.read_exact(&mut body)?;
        let mut crc_buf = [0u8; 4];
        self.read_exact(&mut crc_buf)?;

        if !verify_checksum(&body, u32::from_le_bytes(crc_buf)) {
            return Err(self.corrupt("record checksum mismatch".to_string()));
        }

        let op = Operation::decode_body(&body)
            .map_err(|e| self.corrupt(format!("undecodable record: {}", e)))?;

        if op.seq_no() < 0 {
            return Err(self.corrupt(format!("record carries unassigned seq_no {}", op.seq_no())));
        }
        if op.seq_no() <= self.last_seq_no {
            return Err(self.corrupt(format!(
                "non-increasing seq_no: {} after {}",
                op.seq_no(),
                self.last_seq_no
            )));
        }

        self.offset += record_len;
        self.last_seq_no = op.seq_no();
        self.operations_read += 1;
        Ok(Some(op))
    }

    /// Reads the next operation, treating a truncated tail as end of log.
    pub fn next_operation(&mut self) -> TranslogResult<Option<Operation>> {
        match self.read_next() {
            Err(e) if e.is_truncation() => {
                trace!(
                    path = %self.path.display(),
                    error = %e,
                    "ignoring truncated tail record, the last operation was not completely written"
                );
                self.truncated_at = Some(self.offset);
                self.done = true;
                Ok(None)
            }
            other => other,
        }
    }

    /// Reads every remaining operation, stopping cleanly at a truncated tail.
    pub fn read_all(&mut self) -> TranslogResult<Vec<Operation>> {
        let mut operations = Vec::new();
        while let Some(op) = self.next_operation()? {
            operations.push(op);
        }
        Ok(operations)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> TranslogResult<()> {
        match self.reader.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(self.truncated(format!("short read: {}", e)))
            }
            Err(e) => Err(TranslogError::io(&self.path, "failed to read translog record", e)),
        }
    }

    fn truncated(&self, reason: String) -> TranslogError {
        TranslogError::Truncated {
            path: self.path.clone(),
            offset: self.offset,
            reason,
        }
    }

    fn corrupt(&self, reason: String) -> TranslogError {
        TranslogError::Corrupt {
            path: self.path.clone(),
            offset: self.offset,
            reason,
        }
    }
}

/// Iterates operations; a fatal error is yielded once and ends iteration.
impl Iterator for TranslogReader {
    type Item = TranslogResult<Operation>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_operation() {
            Ok(Some(op)) => Some(Ok(op)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
