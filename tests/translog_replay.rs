//! Translog Replay Tests
//!
//! Covers:
//! - Every durably appended operation is read back once, in order
//! - A record torn by a crash ends the log without an error
//! - Damage to a complete record is fatal, never skipped

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use shardgate::translog::{frame_record, Operation, Translog, TranslogReader, HEADER_SIZE};
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

fn op(seq_no: i64) -> Operation {
    if seq_no % 4 == 3 {
        Operation::delete(format!("doc{}", seq_no - 1), seq_no)
    } else {
        Operation::index(
            format!("doc{}", seq_no),
            seq_no,
            format!(r#"{{"n": {}}}"#, seq_no),
        )
    }
}

/// Append `count` operations to generation 1 and return the file path
fn write_ops(dir: &Path, count: i64) -> PathBuf {
    let translog = Translog::open(vec![dir.to_path_buf()], true).unwrap();
    translog.create_generation(1).unwrap();
    for seq_no in 0..count {
        translog.append(&op(seq_no)).unwrap();
    }
    translog.close().unwrap();
    dir.join("translog-1")
}

/// Simulate a crash part-way through writing the next record
fn append_torn_record(path: &Path, next: &Operation, keep: usize) {
    let record = frame_record(next).unwrap();
    assert!(keep < record.len());
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(&record[..keep]).unwrap();
    file.sync_all().unwrap();
}

// =============================================================================
// Replay Completeness
// =============================================================================

#[test]
fn test_replay_returns_every_operation_in_order() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_ops(temp_dir.path(), 25);

    let ops = TranslogReader::open(&path).unwrap().read_all().unwrap();

    let expected: Vec<Operation> = (0..25).map(op).collect();
    assert_eq!(ops, expected);
}

#[test]
fn test_replay_stops_before_torn_record_at_every_cut() {
    let next = op(10);
    let record_len = frame_record(&next).unwrap().len();

    for keep in 1..record_len {
        let temp_dir = TempDir::new().unwrap();
        let path = write_ops(temp_dir.path(), 10);
        let clean_len = fs::metadata(&path).unwrap().len();
        append_torn_record(&path, &next, keep);

        let mut reader = TranslogReader::open(&path).unwrap();
        let ops = reader.read_all().unwrap();

        assert_eq!(ops.len(), 10, "cut after {} bytes", keep);
        assert_eq!(ops.last().map(Operation::seq_no), Some(9));
        assert_eq!(reader.truncated_at(), Some(clean_len));
        assert_eq!(reader.offset(), clean_len);
    }
}

#[test]
fn test_iterator_and_explicit_reads_agree() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_ops(temp_dir.path(), 6);
    append_torn_record(&path, &op(6), 5);

    let via_iterator: Vec<Operation> = TranslogReader::open(&path)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let via_read_all = TranslogReader::open(&path).unwrap().read_all().unwrap();

    assert_eq!(via_iterator, via_read_all);
    assert_eq!(via_iterator.len(), 6);
}

#[test]
fn test_half_written_header_is_empty_log() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("translog-3");
    fs::write(&path, &[0u8; HEADER_SIZE - 1]).unwrap();

    let mut reader = TranslogReader::open(&path).unwrap();
    assert!(reader.header().is_none());
    assert!(reader.read_all().unwrap().is_empty());
    assert_eq!(reader.truncated_at(), Some(0));
}

// =============================================================================
// Corruption Is Fatal
// =============================================================================

#[test]
fn test_flipped_byte_in_middle_record_is_corruption() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_ops(temp_dir.path(), 5);

    // Inside the body of the third record
    let offset = HEADER_SIZE
        + frame_record(&op(0)).unwrap().len()
        + frame_record(&op(1)).unwrap().len()
        + 6;
    let mut contents = fs::read(&path).unwrap();
    contents[offset] ^= 0xFF;
    fs::write(&path, contents).unwrap();

    let mut reader = TranslogReader::open(&path).unwrap();
    let err = reader.read_all().unwrap_err();

    assert!(!err.is_truncation());
    assert_eq!(err.code(), "SHARD_TRANSLOG_CORRUPTION");
}

#[test]
fn test_bad_magic_is_corruption() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_ops(temp_dir.path(), 2);

    let mut contents = fs::read(&path).unwrap();
    contents[0] = b'X';
    fs::write(&path, contents).unwrap();

    let err = TranslogReader::open(&path).err().unwrap();
    assert_eq!(err.code(), "SHARD_TRANSLOG_CORRUPTION");
}

#[test]
fn test_reopened_generation_continues_after_last_seq_no() {
    let temp_dir = TempDir::new().unwrap();
    write_ops(temp_dir.path(), 3);

    let translog = Translog::open(vec![temp_dir.path().to_path_buf()], true).unwrap();
    translog.create_generation(1).unwrap();
    assert_eq!(translog.last_seq_no(), 2);
    assert!(translog.append(&op(2)).is_err());
    translog.append(&op(3)).unwrap();
    translog.close().unwrap();

    let ops = TranslogReader::open(&temp_dir.path().join("translog-1"))
        .unwrap()
        .read_all()
        .unwrap();
    assert_eq!(ops.len(), 4);
}
