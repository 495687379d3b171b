//! On-disk translog format
//!
//! File layout:
//! - header: magic `SGTL` (4) | format version u32 LE (4) | translog UUID (16) | header CRC32 (4)
//! - records: body length u32 LE (4) | body | CRC32 of body (4)
//!
//! File naming:
//! - `translog-<generation>`: active file
//! - `translog-<generation>.recovering`: claimed for replay
//! - `translog-<generation>.recovering.lock`: advisory claim lock

use uuid::Uuid;

use super::checksum::compute_checksum;
use super::errors::{TranslogError, TranslogResult};
use super::operation::Operation;

/// File magic
pub const TRANSLOG_MAGIC: [u8; 4] = *b"SGTL";

/// Current format version
pub const FORMAT_VERSION: u32 = 1;

/// Encoded header size
pub const HEADER_SIZE: usize = 4 + 4 + 16 + 4;

/// Upper bound on a single record body; anything larger is corruption
pub const MAX_RECORD_BODY: u32 = 64 * 1024 * 1024;

const TRANSLOG_PREFIX: &str = "translog-";
const RECOVERING_SUFFIX: &str = ".recovering";
const LOCK_SUFFIX: &str = ".lock";

/// Translog file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslogHeader {
    pub format_version: u32,
    pub translog_uuid: Uuid,
}

impl TranslogHeader {
    pub fn new(translog_uuid: Uuid) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            translog_uuid,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&TRANSLOG_MAGIC);
        buf[4..8].copy_from_slice(&self.format_version.to_le_bytes());
        buf[8..24].copy_from_slice(self.translog_uuid.as_bytes());
        let checksum = compute_checksum(&buf[0..24]);
        buf[24..28].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Decode a complete header. Errors describe the corruption.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self, String> {
        if buf[0..4] != TRANSLOG_MAGIC {
            return Err(format!("bad magic {:?}", &buf[0..4]));
        }
        let stored = u32::from_le_bytes([buf[24], buf[25], buf[26], buf[27]]);
        let computed = compute_checksum(&buf[0..24]);
        if stored != computed {
            return Err(format!(
                "header checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored, computed
            ));
        }
        let format_version = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if format_version != FORMAT_VERSION {
            return Err(format!("unsupported format version {}", format_version));
        }
        let mut uuid_bytes = [0u8; 16];
        uuid_bytes.copy_from_slice(&buf[8..24]);
        Ok(Self {
            format_version,
            translog_uuid: Uuid::from_bytes(uuid_bytes),
        })
    }
}

/// Frame an operation as a complete record: length, body, checksum.
///
/// Bodies above `MAX_RECORD_BODY` are refused here so that nothing the
/// reader would reject as corrupt is ever written.
pub fn frame_record(op: &Operation) -> TranslogResult<Vec<u8>> {
    let too_large = || TranslogError::OperationTooLarge {
        seq_no: op.seq_no(),
        size: op.body_len(),
        max: MAX_RECORD_BODY,
    };
    let body_len = u32::try_from(op.body_len())
        .ok()
        .filter(|len| *len <= MAX_RECORD_BODY)
        .ok_or_else(too_large)?;
    let body = op.encode_body().map_err(|_| too_large())?;

    let mut record = Vec::with_capacity(body.len() + 8);
    record.extend_from_slice(&body_len.to_le_bytes());
    record.extend_from_slice(&body);
    record.extend_from_slice(&compute_checksum(&body).to_le_bytes());
    Ok(record)
}

pub fn translog_file_name(generation: u64) -> String {
    format!("{}{}", TRANSLOG_PREFIX, generation)
}

pub fn recovering_file_name(generation: u64) -> String {
    format!("{}{}", translog_file_name(generation), RECOVERING_SUFFIX)
}

pub fn claim_lock_file_name(generation: u64) -> String {
    format!("{}{}", recovering_file_name(generation), LOCK_SUFFIX)
}

/// Kind of translog file recognised from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslogFileKind {
    Active,
    Recovering,
}

/// Parse a translog file name into its generation and kind.
pub fn parse_translog_file_name(name: &str) -> Option<(u64, TranslogFileKind)> {
    let rest = name.strip_prefix(TRANSLOG_PREFIX)?;
    if let Some(generation) = rest.strip_suffix(RECOVERING_SUFFIX) {
        return generation
            .parse()
            .ok()
            .map(|g| (g, TranslogFileKind::Recovering));
    }
    rest.parse().ok().map(|g| (g, TranslogFileKind::Active))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = TranslogHeader::new(Uuid::new_v4());
        assert_eq!(TranslogHeader::decode(&header.encode()).unwrap(), header);
    }

    #[test]
    fn test_header_bad_magic() {
        let mut buf = TranslogHeader::new(Uuid::new_v4()).encode();
        buf[0] = b'X';
        assert!(TranslogHeader::decode(&buf).unwrap_err().contains("magic"));
    }

    #[test]
    fn test_header_bit_flip_detected() {
        let mut buf = TranslogHeader::new(Uuid::new_v4()).encode();
        buf[10] ^= 0x01;
        assert!(TranslogHeader::decode(&buf).unwrap_err().contains("checksum"));
    }

    #[test]
    fn test_frame_layout() {
        let op = Operation::delete("doc", 4);
        let record = frame_record(&op).unwrap();
        assert_eq!(record.len(), op.estimate_size());
        let len = u32::from_le_bytes([record[0], record[1], record[2], record[3]]) as usize;
        assert_eq!(len, op.body_len());
    }

    #[test]
    fn test_file_names() {
        assert_eq!(translog_file_name(5), "translog-5");
        assert_eq!(recovering_file_name(5), "translog-5.recovering");
        assert_eq!(claim_lock_file_name(5), "translog-5.recovering.lock");

        assert_eq!(
            parse_translog_file_name("translog-5"),
            Some((5, TranslogFileKind::Active))
        );
        assert_eq!(
            parse_translog_file_name("translog-5.recovering"),
            Some((5, TranslogFileKind::Recovering))
        );
        assert_eq!(parse_translog_file_name("translog-5.recovering.lock"), None);
        assert_eq!(parse_translog_file_name("segments_5"), None);
    }
}
