//! Translog operations and their binary encoding
//!
//! Operation body layout (little endian):
//! - op type (u8): 0 = INDEX, 1 = DELETE
//! - seq_no (i64)
//! - id_len (u32) + id (UTF-8)
//! - INDEX only: source_len (u32) + source (UTF-8)
//!
//! Operations always carry the full document source, never a delta, so
//! replay and resync are a pure function of the log.

use std::fmt;
use std::io::{self, Cursor, Read, Write};

use serde::{Deserialize, Serialize};

use crate::seqno::SeqNo;

/// Framing overhead around an encoded body: length prefix + checksum
pub const RECORD_OVERHEAD: usize = 4 + 4;

/// Operation type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpType {
    Index = 0,
    Delete = 1,
}

impl OpType {
    /// Convert from u8, returns None for invalid values
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(OpType::Index),
            1 => Some(OpType::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Index => "index",
            OpType::Delete => "delete",
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A per-document write operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Index {
        id: String,
        seq_no: SeqNo,
        source: String,
    },
    Delete {
        id: String,
        seq_no: SeqNo,
    },
}

impl Operation {
    pub fn index(id: impl Into<String>, seq_no: SeqNo, source: impl Into<String>) -> Self {
        Operation::Index {
            id: id.into(),
            seq_no,
            source: source.into(),
        }
    }

    pub fn delete(id: impl Into<String>, seq_no: SeqNo) -> Self {
        Operation::Delete {
            id: id.into(),
            seq_no,
        }
    }

    pub fn seq_no(&self) -> SeqNo {
        match self {
            Operation::Index { seq_no, .. } | Operation::Delete { seq_no, .. } => *seq_no,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Operation::Index { id, .. } | Operation::Delete { id, .. } => id,
        }
    }

    pub fn op_type(&self) -> OpType {
        match self {
            Operation::Index { .. } => OpType::Index,
            Operation::Delete { .. } => OpType::Delete,
        }
    }

    /// Length of the encoded body
    pub fn body_len(&self) -> usize {
        let base = 1 + 8 + 4 + self.id().len();
        match self {
            Operation::Index { source, .. } => base + 4 + source.len(),
            Operation::Delete { .. } => base,
        }
    }

    /// Serialized size of this operation as a framed translog record.
    ///
    /// This is the size resync batching accounts against the chunk size.
    pub fn estimate_size(&self) -> usize {
        self.body_len() + RECORD_OVERHEAD
    }

    /// Encode the body (no length prefix, no checksum).
    ///
    /// Fails only if the id or source is longer than a u32 length prefix.
    pub fn encode_body(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.body_len());
        self.write_body(&mut buf)?;
        Ok(buf)
    }

    fn write_body<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&[self.op_type() as u8])?;
        writer.write_all(&self.seq_no().to_le_bytes())?;
        write_str(writer, self.id())?;
        if let Operation::Index { source, .. } = self {
            write_str(writer, source)?;
        }
        Ok(())
    }

    /// Decode a body produced by `encode_body`.
    ///
    /// Trailing bytes after a complete body are rejected.
    pub fn decode_body(data: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);

        let mut type_buf = [0u8; 1];
        cursor.read_exact(&mut type_buf)?;
        let op_type = OpType::from_u8(type_buf[0]).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown operation type {}", type_buf[0]),
            )
        })?;

        let mut seq_buf = [0u8; 8];
        cursor.read_exact(&mut seq_buf)?;
        let seq_no = i64::from_le_bytes(seq_buf);

        let id = read_str(&mut cursor)?;
        let op = match op_type {
            OpType::Index => Operation::Index {
                id,
                seq_no,
                source: read_str(&mut cursor)?,
            },
            OpType::Delete => Operation::Delete { id, seq_no },
        };

        if cursor.position() as usize != data.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{} trailing bytes after {} operation",
                    data.len() - cursor.position() as usize,
                    op_type
                ),
            ));
        }
        Ok(op)
    }
}

fn write_str<W: Write>(writer: &mut W, value: &str) -> io::Result<()> {
    let len = u32::try_from(value.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} byte string does not fit a u32 length prefix", value.len()),
        )
    })?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(value.as_bytes())
}

fn read_str<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut buf = Vec::new();
    reader.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("string field declares {} bytes, {} present", len, buf.len()),
        ));
    }
    String::from_utf8(buf)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("invalid UTF-8: {}", e)))
}
