//! Translog: the shard's write-ahead log of operations
//!
//! # File layout
//!
//! ```text
//! translog-<generation>              active file, appended to
//! translog-<generation>.recovering   claimed for replay
//! translog-<generation>.recovering.lock
//!
//! header: magic "SGTL" | format version u32 | translog uuid (16) | crc32
//! record: length u32 | body | crc32(body)
//! ```
//!
//! # Rules
//!
//! - Appends are strictly increasing in seq_no
//! - A partially written tail record is the end of the log, never corruption
//! - Any other record that fails validation is corruption and fatal
//! - A generation is replayed by at most one recovery at a time

mod checksum;
mod errors;
mod format;
mod operation;
mod reader;
mod recovering;
mod sync;
mod writer;

pub use checksum::{compute_checksum, verify_checksum};
pub use errors::{TranslogError, TranslogResult};
pub use format::{
    claim_lock_file_name, frame_record, parse_translog_file_name, recovering_file_name,
    translog_file_name, TranslogFileKind, TranslogHeader, FORMAT_VERSION, HEADER_SIZE,
    MAX_RECORD_BODY, TRANSLOG_MAGIC,
};
pub use operation::{OpType, Operation, RECORD_OVERHEAD};
pub use reader::TranslogReader;
pub use recovering::RecoveringHandle;
pub use sync::TranslogSyncScheduler;
pub use writer::{LogPosition, Translog};
