//! Severity levels shared by every shard subsystem error
//!
//! Each subsystem defines its own error enum in its `errors.rs`; all of them
//! classify themselves with this severity so callers can decide between
//! failing an operation and failing the whole shard.

use std::fmt;

/// Error severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Absorbed locally, logged, execution continues
    Recoverable,
    /// Operation fails, shard continues
    Error,
    /// Shard must be failed and reallocated
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Recoverable => "RECOVERABLE",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
