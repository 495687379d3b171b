//! Shard identity and lifecycle state
//!
//! The lifecycle is shared between the recovery thread, the resync task and
//! the periodic translog sync. All of them observe closure through the same
//! atomic so that a close is seen without taking a lock.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Identity of a shard copy: index name plus shard number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardId {
    pub index: String,
    pub shard: u32,
}

impl ShardId {
    pub fn new(index: impl Into<String>, shard: u32) -> Self {
        Self {
            index: index.into(),
            shard,
        }
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}]", self.index, self.shard)
    }
}

/// Lifecycle state of a shard copy on this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum IndexShardState {
    Created = 0,
    Recovering = 1,
    PostRecovery = 2,
    Started = 3,
    Closed = 4,
}

impl IndexShardState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => IndexShardState::Created,
            1 => IndexShardState::Recovering,
            2 => IndexShardState::PostRecovery,
            3 => IndexShardState::Started,
            _ => IndexShardState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexShardState::Created => "CREATED",
            IndexShardState::Recovering => "RECOVERING",
            IndexShardState::PostRecovery => "POST_RECOVERY",
            IndexShardState::Started => "STARTED",
            IndexShardState::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for IndexShardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shared, lock-free view of a shard's lifecycle state.
///
/// `Closed` is terminal: once closed, no transition leaves it.
#[derive(Debug)]
pub struct ShardLifecycle {
    shard_id: ShardId,
    state: AtomicU8,
}

impl ShardLifecycle {
    pub fn new(shard_id: ShardId) -> Self {
        Self {
            shard_id,
            state: AtomicU8::new(IndexShardState::Created as u8),
        }
    }

    pub fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    pub fn state(&self) -> IndexShardState {
        IndexShardState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_closed(&self) -> bool {
        self.state() == IndexShardState::Closed
    }

    /// Move to `next` unless the shard is already closed.
    ///
    /// Returns the state that was replaced, or `None` if the shard was closed.
    pub fn transition(&self, next: IndexShardState) -> Option<IndexShardState> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == IndexShardState::Closed as u8 {
                return None;
            }
            match self.state.compare_exchange(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(prev) => return Some(IndexShardState::from_u8(prev)),
                Err(actual) => current = actual,
            }
        }
    }

    /// Close the shard. Idempotent.
    pub fn close(&self) -> IndexShardState {
        IndexShardState::from_u8(self.state.swap(IndexShardState::Closed as u8, Ordering::AcqRel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_id_display() {
        assert_eq!(ShardId::new("logs", 3).to_string(), "[logs][3]");
    }

    #[test]
    fn test_lifecycle_transitions() {
        let lifecycle = ShardLifecycle::new(ShardId::new("idx", 0));
        assert_eq!(lifecycle.state(), IndexShardState::Created);

        assert_eq!(
            lifecycle.transition(IndexShardState::Recovering),
            Some(IndexShardState::Created)
        );
        assert_eq!(lifecycle.state(), IndexShardState::Recovering);
    }

    #[test]
    fn test_closed_is_terminal() {
        let lifecycle = ShardLifecycle::new(ShardId::new("idx", 0));
        lifecycle.close();
        assert!(lifecycle.is_closed());
        assert_eq!(lifecycle.transition(IndexShardState::Started), None);
        assert!(lifecycle.is_closed());
    }
}
