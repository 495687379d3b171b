//! Store reference counting
//!
//! A store starts with one reference owned by the shard. Recovery and other
//! readers take an extra reference for the duration of their work; closing
//! the shard drops the initial reference. When the count reaches zero the
//! store is closed and no new reference can be taken.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

use super::errors::{StoreError, StoreResult};
use super::SegmentStore;

/// Atomic reference counter with try-increment semantics.
#[derive(Debug)]
pub struct RefCount {
    refs: AtomicUsize,
}

impl RefCount {
    /// New counter holding the initial reference
    pub fn new() -> Self {
        Self {
            refs: AtomicUsize::new(1),
        }
    }

    /// Take a reference unless the count already reached zero.
    pub fn try_inc_ref(&self) -> bool {
        let mut current = self.refs.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return false;
            }
            match self.refs.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Release a reference. Returns true if this was the last one.
    pub fn dec_ref(&self) -> bool {
        let mut current = self.refs.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return false;
            }
            match self.refs.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return current == 1,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped store reference, released on drop.
pub struct StoreRef<'a> {
    store: &'a dyn SegmentStore,
}

impl<'a> StoreRef<'a> {
    /// Acquire a reference on `store`, failing if the store is closed.
    pub fn acquire(store: &'a dyn SegmentStore) -> StoreResult<Self> {
        if !store.try_inc_ref() {
            return Err(StoreError::Closed {
                path: store.path().to_path_buf(),
            });
        }
        trace!(store = %store.path().display(), "acquired store reference");
        Ok(Self { store })
    }

    pub fn store(&self) -> &'a dyn SegmentStore {
        self.store
    }
}

impl Drop for StoreRef<'_> {
    fn drop(&mut self) {
        self.store.dec_ref();
        trace!(store = %self.store.path().display(), "released store reference");
    }
}
