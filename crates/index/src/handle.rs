//! Scoped read handles
//!
//! An [`IndexHandle`] pins one snapshot for the duration of a search or a
//! status call. The handle is released exactly once, when it is dropped,
//! which also covers early returns and panics unwinding through the caller.

use crate::snapshot::IndexSnapshot;
use quarry_core::Result;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Source of read handles
pub trait IndexHandleProvider: Send + Sync {
    /// Pin the current snapshot.
    ///
    /// # Errors
    ///
    /// Fails if the index is not open.
    fn acquire(&self) -> Result<IndexHandle>;
}

// ============================================================================
// HandleTracker
// ============================================================================

/// Counts outstanding handles of one index
#[derive(Debug, Default)]
pub struct HandleTracker {
    open: AtomicUsize,
    acquired: AtomicU64,
}

impl HandleTracker {
    /// New tracker with no open handles
    pub fn new() -> Arc<Self> {
        Arc::new(HandleTracker::default())
    }

    /// Wrap a snapshot into a tracked handle
    pub fn track(self: &Arc<Self>, snapshot: Arc<dyn IndexSnapshot>) -> IndexHandle {
        self.open.fetch_add(1, Ordering::AcqRel);
        self.acquired.fetch_add(1, Ordering::Relaxed);
        IndexHandle {
            snapshot,
            tracker: Arc::clone(self),
        }
    }

    /// Handles acquired and not yet dropped
    pub fn open_handles(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }

    /// Handles acquired since creation
    pub fn total_acquired(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }
}

// ============================================================================
// IndexHandle
// ============================================================================

/// A pinned, read-only snapshot; released on drop
pub struct IndexHandle {
    snapshot: Arc<dyn IndexSnapshot>,
    tracker: Arc<HandleTracker>,
}

impl IndexHandle {
    /// Shared pointer to the pinned snapshot
    pub fn snapshot(&self) -> &Arc<dyn IndexSnapshot> {
        &self.snapshot
    }
}

impl Deref for IndexHandle {
    type Target = dyn IndexSnapshot;

    fn deref(&self) -> &Self::Target {
        self.snapshot.as_ref()
    }
}

impl Drop for IndexHandle {
    fn drop(&mut self) {
        self.tracker.open.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexHandle")
            .field("generation", &self.snapshot.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Snapshot;

    #[test]
    fn test_handle_released_on_drop() {
        let tracker = HandleTracker::new();
        let a = tracker.track(Arc::new(Snapshot::empty()));
        let b = tracker.track(Arc::new(Snapshot::empty()));
        assert_eq!(tracker.open_handles(), 2);

        drop(a);
        assert_eq!(tracker.open_handles(), 1);
        drop(b);
        assert_eq!(tracker.open_handles(), 0);
        assert_eq!(tracker.total_acquired(), 2);
    }

    #[test]
    fn test_handle_released_on_early_return() {
        fn fails(tracker: &Arc<HandleTracker>) -> Result<()> {
            let handle = tracker.track(Arc::new(Snapshot::empty()));
            let _ = handle.generation();
            Err(quarry_core::Error::query_execution("boom"))
        }

        let tracker = HandleTracker::new();
        assert!(fails(&tracker).is_err());
        assert_eq!(tracker.open_handles(), 0);
    }

    #[test]
    fn test_deref_to_snapshot() {
        let tracker = HandleTracker::new();
        let handle = tracker.track(Arc::new(Snapshot::empty()));
        assert_eq!(handle.document_count().unwrap(), 0);
    }
}
