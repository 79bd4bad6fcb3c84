//! Index lifecycle manager
//!
//! Owns the writable state of one logical index: the published snapshot, the
//! pending (uncommitted) write batch, the cooperative write lock and the
//! lifecycle state.
//!
//! ## States
//!
//! ```text
//! Uninitialized --open()--> Open --lock()--> LockedForWrite --unlock()--> Open
//!                            |                                            |
//!                            +-----------------close()-------------------+--> Closed
//! ```
//!
//! The write lock is a compare-and-swap flag guarding the bulk write path
//! (clear, optimize, reindex). It is not a reader/writer mutex: searches
//! never take it and keep reading the last published snapshot while a writer
//! holds it.
//!
//! There are two write batches. Write-through changes
//! ([`IndexManager::add_property_set`], [`IndexManager::delete_uri`]) need no
//! lock and are published by [`IndexManager::commit`]. The lock holder writes
//! through its [`WriteLock`] guard into a separate bulk batch that only
//! [`WriteLock::commit`] publishes, so a half-built rebuild is never visible.

use crate::document::StoredDocument;
use crate::handle::{HandleTracker, IndexHandle, IndexHandleProvider};
use crate::segment::Segment;
use crate::snapshot::{IndexSnapshot, SegmentReader, Snapshot};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use quarry_core::{is_descendant_uri, AclMetadata, Error, PropertySet, Result};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const UNINITIALIZED: u8 = 0;
const OPEN: u8 = 1;
const CLOSED: u8 = 2;

// ============================================================================
// IndexState / IndexStatus
// ============================================================================

/// Lifecycle state of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    /// Created, not yet opened
    Uninitialized,
    /// Readable and writable
    Open,
    /// Open with the write lock held
    LockedForWrite,
    /// Terminal
    Closed,
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexState::Uninitialized => "uninitialized",
            IndexState::Open => "open",
            IndexState::LockedForWrite => "locked_for_write",
            IndexState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Point-in-time index statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStatus {
    /// Logical index id
    pub id: String,
    /// Lifecycle state
    pub state: IndexState,
    /// Write lock held
    pub is_locked: bool,
    /// Committed segments carry deleted documents
    pub has_deletions: bool,
    /// Live committed documents
    pub document_count: usize,
    /// Stored property names
    pub field_names: BTreeSet<String>,
    /// Estimated committed size in bytes
    pub physical_size: u64,
    /// Generation of the published snapshot
    pub generation: u64,
    /// Time of the last commit that changed the index
    pub last_commit: Option<DateTime<Utc>>,
    /// Read handles outstanding, not counting the one used for this status
    pub open_handles: usize,
}

// ============================================================================
// Pending batch
// ============================================================================

#[derive(Debug, Default)]
struct PendingDelete {
    uri: String,
    recursive: bool,
}

/// Uncommitted writes applied on top of a base snapshot at commit.
///
/// A cleared batch has an empty base, so it records no deletes.
#[derive(Debug, Default)]
struct Pending {
    cleared: bool,
    docs: Vec<StoredDocument>,
    positions: HashMap<String, usize>,
    deletes: Vec<PendingDelete>,
}

impl Pending {
    fn cleared() -> Self {
        Pending {
            cleared: true,
            ..Pending::default()
        }
    }

    fn is_dirty(&self) -> bool {
        self.cleared || !self.docs.is_empty() || !self.deletes.is_empty()
    }

    fn add(&mut self, doc: StoredDocument) {
        if !self.cleared {
            self.deletes.push(PendingDelete {
                uri: doc.uri.clone(),
                recursive: false,
            });
        }
        match self.positions.get(&doc.uri) {
            Some(&pos) => self.docs[pos] = doc,
            None => {
                self.positions.insert(doc.uri.clone(), self.docs.len());
                self.docs.push(doc);
            }
        }
    }

    fn delete(&mut self, uri: &str, recursive: bool) {
        let before = self.docs.len();
        self.docs.retain(|d| {
            if recursive {
                !is_descendant_uri(uri, &d.uri)
            } else {
                d.uri != uri
            }
        });
        if self.docs.len() != before {
            self.positions = self
                .docs
                .iter()
                .enumerate()
                .map(|(i, d)| (d.uri.clone(), i))
                .collect();
        }
        if !self.cleared {
            self.deletes.push(PendingDelete {
                uri: uri.to_string(),
                recursive,
            });
        }
    }

    /// Replay another batch's net effect on top of this one
    fn replay(&mut self, other: &Pending) {
        for del in &other.deletes {
            self.delete(&del.uri, del.recursive);
        }
        for doc in &other.docs {
            self.add(doc.clone());
        }
    }

    fn take(&mut self) -> Pending {
        std::mem::take(self)
    }
}

// ============================================================================
// WriteLock
// ============================================================================

/// Scoped write lock and the bulk write batch it owns.
///
/// Writes made through the guard are published only by [`WriteLock::commit`];
/// commits by other writers never publish them. Dropping the guard discards
/// whatever it has not committed and releases the lock.
#[must_use = "the write lock is released as soon as the guard is dropped"]
pub struct WriteLock<'a> {
    manager: &'a IndexManager,
}

impl WriteLock<'_> {
    /// Index this guard locks
    pub fn manager(&self) -> &IndexManager {
        self.manager
    }

    /// Start the bulk batch from an empty index; earlier uncommitted bulk
    /// writes are dropped.
    ///
    /// Readers keep the current snapshot until [`WriteLock::commit`].
    pub fn clear_contents(&self) -> Result<()> {
        let m = self.manager;
        m.ensure_locked("clear_contents")?;
        *m.bulk.lock() = Pending::cleared();
        info!(target: "quarry::index", index = %m.id, "Index contents cleared");
        Ok(())
    }

    /// Add one resource to the bulk batch
    pub fn add_property_set(&self, set: &PropertySet, acl: &AclMetadata) -> Result<()> {
        self.manager.ensure_locked("add_property_set")?;
        let doc = StoredDocument::from_property_set(set, acl);
        self.manager.bulk.lock().add(doc);
        Ok(())
    }

    /// Delete a resource in the bulk batch
    pub fn delete_uri(&self, uri: &str, recursive: bool) -> Result<()> {
        self.manager.ensure_locked("delete_uri")?;
        self.manager.bulk.lock().delete(uri, recursive);
        Ok(())
    }

    /// Documents in the bulk batch
    pub fn pending_documents(&self) -> usize {
        self.manager.bulk.lock().docs.len()
    }

    /// Discard the bulk batch, including a pending clear
    pub fn rollback(&self) {
        let discarded = self.manager.bulk.lock().take();
        self.manager.log_discarded(&discarded, "Bulk writes rolled back");
    }

    /// Publish the bulk batch.
    ///
    /// Returns the generation now visible; an empty batch leaves it unchanged.
    pub fn commit(&self) -> Result<u64> {
        let m = self.manager;
        m.ensure_locked("commit")?;
        let _publishing = m.publishing.lock();
        let batch = m.bulk.lock().take();
        m.publish(batch)
    }

    /// Commit the bulk batch, then merge all committed segments into one and
    /// drop deleted documents.
    pub fn optimize(&self) -> Result<u64> {
        let m = self.manager;
        self.commit()?;

        let _publishing = m.publishing.lock();
        let current = Arc::clone(&*m.snapshot.read());
        if current.readers().len() <= 1 && !current.has_deletions()? {
            return Ok(current.generation());
        }

        let docs: Vec<StoredDocument> = current
            .live_documents()
            .map(|d| StoredDocument::clone(d))
            .collect();
        let merged = current.readers().len();
        let generation = current.generation() + 1;
        let readers = if docs.is_empty() {
            Vec::new()
        } else {
            vec![SegmentReader::new(Arc::new(Segment::build(docs)))]
        };
        *m.snapshot.write() = Arc::new(Snapshot::new(generation, readers));
        *m.last_commit.write() = Some(Utc::now());

        info!(
            target: "quarry::index",
            index = %m.id,
            generation,
            merged_segments = merged,
            "Index optimized"
        );
        Ok(generation)
    }
}

impl Drop for WriteLock<'_> {
    fn drop(&mut self) {
        self.manager.unlock();
    }
}

impl fmt::Debug for WriteLock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteLock")
            .field("index", &self.manager.id)
            .finish()
    }
}

// ============================================================================
// IndexManager
// ============================================================================

/// Lifecycle manager of one logical index
pub struct IndexManager {
    id: String,
    state: AtomicU8,
    locked: AtomicBool,
    snapshot: RwLock<Arc<Snapshot>>,
    /// Write-through batch, published by [`IndexManager::commit`]
    pending: Mutex<Pending>,
    /// Bulk batch of the write lock holder
    bulk: Mutex<Pending>,
    /// Serializes snapshot publication. Order: publishing, pending, bulk.
    publishing: Mutex<()>,
    last_commit: RwLock<Option<DateTime<Utc>>>,
    tracker: Arc<HandleTracker>,
}

impl IndexManager {
    /// Create an uninitialized index
    pub fn new(id: impl Into<String>) -> Self {
        IndexManager {
            id: id.into(),
            state: AtomicU8::new(UNINITIALIZED),
            locked: AtomicBool::new(false),
            snapshot: RwLock::new(Arc::new(Snapshot::empty())),
            pending: Mutex::new(Pending::default()),
            bulk: Mutex::new(Pending::default()),
            publishing: Mutex::new(()),
            last_commit: RwLock::new(None),
            tracker: HandleTracker::new(),
        }
    }

    /// Logical index id
    pub fn id(&self) -> &str {
        &self.id
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open the index; opening an open index is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `Error::IndexClosed` once the index has been closed.
    pub fn open(&self) -> Result<()> {
        match self
            .state
            .compare_exchange(UNINITIALIZED, OPEN, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                info!(target: "quarry::index", index = %self.id, "Index opened");
                Ok(())
            }
            Err(OPEN) => Ok(()),
            Err(_) => Err(Error::IndexClosed(self.id.clone())),
        }
    }

    /// Close the index. Uncommitted writes are discarded.
    ///
    /// Close holds the write lock while it runs, so it cannot interleave with
    /// a writer taking the lock.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` while the write lock is held.
    pub fn close(&self) -> Result<()> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::InvalidState(format!(
                "index '{}' cannot be closed while locked for write",
                self.id
            )));
        }
        if self.state.swap(CLOSED, Ordering::AcqRel) != CLOSED {
            let _publishing = self.publishing.lock();
            let pending = self.pending.lock().take();
            let bulk = self.bulk.lock().take();
            self.log_discarded(&pending, "Index closed with uncommitted writes");
            self.log_discarded(&bulk, "Index closed with uncommitted bulk writes");
            info!(target: "quarry::index", index = %self.id, "Index closed");
        }
        self.locked.store(false, Ordering::Release);
        Ok(())
    }

    /// Current lifecycle state
    pub fn state(&self) -> IndexState {
        match self.state.load(Ordering::Acquire) {
            UNINITIALIZED => IndexState::Uninitialized,
            OPEN if self.is_locked() => IndexState::LockedForWrite,
            OPEN => IndexState::Open,
            _ => IndexState::Closed,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state.load(Ordering::Acquire) {
            OPEN => Ok(()),
            UNINITIALIZED => Err(Error::InvalidState(format!(
                "index '{}' is not open",
                self.id
            ))),
            _ => Err(Error::IndexClosed(self.id.clone())),
        }
    }

    // ========================================================================
    // Write lock
    // ========================================================================

    /// Try to take the write lock without blocking.
    ///
    /// Returns `false` if it is already held or the index is not open.
    pub fn lock(&self) -> bool {
        if self.ensure_open().is_err() {
            return false;
        }
        if self
            .locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        // a close may have finished between the state check and the swap
        if self.ensure_open().is_err() {
            self.locked.store(false, Ordering::Release);
            return false;
        }
        debug!(target: "quarry::index", index = %self.id, "Write lock acquired");
        true
    }

    /// Take the write lock as a scoped guard.
    ///
    /// # Errors
    ///
    /// Returns `Error::IndexLock` if another writer holds the lock, or the
    /// lifecycle error if the index is not open.
    pub fn try_write_lock(&self) -> Result<WriteLock<'_>> {
        self.ensure_open()?;
        if !self.lock() {
            return Err(Error::IndexLock(format!(
                "index '{}' is locked by another writer",
                self.id
            )));
        }
        Ok(WriteLock { manager: self })
    }

    /// Release the write lock, discarding uncommitted bulk writes. Safe to
    /// call when not locked.
    pub fn unlock(&self) {
        let mut bulk = self.bulk.lock();
        if self.locked.swap(false, Ordering::AcqRel) {
            let discarded = bulk.take();
            self.log_discarded(&discarded, "Write lock released with uncommitted bulk writes");
            debug!(target: "quarry::index", index = %self.id, "Write lock released");
        }
    }

    /// True while the write lock is held
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    fn ensure_locked(&self, operation: &str) -> Result<()> {
        self.ensure_open()?;
        if !self.is_locked() {
            return Err(Error::InvalidState(format!(
                "{} on index '{}' requires the write lock",
                operation, self.id
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Write-through
    // ========================================================================

    /// Add one resource with its denormalized ACL data.
    ///
    /// An existing document with the same uri is replaced at commit. Does not
    /// need the write lock.
    pub fn add_property_set(&self, set: &PropertySet, acl: &AclMetadata) -> Result<()> {
        self.ensure_open()?;
        let doc = StoredDocument::from_property_set(set, acl);
        self.pending.lock().add(doc);
        Ok(())
    }

    /// Delete a resource, and with `recursive` everything beneath it
    pub fn delete_uri(&self, uri: &str, recursive: bool) -> Result<()> {
        self.ensure_open()?;
        self.pending.lock().delete(uri, recursive);
        Ok(())
    }

    /// Discard every uncommitted write-through change
    pub fn rollback(&self) {
        let discarded = self.pending.lock().take();
        self.log_discarded(&discarded, "Uncommitted writes rolled back");
    }

    /// Documents waiting for the next write-through commit
    pub fn pending_documents(&self) -> usize {
        self.pending.lock().docs.len()
    }

    /// Publish write-through changes to new read handles.
    ///
    /// Returns the generation now visible. Committing with nothing pending
    /// leaves the generation unchanged. The write lock holder's bulk batch is
    /// never published here; if it rebuilds from a clear, these changes are
    /// replayed into it so its commit keeps them.
    pub fn commit(&self) -> Result<u64> {
        self.ensure_open()?;
        let _publishing = self.publishing.lock();
        let batch = self.pending.lock().take();
        if batch.is_dirty() {
            let mut bulk = self.bulk.lock();
            if bulk.cleared {
                bulk.replay(&batch);
            }
        }
        self.publish(batch)
    }

    /// Apply `batch` on top of the published snapshot. Callers hold `publishing`.
    fn publish(&self, batch: Pending) -> Result<u64> {
        let current = Arc::clone(&*self.snapshot.read());
        if !batch.is_dirty() {
            return Ok(current.generation());
        }

        let mut readers: Vec<SegmentReader> = if batch.cleared {
            Vec::new()
        } else {
            current.readers().to_vec()
        };

        let mut deleted_docs = 0usize;
        for reader in readers.iter_mut() {
            let mut deleted: Option<HashSet<u32>> = None;
            for del in &batch.deletes {
                let ids = if del.recursive {
                    reader.segment().descendants(&del.uri)
                } else {
                    reader.segment().doc_id(&del.uri).into_iter().collect()
                };
                for id in ids {
                    if reader.is_live(id) {
                        let set = deleted.get_or_insert_with(|| (**reader.deleted()).clone());
                        if set.insert(id) {
                            deleted_docs += 1;
                        }
                    }
                }
            }
            if let Some(set) = deleted {
                *reader = SegmentReader::with_deletions(Arc::clone(reader.segment()), Arc::new(set));
            }
        }
        readers.retain(|r| r.live_count() > 0);

        let added = batch.docs.len();
        if added > 0 {
            readers.push(SegmentReader::new(Arc::new(Segment::build(batch.docs))));
        }

        let generation = current.generation() + 1;
        let snapshot = Arc::new(Snapshot::new(generation, readers));
        let documents = snapshot.document_count()?;
        *self.snapshot.write() = snapshot;
        *self.last_commit.write() = Some(Utc::now());

        info!(
            target: "quarry::index",
            index = %self.id,
            generation,
            added,
            deleted = deleted_docs,
            cleared = batch.cleared,
            documents,
            "Index committed"
        );
        Ok(generation)
    }

    fn log_discarded(&self, discarded: &Pending, message: &'static str) {
        if discarded.is_dirty() {
            warn!(
                target: "quarry::index",
                index = %self.id,
                pending_docs = discarded.docs.len(),
                cleared = discarded.cleared,
                "{}",
                message
            );
        }
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Statistics computed over a short-lived read handle
    pub fn status(&self) -> Result<IndexStatus> {
        let open_handles = self.tracker.open_handles();
        let handle = self.acquire()?;
        Ok(IndexStatus {
            id: self.id.clone(),
            state: self.state(),
            is_locked: self.is_locked(),
            has_deletions: handle.has_deletions()?,
            document_count: handle.document_count()?,
            field_names: handle.field_names()?,
            physical_size: handle.physical_size()?,
            generation: handle.generation(),
            last_commit: *self.last_commit.read(),
            open_handles,
        })
    }

    /// True if committed segments carry deleted documents
    pub fn has_deletions(&self) -> Result<bool> {
        self.acquire()?.has_deletions()
    }

    /// Live committed documents
    pub fn document_count(&self) -> Result<usize> {
        self.acquire()?.document_count()
    }

    /// Stored property names
    pub fn field_names(&self) -> Result<BTreeSet<String>> {
        self.acquire()?.field_names()
    }

    /// Estimated committed size in bytes
    pub fn physical_size(&self) -> Result<u64> {
        self.acquire()?.physical_size()
    }

    /// Generation of the published snapshot
    pub fn generation(&self) -> u64 {
        self.snapshot.read().generation()
    }

    /// Read handles currently outstanding
    pub fn open_handles(&self) -> usize {
        self.tracker.open_handles()
    }
}

impl IndexHandleProvider for IndexManager {
    fn acquire(&self) -> Result<IndexHandle> {
        self.ensure_open()?;
        let snapshot: Arc<dyn IndexSnapshot> = Arc::clone(&*self.snapshot.read()) as _;
        Ok(self.tracker.track(snapshot))
    }
}

impl fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexManager")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("generation", &self.generation())
            .finish()
    }
}
