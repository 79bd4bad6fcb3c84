//! Full index rebuild from the property set store
//!
//! ```text
//! lock = try_write_lock   (fails fast if another writer holds it)
//!   lock.clear_contents
//!   for record in store.ordered_iteration():  lock.add_property_set
//!   lock.commit
//! unlock                  (guard drop, on every exit path)
//! ```
//!
//! The rebuild lives in the guard's own batch: readers keep searching the
//! previous snapshot until `lock.commit` publishes it, and incremental
//! commits made meanwhile neither publish it early nor get lost by it. A
//! failed rebuild rolls its batch back, so the old contents stay visible.

use crate::store::PropertySetStore;
use quarry_core::{Error, Result};
use quarry_index::{IndexManager, WriteLock};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Outcome of a successful rebuild
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    /// Index that was rebuilt
    pub index: String,
    /// Documents indexed
    pub documents: usize,
    /// Generation published by the final commit
    pub generation: u64,
    /// Wall time
    pub elapsed: Duration,
}

/// Rebuilds one index from the store
#[derive(Clone)]
pub struct Reindexer {
    index: Arc<IndexManager>,
    store: Arc<dyn PropertySetStore>,
    progress_interval: usize,
}

impl Reindexer {
    /// Reindexer logging progress every `progress_interval` documents
    pub fn new(
        index: Arc<IndexManager>,
        store: Arc<dyn PropertySetStore>,
        progress_interval: usize,
    ) -> Self {
        Reindexer {
            index,
            store,
            progress_interval: progress_interval.max(1),
        }
    }

    /// Rebuild the index and return what was indexed.
    ///
    /// # Errors
    ///
    /// Returns `Error::Index` wrapping the cause if the write lock is taken
    /// or if iterating the store or writing the index fails.
    pub fn run(&self) -> Result<ReindexReport> {
        let start = Instant::now();
        let index_id = self.index.id().to_string();

        let lock = self.index.try_write_lock().map_err(|e| {
            error!(target: "quarry::reindex", index = %index_id, error = %e, "Reindex refused");
            Error::index_caused_by(format!("could not lock index '{}' for reindex", index_id), e)
        })?;
        info!(target: "quarry::reindex", index = %index_id, "Reindex started");

        match self.rebuild(&lock) {
            Ok((documents, generation)) => {
                let elapsed = start.elapsed();
                info!(
                    target: "quarry::reindex",
                    index = %index_id,
                    documents,
                    generation,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Reindex complete"
                );
                Ok(ReindexReport {
                    index: index_id,
                    documents,
                    generation,
                    elapsed,
                })
            }
            Err(e) => {
                lock.rollback();
                error!(target: "quarry::reindex", index = %index_id, error = %e, "Reindex failed");
                Err(Error::index_caused_by(
                    format!("reindex of '{}' failed", index_id),
                    e,
                ))
            }
        }
    }

    fn rebuild(&self, lock: &WriteLock<'_>) -> Result<(usize, u64)> {
        lock.clear_contents()?;

        let mut documents = 0usize;
        self.store.ordered_iteration(&mut |record| {
            lock.add_property_set(&record.properties, &record.acl)?;
            documents += 1;
            if documents % self.progress_interval == 0 {
                info!(
                    target: "quarry::reindex",
                    index = %self.index.id(),
                    documents,
                    last_uri = %record.uri(),
                    "Reindex progress"
                );
            }
            Ok(())
        })?;

        let generation = lock.commit()?;
        Ok((documents, generation))
    }
}
