//! Incremental index maintenance
//!
//! Applies repository change events to the index through its write-through
//! batch and publishes them with a single commit. Updates do not take the
//! write lock, so they keep flowing while a reindex rebuilds; the rebuild
//! picks up what they committed. The store stays authoritative: a created or
//! modified resource is re-read from it, so a stale event for a resource that
//! no longer exists turns into a delete.

use crate::store::PropertySetStore;
use quarry_core::{Error, Result};
use parking_lot::Mutex;
use quarry_index::IndexManager;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

/// One repository change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A resource was created
    Created {
        /// Resource uri
        uri: String,
    },
    /// A resource's properties changed
    Modified {
        /// Resource uri
        uri: String,
    },
    /// A resource was removed
    Deleted {
        /// Resource uri
        uri: String,
        /// Also remove everything beneath it
        recursive: bool,
    },
    /// A resource's ACL changed; its whole subtree inherits the change
    AclModified {
        /// Root of the affected subtree
        uri: String,
    },
}

impl ChangeEvent {
    /// Uri the event refers to
    pub fn uri(&self) -> &str {
        match self {
            ChangeEvent::Created { uri }
            | ChangeEvent::Modified { uri }
            | ChangeEvent::Deleted { uri, .. }
            | ChangeEvent::AclModified { uri } => uri,
        }
    }
}

/// What one batch of events changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    /// Documents added or replaced
    pub upserted: usize,
    /// Delete operations issued
    pub deleted: usize,
    /// Generation visible after the commit
    pub generation: u64,
}

/// Applies change events to one index
#[derive(Clone)]
pub struct IncrementalUpdater {
    index: Arc<IndexManager>,
    store: Arc<dyn PropertySetStore>,
    /// One batch at a time per updater, shared by clones
    applying: Arc<Mutex<()>>,
}

impl IncrementalUpdater {
    /// Updater reading resources from `store`
    pub fn new(index: Arc<IndexManager>, store: Arc<dyn PropertySetStore>) -> Self {
        IncrementalUpdater {
            index,
            store,
            applying: Arc::new(Mutex::new(())),
        }
    }

    /// Apply `events` in order and commit once.
    ///
    /// # Errors
    ///
    /// Returns `Error::Index` if reading the store or writing the index
    /// fails. Nothing from a failed batch becomes visible.
    pub fn apply(&self, events: &[ChangeEvent]) -> Result<UpdateReport> {
        let _applying = self.applying.lock();

        let mut report = UpdateReport::default();
        let outcome = events
            .iter()
            .try_for_each(|event| self.apply_one(event, &mut report))
            .and_then(|_| self.index.commit());

        match outcome {
            Ok(generation) => {
                report.generation = generation;
                info!(
                    target: "quarry::index",
                    index = %self.index.id(),
                    events = events.len(),
                    upserted = report.upserted,
                    deleted = report.deleted,
                    generation,
                    "Change events applied"
                );
                Ok(report)
            }
            Err(e) => {
                self.index.rollback();
                error!(target: "quarry::index", index = %self.index.id(), error = %e, "Change batch failed");
                Err(Error::index_caused_by(
                    format!("could not apply changes to '{}'", self.index.id()),
                    e,
                ))
            }
        }
    }

    fn apply_one(&self, event: &ChangeEvent, report: &mut UpdateReport) -> Result<()> {
        debug!(target: "quarry::index", event = ?event, "Applying change");
        match event {
            ChangeEvent::Created { uri } | ChangeEvent::Modified { uri } => {
                match self.store.load(uri)? {
                    Some(record) => {
                        self.index.add_property_set(&record.properties, &record.acl)?;
                        report.upserted += 1;
                    }
                    None => {
                        self.index.delete_uri(uri, false)?;
                        report.deleted += 1;
                    }
                }
            }
            ChangeEvent::Deleted { uri, recursive } => {
                self.index.delete_uri(uri, *recursive)?;
                report.deleted += 1;
            }
            ChangeEvent::AclModified { uri } => {
                for record in self.store.load_subtree(uri)? {
                    self.index.add_property_set(&record.properties, &record.acl)?;
                    report.upserted += 1;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPropertySetStore;
    use quarry_core::{AclMetadata, PropertySet};
    use quarry_index::{IndexHandleProvider, NativeQuery, NativeSort};

    fn setup(uris: &[&str]) -> (Arc<IndexManager>, Arc<MemoryPropertySetStore>, IncrementalUpdater) {
        let index = Arc::new(IndexManager::new("main"));
        index.open().unwrap();
        let store = Arc::new(MemoryPropertySetStore::new());
        for uri in uris {
            store.put(PropertySet::new(*uri, "document"), AclMetadata::public("o", *uri));
        }
        let updater = IncrementalUpdater::new(index.clone(), store.clone());
        (index, store, updater)
    }

    fn created(uri: &str) -> ChangeEvent {
        ChangeEvent::Created {
            uri: uri.to_string(),
        }
    }

    #[test]
    fn test_created_events_single_commit() {
        let (index, _store, updater) = setup(&["/a", "/b"]);
        let before = index.generation();
        let report = updater.apply(&[created("/a"), created("/b")]).unwrap();
        assert_eq!(report.upserted, 2);
        assert_eq!(report.generation, before + 1);
        assert_eq!(index.document_count().unwrap(), 2);
        assert!(!index.is_locked());
    }

    #[test]
    fn test_modified_missing_resource_becomes_delete() {
        let (index, store, updater) = setup(&["/a"]);
        updater.apply(&[created("/a")]).unwrap();
        store.remove("/a");
        let report = updater
            .apply(&[ChangeEvent::Modified {
                uri: "/a".to_string(),
            }])
            .unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(index.document_count().unwrap(), 0);
    }

    #[test]
    fn test_recursive_delete() {
        let (index, _store, updater) = setup(&["/a", "/a/b", "/ab"]);
        updater
            .apply(&[created("/a"), created("/a/b"), created("/ab")])
            .unwrap();
        updater
            .apply(&[ChangeEvent::Deleted {
                uri: "/a".to_string(),
                recursive: true,
            }])
            .unwrap();
        assert_eq!(index.document_count().unwrap(), 1);
    }

    #[test]
    fn test_acl_change_reindexes_subtree() {
        let (index, store, updater) = setup(&["/a", "/a/b"]);
        updater.apply(&[created("/a"), created("/a/b")]).unwrap();
        store.put(
            PropertySet::new("/a/b", "document"),
            AclMetadata::new("o", "/a").with_reader("alice"),
        );
        let report = updater
            .apply(&[ChangeEvent::AclModified {
                uri: "/a".to_string(),
            }])
            .unwrap();
        assert_eq!(report.upserted, 2);
        assert_eq!(index.document_count().unwrap(), 2);

        let handle = index.acquire().unwrap();
        let top = handle
            .search(&NativeQuery::MatchAll, &NativeSort::relevance(), 10)
            .unwrap();
        let holders: Vec<String> = top
            .score_docs
            .iter()
            .map(|sd| handle.security_info(sd.doc_ref).unwrap().acl_holder)
            .collect();
        assert!(holders.contains(&"/a".to_string()));
    }

    #[test]
    fn test_applies_while_rebuild_holds_lock() {
        let (index, store, updater) = setup(&["/a"]);
        updater.apply(&[created("/a")]).unwrap();

        let rebuild = index.try_write_lock().unwrap();
        rebuild.clear_contents().unwrap();
        rebuild
            .add_property_set(&PropertySet::new("/a", "document"), &AclMetadata::public("o", "/a"))
            .unwrap();

        store.put(PropertySet::new("/b", "document"), AclMetadata::public("o", "/b"));
        let report = updater.apply(&[created("/b")]).unwrap();
        assert_eq!(report.upserted, 1);
        assert_eq!(index.document_count().unwrap(), 2);
        assert!(index.is_locked());

        rebuild.commit().unwrap();
        drop(rebuild);
        assert_eq!(index.document_count().unwrap(), 2);
    }

    #[test]
    fn test_failed_batch_is_rolled_back() {
        let (index, _store, updater) = setup(&["/a"]);
        index.close().unwrap();
        let err = updater.apply(&[created("/a")]).unwrap_err();
        assert!(matches!(err, Error::Index { .. }));
        assert_eq!(index.pending_documents(), 0);
    }
}
