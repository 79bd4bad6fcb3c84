//! Registry of open indexes
//!
//! Ensures there is exactly one [`IndexManager`] per logical index id within
//! a registry. Registries are plain values owned by the embedding service;
//! there is no process-wide instance.

use crate::manager::IndexManager;
use dashmap::DashMap;
use quarry_core::Result;
use std::sync::Arc;
use tracing::info;

/// Logical index id -> manager
#[derive(Debug, Default)]
pub struct IndexRegistry {
    indexes: DashMap<String, Arc<IndexManager>>,
}

impl IndexRegistry {
    /// Empty registry
    pub fn new() -> Self {
        IndexRegistry::default()
    }

    /// Return the open index with this id, creating and opening it if needed.
    ///
    /// # Errors
    ///
    /// Fails if the registered index has been closed.
    pub fn get_or_open(&self, id: &str) -> Result<Arc<IndexManager>> {
        let manager = self
            .indexes
            .entry(id.to_string())
            .or_insert_with(|| {
                info!(target: "quarry::index", index = %id, "Registering index");
                Arc::new(IndexManager::new(id))
            })
            .clone();
        manager.open()?;
        Ok(manager)
    }

    /// Registered index, if any
    pub fn get(&self, id: &str) -> Option<Arc<IndexManager>> {
        self.indexes.get(id).map(|m| Arc::clone(m.value()))
    }

    /// Unregister and close an index.
    ///
    /// Returns the manager so callers can inspect it; it stays closed.
    ///
    /// # Errors
    ///
    /// Fails, leaving the index registered, if it is locked for write.
    pub fn remove(&self, id: &str) -> Result<Option<Arc<IndexManager>>> {
        let Some(manager) = self.get(id) else {
            return Ok(None);
        };
        manager.close()?;
        self.indexes.remove(id);
        Ok(Some(manager))
    }

    /// Ids of all registered indexes, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.indexes.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Number of registered indexes
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    /// True if no index is registered
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::IndexState;

    #[test]
    fn test_same_id_same_manager() {
        let registry = IndexRegistry::new();
        let a = registry.get_or_open("main").unwrap();
        let b = registry.get_or_open("main").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.state(), IndexState::Open);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_distinct_ids() {
        let registry = IndexRegistry::new();
        registry.get_or_open("b").unwrap();
        registry.get_or_open("a").unwrap();
        assert_eq!(registry.ids(), vec!["a", "b"]);
        assert!(registry.get("c").is_none());
    }

    #[test]
    fn test_remove_closes() {
        let registry = IndexRegistry::new();
        let m = registry.get_or_open("main").unwrap();
        let removed = registry.remove("main").unwrap().unwrap();
        assert!(Arc::ptr_eq(&m, &removed));
        assert_eq!(m.state(), IndexState::Closed);
        assert!(registry.is_empty());
        assert!(registry.remove("main").unwrap().is_none());
    }

    #[test]
    fn test_remove_refused_while_locked() {
        let registry = IndexRegistry::new();
        let m = registry.get_or_open("main").unwrap();
        assert!(m.lock());
        assert!(registry.remove("main").is_err());
        assert_eq!(registry.len(), 1);
        m.unlock();
    }
}
