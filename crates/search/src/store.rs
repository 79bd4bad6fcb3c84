//! Source-of-truth property set store
//!
//! The reindexer and the incremental updater read resources from a
//! [`PropertySetStore`]. Iteration is in ascending uri order so a reindex
//! visits resources deterministically.

use parking_lot::RwLock;
use quarry_core::{is_descendant_uri, AclMetadata, PropertySet, Result};
use std::collections::BTreeMap;
use std::ops::Bound;

/// One resource with its effective ACL data
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySetRecord {
    /// Indexed properties
    pub properties: PropertySet,
    /// Denormalized ACL data
    pub acl: AclMetadata,
}

impl PropertySetRecord {
    /// New record
    pub fn new(properties: PropertySet, acl: AclMetadata) -> Self {
        PropertySetRecord { properties, acl }
    }

    /// Resource uri
    pub fn uri(&self) -> &str {
        &self.properties.uri
    }
}

/// Repository persistence as seen by the indexer
pub trait PropertySetStore: Send + Sync {
    /// Stream every record in ascending uri order.
    ///
    /// Stops at, and returns, the first error of the store or the handler.
    fn ordered_iteration(
        &self,
        handler: &mut dyn FnMut(PropertySetRecord) -> Result<()>,
    ) -> Result<()>;

    /// Record of one resource, `None` if it does not exist
    fn load(&self, uri: &str) -> Result<Option<PropertySetRecord>>;

    /// Records of `uri` and everything beneath it, in ascending uri order
    fn load_subtree(&self, uri: &str) -> Result<Vec<PropertySetRecord>> {
        let mut out = Vec::new();
        self.ordered_iteration(&mut |record| {
            if is_descendant_uri(uri, record.uri()) {
                out.push(record);
            }
            Ok(())
        })?;
        Ok(out)
    }
}

/// In-memory store keyed by uri
#[derive(Debug, Default)]
pub struct MemoryPropertySetStore {
    records: RwLock<BTreeMap<String, PropertySetRecord>>,
}

impl MemoryPropertySetStore {
    /// Empty store
    pub fn new() -> Self {
        MemoryPropertySetStore::default()
    }

    /// Insert or replace a record
    pub fn put(&self, properties: PropertySet, acl: AclMetadata) {
        let record = PropertySetRecord::new(properties, acl);
        self.records
            .write()
            .insert(record.uri().to_string(), record);
    }

    /// Remove a record; returns true if it existed
    pub fn remove(&self, uri: &str) -> bool {
        self.records.write().remove(uri).is_some()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// True if the store is empty
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl PropertySetStore for MemoryPropertySetStore {
    fn ordered_iteration(
        &self,
        handler: &mut dyn FnMut(PropertySetRecord) -> Result<()>,
    ) -> Result<()> {
        // The lock is taken per record so handlers may write to the store.
        let mut after: Option<String> = None;
        loop {
            let next = {
                let records = self.records.read();
                let lower = match &after {
                    Some(uri) => Bound::Excluded(uri.as_str()),
                    None => Bound::Unbounded,
                };
                records
                    .range::<str, _>((lower, Bound::Unbounded))
                    .next()
                    .map(|(_, r)| r.clone())
            };
            let Some(record) = next else {
                return Ok(());
            };
            after = Some(record.uri().to_string());
            handler(record)?;
        }
    }

    fn load(&self, uri: &str) -> Result<Option<PropertySetRecord>> {
        Ok(self.records.read().get(uri).cloned())
    }

    fn load_subtree(&self, uri: &str) -> Result<Vec<PropertySetRecord>> {
        let records = self.records.read();
        Ok(records
            .range::<str, _>((Bound::Included(uri), Bound::Unbounded))
            .take_while(|(u, _)| u.starts_with(uri))
            .filter(|(u, _)| is_descendant_uri(uri, u))
            .map(|(_, r)| r.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::Error;

    fn store(uris: &[&str]) -> MemoryPropertySetStore {
        let s = MemoryPropertySetStore::new();
        for uri in uris {
            s.put(PropertySet::new(*uri, "document"), AclMetadata::public("o", "/"));
        }
        s
    }

    fn iterate(s: &dyn PropertySetStore) -> Vec<String> {
        let mut seen = Vec::new();
        s.ordered_iteration(&mut |r| {
            seen.push(r.uri().to_string());
            Ok(())
        })
        .unwrap();
        seen
    }

    #[test]
    fn test_iteration_is_ascending() {
        let s = store(&["/c", "/a/b", "/a", "/b"]);
        assert_eq!(iterate(&s), vec!["/a", "/a/b", "/b", "/c"]);
    }

    #[test]
    fn test_handler_error_stops_iteration() {
        let s = store(&["/a", "/b", "/c"]);
        let mut seen = 0;
        let result = s.ordered_iteration(&mut |_| {
            seen += 1;
            if seen == 2 {
                return Err(Error::index("handler failed"));
            }
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_handler_may_write_to_store() {
        let s = store(&["/a", "/b"]);
        let mut seen = Vec::new();
        s.ordered_iteration(&mut |r| {
            if r.uri() == "/a" {
                s.put(PropertySet::new("/a2", "document"), AclMetadata::public("o", "/"));
            }
            seen.push(r.uri().to_string());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec!["/a", "/a2", "/b"]);
    }

    #[test]
    fn test_load_subtree() {
        let s = store(&["/a", "/a/b", "/ab", "/a/b/c"]);
        let uris: Vec<String> = s
            .load_subtree("/a")
            .unwrap()
            .iter()
            .map(|r| r.uri().to_string())
            .collect();
        assert_eq!(uris, vec!["/a", "/a/b", "/a/b/c"]);
        assert!(s.load("/zzz").unwrap().is_none());
    }
}
