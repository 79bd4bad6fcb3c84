//! Index engine and lifecycle management for quarry
//!
//! This crate provides:
//! - Segment / Snapshot: immutable, copy-on-write index state
//! - QueryBuilder / SortBuilder: `Query` and `Sorting` to native objects
//! - IndexHandle / IndexHandleProvider: scoped read access to a snapshot
//! - IndexManager: lock, clear, add, delete, commit, optimize, status
//! - IndexRegistry: one manager per logical index id
//!
//! # Example
//!
//! ```
//! use quarry_core::{AclMetadata, PropertySet, Query, Sorting};
//! use quarry_index::{IndexHandleProvider, IndexManager, QueryBuilder, SortBuilder};
//!
//! let index = IndexManager::new("main");
//! index.open().unwrap();
//! index
//!     .add_property_set(
//!         &PropertySet::new("/docs/a", "document").with("title", "Annual report"),
//!         &AclMetadata::public("alice", "/docs"),
//!     )
//!     .unwrap();
//! index.commit().unwrap();
//!
//! let query = QueryBuilder.build(&Query::term("title", "report")).unwrap();
//! let sort = SortBuilder.build(&Sorting::relevance()).unwrap();
//! let handle = index.acquire().unwrap();
//! assert_eq!(handle.search(&query, &sort, 10).unwrap().total_hits, 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod handle;
pub mod manager;
pub mod native;
pub mod registry;
pub mod segment;
pub mod snapshot;
pub mod tokenizer;

pub use document::{Document, StoredDocument, RESOURCE_TYPE_FIELD, SCORE_FIELD, URI_FIELD};
pub use handle::{HandleTracker, IndexHandle, IndexHandleProvider};
pub use manager::{IndexManager, IndexState, IndexStatus, WriteLock};
pub use native::{NativeQuery, NativeSort, QueryBuilder, SortBuilder, SortKey, SortTarget};
pub use registry::IndexRegistry;
pub use segment::Segment;
pub use snapshot::{IndexSnapshot, ScoreDoc, SegmentReader, Snapshot, TopDocs};
