//! Authorization-aware search for quarry
//!
//! This crate provides:
//! - SearchExecutor: pages of authorized hits via the expansion loop
//! - ResultAssembler: stored fields of hits to property sets
//! - PropertySetStore: the source of truth the indexer reads from
//! - Reindexer: full rebuild under the write lock
//! - IncrementalUpdater: change events applied with a single commit
//! - SearchService: the facade wiring all of the above to one index
//!
//! # Usage
//!
//! ```ignore
//! use quarry_search::SearchService;
//!
//! let service = SearchService::new(config, index, resolver, None, store)?;
//! service.reindex()?;
//! let page = service.execute(Some(token), &Search::new(query).with_limit(20))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assembler;
pub mod executor;
pub mod reindex;
pub mod service;
pub mod store;
pub mod updater;

pub use assembler::ResultAssembler;
pub use executor::SearchExecutor;
pub use reindex::{ReindexReport, Reindexer};
pub use service::SearchService;
pub use store::{MemoryPropertySetStore, PropertySetRecord, PropertySetStore};
pub use updater::{ChangeEvent, IncrementalUpdater, UpdateReport};
