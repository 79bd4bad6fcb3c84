//! Quarry - authorization-aware search for content repositories
//!
//! Quarry searches an index of repository resources and returns only the hits
//! the caller may read, page by page, without authorizing more raw hits than
//! the page needs.
//!
//! # Quick Start
//!
//! ```ignore
//! use quarry::{Query, Search, SearchConfig, SearchService};
//!
//! let service = SearchService::new(config, index, resolver, None, store)?;
//! service.reindex()?;
//!
//! let page = service.execute(Some(&token), &Search::new(Query::term("title", "report")))?;
//! for item in &page.items {
//!     println!("{}", item.uri);
//! }
//! ```
//!
//! # Architecture
//!
//! - `quarry-core`: data model, errors and configuration
//! - `quarry-index`: segments, snapshots, query compilation and the index lifecycle
//! - `quarry-security`: batch authorization strategies
//! - `quarry-search`: the executor, reindexer, updater and the service facade

pub use quarry_core::*;
pub use quarry_index as index;
pub use quarry_search::{
    ChangeEvent, IncrementalUpdater, MemoryPropertySetStore, PropertySetRecord, PropertySetStore,
    ReindexReport, Reindexer, ResultAssembler, SearchExecutor, SearchService, UpdateReport,
};
pub use quarry_security as security;
