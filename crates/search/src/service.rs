//! Search service facade
//!
//! Wires one index, the authorization stack and the property set store into
//! the operations callers use: searching, full reindexing, write locking,
//! status and incremental change application.

use crate::executor::SearchExecutor;
use crate::reindex::{ReindexReport, Reindexer};
use crate::store::PropertySetStore;
use crate::updater::{ChangeEvent, IncrementalUpdater, UpdateReport};
use quarry_core::{Result, ResultSet, Search, SearchConfig};
use quarry_index::{IndexManager, IndexStatus};
use quarry_security::{PrincipalResolver, Repository, SearchAuthorizer};
use std::sync::Arc;
use tracing::info;

/// Search, reindex and maintenance operations over one index
///
/// # Example
///
/// ```
/// use quarry_core::{AclMetadata, PropertySet, Query, Search, SearchConfig};
/// use quarry_index::IndexManager;
/// use quarry_search::{MemoryPropertySetStore, SearchService};
/// use quarry_security::PrincipalRegistry;
/// use std::sync::Arc;
///
/// let store = Arc::new(MemoryPropertySetStore::new());
/// store.put(PropertySet::new("/docs/a", "document"), AclMetadata::public("alice", "/docs"));
///
/// let service = SearchService::new(
///     SearchConfig::default(),
///     Arc::new(IndexManager::new("main")),
///     Arc::new(PrincipalRegistry::new()),
///     None,
///     store,
/// )?;
/// service.reindex()?;
///
/// let result = service.execute(None, &Search::new(Query::MatchAll))?;
/// assert_eq!(result.uris(), vec!["/docs/a"]);
/// # Ok::<(), quarry_core::Error>(())
/// ```
pub struct SearchService {
    config: SearchConfig,
    index: Arc<IndexManager>,
    executor: SearchExecutor,
    reindexer: Reindexer,
    updater: IncrementalUpdater,
}

impl SearchService {
    /// Build the service and open the index.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration is invalid or names the
    /// repository lookup strategy without a `repository`, and
    /// `Error::IndexClosed` if the index was already closed.
    pub fn new(
        config: SearchConfig,
        index: Arc<IndexManager>,
        resolver: Arc<dyn PrincipalResolver>,
        repository: Option<Arc<dyn Repository>>,
        store: Arc<dyn PropertySetStore>,
    ) -> Result<Self> {
        config.validate()?;
        index.open()?;

        let authorizer = SearchAuthorizer::from_config(&config, resolver, repository)?;
        info!(
            target: "quarry::search",
            index = %index.id(),
            strategy = authorizer.strategy().name(),
            internal_search_cap = config.internal_search_cap,
            growth_factor = config.growth_factor,
            "Search service ready"
        );

        let executor = SearchExecutor::new(index.clone(), Arc::new(authorizer), &config);
        let reindexer = Reindexer::new(
            index.clone(),
            store.clone(),
            config.reindex_progress_interval,
        );
        let updater = IncrementalUpdater::new(index.clone(), store);

        Ok(SearchService {
            config,
            index,
            executor,
            reindexer,
            updater,
        })
    }

    /// Run a search for the caller identified by `token`
    pub fn execute(&self, token: Option<&str>, search: &Search) -> Result<ResultSet> {
        self.executor.execute(token, search)
    }

    /// Rebuild the index from the store
    pub fn reindex(&self) -> Result<ReindexReport> {
        self.reindexer.run()
    }

    /// Take the write lock; false if it is already held or the index is not open
    pub fn lock(&self) -> bool {
        self.index.lock()
    }

    /// Release the write lock
    pub fn unlock(&self) {
        self.index.unlock()
    }

    /// Current index status
    pub fn status(&self) -> Result<IndexStatus> {
        self.index.status()
    }

    /// Apply repository changes with a single commit
    pub fn apply_changes(&self, events: &[ChangeEvent]) -> Result<UpdateReport> {
        self.updater.apply(events)
    }

    /// Active configuration
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Underlying index
    pub fn index(&self) -> &Arc<IndexManager> {
        &self.index
    }
}
