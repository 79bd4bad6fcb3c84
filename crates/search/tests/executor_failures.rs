//! Failure-path tests for quarry-search
//!
//! Faults are injected at the two outbound seams of the executor:
//!
//! 1. **Index Faults** - a snapshot whose search or document load fails
//! 2. **Authorization Faults** - authorizers that error, leave hits undecided
//!    or swap the batch
//! 3. **Trusted Bypass** - the unfiltered ceiling surfaces unchanged
//! 4. **Legacy Lookup** - per-hit repository failures drop hits, not the call
//! 5. **Reindex Faults** - a failing store leaves the index usable
//!
//! In every case the index handle taken for the call must be released.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use quarry_core::{
    AclMetadata, AuthorizationMode, DocRef, Error, FieldSelection, Principal, PropertySet, Query,
    Result, Search, SearchConfig, SecurityInfo, SortDirection, Sorting,
};
use quarry_index::{
    Document, HandleTracker, IndexHandle, IndexHandleProvider, IndexManager, IndexSnapshot,
    NativeQuery, NativeSort, TopDocs,
};
use quarry_search::{
    MemoryPropertySetStore, PropertySetRecord, PropertySetStore, Reindexer, SearchExecutor,
};
use quarry_security::{
    AuthorizationBatch, BatchAuthorizer, PrincipalRegistry, Repository, RepositoryError,
    SearchAuthorizer,
};

// ============================================================================
// Test Helpers
// ============================================================================

/// `n` documents `/d000..`; every `every`-th one is public, the rest are
/// readable by `alice` only
fn populated(n: usize, every: usize) -> Arc<IndexManager> {
    let index = Arc::new(IndexManager::new("faults"));
    index.open().unwrap();
    for i in 0..n {
        let uri = format!("/d{:03}", i);
        let acl = if i % every == 0 {
            AclMetadata::public("owner", uri.as_str())
        } else {
            AclMetadata::new("owner", uri.as_str()).with_reader("alice")
        };
        index
            .add_property_set(&PropertySet::new(uri.as_str(), "document"), &acl)
            .unwrap();
    }
    index.commit().unwrap();
    index
}

fn by_uri(limit: usize) -> Search {
    Search::new(Query::MatchAll)
        .with_sorting(Sorting::relevance().then("uri", SortDirection::Ascending))
        .with_limit(limit)
}

fn denormalized(config: &SearchConfig) -> Arc<SearchAuthorizer> {
    Arc::new(SearchAuthorizer::from_config(config, Arc::new(PrincipalRegistry::new()), None).unwrap())
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    /// Search fails from the given round on (1-based)
    SearchFromRound(usize),
    /// Every document load fails
    Document,
}

/// Snapshot delegating to a real one, with one injected fault
#[derive(Debug)]
struct FaultySnapshot {
    inner: Arc<dyn IndexSnapshot>,
    fault: Fault,
    searches: AtomicUsize,
}

impl IndexSnapshot for FaultySnapshot {
    fn generation(&self) -> u64 {
        self.inner.generation()
    }

    fn search(&self, query: &NativeQuery, sort: &NativeSort, limit: usize) -> Result<TopDocs> {
        let round = self.searches.fetch_add(1, Ordering::SeqCst) + 1;
        match self.fault {
            Fault::SearchFromRound(from) if round >= from => Err(Error::Io(
                std::io::Error::new(std::io::ErrorKind::Other, "segment read failed"),
            )),
            _ => self.inner.search(query, sort, limit),
        }
    }

    fn document(&self, doc_ref: DocRef, selection: &FieldSelection) -> Result<Document> {
        match self.fault {
            Fault::Document => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "stored fields unreadable",
            ))),
            _ => self.inner.document(doc_ref, selection),
        }
    }

    fn security_info(&self, doc_ref: DocRef) -> Result<SecurityInfo> {
        self.inner.security_info(doc_ref)
    }

    fn document_count(&self) -> Result<usize> {
        self.inner.document_count()
    }

    fn has_deletions(&self) -> Result<bool> {
        self.inner.has_deletions()
    }

    fn field_names(&self) -> Result<BTreeSet<String>> {
        self.inner.field_names()
    }

    fn physical_size(&self) -> Result<u64> {
        self.inner.physical_size()
    }
}

/// Provider handing out faulty views of a real index
struct FaultyProvider {
    index: Arc<IndexManager>,
    tracker: Arc<HandleTracker>,
    fault: Fault,
}

impl FaultyProvider {
    fn new(index: Arc<IndexManager>, fault: Fault) -> Arc<Self> {
        Arc::new(FaultyProvider {
            index,
            tracker: HandleTracker::new(),
            fault,
        })
    }
}

impl IndexHandleProvider for FaultyProvider {
    fn acquire(&self) -> Result<IndexHandle> {
        let inner = Arc::clone(self.index.acquire()?.snapshot());
        Ok(self.tracker.track(Arc::new(FaultySnapshot {
            inner,
            fault: self.fault,
            searches: AtomicUsize::new(0),
        })))
    }
}

/// Authorizer that fails on a given call
struct FailingAuthorizer {
    fail_on_call: usize,
    calls: AtomicUsize,
    inner: Arc<SearchAuthorizer>,
}

impl BatchAuthorizer for FailingAuthorizer {
    fn authorize(&self, token: Option<&str>, batch: &mut AuthorizationBatch) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on_call {
            return Err(Error::Authorization("policy store unavailable".to_string()));
        }
        self.inner.authorize(token, batch)
    }
}

/// Authorizer that decides only the first candidate
struct IncompleteAuthorizer;

impl BatchAuthorizer for IncompleteAuthorizer {
    fn authorize(&self, _token: Option<&str>, batch: &mut AuthorizationBatch) -> Result<()> {
        if let Some(first) = batch.candidates_mut().first_mut() {
            first.set_authorized(true);
        }
        Ok(())
    }
}

/// Authorizer that swaps the batch for one holding only its first candidate
struct TruncatingAuthorizer;

impl BatchAuthorizer for TruncatingAuthorizer {
    fn authorize(&self, _token: Option<&str>, batch: &mut AuthorizationBatch) -> Result<()> {
        let kept = batch.candidates()[..1.min(batch.len())].to_vec();
        *batch = AuthorizationBatch::new(batch.total_hits, kept);
        batch.decide_all(true);
        Ok(())
    }
}

// ============================================================================
// Index Faults
// ============================================================================

#[test]
fn test_search_failure_in_later_round_releases_handle() {
    let provider = FaultyProvider::new(populated(100, 10), Fault::SearchFromRound(2));
    let executor = SearchExecutor::new(
        provider.clone(),
        denormalized(&SearchConfig::default()),
        &SearchConfig::default(),
    );

    let err = executor.execute(None, &by_uri(8)).unwrap_err();

    assert!(matches!(err, Error::QueryExecution { .. }));
    assert!(std::error::Error::source(&err).is_some());
    assert_eq!(provider.tracker.open_handles(), 0);
    assert_eq!(provider.tracker.total_acquired(), 1);
}

#[test]
fn test_document_load_failure_releases_handle() {
    let provider = FaultyProvider::new(populated(10, 1), Fault::Document);
    let executor = SearchExecutor::new(
        provider.clone(),
        denormalized(&SearchConfig::default()),
        &SearchConfig::default(),
    );

    let err = executor.execute(None, &by_uri(3)).unwrap_err();

    assert!(matches!(err, Error::QueryExecution { .. }));
    assert_eq!(provider.tracker.open_handles(), 0);
}

#[test]
fn test_empty_page_never_loads_documents() {
    let provider = FaultyProvider::new(populated(10, 1), Fault::Document);
    let executor = SearchExecutor::new(
        provider.clone(),
        denormalized(&SearchConfig::default()),
        &SearchConfig::default(),
    );

    let result = executor.execute(None, &by_uri(0)).unwrap();

    assert!(result.is_empty());
    assert_eq!(result.total_hits, 10);
    assert_eq!(provider.tracker.open_handles(), 0);
}

// ============================================================================
// Authorization Faults
// ============================================================================

#[test]
fn test_authorizer_error_is_query_execution() {
    let config = SearchConfig::default();
    let provider = FaultyProvider::new(populated(100, 10), Fault::SearchFromRound(usize::MAX));
    let authorizer = Arc::new(FailingAuthorizer {
        fail_on_call: 2,
        calls: AtomicUsize::new(0),
        inner: denormalized(&config),
    });
    let executor = SearchExecutor::new(provider.clone(), authorizer.clone(), &config);

    let err = executor.execute(None, &by_uri(8)).unwrap_err();

    match &err {
        Error::QueryExecution { source, .. } => {
            let cause = source.as_ref().map(|s| s.to_string()).unwrap_or_default();
            assert!(cause.contains("policy store unavailable"));
        }
        other => panic!("expected QueryExecution, got {:?}", other),
    }
    assert_eq!(authorizer.calls.load(Ordering::SeqCst), 2);
    assert_eq!(provider.tracker.open_handles(), 0);
}

#[test]
fn test_incomplete_batch_is_rejected() {
    let provider = FaultyProvider::new(populated(5, 1), Fault::SearchFromRound(usize::MAX));
    let executor = SearchExecutor::new(
        provider.clone(),
        Arc::new(IncompleteAuthorizer),
        &SearchConfig::default(),
    );

    let err = executor.execute(None, &by_uri(5)).unwrap_err();

    assert!(matches!(err, Error::QueryExecution { .. }));
    assert_eq!(provider.tracker.open_handles(), 0);
}

#[test]
fn test_replaced_batch_fails_the_call() {
    let provider = FaultyProvider::new(populated(10, 1), Fault::SearchFromRound(usize::MAX));
    let executor = SearchExecutor::new(
        provider.clone(),
        Arc::new(TruncatingAuthorizer),
        &SearchConfig::default(),
    );

    let err = executor.execute(None, &by_uri(5)).unwrap_err();

    assert!(matches!(err, Error::QueryExecution { .. }));
    assert_eq!(provider.tracker.open_handles(), 0);
}

#[test]
fn test_unknown_token_fails_the_call() {
    let config = SearchConfig::default();
    let executor = SearchExecutor::new(populated(5, 1), denormalized(&config), &config);

    let err = executor.execute(Some("forged"), &by_uri(5)).unwrap_err();

    assert!(matches!(err, Error::QueryExecution { .. }));
}

// ============================================================================
// Trusted Bypass
// ============================================================================

#[test]
fn test_bypass_returns_everything_within_ceiling() {
    let config = SearchConfig::default()
        .with_no_filter_principal("indexer")
        .with_max_unfiltered_results(50);
    let registry = Arc::new(PrincipalRegistry::new());
    let token = registry.issue(Principal::new("indexer"));
    let authorizer =
        Arc::new(SearchAuthorizer::from_config(&config, registry, None).unwrap());
    let executor = SearchExecutor::new(populated(30, 10), authorizer, &config);

    let result = executor.execute(Some(&token), &by_uri(30)).unwrap();

    assert_eq!(result.len(), 30);
    assert_eq!(result.stats.rounds, 1);
}

#[test]
fn test_bypass_ceiling_passes_through() {
    let config = SearchConfig::default()
        .with_no_filter_principal("indexer")
        .with_max_unfiltered_results(20);
    let registry = Arc::new(PrincipalRegistry::new());
    let token = registry.issue(Principal::new("indexer"));
    let authorizer =
        Arc::new(SearchAuthorizer::from_config(&config, registry, None).unwrap());
    let provider = FaultyProvider::new(populated(30, 10), Fault::SearchFromRound(usize::MAX));
    let executor = SearchExecutor::new(provider.clone(), authorizer, &config);

    let err = executor.execute(Some(&token), &by_uri(5)).unwrap_err();

    assert!(matches!(err, Error::TooManyResults { total: 30, max: 20 }));
    assert_eq!(provider.tracker.open_handles(), 0);
}

// ============================================================================
// Legacy Lookup
// ============================================================================

/// Repository that denies odd documents and cannot find `/d004`
struct PickyRepository;

impl Repository for PickyRepository {
    fn retrieve(&self, _token: Option<&str>, uri: &str) -> std::result::Result<(), RepositoryError> {
        let n: usize = uri.trim_start_matches("/d").parse().unwrap_or(0);
        if n == 4 {
            return Err(RepositoryError::NotFound(uri.to_string()));
        }
        if n % 2 == 1 {
            return Err(RepositoryError::Authorization(uri.to_string()));
        }
        Ok(())
    }
}

#[test]
fn test_lookup_failures_drop_hits() {
    let config = SearchConfig::default().with_authorization(AuthorizationMode::RepositoryLookup);
    let repository: Arc<dyn Repository> = Arc::new(PickyRepository);
    let authorizer = Arc::new(
        SearchAuthorizer::from_config(&config, Arc::new(PrincipalRegistry::new()), Some(repository))
            .unwrap(),
    );
    let executor = SearchExecutor::new(populated(10, 1), authorizer, &config);

    let result = executor.execute(None, &by_uri(10)).unwrap();

    assert_eq!(result.uris(), vec!["/d000", "/d002", "/d006", "/d008"]);
    assert_eq!(result.total_hits, 10);
}

// ============================================================================
// Reindex Faults
// ============================================================================

/// Store that fails after yielding a few records
struct BrokenStore {
    yield_before_failure: usize,
}

impl PropertySetStore for BrokenStore {
    fn ordered_iteration(
        &self,
        handler: &mut dyn FnMut(PropertySetRecord) -> Result<()>,
    ) -> Result<()> {
        for i in 0..self.yield_before_failure {
            handler(PropertySetRecord::new(
                PropertySet::new(format!("/new{}", i), "document"),
                AclMetadata::public("owner", "/"),
            ))?;
        }
        Err(Error::index("storage node went away"))
    }

    fn load(&self, _uri: &str) -> Result<Option<PropertySetRecord>> {
        Ok(None)
    }
}

#[test]
fn test_failed_reindex_keeps_serving_old_contents() {
    let index = populated(6, 1);
    let config = SearchConfig::default();
    let executor = SearchExecutor::new(index.clone(), denormalized(&config), &config);

    let err = Reindexer::new(
        index.clone(),
        Arc::new(BrokenStore {
            yield_before_failure: 3,
        }),
        1,
    )
    .run()
    .unwrap_err();

    assert!(matches!(err, Error::Index { .. }));
    assert!(!index.is_locked());
    let result = executor.execute(None, &by_uri(10)).unwrap();
    assert_eq!(result.len(), 6);
    assert_eq!(result.uris()[0], "/d000");

    let store = Arc::new(MemoryPropertySetStore::new());
    store.put(
        PropertySet::new("/fresh", "document"),
        AclMetadata::public("owner", "/"),
    );
    Reindexer::new(index.clone(), store, 1).run().unwrap();
    let result = executor.execute(None, &by_uri(10)).unwrap();
    assert_eq!(result.uris(), vec!["/fresh"]);
    assert_eq!(index.open_handles(), 0);
}
