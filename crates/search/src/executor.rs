//! Authorization-aware search executor
//!
//! Runs a [`Search`] against one pinned index snapshot and returns the
//! requested page of *authorized* hits.
//!
//! # Expansion loop
//!
//! ```text
//! need         = cursor + limit
//! search_limit = min(need, cap)
//!
//! loop:
//!   top  = search(query, sort, search_limit)
//!   authorize top[score_doc_pos..]          (each raw hit exactly once)
//!   stop if have >= need
//!   stop if top.total_hits == len(top)      (index exhausted)
//!   stop if search_limit == cap             (ceiling reached)
//!   score_doc_pos = len(top)
//!   search_limit  = min(search_limit * growth_factor, cap)
//!
//! page = authorized[cursor .. min(need, have)]
//! ```
//!
//! All loop state lives in the call frame; the executor itself is immutable
//! and can serve concurrent calls.

use crate::assembler::ResultAssembler;
use quarry_core::{
    AuthorizationDecision, DocRef, Error, Result, ResultSet, Search, SearchConfig, SearchStats,
};
use quarry_index::{
    IndexHandle, IndexHandleProvider, NativeQuery, NativeSort, QueryBuilder, SortBuilder,
};
use quarry_security::{AuthorizationBatch, BatchAuthorizer};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

// ============================================================================
// SearchExecutor
// ============================================================================

/// Executes searches page by page with authorization backpressure
#[derive(Clone)]
pub struct SearchExecutor {
    provider: Arc<dyn IndexHandleProvider>,
    authorizer: Arc<dyn BatchAuthorizer>,
    internal_search_cap: usize,
    growth_factor: usize,
    assembler: ResultAssembler,
}

/// Authorized hits of one call, in sort order
struct Expansion {
    total_hits: usize,
    authorized: Vec<DocRef>,
    stats: SearchStats,
}

impl SearchExecutor {
    /// Executor over an index and an authorizer, tuned by `config`
    pub fn new(
        provider: Arc<dyn IndexHandleProvider>,
        authorizer: Arc<dyn BatchAuthorizer>,
        config: &SearchConfig,
    ) -> Self {
        SearchExecutor {
            provider,
            authorizer,
            internal_search_cap: config.internal_search_cap,
            growth_factor: config.growth_factor.max(2),
            assembler: ResultAssembler,
        }
    }

    /// Run a search for the caller identified by `token` (`None` = anonymous).
    ///
    /// Zero results is not an error. The returned `total_hits` is the raw
    /// match count of the index, an upper bound on what the caller may see.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidQuery` if the query or sort cannot be compiled
    /// - `Error::TooManyResults` if a trusted caller's raw result exceeds the
    ///   unfiltered ceiling
    /// - `Error::QueryExecution` for any index or authorization failure
    pub fn execute(&self, token: Option<&str>, search: &Search) -> Result<ResultSet> {
        let start = Instant::now();
        let query = QueryBuilder.build(&search.query)?;
        let sort = SortBuilder.build(&search.sorting)?;

        let handle = self
            .provider
            .acquire()
            .map_err(|e| Error::query_execution_caused_by("could not acquire index handle", e))?;

        let need = search.need();
        let mut expansion = self.expand(token, &handle, &query, &sort, need)?;

        let have = expansion.authorized.len();
        let page: &[DocRef] = if search.cursor < have {
            &expansion.authorized[search.cursor..need.min(have)]
        } else {
            &[]
        };
        let documents = page
            .iter()
            .map(|doc_ref| handle.document(*doc_ref, &search.field_selection))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| Error::query_execution_caused_by("could not load hit document", e))?;
        drop(handle);

        let items = self.assembler.assemble(documents);
        let truncated = expansion.stats.cap_reached && have < need;
        expansion.stats.elapsed_micros = start.elapsed().as_micros() as u64;

        debug!(
            target: "quarry::search",
            total_hits = expansion.total_hits,
            authorized = have,
            returned = items.len(),
            rounds = expansion.stats.rounds,
            truncated,
            elapsed_micros = expansion.stats.elapsed_micros,
            "Search complete"
        );

        Ok(ResultSet {
            total_hits: i64::try_from(expansion.total_hits).unwrap_or(i64::MAX),
            items,
            truncated,
            stats: expansion.stats,
        })
    }

    fn expand(
        &self,
        token: Option<&str>,
        handle: &IndexHandle,
        query: &NativeQuery,
        sort: &NativeSort,
        need: usize,
    ) -> Result<Expansion> {
        let cap = self.internal_search_cap;
        let mut search_limit = need.min(cap);
        let mut score_doc_pos = 0;
        let mut authorized: Vec<DocRef> = Vec::new();
        let mut stats = SearchStats::default();

        loop {
            let top = handle
                .search(query, sort, search_limit)
                .map_err(|e| Error::query_execution_caused_by("index search failed", e))?;
            stats.rounds += 1;
            stats.search_limit = search_limit;

            let len = top.score_docs.len();
            if score_doc_pos < len {
                let candidates = top.score_docs[score_doc_pos..]
                    .iter()
                    .map(|sd| handle.security_info(sd.doc_ref))
                    .collect::<Result<Vec<_>>>()
                    .map_err(|e| {
                        Error::query_execution_caused_by("could not read hit security data", e)
                    })?;
                let submitted: Vec<DocRef> = candidates.iter().map(|c| c.doc_ref).collect();
                let mut batch = AuthorizationBatch::new(top.total_hits, candidates);
                self.authorizer
                    .authorize(token, &mut batch)
                    .and_then(|_| batch.decisions())
                    .and_then(|decisions| covering(&submitted, decisions))
                    .map_err(authorization_failure)?
                    .into_iter()
                    .filter(|d| d.authorized)
                    .for_each(|d| authorized.push(d.doc_ref));
                stats.raw_hits_authorized += submitted.len();
            }

            debug!(
                target: "quarry::search",
                round = stats.rounds,
                search_limit,
                total_hits = top.total_hits,
                raw_hits = len,
                have = authorized.len(),
                need,
                "Expansion round"
            );

            if authorized.len() >= need || top.total_hits == len {
                stats.hits_authorized = authorized.len();
                return Ok(Expansion {
                    total_hits: top.total_hits,
                    authorized,
                    stats,
                });
            }
            if search_limit == cap {
                stats.cap_reached = true;
                stats.hits_authorized = authorized.len();
                return Ok(Expansion {
                    total_hits: top.total_hits,
                    authorized,
                    stats,
                });
            }

            score_doc_pos = len;
            search_limit = search_limit.saturating_mul(self.growth_factor).min(cap);
        }
    }
}

/// Decisions must cover exactly the submitted hits, in order; the authorizer
/// owns the batch while it runs and may have swapped it for another one.
fn covering(
    submitted: &[DocRef],
    decisions: Vec<AuthorizationDecision>,
) -> Result<Vec<AuthorizationDecision>> {
    let matches = decisions.len() == submitted.len()
        && decisions.iter().zip(submitted).all(|(d, s)| d.doc_ref == *s);
    if !matches {
        return Err(Error::InvalidState(format!(
            "authorizer returned {} decisions for {} submitted hits",
            decisions.len(),
            submitted.len()
        )));
    }
    Ok(decisions)
}

fn authorization_failure(err: Error) -> Error {
    match err {
        Error::TooManyResults { .. } => err,
        other => Error::query_execution_caused_by("authorization failed", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::{AclMetadata, PropertySet, Query};
    use quarry_index::IndexManager;
    use quarry_security::{PrincipalRegistry, SearchAuthorizer};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Denormalized authorizer that counts candidates it sees
    struct Counting {
        inner: SearchAuthorizer,
        seen: AtomicUsize,
        calls: AtomicUsize,
    }

    impl BatchAuthorizer for Counting {
        fn authorize(&self, token: Option<&str>, batch: &mut AuthorizationBatch) -> Result<()> {
            self.seen.fetch_add(batch.len(), Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.authorize(token, batch)
        }
    }

    fn counting() -> Arc<Counting> {
        let config = SearchConfig::default();
        Arc::new(Counting {
            inner: SearchAuthorizer::from_config(&config, Arc::new(PrincipalRegistry::new()), None)
                .unwrap(),
            seen: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }

    /// `n` documents `/d000..`; every `every`-th one is public
    fn index(n: usize, every: usize) -> Arc<IndexManager> {
        let index = Arc::new(IndexManager::new("test"));
        index.open().unwrap();
        for i in 0..n {
            let uri = format!("/d{:03}", i);
            let acl = if i % every == 0 {
                AclMetadata::public("o", uri.as_str())
            } else {
                AclMetadata::new("o", uri.as_str()).with_reader("nobody")
            };
            index
                .add_property_set(&PropertySet::new(uri.as_str(), "document"), &acl)
                .unwrap();
        }
        index.commit().unwrap();
        index
    }

    fn by_uri() -> quarry_core::Sorting {
        quarry_core::Sorting::relevance().then("uri", quarry_core::SortDirection::Ascending)
    }

    #[test]
    fn test_each_raw_hit_authorized_once() {
        let authz = counting();
        let config = SearchConfig::default().with_internal_search_cap(1000);
        let executor = SearchExecutor::new(index(100, 10), authz.clone(), &config);

        let result = executor
            .execute(None, &Search::new(Query::MatchAll).with_sorting(by_uri()).with_limit(8))
            .unwrap();

        assert_eq!(result.len(), 8);
        assert_eq!(result.stats.rounds, 5);
        assert_eq!(authz.seen.load(Ordering::SeqCst), 100);
        assert_eq!(authz.calls.load(Ordering::SeqCst), 5);
        assert_eq!(result.stats.raw_hits_authorized, 100);
        assert_eq!(result.stats.hits_authorized, 10);
        assert!(!result.truncated);
    }

    #[test]
    fn test_growth_factor_is_configurable() {
        let authz = counting();
        let config = SearchConfig::default().with_growth_factor(4);
        let executor = SearchExecutor::new(index(100, 10), authz, &config);
        let result = executor
            .execute(None, &Search::new(Query::MatchAll).with_sorting(by_uri()).with_limit(8))
            .unwrap();
        assert_eq!(result.len(), 8);
        assert_eq!(result.stats.rounds, 3);
        assert_eq!(result.stats.search_limit, 128);
    }

    #[test]
    fn test_zero_limit_reports_total() {
        let executor = SearchExecutor::new(index(30, 1), counting(), &SearchConfig::default());
        let result = executor
            .execute(None, &Search::new(Query::MatchAll).with_limit(0))
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(result.total_hits, 30);
        assert_eq!(result.stats.rounds, 1);
    }

    #[test]
    fn test_cursor_past_authorized_is_empty() {
        let executor = SearchExecutor::new(index(20, 2), counting(), &SearchConfig::default());
        let result = executor
            .execute(None, &Search::new(Query::MatchAll).with_cursor(15).with_limit(5))
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(result.total_hits, 20);
    }

    #[test]
    fn test_cap_stops_expansion() {
        let config = SearchConfig::default().with_internal_search_cap(16);
        let executor = SearchExecutor::new(index(100, 50), counting(), &config);
        let result = executor
            .execute(None, &Search::new(Query::MatchAll).with_sorting(by_uri()).with_limit(5))
            .unwrap();
        assert_eq!(result.uris(), vec!["/d000"]);
        assert!(result.truncated);
        assert!(result.stats.cap_reached);
        assert_eq!(result.stats.search_limit, 16);
    }

    #[test]
    fn test_invalid_query_fails_fast() {
        let executor = SearchExecutor::new(index(1, 1), counting(), &SearchConfig::default());
        let err = executor
            .execute(None, &Search::new(Query::Or(vec![])))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }
}
