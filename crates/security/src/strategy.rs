//! Authorization strategies and the batch authorizer
//!
//! [`SearchAuthorizer`] is what the search executor talks to. For each batch
//! it resolves the caller, applies the trusted bypass when the caller is a
//! configured no-filter principal, and otherwise hands the batch to the
//! configured [`AuthorizationStrategy`].

use crate::batch::AuthorizationBatch;
use crate::denormalized::DenormalizedAcl;
use crate::lookup::{Repository, RepositoryLookup};
use crate::principal::PrincipalResolver;
use quarry_core::{AuthorizationMode, Error, Principal, PrincipalId, Result, SearchConfig};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Decides batches of raw hits for a caller
pub trait BatchAuthorizer: Send + Sync {
    /// Record a decision on every candidate of `batch`.
    ///
    /// # Errors
    ///
    /// Fails the whole batch, leaving decisions unspecified, e.g. with
    /// `Error::TooManyResults` or `Error::Authentication`.
    fn authorize(&self, token: Option<&str>, batch: &mut AuthorizationBatch) -> Result<()>;
}

// ============================================================================
// AuthorizationStrategy
// ============================================================================

/// How filtered callers are authorized
#[derive(Debug, Clone)]
pub enum AuthorizationStrategy {
    /// Batch decisions from denormalized ACL data
    Denormalized(DenormalizedAcl),
    /// One repository retrieve per hit
    RepositoryLookup(RepositoryLookup),
}

impl AuthorizationStrategy {
    /// Strategy name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            AuthorizationStrategy::Denormalized(_) => "denormalized",
            AuthorizationStrategy::RepositoryLookup(_) => "repository-lookup",
        }
    }

    /// Decide every candidate of the batch
    pub fn authorize(
        &self,
        token: Option<&str>,
        principal: Option<&Principal>,
        batch: &mut AuthorizationBatch,
    ) {
        match self {
            AuthorizationStrategy::Denormalized(acl) => acl.authorize(principal, batch),
            AuthorizationStrategy::RepositoryLookup(lookup) => lookup.authorize(token, batch),
        }
    }
}

// ============================================================================
// TrustedBypass
// ============================================================================

/// Principals exempt from filtering while the raw result stays small enough
#[derive(Debug, Clone, Default)]
pub struct TrustedBypass {
    principals: BTreeSet<PrincipalId>,
    max_unfiltered_results: usize,
}

impl TrustedBypass {
    /// Bypass for the given principals up to `max_unfiltered_results` raw hits
    pub fn new(principals: BTreeSet<PrincipalId>, max_unfiltered_results: usize) -> Self {
        TrustedBypass {
            principals,
            max_unfiltered_results,
        }
    }

    /// True if the principal skips filtering
    pub fn applies_to(&self, principal: Option<&Principal>) -> bool {
        principal.map_or(false, |p| self.principals.contains(&p.id))
    }

    /// Authorize the whole batch unfiltered.
    ///
    /// # Errors
    ///
    /// Returns `Error::TooManyResults` when the raw total exceeds the ceiling.
    pub fn authorize(&self, batch: &mut AuthorizationBatch) -> Result<()> {
        if batch.total_hits > self.max_unfiltered_results {
            warn!(
                target: "quarry::authz",
                total_hits = batch.total_hits,
                max = self.max_unfiltered_results,
                "Unfiltered result too large for trusted bypass"
            );
            return Err(Error::TooManyResults {
                total: batch.total_hits,
                max: self.max_unfiltered_results,
            });
        }
        batch.decide_all(true);
        Ok(())
    }
}

// ============================================================================
// SearchAuthorizer
// ============================================================================

/// Batch authorizer combining principal resolution, trusted bypass and a
/// filtering strategy
pub struct SearchAuthorizer {
    resolver: Arc<dyn PrincipalResolver>,
    bypass: TrustedBypass,
    strategy: AuthorizationStrategy,
}

impl SearchAuthorizer {
    /// Authorizer with an explicit strategy
    pub fn new(
        resolver: Arc<dyn PrincipalResolver>,
        bypass: TrustedBypass,
        strategy: AuthorizationStrategy,
    ) -> Self {
        SearchAuthorizer {
            resolver,
            bypass,
            strategy,
        }
    }

    /// Authorizer configured from `quarry.toml` settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if repository lookup is configured without a
    /// repository.
    pub fn from_config(
        config: &SearchConfig,
        resolver: Arc<dyn PrincipalResolver>,
        repository: Option<Arc<dyn Repository>>,
    ) -> Result<Self> {
        let strategy = match (config.authorization, repository) {
            (AuthorizationMode::Denormalized, _) => {
                AuthorizationStrategy::Denormalized(DenormalizedAcl)
            }
            (AuthorizationMode::RepositoryLookup, Some(repo)) => {
                warn!(
                    target: "quarry::authz",
                    "Using per-hit repository lookup authorization; searches will be slow"
                );
                AuthorizationStrategy::RepositoryLookup(RepositoryLookup::new(repo))
            }
            (AuthorizationMode::RepositoryLookup, None) => {
                return Err(Error::Config(
                    "authorization = \"repository-lookup\" requires a repository".to_string(),
                ));
            }
        };
        let bypass = TrustedBypass::new(
            config.no_filter_principals.clone(),
            config.max_unfiltered_results,
        );
        Ok(SearchAuthorizer::new(resolver, bypass, strategy))
    }

    /// Configured filtering strategy
    pub fn strategy(&self) -> &AuthorizationStrategy {
        &self.strategy
    }
}

impl BatchAuthorizer for SearchAuthorizer {
    fn authorize(&self, token: Option<&str>, batch: &mut AuthorizationBatch) -> Result<()> {
        let principal = self.resolver.resolve(token)?;

        if self.bypass.applies_to(principal.as_ref()) {
            self.bypass.authorize(batch)?;
            debug!(
                target: "quarry::authz",
                candidates = batch.len(),
                "Trusted bypass authorized batch"
            );
            return Ok(());
        }

        self.strategy.authorize(token, principal.as_ref(), batch);
        debug!(
            target: "quarry::authz",
            strategy = self.strategy.name(),
            candidates = batch.len(),
            authorized = batch.authorized_count(),
            "Batch authorized"
        );
        Ok(())
    }
}

impl fmt::Debug for SearchAuthorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchAuthorizer")
            .field("bypass", &self.bypass)
            .field("strategy", &self.strategy.name())
            .finish()
    }
}
