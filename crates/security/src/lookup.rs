//! Per-hit repository lookup (legacy)
//!
//! Authorizes each hit by retrieving its resource through the repository with
//! the caller's token. One repository call per hit, serialized; kept for
//! deployments whose index carries no usable ACL data.

use crate::batch::AuthorizationBatch;
use quarry_core::{BoxError, Error};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Failure of a repository retrieve
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Caller may not read the resource
    #[error("access denied: {0}")]
    Authorization(String),
    /// Token was not accepted
    #[error("not authenticated: {0}")]
    Authentication(String),
    /// Resource does not exist (any more)
    #[error("resource not found: {0}")]
    NotFound(String),
    /// Any other repository failure
    #[error("repository failure: {0}")]
    Other(#[source] BoxError),
}

impl From<RepositoryError> for Error {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Authorization(msg) => Error::Authorization(msg),
            RepositoryError::Authentication(msg) => Error::Authentication(msg),
            other => Error::query_execution_caused_by("repository retrieve failed", other),
        }
    }
}

/// The repository as seen by the legacy filter
pub trait Repository: Send + Sync {
    /// Retrieve a resource with the caller's token, applying the repository's
    /// own access checks
    fn retrieve(&self, token: Option<&str>, uri: &str) -> Result<(), RepositoryError>;
}

/// Strategy retrieving every hit through the repository
#[derive(Clone)]
pub struct RepositoryLookup {
    repository: Arc<dyn Repository>,
}

impl RepositoryLookup {
    /// Strategy over the given repository
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        RepositoryLookup { repository }
    }

    /// Decide every candidate; any retrieve failure drops the hit
    pub fn authorize(&self, token: Option<&str>, batch: &mut AuthorizationBatch) {
        for info in batch.candidates_mut() {
            match self.repository.retrieve(token, &info.uri) {
                Ok(()) => info.set_authorized(true),
                Err(e) => {
                    let err = Error::from(e);
                    if err.is_fatal_for_hit() {
                        debug!(target: "quarry::authz", uri = %info.uri, error = %err, "Hit denied");
                    } else {
                        debug!(target: "quarry::authz", uri = %info.uri, error = %err, "Hit dropped after lookup failure");
                    }
                    info.set_authorized(false);
                }
            }
        }
    }
}

impl fmt::Debug for RepositoryLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryLookup").finish_non_exhaustive()
    }
}
