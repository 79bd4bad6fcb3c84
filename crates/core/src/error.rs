//! Error types for the quarry search core
//!
//! Every fallible operation in the workspace returns [`Result`]. Variants map
//! onto the failure classes callers need to tell apart:
//!
//! - `QueryExecution`: the underlying index (or the authorization service it
//!   depends on) failed; the call produced no result at all
//! - `IndexLock`: the write lock is held by someone else; never retried here
//! - `TooManyResults`: trusted-bypass ceiling exceeded
//! - `Authorization` / `Authentication`: raised by per-hit lookups, normally
//!   absorbed by the legacy filter
//! - `Index`: reindex or update pipeline failure, wraps the cause
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

/// Boxed underlying cause carried by wrapping variants
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for quarry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the quarry search core
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying index could not execute a search
    #[error("Query execution failed: {message}")]
    QueryExecution {
        /// Human readable description
        message: String,
        /// Underlying cause, if any
        #[source]
        source: Option<BoxError>,
    },

    /// A query or sort could not be compiled
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The index write lock is unavailable
    #[error("Index lock unavailable: {0}")]
    IndexLock(String),

    /// Unfiltered result set is larger than the trusted-bypass ceiling
    #[error("Too many results: {total} exceeds unfiltered maximum {max}")]
    TooManyResults {
        /// Raw hit count reported by the index
        total: usize,
        /// Configured `max_unfiltered_results`
        max: usize,
    },

    /// Principal is not allowed to read a resource
    #[error("Authorization failed: {0}")]
    Authorization(String),

    /// Security token could not be resolved to a principal
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Reindex or write-through update failed
    #[error("Index failure: {message}")]
    Index {
        /// Human readable description
        message: String,
        /// Underlying cause, if any
        #[source]
        source: Option<BoxError>,
    },

    /// Operation attempted on a closed index
    #[error("Index closed: {0}")]
    IndexClosed(String),

    /// Operation not valid in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration could not be read or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Query execution failure without an underlying cause
    pub fn query_execution(message: impl Into<String>) -> Self {
        Error::QueryExecution {
            message: message.into(),
            source: None,
        }
    }

    /// Query execution failure wrapping another error
    pub fn query_execution_caused_by(
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Error::QueryExecution {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Index pipeline failure without an underlying cause
    pub fn index(message: impl Into<String>) -> Self {
        Error::Index {
            message: message.into(),
            source: None,
        }
    }

    /// Index pipeline failure wrapping another error
    pub fn index_caused_by(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Index {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// True for errors that only make a single hit unavailable.
    ///
    /// The legacy per-hit filter drops the hit and continues on these.
    pub fn is_fatal_for_hit(&self) -> bool {
        matches!(self, Error::Authorization(_) | Error::Authentication(_))
    }

    /// True when the error means another writer holds the index lock
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, Error::IndexLock(_))
    }
}
