//! Batch authorization of search hits for quarry
//!
//! This crate provides:
//! - [`PrincipalResolver`] / [`PrincipalRegistry`]: security token to principal
//! - [`AuthorizationBatch`]: candidates of one expansion round and their decisions
//! - [`AuthorizationStrategy`]: denormalized ACL check or legacy repository lookup
//! - [`TrustedBypass`]: unfiltered access for configured principals, bounded
//! - [`SearchAuthorizer`]: the [`BatchAuthorizer`] used by the search executor

#![warn(missing_docs)]

pub mod batch;
pub mod denormalized;
pub mod lookup;
pub mod principal;
pub mod strategy;

pub use batch::AuthorizationBatch;
pub use denormalized::DenormalizedAcl;
pub use lookup::{Repository, RepositoryError, RepositoryLookup};
pub use principal::{PrincipalRegistry, PrincipalResolver};
pub use strategy::{AuthorizationStrategy, BatchAuthorizer, SearchAuthorizer, TrustedBypass};
