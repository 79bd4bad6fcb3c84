//! Core types for the quarry search core
//!
//! This crate defines the foundational types used throughout the workspace:
//! - Query / Sorting: engine-independent query and sort trees
//! - Search / ResultSet / SearchStats: request and response of `execute`
//! - PropertyValue / PropertySet: repository resources as indexed and returned
//! - PrincipalId / Principal / AclMetadata: denormalized access-control data
//! - SecurityInfo / AuthorizationDecision: per-hit authorization records
//! - Error: error type hierarchy
//! - SearchConfig: `quarry.toml` configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod acl;
pub mod config;
pub mod error;
pub mod property;
pub mod query;
pub mod search_types;

pub use acl::{
    AclMetadata, AuthorizationDecision, DocRef, Principal, PrincipalId, SecurityInfo, PSEUDO_ALL,
    PSEUDO_AUTHENTICATED, PSEUDO_OWNER,
};
pub use config::{AuthorizationMode, SearchConfig, CONFIG_FILE_NAME};
pub use error::{BoxError, Error, Result};
pub use property::{is_descendant_uri, PropertySet, PropertyValue};
pub use query::{Query, RangeBound, SortDirection, SortField, Sorting};
pub use search_types::{FieldSelection, ResultSet, Search, SearchStats};
