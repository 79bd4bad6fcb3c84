//! Principals, denormalized ACL data and per-hit security metadata
//!
//! ACL information is denormalized into the index at build time: each indexed
//! resource carries its owner, the uri of the resource whose ACL is in effect
//! (the ACL holder) and the set of principals allowed to read it. Search-time
//! authorization works on [`SecurityInfo`] records derived from that data and
//! never loads the resource itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Pseudo-principal granting read access to everyone, including anonymous
pub const PSEUDO_ALL: &str = "pseudo:all";
/// Pseudo-principal granting read access to any resolved principal
pub const PSEUDO_AUTHENTICATED: &str = "pseudo:authenticated";
/// Pseudo-principal granting read access to the resource owner
pub const PSEUDO_OWNER: &str = "pseudo:owner";

// ============================================================================
// PrincipalId / Principal
// ============================================================================

/// Identifier of a user or group principal
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Create a principal id
    pub fn new(id: impl Into<String>) -> Self {
        PrincipalId(id.into())
    }

    /// The `pseudo:all` principal
    pub fn all() -> Self {
        PrincipalId::new(PSEUDO_ALL)
    }

    /// The `pseudo:authenticated` principal
    pub fn authenticated() -> Self {
        PrincipalId::new(PSEUDO_AUTHENTICATED)
    }

    /// The `pseudo:owner` principal
    pub fn owner() -> Self {
        PrincipalId::new(PSEUDO_OWNER)
    }

    /// Borrow as str
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the `pseudo:*` principals
    pub fn is_pseudo(&self) -> bool {
        self.0.starts_with("pseudo:")
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PrincipalId {
    fn from(s: &str) -> Self {
        PrincipalId::new(s)
    }
}

impl From<String> for PrincipalId {
    fn from(s: String) -> Self {
        PrincipalId(s)
    }
}

/// A resolved user principal with its group memberships
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// User id
    pub id: PrincipalId,
    /// Groups the user belongs to (transitively resolved)
    pub groups: BTreeSet<PrincipalId>,
}

impl Principal {
    /// Create a principal without group memberships
    pub fn new(id: impl Into<PrincipalId>) -> Self {
        Principal {
            id: id.into(),
            groups: BTreeSet::new(),
        }
    }

    /// Builder: add a group membership
    pub fn with_group(mut self, group: impl Into<PrincipalId>) -> Self {
        self.groups.insert(group.into());
        self
    }

    /// True if this principal is `id` or a member of group `id`
    pub fn is_or_member_of(&self, id: &PrincipalId) -> bool {
        &self.id == id || self.groups.contains(id)
    }
}

// ============================================================================
// AclMetadata
// ============================================================================

/// Denormalized access-control data stored alongside an indexed resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclMetadata {
    /// Owner of the resource
    pub owner: PrincipalId,
    /// Uri of the resource whose ACL is effective (self or nearest ancestor)
    pub acl_holder: String,
    /// Principals with read permission on the effective ACL
    pub read_principals: BTreeSet<PrincipalId>,
}

impl AclMetadata {
    /// Create ACL metadata with an empty read set
    pub fn new(owner: impl Into<PrincipalId>, acl_holder: impl Into<String>) -> Self {
        AclMetadata {
            owner: owner.into(),
            acl_holder: acl_holder.into(),
            read_principals: BTreeSet::new(),
        }
    }

    /// Builder: grant read to a principal
    pub fn with_reader(mut self, principal: impl Into<PrincipalId>) -> Self {
        self.read_principals.insert(principal.into());
        self
    }

    /// Shorthand for an ACL readable by everyone
    pub fn public(owner: impl Into<PrincipalId>, acl_holder: impl Into<String>) -> Self {
        AclMetadata::new(owner, acl_holder).with_reader(PrincipalId::all())
    }
}

// ============================================================================
// DocRef
// ============================================================================

/// Address of a document inside one index snapshot.
///
/// Only meaningful together with the snapshot it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocRef {
    /// Ordinal of the segment within the snapshot
    pub segment: u32,
    /// Document id within the segment
    pub doc: u32,
}

impl DocRef {
    /// Create a document address
    pub fn new(segment: u32, doc: u32) -> Self {
        DocRef { segment, doc }
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.doc)
    }
}

// ============================================================================
// SecurityInfo / AuthorizationDecision
// ============================================================================

/// Minimal security metadata for one raw hit
///
/// Built from denormalized index data; the authorization service records its
/// decision on the record itself. A record starts undecided.
#[derive(Debug, Clone)]
pub struct SecurityInfo {
    /// Address of the raw hit
    pub doc_ref: DocRef,
    /// Resource uri
    pub uri: String,
    /// Resource owner
    pub owner: PrincipalId,
    /// Uri of the effective ACL holder
    pub acl_holder: String,
    /// Read principals of the effective ACL, shared per segment
    pub read_principals: Arc<BTreeSet<PrincipalId>>,
    decision: Option<bool>,
}

impl SecurityInfo {
    /// Create an undecided record
    pub fn new(
        doc_ref: DocRef,
        uri: impl Into<String>,
        owner: PrincipalId,
        acl_holder: impl Into<String>,
        read_principals: Arc<BTreeSet<PrincipalId>>,
    ) -> Self {
        SecurityInfo {
            doc_ref,
            uri: uri.into(),
            owner,
            acl_holder: acl_holder.into(),
            read_principals,
            decision: None,
        }
    }

    /// Record the authorization decision
    pub fn set_authorized(&mut self, authorized: bool) {
        self.decision = Some(authorized);
    }

    /// True only if a positive decision was recorded
    pub fn is_authorized(&self) -> bool {
        self.decision == Some(true)
    }

    /// Recorded decision, `None` while undecided
    pub fn decision(&self) -> Option<bool> {
        self.decision
    }
}

/// Outcome of authorizing one raw hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationDecision {
    /// Address of the hit
    pub doc_ref: DocRef,
    /// Whether the principal may read it
    pub authorized: bool,
}
