//! Security token resolution

use dashmap::DashMap;
use quarry_core::{Error, Principal, Result};
use uuid::Uuid;

/// Resolves a caller's security token to a principal
pub trait PrincipalResolver: Send + Sync {
    /// `None` is the anonymous caller and resolves to `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Authentication` for tokens that do not resolve.
    fn resolve(&self, token: Option<&str>) -> Result<Option<Principal>>;
}

/// In-memory token table
#[derive(Debug, Default)]
pub struct PrincipalRegistry {
    tokens: DashMap<String, Principal>,
}

impl PrincipalRegistry {
    /// Empty registry
    pub fn new() -> Self {
        PrincipalRegistry::default()
    }

    /// Issue a fresh random token for a principal
    pub fn issue(&self, principal: Principal) -> String {
        let token = Uuid::new_v4().to_string();
        self.tokens.insert(token.clone(), principal);
        token
    }

    /// Bind a caller-chosen token to a principal, replacing any previous binding
    pub fn register(&self, token: impl Into<String>, principal: Principal) {
        self.tokens.insert(token.into(), principal);
    }

    /// Invalidate a token; returns false if it was unknown
    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }

    /// Number of live tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True if no token is registered
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl PrincipalResolver for PrincipalRegistry {
    fn resolve(&self, token: Option<&str>) -> Result<Option<Principal>> {
        let Some(token) = token else {
            return Ok(None);
        };
        self.tokens
            .get(token)
            .map(|p| Some(p.value().clone()))
            .ok_or_else(|| Error::Authentication("unknown security token".to_string()))
    }
}
