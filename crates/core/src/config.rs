//! Search configuration via `quarry.toml`
//!
//! The search core reads a small TOML file from the index directory. On first
//! open a commented default file can be written with
//! [`SearchConfig::write_default_if_missing`]; programmatic callers use the
//! `with_*` builders instead.

use crate::acl::PrincipalId;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Config file name placed in the index directory.
pub const CONFIG_FILE_NAME: &str = "quarry.toml";

/// Default hard ceiling on raw hits fetched per `execute` call
pub const DEFAULT_INTERNAL_SEARCH_CAP: usize = 40_000;
/// Default raw-hit window growth factor between expansion rounds
pub const DEFAULT_GROWTH_FACTOR: usize = 2;
/// Default trusted-bypass ceiling
pub const DEFAULT_MAX_UNFILTERED_RESULTS: usize = 10_000;
/// Default reindex progress log interval (documents)
pub const DEFAULT_REINDEX_PROGRESS_INTERVAL: usize = 5_000;

/// Which authorization strategy filters raw hits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthorizationMode {
    /// Decide from ACL data denormalized into the index (batch, fast)
    #[default]
    Denormalized,
    /// Retrieve every hit through the repository (legacy, O(n) lookups)
    RepositoryLookup,
}

/// Search configuration loaded from `quarry.toml`.
///
/// # Example
///
/// ```toml
/// internal_search_cap = 40000
/// growth_factor = 2
/// max_unfiltered_results = 10000
/// no_filter_principals = ["root@localhost"]
/// authorization = "denormalized"
/// reindex_progress_interval = 5000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Hard ceiling on raw hits fetched per call
    #[serde(default = "default_internal_search_cap")]
    pub internal_search_cap: usize,
    /// Factor the raw-hit window grows by per expansion round
    #[serde(default = "default_growth_factor")]
    pub growth_factor: usize,
    /// Largest raw result a trusted principal may receive unfiltered
    #[serde(default = "default_max_unfiltered_results")]
    pub max_unfiltered_results: usize,
    /// Principals that skip authorization filtering
    #[serde(default)]
    pub no_filter_principals: BTreeSet<PrincipalId>,
    /// Authorization strategy
    #[serde(default)]
    pub authorization: AuthorizationMode,
    /// Reindex logs progress every this many documents
    #[serde(default = "default_reindex_progress_interval")]
    pub reindex_progress_interval: usize,
}

fn default_internal_search_cap() -> usize {
    DEFAULT_INTERNAL_SEARCH_CAP
}

fn default_growth_factor() -> usize {
    DEFAULT_GROWTH_FACTOR
}

fn default_max_unfiltered_results() -> usize {
    DEFAULT_MAX_UNFILTERED_RESULTS
}

fn default_reindex_progress_interval() -> usize {
    DEFAULT_REINDEX_PROGRESS_INTERVAL
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            internal_search_cap: DEFAULT_INTERNAL_SEARCH_CAP,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            max_unfiltered_results: DEFAULT_MAX_UNFILTERED_RESULTS,
            no_filter_principals: BTreeSet::new(),
            authorization: AuthorizationMode::default(),
            reindex_progress_interval: DEFAULT_REINDEX_PROGRESS_INTERVAL,
        }
    }
}

impl SearchConfig {
    /// Builder: set the internal search cap
    pub fn with_internal_search_cap(mut self, cap: usize) -> Self {
        self.internal_search_cap = cap;
        self
    }

    /// Builder: set the growth factor
    pub fn with_growth_factor(mut self, factor: usize) -> Self {
        self.growth_factor = factor;
        self
    }

    /// Builder: set the trusted-bypass ceiling
    pub fn with_max_unfiltered_results(mut self, max: usize) -> Self {
        self.max_unfiltered_results = max;
        self
    }

    /// Builder: add a principal that skips filtering
    pub fn with_no_filter_principal(mut self, principal: impl Into<PrincipalId>) -> Self {
        self.no_filter_principals.insert(principal.into());
        self
    }

    /// Builder: choose the authorization strategy
    pub fn with_authorization(mut self, mode: AuthorizationMode) -> Self {
        self.authorization = mode;
        self
    }

    /// Builder: set the reindex progress interval
    pub fn with_reindex_progress_interval(mut self, interval: usize) -> Self {
        self.reindex_progress_interval = interval;
        self
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        if self.internal_search_cap == 0 {
            return Err(Error::Config(
                "internal_search_cap must be greater than 0".to_string(),
            ));
        }
        if self.growth_factor < 2 {
            return Err(Error::Config(format!(
                "growth_factor must be at least 2, got {}",
                self.growth_factor
            )));
        }
        if self.reindex_progress_interval == 0 {
            return Err(Error::Config(
                "reindex_progress_interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Quarry search configuration
#
# Hard ceiling on raw index hits fetched per search call. Protects memory
# and latency when a broad query meets a restrictive ACL.
internal_search_cap = 40000

# Factor the raw-hit window grows by between expansion rounds (>= 2).
growth_factor = 2

# Principals listed here skip authorization filtering, but only while the raw
# result count stays at or below max_unfiltered_results.
max_unfiltered_results = 10000
no_filter_principals = []

# Authorization strategy: "denormalized" (default) or "repository-lookup".
# "repository-lookup" retrieves every hit through the repository and is slow.
authorization = "denormalized"

# Reindex logs progress every N documents.
reindex_progress_interval = 5000
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: SearchConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_toml_parses_correctly() {
        let config: SearchConfig = toml::from_str(SearchConfig::default_toml()).unwrap();
        assert_eq!(config, SearchConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_keys_use_defaults() {
        let config: SearchConfig = toml::from_str("internal_search_cap = 100").unwrap();
        assert_eq!(config.internal_search_cap, 100);
        assert_eq!(config.growth_factor, DEFAULT_GROWTH_FACTOR);
        assert_eq!(config.authorization, AuthorizationMode::Denormalized);
    }

    #[test]
    fn authorization_mode_parses_kebab_case() {
        let config: SearchConfig = toml::from_str("authorization = \"repository-lookup\"").unwrap();
        assert_eq!(config.authorization, AuthorizationMode::RepositoryLookup);
    }

    #[test]
    fn unknown_authorization_mode_rejected() {
        let result: std::result::Result<SearchConfig, _> =
            toml::from_str("authorization = \"acl-cache\"");
        assert!(result.is_err());
    }

    #[test]
    fn zero_cap_rejected() {
        let config = SearchConfig::default().with_internal_search_cap(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn growth_factor_below_two_rejected() {
        let config = SearchConfig::default().with_growth_factor(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn write_default_if_missing_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        SearchConfig::write_default_if_missing(&path).unwrap();
        assert!(path.exists());

        let config = SearchConfig::from_file(&path).unwrap();
        assert_eq!(config.internal_search_cap, DEFAULT_INTERNAL_SEARCH_CAP);
    }

    #[test]
    fn write_default_if_missing_keeps_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "internal_search_cap = 7").unwrap();

        SearchConfig::write_default_if_missing(&path).unwrap();

        let config = SearchConfig::from_file(&path).unwrap();
        assert_eq!(config.internal_search_cap, 7);
    }

    #[test]
    fn write_to_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = SearchConfig::default()
            .with_internal_search_cap(500)
            .with_no_filter_principal("root@localhost")
            .with_authorization(AuthorizationMode::RepositoryLookup);

        config.write_to_file(&path).unwrap();
        let parsed = SearchConfig::from_file(&path).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn from_file_rejects_invalid_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "growth_factor = 0").unwrap();

        assert!(matches!(SearchConfig::from_file(&path), Err(Error::Config(_))));
    }

    #[test]
    fn from_file_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(SearchConfig::from_file(&path).is_err());
    }
}
