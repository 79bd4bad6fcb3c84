//! Core search types
//!
//! This module defines the request/response types of the search core:
//! - Search: query + sorting + cursor + limit + field selection
//! - FieldSelection: which properties to load into result items
//! - ResultSet: authorized page of property sets plus a raw hit total
//! - SearchStats: execution statistics for debugging/monitoring

use crate::property::PropertySet;
use crate::query::{Query, Sorting};
use std::collections::BTreeSet;

// ============================================================================
// FieldSelection
// ============================================================================

/// Which properties a result item carries
///
/// `uri` and `resource_type` are always present on returned property sets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldSelection {
    /// Every stored property
    #[default]
    All,
    /// Only the named properties
    Only(BTreeSet<String>),
}

impl FieldSelection {
    /// Select the given property names
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldSelection::Only(names.into_iter().map(Into::into).collect())
    }

    /// True if the property should be loaded
    pub fn includes(&self, name: &str) -> bool {
        match self {
            FieldSelection::All => true,
            FieldSelection::Only(names) => names.contains(name),
        }
    }
}

// ============================================================================
// Search
// ============================================================================

/// A search request
///
/// `cursor` is the number of authorized hits to skip and `limit` the page
/// size. A zero limit yields an empty page with a raw hit total.
///
/// # Examples
///
/// ```
/// use quarry_core::{Query, Search};
///
/// let search = Search::new(Query::term("title", "report"))
///     .with_cursor(20)
///     .with_limit(10);
///
/// assert_eq!(search.need(), 30);
/// ```
#[derive(Debug, Clone)]
pub struct Search {
    /// Query tree
    pub query: Query,
    /// Sort keys; empty for relevance order
    pub sorting: Sorting,
    /// Authorized hits to skip
    pub cursor: usize,
    /// Maximum items to return
    pub limit: usize,
    /// Properties to load per item
    pub field_selection: FieldSelection,
}

impl Search {
    /// Create a search with defaults
    ///
    /// Default values:
    /// - sorting: relevance
    /// - cursor: 0
    /// - limit: 10
    /// - field_selection: all
    pub fn new(query: Query) -> Self {
        Search {
            query,
            sorting: Sorting::default(),
            cursor: 0,
            limit: 10,
            field_selection: FieldSelection::default(),
        }
    }

    /// Builder: set sorting
    pub fn with_sorting(mut self, sorting: Sorting) -> Self {
        self.sorting = sorting;
        self
    }

    /// Builder: set cursor
    pub fn with_cursor(mut self, cursor: usize) -> Self {
        self.cursor = cursor;
        self
    }

    /// Builder: set limit
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Builder: set field selection
    pub fn with_fields(mut self, selection: FieldSelection) -> Self {
        self.field_selection = selection;
        self
    }

    /// Authorized hits required to fill the page: `cursor + limit`
    pub fn need(&self) -> usize {
        self.cursor.saturating_add(self.limit)
    }
}

// ============================================================================
// SearchStats
// ============================================================================

/// Execution statistics for one `execute` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Expansion rounds run against the index
    pub rounds: usize,
    /// Raw hits submitted for authorization, over all rounds
    pub raw_hits_authorized: usize,
    /// Raw hits that passed authorization
    pub hits_authorized: usize,
    /// Largest raw-hit window requested
    pub search_limit: usize,
    /// True if expansion stopped at the internal search cap
    pub cap_reached: bool,
    /// Wall time in microseconds
    pub elapsed_micros: u64,
}

// ============================================================================
// ResultSet
// ============================================================================

/// One page of authorized search results
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// Raw match count reported by the index, or -1 when unknown.
    ///
    /// This is NOT adjusted for authorization: it is an upper bound on the
    /// number of hits the principal could page through.
    pub total_hits: i64,
    /// Authorized items in index order, at most `limit` of them
    pub items: Vec<PropertySet>,
    /// True if the cap stopped expansion before the page could be filled
    pub truncated: bool,
    /// Execution statistics
    pub stats: SearchStats,
}

impl ResultSet {
    /// Empty result with unknown total
    pub fn empty() -> Self {
        ResultSet {
            total_hits: -1,
            ..Default::default()
        }
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if no items were returned
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Uris of the returned items, in order
    pub fn uris(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.uri.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_defaults() {
        let s = Search::new(Query::MatchAll);
        assert_eq!(s.cursor, 0);
        assert_eq!(s.limit, 10);
        assert!(s.sorting.is_relevance());
        assert_eq!(s.field_selection, FieldSelection::All);
    }

    #[test]
    fn test_need_saturates() {
        let s = Search::new(Query::MatchAll)
            .with_cursor(usize::MAX)
            .with_limit(5);
        assert_eq!(s.need(), usize::MAX);
    }

    #[test]
    fn test_field_selection() {
        let sel = FieldSelection::only(["title", "author"]);
        assert!(sel.includes("title"));
        assert!(!sel.includes("body"));
        assert!(FieldSelection::All.includes("body"));
    }

    #[test]
    fn test_empty_result_set() {
        let r = ResultSet::empty();
        assert_eq!(r.total_hits, -1);
        assert!(r.is_empty());
        assert!(!r.truncated);
    }
}
