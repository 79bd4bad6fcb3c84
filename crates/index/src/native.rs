//! Native query and sort objects plus the builders producing them
//!
//! The builders translate the engine-independent [`Query`] / [`Sorting`] trees
//! into the forms the segment evaluator understands:
//!
//! - term values are normalized (trimmed, lowercased)
//! - AND / OR / NOT collapse into Lucene-style boolean clauses
//!   (`must`, `should`, `must_not`), flattening nested clauses of the same kind
//! - a conjunction made only of negations gets an implicit match-all
//! - relevance order becomes an explicit score key

use crate::document::{SCORE_FIELD, URI_FIELD};
use quarry_core::{Error, Query, RangeBound, Result, SortDirection, Sorting};

// ============================================================================
// NativeQuery
// ============================================================================

/// Compiled query evaluated by segments
#[derive(Debug, Clone, PartialEq)]
pub enum NativeQuery {
    /// Every live document, score 0
    MatchAll,
    /// Normalized term on a field, score 1
    Term {
        /// Field name
        field: String,
        /// Lowercased term
        term: String,
    },
    /// Any term of the field starting with the prefix, score 1
    Prefix {
        /// Field name
        field: String,
        /// Lowercased prefix
        prefix: String,
    },
    /// Typed value range, score 0
    Range {
        /// Field name
        field: String,
        /// Lower bound
        lower: Option<RangeBound>,
        /// Upper bound
        upper: Option<RangeBound>,
    },
    /// Field presence, score 0
    Exists {
        /// Field name
        field: String,
    },
    /// Boolean combination; scores of matching `must`/`should` clauses add up
    Boolean {
        /// Clauses that all have to match
        must: Vec<NativeQuery>,
        /// Clauses of which one has to match when `must` is empty
        should: Vec<NativeQuery>,
        /// Clauses that must not match
        must_not: Vec<NativeQuery>,
    },
}

// ============================================================================
// QueryBuilder
// ============================================================================

/// Translates [`Query`] trees into [`NativeQuery`]
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryBuilder;

impl QueryBuilder {
    /// Compile a query tree.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidQuery` for malformed trees (empty composites,
    /// blank fields, unusable range bounds).
    pub fn build(&self, query: &Query) -> Result<NativeQuery> {
        query.validate()?;
        Ok(self.translate(query))
    }

    fn translate(&self, query: &Query) -> NativeQuery {
        match query {
            Query::MatchAll => NativeQuery::MatchAll,
            Query::Term { field, value } => NativeQuery::Term {
                field: field.clone(),
                term: value.trim().to_lowercase(),
            },
            Query::Prefix { field, prefix } => NativeQuery::Prefix {
                field: field.clone(),
                prefix: prefix.to_lowercase(),
            },
            Query::Range {
                field,
                lower,
                upper,
            } => NativeQuery::Range {
                field: field.clone(),
                lower: lower.clone(),
                upper: upper.clone(),
            },
            Query::Exists { field } => NativeQuery::Exists {
                field: field.clone(),
            },
            Query::And(children) => {
                let mut must = Vec::new();
                let mut must_not = Vec::new();
                for child in children {
                    match child {
                        Query::Not(inner) => must_not.push(self.translate(inner)),
                        other => match self.translate(other) {
                            NativeQuery::Boolean {
                                must: m,
                                should,
                                must_not: n,
                            } if should.is_empty() && !m.is_empty() => {
                                must.extend(m);
                                must_not.extend(n);
                            }
                            translated => must.push(translated),
                        },
                    }
                }
                if must.is_empty() {
                    must.push(NativeQuery::MatchAll);
                }
                NativeQuery::Boolean {
                    must,
                    should: Vec::new(),
                    must_not,
                }
            }
            Query::Or(children) => {
                let mut should = Vec::new();
                for child in children {
                    match self.translate(child) {
                        NativeQuery::Boolean {
                            must,
                            should: s,
                            must_not,
                        } if must.is_empty() && must_not.is_empty() => should.extend(s),
                        translated => should.push(translated),
                    }
                }
                NativeQuery::Boolean {
                    must: Vec::new(),
                    should,
                    must_not: Vec::new(),
                }
            }
            Query::Not(inner) => NativeQuery::Boolean {
                must: vec![NativeQuery::MatchAll],
                should: Vec::new(),
                must_not: vec![self.translate(inner)],
            },
        }
    }
}

// ============================================================================
// NativeSort
// ============================================================================

/// What a sort key compares
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortTarget {
    /// Relevance score
    Score,
    /// Raw resource uri
    Uri,
    /// First value of a stored field
    Field(String),
}

/// One compiled sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Compared value
    pub target: SortTarget,
    /// Largest first
    pub descending: bool,
}

/// Compiled sort; ties are always broken by document address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeSort {
    /// Keys, most significant first; never empty
    pub keys: Vec<SortKey>,
}

impl NativeSort {
    /// Score descending
    pub fn relevance() -> Self {
        NativeSort {
            keys: vec![SortKey {
                target: SortTarget::Score,
                descending: true,
            }],
        }
    }

    /// True if any key needs the relevance score
    pub fn needs_score(&self) -> bool {
        self.keys.iter().any(|k| k.target == SortTarget::Score)
    }
}

// ============================================================================
// SortBuilder
// ============================================================================

/// Translates [`Sorting`] into [`NativeSort`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SortBuilder;

impl SortBuilder {
    /// Compile sort keys.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidQuery` for blank field names.
    pub fn build(&self, sorting: &Sorting) -> Result<NativeSort> {
        if sorting.is_relevance() {
            return Ok(NativeSort::relevance());
        }
        let keys = sorting
            .fields
            .iter()
            .map(|f| {
                let target = match f.field.trim() {
                    "" => {
                        return Err(Error::InvalidQuery("empty sort field name".to_string()));
                    }
                    SCORE_FIELD => SortTarget::Score,
                    URI_FIELD => SortTarget::Uri,
                    name => SortTarget::Field(name.to_string()),
                };
                Ok(SortKey {
                    target,
                    descending: f.direction == SortDirection::Descending,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(NativeSort { keys })
    }
}
