//! Abstract query and sort trees
//!
//! `Query` is the engine-independent query AST handed to the search core by
//! the (out of scope) query parser. Constructors validate their input, so a
//! tree assembled through them is well-formed; [`Query::validate`] re-checks
//! trees that were built from the public variants directly.

use crate::error::{Error, Result};
use crate::property::PropertyValue;
use std::cmp::Ordering;

// ============================================================================
// RangeBound
// ============================================================================

/// One end of a range query
#[derive(Debug, Clone, PartialEq)]
pub struct RangeBound {
    /// Bound value
    pub value: PropertyValue,
    /// Whether the bound value itself matches
    pub inclusive: bool,
}

impl RangeBound {
    /// Inclusive bound
    pub fn inclusive(value: impl Into<PropertyValue>) -> Self {
        RangeBound {
            value: value.into(),
            inclusive: true,
        }
    }

    /// Exclusive bound
    pub fn exclusive(value: impl Into<PropertyValue>) -> Self {
        RangeBound {
            value: value.into(),
            inclusive: false,
        }
    }
}

// ============================================================================
// Query
// ============================================================================

/// Query AST node
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Matches every live document
    MatchAll,
    /// Field contains the term (token match on text, exact match otherwise)
    Term {
        /// Property name
        field: String,
        /// Term value
        value: String,
    },
    /// Field has a term starting with the prefix
    Prefix {
        /// Property name
        field: String,
        /// Prefix value
        prefix: String,
    },
    /// Field has a value within the bounds
    Range {
        /// Property name
        field: String,
        /// Lower bound, `None` for open
        lower: Option<RangeBound>,
        /// Upper bound, `None` for open
        upper: Option<RangeBound>,
    },
    /// Field has at least one value
    Exists {
        /// Property name
        field: String,
    },
    /// All children match
    And(Vec<Query>),
    /// At least one child matches
    Or(Vec<Query>),
    /// Child does not match
    Not(Box<Query>),
}

impl Query {
    /// Term query
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Query::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Prefix query
    pub fn prefix(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Query::Prefix {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    /// Exists query
    pub fn exists(field: impl Into<String>) -> Self {
        Query::Exists {
            field: field.into(),
        }
    }

    /// Range query; at least one bound is required
    pub fn range(
        field: impl Into<String>,
        lower: Option<RangeBound>,
        upper: Option<RangeBound>,
    ) -> Result<Self> {
        let q = Query::Range {
            field: field.into(),
            lower,
            upper,
        };
        q.validate()?;
        Ok(q)
    }

    /// Conjunction; fails on an empty child list
    pub fn and(children: Vec<Query>) -> Result<Self> {
        let q = Query::And(children);
        q.validate()?;
        Ok(q)
    }

    /// Disjunction; fails on an empty child list
    pub fn or(children: Vec<Query>) -> Result<Self> {
        let q = Query::Or(children);
        q.validate()?;
        Ok(q)
    }

    /// Negation
    #[allow(clippy::should_implement_trait)]
    pub fn not(child: Query) -> Self {
        Query::Not(Box::new(child))
    }

    /// Check the whole tree for structural errors
    pub fn validate(&self) -> Result<()> {
        match self {
            Query::MatchAll => Ok(()),
            Query::Term { field, value } => {
                check_field(field)?;
                if value.trim().is_empty() {
                    return Err(Error::InvalidQuery(format!(
                        "empty term value for field '{}'",
                        field
                    )));
                }
                Ok(())
            }
            Query::Prefix { field, prefix } => {
                check_field(field)?;
                if prefix.is_empty() {
                    return Err(Error::InvalidQuery(format!(
                        "empty prefix for field '{}'",
                        field
                    )));
                }
                Ok(())
            }
            Query::Range {
                field,
                lower,
                upper,
            } => {
                check_field(field)?;
                match (lower, upper) {
                    (None, None) => Err(Error::InvalidQuery(format!(
                        "range on '{}' has no bounds",
                        field
                    ))),
                    (Some(lo), Some(hi)) => match lo.value.compare(&hi.value) {
                        None => Err(Error::InvalidQuery(format!(
                            "range on '{}' mixes value types",
                            field
                        ))),
                        Some(Ordering::Greater) => Err(Error::InvalidQuery(format!(
                            "range on '{}' has lower bound above upper bound",
                            field
                        ))),
                        Some(_) => Ok(()),
                    },
                    _ => Ok(()),
                }
            }
            Query::Exists { field } => check_field(field),
            Query::And(children) | Query::Or(children) => {
                if children.is_empty() {
                    return Err(Error::InvalidQuery(
                        "composite query without children".to_string(),
                    ));
                }
                children.iter().try_for_each(Query::validate)
            }
            Query::Not(child) => child.validate(),
        }
    }
}

fn check_field(field: &str) -> Result<()> {
    if field.trim().is_empty() {
        return Err(Error::InvalidQuery("empty field name".to_string()));
    }
    Ok(())
}

// ============================================================================
// Sorting
// ============================================================================

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Smallest first
    #[default]
    Ascending,
    /// Largest first
    Descending,
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    /// Property name; `uri` and `score` are reserved
    pub field: String,
    /// Direction
    pub direction: SortDirection,
}

/// Ordered sort keys; empty means relevance order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sorting {
    /// Sort keys, most significant first
    pub fields: Vec<SortField>,
}

impl Sorting {
    /// Relevance (natural) order
    pub fn relevance() -> Self {
        Sorting::default()
    }

    /// Builder: append a sort key
    pub fn then(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.fields.push(SortField {
            field: field.into(),
            direction,
        });
        self
    }

    /// True when no sort keys are given
    pub fn is_relevance(&self) -> bool {
        self.fields.is_empty()
    }
}
