//! Property values and property sets
//!
//! A `PropertySet` is the repository's view of one resource: its uri, its
//! resource type and a map of multi-valued typed properties. It is the unit
//! that gets indexed and the unit returned to search callers.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

// ============================================================================
// PropertyValue
// ============================================================================

/// A single typed property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Free text, tokenized for term matching
    Text(String),
    /// Signed integer
    Int(i64),
    /// Boolean flag
    Bool(bool),
    /// Point in time (UTC)
    Date(DateTime<Utc>),
}

impl PropertyValue {
    /// Canonical term form used for exact matching.
    ///
    /// Text is lowercased; dates use RFC 3339 with second precision.
    pub fn term(&self) -> String {
        match self {
            PropertyValue::Text(s) => s.to_lowercase(),
            PropertyValue::Int(i) => i.to_string(),
            PropertyValue::Bool(b) => b.to_string(),
            PropertyValue::Date(d) => d.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Compare two values of the same variant.
    ///
    /// Returns `None` when the variants differ; such values are not ordered
    /// relative to each other.
    pub fn compare(&self, other: &PropertyValue) -> Option<Ordering> {
        match (self, other) {
            (PropertyValue::Text(a), PropertyValue::Text(b)) => {
                Some(a.to_lowercase().cmp(&b.to_lowercase()))
            }
            (PropertyValue::Int(a), PropertyValue::Int(b)) => Some(a.cmp(b)),
            (PropertyValue::Bool(a), PropertyValue::Bool(b)) => Some(a.cmp(b)),
            (PropertyValue::Date(a), PropertyValue::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Approximate in-memory footprint in bytes
    pub fn estimated_size(&self) -> usize {
        match self {
            PropertyValue::Text(s) => s.len() + 8,
            PropertyValue::Int(_) | PropertyValue::Date(_) => 8,
            PropertyValue::Bool(_) => 1,
        }
    }

    /// Borrow the text payload, if this is a text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Text(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Int(i)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(d: DateTime<Utc>) -> Self {
        PropertyValue::Date(d)
    }
}

// ============================================================================
// PropertySet
// ============================================================================

/// Properties of one repository resource
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PropertySet {
    /// Resource uri, e.g. `/docs/report.html`
    pub uri: String,
    /// Resource type name, e.g. `document` or `collection`
    pub resource_type: String,
    /// Property name -> values, in name order
    pub properties: BTreeMap<String, Vec<PropertyValue>>,
}

impl PropertySet {
    /// Create an empty property set for a resource
    pub fn new(uri: impl Into<String>, resource_type: impl Into<String>) -> Self {
        PropertySet {
            uri: uri.into(),
            resource_type: resource_type.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder: add a value to a (possibly multi-valued) property
    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.add(name, value);
        self
    }

    /// Append a value to a property
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties
            .entry(name.into())
            .or_default()
            .push(value.into());
    }

    /// All values of a property
    pub fn get(&self, name: &str) -> Option<&[PropertyValue]> {
        self.properties.get(name).map(|v| v.as_slice())
    }

    /// First value of a property
    pub fn first(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name).and_then(|v| v.first())
    }

    /// Property names present on this set
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(|k| k.as_str())
    }

    /// Number of distinct properties
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// True when no properties are set
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// True if `other` is this resource or one of its descendants
    pub fn is_ancestor_of(&self, other: &str) -> bool {
        is_descendant_uri(&self.uri, other)
    }
}

/// True if `uri` equals `ancestor` or lies beneath it
pub fn is_descendant_uri(ancestor: &str, uri: &str) -> bool {
    if ancestor == "/" {
        return uri.starts_with('/');
    }
    match uri.strip_prefix(ancestor) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}
