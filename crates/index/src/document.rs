//! Stored documents
//!
//! A [`StoredDocument`] is what a segment keeps per resource: flattened stored
//! fields plus the denormalized ACL data. [`Document`] is the selective view
//! handed back by `IndexSnapshot::document`.

use quarry_core::{
    AclMetadata, FieldSelection, PrincipalId, PropertySet, PropertyValue,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Field name under which the resource uri is indexed
pub const URI_FIELD: &str = "uri";
/// Field name under which the resource type is indexed
pub const RESOURCE_TYPE_FIELD: &str = "resource_type";
/// Sort key selecting relevance order
pub const SCORE_FIELD: &str = "score";

// ============================================================================
// StoredDocument
// ============================================================================

/// One indexed resource as held by a segment
#[derive(Debug, Clone)]
pub struct StoredDocument {
    /// Resource uri
    pub uri: String,
    /// Resource type name
    pub resource_type: String,
    /// Stored fields in insertion order (multi-valued fields repeat the name)
    pub fields: Vec<(String, PropertyValue)>,
    /// Resource owner
    pub owner: PrincipalId,
    /// Uri of the effective ACL holder
    pub acl_holder: String,
    /// Read principals, shared between documents with the same ACL holder
    pub read_principals: Arc<BTreeSet<PrincipalId>>,
}

impl StoredDocument {
    /// Flatten a property set and its ACL data into a stored document
    pub fn from_property_set(set: &PropertySet, acl: &AclMetadata) -> Self {
        let fields = set
            .properties
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.clone(), v.clone())))
            .collect();
        StoredDocument {
            uri: set.uri.clone(),
            resource_type: set.resource_type.clone(),
            fields,
            owner: acl.owner.clone(),
            acl_holder: acl.acl_holder.clone(),
            read_principals: Arc::new(acl.read_principals.clone()),
        }
    }

    /// Values of a stored field, in stored order
    pub fn values<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a PropertyValue> + 'a {
        self.fields
            .iter()
            .filter(move |(name, _)| name == field)
            .map(|(_, v)| v)
    }

    /// First value of a field; `uri` and `resource_type` resolve to the
    /// resource's own attributes
    pub fn first_value(&self, field: &str) -> Option<PropertyValue> {
        match field {
            URI_FIELD => Some(PropertyValue::Text(self.uri.clone())),
            RESOURCE_TYPE_FIELD => Some(PropertyValue::Text(self.resource_type.clone())),
            _ => self.values(field).next().cloned(),
        }
    }

    /// True if the field has at least one value
    pub fn has_field(&self, field: &str) -> bool {
        match field {
            URI_FIELD | RESOURCE_TYPE_FIELD => true,
            _ => self.fields.iter().any(|(name, _)| name == field),
        }
    }

    /// Approximate in-memory footprint in bytes
    pub fn estimated_size(&self) -> usize {
        let fields: usize = self
            .fields
            .iter()
            .map(|(name, value)| name.len() + value.estimated_size())
            .sum();
        self.uri.len() + self.resource_type.len() + self.acl_holder.len() + fields
    }

    /// Selective view of this document
    pub fn select(&self, selection: &FieldSelection) -> Document {
        Document {
            uri: self.uri.clone(),
            resource_type: self.resource_type.clone(),
            fields: self
                .fields
                .iter()
                .filter(|(name, _)| selection.includes(name))
                .cloned()
                .collect(),
        }
    }
}

// ============================================================================
// Document
// ============================================================================

/// Stored fields of one hit, restricted to a field selection
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Resource uri
    pub uri: String,
    /// Resource type name
    pub resource_type: String,
    /// Selected stored fields in stored order
    pub fields: Vec<(String, PropertyValue)>,
}
