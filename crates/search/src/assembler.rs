//! Result assembly
//!
//! Turns the stored fields of authorized hits into property sets, keeping the
//! order the executor produced.

use quarry_core::PropertySet;
use quarry_index::Document;

/// Maps hit documents to result items
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAssembler;

impl ResultAssembler {
    /// One property set per document, in input order
    pub fn assemble(&self, documents: Vec<Document>) -> Vec<PropertySet> {
        documents.into_iter().map(to_property_set).collect()
    }
}

fn to_property_set(doc: Document) -> PropertySet {
    let mut set = PropertySet::new(doc.uri, doc.resource_type);
    for (name, value) in doc.fields {
        set.add(name, value);
    }
    set
}
