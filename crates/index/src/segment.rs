//! Immutable index segments
//!
//! A [`Segment`] is built once at commit time from the pending buffer and is
//! never mutated afterwards. Deletions are tracked outside the segment as
//! per-snapshot tombstone sets, so the same `Arc<Segment>` can be shared by
//! any number of snapshots.
//!
//! ## Layout
//!
//! ```text
//! docs          doc_id -> StoredDocument
//! terms         field -> term -> sorted doc_ids
//! uri_to_doc    uri -> doc_id (ordered, for descendant range scans)
//! ```

use crate::document::{StoredDocument, RESOURCE_TYPE_FIELD, URI_FIELD};
use crate::native::NativeQuery;
use crate::tokenizer::tokenize_unique;
use quarry_core::{is_descendant_uri, PrincipalId, PropertyValue, RangeBound};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;

/// Per-document scores of a query evaluated over one segment
pub(crate) type Matches = BTreeMap<u32, f32>;

// ============================================================================
// Segment
// ============================================================================

/// An immutable, searchable batch of documents
#[derive(Debug, Default)]
pub struct Segment {
    docs: Vec<Arc<StoredDocument>>,
    terms: HashMap<String, BTreeMap<String, Vec<u32>>>,
    uri_to_doc: BTreeMap<String, u32>,
    field_names: BTreeSet<String>,
    size: usize,
}

impl Segment {
    /// Build a segment from documents in insertion order.
    ///
    /// Documents sharing an ACL holder share one read-principal set.
    pub fn build(docs: Vec<StoredDocument>) -> Self {
        let mut segment = Segment::default();
        let mut acl_sets: HashMap<String, Arc<BTreeSet<PrincipalId>>> = HashMap::new();

        for mut doc in docs {
            let doc_id = segment.docs.len() as u32;

            let shared = acl_sets
                .entry(doc.acl_holder.clone())
                .or_insert_with(|| Arc::clone(&doc.read_principals));
            if **shared == *doc.read_principals {
                doc.read_principals = Arc::clone(shared);
            }

            segment.index_value(URI_FIELD, &PropertyValue::Text(doc.uri.clone()), doc_id);
            segment.index_value(
                RESOURCE_TYPE_FIELD,
                &PropertyValue::Text(doc.resource_type.clone()),
                doc_id,
            );
            for (name, value) in &doc.fields {
                segment.index_value(name, value, doc_id);
                segment.field_names.insert(name.clone());
            }

            segment.size += doc.estimated_size();
            segment.uri_to_doc.insert(doc.uri.clone(), doc_id);
            segment.docs.push(Arc::new(doc));
        }
        segment
    }

    fn index_value(&mut self, field: &str, value: &PropertyValue, doc_id: u32) {
        let terms = self.terms.entry(field.to_string()).or_default();
        let mut add = |term: String| {
            let postings = terms.entry(term).or_default();
            if postings.last() != Some(&doc_id) {
                postings.push(doc_id);
            }
        };
        add(value.term());
        if let Some(text) = value.as_text() {
            for token in tokenize_unique(text) {
                add(token);
            }
        }
    }

    /// Number of documents, including deleted ones
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// True if the segment holds no documents
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Stored document by id
    pub fn doc(&self, doc_id: u32) -> Option<&Arc<StoredDocument>> {
        self.docs.get(doc_id as usize)
    }

    /// Document id of a uri
    pub fn doc_id(&self, uri: &str) -> Option<u32> {
        self.uri_to_doc.get(uri).copied()
    }

    /// Document ids of `uri` and every resource beneath it
    pub fn descendants(&self, uri: &str) -> Vec<u32> {
        self.uri_to_doc
            .range::<str, _>((Bound::Included(uri), Bound::Unbounded))
            .take_while(|(u, _)| u.starts_with(uri))
            .filter(|(u, _)| is_descendant_uri(uri, u))
            .map(|(_, id)| *id)
            .collect()
    }

    /// Stored property names
    pub fn field_names(&self) -> &BTreeSet<String> {
        &self.field_names
    }

    /// Estimated footprint in bytes
    pub fn physical_size(&self) -> usize {
        self.size
    }

    /// All stored documents in id order
    pub fn docs(&self) -> impl Iterator<Item = (u32, &Arc<StoredDocument>)> {
        self.docs.iter().enumerate().map(|(id, d)| (id as u32, d))
    }

    // ========================================================================
    // Query evaluation
    // ========================================================================

    /// Evaluate a query against every document of the segment.
    ///
    /// Deletions are not applied here.
    pub(crate) fn evaluate(&self, query: &NativeQuery) -> Matches {
        match query {
            NativeQuery::MatchAll => self.all_docs(0.0),
            NativeQuery::Term { field, term } => self
                .postings(field, term)
                .iter()
                .map(|id| (*id, 1.0))
                .collect(),
            NativeQuery::Prefix { field, prefix } => {
                let mut matches = Matches::new();
                if let Some(terms) = self.terms.get(field) {
                    for (_, postings) in terms
                        .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
                        .take_while(|(t, _)| t.starts_with(prefix.as_str()))
                    {
                        for id in postings {
                            matches.insert(*id, 1.0);
                        }
                    }
                }
                matches
            }
            NativeQuery::Range {
                field,
                lower,
                upper,
            } => self.filter_docs(|doc| range_matches(doc, field, lower.as_ref(), upper.as_ref())),
            NativeQuery::Exists { field } => self.filter_docs(|doc| doc.has_field(field)),
            NativeQuery::Boolean {
                must,
                should,
                must_not,
            } => self.evaluate_boolean(must, should, must_not),
        }
    }

    fn evaluate_boolean(
        &self,
        must: &[NativeQuery],
        should: &[NativeQuery],
        must_not: &[NativeQuery],
    ) -> Matches {
        let mut matches = if let Some((first, rest)) = must.split_first() {
            let mut acc = self.evaluate(first);
            for clause in rest {
                if acc.is_empty() {
                    break;
                }
                let other = self.evaluate(clause);
                acc.retain(|id, score| match other.get(id) {
                    Some(s) => {
                        *score += s;
                        true
                    }
                    None => false,
                });
            }
            for clause in should {
                for (id, s) in self.evaluate(clause) {
                    if let Some(score) = acc.get_mut(&id) {
                        *score += s;
                    }
                }
            }
            acc
        } else {
            let mut acc = Matches::new();
            for clause in should {
                for (id, s) in self.evaluate(clause) {
                    *acc.entry(id).or_insert(0.0) += s;
                }
            }
            acc
        };

        for clause in must_not {
            if matches.is_empty() {
                break;
            }
            for id in self.evaluate(clause).keys() {
                matches.remove(id);
            }
        }
        matches
    }

    fn postings(&self, field: &str, term: &str) -> &[u32] {
        self.terms
            .get(field)
            .and_then(|t| t.get(term))
            .map(|p| p.as_slice())
            .unwrap_or(&[])
    }

    fn all_docs(&self, score: f32) -> Matches {
        (0..self.docs.len() as u32).map(|id| (id, score)).collect()
    }

    fn filter_docs(&self, pred: impl Fn(&StoredDocument) -> bool) -> Matches {
        self.docs()
            .filter(|(_, doc)| pred(doc))
            .map(|(id, _)| (id, 0.0))
            .collect()
    }
}

fn range_matches(
    doc: &StoredDocument,
    field: &str,
    lower: Option<&RangeBound>,
    upper: Option<&RangeBound>,
) -> bool {
    match field {
        URI_FIELD | RESOURCE_TYPE_FIELD => doc
            .first_value(field)
            .map_or(false, |v| in_range(&v, lower, upper)),
        _ => doc.values(field).any(|v| in_range(v, lower, upper)),
    }
}

fn in_range(value: &PropertyValue, lower: Option<&RangeBound>, upper: Option<&RangeBound>) -> bool {
    let above = match lower {
        None => true,
        Some(b) => match value.compare(&b.value) {
            Some(Ordering::Greater) => true,
            Some(Ordering::Equal) => b.inclusive,
            _ => false,
        },
    };
    let below = match upper {
        None => true,
        Some(b) => match value.compare(&b.value) {
            Some(Ordering::Less) => true,
            Some(Ordering::Equal) => b.inclusive,
            _ => false,
        },
    };
    above && below
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::QueryBuilder;
    use quarry_core::{AclMetadata, PropertySet, Query};

    fn doc(uri: &str, title: &str, size: i64) -> StoredDocument {
        let set = PropertySet::new(uri, "document")
            .with("title", title)
            .with("size", size);
        StoredDocument::from_property_set(&set, &AclMetadata::public("alice", "/"))
    }

    fn segment() -> Segment {
        Segment::build(vec![
            doc("/a", "Annual Report", 10),
            doc("/a/b", "Quarterly report draft", 20),
            doc("/ab", "Budget", 30),
        ])
    }

    fn run(segment: &Segment, query: Query) -> Vec<u32> {
        let native = QueryBuilder.build(&query).unwrap();
        segment.evaluate(&native).keys().copied().collect()
    }

    #[test]
    fn test_term_matches_tokens_and_full_value() {
        let s = segment();
        assert_eq!(run(&s, Query::term("title", "report")), vec![0, 1]);
        assert_eq!(run(&s, Query::term("title", "Annual Report")), vec![0]);
        assert_eq!(run(&s, Query::term("size", "20")), vec![1]);
    }

    #[test]
    fn test_prefix() {
        let s = segment();
        assert_eq!(run(&s, Query::prefix("title", "quart")), vec![1]);
        assert_eq!(run(&s, Query::prefix("title", "zzz")), Vec::<u32>::new());
    }

    #[test]
    fn test_range_inclusive_exclusive() {
        let s = segment();
        let q = Query::range(
            "size",
            Some(RangeBound::inclusive(10i64)),
            Some(RangeBound::exclusive(30i64)),
        )
        .unwrap();
        assert_eq!(run(&s, q), vec![0, 1]);
    }

    #[test]
    fn test_exists_and_reserved_fields() {
        let s = segment();
        assert_eq!(run(&s, Query::exists("title")).len(), 3);
        assert!(run(&s, Query::exists("body")).is_empty());
        assert_eq!(run(&s, Query::term("resource_type", "document")).len(), 3);
    }

    #[test]
    fn test_boolean_scoring() {
        let s = segment();
        let q = Query::or(vec![Query::term("title", "report"), Query::term("title", "draft")]).unwrap();
        let native = QueryBuilder.build(&q).unwrap();
        let matches = s.evaluate(&native);
        assert_eq!(matches.get(&0), Some(&1.0));
        assert_eq!(matches.get(&1), Some(&2.0));
    }

    #[test]
    fn test_not() {
        let s = segment();
        assert_eq!(run(&s, Query::not(Query::term("title", "report"))), vec![2]);
    }

    #[test]
    fn test_descendants_respect_path_boundaries() {
        let s = segment();
        assert_eq!(s.descendants("/a"), vec![0, 1]);
        assert_eq!(s.descendants("/ab"), vec![2]);
    }

    #[test]
    fn test_read_principals_shared_per_acl_holder() {
        let s = segment();
        let a = &s.doc(0).unwrap().read_principals;
        let b = &s.doc(2).unwrap().read_principals;
        assert!(Arc::ptr_eq(a, b));
    }
}
