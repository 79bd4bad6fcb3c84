//! Point-in-time index snapshots
//!
//! A [`Snapshot`] is an immutable list of segment readers plus the generation
//! that produced it. Each reader pairs a shared segment with the tombstones
//! that were in effect when the snapshot was published, so a snapshot never
//! changes after creation and can be searched without locking.
//!
//! Search consumers only see the [`IndexSnapshot`] trait; the manager hands
//! out `Snapshot`s, tests substitute their own implementations.

use crate::document::{Document, StoredDocument};
use crate::native::{NativeQuery, NativeSort, SortTarget};
use crate::segment::Segment;
use quarry_core::{DocRef, Error, FieldSelection, PropertyValue, Result, SecurityInfo};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// TopDocs
// ============================================================================

/// One scored raw hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreDoc {
    /// Address of the hit within the snapshot
    pub doc_ref: DocRef,
    /// Relevance score
    pub score: f32,
}

/// Result of one underlying search
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopDocs {
    /// Number of live documents matching the query
    pub total_hits: usize,
    /// Best `limit` hits in sort order
    pub score_docs: Vec<ScoreDoc>,
}

// ============================================================================
// IndexSnapshot
// ============================================================================

/// Read-only view of the index used by searches and status introspection
pub trait IndexSnapshot: fmt::Debug + Send + Sync {
    /// Commit generation this view reflects
    fn generation(&self) -> u64;

    /// Top `limit` live hits for `query` in `sort` order
    fn search(&self, query: &NativeQuery, sort: &NativeSort, limit: usize) -> Result<TopDocs>;

    /// Stored fields of a hit restricted to `selection`
    fn document(&self, doc_ref: DocRef, selection: &FieldSelection) -> Result<Document>;

    /// Denormalized security data of a hit, undecided
    fn security_info(&self, doc_ref: DocRef) -> Result<SecurityInfo>;

    /// Live documents
    fn document_count(&self) -> Result<usize>;

    /// True if any segment carries deleted documents
    fn has_deletions(&self) -> Result<bool>;

    /// Names of all stored properties
    fn field_names(&self) -> Result<BTreeSet<String>>;

    /// Estimated size of all segments in bytes
    fn physical_size(&self) -> Result<u64>;
}

// ============================================================================
// SegmentReader
// ============================================================================

/// A segment together with the documents deleted from it
#[derive(Debug, Clone)]
pub struct SegmentReader {
    segment: Arc<Segment>,
    deleted: Arc<HashSet<u32>>,
}

impl SegmentReader {
    /// Reader without deletions
    pub fn new(segment: Arc<Segment>) -> Self {
        SegmentReader {
            segment,
            deleted: Arc::new(HashSet::new()),
        }
    }

    /// Reader with the given tombstones
    pub fn with_deletions(segment: Arc<Segment>, deleted: Arc<HashSet<u32>>) -> Self {
        SegmentReader { segment, deleted }
    }

    /// Underlying segment
    pub fn segment(&self) -> &Arc<Segment> {
        &self.segment
    }

    /// Tombstoned document ids
    pub fn deleted(&self) -> &Arc<HashSet<u32>> {
        &self.deleted
    }

    /// True if the document exists and is not deleted
    pub fn is_live(&self, doc_id: u32) -> bool {
        (doc_id as usize) < self.segment.len() && !self.deleted.contains(&doc_id)
    }

    /// Number of live documents
    pub fn live_count(&self) -> usize {
        self.segment.len() - self.deleted.len()
    }

    fn live_doc(&self, doc_id: u32) -> Option<&Arc<StoredDocument>> {
        if self.deleted.contains(&doc_id) {
            return None;
        }
        self.segment.doc(doc_id)
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable committed state of an index
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    generation: u64,
    readers: Vec<SegmentReader>,
}

struct Candidate<'a> {
    doc_ref: DocRef,
    score: f32,
    doc: &'a StoredDocument,
    sort_values: Vec<Option<PropertyValue>>,
}

impl Snapshot {
    /// Empty snapshot at generation 0
    pub fn empty() -> Self {
        Snapshot::default()
    }

    /// Snapshot over the given readers
    pub fn new(generation: u64, readers: Vec<SegmentReader>) -> Self {
        Snapshot {
            generation,
            readers,
        }
    }

    /// Segment readers, in segment ordinal order
    pub fn readers(&self) -> &[SegmentReader] {
        &self.readers
    }

    /// Every live document in segment then id order
    pub fn live_documents(&self) -> impl Iterator<Item = &Arc<StoredDocument>> {
        self.readers.iter().flat_map(|reader| {
            reader
                .segment
                .docs()
                .filter(move |(id, _)| !reader.deleted.contains(id))
                .map(|(_, doc)| doc)
        })
    }

    fn live_doc(&self, doc_ref: DocRef) -> Result<&Arc<StoredDocument>> {
        self.readers
            .get(doc_ref.segment as usize)
            .and_then(|r| r.live_doc(doc_ref.doc))
            .ok_or_else(|| {
                Error::query_execution(format!(
                    "no live document at {} in generation {}",
                    doc_ref, self.generation
                ))
            })
    }

    fn candidates(&self, query: &NativeQuery, sort: &NativeSort) -> Vec<Candidate<'_>> {
        let mut out = Vec::new();
        for (ordinal, reader) in self.readers.iter().enumerate() {
            for (doc_id, score) in reader.segment.evaluate(query) {
                let Some(doc) = reader.live_doc(doc_id) else {
                    continue;
                };
                let sort_values = sort
                    .keys
                    .iter()
                    .map(|key| match &key.target {
                        SortTarget::Field(field) => doc.first_value(field),
                        SortTarget::Score | SortTarget::Uri => None,
                    })
                    .collect();
                out.push(Candidate {
                    doc_ref: DocRef::new(ordinal as u32, doc_id),
                    score,
                    doc,
                    sort_values,
                });
            }
        }
        out
    }
}

fn compare_candidates(sort: &NativeSort, a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    for (i, key) in sort.keys.iter().enumerate() {
        let ord = match &key.target {
            SortTarget::Score => directed(a.score.total_cmp(&b.score), key.descending),
            SortTarget::Uri => directed(a.doc.uri.cmp(&b.doc.uri), key.descending),
            SortTarget::Field(_) => match (&a.sort_values[i], &b.sort_values[i]) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(x), Some(y)) => directed(compare_values(x, y), key.descending),
            },
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.doc_ref.cmp(&b.doc_ref)
}

fn directed(ord: Ordering, descending: bool) -> Ordering {
    if descending {
        ord.reverse()
    } else {
        ord
    }
}

/// Values of different types order by type: text, int, bool, date
fn compare_values(a: &PropertyValue, b: &PropertyValue) -> Ordering {
    fn rank(v: &PropertyValue) -> u8 {
        match v {
            PropertyValue::Text(_) => 0,
            PropertyValue::Int(_) => 1,
            PropertyValue::Bool(_) => 2,
            PropertyValue::Date(_) => 3,
        }
    }
    a.compare(b).unwrap_or_else(|| rank(a).cmp(&rank(b)))
}

impl IndexSnapshot for Snapshot {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn search(&self, query: &NativeQuery, sort: &NativeSort, limit: usize) -> Result<TopDocs> {
        let mut hits = self.candidates(query, sort);
        let total_hits = hits.len();

        let cmp = |a: &Candidate<'_>, b: &Candidate<'_>| compare_candidates(sort, a, b);
        if limit < hits.len() {
            hits.select_nth_unstable_by(limit, cmp);
            hits.truncate(limit);
        }
        hits.sort_by(cmp);

        Ok(TopDocs {
            total_hits,
            score_docs: hits
                .into_iter()
                .map(|c| ScoreDoc {
                    doc_ref: c.doc_ref,
                    score: c.score,
                })
                .collect(),
        })
    }

    fn document(&self, doc_ref: DocRef, selection: &FieldSelection) -> Result<Document> {
        Ok(self.live_doc(doc_ref)?.select(selection))
    }

    fn security_info(&self, doc_ref: DocRef) -> Result<SecurityInfo> {
        let doc = self.live_doc(doc_ref)?;
        Ok(SecurityInfo::new(
            doc_ref,
            doc.uri.clone(),
            doc.owner.clone(),
            doc.acl_holder.clone(),
            Arc::clone(&doc.read_principals),
        ))
    }

    fn document_count(&self) -> Result<usize> {
        Ok(self.readers.iter().map(SegmentReader::live_count).sum())
    }

    fn has_deletions(&self) -> Result<bool> {
        Ok(self.readers.iter().any(|r| !r.deleted.is_empty()))
    }

    fn field_names(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .readers
            .iter()
            .flat_map(|r| r.segment.field_names().iter().cloned())
            .collect())
    }

    fn physical_size(&self) -> Result<u64> {
        Ok(self
            .readers
            .iter()
            .map(|r| r.segment.physical_size() as u64)
            .sum())
    }
}
