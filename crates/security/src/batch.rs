//! Authorization batches
//!
//! One batch holds the security records of the raw hits exposed by a single
//! expansion round. Strategies record a decision on every record through
//! [`AuthorizationBatch::candidates_mut`], which allows deciding but not
//! adding or removing records. The executor then reads the decisions back
//! with [`AuthorizationBatch::decisions`], which refuses a batch whose
//! records are undecided or no longer the ones it was created with.

use quarry_core::{AuthorizationDecision, DocRef, Error, Result, SecurityInfo};
use std::collections::HashSet;

/// Candidates of one authorization call
#[derive(Debug, Clone, Default)]
pub struct AuthorizationBatch {
    /// Raw match count of the search that produced the candidates
    pub total_hits: usize,
    candidates: Vec<SecurityInfo>,
    submitted: Vec<DocRef>,
}

impl AuthorizationBatch {
    /// New batch
    pub fn new(total_hits: usize, candidates: Vec<SecurityInfo>) -> Self {
        let submitted = candidates.iter().map(|c| c.doc_ref).collect();
        AuthorizationBatch {
            total_hits,
            candidates,
            submitted,
        }
    }

    /// Records to decide, in raw hit order
    pub fn candidates(&self) -> &[SecurityInfo] {
        &self.candidates
    }

    /// Records to decide, for recording decisions
    pub fn candidates_mut(&mut self) -> &mut [SecurityInfo] {
        &mut self.candidates
    }

    /// Number of candidates
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// True if there is nothing to decide
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Mark every candidate with the same decision
    pub fn decide_all(&mut self, authorized: bool) {
        for info in &mut self.candidates {
            info.set_authorized(authorized);
        }
    }

    /// Candidates still undecided
    pub fn undecided(&self) -> usize {
        self.candidates
            .iter()
            .filter(|c| c.decision().is_none())
            .count()
    }

    /// Candidates decided as readable
    pub fn authorized_count(&self) -> usize {
        self.candidates.iter().filter(|c| c.is_authorized()).count()
    }

    /// One decision per candidate, in candidate order.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` if a candidate was left undecided, two
    /// candidates share a document address, or a candidate's address differs
    /// from the one the batch was created with.
    pub fn decisions(&self) -> Result<Vec<AuthorizationDecision>> {
        if self.candidates.len() != self.submitted.len() {
            return Err(Error::InvalidState(format!(
                "authorization batch holds {} candidates, {} were submitted",
                self.candidates.len(),
                self.submitted.len()
            )));
        }
        let mut seen = HashSet::with_capacity(self.candidates.len());
        self.candidates
            .iter()
            .zip(&self.submitted)
            .map(|(info, submitted)| {
                if info.doc_ref != *submitted {
                    return Err(Error::InvalidState(format!(
                        "authorization candidate {} replaced by {}",
                        submitted, info.doc_ref
                    )));
                }
                if !seen.insert(info.doc_ref) {
                    return Err(Error::InvalidState(format!(
                        "duplicate authorization candidate {}",
                        info.doc_ref
                    )));
                }
                let authorized = info.decision().ok_or_else(|| {
                    Error::InvalidState(format!(
                        "authorization left candidate {} undecided",
                        info.doc_ref
                    ))
                })?;
                Ok(AuthorizationDecision {
                    doc_ref: info.doc_ref,
                    authorized,
                })
            })
            .collect()
    }
}
