//! Authorization from ACL data denormalized into the index
//!
//! Every raw hit carries its ACL holder and that holder's read principals,
//! so a batch can be decided without touching the repository. Hits sharing
//! an ACL holder share the decision, which is computed once per batch.
//! Only `pseudo:owner` grants depend on the individual hit.

use crate::batch::AuthorizationBatch;
use quarry_core::{Principal, PrincipalId, PSEUDO_ALL, PSEUDO_AUTHENTICATED, PSEUDO_OWNER};
use std::collections::{BTreeSet, HashMap};

/// Batch strategy over denormalized ACL data
#[derive(Debug, Clone, Copy, Default)]
pub struct DenormalizedAcl;

impl DenormalizedAcl {
    /// Decide every candidate of the batch for `principal` (`None` = anonymous)
    pub fn authorize(&self, principal: Option<&Principal>, batch: &mut AuthorizationBatch) {
        let mut holders: HashMap<String, bool> = HashMap::new();
        for info in batch.candidates_mut() {
            let by_holder = match holders.get(&info.acl_holder) {
                Some(decision) => *decision,
                None => {
                    let decision = grants_read(principal, &info.read_principals);
                    holders.insert(info.acl_holder.clone(), decision);
                    decision
                }
            };
            let by_owner = principal.map_or(false, |p| {
                p.id == info.owner && info.read_principals.contains(&PrincipalId::owner())
            });
            info.set_authorized(by_holder || by_owner);
        }
    }
}

/// True if the read set admits the principal independently of ownership
fn grants_read(principal: Option<&Principal>, readers: &BTreeSet<PrincipalId>) -> bool {
    readers.iter().any(|reader| match reader.as_str() {
        PSEUDO_ALL => true,
        PSEUDO_AUTHENTICATED => principal.is_some(),
        PSEUDO_OWNER => false,
        _ => principal.map_or(false, |p| p.is_or_member_of(reader)),
    })
}
