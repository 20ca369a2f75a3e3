use otter_types::{Negotiation, NegotiationId, Proposal, ProposalId};
use std::collections::HashMap;
use tokio::sync::{RwLock, RwLockWriteGuard};

/// Open and closed proposals with their vote tallies.
///
/// The voting engine serialises the whole record-vote / evaluate /
/// activate sequence under this registry's write lock.
pub struct ProposalRegistry {
    proposals: RwLock<HashMap<ProposalId, Proposal>>,
}

impl ProposalRegistry {
    pub fn new() -> Self {
        Self {
            proposals: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, proposal: Proposal) {
        let mut proposals = self.proposals.write().await;
        proposals.insert(proposal.proposal_id, proposal);
    }

    pub async fn get(&self, proposal_id: &ProposalId) -> Option<Proposal> {
        let proposals = self.proposals.read().await;
        proposals.get(proposal_id).cloned()
    }

    pub async fn open_proposals(&self) -> Vec<Proposal> {
        let proposals = self.proposals.read().await;
        let mut open: Vec<Proposal> = proposals.values().filter(|p| p.is_open()).cloned().collect();
        open.sort_by_key(|p| p.proposed_at);
        open
    }

    pub async fn all(&self) -> Vec<Proposal> {
        let proposals = self.proposals.read().await;
        let mut all: Vec<Proposal> = proposals.values().cloned().collect();
        all.sort_by_key(|p| p.proposed_at);
        all
    }

    pub(crate) async fn lock_exclusive(
        &self,
    ) -> RwLockWriteGuard<'_, HashMap<ProposalId, Proposal>> {
        self.proposals.write().await
    }
}

impl Default for ProposalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Inter-raft negotiations, open and settled.
pub struct NegotiationRegistry {
    negotiations: RwLock<HashMap<NegotiationId, Negotiation>>,
}

impl NegotiationRegistry {
    pub fn new() -> Self {
        Self {
            negotiations: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, negotiation: Negotiation) {
        let mut negotiations = self.negotiations.write().await;
        negotiations.insert(negotiation.negotiation_id, negotiation);
    }

    pub async fn get(&self, negotiation_id: &NegotiationId) -> Option<Negotiation> {
        let negotiations = self.negotiations.read().await;
        negotiations.get(negotiation_id).cloned()
    }

    /// Apply a mutation to a stored negotiation, if present.
    pub async fn update<F>(&self, negotiation_id: &NegotiationId, mutate: F) -> bool
    where
        F: FnOnce(&mut Negotiation),
    {
        let mut negotiations = self.negotiations.write().await;
        match negotiations.get_mut(negotiation_id) {
            Some(negotiation) => {
                mutate(negotiation);
                true
            }
            None => false,
        }
    }
}

impl Default for NegotiationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
