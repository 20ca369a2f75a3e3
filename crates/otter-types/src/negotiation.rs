use crate::id::{NegotiationId, ProposalId};
use crate::rule::{Rule, RuleConflict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStatus {
    InProgress,
    Resolved,
    Failed,
}

impl NegotiationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Failed)
    }
}

/// A mediated inter-raft negotiation over conflicting rules.
///
/// The transcript records every mediator exchange in order: each prompt
/// is appended before the call, the returned text after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Negotiation {
    pub negotiation_id: NegotiationId,
    pub raft1_id: String,
    pub raft2_id: String,
    pub conflicts: Vec<RuleConflict>,
    /// The negotiated compromise rule, once mediation succeeds.
    pub proposed_rule: Option<Rule>,
    pub raft1_proposal: Option<ProposalId>,
    pub raft2_proposal: Option<ProposalId>,
    pub status: NegotiationStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub transcript: Vec<String>,
}

impl Negotiation {
    pub fn start(
        raft1_id: impl Into<String>,
        raft2_id: impl Into<String>,
        conflicts: Vec<RuleConflict>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let raft1_id = raft1_id.into();
        let raft2_id = raft2_id.into();
        let negotiation_id =
            NegotiationId::compute(&raft1_id, &raft2_id, started_at.timestamp());
        Self {
            negotiation_id,
            raft1_id,
            raft2_id,
            conflicts,
            proposed_rule: None,
            raft1_proposal: None,
            raft2_proposal: None,
            status: NegotiationStatus::InProgress,
            started_at,
            completed_at: None,
            transcript: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiation_start() {
        let negotiation = Negotiation::start("raft-x", "raft-y", vec![], Utc::now());
        assert_eq!(negotiation.status, NegotiationStatus::InProgress);
        assert!(!negotiation.status.is_terminal());
        assert!(negotiation.proposed_rule.is_none());
        assert!(negotiation.transcript.is_empty());
    }
}
