use crate::id::ProposalId;
use crate::rule::Rule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A vote cast on a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VoteType {
    Yes,
    No,
    Abstain,
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Yes => "YES",
            Self::No => "NO",
            Self::Abstain => "ABSTAIN",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid vote type: {0}")]
pub struct ParseVoteTypeError(pub String);

impl FromStr for VoteType {
    type Err = ParseVoteTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "YES" => Ok(Self::Yes),
            "NO" => Ok(Self::No),
            "ABSTAIN" => Ok(Self::Abstain),
            other => Err(ParseVoteTypeError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalResult {
    Pending,
    Adopted,
    Rejected,
}

/// Per-type vote counts for a proposal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteTally {
    pub yes: usize,
    pub no: usize,
    pub abstain: usize,
}

impl VoteTally {
    /// Total number of votes cast.
    pub fn cast(&self) -> usize {
        self.yes + self.no + self.abstain
    }
}

/// A pending decision on whether a raft adopts a rule.
///
/// Invariants: at most one vote per member; a closed proposal's result
/// is never `Pending`; once adopted, the carried rule's `adopted_at`
/// equals `closed_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub proposal_id: ProposalId,
    pub raft_id: String,
    pub rule: Rule,
    pub proposed_by: String,
    pub proposed_at: DateTime<Utc>,
    pub votes: HashMap<String, VoteType>,
    pub status: ProposalStatus,
    pub quorum_met: bool,
    pub result: ProposalResult,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Proposal {
    pub fn open(
        proposal_id: ProposalId,
        raft_id: impl Into<String>,
        rule: Rule,
        proposed_at: DateTime<Utc>,
    ) -> Self {
        let proposed_by = rule.proposed_by.clone();
        Self {
            proposal_id,
            raft_id: raft_id.into(),
            rule,
            proposed_by,
            proposed_at,
            votes: HashMap::new(),
            status: ProposalStatus::Open,
            quorum_met: false,
            result: ProposalResult::Pending,
            closed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == ProposalStatus::Open
    }

    pub fn tally(&self) -> VoteTally {
        let mut tally = VoteTally::default();
        for vote in self.votes.values() {
            match vote {
                VoteType::Yes => tally.yes += 1,
                VoteType::No => tally.no += 1,
                VoteType::Abstain => tally.abstain += 1,
            }
        }
        tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::RuleId;

    fn sample_rule() -> Rule {
        let now = Utc::now();
        Rule {
            rule_id: RuleId::compute("greeting", "Say hello", now.timestamp(), "otter-a"),
            raft_id: "otter-a".to_string(),
            scope: "greeting".to_string(),
            version: 1,
            timestamp: now,
            body: "Say hello".to_string(),
            base_rule_id: None,
            signature: None,
            proposed_by: "otter-a".to_string(),
            adopted_at: None,
        }
    }

    #[test]
    fn test_vote_type_parse() {
        assert_eq!("YES".parse::<VoteType>().unwrap(), VoteType::Yes);
        assert_eq!("no".parse::<VoteType>().unwrap(), VoteType::No);
        assert_eq!("Abstain".parse::<VoteType>().unwrap(), VoteType::Abstain);
        assert!("MAYBE".parse::<VoteType>().is_err());
    }

    #[test]
    fn test_tally_counts_revotes_once() {
        let now = Utc::now();
        let rule = sample_rule();
        let id = ProposalId::compute("otter-a", "greeting", "Say hello", now.timestamp(), "otter-a");
        let mut proposal = Proposal::open(id, "otter-a", rule, now);

        proposal.votes.insert("otter-a".to_string(), VoteType::No);
        proposal.votes.insert("otter-a".to_string(), VoteType::Yes);
        proposal.votes.insert("otter-b".to_string(), VoteType::Abstain);

        let tally = proposal.tally();
        assert_eq!(tally.yes, 1);
        assert_eq!(tally.no, 0);
        assert_eq!(tally.abstain, 1);
        assert_eq!(tally.cast(), 2);
    }
}
