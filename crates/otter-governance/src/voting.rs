use crate::error::{GovernanceError, Result};
use crate::proposals::ProposalRegistry;
use crate::registry::{Raft, RaftRegistry};
use crate::rules::RuleRegistry;
use chrono::Utc;
use otter_storage::PersistenceStore;
use otter_types::{
    Proposal, ProposalId, ProposalResult, ProposalStatus, Rule, VoteTally, VoteType,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Size-dependent quorum and majority arithmetic plus the proposal
/// state machine.
///
/// Outcomes are re-evaluated after every vote. Three regimes by the
/// number `N` of active members:
///
/// - `N = 1`: any vote closes; adopted iff it is a YES.
/// - `N = 2`: unanimous consent — both must vote, any NO or ABSTAIN
///   rejects.
/// - `N ≥ 3`: quorum is ⌈2N/3⌉ cast votes; adoption needs ⌈2N/3⌉ YES,
///   or ⌈3N/4⌉ YES for an override (a rule carrying `base_rule_id`);
///   the proposal closes once adopted or once all N have voted.
pub struct VotingEngine {
    rafts: Arc<RaftRegistry>,
    rules: Arc<RuleRegistry>,
    proposals: Arc<ProposalRegistry>,
    store: PersistenceStore,
}

/// Result of evaluating a proposal after a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Outcome {
    pub quorum_met: bool,
    /// `Some(true)` close adopted, `Some(false)` close rejected,
    /// `None` keep the proposal open.
    pub decision: Option<bool>,
}

/// ⌈2n/3⌉ in integer arithmetic.
fn two_thirds_ceil(n: usize) -> usize {
    (2 * n + 2) / 3
}

/// ⌈3n/4⌉ in integer arithmetic.
fn three_quarters_ceil(n: usize) -> usize {
    (3 * n + 3) / 4
}

fn tally_votes(votes: &HashMap<String, VoteType>) -> VoteTally {
    let mut tally = VoteTally::default();
    for vote in votes.values() {
        match vote {
            VoteType::Yes => tally.yes += 1,
            VoteType::No => tally.no += 1,
            VoteType::Abstain => tally.abstain += 1,
        }
    }
    tally
}

pub(crate) fn evaluate_outcome(n_active: usize, tally: &VoteTally, is_override: bool) -> Outcome {
    let cast = tally.cast();

    match n_active {
        // No active members: nothing can be decided.
        0 => Outcome {
            quorum_met: false,
            decision: None,
        },

        // Solo otter: the single vote decides immediately.
        1 => {
            let quorum_met = cast >= 1;
            Outcome {
                quorum_met,
                decision: quorum_met.then_some(tally.yes >= 1),
            }
        }

        // Two otters: unanimous consent.
        2 => {
            let quorum_met = cast >= 2;
            Outcome {
                quorum_met,
                decision: quorum_met.then_some(tally.yes == 2 && tally.no == 0),
            }
        }

        n => {
            let quorum = two_thirds_ceil(n);
            if cast < quorum {
                return Outcome {
                    quorum_met: false,
                    decision: None,
                };
            }

            let required = if is_override {
                three_quarters_ceil(n)
            } else {
                two_thirds_ceil(n)
            };
            let adopted = tally.yes >= required;

            let decision = if adopted {
                Some(true)
            } else if cast >= n {
                Some(false)
            } else {
                // Quorum met but undecided: wait for more votes.
                None
            };

            Outcome {
                quorum_met: true,
                decision,
            }
        }
    }
}

impl VotingEngine {
    pub fn new(
        rafts: Arc<RaftRegistry>,
        rules: Arc<RuleRegistry>,
        proposals: Arc<ProposalRegistry>,
        store: PersistenceStore,
    ) -> Self {
        Self {
            rafts,
            rules,
            proposals,
            store,
        }
    }

    /// Submit a rule proposal to a raft. The proposer must be an active
    /// member of that raft.
    pub async fn propose_rule(&self, raft_id: &str, rule: Rule) -> Result<Proposal> {
        self.propose(raft_id, rule, true).await
    }

    /// Submit a mediated compromise rule. Compromise rules originate
    /// from a negotiation rather than from a member, so the
    /// active-member precondition does not apply; the target raft must
    /// still exist locally.
    pub async fn propose_negotiated(&self, raft_id: &str, rule: Rule) -> Result<Proposal> {
        self.propose(raft_id, rule, false).await
    }

    async fn propose(&self, raft_id: &str, mut rule: Rule, require_member: bool) -> Result<Proposal> {
        let raft = self
            .rafts
            .get(raft_id)
            .await
            .ok_or_else(|| GovernanceError::RaftNotFound(raft_id.to_string()))?;

        if require_member {
            let guard = raft.read().await;
            if !guard.is_active_member(&rule.proposed_by) {
                return Err(GovernanceError::MemberNotActive {
                    raft_id: raft_id.to_string(),
                    member_id: rule.proposed_by.clone(),
                });
            }
        }

        // An override must target a rule in its own scope; replacing a
        // rule of a different scope is undefined.
        if let Some(base_id) = rule.base_rule_id {
            if let Some(base) = self.rules.get(&base_id).await {
                if base.scope != rule.scope {
                    return Err(GovernanceError::InvalidProposal(format!(
                        "base rule {} has scope {:?}, proposal has scope {:?}",
                        base_id, base.scope, rule.scope
                    )));
                }
            }
        }

        rule.raft_id = raft_id.to_string();

        let proposal_id = ProposalId::compute(
            raft_id,
            &rule.scope,
            &rule.body,
            rule.timestamp.timestamp_micros(),
            &rule.proposed_by,
        );
        let proposal = Proposal::open(proposal_id, raft_id, rule, Utc::now());

        info!(
            proposal_id = %proposal.proposal_id,
            raft_id = %raft_id,
            scope = %proposal.rule.scope,
            proposed_by = %proposal.proposed_by,
            "Rule proposed"
        );

        self.proposals.insert(proposal.clone()).await;
        Ok(proposal)
    }

    /// Cast a vote and re-evaluate the proposal. A re-vote by the same
    /// voter overwrites the prior entry.
    ///
    /// The record / evaluate / activate / persist sequence runs under
    /// the proposal registry's write lock and the target raft's lock;
    /// on a persistence failure nothing is committed in memory.
    pub async fn vote(&self, proposal_id: &ProposalId, voter_id: &str, vote: VoteType) -> Result<()> {
        let mut proposals = self.proposals.lock_exclusive().await;

        let proposal = proposals
            .get_mut(proposal_id)
            .ok_or_else(|| GovernanceError::ProposalNotFound(proposal_id.to_string()))?;

        if !proposal.is_open() {
            return Err(GovernanceError::ProposalClosed(proposal_id.to_string()));
        }

        let raft = self
            .rafts
            .get(&proposal.raft_id)
            .await
            .ok_or_else(|| GovernanceError::RaftNotFound(proposal.raft_id.clone()))?;

        let guard = raft.read().await;
        if !guard.is_active_member(voter_id) {
            return Err(GovernanceError::MemberNotActive {
                raft_id: proposal.raft_id.clone(),
                member_id: voter_id.to_string(),
            });
        }

        // Evaluate against a tentative tally; the vote is only
        // committed once any persistence has succeeded.
        let mut votes = proposal.votes.clone();
        votes.insert(voter_id.to_string(), vote);
        let tally = tally_votes(&votes);
        let n_active = guard.active_member_count();
        let outcome = evaluate_outcome(n_active, &tally, proposal.rule.is_override());

        debug!(
            proposal_id = %proposal_id,
            voter = %voter_id,
            vote = %vote,
            yes = tally.yes,
            no = tally.no,
            abstain = tally.abstain,
            active_members = n_active,
            quorum_met = outcome.quorum_met,
            "Vote recorded"
        );

        match outcome.decision {
            Some(true) => {
                let now = Utc::now();
                let mut adopted = proposal.rule.clone();
                adopted.adopted_at = Some(now);
                let adopted = Arc::new(adopted);

                // Persist before mutating: a crash must never leave a
                // rule active in memory but absent from disk.
                self.store.save_rule(&adopted).await?;
                self.store
                    .save_raft(&guard.snapshot_with(Some(&adopted)))
                    .await?;
                drop(guard);

                proposal.votes = votes;
                proposal.quorum_met = outcome.quorum_met;
                proposal.status = ProposalStatus::Closed;
                proposal.result = ProposalResult::Adopted;
                proposal.closed_at = Some(now);
                proposal.rule = (*adopted).clone();

                info!(
                    proposal_id = %proposal_id,
                    rule_id = %adopted.rule_id,
                    scope = %adopted.scope,
                    yes = tally.yes,
                    no = tally.no,
                    "Proposal adopted"
                );

                self.activate_rule(&raft, adopted).await;
            }
            Some(false) => {
                proposal.votes = votes;
                proposal.quorum_met = outcome.quorum_met;
                proposal.status = ProposalStatus::Closed;
                proposal.result = ProposalResult::Rejected;
                proposal.closed_at = Some(Utc::now());

                info!(
                    proposal_id = %proposal_id,
                    yes = tally.yes,
                    no = tally.no,
                    abstain = tally.abstain,
                    "Proposal rejected"
                );
            }
            None => {
                proposal.votes = votes;
                proposal.quorum_met = outcome.quorum_met;
            }
        }

        Ok(())
    }

    /// Index a rule that was adopted elsewhere (state recovery, or a
    /// conflict-free remote adoption) without running a vote.
    pub async fn index_adopted(&self, rule: Arc<Rule>) {
        self.rules.activate(rule).await;
    }

    /// Install an adopted rule: rule registry id and active indices,
    /// the raft's rule map, and deactivation of an overridden base rule
    /// still active in its scope.
    async fn activate_rule(&self, raft: &Raft, rule: Arc<Rule>) {
        self.rules.activate(rule.clone()).await;
        raft.insert_rule(rule.clone()).await;

        if let Some(base_id) = rule.base_rule_id {
            if let Some(base) = self.rules.get(&base_id).await {
                self.rules
                    .deactivate(&base.raft_id, &base.scope, &base_id)
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(yes: usize, no: usize, abstain: usize) -> VoteTally {
        VoteTally { yes, no, abstain }
    }

    #[test]
    fn test_ceiling_arithmetic() {
        assert_eq!(two_thirds_ceil(3), 2);
        assert_eq!(two_thirds_ceil(4), 3);
        assert_eq!(two_thirds_ceil(5), 4);
        assert_eq!(two_thirds_ceil(6), 4);

        assert_eq!(three_quarters_ceil(3), 3);
        assert_eq!(three_quarters_ceil(4), 3);
        assert_eq!(three_quarters_ceil(5), 4);
        assert_eq!(three_quarters_ceil(8), 6);
    }

    #[test]
    fn test_solo_raft() {
        assert_eq!(
            evaluate_outcome(1, &tally(1, 0, 0), false),
            Outcome { quorum_met: true, decision: Some(true) }
        );
        assert_eq!(
            evaluate_outcome(1, &tally(0, 1, 0), false),
            Outcome { quorum_met: true, decision: Some(false) }
        );
        // A lone abstention closes as rejected: yes < 1.
        assert_eq!(
            evaluate_outcome(1, &tally(0, 0, 1), false),
            Outcome { quorum_met: true, decision: Some(false) }
        );
        assert_eq!(
            evaluate_outcome(1, &tally(0, 0, 0), false),
            Outcome { quorum_met: false, decision: None }
        );
    }

    #[test]
    fn test_two_member_unanimity() {
        // One vote in: waiting for the second.
        assert_eq!(
            evaluate_outcome(2, &tally(1, 0, 0), false),
            Outcome { quorum_met: false, decision: None }
        );
        assert_eq!(
            evaluate_outcome(2, &tally(2, 0, 0), false),
            Outcome { quorum_met: true, decision: Some(true) }
        );
        // Any NO or ABSTAIN rejects.
        assert_eq!(
            evaluate_outcome(2, &tally(1, 1, 0), false),
            Outcome { quorum_met: true, decision: Some(false) }
        );
        assert_eq!(
            evaluate_outcome(2, &tally(1, 0, 1), false),
            Outcome { quorum_met: true, decision: Some(false) }
        );
        assert_eq!(
            evaluate_outcome(2, &tally(0, 2, 0), false),
            Outcome { quorum_met: true, decision: Some(false) }
        );
    }

    #[test]
    fn test_three_member_majority() {
        // One vote: below the quorum of 2.
        assert_eq!(
            evaluate_outcome(3, &tally(1, 0, 0), false),
            Outcome { quorum_met: false, decision: None }
        );
        // Two YES reach ⌈6/3⌉ = 2.
        assert_eq!(
            evaluate_outcome(3, &tally(2, 0, 0), false),
            Outcome { quorum_met: true, decision: Some(true) }
        );
        // YES + NO: quorum met, undecided, wait for the third.
        assert_eq!(
            evaluate_outcome(3, &tally(1, 1, 0), false),
            Outcome { quorum_met: true, decision: None }
        );
        // All voted, majority against.
        assert_eq!(
            evaluate_outcome(3, &tally(1, 2, 0), false),
            Outcome { quorum_met: true, decision: Some(false) }
        );
    }

    #[test]
    fn test_four_member_thresholds() {
        // Quorum is ⌈8/3⌉ = 3; standard and override thresholds both 3.
        assert_eq!(
            evaluate_outcome(4, &tally(2, 0, 0), false),
            Outcome { quorum_met: false, decision: None }
        );
        assert_eq!(
            evaluate_outcome(4, &tally(3, 0, 0), false),
            Outcome { quorum_met: true, decision: Some(true) }
        );
        assert_eq!(
            evaluate_outcome(4, &tally(3, 0, 0), true),
            Outcome { quorum_met: true, decision: Some(true) }
        );
        // Quorum met via abstentions, adoption still short.
        assert_eq!(
            evaluate_outcome(4, &tally(2, 0, 1), false),
            Outcome { quorum_met: true, decision: None }
        );
    }

    #[test]
    fn test_five_member_override_supermajority() {
        // Override needs ⌈15/4⌉ = 4 YES.
        assert_eq!(
            evaluate_outcome(5, &tally(3, 1, 0), true),
            Outcome { quorum_met: true, decision: None }
        );
        assert_eq!(
            evaluate_outcome(5, &tally(3, 2, 0), true),
            Outcome { quorum_met: true, decision: Some(false) }
        );
        assert_eq!(
            evaluate_outcome(5, &tally(4, 1, 0), true),
            Outcome { quorum_met: true, decision: Some(true) }
        );
        // The same four YES adopt a standard rule as well.
        assert_eq!(
            evaluate_outcome(5, &tally(4, 0, 0), false),
            Outcome { quorum_met: true, decision: Some(true) }
        );
    }

    #[test]
    fn test_all_abstain_closes_rejected() {
        assert_eq!(
            evaluate_outcome(3, &tally(0, 0, 3), false),
            Outcome { quorum_met: true, decision: Some(false) }
        );
    }
}
