use crate::conflict::ConflictDetector;
use crate::error::{GovernanceError, Result};
use crate::negotiation::{Mediator, Negotiator};
use crate::proposals::NegotiationRegistry;
use crate::registry::{Raft, RaftRegistry};
use crate::voting::VotingEngine;
use async_trait::async_trait;
use chrono::Utc;
use otter_storage::PersistenceStore;
use otter_types::{
    Member, Negotiation, NegotiationId, ProposalId, PublicKey, RaftData, Rule, RuleId,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Capability for retrieving another node's raft rules over the wire.
/// The governance core stays transport-agnostic; the HTTP adapter
/// provides the real implementation.
#[async_trait]
pub trait RemoteRuleFetcher: Send + Sync {
    async fn fetch(&self, endpoint: &str, raft_id: &str) -> Result<HashMap<RuleId, Rule>>;
}

/// Fetcher used when no transport is wired in; every join attempt
/// surfaces a remote-fetch error.
pub struct UnconfiguredFetcher;

#[async_trait]
impl RemoteRuleFetcher for UnconfiguredFetcher {
    async fn fetch(&self, endpoint: &str, _raft_id: &str) -> Result<HashMap<RuleId, Rule>> {
        Err(GovernanceError::RemoteFetch(format!(
            "no remote rule fetcher configured (endpoint {})",
            endpoint
        )))
    }
}

/// How a join attempt concluded.
#[derive(Debug, Clone)]
pub enum JoinOutcome {
    /// No rule conflicts: the target raft's rules were adopted locally
    /// and a raft entry created. Membership follows once the target
    /// node accepts the corresponding join request.
    Adopted { raft_id: String },
    /// Conflicts were mediated into a compromise rule, now up for
    /// independent votes in both rafts. The node is not peered until
    /// both proposals adopt; either rejection is observable on the
    /// proposal records.
    DualVote {
        negotiation_id: NegotiationId,
        raft1_proposal: ProposalId,
        raft2_proposal: ProposalId,
    },
}

/// Orchestrates joining another node's raft: fetch remote rules,
/// detect conflicts, adopt or negotiate, and run the dual-raft vote.
pub struct JoinCoordinator {
    node_id: String,
    rafts: Arc<RaftRegistry>,
    negotiations: Arc<NegotiationRegistry>,
    detector: ConflictDetector,
    negotiator: Negotiator,
    voting: Arc<VotingEngine>,
    store: PersistenceStore,
    fetcher: Arc<dyn RemoteRuleFetcher>,
}

impl JoinCoordinator {
    pub fn new(
        node_id: impl Into<String>,
        rafts: Arc<RaftRegistry>,
        negotiations: Arc<NegotiationRegistry>,
        voting: Arc<VotingEngine>,
        store: PersistenceStore,
        fetcher: Arc<dyn RemoteRuleFetcher>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            rafts: rafts.clone(),
            negotiations: negotiations.clone(),
            detector: ConflictDetector::new(rafts),
            negotiator: Negotiator::new(negotiations),
            voting,
            store,
            fetcher,
        }
    }

    /// Join this node to another node's raft.
    ///
    /// Fetches the target raft's rules, detects conflicts against every
    /// raft this node is already in, and either adopts the rules
    /// outright or mediates a compromise and proposes it to both rafts.
    pub async fn join_raft(
        &self,
        target_raft_id: &str,
        remote_endpoint: &str,
        mediator: &dyn Mediator,
        negotiation_deadline: Duration,
    ) -> Result<JoinOutcome> {
        let fetched = self.fetcher.fetch(remote_endpoint, target_raft_id).await?;
        info!(
            target_raft_id = %target_raft_id,
            endpoint = %remote_endpoint,
            rules = fetched.len(),
            "Fetched remote raft rules"
        );

        let conflicts = self.detector.detect(target_raft_id, &fetched).await;

        if conflicts.is_empty() {
            self.adopt_rules_and_join(target_raft_id, fetched).await?;
            return Ok(JoinOutcome::Adopted {
                raft_id: target_raft_id.to_string(),
            });
        }

        info!(
            target_raft_id = %target_raft_id,
            conflicts = conflicts.len(),
            "Rule conflicts detected, starting negotiation"
        );

        let raft1_id = conflicts[0].raft1_id.clone();
        let negotiation = Negotiation::start(&raft1_id, target_raft_id, conflicts, Utc::now());
        let negotiation_id = negotiation.negotiation_id;
        self.negotiations.insert(negotiation).await;

        // Optimistic local entry for the target raft so the compromise
        // can be proposed into it. Rolled back if mediation fails; its
        // conflicting rules are not indexed as active until adopted.
        self.create_raft_entry(target_raft_id, fetched, false).await?;

        let compromise = match self
            .negotiator
            .resolve(&negotiation_id, mediator, negotiation_deadline)
            .await
        {
            Ok(rule) => rule,
            Err(err) => {
                self.rollback_raft_entry(target_raft_id).await;
                return Err(err);
            }
        };

        let (raft1_proposal, raft2_proposal) = self
            .execute_dual_raft_vote(&negotiation_id, &raft1_id, target_raft_id, compromise)
            .await?;

        Ok(JoinOutcome::DualVote {
            negotiation_id,
            raft1_proposal,
            raft2_proposal,
        })
    }

    /// Accept another otter into a raft this node belongs to. This is
    /// also the only path that reactivates an expired member.
    pub async fn request_join(
        &self,
        target_raft_id: &str,
        requester_id: &str,
        public_key: PublicKey,
    ) -> Result<()> {
        let raft = self
            .rafts
            .get(target_raft_id)
            .await
            .ok_or_else(|| GovernanceError::RaftNotFound(target_raft_id.to_string()))?;

        if let Some(existing) = raft.get_member(requester_id).await {
            if existing.state.is_terminal() {
                return Err(GovernanceError::MemberTerminal {
                    raft_id: target_raft_id.to_string(),
                    member_id: requester_id.to_string(),
                });
            }
        }

        let member = Member::inducted(requester_id, public_key, self.node_id.clone(), Utc::now());

        // Persist first, then admit in memory.
        let mut snapshot = raft.snapshot().await;
        snapshot
            .members
            .insert(member.member_id.clone(), member.clone());
        self.store.save_raft(&snapshot).await?;

        raft.insert_member(member).await;
        info!(
            raft_id = %target_raft_id,
            member_id = %requester_id,
            inducted_by = %self.node_id,
            "Member inducted into raft"
        );
        Ok(())
    }

    /// Conflict-free join: record the target raft locally with its
    /// fetched rules. Membership is empty until the remote side accepts
    /// the corresponding join request.
    async fn adopt_rules_and_join(
        &self,
        target_raft_id: &str,
        rules: HashMap<RuleId, Rule>,
    ) -> Result<()> {
        self.create_raft_entry(target_raft_id, rules, true).await?;
        info!(raft_id = %target_raft_id, "Adopted remote rules and joined raft");
        Ok(())
    }

    async fn create_raft_entry(
        &self,
        raft_id: &str,
        rules: HashMap<RuleId, Rule>,
        index_active: bool,
    ) -> Result<()> {
        let mut data = RaftData::new(raft_id, Utc::now());
        for (rule_id, mut rule) in rules {
            rule.raft_id = raft_id.to_string();
            data.rules.insert(rule_id, rule);
        }

        self.store.save_raft(&data).await?;

        let raft = Arc::new(Raft::from_data(data));
        if index_active {
            for rule in raft.rules().await.into_values() {
                if rule.is_adopted() {
                    self.voting.index_adopted(rule).await;
                }
            }
        }
        self.rafts.insert(raft).await;
        Ok(())
    }

    async fn rollback_raft_entry(&self, raft_id: &str) {
        self.rafts.remove(raft_id).await;
        if let Err(err) = self.store.delete_raft(raft_id).await {
            warn!(raft_id = %raft_id, error = %err, "Failed to roll back optimistic raft entry");
        }
    }

    /// Propose the negotiated compromise independently in both rafts
    /// and record the proposal handles on the negotiation. Votes then
    /// run their normal course in each raft.
    async fn execute_dual_raft_vote(
        &self,
        negotiation_id: &NegotiationId,
        raft1_id: &str,
        raft2_id: &str,
        compromise: Rule,
    ) -> Result<(ProposalId, ProposalId)> {
        let proposal1 = self
            .voting
            .propose_negotiated(raft1_id, compromise.clone())
            .await?;
        let proposal2 = self.voting.propose_negotiated(raft2_id, compromise).await?;

        self.negotiations
            .update(negotiation_id, |n| {
                n.raft1_proposal = Some(proposal1.proposal_id);
                n.raft2_proposal = Some(proposal2.proposal_id);
            })
            .await;

        info!(
            negotiation_id = %negotiation_id,
            raft1_id = %raft1_id,
            raft2_id = %raft2_id,
            raft1_proposal = %proposal1.proposal_id,
            raft2_proposal = %proposal2.proposal_id,
            "Compromise proposed to both rafts"
        );

        Ok((proposal1.proposal_id, proposal2.proposal_id))
    }
}
