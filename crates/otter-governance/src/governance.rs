use crate::config::GovernanceConfig;
use crate::error::{GovernanceError, Result};
use crate::join::{JoinCoordinator, JoinOutcome, RemoteRuleFetcher, UnconfiguredFetcher};
use crate::liveness::{self, LivenessMonitor};
use crate::negotiation::Mediator;
use crate::proposals::{NegotiationRegistry, ProposalRegistry};
use crate::registry::{Raft, RaftRegistry};
use crate::rules::RuleRegistry;
use crate::voting::VotingEngine;
use chrono::{Duration as ChronoDuration, Utc};
use otter_crypto::KeyStore;
use otter_storage::PersistenceStore;
use otter_types::{
    Member, Negotiation, NegotiationId, Proposal, ProposalId, PublicKey, Rule, RuleDraft, RuleId,
    VoteType,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Single entry point for all governance operations on one node.
///
/// Owns the raft, rule, proposal and negotiation registries, the
/// node's keystore and the persistence store. External collaborators
/// (HTTP adapter, intent extractor, plugin adapters) only ever talk to
/// this facade; free text never reaches the core.
pub struct Governance {
    config: GovernanceConfig,
    keystore: KeyStore,
    store: PersistenceStore,
    rafts: Arc<RaftRegistry>,
    rules: Arc<RuleRegistry>,
    proposals: Arc<ProposalRegistry>,
    negotiations: Arc<NegotiationRegistry>,
    voting: Arc<VotingEngine>,
    joiner: JoinCoordinator,
    expiry_window: ChronoDuration,
    shutdown: watch::Sender<bool>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl Governance {
    /// Construct a node with no remote transport wired in; `join_raft`
    /// will fail at the fetch step until a fetcher is provided.
    pub async fn new(config: GovernanceConfig, store: PersistenceStore) -> Result<Self> {
        Self::with_fetcher(config, store, Arc::new(UnconfiguredFetcher)).await
    }

    /// Construct a node: load or generate the identity key (a malformed
    /// key file is fatal), bootstrap the solo raft, recover persisted
    /// state, and start the liveness monitor.
    pub async fn with_fetcher(
        config: GovernanceConfig,
        store: PersistenceStore,
        fetcher: Arc<dyn RemoteRuleFetcher>,
    ) -> Result<Self> {
        let keystore = KeyStore::load_or_generate(&config.data_dir)?;

        let rafts = Arc::new(RaftRegistry::new());
        let rules = Arc::new(RuleRegistry::new());
        let proposals = Arc::new(ProposalRegistry::new());
        let negotiations = Arc::new(NegotiationRegistry::new());

        let voting = Arc::new(VotingEngine::new(
            rafts.clone(),
            rules.clone(),
            proposals.clone(),
            store.clone(),
        ));
        let joiner = JoinCoordinator::new(
            config.node_id.clone(),
            rafts.clone(),
            negotiations.clone(),
            voting.clone(),
            store.clone(),
            fetcher,
        );

        bootstrap_solo_raft(&config.node_id, keystore.public_key(), &rafts, &store).await;
        load_persisted_state(&config.node_id, &rafts, &voting, &store).await;

        let expiry_window = ChronoDuration::from_std(config.expiry_window)
            .unwrap_or_else(|_| ChronoDuration::days(90));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let monitor = LivenessMonitor::new(
            rafts.clone(),
            store.clone(),
            expiry_window,
            config.liveness_tick,
            shutdown_rx,
        );
        let monitor_handle = tokio::spawn(monitor.run());

        info!(
            node_id = %config.node_id,
            public_key = %keystore.public_key(),
            "Governance node ready"
        );

        Ok(Self {
            config,
            keystore,
            store,
            rafts,
            rules,
            proposals,
            negotiations,
            voting,
            joiner,
            expiry_window,
            shutdown,
            monitor: Mutex::new(Some(monitor_handle)),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    pub fn public_key(&self) -> PublicKey {
        self.keystore.public_key()
    }

    /// Snapshot of globally active rules, one per scope. Where a scope
    /// is active in several rafts, the latest adoption wins.
    pub async fn list_active_rules(&self) -> HashMap<String, Rule> {
        self.rules.global_active().await
    }

    pub async fn list_open_proposals(&self) -> Vec<Proposal> {
        self.proposals.open_proposals().await
    }

    pub async fn list_all_proposals(&self) -> Vec<Proposal> {
        self.proposals.all().await
    }

    pub async fn get_proposal(&self, proposal_id: &ProposalId) -> Option<Proposal> {
        self.proposals.get(proposal_id).await
    }

    pub async fn get_negotiation(&self, negotiation_id: &NegotiationId) -> Option<Negotiation> {
        self.negotiations.get(negotiation_id).await
    }

    /// Submit a rule proposal. With no raft given, the node's solo raft
    /// is the target. The rule is stamped, content-addressed and signed
    /// with the node key here; an override inherits its base rule's
    /// version lineage.
    pub async fn propose_rule(
        &self,
        raft_id: Option<&str>,
        draft: RuleDraft,
    ) -> Result<Proposal> {
        let target = raft_id.unwrap_or(&self.config.node_id);
        let now = Utc::now();

        let version = match draft.base_rule_id {
            Some(base_id) => self
                .rules
                .get(&base_id)
                .await
                .map(|base| base.version + 1)
                .unwrap_or(1),
            None => 1,
        };

        let rule = Rule {
            rule_id: RuleId::compute(
                &draft.scope,
                &draft.body,
                now.timestamp_micros(),
                &draft.proposed_by,
            ),
            raft_id: String::new(),
            scope: draft.scope,
            version,
            timestamp: now,
            body: draft.body,
            base_rule_id: draft.base_rule_id,
            signature: None,
            proposed_by: draft.proposed_by,
            adopted_at: None,
        };
        let rule = Rule {
            signature: Some(self.keystore.sign(rule.body.as_bytes())),
            ..rule
        };

        self.voting.propose_rule(target, rule).await
    }

    /// Cast a vote on an open proposal. The voter must be an active
    /// member of the proposal's raft; a re-vote overwrites.
    pub async fn vote(
        &self,
        proposal_id: &ProposalId,
        voter_id: &str,
        vote: VoteType,
    ) -> Result<()> {
        self.voting.vote(proposal_id, voter_id, vote).await
    }

    /// Members of a raft this node is in; the solo raft when no id is
    /// given.
    pub async fn list_raft_members(&self, raft_id: Option<&str>) -> Result<Vec<Member>> {
        let target = raft_id.unwrap_or(&self.config.node_id);
        let raft = self
            .rafts
            .get(target)
            .await
            .ok_or_else(|| GovernanceError::RaftNotFound(target.to_string()))?;
        Ok(raft.members().await)
    }

    /// Accept another otter into a raft this node belongs to.
    pub async fn request_join(
        &self,
        target_raft_id: &str,
        requester_id: &str,
        public_key: PublicKey,
    ) -> Result<()> {
        self.joiner
            .request_join(target_raft_id, requester_id, public_key)
            .await
    }

    /// Join this node to another node's raft, negotiating rule
    /// conflicts through the mediator under the given deadline.
    pub async fn join_raft(
        &self,
        target_raft_id: &str,
        remote_endpoint: &str,
        mediator: &dyn Mediator,
        negotiation_deadline: Duration,
    ) -> Result<JoinOutcome> {
        self.joiner
            .join_raft(target_raft_id, remote_endpoint, mediator, negotiation_deadline)
            .await
    }

    /// Run one liveness sweep immediately, outside the periodic tick.
    /// Returns the number of members expired.
    pub async fn sweep_liveness(&self) -> usize {
        liveness::sweep(&self.rafts, &self.store, self.expiry_window).await
    }

    /// Stop the liveness monitor and wait for it to exit.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let handle = self.monitor.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!(node_id = %self.config.node_id, "Governance node stopped");
    }
}

/// Create this node's initial solo raft with its bootstrap member. A
/// persistence failure here is first-run noise, not fatal.
async fn bootstrap_solo_raft(
    node_id: &str,
    public_key: PublicKey,
    rafts: &RaftRegistry,
    store: &PersistenceStore,
) {
    let now = Utc::now();
    let raft = Raft::new(node_id, now);
    raft.insert_member(Member::bootstrap(node_id, public_key, now))
        .await;

    let snapshot = raft.snapshot().await;
    if let Err(err) = store.save_raft(&snapshot).await {
        warn!(node_id = %node_id, error = %err, "Failed to persist initial solo raft");
    }

    rafts.insert(Arc::new(raft)).await;
}

/// Restore persisted rafts into the registry, skipping the solo raft
/// (just bootstrapped) so its in-memory member map is not clobbered.
/// Adopted rules are re-indexed as active.
async fn load_persisted_state(
    node_id: &str,
    rafts: &RaftRegistry,
    voting: &VotingEngine,
    store: &PersistenceStore,
) {
    let persisted = match store.load_all().await {
        Ok(persisted) => persisted,
        Err(err) => {
            warn!(error = %err, "Could not load persisted governance state (may be first run)");
            return;
        }
    };

    for data in persisted {
        if data.raft_id == node_id {
            continue;
        }

        let raft = Arc::new(Raft::from_data(data));
        for rule in raft.rules().await.into_values() {
            if rule.is_adopted() {
                voting.index_adopted(rule).await;
            }
        }

        info!(raft_id = %raft.raft_id(), "Restored raft from persistence");
        rafts.insert(raft).await;
    }
}
