use chrono::{DateTime, Duration, Utc};
use otter_types::{Member, MembershipState, RaftData, Rule, RuleId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// One governance raft this node belongs to.
///
/// The member and rule maps are guarded by the raft's own lock; every
/// accessor returns owned snapshots, never references into the guarded
/// state. Adopted rules are shared `Arc`s — the rule registry's id
/// index is the authoritative owner, the raft map a back-reference.
pub struct Raft {
    raft_id: String,
    created_at: DateTime<Utc>,
    inner: RwLock<RaftInner>,
}

#[derive(Default)]
struct RaftInner {
    members: HashMap<String, Member>,
    rules: HashMap<RuleId, Arc<Rule>>,
}

/// Shared read access to a raft's members and rules, held by callers
/// that must observe a stable member set across an evaluation.
pub struct RaftReadGuard<'a> {
    raft: &'a Raft,
    guard: RwLockReadGuard<'a, RaftInner>,
}

impl RaftReadGuard<'_> {
    pub fn is_active_member(&self, member_id: &str) -> bool {
        self.guard
            .members
            .get(member_id)
            .map(|m| m.is_active())
            .unwrap_or(false)
    }

    pub fn active_member_count(&self) -> usize {
        self.guard.members.values().filter(|m| m.is_active()).count()
    }

    /// Plain snapshot of the raft, with an optional extra rule merged
    /// in (used to persist a rule in the same save as its adoption).
    pub fn snapshot_with(&self, extra_rule: Option<&Rule>) -> RaftData {
        let mut data = RaftData::new(self.raft.raft_id.clone(), self.raft.created_at);
        data.members = self.guard.members.clone();
        data.rules = self
            .guard
            .rules
            .iter()
            .map(|(id, rule)| (*id, (**rule).clone()))
            .collect();
        if let Some(rule) = extra_rule {
            data.rules.insert(rule.rule_id, rule.clone());
        }
        data
    }
}

impl Raft {
    pub fn new(raft_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            raft_id: raft_id.into(),
            created_at,
            inner: RwLock::new(RaftInner::default()),
        }
    }

    /// Rebuild a raft from its persisted snapshot.
    pub fn from_data(data: RaftData) -> Self {
        let inner = RaftInner {
            members: data.members,
            rules: data
                .rules
                .into_iter()
                .map(|(id, rule)| (id, Arc::new(rule)))
                .collect(),
        };
        Self {
            raft_id: data.raft_id,
            created_at: data.created_at,
            inner: RwLock::new(inner),
        }
    }

    pub fn raft_id(&self) -> &str {
        &self.raft_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub async fn read(&self) -> RaftReadGuard<'_> {
        RaftReadGuard {
            raft: self,
            guard: self.inner.read().await,
        }
    }

    pub async fn snapshot(&self) -> RaftData {
        self.read().await.snapshot_with(None)
    }

    pub async fn members(&self) -> Vec<Member> {
        let inner = self.inner.read().await;
        let mut members: Vec<Member> = inner.members.values().cloned().collect();
        members.sort_by(|a, b| a.member_id.cmp(&b.member_id));
        members
    }

    pub async fn get_member(&self, member_id: &str) -> Option<Member> {
        let inner = self.inner.read().await;
        inner.members.get(member_id).cloned()
    }

    pub async fn insert_member(&self, member: Member) {
        let mut inner = self.inner.write().await;
        inner.members.insert(member.member_id.clone(), member);
    }

    pub async fn insert_rule(&self, rule: Arc<Rule>) {
        let mut inner = self.inner.write().await;
        inner.rules.insert(rule.rule_id, rule);
    }

    pub async fn rules(&self) -> HashMap<RuleId, Arc<Rule>> {
        let inner = self.inner.read().await;
        inner.rules.clone()
    }

    /// Mark active members unseen since `cutoff` as expired. Returns
    /// the members that changed state.
    pub async fn expire_stale_members(&self, cutoff: DateTime<Utc>, window: Duration) -> Vec<Member> {
        let mut inner = self.inner.write().await;
        let mut expired = Vec::new();
        for member in inner.members.values_mut() {
            if member.state == MembershipState::Active && member.last_seen_at < cutoff {
                member.state = MembershipState::Expired;
                member.expires_at = Some(member.last_seen_at + window);
                expired.push(member.clone());
            }
        }
        expired
    }
}

/// Index of every raft this node is a member of.
///
/// Rafts are kept sorted by id: iteration order is deterministic and
/// doubles as the cross-raft lock acquisition order.
pub struct RaftRegistry {
    rafts: RwLock<BTreeMap<String, Arc<Raft>>>,
}

impl RaftRegistry {
    pub fn new() -> Self {
        Self {
            rafts: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn insert(&self, raft: Arc<Raft>) {
        let mut rafts = self.rafts.write().await;
        rafts.insert(raft.raft_id().to_string(), raft);
    }

    pub async fn get(&self, raft_id: &str) -> Option<Arc<Raft>> {
        let rafts = self.rafts.read().await;
        rafts.get(raft_id).cloned()
    }

    pub async fn contains(&self, raft_id: &str) -> bool {
        let rafts = self.rafts.read().await;
        rafts.contains_key(raft_id)
    }

    pub async fn remove(&self, raft_id: &str) -> Option<Arc<Raft>> {
        let mut rafts = self.rafts.write().await;
        rafts.remove(raft_id)
    }

    /// All rafts in ascending raft id order.
    pub async fn list(&self) -> Vec<Arc<Raft>> {
        let rafts = self.rafts.read().await;
        rafts.values().cloned().collect()
    }

    /// Exclusive access for the liveness sweep.
    pub(crate) async fn lock_exclusive(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<Raft>>> {
        self.rafts.write().await
    }
}

impl Default for RaftRegistry {
    fn default() -> Self {
        Self::new()
    }
}
