use crate::id::{ConflictId, RuleId};
use crate::keys::Signature;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An atomic governance unit: one policy statement within one scope.
///
/// A rule is *active* when `adopted_at` is set and it is the latest
/// adopted rule for its `(raft_id, scope)`; adopting a new rule in a
/// scope implicitly supersedes the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: RuleId,
    /// Raft this rule belongs to. Set when the rule is proposed into a
    /// raft; empty on freshly negotiated compromise rules.
    pub raft_id: String,
    /// Policy domain, e.g. `"data_retention"`.
    pub scope: String,
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub body: String,
    /// Rule this one overrides. A set `base_rule_id` marks the proposal
    /// as an override vote requiring a super-majority.
    pub base_rule_id: Option<RuleId>,
    pub signature: Option<Signature>,
    pub proposed_by: String,
    pub adopted_at: Option<DateTime<Utc>>,
}

impl Rule {
    pub fn is_adopted(&self) -> bool {
        self.adopted_at.is_some()
    }

    pub fn is_override(&self) -> bool {
        self.base_rule_id.is_some()
    }
}

/// Caller-supplied fields of a rule being proposed. The engine fills in
/// raft id, version, timestamp, content-addressed id and signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDraft {
    pub scope: String,
    pub body: String,
    pub proposed_by: String,
    #[serde(default)]
    pub base_rule_id: Option<RuleId>,
}

impl RuleDraft {
    pub fn new(
        scope: impl Into<String>,
        body: impl Into<String>,
        proposed_by: impl Into<String>,
    ) -> Self {
        Self {
            scope: scope.into(),
            body: body.into(),
            proposed_by: proposed_by.into(),
            base_rule_id: None,
        }
    }

    pub fn overriding(mut self, base_rule_id: RuleId) -> Self {
        self.base_rule_id = Some(base_rule_id);
        self
    }
}

/// Two rules with the same scope but different bodies, held by two
/// rafts this node is simultaneously in. Ephemeral: conflicts are
/// re-detected from current rule sets, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConflict {
    pub conflict_id: ConflictId,
    pub raft1_id: String,
    pub raft2_id: String,
    pub rule1: Rule,
    pub rule2: Rule,
    pub conflict_scope: String,
    pub detected_at: DateTime<Utc>,
}
