use crate::registry::RaftRegistry;
use chrono::Utc;
use otter_types::{ConflictId, Rule, RuleConflict, RuleId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Pairwise comparison of a candidate rule set against the rule sets
/// of every raft this node already belongs to.
///
/// Two rules conflict when they share a scope but differ in body.
/// Output order is deterministic: rafts ascending by id, rule pairs
/// ascending by (existing, candidate) rule id.
pub struct ConflictDetector {
    rafts: Arc<RaftRegistry>,
}

impl ConflictDetector {
    pub fn new(rafts: Arc<RaftRegistry>) -> Self {
        Self { rafts }
    }

    pub async fn detect(
        &self,
        target_raft_id: &str,
        candidate_rules: &HashMap<RuleId, Rule>,
    ) -> Vec<RuleConflict> {
        let mut candidates: Vec<&Rule> = candidate_rules.values().collect();
        candidates.sort_by_key(|r| r.rule_id);

        let mut conflicts = Vec::new();
        let detected_at = Utc::now();

        for raft in self.rafts.list().await {
            if raft.raft_id() == target_raft_id {
                continue;
            }

            let mut existing: Vec<Arc<Rule>> = raft.rules().await.into_values().collect();
            existing.sort_by_key(|r| r.rule_id);

            for held in &existing {
                for candidate in &candidates {
                    if held.scope == candidate.scope && held.body != candidate.body {
                        conflicts.push(RuleConflict {
                            conflict_id: ConflictId::compute(&held.rule_id, &candidate.rule_id),
                            raft1_id: raft.raft_id().to_string(),
                            raft2_id: target_raft_id.to_string(),
                            rule1: (**held).clone(),
                            rule2: (*candidate).clone(),
                            conflict_scope: held.scope.clone(),
                            detected_at,
                        });
                    }
                }
            }
        }

        debug!(
            target_raft_id = %target_raft_id,
            candidate_rules = candidate_rules.len(),
            conflicts = conflicts.len(),
            "Conflict detection completed"
        );

        conflicts
    }
}
