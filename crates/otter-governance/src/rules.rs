use otter_types::{Rule, RuleId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Global view of adopted rules across every raft this node is in.
///
/// The `rules` map (by rule id) is the authoritative owner of adopted
/// rules; the active index per `(raft_id, scope)` holds ids into it.
/// Deactivated rules stay in the id index as history.
pub struct RuleRegistry {
    inner: RwLock<RuleIndex>,
}

#[derive(Default)]
struct RuleIndex {
    rules: HashMap<RuleId, Arc<Rule>>,
    active: HashMap<(String, String), RuleId>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RuleIndex::default()),
        }
    }

    /// Index an adopted rule and make it the active rule for its
    /// `(raft_id, scope)`, superseding any previous one.
    pub async fn activate(&self, rule: Arc<Rule>) {
        let mut index = self.inner.write().await;
        let key = (rule.raft_id.clone(), rule.scope.clone());
        debug!(rule_id = %rule.rule_id, raft_id = %rule.raft_id, scope = %rule.scope, "Activating rule");
        index.active.insert(key, rule.rule_id);
        index.rules.insert(rule.rule_id, rule);
    }

    /// Drop a rule from the active index if it is still the active rule
    /// for the given `(raft_id, scope)`. The id index keeps it.
    pub async fn deactivate(&self, raft_id: &str, scope: &str, rule_id: &RuleId) {
        let mut index = self.inner.write().await;
        let key = (raft_id.to_string(), scope.to_string());
        if index.active.get(&key) == Some(rule_id) {
            index.active.remove(&key);
            debug!(rule_id = %rule_id, raft_id = %raft_id, scope = %scope, "Deactivated rule");
        }
    }

    pub async fn get(&self, rule_id: &RuleId) -> Option<Arc<Rule>> {
        let index = self.inner.read().await;
        index.rules.get(rule_id).cloned()
    }

    /// The active rule for a scope within one raft.
    pub async fn active_for(&self, raft_id: &str, scope: &str) -> Option<Arc<Rule>> {
        let index = self.inner.read().await;
        let rule_id = index
            .active
            .get(&(raft_id.to_string(), scope.to_string()))?;
        index.rules.get(rule_id).cloned()
    }

    /// Collapsed per-scope view across rafts: when a scope is active in
    /// several rafts, the most recently adopted rule wins. Advisory for
    /// the agent's behaviour; per-raft rules stay authoritative within
    /// their raft.
    pub async fn global_active(&self) -> HashMap<String, Rule> {
        let index = self.inner.read().await;
        let mut out: HashMap<String, Rule> = HashMap::new();
        for ((_, scope), rule_id) in index.active.iter() {
            let Some(rule) = index.rules.get(rule_id) else {
                continue;
            };
            match out.get(scope) {
                Some(current) if current.adopted_at >= rule.adopted_at => {}
                _ => {
                    out.insert(scope.clone(), (**rule).clone());
                }
            }
        }
        out
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn adopted_rule(raft_id: &str, scope: &str, body: &str, adopted_offset_secs: i64) -> Arc<Rule> {
        let now = Utc::now();
        Arc::new(Rule {
            rule_id: RuleId::compute(scope, body, now.timestamp(), raft_id),
            raft_id: raft_id.to_string(),
            scope: scope.to_string(),
            version: 1,
            timestamp: now,
            body: body.to_string(),
            base_rule_id: None,
            signature: None,
            proposed_by: raft_id.to_string(),
            adopted_at: Some(now + Duration::seconds(adopted_offset_secs)),
        })
    }

    #[tokio::test]
    async fn test_one_active_rule_per_raft_scope() {
        let registry = RuleRegistry::new();
        let first = adopted_rule("raft-x", "data", "keep 30d", 0);
        let second = adopted_rule("raft-x", "data", "keep 7d", 10);

        registry.activate(first.clone()).await;
        registry.activate(second.clone()).await;

        let active = registry.active_for("raft-x", "data").await.unwrap();
        assert_eq!(active.rule_id, second.rule_id);

        // Superseded rule survives in the id index.
        assert!(registry.get(&first.rule_id).await.is_some());
    }

    #[tokio::test]
    async fn test_deactivate_only_if_current() {
        let registry = RuleRegistry::new();
        let old = adopted_rule("raft-x", "data", "keep 30d", 0);
        let new = adopted_rule("raft-x", "data", "keep 7d", 10);

        registry.activate(old.clone()).await;
        registry.activate(new.clone()).await;

        // Deactivating the superseded rule must not disturb the active one.
        registry.deactivate("raft-x", "data", &old.rule_id).await;
        assert!(registry.active_for("raft-x", "data").await.is_some());

        registry.deactivate("raft-x", "data", &new.rule_id).await;
        assert!(registry.active_for("raft-x", "data").await.is_none());
    }

    #[tokio::test]
    async fn test_global_view_latest_adoption_wins() {
        let registry = RuleRegistry::new();
        let older = adopted_rule("raft-x", "pri", "A", 0);
        let newer = adopted_rule("raft-y", "pri", "B", 60);

        registry.activate(older).await;
        registry.activate(newer.clone()).await;

        let global = registry.global_active().await;
        assert_eq!(global.len(), 1);
        assert_eq!(global["pri"].body, "B");

        // Both per-raft views stay authoritative.
        assert_eq!(
            registry.active_for("raft-x", "pri").await.unwrap().body,
            "A"
        );
        assert_eq!(
            registry.active_for("raft-y", "pri").await.unwrap().body,
            "B"
        );
    }
}
