use crate::backend::{Result, StorageBackend, StorageError, StorageStats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use otter_types::{Member, RaftData, Rule, RuleId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type RaftRows = Arc<RwLock<HashMap<String, DateTime<Utc>>>>;
type MemberRows = Arc<RwLock<HashMap<(String, String), Member>>>;
type RuleRows = Arc<RwLock<HashMap<RuleId, Rule>>>;

/// In-memory storage backend for testing and development.
///
/// Holds the three relations as plain maps. Lock acquisition is always
/// rafts → members → rules, so composite reads see a consistent
/// snapshot.
pub struct MemoryBackend {
    rafts: RaftRows,
    members: MemberRows,
    rules: RuleRows,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            rafts: Arc::new(RwLock::new(HashMap::new())),
            members: Arc::new(RwLock::new(HashMap::new())),
            rules: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryBackend {
    fn clone(&self) -> Self {
        Self {
            rafts: Arc::clone(&self.rafts),
            members: Arc::clone(&self.members),
            rules: Arc::clone(&self.rules),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn put_raft(&self, raft: &RaftData) -> Result<()> {
        let mut rafts = self.rafts.write().await;
        let mut members = self.members.write().await;
        let mut rules = self.rules.write().await;

        rafts.insert(raft.raft_id.clone(), raft.created_at);

        for member in raft.members.values() {
            members.insert(
                (raft.raft_id.clone(), member.member_id.clone()),
                member.clone(),
            );
        }

        for rule in raft.rules.values() {
            rules.insert(rule.rule_id, rule.clone());
        }

        Ok(())
    }

    async fn put_rule(&self, rule: &Rule) -> Result<()> {
        let mut rules = self.rules.write().await;
        rules.insert(rule.rule_id, rule.clone());
        Ok(())
    }

    async fn get_raft(&self, raft_id: &str) -> Result<Option<RaftData>> {
        let rafts = self.rafts.read().await;
        let members = self.members.read().await;
        let rules = self.rules.read().await;

        let Some(created_at) = rafts.get(raft_id) else {
            return Ok(None);
        };

        let mut raft = RaftData::new(raft_id, *created_at);
        for ((owner, member_id), member) in members.iter() {
            if owner == raft_id {
                raft.members.insert(member_id.clone(), member.clone());
            }
        }
        for rule in rules.values() {
            if rule.raft_id == raft_id {
                raft.rules.insert(rule.rule_id, rule.clone());
            }
        }

        Ok(Some(raft))
    }

    async fn list_rafts(&self) -> Result<Vec<RaftData>> {
        let raft_ids: Vec<String> = {
            let rafts = self.rafts.read().await;
            rafts.keys().cloned().collect()
        };

        let mut out = Vec::with_capacity(raft_ids.len());
        for raft_id in raft_ids {
            if let Some(raft) = self.get_raft(&raft_id).await? {
                out.push(raft);
            }
        }
        out.sort_by(|a, b| a.raft_id.cmp(&b.raft_id));
        Ok(out)
    }

    async fn delete_raft(&self, raft_id: &str) -> Result<()> {
        let mut rafts = self.rafts.write().await;
        let mut members = self.members.write().await;
        let mut rules = self.rules.write().await;

        if rafts.remove(raft_id).is_none() {
            return Err(StorageError::NotFound(raft_id.to_string()));
        }
        members.retain(|(owner, _), _| owner != raft_id);
        rules.retain(|_, rule| rule.raft_id != raft_id);

        Ok(())
    }

    async fn get_rule(&self, rule_id: &RuleId) -> Result<Option<Rule>> {
        let rules = self.rules.read().await;
        Ok(rules.get(rule_id).cloned())
    }

    async fn rules_by_scope(&self, scope: &str) -> Result<Vec<Rule>> {
        let rules = self.rules.read().await;
        let mut out: Vec<Rule> = rules.values().filter(|r| r.scope == scope).cloned().collect();
        out.sort_by_key(|r| r.rule_id);
        Ok(out)
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn stats(&self) -> Result<StorageStats> {
        let rafts = self.rafts.read().await;
        let members = self.members.read().await;
        let rules = self.rules.read().await;

        Ok(StorageStats {
            raft_count: rafts.len(),
            member_count: members.len(),
            rule_count: rules.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otter_types::PublicKey;

    fn sample_raft() -> RaftData {
        let now = Utc::now();
        let mut raft = RaftData::new("otter-a", now)
            .with_member(Member::bootstrap("otter-a", PublicKey::from_bytes([1; 32]), now));
        let rule = Rule {
            rule_id: RuleId::compute("greeting", "Say hello", now.timestamp(), "otter-a"),
            raft_id: "otter-a".to_string(),
            scope: "greeting".to_string(),
            version: 1,
            timestamp: now,
            body: "Say hello".to_string(),
            base_rule_id: None,
            signature: None,
            proposed_by: "otter-a".to_string(),
            adopted_at: Some(now),
        };
        raft.rules.insert(rule.rule_id, rule);
        raft
    }

    #[tokio::test]
    async fn test_put_get_raft() {
        let backend = MemoryBackend::new();
        let raft = sample_raft();

        backend.put_raft(&raft).await.unwrap();

        let loaded = backend.get_raft("otter-a").await.unwrap().unwrap();
        assert_eq!(loaded.members.len(), 1);
        assert_eq!(loaded.rules.len(), 1);
        assert!(backend.get_raft("otter-z").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_raft_drops_rows() {
        let backend = MemoryBackend::new();
        backend.put_raft(&sample_raft()).await.unwrap();

        backend.delete_raft("otter-a").await.unwrap();

        assert!(backend.get_raft("otter-a").await.unwrap().is_none());
        let stats = backend.stats().await.unwrap();
        assert_eq!(stats.member_count, 0);
        assert_eq!(stats.rule_count, 0);

        assert!(matches!(
            backend.delete_raft("otter-a").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rules_by_scope() {
        let backend = MemoryBackend::new();
        backend.put_raft(&sample_raft()).await.unwrap();

        let found = backend.rules_by_scope("greeting").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].body, "Say hello");
        assert!(backend.rules_by_scope("tone").await.unwrap().is_empty());
    }
}
