use crate::backend::{Result, StorageBackend, StorageStats};
use otter_types::{RaftData, Rule, RuleId};
use std::sync::Arc;
use tracing::debug;

/// Which backend a [`PersistenceStore`] runs on.
#[derive(Debug, Clone)]
pub enum BackendType {
    Memory,
    #[cfg(feature = "rocksdb")]
    RocksDb { path: String },
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend_type: BackendType,
}

impl Default for StorageConfig {
    fn default() -> Self {
        #[cfg(feature = "rocksdb")]
        let backend_type = BackendType::RocksDb {
            path: "./data/governance".to_string(),
        };

        #[cfg(not(feature = "rocksdb"))]
        let backend_type = BackendType::Memory;

        Self { backend_type }
    }
}

/// Durable store for governance state, wrapping a storage backend.
///
/// `save_raft` persists a raft row together with every member and rule
/// row transitively in one atomic write.
#[derive(Clone)]
pub struct PersistenceStore {
    backend: Arc<dyn StorageBackend>,
}

impl PersistenceStore {
    pub fn new(config: StorageConfig) -> Result<Self> {
        let backend: Arc<dyn StorageBackend> = match &config.backend_type {
            BackendType::Memory => Arc::new(crate::memory::MemoryBackend::new()),
            #[cfg(feature = "rocksdb")]
            BackendType::RocksDb { path } => Arc::new(crate::rocks::RocksBackend::new(path)?),
        };

        Ok(Self { backend })
    }

    pub fn from_backend(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub async fn save_raft(&self, raft: &RaftData) -> Result<()> {
        debug!(raft_id = %raft.raft_id, "Saving raft");
        self.backend.put_raft(raft).await
    }

    pub async fn save_rule(&self, rule: &Rule) -> Result<()> {
        debug!(rule_id = %rule.rule_id, scope = %rule.scope, "Saving rule");
        self.backend.put_rule(rule).await
    }

    /// Load every persisted raft with its members and rules.
    pub async fn load_all(&self) -> Result<Vec<RaftData>> {
        self.backend.list_rafts().await
    }

    pub async fn delete_raft(&self, raft_id: &str) -> Result<()> {
        debug!(raft_id = %raft_id, "Deleting raft");
        self.backend.delete_raft(raft_id).await
    }

    pub async fn get_rule(&self, rule_id: &RuleId) -> Result<Option<Rule>> {
        self.backend.get_rule(rule_id).await
    }

    pub async fn flush(&self) -> Result<()> {
        self.backend.flush().await
    }

    pub async fn stats(&self) -> Result<StorageStats> {
        self.backend.stats().await
    }
}
