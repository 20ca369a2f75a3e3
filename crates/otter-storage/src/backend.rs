use async_trait::async_trait;
use otter_types::{RaftData, Rule, RuleId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    BackendError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Trait for governance storage backend implementations.
///
/// Every method is one atomic unit: `put_raft` in particular writes the
/// raft row together with all member and rule rows, or nothing.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Upsert a raft row plus every member and rule row, atomically.
    async fn put_raft(&self, raft: &RaftData) -> Result<()>;

    /// Upsert a single rule row.
    async fn put_rule(&self, rule: &Rule) -> Result<()>;

    /// Load one raft with its members and rules.
    async fn get_raft(&self, raft_id: &str) -> Result<Option<RaftData>>;

    /// Load every persisted raft.
    async fn list_rafts(&self) -> Result<Vec<RaftData>>;

    /// Remove a raft row and its member and rule rows.
    async fn delete_raft(&self, raft_id: &str) -> Result<()>;

    /// Look up a rule row by id.
    async fn get_rule(&self, rule_id: &RuleId) -> Result<Option<Rule>>;

    /// All rule rows in a scope, across rafts.
    async fn rules_by_scope(&self, scope: &str) -> Result<Vec<Rule>>;

    /// Flush any pending writes.
    async fn flush(&self) -> Result<()>;

    /// Row counts for observability.
    async fn stats(&self) -> Result<StorageStats>;
}

#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    pub raft_count: usize,
    pub member_count: usize,
    pub rule_count: usize,
}
