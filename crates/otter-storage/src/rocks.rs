use crate::backend::{Result, StorageBackend, StorageError, StorageStats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use otter_types::{Member, MembershipState, PublicKey, RaftData, Rule, RuleId, Signature};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// RocksDB-backed governance storage.
///
/// Rows are bincode-encoded with UNIX-second timestamps. Key prefixes
/// (`member:{raft_id}:`, `rule_by_raft:{raft_id}:`,
/// `rule_by_scope:{scope}:`) double as the secondary indices.
pub struct RocksBackend {
    db: Arc<DB>,
}

#[derive(Serialize, Deserialize)]
struct RaftRow {
    created_at: i64,
    updated_at: i64,
}

#[derive(Serialize, Deserialize)]
struct MemberRow {
    member_id: String,
    state: MembershipState,
    joined_at: i64,
    last_seen_at: i64,
    public_key: PublicKey,
    signature: Option<Signature>,
    inducted_by: String,
    expires_at: Option<i64>,
}

#[derive(Serialize, Deserialize)]
struct RuleRow {
    rule_id: RuleId,
    raft_id: String,
    scope: String,
    version: u32,
    timestamp: i64,
    body: String,
    base_rule_id: Option<RuleId>,
    signature: Option<Signature>,
    proposed_by: String,
    adopted_at: Option<i64>,
}

fn from_ts(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StorageError::SerializationError(format!("timestamp out of range: {}", secs)))
}

impl MemberRow {
    fn from_member(member: &Member) -> Self {
        Self {
            member_id: member.member_id.clone(),
            state: member.state,
            joined_at: member.joined_at.timestamp(),
            last_seen_at: member.last_seen_at.timestamp(),
            public_key: member.public_key,
            signature: member.signature.clone(),
            inducted_by: member.inducted_by.clone(),
            expires_at: member.expires_at.map(|t| t.timestamp()),
        }
    }

    fn into_member(self) -> Result<Member> {
        Ok(Member {
            member_id: self.member_id,
            state: self.state,
            joined_at: from_ts(self.joined_at)?,
            last_seen_at: from_ts(self.last_seen_at)?,
            public_key: self.public_key,
            signature: self.signature,
            inducted_by: self.inducted_by,
            expires_at: self.expires_at.map(from_ts).transpose()?,
        })
    }
}

impl RuleRow {
    fn from_rule(rule: &Rule) -> Self {
        Self {
            rule_id: rule.rule_id,
            raft_id: rule.raft_id.clone(),
            scope: rule.scope.clone(),
            version: rule.version,
            timestamp: rule.timestamp.timestamp(),
            body: rule.body.clone(),
            base_rule_id: rule.base_rule_id,
            signature: rule.signature.clone(),
            proposed_by: rule.proposed_by.clone(),
            adopted_at: rule.adopted_at.map(|t| t.timestamp()),
        }
    }

    fn into_rule(self) -> Result<Rule> {
        Ok(Rule {
            rule_id: self.rule_id,
            raft_id: self.raft_id,
            scope: self.scope,
            version: self.version,
            timestamp: from_ts(self.timestamp)?,
            body: self.body,
            base_rule_id: self.base_rule_id,
            signature: self.signature,
            proposed_by: self.proposed_by,
            adopted_at: self.adopted_at.map(from_ts).transpose()?,
        })
    }
}

impl RocksBackend {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)
            .map_err(|e| StorageError::BackendError(format!("failed to open RocksDB: {}", e)))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn raft_key(raft_id: &str) -> Vec<u8> {
        format!("raft:{}", raft_id).into_bytes()
    }

    fn member_key(raft_id: &str, member_id: &str) -> Vec<u8> {
        format!("member:{}:{}", raft_id, member_id).into_bytes()
    }

    fn rule_key(rule_id: &RuleId) -> Vec<u8> {
        format!("rule:{}", rule_id).into_bytes()
    }

    fn rule_by_raft_key(raft_id: &str, rule_id: &RuleId) -> Vec<u8> {
        format!("rule_by_raft:{}:{}", raft_id, rule_id).into_bytes()
    }

    fn rule_by_scope_key(scope: &str, rule_id: &RuleId) -> Vec<u8> {
        format!("rule_by_scope:{}:{}", scope, rule_id).into_bytes()
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| StorageError::SerializationError(e.to_string()))
    }

    fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(|e| StorageError::SerializationError(e.to_string()))
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StorageError::BackendError(format!("RocksDB write error: {}", e)))
    }

    /// Collect every `(key, value)` pair under a key prefix.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let mut out = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, value) =
                item.map_err(|e| StorageError::BackendError(format!("RocksDB scan error: {}", e)))?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key, value));
        }
        Ok(out)
    }

    fn stage_rule(batch: &mut WriteBatch, rule: &Rule) -> Result<()> {
        let row = Self::encode(&RuleRow::from_rule(rule))?;
        batch.put(Self::rule_key(&rule.rule_id), row);
        batch.put(Self::rule_by_raft_key(&rule.raft_id, &rule.rule_id), b"");
        batch.put(Self::rule_by_scope_key(&rule.scope, &rule.rule_id), b"");
        Ok(())
    }

    /// Trailing id segment of an index key, e.g. the rule id in
    /// `rule_by_raft:{raft_id}:{rule_id}`.
    fn id_suffix(key: &[u8], prefix: &[u8]) -> Result<RuleId> {
        let suffix = std::str::from_utf8(&key[prefix.len()..])
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        RuleId::from_hex(suffix)
            .map_err(|e| StorageError::SerializationError(format!("bad rule id in key: {}", e)))
    }
}

#[async_trait]
impl StorageBackend for RocksBackend {
    async fn put_raft(&self, raft: &RaftData) -> Result<()> {
        let row = RaftRow {
            created_at: raft.created_at.timestamp(),
            updated_at: Utc::now().timestamp(),
        };

        let mut batch = WriteBatch::default();
        batch.put(Self::raft_key(&raft.raft_id), Self::encode(&row)?);

        for member in raft.members.values() {
            batch.put(
                Self::member_key(&raft.raft_id, &member.member_id),
                Self::encode(&MemberRow::from_member(member))?,
            );
        }

        for rule in raft.rules.values() {
            Self::stage_rule(&mut batch, rule)?;
        }

        debug!(raft_id = %raft.raft_id, members = raft.members.len(), rules = raft.rules.len(), "Persisting raft");
        self.write(batch)
    }

    async fn put_rule(&self, rule: &Rule) -> Result<()> {
        let mut batch = WriteBatch::default();
        Self::stage_rule(&mut batch, rule)?;
        self.write(batch)
    }

    async fn get_raft(&self, raft_id: &str) -> Result<Option<RaftData>> {
        let raw = self
            .db
            .get(Self::raft_key(raft_id))
            .map_err(|e| StorageError::BackendError(format!("RocksDB read error: {}", e)))?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let row: RaftRow = Self::decode(&raw)?;

        let mut raft = RaftData::new(raft_id, from_ts(row.created_at)?);

        let member_prefix = format!("member:{}:", raft_id).into_bytes();
        for (_, value) in self.scan_prefix(&member_prefix)? {
            let member = Self::decode::<MemberRow>(&value)?.into_member()?;
            raft.members.insert(member.member_id.clone(), member);
        }

        let index_prefix = format!("rule_by_raft:{}:", raft_id).into_bytes();
        for (key, _) in self.scan_prefix(&index_prefix)? {
            let rule_id = Self::id_suffix(&key, &index_prefix)?;
            if let Some(rule) = self.get_rule(&rule_id).await? {
                raft.rules.insert(rule.rule_id, rule);
            }
        }

        Ok(Some(raft))
    }

    async fn list_rafts(&self) -> Result<Vec<RaftData>> {
        let prefix = b"raft:".to_vec();
        let mut out = Vec::new();
        for (key, _) in self.scan_prefix(&prefix)? {
            let raft_id = std::str::from_utf8(&key[prefix.len()..])
                .map_err(|e| StorageError::SerializationError(e.to_string()))?
                .to_string();
            if let Some(raft) = self.get_raft(&raft_id).await? {
                out.push(raft);
            }
        }
        out.sort_by(|a, b| a.raft_id.cmp(&b.raft_id));
        Ok(out)
    }

    async fn delete_raft(&self, raft_id: &str) -> Result<()> {
        if self
            .db
            .get(Self::raft_key(raft_id))
            .map_err(|e| StorageError::BackendError(format!("RocksDB read error: {}", e)))?
            .is_none()
        {
            return Err(StorageError::NotFound(raft_id.to_string()));
        }

        let mut batch = WriteBatch::default();
        batch.delete(Self::raft_key(raft_id));

        let member_prefix = format!("member:{}:", raft_id).into_bytes();
        for (key, _) in self.scan_prefix(&member_prefix)? {
            batch.delete(key);
        }

        let index_prefix = format!("rule_by_raft:{}:", raft_id).into_bytes();
        for (key, _) in self.scan_prefix(&index_prefix)? {
            let rule_id = Self::id_suffix(&key, &index_prefix)?;
            if let Some(rule) = self.get_rule(&rule_id).await? {
                batch.delete(Self::rule_by_scope_key(&rule.scope, &rule_id));
            }
            batch.delete(Self::rule_key(&rule_id));
            batch.delete(key);
        }

        self.write(batch)
    }

    async fn get_rule(&self, rule_id: &RuleId) -> Result<Option<Rule>> {
        let raw = self
            .db
            .get(Self::rule_key(rule_id))
            .map_err(|e| StorageError::BackendError(format!("RocksDB read error: {}", e)))?;
        raw.map(|bytes| Self::decode::<RuleRow>(&bytes)?.into_rule())
            .transpose()
    }

    async fn rules_by_scope(&self, scope: &str) -> Result<Vec<Rule>> {
        let index_prefix = format!("rule_by_scope:{}:", scope).into_bytes();
        let mut out = Vec::new();
        for (key, _) in self.scan_prefix(&index_prefix)? {
            let rule_id = Self::id_suffix(&key, &index_prefix)?;
            if let Some(rule) = self.get_rule(&rule_id).await? {
                out.push(rule);
            }
        }
        out.sort_by_key(|r| r.rule_id);
        Ok(out)
    }

    async fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| StorageError::BackendError(format!("RocksDB flush error: {}", e)))
    }

    async fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            raft_count: self.scan_prefix(b"raft:")?.len(),
            member_count: self.scan_prefix(b"member:")?.len(),
            rule_count: self.scan_prefix(b"rule:")?.len(),
        })
    }
}
