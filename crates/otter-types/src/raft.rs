use crate::id::RuleId;
use crate::member::Member;
use crate::rule::Rule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Plain snapshot of one governance raft: its member set and the rules
/// adopted within it. This is the shape that crosses the persistence
/// boundary; the live, lock-guarded raft lives in the governance crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaftData {
    pub raft_id: String,
    pub created_at: DateTime<Utc>,
    pub members: HashMap<String, Member>,
    pub rules: HashMap<RuleId, Rule>,
}

impl RaftData {
    pub fn new(raft_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            raft_id: raft_id.into(),
            created_at,
            members: HashMap::new(),
            rules: HashMap::new(),
        }
    }

    pub fn with_member(mut self, member: Member) -> Self {
        self.members.insert(member.member_id.clone(), member);
        self
    }

    pub fn active_member_count(&self) -> usize {
        self.members.values().filter(|m| m.is_active()).count()
    }
}
