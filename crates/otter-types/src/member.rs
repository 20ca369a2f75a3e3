use crate::keys::{PublicKey, Signature};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a raft member.
///
/// Only `Active` members may propose or vote. `Revoked` and `Left` are
/// terminal; `Expired` is reversible only through explicit re-induction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipState {
    Active,
    Inactive,
    Expired,
    Revoked,
    Left,
}

impl MembershipState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Revoked | Self::Left)
    }
}

/// A member of a governance raft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub member_id: String,
    pub state: MembershipState,
    pub joined_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub public_key: PublicKey,
    pub signature: Option<Signature>,
    /// Member id of the inducting member, or `"self"` for the node's
    /// own bootstrap record.
    pub inducted_by: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Member {
    /// The node's own bootstrap record for its solo raft.
    pub fn bootstrap(member_id: impl Into<String>, public_key: PublicKey, now: DateTime<Utc>) -> Self {
        Self {
            member_id: member_id.into(),
            state: MembershipState::Active,
            joined_at: now,
            last_seen_at: now,
            public_key,
            signature: None,
            inducted_by: "self".to_string(),
            expires_at: None,
        }
    }

    /// A member inducted into an existing raft by `inducted_by`.
    pub fn inducted(
        member_id: impl Into<String>,
        public_key: PublicKey,
        inducted_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            member_id: member_id.into(),
            state: MembershipState::Active,
            joined_at: now,
            last_seen_at: now,
            public_key,
            signature: None,
            inducted_by: inducted_by.into(),
            expires_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == MembershipState::Active
    }
}
