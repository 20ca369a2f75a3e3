use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length in bytes of every governance identifier (128 bits).
pub const ID_LEN: usize = 16;

fn digest(domain: &[u8], parts: &[&[u8]]) -> [u8; ID_LEN] {
    let mut hasher = Hasher::new();
    hasher.update(domain);
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    let hash = hasher.finalize();
    let mut out = [0u8; ID_LEN];
    out.copy_from_slice(&hash.as_bytes()[..ID_LEN]);
    out
}

fn parse_hex(s: &str) -> Result<[u8; ID_LEN], hex::FromHexError> {
    let bytes = hex::decode(s)?;
    if bytes.len() != ID_LEN {
        return Err(hex::FromHexError::InvalidStringLength);
    }
    let mut arr = [0u8; ID_LEN];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

macro_rules! governance_id {
    ($(#[$doc:meta])* $name:ident, $domain:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name([u8; ID_LEN]);

        impl $name {
            pub fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; ID_LEN] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                parse_hex(s).map(Self)
            }

            fn digest(parts: &[&[u8]]) -> Self {
                Self(digest($domain, parts))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({}...)"), &self.to_hex()[..8])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }
    };
}

governance_id!(
    /// Content-addressed rule identifier: blake3 over the rule's stable
    /// fields, truncated to 128 bits. Identical content yields an
    /// identical id on every node.
    RuleId,
    b"otter:rule"
);

governance_id!(
    /// Content-addressed proposal identifier. Derived from the same
    /// stable fields as [`RuleId`] under a distinct domain, so a rule
    /// and the proposal carrying it never collide.
    ProposalId,
    b"otter:proposal"
);

governance_id!(
    /// Identifier for a detected inter-raft rule conflict.
    ConflictId,
    b"otter:conflict"
);

governance_id!(
    /// Identifier for a mediated inter-raft negotiation.
    NegotiationId,
    b"otter:negotiation"
);

impl RuleId {
    /// Compute a rule id from the rule's stable fields.
    pub fn compute(scope: &str, body: &str, timestamp: i64, proposed_by: &str) -> Self {
        Self::digest(&[
            scope.as_bytes(),
            body.as_bytes(),
            &timestamp.to_le_bytes(),
            proposed_by.as_bytes(),
        ])
    }
}

impl ProposalId {
    /// Compute a proposal id from the carried rule's stable fields.
    ///
    /// The raft id participates in the digest: proposing the same rule
    /// into two rafts (a dual-raft compromise vote) yields two
    /// independent proposal records.
    pub fn compute(raft_id: &str, scope: &str, body: &str, timestamp: i64, proposed_by: &str) -> Self {
        Self::digest(&[
            raft_id.as_bytes(),
            scope.as_bytes(),
            body.as_bytes(),
            &timestamp.to_le_bytes(),
            proposed_by.as_bytes(),
        ])
    }
}

impl ConflictId {
    pub fn compute(rule1: &RuleId, rule2: &RuleId) -> Self {
        Self::digest(&[rule1.as_bytes(), rule2.as_bytes()])
    }
}

impl NegotiationId {
    pub fn compute(raft1_id: &str, raft2_id: &str, started_at: i64) -> Self {
        Self::digest(&[
            raft1_id.as_bytes(),
            raft2_id.as_bytes(),
            &started_at.to_le_bytes(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_id_deterministic() {
        let a = RuleId::compute("data_retention", "keep 30d", 1_700_000_000, "otter-a");
        let b = RuleId::compute("data_retention", "keep 30d", 1_700_000_000, "otter-a");
        assert_eq!(a, b);

        let c = RuleId::compute("data_retention", "keep 7d", 1_700_000_000, "otter-a");
        assert_ne!(a, c);
    }

    #[test]
    fn test_rule_and_proposal_ids_distinct() {
        let rule = RuleId::compute("tone", "Polite", 1_700_000_000, "otter-a");
        let proposal = ProposalId::compute("otter-a", "tone", "Polite", 1_700_000_000, "otter-a");
        assert_ne!(rule.as_bytes(), proposal.as_bytes());
    }

    #[test]
    fn test_proposal_ids_differ_per_raft() {
        let in_x = ProposalId::compute("raft-x", "pri", "C", 1_700_000_000, "llm-negotiation");
        let in_y = ProposalId::compute("raft-y", "pri", "C", 1_700_000_000, "llm-negotiation");
        assert_ne!(in_x, in_y);
        assert_eq!(
            in_x,
            ProposalId::compute("raft-x", "pri", "C", 1_700_000_000, "llm-negotiation")
        );
    }

    #[test]
    fn test_hex_round_trip() {
        let id = RuleId::compute("pri", "A", 0, "otter-x");
        let hex = id.to_hex();
        assert_eq!(hex.len(), ID_LEN * 2);
        assert_eq!(RuleId::from_hex(&hex).unwrap(), id);
        assert!(RuleId::from_hex("deadbeef").is_err());
    }

    #[test]
    fn test_field_boundaries_hashed() {
        // Length-prefixed parts: moving a byte across a field boundary
        // must change the digest.
        let a = RuleId::compute("ab", "c", 0, "x");
        let b = RuleId::compute("a", "bc", 0, "x");
        assert_ne!(a, b);
    }
}
