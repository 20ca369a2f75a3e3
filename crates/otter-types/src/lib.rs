/*!
# Otter Governance Types

Shared data model for the otter governance engine:

- **id**: deterministic 128-bit content-addressed identifiers
- **keys**: public key and signature wrappers
- **member**: raft membership records and their lifecycle states
- **rule**: governance rules and inter-raft rule conflicts
- **proposal**: rule proposals and vote tallies
- **negotiation**: mediated inter-raft negotiations
- **raft**: plain raft snapshots used at the persistence boundary

A "raft" here is a governance group (a member set plus an adopted rule
set), not a replicated log.
*/

pub mod id;
pub mod keys;
pub mod member;
pub mod negotiation;
pub mod proposal;
pub mod raft;
pub mod rule;

pub use id::{ConflictId, NegotiationId, ProposalId, RuleId};
pub use keys::{PublicKey, Signature};
pub use member::{Member, MembershipState};
pub use negotiation::{Negotiation, NegotiationStatus};
pub use proposal::{ParseVoteTypeError, Proposal, ProposalResult, ProposalStatus, VoteTally, VoteType};
pub use raft::RaftData;
pub use rule::{Rule, RuleConflict, RuleDraft};
