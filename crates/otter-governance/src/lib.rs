/*!
# Otter Governance Engine

Per-node governance for autonomous otter agents. Each node maintains a
set of rafts (governance groups) it belongs to, proposes and votes on
rules within them, and — when joining another node's raft — detects
rule conflicts, mediates a compromise through an external language
model, and runs adoption votes in both rafts.

Despite the name, a raft here is a *governance group*: a member set
plus an adopted rule set. There is no replicated log, no leader
election, and no Byzantine consensus; every state transition executes
locally on the node that receives it, and cross-raft coordination is a
two-phase exchange between two nodes.

## Voting regimes

Outcomes depend on the number `N` of active members:

- `N = 1`: the single vote decides.
- `N = 2`: unanimous consent.
- `N ≥ 3`: quorum ⌈2N/3⌉; adoption at ⌈2N/3⌉ YES, or ⌈3N/4⌉ YES for a
  rule overriding another (`base_rule_id` set).

## Module structure

- **registry**: rafts and their lock-guarded member/rule maps
- **rules**: global adopted-rule index with per-scope active view
- **proposals**: proposal and negotiation registries
- **voting**: quorum arithmetic and the proposal state machine
- **conflict**: pairwise rule conflict detection across rafts
- **negotiation**: the `Mediator` capability and the negotiator
- **join**: join orchestration and the dual-raft compromise vote
- **liveness**: background expiry of long-inactive members
- **governance**: the facade binding everything together
*/

pub mod config;
pub mod conflict;
pub mod error;
pub mod governance;
pub mod join;
pub mod liveness;
pub mod negotiation;
pub mod proposals;
pub mod registry;
pub mod rules;
pub mod voting;

pub use config::GovernanceConfig;
pub use conflict::ConflictDetector;
pub use error::{GovernanceError, Result};
pub use governance::Governance;
pub use join::{JoinCoordinator, JoinOutcome, RemoteRuleFetcher, UnconfiguredFetcher};
pub use liveness::LivenessMonitor;
pub use negotiation::{Mediator, Negotiator, NEGOTIATED_PROPOSER};
pub use proposals::{NegotiationRegistry, ProposalRegistry};
pub use registry::{Raft, RaftRegistry};
pub use rules::RuleRegistry;
pub use voting::VotingEngine;
