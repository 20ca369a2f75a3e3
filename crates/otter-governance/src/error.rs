use otter_crypto::KeyStoreError;
use otter_storage::StorageError;
use otter_types::ParseVoteTypeError;
use thiserror::Error;

/// Governance operation result type
pub type Result<T> = std::result::Result<T, GovernanceError>;

/// Governance errors
#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("raft not found: {0}")]
    RaftNotFound(String),

    #[error("member {member_id} is not an active member of raft {raft_id}")]
    MemberNotActive { raft_id: String, member_id: String },

    #[error("member {member_id} has permanently left raft {raft_id} and cannot be re-inducted")]
    MemberTerminal { raft_id: String, member_id: String },

    #[error("proposal not found: {0}")]
    ProposalNotFound(String),

    #[error("proposal is closed: {0}")]
    ProposalClosed(String),

    #[error("invalid vote type: {0}")]
    InvalidVoteType(String),

    #[error("invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("negotiation could not resolve conflicts: {0}")]
    ConflictUnresolved(String),

    #[error("remote fetch failed: {0}")]
    RemoteFetch(String),

    #[error("mediator error: {0}")]
    Mediator(String),

    #[error("key store error: {0}")]
    KeyStore(#[from] KeyStoreError),

    #[error("persistence error: {0}")]
    Persistence(#[from] StorageError),
}

impl From<ParseVoteTypeError> for GovernanceError {
    fn from(err: ParseVoteTypeError) -> Self {
        Self::InvalidVoteType(err.0)
    }
}
