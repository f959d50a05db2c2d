use thiserror::Error;

/// Errors surfaced across the consensus core's public API.
///
/// Programming errors (illegal role transitions, violated invariants) are
/// not represented here: not recoverable. Out-of-memory is likewise not modeled —
/// Rust allocation failure aborts the process rather than returning a
/// catchable error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RaftError {
    #[error("not leader")]
    NotLeader,

    #[error("leadership lost")]
    LeadershipLost,

    #[error("log entry index mismatch: expected {expected}, got {actual}")]
    LogIndexMismatch { expected: u64, actual: u64 },

    #[error("cannot truncate log before first retained index {first_index}")]
    TruncateBeforeFirstIndex { first_index: u64 },

    #[error("cannot snapshot beyond last log index {last_index}")]
    SnapshotBeyondLastIndex { last_index: u64 },

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("catch-up for server {server_id} exceeded the maximum of {max_rounds} rounds")]
    CatchUpExceededMaxRounds { server_id: u64, max_rounds: u32 },

    #[error("membership change already in progress for server {server_id}")]
    MembershipChangeInProgress { server_id: u64 },

    #[error("server {server_id} is not a member of the configuration")]
    UnknownServer { server_id: u64 },

    #[error("server {server_id} is already a voter")]
    AlreadyVoter { server_id: u64 },

    #[error("configuration change rejected: {0}")]
    InvalidConfigurationChange(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("the core is unavailable after a persistence failure")]
    Unavailable,
}

pub type Result<T> = std::result::Result<T, RaftError>;

impl From<bincode::error::EncodeError> for RaftError {
    fn from(e: bincode::error::EncodeError) -> Self {
        RaftError::Serialization(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for RaftError {
    fn from(e: bincode::error::DecodeError) -> Self {
        RaftError::Serialization(e.to_string())
    }
}
