//! The RPC message set. Every message carries a sender `id`,
//! `address` and `term`. These types carry only logical fields — the crate
//! defines no wire encoding; a host picks its own (the derived `Serialize`/
//! `Deserialize` impls are a convenience, not a mandate).

use crate::ids::{Address, LogIndex, ServerId, Term};
use crate::log::LogEntry;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVote {
    pub candidate_id: ServerId,
    pub candidate_address: Address,
    pub term: Term,
    pub last_log_index: LogIndex,
    pub last_log_term: Term,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteResult {
    pub voter_id: ServerId,
    pub term: Term,
    pub vote_granted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntries {
    pub leader_id: ServerId,
    pub leader_address: Address,
    pub term: Term,
    pub prev_log_index: LogIndex,
    pub prev_log_term: Term,
    pub entries: Vec<LogEntry>,
    pub leader_commit: LogIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesResult {
    pub follower_id: ServerId,
    pub term: Term,
    pub success: bool,
    pub last_log_index: LogIndex,
    pub conflict_term: Option<Term>,
    pub conflict_first_index: Option<LogIndex>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallSnapshot {
    pub leader_id: ServerId,
    pub leader_address: Address,
    pub term: Term,
    pub last_index: LogIndex,
    pub last_term: Term,
    pub configuration: crate::configuration::Configuration,
    pub data_chunk: Vec<u8>,
    pub offset: u64,
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallSnapshotResult {
    pub follower_id: ServerId,
    pub term: Term,
    pub last_index: LogIndex,
}

/// Optional leadership-transfer message: the receiver immediately starts
/// an election on receipt. Carries no result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutNow {
    pub leader_id: ServerId,
    pub term: Term,
}
