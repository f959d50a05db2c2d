//! A single-threaded, event-loop-driven Raft consensus core.
//!
//! The crate implements the role state machine and the election/replication
//! protocol: leader election, log replication, commit-index advancement,
//! and catch-up-based membership changes. Persistence, networking and the
//! host state machine are all out of scope — see [`driver`] for the
//! boundary the host implements.
//!
//! [`core::RaftCore`] is the single entry point: the host drives it with
//! [`core::RaftCore::on_tick`], inbound RPCs (`on_request_vote`,
//! `on_append_entries`, ...) and driver-completion callbacks
//! (`on_persist_entries_complete`, ...), and drains
//! [`core::RaftCore::drain_events`] after each call for outbound RPCs,
//! persistence requests and commit notifications.

pub mod apply;
pub mod config;
pub mod configuration;
pub mod core;
pub mod driver;
mod election;
pub mod error;
pub mod ids;
pub mod log;
mod membership;
pub mod progress;
mod replication;
pub mod role;
pub mod rpc;

#[cfg(any(test, feature = "test-util"))]
pub mod store;

pub use apply::{ApplyOutcome, ProposeTicket};
pub use config::RaftConfig;
pub use configuration::{Configuration, ConfigurationServer, ServerRole};
pub use crate::core::RaftCore;
pub use driver::{CoreEvent, CorrelationId, Driver, OutboundMessage};
pub use error::{RaftError, Result};
pub use ids::{Address, LogIndex, ServerId, Term};
pub use log::{EntryKind, LogEntry, RaftLog, SnapshotMeta};
pub use membership::{CatchUp, RoundOutcome};
pub use progress::{Progress, ProgressState};
pub use role::{Role, RoleState};
pub use rpc::{
    AppendEntries, AppendEntriesResult, InstallSnapshot, InstallSnapshotResult, RequestVote,
    RequestVoteResult, TimeoutNow,
};
