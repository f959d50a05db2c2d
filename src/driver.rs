//! Driver-facing interface : what the core consumes from its
//! host, and what the core hands back.
//!
//! The core never blocks. Any operation that would (disk I/O, a network
//! send) is issued here as a request returning a correlation id
//! immediately; the actual completion is delivered later via the matching
//! `RaftCore::on_*_complete` method.


use crate::configuration::Configuration;
use crate::ids::{Address, LogIndex, ServerId, Term};
use crate::log::LogEntry;
use crate::rpc::{
    AppendEntries, AppendEntriesResult, InstallSnapshot, InstallSnapshotResult, RequestVote,
    RequestVoteResult, TimeoutNow,
};

/// A correlation id for matching an asynchronous completion back to the
/// request that caused it — required because the transport may reorder
/// responses.
pub type CorrelationId = u64;

/// An outbound RPC, tagged with the peer it is addressed to.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    RequestVote(ServerId, RequestVote),
    RequestVoteResult(ServerId, RequestVoteResult),
    AppendEntries(ServerId, AppendEntries),
    AppendEntriesResult(ServerId, AppendEntriesResult),
    InstallSnapshot(ServerId, InstallSnapshot),
    InstallSnapshotResult(ServerId, InstallSnapshotResult),
    TimeoutNow(ServerId, TimeoutNow),
}

/// What the host observes as a side effect of driving the core.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// A committed entry, in log order, for the host state machine to
    /// apply.
    Commit(LogEntry),
    /// The role changed.
    RoleChanged(crate::role::Role),
    /// `persist_term_and_vote` request: must be durable before the core
    /// emits any RPC depending on it.
    PersistTermAndVote(CorrelationId, Term, Option<ServerId>),
    /// `persist_entries` request.
    PersistEntries(CorrelationId, Vec<LogEntry>),
    /// An RPC to send to a peer, best-effort.
    Send(CorrelationId, OutboundMessage),
    /// `install_snapshot` request (follower side): apply this snapshot to
    /// the host's snapshot store.
    InstallSnapshotToStore(CorrelationId, LogIndex, Term, Configuration, Vec<u8>),
    /// A client proposal's outcome.
    ApplyCompleted(crate::apply::ProposeTicket, crate::apply::ApplyOutcome),
    /// A membership-change promotion was abandoned after exceeding the
    /// configured round limit.
    PromotionAbandoned(ServerId),
}

/// The contract a host implements to carry out the side effects the core
/// requests. `RaftCore` holds no reference to a `Driver` at
/// all — it only emits [`CoreEvent`] values describing what a driver
/// should do; a host's event loop dispatches each drained event to the
/// matching method here and feeds the result back through the matching
/// `RaftCore::on_*_complete` method. The trait exists to name that
/// contract, not as a callback the core invokes itself.
pub trait Driver {
    fn persist_term_and_vote(&mut self, correlation_id: CorrelationId, term: Term, voted_for: Option<ServerId>);
    fn persist_entries(&mut self, correlation_id: CorrelationId, entries: Vec<LogEntry>);
    fn send(&mut self, correlation_id: CorrelationId, to: ServerId, message: OutboundMessage);
    fn install_snapshot(
        &mut self,
        correlation_id: CorrelationId,
        last_index: LogIndex,
        last_term: Term,
        configuration: Configuration,
        data: Vec<u8>,
    );
}
