//! Per-follower replication progress tracking.
//!
//! The leader keeps one [`Progress`] per follower, identified by position
//! in the configuration rather than by pointer.

use crate::ids::LogIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    /// Send one entry at a time; wait for a response before sending more.
    Probe,
    /// Multiple `AppendEntries` may be in flight at once.
    Pipeline,
    /// An `InstallSnapshot` is in flight; further appends are suspended.
    Snapshot,
}

#[derive(Debug, Clone)]
pub struct Progress {
    pub match_index: LogIndex,
    pub next_index: LogIndex,
    pub state: ProgressState,
    /// Set on any RPC response from this follower; polled and cleared by
    /// the leader's quorum-check routine.
    pub recent_recv: bool,
}

impl Progress {
    /// A fresh progress entry for a follower, as installed on entering
    /// `leader`: `match_index = 0`,
    /// `next_index = last_log_index + 1`, `state = probe`.
    pub fn new(last_log_index: LogIndex) -> Self {
        Self {
            match_index: 0,
            next_index: last_log_index + 1,
            state: ProgressState::Probe,
            recent_recv: false,
        }
    }

    /// Record a successful `AppendEntries` response acknowledging
    /// replication up to `acked_index`.
    ///
    /// - In `probe`: advance and switch to `pipeline`.
    /// - In `pipeline`: advance in place.
    /// - In `snapshot`: a late success response from before the snapshot
    ///   was triggered is ignored; the follower moves on once the
    ///   `InstallSnapshot` response arrives instead.
    pub fn on_append_success(&mut self, acked_index: LogIndex) {
        self.recent_recv = true;
        if self.state == ProgressState::Snapshot {
            return;
        }
        if acked_index > self.match_index {
            self.match_index = acked_index;
        }
        self.next_index = self.match_index + 1;
        if self.state == ProgressState::Probe {
            self.state = ProgressState::Pipeline;
        }
    }

    /// Record a rejected `AppendEntries`, with an optional conflict hint.
    /// Reverts to `probe` with `next_index` backed off to the hint (or by
    /// one, if no hint is given).
    pub fn on_append_rejected(&mut self, conflict_first_index: Option<LogIndex>) {
        self.recent_recv = true;
        if self.state == ProgressState::Snapshot {
            return;
        }
        self.state = ProgressState::Probe;
        self.next_index = match conflict_first_index {
            Some(hint) => hint.max(1),
            None => self.next_index.saturating_sub(1).max(1),
        };
    }

    /// Called when the leader decides `next_index` is below the snapshot's
    /// last index and must fall back to sending a full snapshot.
    pub fn begin_snapshot(&mut self) {
        self.state = ProgressState::Snapshot;
    }

    /// Called once the follower acknowledges the installed snapshot.
    pub fn on_snapshot_acked(&mut self, last_included_index: LogIndex) {
        self.recent_recv = true;
        self.match_index = self.match_index.max(last_included_index);
        self.next_index = self.match_index + 1;
        self.state = ProgressState::Probe;
    }

    pub fn take_recent_recv(&mut self) -> bool {
        std::mem::take(&mut self.recent_recv)
    }
}
