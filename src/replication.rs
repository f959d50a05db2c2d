//! Replication module: heartbeats, log replication, progress tracking
//! integration and commit-index advancement.

use crate::core::RaftCore;
use crate::driver::{CoreEvent, OutboundMessage};
use crate::ids::{LogIndex, ServerId};
use crate::log::EntryKind;
use crate::progress::ProgressState;
use crate::role::Role;
use crate::rpc::{AppendEntries, AppendEntriesResult, InstallSnapshot, InstallSnapshotResult};
use tracing::{debug, warn};

/// Cap on entries sent per `AppendEntries`.
const MAX_ENTRIES_PER_APPEND: usize = 64;

impl RaftCore {
    pub(crate) fn tick_heartbeat(&mut self) {
        if self.heartbeat_ticks_remaining == 0 {
            self.heartbeat_ticks_remaining = self.config.heartbeat_interval_ticks;
            self.replicate_to_all();
            return;
        }
        self.heartbeat_ticks_remaining -= 1;
    }

    /// Send an `AppendEntries` (or `InstallSnapshot`, if the follower has
    /// fallen behind the snapshot) to every peer in the current
    /// configuration, including both halves of a joint-consensus overlay.
    pub(crate) fn replicate_to_all(&mut self) {
        let peer_ids: Vec<ServerId> = match self.role.as_leader() {
            Some(leader) => leader.progress.keys().copied().collect(),
            None => return,
        };
        for peer_id in peer_ids {
            self.replicate_to(peer_id);
        }
    }

    fn replicate_to(&mut self, peer_id: ServerId) {
        let Some(progress) = self.role.as_leader().and_then(|l| l.progress.get(&peer_id)) else { return };
        if progress.state == ProgressState::Snapshot {
            return;
        }

        let snapshot_last_index = self.log.snapshot().map(|s| s.last_index).unwrap_or(0);
        if progress.next_index <= snapshot_last_index {
            self.send_install_snapshot(peer_id);
            return;
        }

        let next_index = progress.next_index;
        let prev_log_index = next_index - 1;
        let Some(prev_log_term) = self.log.term_of(prev_log_index) else {
            // prev_log_index fell behind the retained log but not behind
            // the snapshot boundary above — shouldn't happen, fall back to
            // a snapshot rather than sending a malformed request.
            self.send_install_snapshot(peer_id);
            return;
        };
        let entries = self.log.entries_from(next_index, MAX_ENTRIES_PER_APPEND);

        let message = AppendEntries {
            leader_id: self.id,
            leader_address: self.address.clone(),
            term: self.current_term,
            prev_log_index,
            prev_log_term,
            entries,
            leader_commit: self.commit_index,
        };
        let cid = self.alloc_correlation_id();
        self.emit(CoreEvent::Send(cid, OutboundMessage::AppendEntries(peer_id, message)));
    }

    fn send_install_snapshot(&mut self, peer_id: ServerId) {
        let Some(snapshot) = self.log.snapshot().cloned() else { return };
        if let Some(leader) = self.role.as_leader_mut() {
            if let Some(progress) = leader.progress.get_mut(&peer_id) {
                progress.begin_snapshot();
            }
        }
        let message = InstallSnapshot {
            leader_id: self.id,
            leader_address: self.address.clone(),
            term: self.current_term,
            last_index: snapshot.last_index,
            last_term: snapshot.last_term,
            configuration: snapshot.configuration,
            data_chunk: snapshot.data,
            offset: 0,
            done: true,
        };
        let cid = self.alloc_correlation_id();
        self.emit(CoreEvent::Send(cid, OutboundMessage::InstallSnapshot(peer_id, message)));
    }

    /// Follower-side `AppendEntries` handling.
    pub fn on_append_entries(&mut self, request: AppendEntries) {
        if request.term < self.current_term {
            self.reply_append_entries(request.leader_id, false, None, None);
            return;
        }
        if request.term > self.current_term {
            self.adopt_term_and_step_down(request.term);
        }
        if self.role.role() != Role::Follower {
            self.enter_follower();
        }
        self.reset_election_timer();
        if let Some(follower) = self.role.as_follower_mut() {
            follower.current_leader = Some((request.leader_id, request.leader_address.clone()));
        }

        match self.log.term_of(request.prev_log_index) {
            Some(term) if term == request.prev_log_term => {}
            other => {
                let conflict_first_index = match other {
                    Some(conflicting_term) => {
                        self.log.first_index_of_term(conflicting_term, request.prev_log_index)
                    }
                    None => self.log.last_index() + 1,
                };
                warn!(id = %self.id, prev = request.prev_log_index, "append_entries consistency check failed");
                self.reply_append_entries(request.leader_id, false, other, Some(conflict_first_index));
                return;
            }
        }

        let mut newly_appended = Vec::new();
        for entry in request.entries {
            match self.log.term_of(entry.index) {
                Some(existing_term) if existing_term == entry.term => continue,
                Some(_) => {
                    self.log.truncate_suffix(entry.index).expect("conflicting index within log bounds");
                    self.on_truncate_suffix(entry.index);
                }
                None => {}
            }
            if entry.kind == EntryKind::Configuration {
                self.on_configuration_entry_appended(entry.index, &entry.payload);
            }
            self.log.append(entry.clone()).expect("append follows a consistency-checked prefix");
            newly_appended.push(entry);
        }

        if newly_appended.is_empty() {
            self.reply_append_entries(request.leader_id, true, None, None);
        } else {
            let cid = self.alloc_correlation_id();
            self.emit(CoreEvent::PersistEntries(cid, newly_appended));
            self.defer_send(
                cid,
                request.leader_id,
                OutboundMessage::AppendEntriesResult(
                    request.leader_id,
                    AppendEntriesResult {
                        follower_id: self.id,
                        term: self.current_term,
                        success: true,
                        last_log_index: self.log.last_index(),
                        conflict_term: None,
                        conflict_first_index: None,
                    },
                ),
            );
        }

        if request.leader_commit > self.commit_index {
            let new_commit = request.leader_commit.min(self.log.last_index());
            self.advance_commit_index_to(new_commit);
        }
    }

    fn reply_append_entries(
        &mut self,
        leader_id: ServerId,
        success: bool,
        conflict_term: Option<crate::ids::Term>,
        conflict_first_index: Option<LogIndex>,
    ) {
        let cid = self.alloc_correlation_id();
        self.emit(CoreEvent::Send(
            cid,
            OutboundMessage::AppendEntriesResult(
                leader_id,
                AppendEntriesResult {
                    follower_id: self.id,
                    term: self.current_term,
                    success,
                    last_log_index: self.log.last_index(),
                    conflict_term,
                    conflict_first_index,
                },
            ),
        ));
    }

    /// Leader-side `AppendEntriesResult` handling: update `Progress`,
    /// advance `commit_index`, keep pipelining.
    pub fn on_append_entries_result(&mut self, result: AppendEntriesResult) {
        if result.term > self.current_term {
            self.adopt_term_and_step_down(result.term);
            return;
        }
        if self.role.role() != Role::Leader || result.term != self.current_term {
            return;
        }

        let peer_id = result.follower_id;
        if let Some(leader) = self.role.as_leader_mut() {
            if let Some(progress) = leader.progress.get_mut(&peer_id) {
                if result.success {
                    progress.on_append_success(result.last_log_index);
                } else {
                    progress.on_append_rejected(result.conflict_first_index);
                }
            }
        }

        self.advance_leader_commit_index();
        self.replicate_to(peer_id);
    }

    /// Find the highest index with a majority (in both halves of a joint
    /// overlay) of `match_index >= N`, restricted to entries from the
    /// current term (Raft §5.4.2 — never commit a prior-term entry by
    /// count alone; invariant L3).
    pub(crate) fn advance_leader_commit_index(&mut self) {
        let Some(leader) = self.role.as_leader() else { return };
        let mut candidates: Vec<LogIndex> = leader.progress.values().map(|p| p.match_index).collect();
        candidates.push(self.log.durable_index());
        candidates.sort_unstable();
        candidates.dedup();

        for &n in candidates.iter().rev() {
            if n <= self.commit_index {
                break;
            }
            if self.log.term_of(n) != Some(self.current_term) {
                continue;
            }
            let has_match = |id: ServerId| {
                if id == self.id {
                    return self.log.durable_index() >= n;
                }
                self.role.as_leader().and_then(|l| l.progress.get(&id)).map(|p| p.match_index >= n).unwrap_or(false)
            };
            if self.configuration.has_quorum(has_match) {
                self.advance_commit_index_to(n);
                break;
            }
        }
    }

    /// Completion of a `persist_entries` request (leader or follower):
    /// record the newly durable index and flush any deferred sends.
    pub fn on_persist_entries_complete(&mut self, correlation_id: u64, durable_index: LogIndex) {
        self.log.set_durable_index(durable_index);
        self.flush_deferred(correlation_id);
        if self.role.role() == Role::Leader {
            self.advance_leader_commit_index();
            self.replicate_to_all();
        }
    }

    /// Completion of a best-effort `send` request: currently a no-op, kept
    /// as a named hook so a future retry/backpressure policy has somewhere
    /// to live. A failed send is otherwise dropped silently; the replication
    /// loop's own progress tracking is what drives retries.
    pub fn on_send_complete(&mut self, _correlation_id: u64) {}

    /// Follower-side `InstallSnapshot` handling.
    pub fn on_install_snapshot(&mut self, request: InstallSnapshot) {
        if request.term < self.current_term {
            return;
        }
        if request.term > self.current_term {
            self.adopt_term_and_step_down(request.term);
        }
        if self.role.role() != Role::Follower {
            self.enter_follower();
        }
        self.reset_election_timer();
        if let Some(follower) = self.role.as_follower_mut() {
            follower.current_leader = Some((request.leader_id, request.leader_address.clone()));
        }

        if !request.done {
            // Chunked transfer is not modeled: the crate always sends
            // `done: true` in one chunk; a future chunked host can extend
            // this by buffering `data_chunk` keyed by `offset`.
            return;
        }

        debug!(id = %self.id, last_index = request.last_index, "installing snapshot");
        let cid = self.alloc_correlation_id();
        self.emit(CoreEvent::InstallSnapshotToStore(
            cid,
            request.last_index,
            request.last_term,
            request.configuration.clone(),
            request.data_chunk.clone(),
        ));

        self.log.install_snapshot(crate::log::SnapshotMeta {
            last_index: request.last_index,
            last_term: request.last_term,
            configuration: request.configuration,
            data: request.data_chunk,
        });
        self.configuration = self.log.snapshot().expect("just installed").configuration.clone();
        if request.last_index > self.commit_index {
            self.commit_index = request.last_index;
        }
        if request.last_index > self.last_applied {
            self.last_applied = request.last_index;
        }

        self.defer_send(
            cid,
            request.leader_id,
            OutboundMessage::InstallSnapshotResult(
                request.leader_id,
                InstallSnapshotResult { follower_id: self.id, term: self.current_term, last_index: request.last_index },
            ),
        );
    }

    /// Leader-side `InstallSnapshotResult` handling.
    pub fn on_install_snapshot_result(&mut self, result: InstallSnapshotResult) {
        if result.term > self.current_term {
            self.adopt_term_and_step_down(result.term);
            return;
        }
        if self.role.role() != Role::Leader || result.term != self.current_term {
            return;
        }
        if let Some(leader) = self.role.as_leader_mut() {
            if let Some(progress) = leader.progress.get_mut(&result.follower_id) {
                progress.on_snapshot_acked(result.last_index);
            }
        }
        self.advance_leader_commit_index();
    }

    /// Completion of an `install_snapshot` (follower applying to its own
    /// store) request: the snapshot is already reflected in `self.log`;
    /// release the deferred `InstallSnapshotResult` send.
    pub fn on_install_snapshot_complete(&mut self, correlation_id: u64) {
        self.flush_deferred(correlation_id);
    }
}
