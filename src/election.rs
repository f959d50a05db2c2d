//! Election module: vote accounting, election timer reset policy,
//! vote-request construction and response handling.

use crate::core::RaftCore;
use crate::driver::{CoreEvent, OutboundMessage};
use crate::ids::ServerId;
use crate::role::Role;
use crate::rpc::{RequestVote, RequestVoteResult};
use tracing::info;

impl RaftCore {
    pub(crate) fn tick_election_timer(&mut self) {
        if self.election_ticks_remaining == 0 {
            return;
        }
        self.election_ticks_remaining -= 1;
        if self.election_ticks_remaining == 0 {
            self.start_election();
        }
    }

    /// A follower whose timer expires becomes `candidate`; a candidate
    /// whose own timer expires becomes `candidate` again, bumping the term
    /// and restarting the election.
    pub(crate) fn start_election(&mut self) {
        self.current_term += 1;
        self.voted_for = Some(self.id);
        self.role.to_candidate(self.id);
        self.reset_election_timer();
        self.persist_term_and_vote();

        info!(id = %self.id, term = self.current_term, "starting election");
        self.emit(CoreEvent::RoleChanged(Role::Candidate));

        let last_log_index = self.log.last_index();
        let last_log_term = self.log.last_term();
        let peer_ids: Vec<ServerId> = self
            .configuration
            .all_servers()
            .into_iter()
            .map(|s| s.id)
            .filter(|id| *id != self.id)
            .collect();
        for peer_id in peer_ids {
            let cid = self.alloc_correlation_id();
            let message = OutboundMessage::RequestVote(
                peer_id,
                RequestVote {
                    candidate_id: self.id,
                    candidate_address: self.address.clone(),
                    term: self.current_term,
                    last_log_index,
                    last_log_term,
                },
            );
            self.emit(CoreEvent::Send(cid, message));
        }

        self.maybe_become_leader_single_voter();
    }

    /// A single-voter cluster wins its own election immediately: there are no peers to wait on.
    fn maybe_become_leader_single_voter(&mut self) {
        if self.role.role() != Role::Candidate {
            return;
        }
        let granted = self.role.as_candidate().map(|c| c.grant_count()).unwrap_or(0);
        let won = self.configuration.has_quorum(|id| id == self.id && granted >= 1);
        if won {
            self.become_leader();
        }
    }

    /// `RequestVote` receiver rules.
    pub fn on_request_vote(&mut self, request: RequestVote) {
        if request.term < self.current_term {
            self.reply_vote(request.candidate_id, false);
            return;
        }
        if request.term > self.current_term {
            self.adopt_term_and_step_down(request.term);
        }

        let already_voted_for_other = matches!(self.voted_for, Some(v) if v != request.candidate_id);
        let our_last_term = self.log.last_term();
        let our_last_index = self.log.last_index();
        let candidate_log_ok = request.last_log_term > our_last_term
            || (request.last_log_term == our_last_term && request.last_log_index >= our_last_index);

        if already_voted_for_other || !candidate_log_ok {
            self.reply_vote(request.candidate_id, false);
            return;
        }

        // Grant: persist voted_for/current_term before the response is
        // emitted.
        self.voted_for = Some(request.candidate_id);
        let cid = self.alloc_correlation_id();
        self.emit(CoreEvent::PersistTermAndVote(cid, self.current_term, self.voted_for));
        self.defer_send(
            cid,
            request.candidate_id,
            OutboundMessage::RequestVoteResult(
                request.candidate_id,
                RequestVoteResult { voter_id: self.id, term: self.current_term, vote_granted: true },
            ),
        );
        self.reset_election_timer();
    }

    fn reply_vote(&mut self, candidate_id: ServerId, vote_granted: bool) {
        let cid = self.alloc_correlation_id();
        self.emit(CoreEvent::Send(
            cid,
            OutboundMessage::RequestVoteResult(
                candidate_id,
                RequestVoteResult { voter_id: self.id, term: self.current_term, vote_granted },
            ),
        ));
    }

    /// Handle a `RequestVoteResult`. A candidate receiving any RPC with
    /// term >= its own reverts to follower if the term is strictly greater.
    pub fn on_request_vote_result(&mut self, result: RequestVoteResult) {
        if result.term > self.current_term {
            self.adopt_term_and_step_down(result.term);
            return;
        }
        if self.role.role() != Role::Candidate || result.term != self.current_term {
            // Stale response (wrong term or no longer a candidate): dropped
            // silently.
            return;
        }

        if let Some(candidate) = self.role.as_candidate_mut() {
            candidate.votes.insert(result.voter_id, result.vote_granted);
        }
        let granted: std::collections::HashSet<ServerId> = self
            .role
            .as_candidate()
            .map(|c| c.votes.iter().filter(|(_, g)| **g).map(|(id, _)| *id).collect())
            .unwrap_or_default();

        if self.configuration.has_quorum(|id| granted.contains(&id)) {
            self.become_leader();
        }
    }

    /// On entering `leader`: allocate the progress table,
    /// clear membership-change scratch, append a no-op barrier entry in
    /// the current term, broadcast an empty heartbeat.
    pub(crate) fn become_leader(&mut self) {
        let last_log_index = self.log.last_index();
        let peers: Vec<ServerId> = self
            .configuration
            .all_servers()
            .into_iter()
            .map(|s| s.id)
            .filter(|id| *id != self.id)
            .collect();
        self.role.to_leader(peers.into_iter(), last_log_index);
        self.heartbeat_ticks_remaining = self.config.heartbeat_interval_ticks;

        info!(id = %self.id, term = self.current_term, "became leader");
        self.emit(CoreEvent::RoleChanged(Role::Leader));

        // Barrier entry forces commit of entries from prior terms (Raft §5.4.2).
        let _ = self.leader_append(crate::log::EntryKind::Barrier, Vec::new());

        self.replicate_to_all();
    }

    /// `TimeoutNow`: the receiver immediately starts an election, used for leadership transfer.
    pub fn on_timeout_now(&mut self, message: crate::rpc::TimeoutNow) {
        if message.term < self.current_term {
            return;
        }
        if matches!(self.role.role(), Role::Follower | Role::Candidate) {
            self.start_election();
        }
    }

    /// Completion of a `persist_term_and_vote` request: flush any deferred
    /// sends waiting on it.
    pub fn on_persist_term_vote_complete(&mut self, correlation_id: u64) {
        self.flush_deferred(correlation_id);
    }
}
