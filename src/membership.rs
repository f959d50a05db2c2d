//! Membership-change (catch-up and promotion) scratch state, owned by the
//! leader.
//!
//! This is deliberately stateless scratch: it lives only inside the
//! current [`crate::role::LeaderState`] and is not reconciled across a
//! leadership change. If leadership is lost mid catch-up the in-flight
//! promotion is simply abandoned along with the rest of the leader's state
//! (phase 1); if lost after the configuration entry was appended (phase
//! 2), the entry may still commit under the next leader with no scratch
//! to carry over.

use crate::configuration::{ConfigurationServer, ServerRole};
use crate::core::RaftCore;
use crate::driver::CoreEvent;
use crate::error::{RaftError, Result};
use crate::ids::{Address, LogIndex, ServerId};
use crate::log::EntryKind;
use crate::role::Role;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// The round is still running; keep waiting.
    InProgress,
    /// The follower's `match_index` reached the round's target index before
    /// timeout — promotion proceeds to phase 2.
    CaughtUp,
    /// The round timed out without the follower catching up, and another
    /// round should begin (unless `max_catch_up_rounds` is exhausted).
    TimedOut,
    /// `max_catch_up_rounds` was exhausted — abandon the promotion.
    Abandoned,
}

/// Catch-up state for a single promotee, tracked while phase 1 (catch-up)
/// of a membership change is running.
#[derive(Debug, Clone)]
pub struct CatchUp {
    pub promotee_id: ServerId,
    pub round_number: u32,
    /// Target index this round: the leader's last log index when the round
    /// started.
    pub round_index: LogIndex,
    /// Ticks elapsed in the current round.
    pub round_duration: u32,
}

impl CatchUp {
    pub fn start(promotee_id: ServerId, current_last_index: LogIndex) -> Self {
        Self {
            promotee_id,
            round_number: 1,
            round_index: current_last_index,
            round_duration: 0,
        }
    }

    /// Advance one tick. Returns the round outcome given the promotee's
    /// current `match_index`.
    pub fn tick(
        &mut self,
        match_index: LogIndex,
        round_timeout_ticks: u32,
        max_rounds: u32,
    ) -> RoundOutcome {
        if match_index >= self.round_index {
            return RoundOutcome::CaughtUp;
        }

        self.round_duration += 1;
        if self.round_duration < round_timeout_ticks {
            return RoundOutcome::InProgress;
        }

        if self.round_number >= max_rounds {
            return RoundOutcome::Abandoned;
        }
        RoundOutcome::TimedOut
    }

    /// Begin the next round against a (possibly advanced) target index.
    pub fn begin_next_round(&mut self, current_last_index: LogIndex) {
        self.round_number += 1;
        self.round_index = current_last_index;
        self.round_duration = 0;
    }
}

impl RaftCore {
    /// Admit a new server as a non-voting replication target. Leader-only;
    /// takes effect immediately, with no log entry and no quorum
    /// requirement, since a non-voter does not affect `has_quorum`.
    pub fn add_server(&mut self, id: ServerId, address: Address) -> Result<()> {
        if self.role() != Role::Leader {
            return Err(RaftError::NotLeader);
        }
        if !self.configuration.add_server(ConfigurationServer { id, address, role: ServerRole::NonVoter }) {
            return Err(RaftError::InvalidConfigurationChange(format!("server {id} already known")));
        }
        let last_log_index = self.log.last_index();
        if let Some(leader) = self.role.as_leader_mut() {
            leader.progress.insert(id, crate::progress::Progress::new(last_log_index));
        }
        info!(id = %id, "admitted non-voting server");
        Ok(())
    }

    /// Begin promoting a non-voting server to voter: phase 1, catch-up
    /// rounds. Phase 2 (the joint-consensus configuration entry) starts
    /// automatically once [`RoundOutcome::CaughtUp`] fires from
    /// [`Self::tick_catch_up`].
    pub fn promote(&mut self, id: ServerId) -> Result<()> {
        if self.role() != Role::Leader {
            return Err(RaftError::NotLeader);
        }
        let server = self.configuration.get(id).ok_or(RaftError::UnknownServer { server_id: id.get() })?;
        if server.role == ServerRole::Voter {
            return Err(RaftError::AlreadyVoter { server_id: id.get() });
        }
        if self.role.as_leader().and_then(|l| l.catch_up.as_ref()).is_some() {
            return Err(RaftError::MembershipChangeInProgress { server_id: id.get() });
        }
        let last_log_index = self.log.last_index();
        if let Some(leader) = self.role.as_leader_mut() {
            leader.catch_up = Some(CatchUp::start(id, last_log_index));
        }
        info!(id = %id, "starting catch-up rounds");
        Ok(())
    }

    /// Remove a server from the configuration: goes through
    /// joint consensus the same way promotion does.
    pub fn remove_server(&mut self, id: ServerId) -> Result<()> {
        if self.role() != Role::Leader {
            return Err(RaftError::NotLeader);
        }
        if self.configuration.get(id).is_none() {
            return Err(RaftError::UnknownServer { server_id: id.get() });
        }
        let new_servers: Vec<ConfigurationServer> =
            self.configuration.all_servers().into_iter().filter(|s| s.id != id).cloned().collect();
        let payload = bincode::serde::encode_to_vec(&new_servers, bincode::config::standard())?;
        self.leader_append(EntryKind::Configuration, payload)?;
        if let Some(leader) = self.role.as_leader_mut() {
            leader.progress.remove(&id);
            if leader.catch_up.as_ref().map(|c| c.promotee_id) == Some(id) {
                leader.catch_up = None;
            }
        }
        Ok(())
    }

    /// Driver-observable status of an in-flight promotion, if any.
    pub fn membership_change_status(&self) -> Option<(ServerId, u32, u32)> {
        self.role
            .as_leader()
            .and_then(|l| l.catch_up.as_ref())
            .map(|c| (c.promotee_id, c.round_number, c.round_duration))
    }

    /// Leader-only: drive the active catch-up round, if any, one tick
    /// forward.
    pub(crate) fn tick_catch_up(&mut self) {
        let Some((promotee_id, match_index)) = self.role.as_leader().and_then(|l| {
            let catch_up = l.catch_up.as_ref()?;
            let match_index = l.progress.get(&catch_up.promotee_id).map(|p| p.match_index).unwrap_or(0);
            Some((catch_up.promotee_id, match_index))
        }) else {
            return;
        };

        let round_timeout = self.config.catch_up_round_timeout_ticks;
        let max_rounds = self.config.max_catch_up_rounds;
        let outcome = self
            .role
            .as_leader_mut()
            .and_then(|l| l.catch_up.as_mut())
            .map(|c| c.tick(match_index, round_timeout, max_rounds));

        match outcome {
            Some(RoundOutcome::InProgress) | None => {}
            Some(RoundOutcome::CaughtUp) => self.begin_promotion_commit(promotee_id),
            Some(RoundOutcome::TimedOut) => {
                let last_index = self.log.last_index();
                if let Some(catch_up) = self.role.as_leader_mut().and_then(|l| l.catch_up.as_mut()) {
                    catch_up.begin_next_round(last_index);
                }
            }
            Some(RoundOutcome::Abandoned) => {
                if let Some(leader) = self.role.as_leader_mut() {
                    leader.catch_up = None;
                }
                warn!(id = %promotee_id, "abandoning promotion after exceeding max catch-up rounds");
                self.emit(CoreEvent::PromotionAbandoned(promotee_id));
            }
        }
    }

    /// Phase 2 of a membership change: append the joint-consensus
    /// configuration entry promoting `promotee_id` to voter.
    fn begin_promotion_commit(&mut self, promotee_id: ServerId) {
        if let Some(leader) = self.role.as_leader_mut() {
            leader.catch_up = None;
        }
        let mut new_servers: Vec<ConfigurationServer> =
            self.configuration.all_servers().into_iter().cloned().collect();
        for server in new_servers.iter_mut() {
            if server.id == promotee_id {
                server.role = ServerRole::Voter;
            }
        }
        let Ok(payload) = bincode::serde::encode_to_vec(&new_servers, bincode::config::standard()) else {
            warn!(id = %promotee_id, "failed to encode promotion configuration entry");
            return;
        };
        info!(id = %promotee_id, "caught up, appending promotion entry");
        let _ = self.leader_append(EntryKind::Configuration, payload);
    }
}
