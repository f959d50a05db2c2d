//! The tick/driver component : the single
//! entry point the host drives with ticks, inbound RPCs and completion
//! events, and drains for outbound RPCs, persistence requests and commit
//! notifications.

use crate::apply::{ApplyOutcome, ProposeTicket};
use crate::configuration::{Configuration, ConfigurationServer};
use crate::config::RaftConfig;
use crate::driver::{CoreEvent, CorrelationId, OutboundMessage};
use crate::error::{RaftError, Result};
use crate::ids::{Address, LogIndex, ServerId, Term};
use crate::log::{EntryKind, LogEntry, RaftLog};
use crate::role::{Role, RoleState};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::trace;

/// An outbound RPC whose emission is deferred until a persistence request
/// it depends on has been confirmed durable.
pub(crate) struct DeferredSend {
    pub(crate) waits_on: CorrelationId,
    pub(crate) to: ServerId,
    pub(crate) message: OutboundMessage,
}

pub struct RaftCore {
    pub(crate) id: ServerId,
    pub(crate) address: Address,
    pub(crate) config: RaftConfig,
    pub(crate) rng: ChaCha8Rng,

    // Persistent state — the core's in-memory mirror; actual
    // durability is confirmed asynchronously by the driver.
    pub(crate) current_term: Term,
    pub(crate) voted_for: Option<ServerId>,
    pub(crate) log: RaftLog,
    pub(crate) configuration: Configuration,
    /// Index of the in-flight joint-consensus configuration entry, if any.
    pub(crate) pending_config_index: Option<LogIndex>,

    // Volatile state.

    pub(crate) commit_index: LogIndex,
    pub(crate) last_applied: LogIndex,
    pub(crate) role: RoleState,

    pub(crate) election_ticks_remaining: u32,
    pub(crate) heartbeat_ticks_remaining: u32,

    pub(crate) next_correlation_id: CorrelationId,
    pub(crate) deferred_sends: Vec<DeferredSend>,
    pub(crate) outbox: Vec<CoreEvent>,
}

impl RaftCore {
    /// Construct a new core in the `unavailable` state. Call [`Self::start`]
    /// to transition to `follower` and begin participating.
    pub fn new(id: ServerId, address: Address, configuration: Configuration, config: RaftConfig) -> Result<Self> {
        config.validate().map_err(RaftError::InvalidConfigurationChange)?;
        let rng = ChaCha8Rng::seed_from_u64(config.election_timeout_seed);
        Ok(Self {
            id,
            address,
            config,
            rng,
            current_term: 0,
            voted_for: None,
            log: RaftLog::new(),
            configuration,
            pending_config_index: None,
            commit_index: 0,
            last_applied: 0,
            role: RoleState::Unavailable,
            election_ticks_remaining: 0,
            heartbeat_ticks_remaining: 0,
            next_correlation_id: 1,
            deferred_sends: Vec::new(),
            outbox: Vec::new(),
        })
    }

    /// Restore a core from persisted state after a restart.
    pub fn from_persisted(
        id: ServerId,
        address: Address,
        configuration: Configuration,
        config: RaftConfig,
        current_term: Term,
        voted_for: Option<ServerId>,
        log: RaftLog,
        commit_index: LogIndex,
    ) -> Result<Self> {
        let mut core = Self::new(id, address, configuration, config)?;
        core.current_term = current_term;
        core.voted_for = voted_for;
        core.log = log;
        core.commit_index = commit_index;
        Ok(core)
    }

    pub fn start(&mut self) {
        assert_eq!(self.role.role(), Role::Unavailable, "start() called twice");
        self.enter_follower();
    }

    pub fn id(&self) -> ServerId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role.role()
    }

    pub fn current_term(&self) -> Term {
        self.current_term
    }

    pub fn commit_index(&self) -> LogIndex {
        self.commit_index
    }

    pub fn last_applied(&self) -> LogIndex {
        self.last_applied
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn log(&self) -> &RaftLog {
        &self.log
    }

    pub fn current_leader(&self) -> Option<(ServerId, Address)> {
        self.role.as_follower().and_then(|f| f.current_leader.clone())
    }

    /// Leader-only: the per-follower replication progress table, for
    /// observability and tests. `None` when not currently leader.
    pub fn leader_progress(&self) -> Option<&std::collections::HashMap<ServerId, crate::progress::Progress>> {
        self.role.as_leader().map(|l| &l.progress)
    }

    /// Drain every event accumulated since the last drain: outbound RPCs,
    /// persistence requests, commit/role-change notifications. The host is
    /// expected to call this after every driver-facing method.
    pub fn drain_events(&mut self) -> Vec<CoreEvent> {
        std::mem::take(&mut self.outbox)
    }

    pub(crate) fn emit(&mut self, event: CoreEvent) {
        self.outbox.push(event);
    }

    pub(crate) fn alloc_correlation_id(&mut self) -> CorrelationId {
        let id = self.next_correlation_id;
        self.next_correlation_id += 1;
        id
    }

    pub(crate) fn random_election_timeout_ticks(&mut self) -> u32 {
        self.rng.random_range(self.config.election_timeout_min_ticks..=self.config.election_timeout_max_ticks)
    }

    /// On entering `follower`: clear `current_leader`, reset
    /// the election timer to a fresh randomized timeout.
    pub(crate) fn enter_follower(&mut self) {
        let drained = self.role.to_follower();
        self.fail_applies(drained);
        self.reset_election_timer();
    }

    pub(crate) fn reset_election_timer(&mut self) {
        self.election_ticks_remaining = self.random_election_timeout_ticks();
    }

    /// Adopt a higher term observed from a peer, reverting to follower.
    /// Term adoption is monotonic.
    pub(crate) fn adopt_term_and_step_down(&mut self, term: Term) {
        debug_assert!(term >= self.current_term, "term adoption must be monotonic");
        if term > self.current_term {
            self.current_term = term;
            self.voted_for = None;
            self.persist_term_and_vote();
        }
        if self.role.role() != Role::Follower && self.role.role() != Role::Unavailable {
            self.enter_follower();
            self.emit(CoreEvent::RoleChanged(Role::Follower));
        }
    }

    pub(crate) fn persist_term_and_vote(&mut self) {
        let cid = self.alloc_correlation_id();
        self.emit(CoreEvent::PersistTermAndVote(cid, self.current_term, self.voted_for));
    }

    /// Queue an outbound RPC that must not be sent until the persistence
    /// request `waits_on` has completed.
    pub(crate) fn defer_send(&mut self, waits_on: CorrelationId, to: ServerId, message: OutboundMessage) {
        self.deferred_sends.push(DeferredSend { waits_on, to, message });
    }

    /// Release every deferred send waiting on `correlation_id`.
    pub(crate) fn flush_deferred(&mut self, correlation_id: CorrelationId) {
        let (ready, pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.deferred_sends).into_iter().partition(|d| d.waits_on == correlation_id);
        self.deferred_sends = pending;
        for deferred in ready {
            trace!(to = %deferred.to, "releasing deferred send");
            let cid = self.alloc_correlation_id();
            self.emit(CoreEvent::Send(cid, deferred.message));
        }
    }

    /// Replace the log prefix up to `up_to_index` with a host-supplied
    /// snapshot. `up_to_index` must not exceed `commit_index` — only
    /// committed entries may be compacted away.
    pub fn create_snapshot(&mut self, up_to_index: LogIndex, data: Vec<u8>) -> Result<()> {
        if up_to_index > self.commit_index {
            return Err(RaftError::InvalidConfigurationChange(
                "snapshot index must not exceed commit_index".into(),
            ));
        }
        let last_term = self.log.term_of(up_to_index).unwrap_or(0);
        let configuration = self.configuration.clone();
        self.log.truncate_prefix(up_to_index, last_term, configuration, data)
    }

    /// Apply the effect of appending (or receiving) a `Configuration` entry:
    /// begin a joint-consensus overlay. Shared by the leader appending its
    /// own entry and a follower replicating one.
    pub(crate) fn on_configuration_entry_appended(&mut self, index: LogIndex, payload: &[u8]) {
        if let Ok(new_servers) = bincode::serde::decode_from_slice::<Vec<ConfigurationServer>, _>(
            payload,
            bincode::config::standard(),
        ) {
            self.configuration.begin_joint(new_servers.0);
            self.pending_config_index = Some(index);
        }
    }

    /// On truncating the log suffix, revert any in-flight joint-consensus
    /// overlay whose entry was truncated away.
    pub(crate) fn on_truncate_suffix(&mut self, from_index: LogIndex) {
        if let Some(pending) = self.pending_config_index {
            if pending >= from_index {
                self.configuration = Configuration::new(self.configuration.servers().to_vec());
                self.pending_config_index = None;
            }
        }
    }

    /// Finalize a joint-consensus overlay whose entry has just committed.
    pub(crate) fn on_configuration_entry_committed(&mut self, index: LogIndex) {
        if self.pending_config_index == Some(index) {
            self.configuration.commit_joint();
            self.pending_config_index = None;
        }
    }

    /// Advance `commit_index` to `new_commit_index` (monotonic), finalize
    /// any joint-consensus entry that just committed, and notify the host
    /// of every newly committed entry in order.
    pub(crate) fn advance_commit_index_to(&mut self, new_commit_index: LogIndex) {
        if new_commit_index <= self.commit_index {
            return;
        }
        let previous = self.commit_index;
        self.commit_index = new_commit_index;

        for index in (previous + 1)..=new_commit_index {
            let Some((kind, entry)) = self.log.get(index).map(|e| (e.kind, e.clone())) else {
                continue;
            };
            if kind == EntryKind::Configuration {
                self.on_configuration_entry_committed(index);
            }
            self.emit(CoreEvent::Commit(entry));
        }

        if let Some(leader) = self.role.as_leader_mut() {
            for ticket in leader.pending_applies.drain_committed(new_commit_index) {
                self.outbox.push(CoreEvent::ApplyCompleted(ticket, ApplyOutcome::Committed));
            }
        }

        self.apply_up_to_commit();
    }

    /// Advance `last_applied` toward `commit_index` (L4: `last_applied`
    /// never exceeds `commit_index`). The host applies entries to its own
    /// state machine via `commit_notify`; this just tracks the cursor.
    pub(crate) fn apply_up_to_commit(&mut self) {
        if self.last_applied < self.commit_index {
            self.last_applied = self.commit_index;
        }
    }

    pub(crate) fn fail_applies(&mut self, tickets: Vec<ProposeTicket>) {
        for ticket in tickets {
            self.outbox.push(CoreEvent::ApplyCompleted(ticket, ApplyOutcome::LeadershipLost));
        }
    }

    /// Leader-only: append `entry` to the local log and request durable
    /// persistence. Returns the entry's index.
    pub(crate) fn leader_append(&mut self, kind: EntryKind, payload: Vec<u8>) -> Result<LogIndex> {
        if self.role.role() != Role::Leader {
            return Err(RaftError::NotLeader);
        }
        let index = self.log.last_index() + 1;
        let term = self.current_term;
        let entry = LogEntry::new(index, term, kind, payload);

        if entry.kind == EntryKind::Configuration {
            self.on_configuration_entry_appended(index, &entry.payload);
        }
        self.log.append(entry.clone())?;

        let cid = self.alloc_correlation_id();
        self.emit(CoreEvent::PersistEntries(cid, vec![entry]));
        Ok(index)
    }

    /// `submit(command)`: leader-only client proposal.
    pub fn submit(&mut self, command: Vec<u8>) -> Result<ProposeTicket> {
        let term = self.current_term;
        let index = self.leader_append(EntryKind::Command, command)?;
        let ticket = ProposeTicket { term, index };
        if let Some(leader) = self.role.as_leader_mut() {
            leader.pending_applies.insert(ticket);
        }
        Ok(ticket)
    }

    /// `tick()`: invoked at a driver-chosen cadence.
    pub fn on_tick(&mut self) {
        match self.role.role() {
            Role::Unavailable => {}
            Role::Follower | Role::Candidate => self.tick_election_timer(),
            Role::Leader => {
                self.tick_heartbeat();
                self.tick_catch_up();
            }
        }
    }
}
