//! In-memory multi-node test harness: wires several `RaftCore` instances
//! together over `MemoryDriver`s and an in-process message bus, driving
//! ticks and RPC delivery deterministically. Used by `invariants.rs` and
//! `scenarios.rs`.

use raftcore::{
    AppendEntries, AppendEntriesResult, Configuration, ConfigurationServer, CoreEvent,
    InstallSnapshot, InstallSnapshotResult, OutboundMessage, RaftConfig, RaftCore, RequestVote,
    RequestVoteResult, ServerId, ServerRole,
};
use raftcore::store::{Completion, MemoryDriver};
use raftcore::LogEntry;
use std::collections::{HashMap, VecDeque};

pub fn sid(n: u64) -> ServerId {
    ServerId::new(n).unwrap()
}

/// A single node: its core plus the in-memory driver standing in for its
/// log store, snapshot store and transport.
pub struct Node {
    pub core: RaftCore,
    pub driver: MemoryDriver,
}

/// A fleet of nodes sharing one [`Configuration`], wired through an
/// in-process message queue. Deterministic: every core shares the same
/// `election_timeout_seed` derivation (seeded per node id) so scenario
/// replays are reproducible.
pub struct Harness {
    pub nodes: Vec<Node>,
    inbox: VecDeque<(ServerId, ServerId, InboundMessage)>,
    /// Every entry each node has observed via `CoreEvent::Commit`, in
    /// delivery order — used to check state-machine safety.
    pub committed: HashMap<ServerId, Vec<LogEntry>>,
}

#[derive(Debug, Clone)]
pub enum InboundMessage {
    RequestVote(RequestVote),
    RequestVoteResult(RequestVoteResult),
    AppendEntries(AppendEntries),
    AppendEntriesResult(AppendEntriesResult),
    InstallSnapshot(InstallSnapshot),
    InstallSnapshotResult(InstallSnapshotResult),
}

impl Harness {
    /// Build a harness with `ids.len()` voters, each given a distinct
    /// election timeout seed so ties are rare but reproducible.
    pub fn new(ids: &[u64]) -> Self {
        Self::with_config(ids, |_| RaftConfig::default())
    }

    pub fn with_config(ids: &[u64], mut config_for: impl FnMut(u64) -> RaftConfig) -> Self {
        let servers: Vec<ConfigurationServer> = ids
            .iter()
            .map(|id| ConfigurationServer { id: sid(*id), address: format!("n{id}"), role: ServerRole::Voter })
            .collect();

        let nodes = ids
            .iter()
            .map(|id| {
                let mut config = config_for(*id);
                config.election_timeout_seed = *id;
                let mut core =
                    RaftCore::new(sid(*id), format!("n{id}"), Configuration::new(servers.clone()), config)
                        .unwrap();
                core.start();
                Node { core, driver: MemoryDriver::new() }
            })
            .collect();

        Self { nodes, inbox: VecDeque::new(), committed: HashMap::new() }
    }

    fn node_mut(&mut self, id: ServerId) -> &mut Node {
        self.nodes.iter_mut().find(|n| n.core.id() == id).expect("unknown node id")
    }

    /// Advance every node's tick, draining and routing whatever events that
    /// produces. This is the harness's only notion of time: one `tick()`
    /// call is one unit.
    pub fn tick_all(&mut self) {
        let ids: Vec<ServerId> = self.nodes.iter().map(|n| n.core.id()).collect();
        for id in ids {
            self.node_mut(id).core.on_tick();
            self.drain_and_route(id);
        }
        self.deliver_all();
    }

    pub fn tick_times(&mut self, n: u32) {
        for _ in 0..n {
            self.tick_all();
        }
    }

    /// Drain a node's `CoreEvent`s, feeding persistence requests straight
    /// through its `MemoryDriver` and completion back into the core, and
    /// queuing `Send` events for delivery.
    fn drain_and_route(&mut self, id: ServerId) {
        let events = self.node_mut(id).core.drain_events();
        for event in events {
            match event {
                CoreEvent::PersistTermAndVote(cid, term, voted_for) => {
                    self.node_mut(id).driver.persist_term_and_vote(cid, term, voted_for);
                    self.apply_completions(id);
                }
                CoreEvent::PersistEntries(cid, entries) => {
                    let durable = entries.last().map(|e| e.index).unwrap_or(0);
                    self.node_mut(id).driver.persist_entries(cid, entries);
                    self.node_mut(id).core.on_persist_entries_complete(cid, durable);
                    self.drain_and_route(id);
                    self.apply_completions(id);
                }
                CoreEvent::Send(cid, message) => {
                    let to = message_target(&message);
                    self.node_mut(id).driver.send(cid, to, message.clone());
                    self.node_mut(id).core.on_send_complete(cid);
                    self.inbox.push_back((id, to, to_inbound(message)));
                    self.apply_completions(id);
                }
                CoreEvent::InstallSnapshotToStore(cid, last_index, last_term, config, data) => {
                    self.node_mut(id).driver.install_snapshot(cid, last_index, last_term, config, data);
                    self.node_mut(id).core.on_install_snapshot_complete(cid);
                    self.drain_and_route(id);
                    self.apply_completions(id);
                }
                CoreEvent::Commit(entry) => {
                    self.committed.entry(id).or_default().push(entry);
                }
                CoreEvent::RoleChanged(_) | CoreEvent::ApplyCompleted(_, _) | CoreEvent::PromotionAbandoned(_) => {}
            }
        }
    }

    fn apply_completions(&mut self, id: ServerId) {
        for completion in self.node_mut(id).driver.drain_completions() {
            match completion {
                Completion::PersistedTermAndVote(cid) => {
                    self.node_mut(id).core.on_persist_term_vote_complete(cid);
                    self.drain_and_route(id);
                }
                Completion::PersistedEntries(_, _) | Completion::Sent(_, _, _) | Completion::InstalledSnapshot(_) => {}
            }
        }
    }

    fn deliver_all(&mut self) {
        while let Some((from, to, message)) = self.inbox.pop_front() {
            let _ = from;
            match message {
                InboundMessage::RequestVote(m) => self.node_mut(to).core.on_request_vote(m),
                InboundMessage::RequestVoteResult(m) => self.node_mut(to).core.on_request_vote_result(m),
                InboundMessage::AppendEntries(m) => self.node_mut(to).core.on_append_entries(m),
                InboundMessage::AppendEntriesResult(m) => self.node_mut(to).core.on_append_entries_result(m),
                InboundMessage::InstallSnapshot(m) => self.node_mut(to).core.on_install_snapshot(m),
                InboundMessage::InstallSnapshotResult(m) => self.node_mut(to).core.on_install_snapshot_result(m),
            }
            self.drain_and_route(to);
        }
    }

    pub fn node(&self, id: u64) -> &RaftCore {
        &self.nodes.iter().find(|n| n.core.id() == sid(id)).unwrap().core
    }

    pub fn leader(&self) -> Option<&RaftCore> {
        self.nodes.iter().map(|n| &n.core).find(|c| c.role() == raftcore::Role::Leader)
    }

    pub fn leaders_in_term(&self, term: u64) -> Vec<&RaftCore> {
        self.nodes
            .iter()
            .map(|n| &n.core)
            .filter(|c| c.role() == raftcore::Role::Leader && c.current_term() == term)
            .collect()
    }

    /// Submit a command on the current leader, if any, and drive it through
    /// persistence/replication. No-op if no node currently believes itself
    /// leader.
    pub fn submit_on_leader(&mut self, command: Vec<u8>) -> Option<raftcore::ProposeTicket> {
        let leader_id = self.leader()?.id();
        let ticket = self.node_mut(leader_id).core.submit(command).ok()?;
        self.drain_and_route(leader_id);
        self.deliver_all();
        Some(ticket)
    }
}

fn message_target(message: &OutboundMessage) -> ServerId {
    match message {
        OutboundMessage::RequestVote(to, _) => *to,
        OutboundMessage::RequestVoteResult(to, _) => *to,
        OutboundMessage::AppendEntries(to, _) => *to,
        OutboundMessage::AppendEntriesResult(to, _) => *to,
        OutboundMessage::InstallSnapshot(to, _) => *to,
        OutboundMessage::InstallSnapshotResult(to, _) => *to,
        OutboundMessage::TimeoutNow(to, _) => *to,
    }
}

fn to_inbound(message: OutboundMessage) -> InboundMessage {
    match message {
        OutboundMessage::RequestVote(_, m) => InboundMessage::RequestVote(m),
        OutboundMessage::RequestVoteResult(_, m) => InboundMessage::RequestVoteResult(m),
        OutboundMessage::AppendEntries(_, m) => InboundMessage::AppendEntries(m),
        OutboundMessage::AppendEntriesResult(_, m) => InboundMessage::AppendEntriesResult(m),
        OutboundMessage::InstallSnapshot(_, m) => InboundMessage::InstallSnapshot(m),
        OutboundMessage::InstallSnapshotResult(_, m) => InboundMessage::InstallSnapshotResult(m),
        OutboundMessage::TimeoutNow(_, _) => unreachable!("TimeoutNow is not exercised by the harness"),
    }
}

#[test]
fn three_node_cluster_elects_a_leader_after_timeout() {
    let mut h = Harness::new(&[1, 2, 3]);
    h.tick_times(25);
    assert!(h.leader().is_some());
}
