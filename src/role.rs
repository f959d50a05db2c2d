//! The role state machine.
//!
//! The legal transitions and per-role allocate/release pairing mirror the
//! original C `raft` library's `convert.c`, but the union-like `struct raft`
//! with a tag byte becomes a sum type — `RoleState` — so "holding leader
//! state while being a follower" is unrepresentable.

use crate::apply::ApplyQueue;
use crate::ids::{Address, LogIndex, ServerId};
use crate::membership::CatchUp;
use crate::progress::Progress;
use std::collections::HashMap;

/// State held only while `follower`.
#[derive(Debug, Clone, Default)]
pub struct FollowerState {
    /// Cleared on entering `follower`; set by the first valid
    /// `AppendEntries` received in the current term.
    pub current_leader: Option<(ServerId, Address)>,
}

/// State held only while `candidate`.
#[derive(Debug, Clone, Default)]
pub struct CandidateState {
    /// Grants received in the current election, including the
    /// self-vote cast on entry.
    pub votes: HashMap<ServerId, bool>,
}

impl CandidateState {
    pub fn grant_count(&self) -> usize {
        self.votes.values().filter(|granted| **granted).count()
    }
}

/// State held only while `leader`.
#[derive(Debug, Default)]
pub struct LeaderState {
    pub progress: HashMap<ServerId, Progress>,
    pub catch_up: Option<CatchUp>,
    pub pending_applies: ApplyQueue,
}

impl LeaderState {
    pub fn new(peers: impl Iterator<Item = ServerId>, last_log_index: LogIndex) -> Self {
        let progress = peers.map(|id| (id, Progress::new(last_log_index))).collect();
        Self { progress, catch_up: None, pending_applies: ApplyQueue::new() }
    }
}

/// The role state machine. Exactly one variant is live at a time; a
/// transition consumes the old variant and produces the new one.
#[derive(Debug)]
pub enum RoleState {
    /// Initial/final state — also the recovery target after a failed
    /// per-role allocation.
    Unavailable,
    Follower(FollowerState),
    Candidate(CandidateState),
    Leader(Box<LeaderState>),
}

impl Default for RoleState {
    fn default() -> Self {
        RoleState::Unavailable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Unavailable,
    Follower,
    Candidate,
    Leader,
}

impl RoleState {
    pub fn role(&self) -> Role {
        match self {
            RoleState::Unavailable => Role::Unavailable,
            RoleState::Follower(_) => Role::Follower,
            RoleState::Candidate(_) => Role::Candidate,
            RoleState::Leader(_) => Role::Leader,
        }
    }

    pub fn as_follower(&self) -> Option<&FollowerState> {
        match self {
            RoleState::Follower(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_follower_mut(&mut self) -> Option<&mut FollowerState> {
        match self {
            RoleState::Follower(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_candidate(&self) -> Option<&CandidateState> {
        match self {
            RoleState::Candidate(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_candidate_mut(&mut self) -> Option<&mut CandidateState> {
        match self {
            RoleState::Candidate(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_leader(&self) -> Option<&LeaderState> {
        match self {
            RoleState::Leader(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_leader_mut(&mut self) -> Option<&mut LeaderState> {
        match self {
            RoleState::Leader(s) => Some(s),
            _ => None,
        }
    }

    /// Legal transitions, asserted exhaustively. Returns the list of pending
    /// apply tickets that must be failed with `leadership-lost` if `self`
    /// was `Leader`.
    fn assert_legal(from: Role, to: Role) {
        let legal = matches!(
            (from, to),
            (Role::Unavailable, Role::Follower)
                | (Role::Follower, Role::Candidate)
                | (Role::Candidate, Role::Candidate)
                | (Role::Candidate, Role::Follower)
                | (Role::Candidate, Role::Leader)
                | (Role::Candidate, Role::Unavailable)
                | (Role::Leader, Role::Follower)
                | (Role::Leader, Role::Unavailable)
                | (Role::Follower, Role::Unavailable)
        );
        assert!(legal, "illegal role transition {from:?} -> {to:?}");
    }

    /// Release the current role's state (draining any leader apply queue
    /// for the caller to fail) and install `follower`.
    pub fn to_follower(&mut self) -> Vec<crate::apply::ProposeTicket> {
        Self::assert_legal(self.role(), Role::Follower);
        let drained = self.drain_leader_applies();
        *self = RoleState::Follower(FollowerState::default());
        drained
    }

    pub fn to_candidate(&mut self, self_id: ServerId) {
        Self::assert_legal(self.role(), Role::Candidate);
        let mut candidate = CandidateState::default();
        candidate.votes.insert(self_id, true);
        *self = RoleState::Candidate(candidate);
    }

    pub fn to_leader(&mut self, peers: impl Iterator<Item = ServerId>, last_log_index: LogIndex) {
        Self::assert_legal(self.role(), Role::Leader);
        *self = RoleState::Leader(Box::new(LeaderState::new(peers, last_log_index)));
    }

    pub fn to_unavailable(&mut self) -> Vec<crate::apply::ProposeTicket> {
        Self::assert_legal(self.role(), Role::Unavailable);
        let drained = self.drain_leader_applies();
        *self = RoleState::Unavailable;
        drained
    }

    fn drain_leader_applies(&mut self) -> Vec<crate::apply::ProposeTicket> {
        match self {
            RoleState::Leader(leader) => leader.pending_applies.drain_all(),
            _ => Vec::new(),
        }
    }
}
