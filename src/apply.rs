//! Apply pipeline: tracks in-flight client proposals awaiting commit.
//!
//! Only a leader holds pending applies — on role exit they are drained and
//! failed with [`ApplyOutcome::LeadershipLost`].

use crate::ids::{LogIndex, Term};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Committed,
    LeadershipLost,
}

/// A client proposal awaiting commit, keyed by the `(term, index)` of the
/// entry it was appended as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposeTicket {
    pub term: Term,
    pub index: LogIndex,
}

/// Owned, index-ordered collection of pending applies.
#[derive(Debug, Default)]
pub struct ApplyQueue {
    pending: BTreeMap<LogIndex, Term>,
}

impl ApplyQueue {
    pub fn new() -> Self {
        Self { pending: BTreeMap::new() }
    }

    pub fn insert(&mut self, ticket: ProposeTicket) {
        self.pending.insert(ticket.index, ticket.term);
    }

    /// Drain and return every pending ticket whose index is `<= commit_index`,
    /// in index order, to be signalled [`ApplyOutcome::Committed`].
    pub fn drain_committed(&mut self, commit_index: LogIndex) -> Vec<ProposeTicket> {
        let to_remove: Vec<LogIndex> = self
            .pending
            .range(..=commit_index)
            .map(|(index, _)| *index)
            .collect();
        to_remove
            .into_iter()
            .map(|index| {
                let term = self.pending.remove(&index).unwrap();
                ProposeTicket { term, index }
            })
            .collect()
    }

    /// Drain every remaining pending ticket, in index order, to be
    /// signalled [`ApplyOutcome::LeadershipLost`] (called on leader exit).
    pub fn drain_all(&mut self) -> Vec<ProposeTicket> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(index, term)| ProposeTicket { term, index })
            .collect()
    }

    /// A conflict truncation erased a pending record at this index: drop it
    /// silently without signalling.
    pub fn discard(&mut self, index: LogIndex) {
        self.pending.remove(&index);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
