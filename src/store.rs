//! In-memory reference `Driver` implementation (SPEC_FULL.md §1 "[ADDED]").
//!
//! Exists for tests and doctests only — a production host is expected to
//! back `persist_entries`/`persist_term_and_vote` with real disk I/O and
//! `send` with a real transport. This implementation completes every
//! request synchronously (no actual asynchrony), which is sufficient to
//! drive [`crate::core::RaftCore`] deterministically in a test harness.

use crate::driver::{CorrelationId, Driver, OutboundMessage};
use crate::configuration::Configuration;
use crate::ids::{LogIndex, ServerId, Term};
use crate::log::LogEntry;
use std::collections::VecDeque;

/// A completed driver request, as captured by [`MemoryDriver`] for the test
/// harness to replay back into the core via the matching `on_*_complete`
/// method.
#[derive(Debug, Clone)]
pub enum Completion {
    PersistedTermAndVote(CorrelationId),
    PersistedEntries(CorrelationId, LogIndex),
    Sent(CorrelationId, ServerId, OutboundMessage),
    InstalledSnapshot(CorrelationId),
}

/// An in-memory `LogStore` + `SnapshotStore` + `Transport` stand-in, all in
/// one type for test convenience.
#[derive(Debug, Default)]
pub struct MemoryDriver {
    pub current_term: Term,
    pub voted_for: Option<ServerId>,
    pub entries: Vec<LogEntry>,
    pub last_snapshot: Option<(LogIndex, Term, Configuration, Vec<u8>)>,
    completions: VecDeque<Completion>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain every completion recorded since the last drain, in request
    /// order — the harness feeds these back into the core.
    pub fn drain_completions(&mut self) -> Vec<Completion> {
        self.completions.drain(..).collect()
    }
}

impl Driver for MemoryDriver {
    fn persist_term_and_vote(&mut self, correlation_id: CorrelationId, term: Term, voted_for: Option<ServerId>) {
        self.current_term = term;
        self.voted_for = voted_for;
        self.completions.push_back(Completion::PersistedTermAndVote(correlation_id));
    }

    fn persist_entries(&mut self, correlation_id: CorrelationId, entries: Vec<LogEntry>) {
        let durable_index = entries.last().map(|e| e.index).unwrap_or(0);
        self.entries.extend(entries);
        self.completions.push_back(Completion::PersistedEntries(correlation_id, durable_index));
    }

    fn send(&mut self, correlation_id: CorrelationId, to: ServerId, message: OutboundMessage) {
        self.completions.push_back(Completion::Sent(correlation_id, to, message));
    }

    fn install_snapshot(
        &mut self,
        correlation_id: CorrelationId,
        last_index: LogIndex,
        last_term: Term,
        configuration: Configuration,
        data: Vec<u8>,
    ) {
        self.last_snapshot = Some((last_index, last_term, configuration, data));
        self.completions.push_back(Completion::InstalledSnapshot(correlation_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_entries_records_durable_index_and_completion() {
        let mut driver = MemoryDriver::new();
        driver.persist_entries(1, vec![LogEntry::new(1, 1, crate::log::EntryKind::Barrier, vec![])]);
        let completions = driver.drain_completions();
        assert_eq!(completions.len(), 1);
        assert!(matches!(completions[0], Completion::PersistedEntries(1, 1)));
        assert_eq!(driver.entries.len(), 1);
    }
}
