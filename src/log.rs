//! In-core log model.
//!
//! This is the core's own cache of the log, not the durable copy — the
//! durable copy is owned by the host's `LogStore` and reached only through
//! `Driver::persist_entries`. The replication layer must not treat an entry
//! as replicated-locally until the driver confirms it durable (§4.5); that
//! confirmation is tracked separately as `durable_index` on [`RaftLog`].

use crate::error::{RaftError, Result};
use crate::ids::{LogIndex, Term};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// The kind of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// An opaque command for the host state machine.
    Command,
    /// A serialized [`crate::configuration::Configuration`] change.
    Configuration,
    /// The no-op barrier a new leader appends on election.
    Barrier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub index: LogIndex,
    pub term: Term,
    pub kind: EntryKind,
    pub payload: Vec<u8>,
}

impl LogEntry {
    pub fn new(index: LogIndex, term: Term, kind: EntryKind, payload: Vec<u8>) -> Self {
        Self { index, term, kind, payload }
    }

    pub fn barrier(index: LogIndex, term: Term) -> Self {
        Self::new(index, term, EntryKind::Barrier, Vec::new())
    }
}

/// Metadata for the latest snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub last_index: LogIndex,
    pub last_term: Term,
    pub configuration: crate::configuration::Configuration,
    /// Opaque host state-machine snapshot bytes, supplied by
    /// `RaftCore::create_snapshot` and carried verbatim in `InstallSnapshot`
    /// RPCs. The crate never interprets this payload.
    pub data: Vec<u8>,
}

/// Ordered, 1-based log of [`LogEntry`] values, addressed by `index`.
///
/// Invariant L1 (log matching): enforced transitively by [`Self::append`]
/// and [`Self::truncate_suffix`] rejecting any attempt to append at a
/// non-contiguous index.
/// Invariant L2 (leader append-only): the core never calls
/// `truncate_suffix` on its own log while leader; see `src/replication.rs`.
pub struct RaftLog {
    /// Entries with `index >= first_index`. Entry at position 0 has index
    /// `first_index`.
    entries: VecDeque<LogEntry>,
    first_index: LogIndex,
    snapshot: Option<SnapshotMeta>,
    /// Highest index the driver has confirmed durable. See module docs.
    durable_index: LogIndex,
}

impl RaftLog {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            first_index: 1,
            snapshot: None,
            durable_index: 0,
        }
    }

    pub fn last_index(&self) -> LogIndex {
        self.entries
            .back()
            .map(|e| e.index)
            .or_else(|| self.snapshot.as_ref().map(|s| s.last_index))
            .unwrap_or(0)
    }

    pub fn last_term(&self) -> Term {
        self.entries
            .back()
            .map(|e| e.term)
            .or_else(|| self.snapshot.as_ref().map(|s| s.last_term))
            .unwrap_or(0)
    }

    pub fn durable_index(&self) -> LogIndex {
        self.durable_index
    }

    pub fn set_durable_index(&mut self, index: LogIndex) {
        if index > self.durable_index {
            self.durable_index = index;
        }
    }

    fn offset_of(&self, index: LogIndex) -> Option<usize> {
        if index < self.first_index {
            return None;
        }
        Some((index - self.first_index) as usize)
    }

    pub fn get(&self, index: LogIndex) -> Option<&LogEntry> {
        self.offset_of(index).and_then(|off| self.entries.get(off))
    }

    pub fn term_of(&self, index: LogIndex) -> Option<Term> {
        if index == 0 {
            return Some(0);
        }
        if let Some(snap) = &self.snapshot {
            if index == snap.last_index {
                return Some(snap.last_term);
            }
        }
        self.get(index).map(|e| e.term)
    }

    /// Append a single entry. The entry's index must be exactly
    /// `last_index() + 1` — this is what keeps the log contiguous (L1).
    pub fn append(&mut self, entry: LogEntry) -> Result<()> {
        let expected = self.last_index() + 1;
        if entry.index != expected {
            return Err(RaftError::LogIndexMismatch { expected, actual: entry.index });
        }
        self.entries.push_back(entry);
        Ok(())
    }

    pub fn append_all(&mut self, entries: impl IntoIterator<Item = LogEntry>) -> Result<()> {
        for entry in entries {
            self.append(entry)?;
        }
        Ok(())
    }

    /// Truncate the log suffix starting at `from_index` (inclusive). Used
    /// on conflicting-append resolution . Never called by a
    /// leader on its own log (L2).
    pub fn truncate_suffix(&mut self, from_index: LogIndex) -> Result<()> {
        if from_index < self.first_index {
            return Err(RaftError::TruncateBeforeFirstIndex { first_index: self.first_index });
        }
        let offset = (from_index - self.first_index) as usize;
        self.entries.truncate(offset);
        self.durable_index = self.durable_index.min(self.last_index());
        Ok(())
    }

    /// Truncate the log prefix up to and including `up_to_index`, after a
    /// snapshot has been taken covering it.
    pub fn truncate_prefix(
        &mut self,
        up_to_index: LogIndex,
        last_term: Term,
        configuration: crate::configuration::Configuration,
        data: Vec<u8>,
    ) -> Result<()> {
        if up_to_index > self.last_index() {
            return Err(RaftError::SnapshotBeyondLastIndex { last_index: self.last_index() });
        }
        if up_to_index >= self.first_index {
            let drop_count = (up_to_index - self.first_index + 1) as usize;
            self.entries.drain(..drop_count);
            self.first_index = up_to_index + 1;
        }
        self.snapshot = Some(SnapshotMeta { last_index: up_to_index, last_term, configuration, data });
        Ok(())
    }

    /// Wholesale replacement of the log with an installed snapshot
    /// (follower side of InstallSnapshot).
    pub fn install_snapshot(&mut self, meta: SnapshotMeta) {
        self.entries.clear();
        self.first_index = meta.last_index + 1;
        self.durable_index = meta.last_index;
        self.snapshot = Some(meta);
    }

    pub fn snapshot(&self) -> Option<&SnapshotMeta> {
        self.snapshot.as_ref()
    }

    pub fn entries_from(&self, from_index: LogIndex, max_count: usize) -> Vec<LogEntry> {
        let Some(start_offset) = self.offset_of(from_index) else { return Vec::new() };
        self.entries.iter().skip(start_offset).take(max_count).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The first index of the run of entries at `term`, scanning backward
    /// from `from_index` (which must itself hold `term`) — used to build the
    /// `conflict_first_index` hint so the leader can skip the follower's
    /// whole conflicting term in one round instead of backing off one entry
    /// at a time.
    pub fn first_index_of_term(&self, term: Term, from_index: LogIndex) -> LogIndex {
        let mut idx = from_index;
        while idx > self.first_index {
            match self.term_of(idx - 1) {
                Some(t) if t == term => idx -= 1,
                _ => break,
            }
        }
        idx
    }
}

impl Default for RaftLog {
    fn default() -> Self {
        Self::new()
    }
}
