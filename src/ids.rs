use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;

/// A server's stable, cluster-wide unique identifier.
///
/// Non-zero is a type-level invariant rather than a runtime check, unlike
/// the original C `struct raft`'s `unsigned id` which relies on `id == 0`
/// meaning "unset".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerId(NonZeroU64);

impl ServerId {
    pub fn new(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(ServerId)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u64> for ServerId {
    type Error = &'static str;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        ServerId::new(value).ok_or("server id must be non-zero")
    }
}

/// Opaque network address, never interpreted by the core.
pub type Address = String;

/// Monotonically increasing Raft term.
pub type Term = u64;

/// 1-based log index; 0 means "no entry".
pub type LogIndex = u64;
