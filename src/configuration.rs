//! Cluster configuration and joint consensus.


use crate::ids::{Address, ServerId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerRole {
    /// Counts toward quorum.
    Voter,
    /// Replicates but does not vote.
    NonVoter,
    /// Neither replicates-for-quorum nor votes; a parked member.
    Spare,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationServer {
    pub id: ServerId,
    pub address: Address,
    pub role: ServerRole,
}

/// The set of servers and their roles, with an optional joint-consensus
/// overlay.
///
/// During joint consensus `new` is `Some`, and agreement requires a
/// majority in *both* `servers` (C_old) and `new` (C_new) — see
/// [`Self::has_quorum`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    servers: Vec<ConfigurationServer>,
    new: Option<Vec<ConfigurationServer>>,
}

impl Configuration {
    pub fn new(servers: Vec<ConfigurationServer>) -> Self {
        Self { servers, new: None }
    }

    pub fn is_joint(&self) -> bool {
        self.new.is_some()
    }

    pub fn servers(&self) -> &[ConfigurationServer] {
        &self.servers
    }

    pub fn get(&self, id: ServerId) -> Option<&ConfigurationServer> {
        self.servers.iter().find(|s| s.id == id)
            .or_else(|| self.new.as_ref().and_then(|n| n.iter().find(|s| s.id == id)))
    }

    /// All servers the leader must replicate to: union of C_old and C_new
    /// while joint consensus is active.
    pub fn all_servers(&self) -> Vec<&ConfigurationServer> {
        let mut out: Vec<&ConfigurationServer> = self.servers.iter().collect();
        if let Some(new) = &self.new {
            for s in new {
                if !out.iter().any(|existing| existing.id == s.id) {
                    out.push(s);
                }
            }
        }
        out
    }

    fn n_voting_in(servers: &[ConfigurationServer]) -> usize {
        servers.iter().filter(|s| s.role == ServerRole::Voter).count()
    }

    pub fn n_voting(&self) -> usize {
        Self::n_voting_in(&self.servers)
    }

    fn majority_in(servers: &[ConfigurationServer], has: impl Fn(ServerId) -> bool) -> bool {
        let voters: Vec<&ConfigurationServer> = servers.iter().filter(|s| s.role == ServerRole::Voter).collect();
        if voters.is_empty() {
            return true;
        }
        let count = voters.iter().filter(|s| has(s.id)).count();
        count * 2 > voters.len()
    }

    /// True iff `has(id)` holds for a majority of voters in every active
    /// voter set (both C_old and C_new during joint consensus).
    pub fn has_quorum(&self, has: impl Fn(ServerId) -> bool + Copy) -> bool {
        let old_ok = Self::majority_in(&self.servers, has);
        match &self.new {
            None => old_ok,
            Some(new) => old_ok && Self::majority_in(new, has),
        }
    }

    /// Begin a joint-consensus transition to `new_servers`.
    pub fn begin_joint(&mut self, new_servers: Vec<ConfigurationServer>) {
        self.new = Some(new_servers);
    }

    /// Commit the joint-consensus transition: C_new becomes C_old.
    pub fn commit_joint(&mut self) {
        if let Some(new) = self.new.take() {
            self.servers = new;
        }
    }

    /// Add a new server directly to the active (non-joint) roster, outside
    /// of joint consensus — used for `add_server`, which admits a
    /// non-voting member without requiring a quorum.
    pub fn add_server(&mut self, server: ConfigurationServer) -> bool {
        if self.get(server.id).is_some() {
            return false;
        }
        self.servers.push(server);
        true
    }

    pub fn set_role(&mut self, id: ServerId, role: ServerRole) -> bool {
        let target = self.new.as_mut().unwrap_or(&mut self.servers);
        if let Some(server) = target.iter_mut().find(|s| s.id == id) {
            server.role = role;
            true
        } else {
            false
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, crate::error::RaftError> {
        Ok(bincode::serde::encode_to_vec(self, bincode::config::standard())?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, crate::error::RaftError> {
        let (config, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(config)
    }
}
