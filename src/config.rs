use serde::{Deserialize, Serialize};

/// Tunable parameters for a [`crate::core::RaftCore`] instance.
///
/// Timeouts are expressed in ticks rather than wall-clock `Duration`: the
/// core has no clock of its own and only ever observes time through
/// `tick()` calls from the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaftConfig {
    /// Minimum election timeout, in ticks. Randomized per election into
    /// `[election_timeout_min_ticks, election_timeout_max_ticks]`.
    pub election_timeout_min_ticks: u32,

    /// Maximum election timeout, in ticks.
    pub election_timeout_max_ticks: u32,

    /// Leader heartbeat interval, in ticks. Must be `< election_timeout_min_ticks`.
    pub heartbeat_interval_ticks: u32,

    /// Maximum number of catch-up rounds before a promotion is abandoned.
    pub max_catch_up_rounds: u32,

    /// Catch-up round timeout, in ticks. Equal to the election timeout
    /// maximum by default, but kept as a separate field so a host can widen it.
    pub catch_up_round_timeout_ticks: u32,

    /// Seed for the deterministic PRNG used to randomize election timeouts.
    /// Fixing this makes scenario replays reproducible.
    pub election_timeout_seed: u64,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            election_timeout_min_ticks: 10,
            election_timeout_max_ticks: 20,
            heartbeat_interval_ticks: 2,
            max_catch_up_rounds: 5,
            catch_up_round_timeout_ticks: 10,
            election_timeout_seed: 0,
        }
    }
}

impl RaftConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.election_timeout_min_ticks == 0 {
            return Err("election_timeout_min_ticks must be > 0".into());
        }
        if self.election_timeout_min_ticks > self.election_timeout_max_ticks {
            return Err("election_timeout_min_ticks must be <= election_timeout_max_ticks".into());
        }
        if self.heartbeat_interval_ticks == 0
            || self.heartbeat_interval_ticks >= self.election_timeout_min_ticks
        {
            return Err("heartbeat_interval_ticks must be > 0 and < election_timeout_min_ticks".into());
        }
        if self.max_catch_up_rounds == 0 {
            return Err("max_catch_up_rounds must be > 0".into());
        }
        Ok(())
    }
}
