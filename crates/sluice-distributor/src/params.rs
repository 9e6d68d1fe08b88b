//! Tunable loop bounds and deadlines of the distributor.

use serde::{Deserialize, Serialize};

use sluice_core::constants::{
    CLAIM_MANY_MAX_ACCOUNTS, CLAIM_MAX_ITERATIONS, EPOCH_SEARCH_MAX_ITERATIONS,
    SUPPLY_CHECKPOINT_MAX_WEEKS, TOKEN_CHECKPOINT_DEADLINE, TOKEN_CHECKPOINT_MAX_WEEKS,
};

/// Caps on every bounded loop plus the public token-checkpoint cooldown.
///
/// Missing fields deserialize to their defaults, so a partial table in a
/// config file only overrides what it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributorParams {
    /// Seconds that must strictly elapse after `last_token_time` before a
    /// public token checkpoint (or an implicit one during claim/deposit).
    pub token_checkpoint_deadline: u64,
    pub token_checkpoint_max_weeks: u32,
    pub supply_checkpoint_max_weeks: u32,
    pub claim_max_iterations: u32,
    pub epoch_search_max_iterations: u32,
    pub claim_many_max: usize,
}

impl Default for DistributorParams {
    fn default() -> Self {
        Self {
            token_checkpoint_deadline: TOKEN_CHECKPOINT_DEADLINE,
            token_checkpoint_max_weeks: TOKEN_CHECKPOINT_MAX_WEEKS,
            supply_checkpoint_max_weeks: SUPPLY_CHECKPOINT_MAX_WEEKS,
            claim_max_iterations: CLAIM_MAX_ITERATIONS,
            epoch_search_max_iterations: EPOCH_SEARCH_MAX_ITERATIONS,
            claim_many_max: CLAIM_MANY_MAX_ACCOUNTS,
        }
    }
}

impl DistributorParams {
    /// Reject caps that would make an operation unable to progress.
    pub fn validate(&self) -> Result<(), String> {
        if self.token_checkpoint_max_weeks == 0 {
            return Err("token_checkpoint_max_weeks must be positive".into());
        }
        if self.supply_checkpoint_max_weeks == 0 {
            return Err("supply_checkpoint_max_weeks must be positive".into());
        }
        if self.claim_max_iterations == 0 {
            return Err("claim_max_iterations must be positive".into());
        }
        if self.epoch_search_max_iterations < 64 {
            return Err("epoch_search_max_iterations must cover a u64 range (>= 64)".into());
        }
        Ok(())
    }
}
