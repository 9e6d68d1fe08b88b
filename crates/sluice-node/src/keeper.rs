//! Caller-side driver for the multi-call catch-up protocol.
//!
//! Every distributor loop is bounded, so a long idle period is closed by
//! repeating calls. The [`Keeper`] repeats supply and token checkpoints until
//! they report caught up, and repeats an account's claim until its receipt
//! says no further call is needed. Each driver stops after `max_rounds`.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use sluice_core::error::{CheckpointError, SluiceError};
use sluice_core::store::DistributorStore;
use sluice_core::types::AccountId;
use sluice_distributor::FeeDistributor;

/// Default cap on repeated calls per driver.
pub const DEFAULT_MAX_ROUNDS: u32 = 64;

/// Outcome of one driver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct KeeperReport {
    /// Calls made.
    pub rounds: u32,
    /// Amount moved: tokens attributed for checkpoints, value settled for claims.
    pub amount: u64,
    pub caught_up: bool,
}

/// Repeats bounded distributor operations until they catch up.
pub struct Keeper<S: DistributorStore> {
    distributor: Arc<FeeDistributor<S>>,
    max_rounds: u32,
}

impl<S: DistributorStore> Keeper<S> {
    pub fn new(distributor: Arc<FeeDistributor<S>>) -> Self {
        Self { distributor, max_rounds: DEFAULT_MAX_ROUNDS }
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn distributor(&self) -> &Arc<FeeDistributor<S>> {
        &self.distributor
    }

    /// Snapshot every pending week.
    pub fn catch_up_supply(&self) -> Result<KeeperReport, SluiceError> {
        let mut report = KeeperReport::default();
        while report.rounds < self.max_rounds {
            let cp = self.distributor.checkpoint_total_supply()?;
            report.rounds += 1;
            report.amount += u64::from(cp.weeks);
            if cp.caught_up {
                report.caught_up = true;
                break;
            }
        }
        debug!(rounds = report.rounds, weeks = report.amount, "keeper: supply");
        Ok(report)
    }

    /// Attribute pending funds. Stops early, not caught up, when the public
    /// checkpoint is cooling down.
    pub fn catch_up_tokens(&self) -> Result<KeeperReport, SluiceError> {
        let mut report = KeeperReport::default();
        while report.rounds < self.max_rounds {
            match self.distributor.checkpoint_token() {
                Ok(cp) => {
                    report.rounds += 1;
                    report.amount = report.amount.saturating_add(cp.attributed);
                    if cp.caught_up {
                        report.caught_up = true;
                        break;
                    }
                }
                Err(SluiceError::Checkpoint(CheckpointError::Cooldown { ready_after, .. })) => {
                    debug!(ready_after, "keeper: token checkpoint cooling down");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Claim for `account` until its receipt reports caught up.
    pub fn claim_fully(&self, caller: &AccountId, account: &AccountId, relock: bool) -> Result<KeeperReport, SluiceError> {
        let mut report = KeeperReport::default();
        while report.rounds < self.max_rounds {
            let receipt = self.distributor.claim_with_receipt(caller, Some(account), relock)?;
            report.rounds += 1;
            report.amount = report
                .amount
                .checked_add(receipt.amount)
                .ok_or(SluiceError::ArithmeticOverflow)?;
            if !receipt.needs_another_call() {
                report.caught_up = true;
                break;
            }
        }
        info!(%account, rounds = report.rounds, amount = report.amount, caught_up = report.caught_up, "keeper: claim");
        Ok(report)
    }

    /// Supply first, then tokens.
    pub fn tick(&self) -> Result<(KeeperReport, KeeperReport), SluiceError> {
        let supply = self.catch_up_supply()?;
        let tokens = self.catch_up_tokens()?;
        Ok((supply, tokens))
    }
}
