//! Shared fixtures for E2E and adversarial tests.

use std::sync::Arc;

use sluice_core::asset::MemoryAsset;
use sluice_core::clock::ManualClock;
use sluice_core::constants::WEEK;
use sluice_core::ledger::MemoryLedger;
use sluice_core::store::MemoryStore;
use sluice_core::traits::{AssetTransfer, DecayLedger};
use sluice_core::types::{AccountId, DistributorEvent, LockedBalance};
use sluice_distributor::{DistributorParams, FeeDistributor};

/// Maximum lock duration of the harness ledger.
pub const MAX_TIME: u64 = 8 * WEEK;

/// Deterministic account id for a label.
pub fn id(label: &str) -> AccountId {
    AccountId::derive(label)
}

/// Lock size with slope `units` at the harness ledger's maximum duration.
pub fn units(units: u64) -> u64 {
    units * MAX_TIME
}

/// A distributor wired to an in-memory ledger, asset and manual clock.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub asset: Arc<MemoryAsset>,
    pub ledger: Arc<MemoryLedger>,
    pub dist: Arc<FeeDistributor<MemoryStore>>,
}

impl Harness {
    pub fn new(start: u64) -> Self {
        Self::with_params(start, DistributorParams::default())
    }

    pub fn with_params(start: u64, params: DistributorParams) -> Self {
        let clock = Arc::new(ManualClock::new(start));
        let asset = Arc::new(MemoryAsset::new(id("asset")));
        let ledger = Arc::new(
            MemoryLedger::new(id("ledger"), asset.id(), clock.clone())
                .with_max_time(MAX_TIME)
                .with_asset(asset.clone()),
        );
        let dist = Arc::new(
            FeeDistributor::new(id("distributor"), MemoryStore::new(start), ledger.clone(), asset.clone(), clock.clone())
                .with_params(params),
        );
        Self { clock, asset, ledger, dist }
    }

    /// Move the clock to `ts` (never backwards).
    pub fn at(&self, ts: u64) {
        self.clock.set(ts);
    }

    /// Mint `amount` to `who` and lock all of it until `unlock_time`.
    pub fn lock(&self, who: &AccountId, amount: u64, unlock_time: u64) -> LockedBalance {
        self.asset.mint(who, amount).unwrap();
        self.asset.approve(who, &self.ledger.account(), u64::MAX).unwrap();
        self.ledger.create_lock(who, amount, unlock_time).unwrap()
    }

    /// Mint `amount` to `from` and deposit it through the distributor.
    pub fn deposit(&self, from: &AccountId, amount: u64) {
        self.asset.mint(from, amount).unwrap();
        self.asset.approve(from, &self.dist.account(), amount).unwrap();
        assert!(self.dist.deposit(from, Some(amount)).unwrap());
    }

    /// Send funds to the distributor without going through `deposit`.
    pub fn fund(&self, amount: u64) {
        self.asset.mint(&self.dist.account(), amount).unwrap();
    }

    pub fn balance(&self, who: &AccountId) -> u64 {
        self.asset.balance_of(who).unwrap()
    }

    /// Funding asset held by the distributor.
    pub fn held(&self) -> u64 {
        self.balance(&self.dist.account())
    }

    /// Sum of `tokens_per_week` over `[from, to)`.
    pub fn tokens_between(&self, from: u64, to: u64) -> u64 {
        self.dist.week_table(from, to).unwrap().iter().map(|w| w.tokens).sum()
    }

    /// Run supply and token checkpoints until both report caught up.
    pub fn catch_up(&self) {
        for _ in 0..64 {
            if self.dist.checkpoint_total_supply().unwrap().caught_up {
                break;
            }
        }
        for _ in 0..64 {
            match self.dist.checkpoint_token() {
                Ok(cp) if cp.caught_up => break,
                Ok(_) => {}
                Err(_) => break,
            }
        }
    }

    /// Claim for `who` until it reports caught up. Returns the total paid.
    pub fn claim_all(&self, who: &AccountId) -> u64 {
        let mut total = 0;
        for _ in 0..64 {
            let receipt = self.dist.claim_with_receipt(who, None, false).unwrap();
            total += receipt.amount;
            if !receipt.needs_another_call() {
                break;
            }
        }
        total
    }

    /// Number of committed `Claimed` events.
    pub fn claimed_events(&self) -> usize {
        self.dist
            .events()
            .iter()
            .filter(|e| matches!(e, DistributorEvent::Claimed { .. }))
            .count()
    }
}
