//! In-memory decaying-balance lock ledger.
//!
//! Implements [`DecayLedger`] with linear vote-escrow semantics:
//! - a lock of `amount` ending at `end` (rounded down to a week) has
//!   `slope = amount / max_time` and `bias = slope * (end - now)`;
//! - every lock change appends a user point and a global point;
//! - the global history is advanced one week at a time, applying the slope
//!   changes scheduled at each lock end, so that global points land on every
//!   week boundary crossed since the previous checkpoint.
//!
//! Raw point injection ([`MemoryLedger::push_user_point`],
//! [`MemoryLedger::push_global_point`]) bypasses lock bookkeeping and exists
//! for exact-arithmetic tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::constants::{week_floor, MAX_LOCK_TIME, WEEK};
use crate::error::LedgerError;
use crate::traits::{AssetTransfer, Clock, DecayLedger};
use crate::types::{AccountId, LockedBalance, Point};

/// Upper bound on weeks stepped by one global checkpoint.
const MAX_CHECKPOINT_WEEKS: usize = 255;

struct LedgerState {
    global: Vec<Point>,
    /// Index 0 of every history is [`Point::EMPTY`].
    users: HashMap<AccountId, Vec<Point>>,
    locks: HashMap<AccountId, LockedBalance>,
    /// Slope deltas (non-positive) applied when the global walk reaches each week.
    slope_changes: BTreeMap<u64, i128>,
}

/// In-memory [`DecayLedger`].
pub struct MemoryLedger {
    account: AccountId,
    funding_asset: AccountId,
    max_time: u64,
    clock: Arc<dyn Clock>,
    asset: Option<Arc<dyn AssetTransfer>>,
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    /// Create a ledger whose genesis global point sits at the clock's current time.
    pub fn new(account: AccountId, funding_asset: AccountId, clock: Arc<dyn Clock>) -> Self {
        let genesis = Point::new(0, 0, clock.now());
        Self {
            account,
            funding_asset,
            max_time: MAX_LOCK_TIME,
            clock,
            asset: None,
            state: RwLock::new(LedgerState {
                global: vec![genesis],
                users: HashMap::new(),
                locks: HashMap::new(),
                slope_changes: BTreeMap::new(),
            }),
        }
    }

    /// Pull locked funds through `asset` (the ledger spends approvals granted to it).
    pub fn with_asset(mut self, asset: Arc<dyn AssetTransfer>) -> Self {
        self.asset = Some(asset);
        self
    }

    /// Override the maximum lock duration (slope denominator).
    pub fn with_max_time(mut self, max_time: u64) -> Self {
        self.max_time = max_time.max(1);
        self
    }

    pub fn max_time(&self) -> u64 {
        self.max_time
    }

    /// Current lock of `account` (zero if none).
    pub fn locked(&self, account: &AccountId) -> LockedBalance {
        self.state.read().locks.get(account).copied().unwrap_or_default()
    }

    /// Open a new lock. `unlock_time` is rounded down to a week boundary.
    pub fn create_lock(&self, owner: &AccountId, amount: u64, unlock_time: u64) -> Result<LockedBalance, LedgerError> {
        if self.state.read().locks.get(owner).is_some_and(|l| l.amount > 0) {
            return Err(LedgerError::LockExists(*owner));
        }
        if unlock_time == 0 {
            return Err(LedgerError::UnlockTimeNotIncreasing { got: 0, current: self.clock.now() });
        }
        self.modify_lock(owner, amount, unlock_time, owner)
    }

    /// Add to an existing, unexpired lock.
    pub fn increase_amount(&self, owner: &AccountId, amount: u64) -> Result<LockedBalance, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        self.modify_lock(owner, amount, 0, owner)
    }

    /// Extend an existing, unexpired lock.
    pub fn increase_unlock_time(&self, owner: &AccountId, unlock_time: u64) -> Result<LockedBalance, LedgerError> {
        self.modify_lock(owner, 0, unlock_time, owner)
    }

    /// Append a raw user point. Timestamps must not decrease.
    pub fn push_user_point(&self, account: &AccountId, point: Point) -> Result<u64, LedgerError> {
        let mut state = self.state.write();
        let history = state.users.entry(*account).or_insert_with(|| vec![Point::EMPTY]);
        if history.len() > 1 && history.last().is_some_and(|last| last.ts > point.ts) {
            return Err(LedgerError::Rejected(format!("user point at {} precedes history", point.ts)));
        }
        history.push(point);
        Ok(history.len() as u64 - 1)
    }

    /// Append a raw global point. Timestamps must not decrease.
    pub fn push_global_point(&self, point: Point) -> Result<u64, LedgerError> {
        let mut state = self.state.write();
        if state.global.last().is_some_and(|last| last.ts > point.ts) {
            return Err(LedgerError::Rejected(format!("global point at {} precedes history", point.ts)));
        }
        state.global.push(point);
        Ok(state.global.len() as u64 - 1)
    }

    fn slope_bias(&self, lock: &LockedBalance, now: u64) -> (i128, i128) {
        if lock.end <= now || lock.amount == 0 {
            return (0, 0);
        }
        let slope = i128::from(lock.amount) / i128::from(self.max_time);
        (slope, slope * i128::from(lock.end - now))
    }

    /// Step the global history to `now`, then fold in a user change.
    fn checkpoint_locked(
        &self,
        state: &mut LedgerState,
        now: u64,
        change: Option<(LockedBalance, LockedBalance)>,
    ) {
        let mut last = state.global.last().copied().unwrap_or(Point::new(0, 0, now));
        let mut last_checkpoint = last.ts;
        let mut t_i = week_floor(last_checkpoint);

        for _ in 0..MAX_CHECKPOINT_WEEKS {
            t_i += WEEK;
            let mut d_slope = 0;
            if t_i > now {
                t_i = now;
            } else {
                d_slope = state.slope_changes.get(&t_i).copied().unwrap_or(0);
            }
            last.bias -= last.slope * i128::from(t_i.saturating_sub(last_checkpoint));
            last.slope += d_slope;
            last.bias = last.bias.max(0);
            last.slope = last.slope.max(0);
            last_checkpoint = t_i;
            last.ts = t_i;
            if t_i == now {
                break;
            }
            state.global.push(last);
        }

        if let Some((old, new)) = change {
            let (old_slope, old_bias) = self.slope_bias(&old, now);
            let (new_slope, new_bias) = self.slope_bias(&new, now);
            last.slope = (last.slope + new_slope - old_slope).max(0);
            last.bias = (last.bias + new_bias - old_bias).max(0);

            if old.end > now {
                let mut old_dslope = state.slope_changes.get(&old.end).copied().unwrap_or(0);
                old_dslope += old_slope;
                if new.end == old.end {
                    old_dslope -= new_slope;
                }
                state.slope_changes.insert(old.end, old_dslope);
            }
            if new.end > now && new.end > old.end {
                let new_dslope = state.slope_changes.get(&new.end).copied().unwrap_or(0) - new_slope;
                state.slope_changes.insert(new.end, new_dslope);
            }
        }
        state.global.push(last);
    }
}

impl DecayLedger for MemoryLedger {
    fn account(&self) -> AccountId {
        self.account
    }

    fn funding_asset(&self) -> AccountId {
        self.funding_asset
    }

    fn global_epoch(&self) -> Result<u64, LedgerError> {
        Ok(self.state.read().global.len() as u64 - 1)
    }

    fn point_history(&self, epoch: u64) -> Result<Point, LedgerError> {
        let state = self.state.read();
        state
            .global
            .get(epoch as usize)
            .copied()
            .ok_or(LedgerError::UnknownEpoch { epoch, max: state.global.len() as u64 - 1 })
    }

    fn point_epoch(&self, account: &AccountId) -> Result<u64, LedgerError> {
        Ok(self
            .state
            .read()
            .users
            .get(account)
            .map_or(0, |h| h.len() as u64 - 1))
    }

    fn user_point_history(&self, account: &AccountId, epoch: u64) -> Result<Point, LedgerError> {
        let state = self.state.read();
        match state.users.get(account) {
            Some(history) => history
                .get(epoch as usize)
                .copied()
                .ok_or(LedgerError::UnknownEpoch { epoch, max: history.len() as u64 - 1 }),
            None if epoch == 0 => Ok(Point::EMPTY),
            None => Err(LedgerError::UnknownEpoch { epoch, max: 0 }),
        }
    }

    fn checkpoint(&self) -> Result<(), LedgerError> {
        let now = self.clock.now();
        let mut state = self.state.write();
        self.checkpoint_locked(&mut state, now, None);
        Ok(())
    }

    fn modify_lock(
        &self,
        funder: &AccountId,
        amount: u64,
        unlock_time: u64,
        account: &AccountId,
    ) -> Result<LockedBalance, LedgerError> {
        let now = self.clock.now();
        let old = self.locked(account);
        let unlock_time = week_floor(unlock_time);

        let mut new = old;
        if old.amount == 0 || old.end <= now {
            // Opening (or reopening) requires both an amount and an end.
            if old.amount > 0 {
                return Err(LedgerError::LockExpired(*account));
            }
            if amount == 0 {
                return Err(LedgerError::ZeroAmount);
            }
            if unlock_time <= now {
                return Err(LedgerError::UnlockTimeNotIncreasing { got: unlock_time, current: now });
            }
            new.end = unlock_time;
        } else if unlock_time != 0 {
            if unlock_time < old.end {
                return Err(LedgerError::UnlockTimeNotIncreasing { got: unlock_time, current: old.end });
            }
            new.end = unlock_time;
        }
        if new.end > now + self.max_time {
            return Err(LedgerError::UnlockTimeTooFar { got: new.end, max: now + self.max_time });
        }
        new.amount = old
            .amount
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Rejected("lock amount overflow".into()))?;

        // Funds move before any bookkeeping so a failed pull changes nothing.
        if amount > 0 {
            if let Some(asset) = &self.asset {
                let pulled = asset
                    .transfer_from(&self.account, funder, &self.account, amount)
                    .map_err(|e| LedgerError::Rejected(e.to_string()))?;
                if !pulled {
                    return Err(LedgerError::Rejected("funding transfer declined".into()));
                }
            }
        }

        let mut state = self.state.write();
        self.checkpoint_locked(&mut state, now, Some((old, new)));
        state.locks.insert(*account, new);
        let (slope, bias) = self.slope_bias(&new, now);
        state
            .users
            .entry(*account)
            .or_insert_with(|| vec![Point::EMPTY])
            .push(Point::new(bias, slope, now));

        debug!(%account, amount = new.amount, end = new.end, "ledger: lock modified");
        Ok(new)
    }
}
