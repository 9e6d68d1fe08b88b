//! Staged view over a [`DistributorStore`].
//!
//! Every operation reads through a [`StateView`] and writes into its
//! [`StateDelta`]; nothing reaches the store until the caller commits the
//! delta. The view is the single place where the state invariants are
//! checked:
//! - per-week keys are week aligned;
//! - `time_cursor`, `last_token_time` and account cursors never move back;
//! - `time_cursor <= week_floor(now)`;
//! - a supply snapshot is written at most once;
//! - an account cursor never passes the supply cursor;
//! - the tracked balance never underflows.

use sluice_core::constants::{is_week_aligned, week_floor};
use sluice_core::error::{SluiceError, StateError};
use sluice_core::store::{AccountCursor, DistributorStore, Globals, StateDelta};
use sluice_core::types::{AccountId, DistributorEvent};

/// Read-through, write-back overlay of one operation.
pub struct StateView<'a, S: DistributorStore + ?Sized> {
    store: &'a S,
    now: u64,
    delta: StateDelta,
    events: Vec<DistributorEvent>,
}

impl<'a, S: DistributorStore + ?Sized> StateView<'a, S> {
    pub fn new(store: &'a S, now: u64) -> Self {
        Self { store, now, delta: StateDelta::default(), events: Vec::new() }
    }

    /// Time snapshot the operation runs at.
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn globals(&self) -> Result<Globals, SluiceError> {
        match self.delta.globals {
            Some(g) => Ok(g),
            None => self.store.globals(),
        }
    }

    pub fn tokens_per_week(&self, week: u64) -> Result<u64, SluiceError> {
        match self.delta.tokens_per_week.get(&week) {
            Some(&v) => Ok(v),
            None => self.store.tokens_per_week(week),
        }
    }

    pub fn ve_supply(&self, week: u64) -> Result<Option<u64>, SluiceError> {
        match self.delta.ve_supply.get(&week) {
            Some(&v) => Ok(Some(v)),
            None => self.store.ve_supply(week),
        }
    }

    pub fn account_cursor(&self, account: &AccountId) -> Result<Option<AccountCursor>, SluiceError> {
        match self.delta.accounts.get(account) {
            Some(&c) => Ok(Some(c)),
            None => self.store.account_cursor(account),
        }
    }

    pub fn relock_allowed(&self, account: &AccountId, delegate: &AccountId) -> Result<bool, SluiceError> {
        match self.delta.relock.get(&(*account, *delegate)) {
            Some(&v) => Ok(v),
            None => self.store.relock_allowed(account, delegate),
        }
    }

    /// Stage new globals after checking monotonicity and the cursor bound.
    pub fn set_globals(&mut self, next: Globals) -> Result<(), SluiceError> {
        let current = self.globals()?;
        if next.start_time != current.start_time {
            return Err(StateError::Regression {
                what: "start_time",
                from: current.start_time,
                to: next.start_time,
            }
            .into());
        }
        if next.last_token_time < current.last_token_time {
            return Err(StateError::Regression {
                what: "last_token_time",
                from: current.last_token_time,
                to: next.last_token_time,
            }
            .into());
        }
        if next.time_cursor < current.time_cursor {
            return Err(StateError::Regression {
                what: "time_cursor",
                from: current.time_cursor,
                to: next.time_cursor,
            }
            .into());
        }
        if !is_week_aligned(next.time_cursor) {
            return Err(StateError::Unaligned { what: "time_cursor", ts: next.time_cursor }.into());
        }
        if next.time_cursor > week_floor(self.now) {
            return Err(StateError::CursorAheadOfNow { cursor: next.time_cursor, now: self.now }.into());
        }
        self.delta.globals = Some(next);
        Ok(())
    }

    /// Add `amount` to the bucket of `week`. Zero adds stage nothing.
    pub fn add_tokens(&mut self, week: u64, amount: u64) -> Result<(), SluiceError> {
        if !is_week_aligned(week) {
            return Err(StateError::Unaligned { what: "tokens_per_week", ts: week }.into());
        }
        if amount == 0 {
            return Ok(());
        }
        let total = self
            .tokens_per_week(week)?
            .checked_add(amount)
            .ok_or(SluiceError::ArithmeticOverflow)?;
        self.delta.tokens_per_week.insert(week, total);
        Ok(())
    }

    /// Write the supply snapshot of `week`. Fails if one already exists.
    pub fn write_ve_supply(&mut self, week: u64, supply: u64) -> Result<(), SluiceError> {
        if !is_week_aligned(week) {
            return Err(StateError::Unaligned { what: "ve_supply", ts: week }.into());
        }
        if self.ve_supply(week)?.is_some() {
            return Err(StateError::SnapshotOverwrite(week).into());
        }
        self.delta.ve_supply.insert(week, supply);
        Ok(())
    }

    /// Stage an account's claim cursor.
    pub fn set_account_cursor(&mut self, account: &AccountId, cursor: AccountCursor) -> Result<(), SluiceError> {
        if !is_week_aligned(cursor.time_cursor) {
            return Err(StateError::Unaligned { what: "time_cursor_of", ts: cursor.time_cursor }.into());
        }
        if let Some(prev) = self.account_cursor(account)? {
            if cursor.time_cursor < prev.time_cursor {
                return Err(StateError::Regression {
                    what: "time_cursor_of",
                    from: prev.time_cursor,
                    to: cursor.time_cursor,
                }
                .into());
            }
        }
        let time_cursor = self.globals()?.time_cursor;
        if cursor.time_cursor > time_cursor {
            return Err(StateError::AccountAheadOfSupply {
                account_cursor: cursor.time_cursor,
                time_cursor,
            }
            .into());
        }
        self.delta.accounts.insert(*account, cursor);
        Ok(())
    }

    pub fn set_relock(&mut self, account: &AccountId, delegate: &AccountId, allowed: bool) {
        self.delta.relock.insert((*account, *delegate), allowed);
    }

    /// Reduce the tracked balance after a payout.
    pub fn debit_token_balance(&mut self, amount: u64) -> Result<(), SluiceError> {
        let mut g = self.globals()?;
        g.token_last_balance = g
            .token_last_balance
            .checked_sub(amount)
            .ok_or(StateError::Underflow { have: g.token_last_balance, sub: amount })?;
        self.set_globals(g)
    }

    /// Queue an event; it is published only if the delta commits.
    pub fn emit(&mut self, event: DistributorEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[DistributorEvent] {
        &self.events
    }

    pub fn into_parts(self) -> (StateDelta, Vec<DistributorEvent>) {
        (self.delta, self.events)
    }
}
