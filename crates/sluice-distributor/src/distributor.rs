//! The fee distributor facade.
//!
//! [`FeeDistributor`] owns the state store and wires the checkpointers and
//! the claim walk to the external ledger, asset and clock. Operations are
//! serialized by a re-entrant lock. The thread that holds it can get back in
//! (a collaborator calling back during a transfer), but a second mutating
//! operation started that way fails with [`ClaimError::Reentrancy`]. Queries
//! stay available to callbacks and observe the last committed state.
//!
//! Each operation stages its writes in a [`StateView`] and commits them only
//! after every external call has returned successfully; on error the staged
//! delta and its events are dropped.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use tracing::{debug, info, warn};

use sluice_core::constants::week_floor;
use sluice_core::error::{CheckpointError, ClaimError, SluiceError};
use sluice_core::store::{DistributorStore, Globals, WeekRecord};
use sluice_core::traits::{AssetTransfer, Clock, DecayLedger};
use sluice_core::types::{AccountId, ClaimReceipt, DistributorEvent};

use crate::claim::{claim_account, ClaimOutcome};
use crate::epoch;
use crate::params::DistributorParams;
use crate::state::StateView;
use crate::supply::{checkpoint_total_supply, SupplyCheckpoint};
use crate::tokens::{checkpoint_token, TokenCheckpoint};

struct OpState<S> {
    store: RefCell<S>,
    active: Cell<bool>,
}

/// Held for the duration of one mutating operation.
struct OpScope<'a, S> {
    state: ReentrantMutexGuard<'a, OpState<S>>,
    op: &'static str,
    now: u64,
}

impl<S> Drop for OpScope<'_, S> {
    fn drop(&mut self) {
        self.state.active.set(false);
    }
}

/// Weekly-bucketed fee distributor over a decaying lock ledger.
pub struct FeeDistributor<S: DistributorStore> {
    account: AccountId,
    ledger: Arc<dyn DecayLedger>,
    asset: Arc<dyn AssetTransfer>,
    clock: Arc<dyn Clock>,
    params: DistributorParams,
    op: ReentrantMutex<OpState<S>>,
    events: Mutex<Vec<DistributorEvent>>,
}

impl<S: DistributorStore> FeeDistributor<S> {
    /// Create a distributor holding funds as `account`.
    pub fn new(
        account: AccountId,
        store: S,
        ledger: Arc<dyn DecayLedger>,
        asset: Arc<dyn AssetTransfer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            account,
            ledger,
            asset,
            clock,
            params: DistributorParams::default(),
            op: ReentrantMutex::new(OpState { store: RefCell::new(store), active: Cell::new(false) }),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn with_params(mut self, params: DistributorParams) -> Self {
        self.params = params;
        self
    }

    /// Identity under which the distributor holds the funding asset.
    pub fn account(&self) -> AccountId {
        self.account
    }

    pub fn params(&self) -> &DistributorParams {
        &self.params
    }

    /// Consume the distributor and return its store.
    pub fn into_store(self) -> S {
        self.op.into_inner().store.into_inner()
    }

    // ------------------------------------------------------------------
    // Operation plumbing
    // ------------------------------------------------------------------

    fn enter(&self, op: &'static str) -> Result<OpScope<'_, S>, SluiceError> {
        let state = self.op.lock();
        if state.active.replace(true) {
            warn!(op, "re-entrant call rejected");
            return Err(ClaimError::Reentrancy.into());
        }
        Ok(OpScope { state, op, now: self.clock.now() })
    }

    /// Run `f` against a fresh view and commit what it staged.
    fn stage<T>(
        &self,
        scope: &OpScope<'_, S>,
        f: impl FnOnce(&mut StateView<'_, S>) -> Result<T, SluiceError>,
    ) -> Result<T, SluiceError> {
        let staged = {
            let store = scope.state.store.try_borrow().map_err(|_| ClaimError::Reentrancy)?;
            let mut view = StateView::new(&*store, scope.now);
            f(&mut view).map(|value| (value, view.into_parts()))
        };
        let (value, (delta, events)) = match staged {
            Ok(staged) => staged,
            Err(e) => {
                warn!(op = scope.op, error = %e, "operation aborted, staged changes discarded");
                return Err(e);
            }
        };
        if !delta.is_empty() {
            scope
                .state
                .store
                .try_borrow_mut()
                .map_err(|_| ClaimError::Reentrancy)?
                .apply(delta)?;
        }
        self.publish(events);
        Ok(value)
    }

    fn publish(&self, events: Vec<DistributorEvent>) {
        for event in &events {
            match event {
                DistributorEvent::CheckpointToken { time, tokens } => {
                    info!(time, tokens, "token checkpoint")
                }
                DistributorEvent::CheckpointTotalSupply { time_cursor } => {
                    info!(time_cursor, "supply checkpoint")
                }
                DistributorEvent::Deposited { from, amount } => info!(%from, amount, "deposit"),
                DistributorEvent::Claimed { account, amount, claim_epoch, max_epoch, relocked, caught_up } => {
                    info!(%account, amount, claim_epoch, max_epoch, relocked, caught_up, "claim")
                }
                DistributorEvent::RelockAuthorizationToggled { account, delegate, allowed } => {
                    info!(%account, %delegate, allowed, "relock authorization toggled")
                }
            }
        }
        self.events.lock().extend(events);
    }

    fn read<T>(&self, f: impl FnOnce(&S) -> Result<T, SluiceError>) -> Result<T, SluiceError> {
        let state = self.op.lock();
        let store = state.store.try_borrow().map_err(|_| ClaimError::Reentrancy)?;
        f(&store)
    }

    fn token_checkpoint_due(&self, globals: &Globals, now: u64) -> bool {
        now > globals.last_token_time.saturating_add(self.params.token_checkpoint_deadline)
    }

    fn run_token_checkpoint(&self, view: &mut StateView<'_, S>) -> Result<TokenCheckpoint, SluiceError> {
        let balance = self.asset.balance_of(&self.account)?;
        checkpoint_token(view, balance, self.params.token_checkpoint_max_weeks)
    }

    fn run_supply_checkpoint(&self, view: &mut StateView<'_, S>) -> Result<SupplyCheckpoint, SluiceError> {
        checkpoint_total_supply(
            view,
            &*self.ledger,
            self.params.supply_checkpoint_max_weeks,
            self.params.epoch_search_max_iterations,
        )
    }

    /// Checkpoints run ahead of any claim; returns the settlement limit.
    fn prepare_claim(&self, view: &mut StateView<'_, S>) -> Result<u64, SluiceError> {
        let now = view.now();
        if now >= view.globals()?.time_cursor {
            let cp = self.run_supply_checkpoint(view)?;
            if cp.weeks > 0 {
                view.emit(DistributorEvent::CheckpointTotalSupply { time_cursor: cp.time_cursor });
            }
        }
        if self.token_checkpoint_due(&view.globals()?, now) {
            self.run_token_checkpoint(view)?;
        }
        let g = view.globals()?;
        Ok(week_floor(g.last_token_time).min(g.time_cursor))
    }

    fn claim_one(
        &self,
        view: &mut StateView<'_, S>,
        caller: &AccountId,
        account: &AccountId,
        relock: bool,
        limit: u64,
    ) -> Result<ClaimReceipt, SluiceError> {
        let out: ClaimOutcome = claim_account(
            view,
            &*self.ledger,
            account,
            limit,
            self.params.claim_max_iterations,
            self.params.epoch_search_max_iterations,
        )?;
        if !out.walked {
            debug!(%account, "claim: nothing to walk");
            return Ok(ClaimReceipt::empty(*account, out.user_epoch, out.max_epoch, out.week_cursor));
        }
        let relocked = if out.amount > 0 {
            self.settle(view, caller, account, relock, out.amount)?
        } else {
            false
        };
        view.emit(DistributorEvent::Claimed {
            account: *account,
            amount: out.amount,
            claim_epoch: out.user_epoch,
            max_epoch: out.max_epoch,
            relocked,
            caught_up: out.caught_up,
        });
        Ok(ClaimReceipt {
            account: *account,
            amount: out.amount,
            claim_epoch: out.user_epoch,
            max_epoch: out.max_epoch,
            week_cursor: out.week_cursor,
            relocked,
            caught_up: out.caught_up,
        })
    }

    /// Pay `amount` out, or lock it for `account` when a permitted relock
    /// was requested. Returns whether it was relocked.
    fn settle(
        &self,
        view: &mut StateView<'_, S>,
        caller: &AccountId,
        account: &AccountId,
        relock: bool,
        amount: u64,
    ) -> Result<bool, SluiceError> {
        let relocked = relock && (caller == account || view.relock_allowed(account, caller)?);
        if relock && !relocked {
            debug!(%account, %caller, "claim: relock not authorized, paying out");
        }

        // Staged before any external call: a failed debit must not move funds.
        view.debit_token_balance(amount)?;

        if relocked {
            let spender = self.ledger.account();
            if !self.asset.approve(&self.account, &spender, amount)? {
                return Err(ClaimError::TransferFailed { to: spender, amount }.into());
            }
            if let Err(e) = self.ledger.modify_lock(&self.account, amount, 0, account) {
                match self.asset.approve(&self.account, &spender, 0) {
                    Ok(true) => {}
                    Ok(false) => warn!(%spender, amount, "relock failed, approval reset declined"),
                    Err(reset) => warn!(%spender, amount, error = %reset, "relock failed, approval reset errored"),
                }
                return Err(e.into());
            }
        } else if !self.asset.transfer(&self.account, account, amount)? {
            return Err(ClaimError::TransferFailed { to: *account, amount }.into());
        }
        Ok(relocked)
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Public token checkpoint. Fails with [`CheckpointError::Cooldown`]
    /// unless `now > last_token_time + token_checkpoint_deadline`.
    pub fn checkpoint_token(&self) -> Result<TokenCheckpoint, SluiceError> {
        let scope = self.enter("checkpoint_token")?;
        self.stage(&scope, |view| {
            let globals = view.globals()?;
            if !self.token_checkpoint_due(&globals, view.now()) {
                return Err(CheckpointError::Cooldown {
                    now: view.now(),
                    ready_after: globals.last_token_time.saturating_add(self.params.token_checkpoint_deadline),
                }
                .into());
            }
            self.run_token_checkpoint(view)
        })
    }

    /// Snapshot pending weeks of the ledger's total balance.
    pub fn checkpoint_total_supply(&self) -> Result<SupplyCheckpoint, SluiceError> {
        let scope = self.enter("checkpoint_total_supply")?;
        self.stage(&scope, |view| {
            let cp = self.run_supply_checkpoint(view)?;
            view.emit(DistributorEvent::CheckpointTotalSupply { time_cursor: cp.time_cursor });
            Ok(cp)
        })
    }

    /// Claim for `account` (default: the caller). Returns the amount settled.
    pub fn claim(&self, caller: &AccountId, account: Option<&AccountId>, relock: bool) -> Result<u64, SluiceError> {
        self.claim_with_receipt(caller, account, relock).map(|r| r.amount)
    }

    /// Like [`claim`](Self::claim), returning the full receipt (epoch gap and
    /// whether another call is needed to catch up).
    pub fn claim_with_receipt(
        &self,
        caller: &AccountId,
        account: Option<&AccountId>,
        relock: bool,
    ) -> Result<ClaimReceipt, SluiceError> {
        let account = account.copied().unwrap_or(*caller);
        let scope = self.enter("claim")?;
        self.stage(&scope, |view| {
            let limit = self.prepare_claim(view)?;
            self.claim_one(view, caller, &account, relock, limit)
        })
    }

    /// Claim for up to `claim_many_max` accounts, stopping at the first zero
    /// account. Each account settles and commits on its own, so a failure
    /// leaves the accounts before it settled. Returns the total settled.
    pub fn claim_many(&self, caller: &AccountId, accounts: &[AccountId], relock: bool) -> Result<u64, SluiceError> {
        let scope = self.enter("claim_many")?;
        let limit = self.stage(&scope, |view| self.prepare_claim(view))?;
        if accounts.len() > self.params.claim_many_max {
            warn!(
                requested = accounts.len(),
                max = self.params.claim_many_max,
                "claim_many: extra accounts ignored"
            );
        }

        let mut total = 0u64;
        for account in accounts.iter().take(self.params.claim_many_max) {
            if account.is_zero() {
                break;
            }
            let receipt = self.stage(&scope, |view| self.claim_one(view, caller, account, relock, limit))?;
            total = total.checked_add(receipt.amount).ok_or(SluiceError::ArithmeticOverflow)?;
        }
        Ok(total)
    }

    /// Pull funds from `caller`: `min(amount, allowance)`, or the whole
    /// allowance when `amount` is `None`, capped at the caller's balance.
    /// Runs a token checkpoint if the cooldown has elapsed.
    pub fn deposit(&self, caller: &AccountId, amount: Option<u64>) -> Result<bool, SluiceError> {
        let scope = self.enter("deposit")?;
        self.stage(&scope, |view| {
            let allowance = self.asset.allowance(caller, &self.account)?;
            let held = self.asset.balance_of(caller)?;
            let pull = amount.map_or(allowance, |a| a.min(allowance)).min(held);
            if pull == 0 {
                debug!(%caller, "deposit: nothing to pull");
                return Ok(true);
            }
            if !self.asset.transfer_from(&self.account, caller, &self.account, pull)? {
                return Err(ClaimError::PullFailed { from: *caller, amount: pull }.into());
            }
            view.emit(DistributorEvent::Deposited { from: *caller, amount: pull });
            if self.token_checkpoint_due(&view.globals()?, view.now()) {
                self.run_token_checkpoint(view)?;
            }
            Ok(true)
        })
    }

    /// Toggle whether `delegate` may relock `caller`'s claims.
    pub fn set_relock_authorization(&self, caller: &AccountId, delegate: &AccountId) -> Result<bool, SluiceError> {
        let scope = self.enter("set_relock_authorization")?;
        self.stage(&scope, |view| {
            let allowed = !view.relock_allowed(caller, delegate)?;
            view.set_relock(caller, delegate, allowed);
            view.emit(DistributorEvent::RelockAuthorizationToggled {
                account: *caller,
                delegate: *delegate,
                allowed,
            });
            Ok(true)
        })
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// `account`'s decaying ledger balance at `ts`.
    pub fn balance_at(&self, account: &AccountId, ts: u64) -> Result<u64, SluiceError> {
        Ok(epoch::balance_at(&*self.ledger, account, ts, self.params.epoch_search_max_iterations)?)
    }

    /// Ledger's total decaying balance at `ts`.
    pub fn total_supply_at(&self, ts: u64) -> Result<u64, SluiceError> {
        Ok(epoch::total_supply_at(&*self.ledger, ts, self.params.epoch_search_max_iterations)?)
    }

    pub fn globals(&self) -> Result<Globals, SluiceError> {
        self.read(|s| s.globals())
    }

    pub fn start_time(&self) -> Result<u64, SluiceError> {
        Ok(self.globals()?.start_time)
    }

    pub fn time_cursor(&self) -> Result<u64, SluiceError> {
        Ok(self.globals()?.time_cursor)
    }

    pub fn last_token_time(&self) -> Result<u64, SluiceError> {
        Ok(self.globals()?.last_token_time)
    }

    pub fn token_last_balance(&self) -> Result<u64, SluiceError> {
        Ok(self.globals()?.token_last_balance)
    }

    pub fn tokens_per_week(&self, week: u64) -> Result<u64, SluiceError> {
        self.read(|s| s.tokens_per_week(week))
    }

    pub fn ve_supply(&self, week: u64) -> Result<Option<u64>, SluiceError> {
        self.read(|s| s.ve_supply(week))
    }

    /// Week cursor of `account` (0 if it has never claimed).
    pub fn time_cursor_of(&self, account: &AccountId) -> Result<u64, SluiceError> {
        self.read(|s| Ok(s.account_cursor(account)?.map_or(0, |c| c.time_cursor)))
    }

    /// Resume epoch of `account` (0 if it has never claimed).
    pub fn user_epoch_of(&self, account: &AccountId) -> Result<u64, SluiceError> {
        self.read(|s| Ok(s.account_cursor(account)?.map_or(0, |c| c.user_epoch)))
    }

    pub fn relock_allowed(&self, account: &AccountId, delegate: &AccountId) -> Result<bool, SluiceError> {
        self.read(|s| s.relock_allowed(account, delegate))
    }

    /// Per-week rows in `[from, to)`.
    pub fn week_table(&self, from: u64, to: u64) -> Result<Vec<WeekRecord>, SluiceError> {
        self.read(|s| s.week_table(from, to))
    }

    /// Committed events, oldest first.
    pub fn events(&self) -> Vec<DistributorEvent> {
        self.events.lock().clone()
    }

    /// Take and clear the committed events.
    pub fn drain_events(&self) -> Vec<DistributorEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}
