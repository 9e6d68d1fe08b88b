//! Per-account claim walk.
//!
//! Advances an account's week cursor from where it last stopped toward
//! `limit`, interleaving two kinds of steps: moving to the account's next
//! ledger point once the cursor has passed it, and accruing one fully elapsed
//! week as `balance * tokens_per_week / ve_supply`. Both kinds count against
//! the iteration bound, so a long-idle account may need several calls; the
//! staged cursor makes every call resume where the previous one stopped.
//!
//! Settlement (transfer or relock) is done by the caller.

use tracing::debug;

use sluice_core::constants::{week_ceil, WEEK};
use sluice_core::error::SluiceError;
use sluice_core::store::{AccountCursor, DistributorStore};
use sluice_core::traits::DecayLedger;
use sluice_core::types::{AccountId, Point};

use crate::epoch::find_user_epoch;
use crate::state::StateView;

/// What one walk computed for one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimOutcome {
    pub amount: u64,
    /// Epoch persisted as the account's resume point.
    pub user_epoch: u64,
    pub max_epoch: u64,
    /// Week cursor persisted for the account.
    pub week_cursor: u64,
    /// False when the iteration bound stopped the walk short of `limit`.
    pub caught_up: bool,
    /// Whether a cursor was staged (false for the no-op paths).
    pub walked: bool,
}

impl ClaimOutcome {
    fn nothing(user_epoch: u64, max_epoch: u64, week_cursor: u64) -> Self {
        Self { amount: 0, user_epoch, max_epoch, week_cursor, caught_up: true, walked: false }
    }
}

fn accrue(balance: u64, tokens: u64, supply: u64) -> Result<u64, SluiceError> {
    let owed = u128::from(balance) * u128::from(tokens) / u128::from(supply);
    u64::try_from(owed).map_err(|_| SluiceError::ArithmeticOverflow)
}

/// Walk `account` toward `limit` (exclusive, week aligned) and stage its new
/// cursor. Returns the amount owed; nothing is staged when the account has no
/// history or is already at `limit`.
pub fn claim_account<S: DistributorStore + ?Sized>(
    view: &mut StateView<'_, S>,
    ledger: &dyn DecayLedger,
    account: &AccountId,
    limit: u64,
    max_iterations: u32,
    search_iterations: u32,
) -> Result<ClaimOutcome, SluiceError> {
    let max_epoch = ledger.point_epoch(account)?;
    let start_time = view.globals()?.start_time;
    let stored = view.account_cursor(account)?;

    if max_epoch == 0 {
        return Ok(ClaimOutcome::nothing(0, 0, stored.map_or(0, |c| c.time_cursor)));
    }

    let mut user_epoch = match stored {
        Some(c) if c.user_epoch > 0 => c.user_epoch,
        _ => find_user_epoch(ledger, account, start_time, max_epoch, search_iterations)?,
    };
    if user_epoch == 0 {
        user_epoch = 1;
    }

    let mut user_point = ledger.user_point_history(account, user_epoch)?;
    let mut week_cursor = match stored {
        Some(c) if c.time_cursor > 0 => c.time_cursor,
        _ => week_ceil(user_point.ts),
    };
    if week_cursor >= limit {
        return Ok(ClaimOutcome::nothing(user_epoch, max_epoch, week_cursor));
    }
    if week_cursor < start_time {
        week_cursor = start_time;
    }

    let mut old_point = Point::EMPTY;
    let mut amount = 0u64;
    let mut caught_up = false;

    for _ in 0..max_iterations {
        if week_cursor >= limit {
            caught_up = true;
            break;
        }
        if week_cursor >= user_point.ts && user_epoch <= max_epoch {
            user_epoch += 1;
            old_point = user_point;
            user_point = if user_epoch > max_epoch {
                Point::EMPTY
            } else {
                ledger.user_point_history(account, user_epoch)?
            };
        } else {
            let balance = old_point.balance_at(week_cursor);
            if balance == 0 && user_epoch > max_epoch {
                caught_up = true;
                break;
            }
            if balance > 0 {
                let tokens = view.tokens_per_week(week_cursor)?;
                match view.ve_supply(week_cursor)? {
                    Some(supply) if supply > 0 => {
                        let owed = accrue(balance, tokens, supply)?;
                        amount = amount.checked_add(owed).ok_or(SluiceError::ArithmeticOverflow)?;
                        debug!(%account, week = week_cursor, balance, owed, "claim: week accrued");
                    }
                    _ => debug!(%account, week = week_cursor, "claim: no supply snapshot, week skipped"),
                }
            }
            week_cursor += WEEK;
        }
    }
    if week_cursor >= limit {
        caught_up = true;
    }

    let user_epoch = max_epoch.min(user_epoch - 1);
    view.set_account_cursor(account, AccountCursor { time_cursor: week_cursor, user_epoch })?;

    Ok(ClaimOutcome { amount, user_epoch, max_epoch, week_cursor, caught_up, walked: true })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use sluice_core::clock::ManualClock;
    use sluice_core::ledger::MemoryLedger;
    use sluice_core::store::{Globals, MemoryStore, StateDelta};

    fn alice() -> AccountId {
        AccountId::derive("alice")
    }

    fn ledger() -> MemoryLedger {
        MemoryLedger::new(
            AccountId::derive("ledger"),
            AccountId::derive("asset"),
            Arc::new(ManualClock::new(0)),
        )
    }

    /// Store with `weeks` snapshotted weeks, each with the given tokens and supply.
    fn seeded(weeks: u64, tokens: u64, supply: u64) -> MemoryStore {
        let mut store = MemoryStore::new(0);
        let mut delta = StateDelta::default();
        for w in 0..weeks {
            delta.tokens_per_week.insert(w * WEEK, tokens);
            delta.ve_supply.insert(w * WEEK, supply);
        }
        delta.globals = Some(Globals {
            last_token_time: weeks * WEEK,
            time_cursor: weeks * WEEK,
            token_last_balance: tokens * weeks,
            ..Globals::genesis(0)
        });
        store.apply(delta).unwrap();
        store
    }

    fn walk(store: &mut MemoryStore, ledger: &MemoryLedger, limit: u64, iterations: u32) -> ClaimOutcome {
        let mut view = StateView::new(&*store, limit + 1);
        let out = claim_account(&mut view, ledger, &alice(), limit, iterations, 128).unwrap();
        let (delta, _) = view.into_parts();
        store.apply(delta).unwrap();
        out
    }

    #[test]
    fn full_share_of_week_zero() {
        let ledger = ledger();
        ledger.push_user_point(&alice(), Point::new(1000, 1, 0)).unwrap();
        let mut store = seeded(1, 700, 1000);
        let out = walk(&mut store, &ledger, WEEK, 50);
        assert_eq!(out.amount, 700);
        assert!(out.caught_up);
        assert_eq!(out.week_cursor, WEEK);
        assert_eq!(out.user_epoch, 1);
        assert_eq!(store.account_cursor(&alice()).unwrap(), Some(AccountCursor { time_cursor: WEEK, user_epoch: 1 }));
    }

    #[test]
    fn no_history_is_a_noop() {
        let ledger = ledger();
        let mut store = seeded(3, 700, 1000);
        let out = walk(&mut store, &ledger, 3 * WEEK, 50);
        assert_eq!(out.amount, 0);
        assert!(!out.walked);
        assert_eq!(store.account_cursor(&alice()).unwrap(), None);
    }

    #[test]
    fn second_walk_yields_zero() {
        let ledger = ledger();
        ledger.push_user_point(&alice(), Point::new(1000, 1, 0)).unwrap();
        let mut store = seeded(1, 700, 1000);
        walk(&mut store, &ledger, WEEK, 50);
        let again = walk(&mut store, &ledger, WEEK, 50);
        assert_eq!(again.amount, 0);
    }

    #[test]
    fn cursor_at_limit_stages_nothing() {
        let ledger = ledger();
        ledger.push_user_point(&alice(), Point::new(1000, 0, 5)).unwrap();
        let mut store = seeded(1, 700, 1000);
        // Point at ts 5 rounds up to WEEK, which is the limit.
        let out = walk(&mut store, &ledger, WEEK, 50);
        assert_eq!(out.amount, 0);
        assert_eq!(store.account_cursor(&alice()).unwrap(), None);
    }

    #[test]
    fn proportional_to_share_of_supply() {
        let ledger = ledger();
        // Flat balance of 250 against a supply of 1000 for four weeks.
        ledger.push_user_point(&alice(), Point::new(250, 0, 0)).unwrap();
        let mut store = seeded(4, 1000, 1000);
        let out = walk(&mut store, &ledger, 4 * WEEK, 50);
        assert_eq!(out.amount, 4 * 250);
    }

    #[test]
    fn zero_supply_week_is_skipped() {
        let ledger = ledger();
        ledger.push_user_point(&alice(), Point::new(250, 0, 0)).unwrap();
        let mut store = seeded(2, 1000, 1000);
        let mut delta = StateDelta::default();
        delta.globals = Some(Globals { time_cursor: 3 * WEEK, last_token_time: 3 * WEEK, ..store.globals().unwrap() });
        delta.ve_supply.insert(2 * WEEK, 0);
        delta.tokens_per_week.insert(2 * WEEK, 1000);
        store.apply(delta).unwrap();
        let out = walk(&mut store, &ledger, 3 * WEEK, 50);
        assert_eq!(out.amount, 500);
        assert_eq!(out.week_cursor, 3 * WEEK);
    }

    #[test]
    fn expired_lock_stops_early() {
        let ledger = ledger();
        // Decays to zero within week 0; nothing accrues afterwards.
        ledger.push_user_point(&alice(), Point::new(100, 1, 0)).unwrap();
        let mut store = seeded(10, 1000, 1000);
        let out = walk(&mut store, &ledger, 10 * WEEK, 50);
        assert_eq!(out.amount, 100);
        assert!(out.caught_up);
        assert!(out.week_cursor < 10 * WEEK);
    }

    #[test]
    fn later_points_replace_earlier_ones() {
        let ledger = ledger();
        ledger.push_user_point(&alice(), Point::new(100, 0, 0)).unwrap();
        ledger.push_user_point(&alice(), Point::new(400, 0, WEEK + 10)).unwrap();
        let mut store = seeded(4, 1000, 1000);
        let out = walk(&mut store, &ledger, 4 * WEEK, 50);
        // Weeks 0 and 1 at 100, weeks 2 and 3 at 400.
        assert_eq!(out.amount, 100 + 100 + 400 + 400);
        assert_eq!(out.user_epoch, 2);
    }

    #[test]
    fn iteration_bound_leaves_gap_and_resumes() {
        let ledger = ledger();
        ledger.push_user_point(&alice(), Point::new(10, 0, 0)).unwrap();
        let mut store = seeded(60, 100, 100);
        let first = walk(&mut store, &ledger, 60 * WEEK, 50);
        assert!(!first.caught_up);
        // One step moves onto the point, 49 accrue.
        assert_eq!(first.week_cursor, 49 * WEEK);
        assert_eq!(first.amount, 49 * 10);

        let second = walk(&mut store, &ledger, 60 * WEEK, 50);
        assert!(second.caught_up);
        assert_eq!(second.week_cursor, 60 * WEEK);
        assert_eq!(first.amount + second.amount, 60 * 10);
    }

    #[test]
    fn first_claim_starts_at_start_time() {
        let ledger = ledger();
        ledger.push_user_point(&alice(), Point::new(10, 0, 0)).unwrap();
        let mut store = MemoryStore::new(2 * WEEK);
        let mut delta = StateDelta::default();
        for w in 2..4 {
            delta.tokens_per_week.insert(w * WEEK, 100);
            delta.ve_supply.insert(w * WEEK, 100);
        }
        delta.globals = Some(Globals { last_token_time: 4 * WEEK, time_cursor: 4 * WEEK, ..Globals::genesis(2 * WEEK) });
        store.apply(delta).unwrap();
        let out = walk(&mut store, &ledger, 4 * WEEK, 50);
        assert_eq!(out.amount, 20);
    }
}
