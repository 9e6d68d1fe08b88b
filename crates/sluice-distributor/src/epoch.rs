//! Epoch search over timestamp-ordered ledger histories.
//!
//! Finds the greatest index whose point timestamp does not exceed a target.
//! Histories are append-only and non-decreasing in `ts`, so a bounded
//! upper-biased bisection suffices.

use sluice_core::error::LedgerError;
use sluice_core::traits::DecayLedger;
use sluice_core::types::{AccountId, Point};

/// Greatest `i` in `[0, max_epoch]` with `ts_at(i) <= target`, or 0.
///
/// `ts_at` returns the timestamp of the point at an index. The search stops
/// after `max_iterations` bisection steps.
///
/// # Examples
///
/// ```
/// use sluice_distributor::epoch::find_epoch;
/// let ts = [0u64, 10, 20, 20, 30];
/// let at = |i: u64| Ok(ts[i as usize]);
/// assert_eq!(find_epoch(20, 4, 128, at).unwrap(), 3);
/// assert_eq!(find_epoch(25, 4, 128, at).unwrap(), 3);
/// assert_eq!(find_epoch(5, 4, 128, at).unwrap(), 0);
/// ```
pub fn find_epoch<F>(target: u64, max_epoch: u64, max_iterations: u32, mut ts_at: F) -> Result<u64, LedgerError>
where
    F: FnMut(u64) -> Result<u64, LedgerError>,
{
    let mut low = 0u64;
    let mut high = max_epoch;
    for _ in 0..max_iterations {
        if low >= high {
            break;
        }
        // (low + high + 2) / 2 without overflow.
        let mid = low + (high - low) / 2 + 1;
        if ts_at(mid)? <= target {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    Ok(low)
}

/// Global epoch valid at `ts`.
pub fn find_global_epoch(ledger: &dyn DecayLedger, ts: u64, max_iterations: u32) -> Result<u64, LedgerError> {
    let max_epoch = ledger.global_epoch()?;
    find_epoch(ts, max_epoch, max_iterations, |i| Ok(ledger.point_history(i)?.ts))
}

/// Epoch of `account`'s history valid at `ts`, searching `[0, max_user_epoch]`.
pub fn find_user_epoch(
    ledger: &dyn DecayLedger,
    account: &AccountId,
    ts: u64,
    max_user_epoch: u64,
    max_iterations: u32,
) -> Result<u64, LedgerError> {
    find_epoch(ts, max_user_epoch, max_iterations, |i| {
        Ok(ledger.user_point_history(account, i)?.ts)
    })
}

/// Total decaying balance at `ts`.
pub fn total_supply_at(ledger: &dyn DecayLedger, ts: u64, max_iterations: u32) -> Result<u64, LedgerError> {
    let epoch = find_global_epoch(ledger, ts, max_iterations)?;
    Ok(ledger.point_history(epoch)?.balance_at(ts))
}

/// `account`'s decaying balance at `ts`.
pub fn balance_at(
    ledger: &dyn DecayLedger,
    account: &AccountId,
    ts: u64,
    max_iterations: u32,
) -> Result<u64, LedgerError> {
    let max_user_epoch = ledger.point_epoch(account)?;
    if max_user_epoch == 0 {
        return Ok(0);
    }
    let epoch = find_user_epoch(ledger, account, ts, max_user_epoch, max_iterations)?;
    let point: Point = ledger.user_point_history(account, epoch)?;
    Ok(point.balance_at(ts))
}
