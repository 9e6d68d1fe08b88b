//! Protocol constants. All amounts are in base units of the funding asset;
//! all timestamps are Unix seconds.

/// Length of one accounting bucket.
pub const WEEK: u64 = 7 * 86_400;

/// Minimum time between two public token checkpoints.
pub const TOKEN_CHECKPOINT_DEADLINE: u64 = 86_400;

/// Maximum weeks a single token checkpoint finalizes.
pub const TOKEN_CHECKPOINT_MAX_WEEKS: u32 = 20;

/// Maximum weeks a single supply checkpoint snapshots.
pub const SUPPLY_CHECKPOINT_MAX_WEEKS: u32 = 20;

/// Maximum loop iterations of one account claim (point advances count too).
pub const CLAIM_MAX_ITERATIONS: u32 = 50;

/// Maximum bisection steps of the epoch search. 128 halvings cover any `u64`
/// epoch range.
pub const EPOCH_SEARCH_MAX_ITERATIONS: u32 = 128;

/// Maximum accounts settled by one `claim_many` call.
pub const CLAIM_MANY_MAX_ACCOUNTS: usize = 20;

/// Maximum lock duration accepted by the in-memory ledger (4 years).
pub const MAX_LOCK_TIME: u64 = 4 * 365 * 86_400;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Floor a timestamp to the start of its week bucket.
///
/// # Examples
///
/// ```
/// use sluice_core::constants::{week_floor, WEEK};
/// assert_eq!(week_floor(0), 0);
/// assert_eq!(week_floor(WEEK - 1), 0);
/// assert_eq!(week_floor(WEEK), WEEK);
/// ```
pub const fn week_floor(ts: u64) -> u64 {
    ts / WEEK * WEEK
}

/// Round a timestamp up to the next week boundary (identity on boundaries).
///
/// # Examples
///
/// ```
/// use sluice_core::constants::{week_ceil, WEEK};
/// assert_eq!(week_ceil(0), 0);
/// assert_eq!(week_ceil(1), WEEK);
/// assert_eq!(week_ceil(WEEK), WEEK);
/// ```
pub const fn week_ceil(ts: u64) -> u64 {
    week_floor(ts.saturating_add(WEEK - 1))
}

/// Whether `ts` is an exact bucket key.
pub const fn is_week_aligned(ts: u64) -> bool {
    ts % WEEK == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_is_seven_days() {
        assert_eq!(WEEK, 604_800);
    }

    #[test]
    fn floor_and_ceil_agree_on_boundaries() {
        for n in 0..5 {
            assert_eq!(week_floor(n * WEEK), n * WEEK);
            assert_eq!(week_ceil(n * WEEK), n * WEEK);
        }
    }

    #[test]
    fn ceil_rounds_inside_week_up() {
        assert_eq!(week_ceil(WEEK + 1), 2 * WEEK);
        assert_eq!(week_ceil(2 * WEEK - 1), 2 * WEEK);
    }

    #[test]
    fn ceil_saturates_near_max() {
        assert!(week_ceil(u64::MAX) <= u64::MAX);
        assert!(is_week_aligned(week_ceil(u64::MAX)));
    }

    #[test]
    fn alignment() {
        assert!(is_week_aligned(0));
        assert!(is_week_aligned(3 * WEEK));
        assert!(!is_week_aligned(3 * WEEK + 1));
    }

    #[test]
    fn iteration_caps_are_positive() {
        assert!(TOKEN_CHECKPOINT_MAX_WEEKS > 0);
        assert!(SUPPLY_CHECKPOINT_MAX_WEEKS > 0);
        assert!(CLAIM_MAX_ITERATIONS > 0);
        assert!(EPOCH_SEARCH_MAX_ITERATIONS >= 64);
    }
}
