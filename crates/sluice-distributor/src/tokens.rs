//! Token checkpoint: spread newly received funds over the weeks they span.
//!
//! The interval `[last_token_time, now]` is cut at week boundaries and each
//! week's bucket receives the share of the new funds proportional to the
//! time the interval spends in it. At most `max_weeks` weeks are finalized
//! per call. A truncated call stops `last_token_time` at the last finalized
//! week boundary and only accounts for what it attributed, so the remainder
//! is spread by the next call.

use tracing::debug;

use sluice_core::constants::{week_floor, WEEK};
use sluice_core::error::SluiceError;
use sluice_core::store::DistributorStore;
use sluice_core::types::DistributorEvent;

use crate::state::StateView;

/// Result of one token checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCheckpoint {
    /// Amount attributed to buckets by this call.
    pub attributed: u64,
    /// New `last_token_time`.
    pub time: u64,
    /// Whether the checkpoint reached `now`.
    pub caught_up: bool,
}

fn share(amount: u64, part: u64, whole: u64) -> u64 {
    // part <= whole, so the quotient fits back into u64.
    (u128::from(amount) * u128::from(part) / u128::from(whole)) as u64
}

/// Spread `balance - token_last_balance` across the elapsed weeks.
///
/// `balance` is the distributor's current funding-asset holding.
pub fn checkpoint_token<S: DistributorStore + ?Sized>(
    view: &mut StateView<'_, S>,
    balance: u64,
    max_weeks: u32,
) -> Result<TokenCheckpoint, SluiceError> {
    let now = view.now();
    let mut globals = view.globals()?;
    let to_distribute = balance.saturating_sub(globals.token_last_balance);
    let start = globals.last_token_time;
    let since_last = now.saturating_sub(start);

    let mut t = start;
    let mut this_week = week_floor(t);
    let mut attributed = 0u64;
    let mut caught_up = false;

    for _ in 0..max_weeks {
        let next_week = this_week + WEEK;
        if now < next_week {
            let part = if since_last == 0 {
                to_distribute
            } else {
                share(to_distribute, now - t, since_last)
            };
            view.add_tokens(this_week, part)?;
            attributed += part;
            caught_up = true;
            break;
        }
        let part = if since_last == 0 {
            to_distribute
        } else {
            share(to_distribute, next_week - t, since_last)
        };
        view.add_tokens(this_week, part)?;
        attributed += part;
        debug!(week = this_week, tokens = part, "token checkpoint: week finalized");
        t = next_week;
        this_week = next_week;
    }

    if caught_up {
        globals.last_token_time = now;
        globals.token_last_balance = balance;
    } else {
        globals.last_token_time = t;
        globals.token_last_balance += attributed;
    }
    view.set_globals(globals)?;
    view.emit(DistributorEvent::CheckpointToken { time: globals.last_token_time, tokens: attributed });

    Ok(TokenCheckpoint { attributed, time: globals.last_token_time, caught_up })
}
