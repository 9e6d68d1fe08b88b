//! Supply checkpoint: weekly snapshots of the ledger's total balance.
//!
//! `time_cursor` is the exclusive end of the snapshotted range. A week is
//! snapshotted only once it has fully started and `now` has moved past its
//! boundary, so `time_cursor` never exceeds `week_floor(now)`.

use tracing::debug;

use sluice_core::constants::{week_floor, WEEK};
use sluice_core::error::SluiceError;
use sluice_core::store::DistributorStore;
use sluice_core::traits::DecayLedger;

use crate::epoch::find_global_epoch;
use crate::state::StateView;

/// Result of one supply checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupplyCheckpoint {
    /// Weeks snapshotted by this call.
    pub weeks: u32,
    /// New `time_cursor`.
    pub time_cursor: u64,
    /// Whether `time_cursor` reached `week_floor(now)`.
    pub caught_up: bool,
}

/// Bring the ledger's global history up to date, then snapshot up to
/// `max_weeks` pending weeks.
pub fn checkpoint_total_supply<S: DistributorStore + ?Sized>(
    view: &mut StateView<'_, S>,
    ledger: &dyn DecayLedger,
    max_weeks: u32,
    search_iterations: u32,
) -> Result<SupplyCheckpoint, SluiceError> {
    ledger.checkpoint()?;

    let mut globals = view.globals()?;
    let rounded = week_floor(view.now());
    let mut t = globals.time_cursor;
    let mut weeks = 0u32;

    while weeks < max_weeks && t < rounded {
        let epoch = find_global_epoch(ledger, t, search_iterations)?;
        let point = ledger.point_history(epoch)?;
        let supply = point.balance_at(t);
        view.write_ve_supply(t, supply)?;
        debug!(week = t, epoch, supply, "supply checkpoint: week snapshotted");
        t += WEEK;
        weeks += 1;
    }

    if t != globals.time_cursor {
        globals.time_cursor = t;
        view.set_globals(globals)?;
    }
    Ok(SupplyCheckpoint { weeks, time_cursor: t, caught_up: t >= rounded })
}
