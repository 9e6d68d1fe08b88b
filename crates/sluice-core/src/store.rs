//! Distributor state storage interface and in-memory implementation.
//!
//! Provides the [`DistributorStore`] trait over the distributor's persisted
//! entities (globals, per-week tables, per-account cursors, relock
//! delegations). Writes are never issued field by field: an operation stages
//! a [`StateDelta`] and hands it to [`DistributorStore::apply`] once every
//! external call has succeeded, so a failed operation leaves nothing behind.
//!
//! The [`MemoryStore`] is suitable for tests and simulations; the persistent
//! store lives in sluice-node (RocksDB).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::week_floor;
use crate::error::SluiceError;
use crate::types::AccountId;

/// Distributor-wide scalar state.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Globals {
    /// Week at which accounting began. Immutable.
    pub start_time: u64,
    /// Instant of the last token checkpoint (not floored).
    pub last_token_time: u64,
    /// Supply snapshots exist for every week in `[start_time, time_cursor)`.
    pub time_cursor: u64,
    /// Funding-asset balance last accounted for.
    pub token_last_balance: u64,
}

impl Globals {
    /// Initial state for a distributor starting at `start_time` (floored).
    pub fn genesis(start_time: u64) -> Self {
        let start = week_floor(start_time);
        Self {
            start_time: start,
            last_token_time: start,
            time_cursor: start,
            token_last_balance: 0,
        }
    }
}

/// Resumable claim progress of one account.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct AccountCursor {
    /// Weeks strictly before this have been settled.
    pub time_cursor: u64,
    /// Ledger epoch last consulted for this account.
    pub user_epoch: u64,
}

/// One row of the per-week tables.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct WeekRecord {
    pub week: u64,
    pub tokens: u64,
    pub ve_supply: Option<u64>,
}

/// Staged writes of one operation. Values are absolute, not increments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateDelta {
    pub globals: Option<Globals>,
    pub tokens_per_week: BTreeMap<u64, u64>,
    pub ve_supply: BTreeMap<u64, u64>,
    pub accounts: BTreeMap<AccountId, AccountCursor>,
    pub relock: BTreeMap<(AccountId, AccountId), bool>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        self.globals.is_none()
            && self.tokens_per_week.is_empty()
            && self.ve_supply.is_empty()
            && self.accounts.is_empty()
            && self.relock.is_empty()
    }
}

/// Distributor state storage interface.
///
/// Readers return defaults for absent keys (zero tokens, no snapshot, no
/// cursor, no delegation). Invariants are enforced by the staging layer in
/// sluice-distributor before a delta reaches [`apply`](Self::apply); stores
/// persist deltas verbatim and atomically.
pub trait DistributorStore: Send + Sync {
    fn globals(&self) -> Result<Globals, SluiceError>;

    fn tokens_per_week(&self, week: u64) -> Result<u64, SluiceError>;

    /// Supply snapshot for `week`, `None` if not yet written.
    fn ve_supply(&self, week: u64) -> Result<Option<u64>, SluiceError>;

    /// Claim cursor of `account`, `None` if it has never claimed.
    fn account_cursor(&self, account: &AccountId) -> Result<Option<AccountCursor>, SluiceError>;

    fn relock_allowed(&self, account: &AccountId, delegate: &AccountId) -> Result<bool, SluiceError>;

    /// Commit a delta atomically.
    fn apply(&mut self, delta: StateDelta) -> Result<(), SluiceError>;

    /// Rows for weeks in `[from, to)` that hold tokens or a snapshot.
    fn week_table(&self, from: u64, to: u64) -> Result<Vec<WeekRecord>, SluiceError>;
}

/// In-memory distributor state for tests and simulations.
///
/// No persistence; everything lives in `BTreeMap`s.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    globals: Globals,
    tokens_per_week: BTreeMap<u64, u64>,
    ve_supply: BTreeMap<u64, u64>,
    accounts: BTreeMap<AccountId, AccountCursor>,
    relock: BTreeMap<(AccountId, AccountId), bool>,
}

impl MemoryStore {
    /// Create an empty store whose accounting begins at `start_time` (floored).
    pub fn new(start_time: u64) -> Self {
        Self {
            globals: Globals::genesis(start_time),
            tokens_per_week: BTreeMap::new(),
            ve_supply: BTreeMap::new(),
            accounts: BTreeMap::new(),
            relock: BTreeMap::new(),
        }
    }

    /// Number of accounts with a stored cursor.
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Sum of every week's attributed tokens.
    pub fn total_distributed(&self) -> u64 {
        self.tokens_per_week.values().sum()
    }
}

impl DistributorStore for MemoryStore {
    fn globals(&self) -> Result<Globals, SluiceError> {
        Ok(self.globals)
    }

    fn tokens_per_week(&self, week: u64) -> Result<u64, SluiceError> {
        Ok(self.tokens_per_week.get(&week).copied().unwrap_or(0))
    }

    fn ve_supply(&self, week: u64) -> Result<Option<u64>, SluiceError> {
        Ok(self.ve_supply.get(&week).copied())
    }

    fn account_cursor(&self, account: &AccountId) -> Result<Option<AccountCursor>, SluiceError> {
        Ok(self.accounts.get(account).copied())
    }

    fn relock_allowed(&self, account: &AccountId, delegate: &AccountId) -> Result<bool, SluiceError> {
        Ok(self.relock.get(&(*account, *delegate)).copied().unwrap_or(false))
    }

    fn apply(&mut self, delta: StateDelta) -> Result<(), SluiceError> {
        if let Some(globals) = delta.globals {
            self.globals = globals;
        }
        self.tokens_per_week.extend(delta.tokens_per_week);
        self.ve_supply.extend(delta.ve_supply);
        self.accounts.extend(delta.accounts);
        for (key, allowed) in delta.relock {
            if allowed {
                self.relock.insert(key, true);
            } else {
                self.relock.remove(&key);
            }
        }
        Ok(())
    }

    fn week_table(&self, from: u64, to: u64) -> Result<Vec<WeekRecord>, SluiceError> {
        let mut rows: BTreeMap<u64, WeekRecord> = BTreeMap::new();
        for (&week, &tokens) in self.tokens_per_week.range(from..to) {
            rows.entry(week)
                .or_insert(WeekRecord { week, tokens: 0, ve_supply: None })
                .tokens = tokens;
        }
        for (&week, &supply) in self.ve_supply.range(from..to) {
            rows.entry(week)
                .or_insert(WeekRecord { week, tokens: 0, ve_supply: None })
                .ve_supply = Some(supply);
        }
        Ok(rows.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::WEEK;

    fn alice() -> AccountId {
        AccountId([1; 20])
    }

    fn bob() -> AccountId {
        AccountId([2; 20])
    }

    #[test]
    fn genesis_floors_start_time() {
        let store = MemoryStore::new(WEEK + 17);
        let g = store.globals().unwrap();
        assert_eq!(g.start_time, WEEK);
        assert_eq!(g.last_token_time, WEEK);
        assert_eq!(g.time_cursor, WEEK);
        assert_eq!(g.token_last_balance, 0);
    }

    #[test]
    fn absent_keys_read_as_defaults() {
        let store = MemoryStore::new(0);
        assert_eq!(store.tokens_per_week(WEEK).unwrap(), 0);
        assert_eq!(store.ve_supply(WEEK).unwrap(), None);
        assert_eq!(store.account_cursor(&alice()).unwrap(), None);
        assert!(!store.relock_allowed(&alice(), &bob()).unwrap());
    }

    #[test]
    fn apply_writes_every_table() {
        let mut store = MemoryStore::new(0);
        let mut delta = StateDelta::default();
        delta.globals = Some(Globals { time_cursor: WEEK, ..Globals::genesis(0) });
        delta.tokens_per_week.insert(0, 700);
        delta.ve_supply.insert(0, 1000);
        delta.accounts.insert(alice(), AccountCursor { time_cursor: WEEK, user_epoch: 1 });
        delta.relock.insert((alice(), bob()), true);
        store.apply(delta).unwrap();

        assert_eq!(store.globals().unwrap().time_cursor, WEEK);
        assert_eq!(store.tokens_per_week(0).unwrap(), 700);
        assert_eq!(store.ve_supply(0).unwrap(), Some(1000));
        assert_eq!(store.account_cursor(&alice()).unwrap().unwrap().user_epoch, 1);
        assert!(store.relock_allowed(&alice(), &bob()).unwrap());
        assert!(!store.relock_allowed(&bob(), &alice()).unwrap());
        assert_eq!(store.account_count(), 1);
    }

    #[test]
    fn relock_toggle_off_removes_entry() {
        let mut store = MemoryStore::new(0);
        let mut on = StateDelta::default();
        on.relock.insert((alice(), bob()), true);
        store.apply(on).unwrap();
        let mut off = StateDelta::default();
        off.relock.insert((alice(), bob()), false);
        store.apply(off).unwrap();
        assert!(!store.relock_allowed(&alice(), &bob()).unwrap());
    }

    #[test]
    fn empty_delta_is_noop() {
        let mut store = MemoryStore::new(0);
        let before = store.globals().unwrap();
        assert!(StateDelta::default().is_empty());
        store.apply(StateDelta::default()).unwrap();
        assert_eq!(store.globals().unwrap(), before);
    }

    #[test]
    fn week_table_merges_tables() {
        let mut store = MemoryStore::new(0);
        let mut delta = StateDelta::default();
        delta.tokens_per_week.insert(0, 5);
        delta.tokens_per_week.insert(2 * WEEK, 7);
        delta.ve_supply.insert(0, 10);
        delta.ve_supply.insert(WEEK, 11);
        store.apply(delta).unwrap();

        let rows = store.week_table(0, 3 * WEEK).unwrap();
        assert_eq!(
            rows,
            vec![
                WeekRecord { week: 0, tokens: 5, ve_supply: Some(10) },
                WeekRecord { week: WEEK, tokens: 0, ve_supply: Some(11) },
                WeekRecord { week: 2 * WEEK, tokens: 7, ve_supply: None },
            ]
        );
        assert_eq!(store.total_distributed(), 12);
        assert!(store.week_table(3 * WEEK, 4 * WEEK).unwrap().is_empty());
    }
}
