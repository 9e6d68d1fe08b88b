//! RocksStore persistence, plus a distributor running on top of it.

use std::sync::Arc;

use sluice_core::asset::MemoryAsset;
use sluice_core::clock::ManualClock;
use sluice_core::constants::WEEK;
use sluice_core::ledger::MemoryLedger;
use sluice_core::store::{AccountCursor, DistributorStore, Globals, StateDelta, WeekRecord};
use sluice_core::types::{AccountId, Point};
use sluice_distributor::FeeDistributor;
use sluice_node::storage::RocksStore;

fn id(label: &str) -> AccountId {
    AccountId::derive(label)
}

#[test]
fn fresh_store_holds_genesis() {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksStore::open(dir.path().join("state"), 3 * WEEK + 17).unwrap();
    assert_eq!(store.globals().unwrap(), Globals::genesis(3 * WEEK));
    assert_eq!(store.tokens_per_week(3 * WEEK).unwrap(), 0);
    assert_eq!(store.ve_supply(3 * WEEK).unwrap(), None);
    assert_eq!(store.account_cursor(&id("alice")).unwrap(), None);
    assert!(!store.relock_allowed(&id("alice"), &id("bob")).unwrap());
    assert!(store.weeks().unwrap().is_empty());
}

#[test]
fn apply_writes_every_table() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = RocksStore::open(dir.path(), 0).unwrap();

    let mut delta = StateDelta::default();
    delta.globals = Some(Globals { last_token_time: WEEK + 5, time_cursor: WEEK, token_last_balance: 900, ..Globals::genesis(0) });
    delta.tokens_per_week.insert(0, 600);
    delta.tokens_per_week.insert(WEEK, 300);
    delta.ve_supply.insert(0, 1000);
    delta.accounts.insert(id("alice"), AccountCursor { time_cursor: WEEK, user_epoch: 2 });
    delta.relock.insert((id("alice"), id("bob")), true);
    store.apply(delta).unwrap();

    assert_eq!(store.globals().unwrap().token_last_balance, 900);
    assert_eq!(store.tokens_per_week(WEEK).unwrap(), 300);
    assert_eq!(store.ve_supply(0).unwrap(), Some(1000));
    assert_eq!(store.account_cursor(&id("alice")).unwrap(), Some(AccountCursor { time_cursor: WEEK, user_epoch: 2 }));
    assert!(store.relock_allowed(&id("alice"), &id("bob")).unwrap());
    assert!(!store.relock_allowed(&id("bob"), &id("alice")).unwrap());
    assert_eq!(
        store.weeks().unwrap(),
        vec![
            WeekRecord { week: 0, tokens: 600, ve_supply: Some(1000) },
            WeekRecord { week: WEEK, tokens: 300, ve_supply: None },
        ]
    );
    assert_eq!(store.accounts().unwrap().len(), 1);
}

#[test]
fn revoked_relock_is_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = RocksStore::open(dir.path(), 0).unwrap();
    let key = (id("alice"), id("bob"));

    let mut grant = StateDelta::default();
    grant.relock.insert(key, true);
    store.apply(grant).unwrap();
    let mut revoke = StateDelta::default();
    revoke.relock.insert(key, false);
    store.apply(revoke).unwrap();

    assert!(!store.relock_allowed(&key.0, &key.1).unwrap());
}

#[test]
fn week_table_is_half_open_and_ordered() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = RocksStore::open(dir.path(), 0).unwrap();
    let mut delta = StateDelta::default();
    // Insert out of order; big-endian keys must still iterate by week.
    for w in [300u64, 2, 256, 0, 1] {
        delta.tokens_per_week.insert(w * WEEK, w + 1);
    }
    store.apply(delta).unwrap();

    let rows = store.week_table(WEEK, 300 * WEEK).unwrap();
    let weeks: Vec<u64> = rows.iter().map(|r| r.week / WEEK).collect();
    assert_eq!(weeks, vec![1, 2, 256]);
}

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut store = RocksStore::open(dir.path(), 0).unwrap();
        let mut delta = StateDelta::default();
        delta.ve_supply.insert(0, 42);
        delta.globals = Some(Globals { time_cursor: WEEK, ..Globals::genesis(0) });
        store.apply(delta).unwrap();
        store.flush().unwrap();
    }
    // A different start time on reopen is ignored.
    let store = RocksStore::open(dir.path(), 10 * WEEK).unwrap();
    assert_eq!(store.globals().unwrap().start_time, 0);
    assert_eq!(store.globals().unwrap().time_cursor, WEEK);
    assert_eq!(store.ve_supply(0).unwrap(), Some(42));
}

#[test]
fn distributor_over_rocks_store_claims_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let alice = id("alice");

    let clock = Arc::new(ManualClock::new(0));
    let asset = Arc::new(MemoryAsset::new(id("asset")));
    let ledger = Arc::new(MemoryLedger::new(id("ledger"), id("asset"), clock.clone()));
    ledger.push_user_point(&alice, Point::new(1000, 0, 0)).unwrap();
    ledger.push_global_point(Point::new(1000, 0, 0)).unwrap();

    let store = RocksStore::open(dir.path(), 0).unwrap();
    let dist = FeeDistributor::new(id("distributor"), store, ledger.clone(), asset.clone(), clock.clone());
    asset.mint(&dist.account(), 2000).unwrap();
    clock.set(2 * WEEK);

    let paid = dist.claim(&alice, None, false).unwrap();
    assert_eq!(paid, 2000);
    assert_eq!(asset.balance_of(&alice).unwrap(), 2000);

    let store = dist.into_store();
    store.flush().unwrap();
    drop(store);

    let store = RocksStore::open(dir.path(), 0).unwrap();
    let g = store.globals().unwrap();
    assert_eq!(g.time_cursor, 2 * WEEK);
    assert_eq!(g.last_token_time, 2 * WEEK);
    assert_eq!(g.token_last_balance, 0);
    assert_eq!(store.account_cursor(&alice).unwrap(), Some(AccountCursor { time_cursor: 2 * WEEK, user_epoch: 1 }));
    assert_eq!(store.ve_supply(WEEK).unwrap(), Some(1000));
}
