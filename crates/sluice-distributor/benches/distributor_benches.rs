//! Criterion benchmarks for sluice-distributor hot paths.
//!
//! Covers: epoch search over a long history and a full-length claim walk.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use sluice_core::asset::MemoryAsset;
use sluice_core::clock::ManualClock;
use sluice_core::constants::WEEK;
use sluice_core::ledger::MemoryLedger;
use sluice_core::store::MemoryStore;
use sluice_core::types::{AccountId, Point};
use sluice_distributor::epoch::find_epoch;
use sluice_distributor::FeeDistributor;

fn bench_find_epoch(c: &mut Criterion) {
    let ts: Vec<u64> = (0..1_000_000u64).map(|i| i * 7).collect();
    let max = ts.len() as u64 - 1;

    c.bench_function("find_epoch_1m", |b| {
        b.iter(|| find_epoch(black_box(3_500_001), max, 128, |i| Ok(ts[i as usize])))
    });
}

fn bench_claim_50_weeks(c: &mut Criterion) {
    c.bench_function("claim_50_weeks", |b| {
        b.iter_batched(
            || {
                let clock = Arc::new(ManualClock::new(0));
                let asset = Arc::new(MemoryAsset::new(AccountId::derive("asset")));
                let ledger = Arc::new(MemoryLedger::new(
                    AccountId::derive("ledger"),
                    AccountId::derive("asset"),
                    clock.clone(),
                ));
                let alice = AccountId::derive("alice");
                ledger.push_user_point(&alice, Point::new(1_000_000, 0, 0)).unwrap();
                ledger.push_global_point(Point::new(1_000_000, 0, 0)).unwrap();
                let dist = FeeDistributor::new(
                    AccountId::derive("distributor"),
                    MemoryStore::new(0),
                    ledger,
                    asset.clone(),
                    clock.clone(),
                );
                asset.mint(&dist.account(), 49_000_000).unwrap();
                // Catch the checkpoints up so the timed claim only walks.
                for step in 1..=3 {
                    clock.set(step * 20 * WEEK);
                    dist.checkpoint_total_supply().unwrap();
                    dist.checkpoint_token().unwrap();
                }
                (dist, alice)
            },
            |(dist, alice)| dist.claim(&alice, None, false).unwrap(),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_find_epoch, bench_claim_50_weeks);
criterion_main!(benches);
