//! # sluice-distributor: weekly-bucketed fee distribution.
//!
//! All arithmetic is integer-only; products use `u128` intermediates.
//!
//! The engine is four bounded loops over an append-only external history:
//! - **Epoch search** ([`epoch`]): greatest ledger index at or before a time.
//! - **Token checkpoint** ([`tokens`]): spreads new funds over elapsed weeks.
//! - **Supply checkpoint** ([`supply`]): snapshots total balance per week.
//! - **Claim walk** ([`claim`]): settles an account's unclaimed weeks.
//!
//! [`FeeDistributor`] composes them with staged, all-or-nothing commits.

pub mod claim;
pub mod distributor;
pub mod epoch;
pub mod params;
pub mod state;
pub mod supply;
pub mod tokens;

pub use distributor::FeeDistributor;
pub use params::DistributorParams;
