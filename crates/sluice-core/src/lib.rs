//! # sluice-core
//! Foundation types, collaborator traits and state storage for the sluice
//! fee distributor.
//!
//! The in-memory collaborators ([`ledger::MemoryLedger`],
//! [`asset::MemoryAsset`], [`clock::ManualClock`]) back tests and the
//! scenario simulator.

pub mod asset;
pub mod clock;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod store;
pub mod traits;
pub mod types;
