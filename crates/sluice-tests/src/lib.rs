//! Integration and adversarial test suite for the Sluice fee distributor.
//!
//! The tests drive the distributor through its public operations against
//! the in-memory ledger and asset, and try to break its accounting
//! invariants from a hostile caller's or collaborator's side.

pub mod helpers;
