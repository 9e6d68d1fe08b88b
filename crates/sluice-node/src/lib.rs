//! # sluice-node: persistent distributor composition.
//!
//! - [`storage::RocksStore`]: distributor state backed by RocksDB
//! - [`config::NodeConfig`]: layered file/environment configuration
//! - [`keeper::Keeper`]: repeats bounded operations until they catch up

pub mod config;
pub mod keeper;
pub mod storage;

pub use config::NodeConfig;
pub use keeper::{Keeper, KeeperReport};
pub use storage::RocksStore;
