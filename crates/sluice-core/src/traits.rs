//! Trait interfaces for the distributor's collaborators.
//!
//! These traits define the seams between the distributor and the outside:
//! - [`DecayLedger`]: the external decaying-balance lock ledger (read-mostly oracle)
//! - [`AssetTransfer`]: the fungible funding asset
//! - [`Clock`]: wall-clock time source
//!
//! The distributor never stores ledger points; it reads them through
//! [`DecayLedger`] and re-derives balances with [`Point::balance_at`].

use crate::error::{AssetError, LedgerError};
use crate::types::{AccountId, LockedBalance, Point};

/// Append-only history of decaying lock balances.
///
/// Epoch indices are ordered by timestamp. Global epoch 0 is the ledger's
/// genesis point; per-account epochs start at 1 and `point_epoch == 0` means
/// the account has never locked.
pub trait DecayLedger: Send + Sync {
    /// Identity under which the ledger holds assets (spender for relock approvals).
    fn account(&self) -> AccountId;

    /// Identity of the funding asset locked in this ledger.
    fn funding_asset(&self) -> AccountId;

    /// Latest global epoch index.
    fn global_epoch(&self) -> Result<u64, LedgerError>;

    /// Global point at `epoch`.
    fn point_history(&self, epoch: u64) -> Result<Point, LedgerError>;

    /// Latest epoch index of `account`'s own history (0 if none).
    fn point_epoch(&self, account: &AccountId) -> Result<u64, LedgerError>;

    /// `account`'s point at `epoch`. Epoch 0 is the empty point.
    fn user_point_history(&self, account: &AccountId, epoch: u64) -> Result<Point, LedgerError>;

    /// Bring the global history up to the current time.
    fn checkpoint(&self) -> Result<(), LedgerError>;

    /// Add `amount` to `account`'s lock and optionally extend it.
    ///
    /// `unlock_time == 0` keeps the current unlock time. The ledger pulls
    /// `amount` of the funding asset from `funder` using `funder`'s approval.
    fn modify_lock(
        &self,
        funder: &AccountId,
        amount: u64,
        unlock_time: u64,
        account: &AccountId,
    ) -> Result<LockedBalance, LedgerError>;
}

/// Fungible funding-asset operations.
///
/// Transfer-style calls return `Ok(false)` when the asset declines the
/// movement without raising; callers treat both as failure.
pub trait AssetTransfer: Send + Sync {
    fn balance_of(&self, holder: &AccountId) -> Result<u64, AssetError>;

    /// Move `amount` from `from` to `to`, authorized by `from`.
    fn transfer(&self, from: &AccountId, to: &AccountId, amount: u64) -> Result<bool, AssetError>;

    /// Move `amount` from `from` to `to` using `spender`'s allowance.
    fn transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> Result<bool, AssetError>;

    fn approve(&self, owner: &AccountId, spender: &AccountId, amount: u64) -> Result<bool, AssetError>;

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Result<u64, AssetError>;
}

/// Source of the current Unix time in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    // ------------------------------------------------------------------
    // Mock: DecayLedger with fixed histories
    // ------------------------------------------------------------------

    struct FixedLedger {
        global: Vec<Point>,
        users: HashMap<AccountId, Vec<Point>>,
    }

    impl DecayLedger for FixedLedger {
        fn account(&self) -> AccountId {
            AccountId([0xee; 20])
        }

        fn funding_asset(&self) -> AccountId {
            AccountId([0xaa; 20])
        }

        fn global_epoch(&self) -> Result<u64, LedgerError> {
            Ok(self.global.len() as u64 - 1)
        }

        fn point_history(&self, epoch: u64) -> Result<Point, LedgerError> {
            self.global
                .get(epoch as usize)
                .copied()
                .ok_or(LedgerError::UnknownEpoch { epoch, max: self.global.len() as u64 - 1 })
        }

        fn point_epoch(&self, account: &AccountId) -> Result<u64, LedgerError> {
            Ok(self.users.get(account).map_or(0, |h| h.len() as u64))
        }

        fn user_point_history(&self, account: &AccountId, epoch: u64) -> Result<Point, LedgerError> {
            if epoch == 0 {
                return Ok(Point::EMPTY);
            }
            Ok(self
                .users
                .get(account)
                .and_then(|h| h.get(epoch as usize - 1))
                .copied()
                .unwrap_or(Point::EMPTY))
        }

        fn checkpoint(&self) -> Result<(), LedgerError> {
            Ok(())
        }

        fn modify_lock(&self, _: &AccountId, _: u64, _: u64, account: &AccountId) -> Result<LockedBalance, LedgerError> {
            Err(LedgerError::NoLock(*account))
        }
    }

    // ------------------------------------------------------------------
    // Mock: AssetTransfer that never moves anything
    // ------------------------------------------------------------------

    struct FrozenAsset;

    impl AssetTransfer for FrozenAsset {
        fn balance_of(&self, _: &AccountId) -> Result<u64, AssetError> {
            Ok(0)
        }

        fn transfer(&self, _: &AccountId, _: &AccountId, _: u64) -> Result<bool, AssetError> {
            Ok(false)
        }

        fn transfer_from(&self, _: &AccountId, _: &AccountId, _: &AccountId, _: u64) -> Result<bool, AssetError> {
            Ok(false)
        }

        fn approve(&self, _: &AccountId, _: &AccountId, _: u64) -> Result<bool, AssetError> {
            Ok(true)
        }

        fn allowance(&self, _: &AccountId, _: &AccountId) -> Result<u64, AssetError> {
            Ok(0)
        }
    }

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn ledger_is_object_safe() {
        let alice = AccountId([1; 20]);
        let ledger = FixedLedger {
            global: vec![Point::EMPTY, Point::new(100, 1, 10)],
            users: HashMap::from([(alice, vec![Point::new(100, 1, 10)])]),
        };
        let dyn_ledger: &dyn DecayLedger = &ledger;
        assert_eq!(dyn_ledger.global_epoch().unwrap(), 1);
        assert_eq!(dyn_ledger.point_epoch(&alice).unwrap(), 1);
        assert_eq!(dyn_ledger.user_point_history(&alice, 0).unwrap(), Point::EMPTY);
        assert_eq!(dyn_ledger.user_point_history(&alice, 1).unwrap().bias, 100);
        assert!(dyn_ledger.point_history(7).is_err());
    }

    #[test]
    fn unknown_account_has_no_history() {
        let ledger = FixedLedger { global: vec![Point::EMPTY], users: HashMap::new() };
        assert_eq!(ledger.point_epoch(&AccountId([9; 20])).unwrap(), 0);
    }

    #[test]
    fn asset_is_object_safe() {
        let asset: &dyn AssetTransfer = &FrozenAsset;
        let a = AccountId([1; 20]);
        let b = AccountId([2; 20]);
        assert!(!asset.transfer(&a, &b, 5).unwrap());
        assert!(asset.approve(&a, &b, 5).unwrap());
        assert_eq!(asset.allowance(&a, &b).unwrap(), 0);
    }

    #[test]
    fn clock_is_object_safe() {
        let clock: &dyn Clock = &FixedClock(42);
        assert_eq!(clock.now(), 42);
    }
}
