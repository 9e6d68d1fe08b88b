//! In-memory funding asset.
//!
//! A minimal fungible-token ledger implementing [`AssetTransfer`]: balances,
//! allowances, minting, a switch that makes transfers decline, and an
//! optional hook invoked after every successful movement. The hook runs with
//! no internal lock held, so it may call back into anything (including the
//! distributor) to model re-entrant collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::AssetError;
use crate::traits::AssetTransfer;
use crate::types::AccountId;

/// Callback `(from, to, amount)` run after a completed transfer.
pub type TransferHook = Arc<dyn Fn(&AccountId, &AccountId, u64) + Send + Sync>;

#[derive(Default)]
struct AssetState {
    balances: HashMap<AccountId, u64>,
    allowances: HashMap<(AccountId, AccountId), u64>,
    total_supply: u64,
}

/// In-memory [`AssetTransfer`] implementation.
pub struct MemoryAsset {
    id: AccountId,
    state: RwLock<AssetState>,
    decline_transfers: AtomicBool,
    hook: RwLock<Option<TransferHook>>,
}

impl MemoryAsset {
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            state: RwLock::new(AssetState::default()),
            decline_transfers: AtomicBool::new(false),
            hook: RwLock::new(None),
        }
    }

    /// Identity of this asset.
    pub fn id(&self) -> AccountId {
        self.id
    }

    /// Create `amount` new units held by `to`.
    pub fn mint(&self, to: &AccountId, amount: u64) -> Result<(), AssetError> {
        let mut state = self.state.write();
        let supply = state
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| AssetError::Rejected("supply overflow".into()))?;
        let balance = state.balances.entry(*to).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| AssetError::Rejected("balance overflow".into()))?;
        state.total_supply = supply;
        Ok(())
    }

    pub fn total_supply(&self) -> u64 {
        self.state.read().total_supply
    }

    /// When set, `transfer` and `transfer_from` return `Ok(false)`.
    pub fn set_decline_transfers(&self, decline: bool) {
        self.decline_transfers.store(decline, Ordering::SeqCst);
    }

    pub fn set_transfer_hook(&self, hook: TransferHook) {
        *self.hook.write() = Some(hook);
    }

    pub fn clear_transfer_hook(&self) {
        *self.hook.write() = None;
    }

    fn move_balance(&self, state: &mut AssetState, from: &AccountId, to: &AccountId, amount: u64) -> Result<(), AssetError> {
        let have = state.balances.get(from).copied().unwrap_or(0);
        if have < amount {
            return Err(AssetError::InsufficientBalance { have, need: amount });
        }
        state.balances.insert(*from, have - amount);
        let dest = state.balances.entry(*to).or_insert(0);
        *dest = dest
            .checked_add(amount)
            .ok_or_else(|| AssetError::Rejected("balance overflow".into()))?;
        Ok(())
    }

    fn run_hook(&self, from: &AccountId, to: &AccountId, amount: u64) {
        let hook = self.hook.read().clone();
        if let Some(hook) = hook {
            hook(from, to, amount);
        }
    }
}

impl AssetTransfer for MemoryAsset {
    fn balance_of(&self, holder: &AccountId) -> Result<u64, AssetError> {
        Ok(self.state.read().balances.get(holder).copied().unwrap_or(0))
    }

    fn transfer(&self, from: &AccountId, to: &AccountId, amount: u64) -> Result<bool, AssetError> {
        if self.decline_transfers.load(Ordering::SeqCst) {
            return Ok(false);
        }
        {
            let mut state = self.state.write();
            self.move_balance(&mut state, from, to, amount)?;
        }
        self.run_hook(from, to, amount);
        Ok(true)
    }

    fn transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> Result<bool, AssetError> {
        if self.decline_transfers.load(Ordering::SeqCst) {
            return Ok(false);
        }
        {
            let mut state = self.state.write();
            let key = (*from, *spender);
            let allowed = state.allowances.get(&key).copied().unwrap_or(0);
            if allowed < amount {
                return Err(AssetError::InsufficientAllowance { have: allowed, need: amount });
            }
            self.move_balance(&mut state, from, to, amount)?;
            // Unlimited approvals are never consumed.
            if allowed != u64::MAX {
                state.allowances.insert(key, allowed - amount);
            }
        }
        self.run_hook(from, to, amount);
        Ok(true)
    }

    fn approve(&self, owner: &AccountId, spender: &AccountId, amount: u64) -> Result<bool, AssetError> {
        self.state.write().allowances.insert((*owner, *spender), amount);
        Ok(true)
    }

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Result<u64, AssetError> {
        Ok(self
            .state
            .read()
            .allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(0))
    }
}
