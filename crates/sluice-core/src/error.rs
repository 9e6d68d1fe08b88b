//! Error types for the sluice distributor.
use thiserror::Error;

use crate::types::AccountId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountIdError {
    #[error("invalid hex")] InvalidHex,
    #[error("invalid length: {0} bytes, expected 20")] InvalidLength(usize),
}

/// Precondition failures of the checkpoint operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    #[error("token checkpoint cooling down: now {now}, ready after {ready_after}")] Cooldown { now: u64, ready_after: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    #[error("re-entrant call while an operation is in flight")] Reentrancy,
    #[error("transfer of {amount} to {to} failed")] TransferFailed { to: AccountId, amount: u64 },
    #[error("deposit pull of {amount} from {from} failed")] PullFailed { from: AccountId, amount: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("unknown epoch {epoch} (max {max})")] UnknownEpoch { epoch: u64, max: u64 },
    #[error("no lock for {0}")] NoLock(AccountId),
    #[error("lock for {0} already exists")] LockExists(AccountId),
    #[error("lock for {0} has expired")] LockExpired(AccountId),
    #[error("zero amount")] ZeroAmount,
    #[error("unlock time must be in the future and increase: got {got}, current {current}")] UnlockTimeNotIncreasing { got: u64, current: u64 },
    #[error("unlock time {got} beyond max {max}")] UnlockTimeTooFar { got: u64, max: u64 },
    #[error("ledger rejected: {0}")] Rejected(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    #[error("insufficient balance: have {have}, need {need}")] InsufficientBalance { have: u64, need: u64 },
    #[error("insufficient allowance: have {have}, need {need}")] InsufficientAllowance { have: u64, need: u64 },
    #[error("asset rejected: {0}")] Rejected(String),
}

/// Violations of the distributor state invariants, raised by the access layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("{what} key {ts} is not week aligned")] Unaligned { what: &'static str, ts: u64 },
    #[error("{what} would move backwards: {from} -> {to}")] Regression { what: &'static str, from: u64, to: u64 },
    #[error("supply snapshot for week {0} already written")] SnapshotOverwrite(u64),
    #[error("time cursor {cursor} ahead of now {now}")] CursorAheadOfNow { cursor: u64, now: u64 },
    #[error("account cursor {account_cursor} ahead of supply cursor {time_cursor}")] AccountAheadOfSupply { account_cursor: u64, time_cursor: u64 },
    #[error("tracked balance underflow: {have} - {sub}")] Underflow { have: u64, sub: u64 },
}

#[derive(Error, Debug)]
pub enum SluiceError {
    #[error(transparent)] Checkpoint(#[from] CheckpointError),
    #[error(transparent)] Claim(#[from] ClaimError),
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error(transparent)] Asset(#[from] AssetError),
    #[error(transparent)] State(#[from] StateError),
    #[error(transparent)] AccountId(#[from] AccountIdError),
    #[error("arithmetic overflow")] ArithmeticOverflow,
    #[error("storage: {0}")] Storage(String),
    #[error("config: {0}")] Config(String),
}

impl SluiceError {
    /// Whether this is a precondition failure that left no state behind
    /// (cooldown or re-entrancy).
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Checkpoint(CheckpointError::Cooldown { .. })
                | Self::Claim(ClaimError::Reentrancy)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_classification() {
        let cooldown: SluiceError = CheckpointError::Cooldown { now: 1, ready_after: 2 }.into();
        assert!(cooldown.is_precondition());
        assert!(SluiceError::from(ClaimError::Reentrancy).is_precondition());
        assert!(!SluiceError::ArithmeticOverflow.is_precondition());
    }

    #[test]
    fn messages_carry_context() {
        let err = StateError::Regression { what: "time_cursor", from: 10, to: 5 };
        assert_eq!(err.to_string(), "time_cursor would move backwards: 10 -> 5");
        let err: SluiceError = AssetError::InsufficientBalance { have: 1, need: 2 }.into();
        assert_eq!(err.to_string(), "insufficient balance: have 1, need 2");
    }
}
