//! Core distributor types: account identities, ledger points, events.
//!
//! Amounts are `u64` base units; ledger bias and slope are `i128` so that
//! `slope * elapsed` never overflows before clamping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AccountIdError;

/// A 20-byte account identity (holder of locks and funding-asset balances).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct AccountId(pub [u8; 20]);

impl AccountId {
    /// The zero account. Never a valid claimant.
    pub const ZERO: Self = Self([0u8; 20]);

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Deterministic identity derived from a human label (BLAKE3, first 20 bytes).
    ///
    /// Used by simulations and tests to name accounts.
    ///
    /// # Examples
    ///
    /// ```
    /// use sluice_core::types::AccountId;
    /// assert_eq!(AccountId::derive("alice"), AccountId::derive("alice"));
    /// assert_ne!(AccountId::derive("alice"), AccountId::derive("bob"));
    /// ```
    pub fn derive(label: &str) -> Self {
        let digest = blake3::hash(label.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest.as_bytes()[..20]);
        Self(bytes)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for AccountId {
    type Err = AccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let raw = hex::decode(digits).map_err(|_| AccountIdError::InvalidHex)?;
        let bytes: [u8; 20] = raw
            .try_into()
            .map_err(|v: Vec<u8>| AccountIdError::InvalidLength(v.len()))?;
        Ok(Self(bytes))
    }
}

impl From<[u8; 20]> for AccountId {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for AccountId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One entry of a decaying-balance history.
///
/// The balance it describes at time `t` is `max(bias - slope * (t - ts), 0)`,
/// with `t - ts` clamped at zero.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Point {
    pub bias: i128,
    pub slope: i128,
    pub ts: u64,
}

impl Point {
    /// The empty point: zero balance, timestamp zero.
    pub const EMPTY: Self = Self { bias: 0, slope: 0, ts: 0 };

    pub fn new(bias: i128, slope: i128, ts: u64) -> Self {
        Self { bias, slope, ts }
    }

    /// Decayed balance at `t`.
    ///
    /// Queries before `ts` see the undecayed bias rather than an inflated
    /// extrapolation.
    ///
    /// # Examples
    ///
    /// ```
    /// use sluice_core::types::Point;
    /// let p = Point::new(1000, 1, 100);
    /// assert_eq!(p.balance_at(50), 1000);
    /// assert_eq!(p.balance_at(600), 500);
    /// assert_eq!(p.balance_at(5000), 0);
    /// ```
    pub fn balance_at(&self, t: u64) -> u64 {
        let elapsed = i128::from(t.saturating_sub(self.ts));
        let remaining = self
            .bias
            .saturating_sub(self.slope.saturating_mul(elapsed));
        if remaining <= 0 {
            0
        } else {
            u64::try_from(remaining).unwrap_or(u64::MAX)
        }
    }
}

/// A lock as reported back by the ledger after modification.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct LockedBalance {
    pub amount: u64,
    pub end: u64,
}

/// Result of one `claim` call for one account.
///
/// `max_epoch - claim_epoch` is the epoch gap; `caught_up` is false when the
/// iteration bound stopped the walk before the settlement limit.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub account: AccountId,
    pub amount: u64,
    pub claim_epoch: u64,
    pub max_epoch: u64,
    pub week_cursor: u64,
    pub relocked: bool,
    pub caught_up: bool,
}

impl ClaimReceipt {
    /// Zero receipt for an account with nothing to walk.
    pub fn empty(account: AccountId, claim_epoch: u64, max_epoch: u64, week_cursor: u64) -> Self {
        Self {
            account,
            amount: 0,
            claim_epoch,
            max_epoch,
            week_cursor,
            relocked: false,
            caught_up: true,
        }
    }

    pub fn epoch_gap(&self) -> u64 {
        self.max_epoch.saturating_sub(self.claim_epoch)
    }

    /// Whether another `claim` call could still make progress.
    pub fn needs_another_call(&self) -> bool {
        !self.caught_up
    }
}

/// Notifications emitted by committed distributor operations.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DistributorEvent {
    CheckpointToken {
        time: u64,
        tokens: u64,
    },
    CheckpointTotalSupply {
        time_cursor: u64,
    },
    Deposited {
        from: AccountId,
        amount: u64,
    },
    Claimed {
        account: AccountId,
        amount: u64,
        claim_epoch: u64,
        max_epoch: u64,
        relocked: bool,
        /// False when the walk stopped on its iteration bound and another
        /// claim will pay more.
        caught_up: bool,
    },
    RelockAuthorizationToggled {
        account: AccountId,
        delegate: AccountId,
        allowed: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_hex_roundtrip() {
        let id = AccountId::derive("carol");
        let parsed: AccountId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn account_id_parse_without_prefix() {
        let parsed: AccountId = "11".repeat(20).parse().unwrap();
        assert_eq!(parsed, AccountId([0x11; 20]));
    }

    #[test]
    fn account_id_rejects_bad_input() {
        assert_eq!("0xzz".parse::<AccountId>(), Err(AccountIdError::InvalidHex));
        assert_eq!(
            "0xabcd".parse::<AccountId>(),
            Err(AccountIdError::InvalidLength(2))
        );
    }

    #[test]
    fn account_id_serde_as_string() {
        let id = AccountId([0xab; 20]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(20)));
        let back: AccountId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn zero_account() {
        assert!(AccountId::ZERO.is_zero());
        assert!(!AccountId::derive("x").is_zero());
    }

    #[test]
    fn point_clamps_at_zero() {
        let p = Point::new(10, 5, 0);
        assert_eq!(p.balance_at(2), 0);
        assert_eq!(p.balance_at(u64::MAX), 0);
    }

    #[test]
    fn point_before_ts_is_not_inflated() {
        let p = Point::new(1000, 1, 500);
        assert_eq!(p.balance_at(0), 1000);
        assert_eq!(p.balance_at(500), 1000);
    }

    #[test]
    fn point_negative_bias_is_zero() {
        assert_eq!(Point::new(-5, 0, 0).balance_at(0), 0);
    }

    #[test]
    fn point_huge_bias_saturates_to_u64() {
        assert_eq!(Point::new(i128::MAX, 0, 0).balance_at(0), u64::MAX);
    }

    #[test]
    fn empty_point_has_no_balance() {
        assert_eq!(Point::EMPTY.balance_at(12345), 0);
    }

    #[test]
    fn receipt_gap() {
        let mut r = ClaimReceipt::empty(AccountId::ZERO, 2, 5, 0);
        assert_eq!(r.epoch_gap(), 3);
        assert!(!r.needs_another_call());
        r.caught_up = false;
        assert!(r.needs_another_call());
    }

    #[test]
    fn event_serializes_with_tag() {
        let ev = DistributorEvent::CheckpointToken { time: 1, tokens: 2 };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "checkpoint_token");
        assert_eq!(json["tokens"], 2);
    }

    proptest::proptest! {
        #[test]
        fn decay_is_monotone_and_bounded(
            bias in 0i128..1_000_000_000_000,
            slope in 0i128..1_000_000,
            ts in 0u64..1_000_000,
            dt1 in 0u64..10_000_000,
            dt2 in 0u64..10_000_000,
        ) {
            let p = Point::new(bias, slope, ts);
            let (a, b) = (ts + dt1.min(dt2), ts + dt1.max(dt2));
            proptest::prop_assert!(p.balance_at(a) >= p.balance_at(b));
            proptest::prop_assert!(u128::from(p.balance_at(a)) <= bias as u128);
        }

        #[test]
        fn decay_strictly_decreases_while_positive(
            slope in 1i128..1_000,
            ts in 0u64..1_000_000,
            dt in 0u64..1_000,
        ) {
            let p = Point::new(slope * 10_000, slope, ts);
            proptest::prop_assert!(p.balance_at(ts + dt + 1) < p.balance_at(ts + dt));
        }
    }
}
