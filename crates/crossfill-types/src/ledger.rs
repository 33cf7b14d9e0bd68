//! Ledger snapshot types.
//!
//! Snapshots are immutable values read at a specific [`BlockRef`]. They live
//! for one settlement attempt and are never cached across attempts.

use std::{fmt, str::FromStr};

use alloy_primitives::{Address, I256, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{CrossfillError, Result};

/// Which block a ledger read is evaluated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockRef {
    Latest,
    Pinned(u64),
}

impl BlockRef {
    #[must_use]
    pub fn height(self) -> Option<u64> {
        match self {
            Self::Latest => None,
            Self::Pinned(h) => Some(h),
        }
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => write!(f, "latest"),
            Self::Pinned(h) => write!(f, "#{h}"),
        }
    }
}

/// Balance of one asset held by one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalanceSnapshot {
    pub account: Address,
    pub asset: Address,
    pub amount: U256,
    pub block: BlockRef,
}

impl TokenBalanceSnapshot {
    /// Fail with `InsufficientBalance` unless the snapshot covers `needed`.
    pub fn require(&self, needed: U256) -> Result<()> {
        if self.amount < needed {
            return Err(CrossfillError::InsufficientBalance {
                account: self.account,
                asset: self.asset,
                needed,
                available: self.amount,
            });
        }
        Ok(())
    }
}

/// Amount of `asset` that `owner` has approved `spender` to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceSnapshot {
    pub owner: Address,
    pub asset: Address,
    pub spender: Address,
    pub approved: U256,
    pub block: BlockRef,
}

impl AllowanceSnapshot {
    #[must_use]
    pub fn covers(&self, needed: U256) -> bool {
        self.approved >= needed
    }

    /// Fail with `InsufficientAllowance` unless the snapshot covers `needed`.
    pub fn require(&self, needed: U256) -> Result<()> {
        if !self.covers(needed) {
            return Err(CrossfillError::InsufficientAllowance {
                owner: self.owner,
                asset: self.asset,
                spender: self.spender,
                needed,
                approved: self.approved,
            });
        }
        Ok(())
    }
}

/// Expected change of one asset's balance for the engine account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceMovement {
    pub asset: Address,
    pub credit: U256,
    pub debit: U256,
}

impl BalanceMovement {
    /// Balance expected after the movement, or `None` on underflow/overflow.
    #[must_use]
    pub fn apply(&self, before: U256) -> Option<U256> {
        before.checked_add(self.credit)?.checked_sub(self.debit)
    }

    /// Net signed effect of the movement.
    pub fn net(&self) -> Result<I256> {
        signed_delta(self.debit, self.credit)
    }
}

/// Merge per-asset movements so that each asset appears once.
#[must_use]
pub fn merge_movements(
    movements: impl IntoIterator<Item = BalanceMovement>,
) -> Vec<BalanceMovement> {
    let mut merged: Vec<BalanceMovement> = Vec::new();
    for m in movements {
        if let Some(existing) = merged.iter_mut().find(|e| e.asset == m.asset) {
            existing.credit = existing.credit.saturating_add(m.credit);
            existing.debit = existing.debit.saturating_add(m.debit);
        } else {
            merged.push(m);
        }
    }
    merged
}

/// `after - before` as a signed 256-bit integer.
pub fn signed_delta(before: U256, after: U256) -> Result<I256> {
    let overflow = || CrossfillError::Internal(format!("delta {after} - {before} overflows I256"));
    if after >= before {
        I256::try_from(after - before).map_err(|_| overflow())
    } else {
        I256::try_from(before - after)
            .map(|d| -d)
            .map_err(|_| overflow())
    }
}

/// Render a base-unit amount in human units with `decimals` places.
/// Returns `None` when the value does not fit a `Decimal`.
#[must_use]
pub fn to_units(amount: I256, decimals: u32) -> Option<Decimal> {
    let mut value = Decimal::from_str(&amount.to_string()).ok()?;
    value.set_scale(decimals).ok()?;
    Some(value.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_snapshot_require() {
        let snap = TokenBalanceSnapshot {
            account: Address::repeat_byte(9),
            asset: Address::repeat_byte(2),
            amount: U256::from(5u64),
            block: BlockRef::Pinned(7),
        };
        assert!(snap.require(U256::from(5u64)).is_ok());
        let err = snap.require(U256::from(6u64)).unwrap_err();
        assert!(matches!(
            err,
            CrossfillError::InsufficientBalance { needed, available, .. }
                if needed == U256::from(6u64) && available == U256::from(5u64)
        ));
    }

    #[test]
    fn allowance_snapshot_require() {
        let snap = AllowanceSnapshot {
            owner: Address::repeat_byte(9),
            asset: Address::repeat_byte(2),
            spender: Address::repeat_byte(3),
            approved: U256::ZERO,
            block: BlockRef::Latest,
        };
        assert!(snap.covers(U256::ZERO));
        assert!(matches!(
            snap.require(U256::from(1u64)),
            Err(CrossfillError::InsufficientAllowance { .. })
        ));
    }

    #[test]
    fn movement_apply_and_net() {
        let m = BalanceMovement {
            asset: Address::repeat_byte(2),
            credit: U256::from(2u64),
            debit: U256::from(1u64),
        };
        assert_eq!(m.apply(U256::from(1u64)), Some(U256::from(2u64)));
        assert_eq!(m.net().unwrap(), I256::ONE);

        let spend = BalanceMovement {
            asset: Address::repeat_byte(2),
            credit: U256::ZERO,
            debit: U256::from(3u64),
        };
        assert_eq!(spend.apply(U256::from(2u64)), None);
    }

    #[test]
    fn merge_combines_same_asset() {
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);
        let merged = merge_movements([
            BalanceMovement {
                asset: b,
                credit: U256::ZERO,
                debit: U256::from(1u64),
            },
            BalanceMovement {
                asset: a,
                credit: U256::from(1u64),
                debit: U256::ZERO,
            },
            BalanceMovement {
                asset: b,
                credit: U256::from(2u64),
                debit: U256::ZERO,
            },
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].asset, b);
        assert_eq!(merged[0].credit, U256::from(2u64));
        assert_eq!(merged[0].debit, U256::from(1u64));
    }

    #[test]
    fn signed_delta_both_directions() {
        assert_eq!(
            signed_delta(U256::from(1u64), U256::from(3u64)).unwrap(),
            I256::try_from(2i64).unwrap()
        );
        assert_eq!(
            signed_delta(U256::from(3u64), U256::from(1u64)).unwrap(),
            I256::try_from(-2i64).unwrap()
        );
        assert_eq!(signed_delta(U256::from(4u64), U256::from(4u64)).unwrap(), I256::ZERO);
        assert!(signed_delta(U256::ZERO, U256::MAX).is_err());
    }

    #[test]
    fn to_units_scales() {
        let one_ether = I256::try_from(1_000_000_000_000_000_000i128).unwrap();
        assert_eq!(to_units(one_ether, 18), Some(Decimal::ONE));
        let minus_half = I256::try_from(-500_000i64).unwrap();
        assert_eq!(to_units(minus_half, 6), Some(Decimal::new(-5, 1)));
    }

    #[test]
    fn block_ref_display() {
        assert_eq!(BlockRef::Latest.to_string(), "latest");
        assert_eq!(BlockRef::Pinned(12).to_string(), "#12");
        assert_eq!(BlockRef::Pinned(12).height(), Some(12));
    }
}
