//! Read-only access to on-chain balances and allowances.
//!
//! [`LedgerReader`] is the consumed interface. [`PinnedLedgerView`] binds a
//! reader to one block so that a multi-step check sees one consistent state
//! and produces immutable snapshots.

use alloy_primitives::{Address, U256};
use crossfill_types::{AllowanceSnapshot, BlockRef, Result, TokenBalanceSnapshot};
use tracing::trace;

/// Source of ledger state. Failures surface as `LedgerUnavailable`.
pub trait LedgerReader: Send + Sync {
    fn latest_block(&self) -> Result<u64>;

    fn balance_of(&self, asset: Address, account: Address, at: BlockRef) -> Result<U256>;

    fn allowance(
        &self,
        asset: Address,
        owner: Address,
        spender: Address,
        at: BlockRef,
    ) -> Result<U256>;
}

/// Read a balance into a snapshot.
pub fn balance_snapshot(
    reader: &dyn LedgerReader,
    asset: Address,
    account: Address,
    at: BlockRef,
) -> Result<TokenBalanceSnapshot> {
    let amount = reader.balance_of(asset, account, at)?;
    trace!(%asset, %account, %at, %amount, "balance read");
    Ok(TokenBalanceSnapshot {
        account,
        asset,
        amount,
        block: at,
    })
}

/// Read an allowance into a snapshot.
pub fn allowance_snapshot(
    reader: &dyn LedgerReader,
    asset: Address,
    owner: Address,
    spender: Address,
    at: BlockRef,
) -> Result<AllowanceSnapshot> {
    let approved = reader.allowance(asset, owner, spender, at)?;
    trace!(%asset, %owner, %spender, %at, %approved, "allowance read");
    Ok(AllowanceSnapshot {
        owner,
        asset,
        spender,
        approved,
        block: at,
    })
}

/// A [`LedgerReader`] bound to a single block height.
pub struct PinnedLedgerView<'a> {
    reader: &'a dyn LedgerReader,
    height: u64,
}

impl<'a> PinnedLedgerView<'a> {
    /// Pin to the reader's current latest block.
    pub fn pin_latest(reader: &'a dyn LedgerReader) -> Result<Self> {
        let height = reader.latest_block()?;
        Ok(Self { reader, height })
    }

    #[must_use]
    pub fn at(reader: &'a dyn LedgerReader, height: u64) -> Self {
        Self { reader, height }
    }

    #[must_use]
    pub fn height(&self) -> u64 {
        self.height
    }

    #[must_use]
    pub fn block(&self) -> BlockRef {
        BlockRef::Pinned(self.height)
    }

    pub fn balance(&self, asset: Address, account: Address) -> Result<TokenBalanceSnapshot> {
        balance_snapshot(self.reader, asset, account, self.block())
    }

    pub fn allowance(
        &self,
        asset: Address,
        owner: Address,
        spender: Address,
    ) -> Result<AllowanceSnapshot> {
        allowance_snapshot(self.reader, asset, owner, spender, self.block())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use crossfill_types::CrossfillError;

    use super::*;

    /// Two-block ledger: balances differ between blocks 1 and 2.
    struct TwoBlocks {
        reads: Mutex<Vec<BlockRef>>,
        balances: HashMap<u64, U256>,
    }

    impl TwoBlocks {
        fn new() -> Self {
            Self {
                reads: Mutex::new(Vec::new()),
                balances: HashMap::from([(1, U256::from(10u64)), (2, U256::from(3u64))]),
            }
        }
    }

    impl LedgerReader for TwoBlocks {
        fn latest_block(&self) -> Result<u64> {
            Ok(2)
        }

        fn balance_of(&self, _asset: Address, _account: Address, at: BlockRef) -> Result<U256> {
            self.reads.lock().unwrap().push(at);
            let height = at.height().unwrap_or(2);
            self.balances
                .get(&height)
                .copied()
                .ok_or_else(|| CrossfillError::LedgerUnavailable {
                    reason: format!("no state at {at}"),
                })
        }

        fn allowance(&self, _: Address, _: Address, _: Address, _: BlockRef) -> Result<U256> {
            Ok(U256::MAX)
        }
    }

    #[test]
    fn pinned_view_reads_its_block() {
        let ledger = TwoBlocks::new();
        let early = PinnedLedgerView::at(&ledger, 1);
        let snap = early.balance(Address::ZERO, Address::ZERO).unwrap();
        assert_eq!(snap.amount, U256::from(10u64));
        assert_eq!(snap.block, BlockRef::Pinned(1));
    }

    #[test]
    fn pin_latest_uses_latest_height() {
        let ledger = TwoBlocks::new();
        let view = PinnedLedgerView::pin_latest(&ledger).unwrap();
        assert_eq!(view.height(), 2);
        let snap = view.balance(Address::ZERO, Address::ZERO).unwrap();
        assert_eq!(snap.amount, U256::from(3u64));
        assert_eq!(*ledger.reads.lock().unwrap(), vec![BlockRef::Pinned(2)]);
    }

    #[test]
    fn missing_block_is_ledger_unavailable() {
        let ledger = TwoBlocks::new();
        let err = PinnedLedgerView::at(&ledger, 9)
            .balance(Address::ZERO, Address::ZERO)
            .unwrap_err();
        assert!(matches!(err, CrossfillError::LedgerUnavailable { .. }));
    }

    #[test]
    fn allowance_snapshot_carries_block() {
        let ledger = TwoBlocks::new();
        let snap = PinnedLedgerView::at(&ledger, 1)
            .allowance(Address::ZERO, Address::ZERO, Address::repeat_byte(1))
            .unwrap();
        assert_eq!(snap.approved, U256::MAX);
        assert_eq!(snap.block, BlockRef::Pinned(1));
    }
}
