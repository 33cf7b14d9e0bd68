//! In-memory ledger and venues for exercising the orchestrator.
//!
//! [`SimulatedChain`] keeps token balances and allowances, mines one block
//! per mutation and keeps every past block readable, so pinned reads behave
//! like an archive node. The simulated venues move tokens the way the real
//! exchanges do and can be told to misbehave: an order taken by someone else
//! first, a short delivery, a compensation that is refused. An outside
//! transfer can be scheduled to land just before a given balance read.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use alloy_primitives::{Address, B256, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use crossfill_envelope::{ApprovalSubmitter, EcdsaVerifier, LedgerReader};
use crossfill_types::{
    AppliedFill, ArbitrageLeg, BlockRef, CrossfillError, DigestScheme, EcSignature, EngineConfig,
    FillInstruction, Order, Result, SecondaryVenueOrder, SignedOrder, VenueId,
};

use crate::{
    orchestrator::Collaborators,
    venue::{AtomicScope, FillFailure, VenueGateway},
};

const GENESIS_HEIGHT: u64 = 100;

#[derive(Debug, Clone, Default)]
struct Ledger {
    balances: HashMap<(Address, Address), U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
}

impl Ledger {
    fn balance(&self, asset: Address, account: Address) -> U256 {
        self.balances
            .get(&(asset, account))
            .copied()
            .unwrap_or_default()
    }

    fn allowance(&self, asset: Address, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(asset, owner, spender))
            .copied()
            .unwrap_or_default()
    }

    fn transfer(
        &mut self,
        asset: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> std::result::Result<(), FillFailure> {
        let have = self.balance(asset, from);
        let left = have.checked_sub(amount).ok_or_else(|| {
            FillFailure::new(format!("{from} holds {have} of {asset}, cannot send {amount}"))
        })?;
        self.balances.insert((asset, from), left);
        let to_have = self.balance(asset, to);
        self.balances.insert((asset, to), to_have.saturating_add(amount));
        Ok(())
    }

    /// Pull `amount` through `spender`, consuming a finite allowance.
    fn spend_allowance(
        &mut self,
        asset: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> std::result::Result<(), FillFailure> {
        let approved = self.allowance(asset, owner, spender);
        if approved < amount {
            return Err(FillFailure::new(format!(
                "{owner} approved {approved} of {asset} to {spender}, fill needs {amount}"
            )));
        }
        if approved != U256::MAX {
            self.allowances
                .insert((asset, owner, spender), approved - amount);
        }
        Ok(())
    }
}

/// Transfers of one executed fill, kept so it can be inverted.
#[derive(Debug, Clone)]
struct FillRecord {
    order_hash: B256,
    fill_amount: U256,
    maker: Address,
    give_asset: Address,
    gave: U256,
    receive_asset: Address,
    received: U256,
    fee: Option<(Address, Address, U256)>,
}

/// A transfer by some other party, mined just before the `before_read`-th
/// latest-block read of the sender's balance.
#[derive(Debug, Clone, Copy)]
struct OutsideTransfer {
    asset: Address,
    from: Address,
    to: Address,
    amount: U256,
    before_read: usize,
    reads: usize,
}

#[derive(Debug, Clone)]
struct Checkpoint {
    ledger: Ledger,
    filled: HashMap<B256, U256>,
    fills: HashMap<B256, FillRecord>,
}

#[derive(Debug, Default)]
struct ChainState {
    height: u64,
    ledger: Ledger,
    history: BTreeMap<u64, Ledger>,
    filled: HashMap<B256, U256>,
    fills: HashMap<B256, FillRecord>,
    checkpoint: Option<Checkpoint>,
    short_deliver: HashMap<VenueId, U256>,
    refuse_compensation: HashSet<VenueId>,
    outside: Vec<OutsideTransfer>,
    reject_approvals: bool,
    fail_reads: bool,
    balance_reads: usize,
    approvals_submitted: usize,
}

impl ChainState {
    fn mine(&mut self) -> u64 {
        self.height += 1;
        self.history.insert(self.height, self.ledger.clone());
        self.height
    }

    fn ledger_at(&self, at: BlockRef) -> Result<&Ledger> {
        match at {
            BlockRef::Latest => Ok(&self.ledger),
            BlockRef::Pinned(h) => self.history.get(&h).ok_or_else(|| {
                CrossfillError::LedgerUnavailable {
                    reason: format!("block {h} not available"),
                }
            }),
        }
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads {
            return Err(CrossfillError::LedgerUnavailable {
                reason: "node unreachable".into(),
            });
        }
        Ok(())
    }

    /// Land every scheduled transfer that is due before this read.
    fn land_outside_transfers(&mut self, asset: Address, account: Address) {
        let mut due = Vec::new();
        self.outside.retain_mut(|transfer| {
            if transfer.asset != asset || transfer.from != account {
                return true;
            }
            transfer.reads += 1;
            if transfer.reads < transfer.before_read {
                return true;
            }
            due.push(*transfer);
            false
        });
        for transfer in due {
            let sent = self
                .ledger
                .transfer(transfer.asset, transfer.from, transfer.to, transfer.amount);
            if sent.is_ok() {
                self.mine();
            }
        }
    }

    fn remaining(&self, hash: B256, size: U256) -> U256 {
        size.saturating_sub(self.filled.get(&hash).copied().unwrap_or_default())
    }

    /// Execute a fill against a scratch copy, then publish it as one block.
    fn execute(
        &mut self,
        venue: VenueId,
        record: FillRecord,
        taker: Address,
        spender: Address,
        maker_spender: Option<Address>,
    ) -> std::result::Result<AppliedFill, FillFailure> {
        let mut next = self.ledger.clone();
        let short = self.short_deliver.get(&venue).copied().unwrap_or_default();
        let delivered = record.received.saturating_sub(short);

        next.spend_allowance(record.give_asset, taker, spender, record.gave)?;
        next.transfer(record.give_asset, taker, record.maker, record.gave)?;
        if let Some(maker_spender) = maker_spender {
            next.spend_allowance(
                record.receive_asset,
                record.maker,
                maker_spender,
                record.received,
            )?;
        }
        next.transfer(record.receive_asset, record.maker, taker, delivered)?;
        let fee_paid = match record.fee {
            Some((asset, recipient, amount)) => {
                next.spend_allowance(asset, taker, spender, amount)?;
                next.transfer(asset, taker, recipient, amount)?;
                amount
            }
            None => U256::ZERO,
        };

        self.ledger = next;
        let filled = self.filled.entry(record.order_hash).or_default();
        *filled = filled.saturating_add(record.fill_amount);
        let height = self.mine();
        let reference = B256::left_padding_from(&height.to_be_bytes());
        let gave = record.gave;
        self.fills.insert(
            reference,
            FillRecord {
                received: delivered,
                ..record
            },
        );
        Ok(AppliedFill {
            venue,
            reference,
            gave,
            received: delivered,
            fee_paid,
        })
    }

    fn invert(
        &mut self,
        leg: &ArbitrageLeg,
        taker: Address,
    ) -> std::result::Result<(), FillFailure> {
        if self.refuse_compensation.contains(&leg.venue) {
            return Err(FillFailure::new(format!(
                "{} counterparty refused to return funds",
                leg.venue
            )));
        }
        let reference = leg
            .applied
            .map(|fill| fill.reference)
            .ok_or_else(|| FillFailure::new("leg was never applied"))?;
        let record = self
            .fills
            .get(&reference)
            .cloned()
            .ok_or_else(|| FillFailure::new(format!("no fill with reference {reference}")))?;

        let mut next = self.ledger.clone();
        next.transfer(record.give_asset, record.maker, taker, record.gave)?;
        next.transfer(record.receive_asset, taker, record.maker, record.received)?;
        if let Some((asset, recipient, amount)) = record.fee {
            next.transfer(asset, recipient, taker, amount)?;
        }
        self.ledger = next;
        if let Some(filled) = self.filled.get_mut(&record.order_hash) {
            *filled = filled.saturating_sub(record.fill_amount);
        }
        self.fills.remove(&reference);
        self.mine();
        Ok(())
    }
}

/// Shared handle to one simulated chain.
#[derive(Debug, Clone)]
pub struct SimulatedChain {
    state: Arc<Mutex<ChainState>>,
}

impl Default for SimulatedChain {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedChain {
    #[must_use]
    pub fn new() -> Self {
        let mut state = ChainState {
            height: GENESIS_HEIGHT,
            ..ChainState::default()
        };
        state.history.insert(GENESIS_HEIGHT, Ledger::default());
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn height(&self) -> u64 {
        self.state().height
    }

    /// Mine empty blocks.
    pub fn advance(&self, blocks: u64) {
        let mut state = self.state();
        for _ in 0..blocks {
            state.mine();
        }
    }

    pub fn set_balance(&self, asset: Address, account: Address, amount: U256) {
        let mut state = self.state();
        state.ledger.balances.insert((asset, account), amount);
        state.mine();
    }

    pub fn set_allowance(&self, asset: Address, owner: Address, spender: Address, amount: U256) {
        let mut state = self.state();
        state.ledger.allowances.insert((asset, owner, spender), amount);
        state.mine();
    }

    #[must_use]
    pub fn balance(&self, asset: Address, account: Address) -> U256 {
        self.state().ledger.balance(asset, account)
    }

    #[must_use]
    pub fn allowance(&self, asset: Address, owner: Address, spender: Address) -> U256 {
        self.state().ledger.allowance(asset, owner, spender)
    }

    /// Amount of an order already filled.
    #[must_use]
    pub fn filled(&self, order_hash: B256) -> U256 {
        self.state()
            .filled
            .get(&order_hash)
            .copied()
            .unwrap_or_default()
    }

    /// Someone else takes the whole order before the engine does.
    pub fn front_run(&self, order_hash: B256) {
        let mut state = self.state();
        state.filled.insert(order_hash, U256::MAX);
        state.mine();
    }

    /// The venue delivers `shortfall` less than the fill promises.
    pub fn short_deliver(&self, venue: VenueId, shortfall: U256) {
        self.state().short_deliver.insert(venue, shortfall);
    }

    /// Another party moves `amount` of `asset` out of `from` just before the
    /// `before_read`-th latest-block read of that balance (counting from 1).
    pub fn schedule_outside_transfer(
        &self,
        asset: Address,
        from: Address,
        to: Address,
        amount: U256,
        before_read: usize,
    ) {
        self.state().outside.push(OutsideTransfer {
            asset,
            from,
            to,
            amount,
            before_read,
            reads: 0,
        });
    }

    pub fn refuse_compensation(&self, venue: VenueId) {
        self.state().refuse_compensation.insert(venue);
    }

    pub fn reject_approvals(&self) {
        self.state().reject_approvals = true;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state().fail_reads = fail;
    }

    /// Number of balance reads served so far.
    #[must_use]
    pub fn balance_reads(&self) -> usize {
        self.state().balance_reads
    }

    #[must_use]
    pub fn approvals_submitted(&self) -> usize {
        self.state().approvals_submitted
    }

    #[must_use]
    pub fn primary_venue(&self, transfer_proxy: Address) -> SimPrimaryVenue {
        SimPrimaryVenue {
            chain: self.clone(),
            transfer_proxy,
        }
    }

    #[must_use]
    pub fn secondary_venue(&self, contract: Address) -> SimSecondaryVenue {
        SimSecondaryVenue {
            chain: self.clone(),
            contract,
        }
    }

    #[must_use]
    pub fn atomic_scope(&self) -> SimAtomicScope {
        SimAtomicScope {
            chain: self.clone(),
        }
    }

    /// Wire every capability for `config`, with an atomic scope exactly when
    /// the config asks for platform reversal.
    #[must_use]
    pub fn collaborators(&self, config: &EngineConfig) -> Collaborators {
        let chain = Arc::new(self.clone());
        Collaborators {
            reader: chain.clone(),
            verifier: Arc::new(EcdsaVerifier::new(config.signatures.scheme)),
            approvals: chain,
            primary: Arc::new(self.primary_venue(config.primary.transfer_proxy)),
            secondary: Arc::new(self.secondary_venue(config.secondary.contract)),
            atomic: config
                .execution
                .atomic_reversal
                .then(|| Arc::new(self.atomic_scope()) as Arc<dyn AtomicScope>),
        }
    }
}

impl LedgerReader for SimulatedChain {
    fn latest_block(&self) -> Result<u64> {
        let state = self.state();
        state.check_reads()?;
        Ok(state.height)
    }

    fn balance_of(&self, asset: Address, account: Address, at: BlockRef) -> Result<U256> {
        let mut state = self.state();
        state.check_reads()?;
        state.balance_reads += 1;
        if at == BlockRef::Latest {
            state.land_outside_transfers(asset, account);
        }
        Ok(state.ledger_at(at)?.balance(asset, account))
    }

    fn allowance(
        &self,
        asset: Address,
        owner: Address,
        spender: Address,
        at: BlockRef,
    ) -> Result<U256> {
        let state = self.state();
        state.check_reads()?;
        Ok(state.ledger_at(at)?.allowance(asset, owner, spender))
    }
}

impl ApprovalSubmitter for SimulatedChain {
    fn approve(
        &self,
        asset: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> std::result::Result<(), String> {
        let mut state = self.state();
        state.approvals_submitted += 1;
        if state.reject_approvals {
            return Err("approval transaction reverted".into());
        }
        state.ledger.allowances.insert((asset, owner, spender), amount);
        state.mine();
        Ok(())
    }
}

/// Signed-order venue: the taker pays through the transfer proxy, the
/// maker's asset is pulled through the same proxy.
#[derive(Debug, Clone)]
pub struct SimPrimaryVenue {
    chain: SimulatedChain,
    transfer_proxy: Address,
}

impl VenueGateway for SimPrimaryVenue {
    fn venue(&self) -> VenueId {
        VenueId::Primary
    }

    fn submit_fill(
        &self,
        order: &Order,
        instruction: &FillInstruction,
        taker: Address,
    ) -> std::result::Result<AppliedFill, FillFailure> {
        let Order::Primary(order) = order else {
            return Err(FillFailure::new("not a primary venue order"));
        };
        let mut state = self.chain.state();
        let hash = order.hash();
        if state.remaining(hash, order.taker_amount) < instruction.fill_amount {
            return Err(FillFailure::new(format!("order {hash} already filled")));
        }
        let record = FillRecord {
            order_hash: hash,
            fill_amount: instruction.fill_amount,
            maker: order.maker,
            give_asset: order.taker_asset,
            gave: instruction.give_amount,
            receive_asset: order.maker_asset,
            received: instruction.receive_amount,
            fee: instruction
                .fee
                .filter(|_| order.fee_recipient != Address::ZERO)
                .map(|(asset, amount)| (asset, order.fee_recipient, amount)),
        };
        state.execute(
            VenueId::Primary,
            record,
            taker,
            self.transfer_proxy,
            Some(self.transfer_proxy),
        )
    }

    fn compensate(
        &self,
        leg: &ArbitrageLeg,
        taker: Address,
    ) -> std::result::Result<(), FillFailure> {
        self.chain.state().invert(leg, taker)
    }
}

/// Single-contract venue: the taker's asset is pulled by the contract, the
/// maker's side is paid out directly.
#[derive(Debug, Clone)]
pub struct SimSecondaryVenue {
    chain: SimulatedChain,
    contract: Address,
}

impl VenueGateway for SimSecondaryVenue {
    fn venue(&self) -> VenueId {
        VenueId::Secondary
    }

    fn submit_fill(
        &self,
        order: &Order,
        instruction: &FillInstruction,
        taker: Address,
    ) -> std::result::Result<AppliedFill, FillFailure> {
        let Order::Secondary(order) = order else {
            return Err(FillFailure::new("not a secondary venue order"));
        };
        let mut state = self.chain.state();
        let hash = order.hash();
        if state.remaining(hash, order.amount_to_get) < instruction.fill_amount {
            return Err(FillFailure::new(format!("order {hash} already filled")));
        }
        let record = FillRecord {
            order_hash: hash,
            fill_amount: instruction.fill_amount,
            maker: order.maker,
            give_asset: order.asset_to_get,
            gave: instruction.give_amount,
            receive_asset: order.asset_to_give,
            received: instruction.receive_amount,
            fee: None,
        };
        state.execute(VenueId::Secondary, record, taker, self.contract, None)
    }

    fn compensate(
        &self,
        leg: &ArbitrageLeg,
        taker: Address,
    ) -> std::result::Result<(), FillFailure> {
        self.chain.state().invert(leg, taker)
    }
}

/// Transaction boundary that snapshots the chain at `begin`.
#[derive(Debug, Clone)]
pub struct SimAtomicScope {
    chain: SimulatedChain,
}

impl AtomicScope for SimAtomicScope {
    fn begin(&self) -> std::result::Result<(), FillFailure> {
        let mut state = self.chain.state();
        if state.checkpoint.is_some() {
            return Err(FillFailure::new("transaction already open"));
        }
        let checkpoint = Checkpoint {
            ledger: state.ledger.clone(),
            filled: state.filled.clone(),
            fills: state.fills.clone(),
        };
        state.checkpoint = Some(checkpoint);
        Ok(())
    }

    fn commit(&self) -> std::result::Result<(), FillFailure> {
        self.chain
            .state()
            .checkpoint
            .take()
            .map(|_| ())
            .ok_or_else(|| FillFailure::new("no open transaction"))
    }

    fn revert(&self) -> std::result::Result<(), FillFailure> {
        let mut state = self.chain.state();
        let checkpoint = state
            .checkpoint
            .take()
            .ok_or_else(|| FillFailure::new("no open transaction"))?;
        state.ledger = checkpoint.ledger;
        state.filled = checkpoint.filled;
        state.fills = checkpoint.fills;
        state.mine();
        Ok(())
    }
}

/// Signs venue orders with local keys under one digest scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderFactory {
    verifier: EcdsaVerifier,
}

impl OrderFactory {
    #[must_use]
    pub fn new(scheme: DigestScheme) -> Self {
        Self {
            verifier: EcdsaVerifier::new(scheme),
        }
    }

    /// Deterministic key from one repeated byte.
    #[must_use]
    pub fn key(byte: u8) -> PrivateKeySigner {
        PrivateKeySigner::from_bytes(&B256::repeat_byte(byte)).expect("non-zero scalar below order")
    }

    #[must_use]
    pub fn sign_hash(&self, hash: B256, key: &PrivateKeySigner) -> EcSignature {
        let sig = key
            .sign_hash_sync(&self.verifier.digest(hash))
            .expect("local key signs any prehash");
        EcSignature {
            v: 27 + u8::from(sig.v()),
            r: B256::from(sig.r().to_be_bytes::<32>()),
            s: B256::from(sig.s().to_be_bytes::<32>()),
        }
    }

    /// Set the maker to `key`'s address and sign the order.
    pub fn sign_primary(&self, order: &mut SignedOrder, key: &PrivateKeySigner) {
        order.maker = key.address();
        order.signature = self.sign_hash(order.hash(), key);
    }

    /// Set the maker to `key`'s address and sign the order.
    pub fn sign_secondary(&self, order: &mut SecondaryVenueOrder, key: &PrivateKeySigner) {
        order.maker = key.address();
        order.signature = self.sign_hash(order.hash(), key);
    }
}
