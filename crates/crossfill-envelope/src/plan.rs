//! Fill planning and funding checks.
//!
//! A [`FillPlan`] fixes the literal amounts of both legs before anything
//! executes. [`check_funding`] then reads one pinned ledger view and rejects
//! the plan if the engine or the primary maker cannot cover it. Nothing is
//! mutated here, so a rejection needs no rollback.

use alloy_primitives::{Address, I256, U256};
use crossfill_types::{
    BalanceMovement, FillInstruction, Result, SecondaryVenueOrder, SignedOrder,
    TokenBalanceSnapshot, VenueId, merge_movements,
};
use tracing::debug;

use crate::{ledger_reader::PinnedLedgerView, validator::ValidatedPair};

/// Venue contracts a plan needs allowances for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VenueSpenders {
    /// Primary venue transfer proxy.
    pub primary: Address,
    /// Secondary venue contract.
    pub secondary: Address,
}

/// An allowance the engine must hold before any leg runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowanceRequirement {
    pub asset: Address,
    pub spender: Address,
    pub amount: U256,
}

/// The committed fills for both legs of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillPlan {
    pub leg1: FillInstruction,
    pub leg2: FillInstruction,
}

impl FillPlan {
    /// Compute both legs from the validated orders.
    ///
    /// `primary_fill` defaults to the whole primary order. `secondary_fill`
    /// defaults to what leg 1 yields, capped by the secondary order size.
    pub fn build(
        primary: &SignedOrder,
        secondary: &SecondaryVenueOrder,
        pair: &ValidatedPair,
        fee_asset: Address,
        primary_fill: Option<U256>,
        secondary_fill: Option<U256>,
    ) -> Result<Self> {
        let fill1 = primary_fill.unwrap_or(primary.taker_amount);
        let receive1 = primary.maker_amount_for(fill1)?;
        let fee1 = primary.taker_fee_for(fill1)?;
        let mut movements1 = vec![
            BalanceMovement {
                asset: primary.taker_asset,
                credit: U256::ZERO,
                debit: fill1,
            },
            BalanceMovement {
                asset: primary.maker_asset,
                credit: receive1,
                debit: U256::ZERO,
            },
        ];
        if !fee1.is_zero() {
            movements1.push(BalanceMovement {
                asset: fee_asset,
                credit: U256::ZERO,
                debit: fee1,
            });
        }
        let leg1 = FillInstruction {
            venue: VenueId::Primary,
            order_hash: pair.primary_hash,
            fill_amount: fill1,
            give_asset: primary.taker_asset,
            give_amount: fill1,
            receive_asset: primary.maker_asset,
            receive_amount: receive1,
            fee: (!fee1.is_zero()).then_some((fee_asset, fee1)),
            movements: merge_movements(movements1),
        };

        let fill2 = secondary_fill.unwrap_or_else(|| receive1.min(secondary.amount_to_get));
        let receive2 = secondary.give_amount_for(fill2)?;
        let leg2 = FillInstruction {
            venue: VenueId::Secondary,
            order_hash: pair.secondary_hash,
            fill_amount: fill2,
            give_asset: secondary.asset_to_get,
            give_amount: fill2,
            receive_asset: secondary.asset_to_give,
            receive_amount: receive2,
            fee: None,
            movements: merge_movements([
                BalanceMovement {
                    asset: secondary.asset_to_get,
                    credit: U256::ZERO,
                    debit: fill2,
                },
                BalanceMovement {
                    asset: secondary.asset_to_give,
                    credit: receive2,
                    debit: U256::ZERO,
                },
            ]),
        };

        debug!(
            primary_fill = %fill1,
            primary_receive = %receive1,
            primary_fee = %fee1,
            secondary_fill = %fill2,
            secondary_receive = %receive2,
            "fill plan"
        );
        Ok(Self { leg1, leg2 })
    }

    /// Every asset either leg touches, in first-seen order.
    #[must_use]
    pub fn touched_assets(&self) -> Vec<Address> {
        let mut assets = Vec::new();
        for asset in self.leg1.touched_assets().chain(self.leg2.touched_assets()) {
            if !assets.contains(&asset) {
                assets.push(asset);
            }
        }
        assets
    }

    /// Expected signed change of `asset` across both legs.
    pub fn expected_net(&self, asset: Address) -> Result<I256> {
        let mut net = I256::ZERO;
        for m in self.leg1.movements.iter().chain(&self.leg2.movements) {
            if m.asset == asset {
                net += m.net()?;
            }
        }
        Ok(net)
    }

    /// Per-asset amounts the engine must already hold before leg 1.
    ///
    /// Leg 1 debits are due up front. Leg 2 debits are reduced by whatever
    /// leg 1 credits in the same asset.
    #[must_use]
    pub fn upfront_requirements(&self) -> Vec<(Address, U256)> {
        self.touched_assets()
            .into_iter()
            .filter_map(|asset| {
                let leg1 = self.leg1.movement_of(asset);
                let debit1 = leg1.map_or(U256::ZERO, |m| m.debit);
                let credit1 = leg1.map_or(U256::ZERO, |m| m.credit);
                let debit2 = self.leg2.movement_of(asset).map_or(U256::ZERO, |m| m.debit);
                let needed = debit1.saturating_add(debit2.saturating_sub(credit1));
                (!needed.is_zero()).then_some((asset, needed))
            })
            .collect()
    }

    /// Allowances the venues need to pull the engine's side of each leg.
    #[must_use]
    pub fn required_allowances(&self, spenders: VenueSpenders) -> Vec<AllowanceRequirement> {
        let mut reqs: Vec<AllowanceRequirement> = Vec::new();
        let legs = [(&self.leg1, spenders.primary), (&self.leg2, spenders.secondary)];
        for (leg, spender) in legs {
            let pulls = std::iter::once((leg.give_asset, leg.give_amount)).chain(leg.fee);
            for (asset, amount) in pulls {
                if let Some(existing) = reqs
                    .iter_mut()
                    .find(|r| r.asset == asset && r.spender == spender)
                {
                    existing.amount = existing.amount.saturating_add(amount);
                } else {
                    reqs.push(AllowanceRequirement {
                        asset,
                        spender,
                        amount,
                    });
                }
            }
        }
        reqs
    }
}

/// Snapshots that passed the funding check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingSnapshot {
    pub block: u64,
    pub engine: Vec<TokenBalanceSnapshot>,
}

/// Check at one pinned block that the engine holds everything it must supply
/// and that the primary maker can deliver leg 1.
pub fn check_funding(
    view: &PinnedLedgerView<'_>,
    plan: &FillPlan,
    primary: &SignedOrder,
    operator: Address,
    primary_proxy: Address,
) -> Result<FundingSnapshot> {
    let mut engine = Vec::new();
    for (asset, needed) in plan.upfront_requirements() {
        let snap = view.balance(asset, operator)?;
        snap.require(needed)?;
        engine.push(snap);
    }

    let maker_owes = plan.leg1.receive_amount;
    view.balance(primary.maker_asset, primary.maker)?
        .require(maker_owes)?;
    view.allowance(primary.maker_asset, primary.maker, primary_proxy)?
        .require(maker_owes)?;

    debug!(block = view.height(), %operator, "funding sufficient");
    Ok(FundingSnapshot {
        block: view.height(),
        engine,
    })
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use chrono::Utc;
    use crossfill_types::{BlockRef, CrossfillError, ReferencePoint};

    use super::*;
    use crate::ledger_reader::LedgerReader;

    fn a() -> Address {
        Address::repeat_byte(0x0a)
    }

    fn b() -> Address {
        Address::repeat_byte(0x0b)
    }

    fn fee_asset() -> Address {
        Address::repeat_byte(0xfe)
    }

    fn operator() -> Address {
        Address::repeat_byte(0x99)
    }

    fn proxy() -> Address {
        Address::repeat_byte(0xe1)
    }

    fn u(v: u64) -> U256 {
        U256::from(v)
    }

    fn pair_for(primary: &SignedOrder, secondary: &SecondaryVenueOrder) -> ValidatedPair {
        ValidatedPair {
            primary_hash: primary.hash(),
            secondary_hash: secondary.hash(),
            reference: ReferencePoint::new(Utc::now(), 1),
        }
    }

    fn reference_orders() -> (SignedOrder, SecondaryVenueOrder) {
        (
            SignedOrder::dummy(a(), b(), u(1), u(1)),
            SecondaryVenueOrder::dummy(a(), u(1), b(), u(2), 1_000),
        )
    }

    fn reference_plan(primary: &SignedOrder, secondary: &SecondaryVenueOrder) -> FillPlan {
        FillPlan::build(
            primary,
            secondary,
            &pair_for(primary, secondary),
            fee_asset(),
            None,
            None,
        )
        .unwrap()
    }

    #[derive(Default)]
    struct Flat {
        balances: HashMap<(Address, Address), U256>,
        allowances: HashMap<(Address, Address, Address), U256>,
        reads: Mutex<usize>,
    }

    impl LedgerReader for Flat {
        fn latest_block(&self) -> Result<u64> {
            Ok(7)
        }

        fn balance_of(&self, asset: Address, account: Address, _at: BlockRef) -> Result<U256> {
            *self.reads.lock().unwrap() += 1;
            Ok(self.balances.get(&(asset, account)).copied().unwrap_or_default())
        }

        fn allowance(
            &self,
            asset: Address,
            owner: Address,
            spender: Address,
            _at: BlockRef,
        ) -> Result<U256> {
            Ok(self
                .allowances
                .get(&(asset, owner, spender))
                .copied()
                .unwrap_or_default())
        }
    }

    fn funded(primary: &SignedOrder, engine_b: u64) -> Flat {
        let mut ledger = Flat::default();
        ledger.balances.insert((b(), operator()), u(engine_b));
        ledger.balances.insert((a(), primary.maker), u(1));
        ledger.allowances.insert((a(), primary.maker, proxy()), U256::MAX);
        ledger
    }

    #[test]
    fn reference_plan_amounts() {
        let (primary, secondary) = reference_orders();
        let plan = FillPlan::build(
            &primary,
            &secondary,
            &pair_for(&primary, &secondary),
            fee_asset(),
            None,
            None,
        )
        .unwrap();
        assert_eq!(plan.leg1.give_amount, u(1));
        assert_eq!(plan.leg1.receive_amount, u(1));
        assert_eq!(plan.leg2.give_amount, u(1));
        assert_eq!(plan.leg2.receive_amount, u(2));
        assert_eq!(plan.expected_net(b()).unwrap(), I256::ONE);
        assert_eq!(plan.expected_net(a()).unwrap(), I256::ZERO);
        assert_eq!(plan.upfront_requirements(), vec![(b(), u(1))]);
    }

    #[test]
    fn taker_fee_is_planned_and_required() {
        let (mut primary, secondary) = reference_orders();
        primary.taker_fee = u(4);
        primary.taker_amount = u(2);
        primary.maker_amount = u(2);
        primary.fee_recipient = Address::repeat_byte(0xfc);
        let secondary = SecondaryVenueOrder {
            amount_to_get: u(2),
            amount_to_give: u(4),
            ..secondary
        };
        let plan = FillPlan::build(
            &primary,
            &secondary,
            &pair_for(&primary, &secondary),
            fee_asset(),
            Some(u(1)),
            None,
        )
        .unwrap();
        assert_eq!(plan.leg1.fee, Some((fee_asset(), u(2))));
        assert_eq!(plan.leg2.fill_amount, u(1));
        let upfront = plan.upfront_requirements();
        assert!(upfront.contains(&(b(), u(1))));
        assert!(upfront.contains(&(fee_asset(), u(2))));

        let allowances = plan.required_allowances(VenueSpenders {
            primary: proxy(),
            secondary: Address::repeat_byte(0xed),
        });
        assert_eq!(allowances.len(), 3);
        assert!(allowances.contains(&AllowanceRequirement {
            asset: fee_asset(),
            spender: proxy(),
            amount: u(2),
        }));
    }

    #[test]
    fn taker_fee_without_recipient_is_not_planned() {
        let (mut primary, secondary) = reference_orders();
        primary.taker_fee = u(3);
        let plan = reference_plan(&primary, &secondary);
        assert_eq!(plan.leg1.fee, None);
        assert!(!plan.touched_assets().contains(&fee_asset()));
        assert_eq!(plan.upfront_requirements(), vec![(b(), u(1))]);
        let allowances = plan.required_allowances(VenueSpenders {
            primary: proxy(),
            secondary: Address::repeat_byte(0xed),
        });
        assert!(allowances.iter().all(|req| req.asset != fee_asset()));
    }

    #[test]
    fn oversized_fill_is_malformed() {
        let (primary, secondary) = reference_orders();
        let err = FillPlan::build(
            &primary,
            &secondary,
            &pair_for(&primary, &secondary),
            fee_asset(),
            Some(u(2)),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, CrossfillError::MalformedOrder { .. }));
    }

    #[test]
    fn funding_passes_with_reference_balances() {
        let (primary, secondary) = reference_orders();
        let plan = reference_plan(&primary, &secondary);
        let ledger = funded(&primary, 1);
        let view = PinnedLedgerView::pin_latest(&ledger).unwrap();
        let snap = check_funding(&view, &plan, &primary, operator(), proxy()).unwrap();
        assert_eq!(snap.block, 7);
        assert_eq!(snap.engine.len(), 1);
    }

    #[test]
    fn funding_rejects_short_engine() {
        let (primary, secondary) = reference_orders();
        let plan = reference_plan(&primary, &secondary);
        let ledger = funded(&primary, 0);
        let view = PinnedLedgerView::pin_latest(&ledger).unwrap();
        let err = check_funding(&view, &plan, &primary, operator(), proxy()).unwrap_err();
        assert!(matches!(
            err,
            CrossfillError::InsufficientBalance { account, .. } if account == operator()
        ));
    }

    #[test]
    fn funding_rejects_unapproved_maker() {
        let (primary, secondary) = reference_orders();
        let plan = reference_plan(&primary, &secondary);
        let mut ledger = funded(&primary, 1);
        ledger.allowances.clear();
        let view = PinnedLedgerView::pin_latest(&ledger).unwrap();
        let err = check_funding(&view, &plan, &primary, operator(), proxy()).unwrap_err();
        assert!(matches!(
            err,
            CrossfillError::InsufficientAllowance { owner, .. } if owner == primary.maker
        ));
    }
}
