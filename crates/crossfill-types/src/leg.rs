//! Arbitrage legs and their lifecycle.
//!
//! A leg is one fill against one venue. Its lifecycle:
//!
//! ```text
//! PENDING ──→ APPLIED ──→ COMPENSATED   (engine undid it explicitly)
//!    │           │
//!    │           └──────→ REVERTED      (platform unwound it atomically)
//!    └──────→ FAILED                    (venue rejected the fill)
//! ```
//!
//! The rollback token is recorded *before* the fill is submitted, so a leg
//! can always be checked against the balances the engine held beforehand.

use std::fmt;

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::{BalanceMovement, CrossfillError, Result, TokenBalanceSnapshot, VenueId};

// ---------------------------------------------------------------------------
// LegStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of an [`ArbitrageLeg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegStatus {
    /// Rollback token recorded; fill not yet confirmed.
    Pending,
    /// Venue reported the fill as applied.
    Applied,
    /// Engine issued the inverse transfers.
    Compensated,
    /// Venue rejected the fill; nothing moved.
    Failed,
    /// The platform's atomic reversal undid the fill.
    Reverted,
}

impl LegStatus {
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Applied | Self::Failed)
                | (Self::Applied, Self::Compensated | Self::Reverted)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Compensated | Self::Failed | Self::Reverted)
    }
}

impl fmt::Display for LegStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Applied => write!(f, "APPLIED"),
            Self::Compensated => write!(f, "COMPENSATED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Reverted => write!(f, "REVERTED"),
        }
    }
}

// ---------------------------------------------------------------------------
// FillInstruction
// ---------------------------------------------------------------------------

/// The committed fill for one leg, computed during validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillInstruction {
    pub venue: VenueId,
    pub order_hash: B256,
    /// Fill quantity in the order's own terms (primary: taker-asset amount,
    /// secondary: get-asset amount).
    pub fill_amount: U256,
    pub give_asset: Address,
    pub give_amount: U256,
    pub receive_asset: Address,
    pub receive_amount: U256,
    /// Asset and amount of the venue fee the engine pays, if any.
    pub fee: Option<(Address, U256)>,
    /// Net expected movement per asset for the engine account.
    pub movements: Vec<BalanceMovement>,
}

impl FillInstruction {
    /// Assets whose engine balance this leg changes.
    pub fn touched_assets(&self) -> impl Iterator<Item = Address> + '_ {
        self.movements.iter().map(|m| m.asset)
    }

    #[must_use]
    pub fn movement_of(&self, asset: Address) -> Option<&BalanceMovement> {
        self.movements.iter().find(|m| m.asset == asset)
    }
}

// ---------------------------------------------------------------------------
// RollbackToken
// ---------------------------------------------------------------------------

/// The engine's balances of every asset a leg touches, read before the leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackToken {
    pub account: Address,
    pub balances: Vec<TokenBalanceSnapshot>,
}

impl RollbackToken {
    #[must_use]
    pub fn balance_of(&self, asset: Address) -> Option<U256> {
        self.balances
            .iter()
            .find(|s| s.asset == asset)
            .map(|s| s.amount)
    }

    /// Balances the instruction promises once the leg is applied.
    pub fn expected_after(&self, instruction: &FillInstruction) -> Result<Vec<(Address, U256)>> {
        instruction
            .movements
            .iter()
            .map(|m| {
                let before = self.balance_of(m.asset).ok_or_else(|| {
                    CrossfillError::Internal(format!(
                        "rollback token has no balance of {}",
                        m.asset
                    ))
                })?;
                let after = m.apply(before).ok_or(CrossfillError::InsufficientBalance {
                    account: self.account,
                    asset: m.asset,
                    needed: m.debit,
                    available: before.saturating_add(m.credit),
                })?;
                Ok((m.asset, after))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// AppliedFill
// ---------------------------------------------------------------------------

/// What a venue reports after executing a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedFill {
    pub venue: VenueId,
    /// Venue-side reference for the executed fill (transaction hash or similar).
    pub reference: B256,
    pub gave: U256,
    pub received: U256,
    pub fee_paid: U256,
}

// ---------------------------------------------------------------------------
// ArbitrageLeg
// ---------------------------------------------------------------------------

/// One leg of a settlement attempt. Owned exclusively by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageLeg {
    pub venue: VenueId,
    pub order_hash: B256,
    pub instruction: FillInstruction,
    pub rollback: RollbackToken,
    pub applied: Option<AppliedFill>,
    pub status: LegStatus,
}

impl ArbitrageLeg {
    #[must_use]
    pub fn new(instruction: FillInstruction, rollback: RollbackToken) -> Self {
        Self {
            venue: instruction.venue,
            order_hash: instruction.order_hash,
            instruction,
            rollback,
            applied: None,
            status: LegStatus::Pending,
        }
    }

    /// Move the leg to `next`, rejecting illegal transitions.
    pub fn transition(&mut self, next: LegStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CrossfillError::Internal(format!(
                "{} leg cannot move from {} to {next}",
                self.venue, self.status
            )));
        }
        self.status = next;
        Ok(())
    }

    pub fn mark_applied(&mut self, fill: AppliedFill) -> Result<()> {
        self.transition(LegStatus::Applied)?;
        self.applied = Some(fill);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LegOutcome
// ---------------------------------------------------------------------------

/// Summary of a leg included in a [`crate::SettlementResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegOutcome {
    pub venue: VenueId,
    pub order_hash: B256,
    pub status: LegStatus,
    pub gave: U256,
    pub received: U256,
}

impl From<&ArbitrageLeg> for LegOutcome {
    fn from(leg: &ArbitrageLeg) -> Self {
        let (gave, received) = leg
            .applied
            .map_or((U256::ZERO, U256::ZERO), |f| (f.gave, f.received));
        Self {
            venue: leg.venue,
            order_hash: leg.order_hash,
            status: leg.status,
            gave,
            received,
        }
    }
}
