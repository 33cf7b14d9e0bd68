//! Settlement attempt lifecycle types.
//!
//! One attempt moves through the phases
//! **IDLE → VALIDATING → LEG1_EXECUTING → LEG2_EXECUTING → COMMITTED**,
//! or leaves any non-terminal phase through **ABORTING → ABORTED**.
//!
//! The orchestrator never returns an `Err` for a settlement attempt: every
//! failure becomes a [`SettlementResult::Aborted`] carrying an
//! [`AbortReason`] derived from the underlying [`CrossfillError`].

use std::fmt;

use alloy_primitives::{Address, I256, U256};
use serde::{Deserialize, Serialize};

use crate::{
    AttemptId, CrossfillError, LegOutcome, Result, SecondaryVenueOrder, SettlementReceipt,
    SignedOrder,
};

// ---------------------------------------------------------------------------
// SettlementPhase
// ---------------------------------------------------------------------------

/// Phases of a single settlement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettlementPhase {
    /// No attempt in flight.
    Idle,
    /// Hashes, signatures, expiry, and cycle shape are being checked.
    Validating,
    /// The primary venue fill is being submitted and verified.
    Leg1Executing,
    /// The secondary venue fill is being submitted and verified.
    Leg2Executing,
    /// Both legs applied and verified. Terminal.
    Committed,
    /// Applied legs are being compensated or verified as reverted.
    Aborting,
    /// The attempt failed and the engine's balances are restored. Terminal.
    Aborted,
}

impl SettlementPhase {
    /// Whether a transition from `self` to `next` is legal.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use SettlementPhase::{
            Aborted, Aborting, Committed, Idle, Leg1Executing, Leg2Executing, Validating,
        };
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Leg1Executing)
                | (Leg1Executing, Leg2Executing)
                | (Leg2Executing, Committed)
                | (Idle | Validating | Leg1Executing | Leg2Executing, Aborting)
                | (Aborting, Aborted)
        )
    }

    /// Committed and Aborted admit no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

impl fmt::Display for SettlementPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Validating => write!(f, "VALIDATING"),
            Self::Leg1Executing => write!(f, "LEG1_EXECUTING"),
            Self::Leg2Executing => write!(f, "LEG2_EXECUTING"),
            Self::Committed => write!(f, "COMMITTED"),
            Self::Aborting => write!(f, "ABORTING"),
            Self::Aborted => write!(f, "ABORTED"),
        }
    }
}

// ---------------------------------------------------------------------------
// SettlementRequest
// ---------------------------------------------------------------------------

/// Everything the orchestrator needs for one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub primary: SignedOrder,
    pub secondary: SecondaryVenueOrder,
    /// Account that takes both orders and must end up with the profit.
    pub operator: Address,
    /// Taker-asset amount to fill on the primary venue. Defaults to the whole order.
    pub primary_fill: Option<U256>,
    /// Get-asset amount to fill on the secondary venue. Defaults to what leg 1
    /// yields, capped by the order size.
    pub secondary_fill: Option<U256>,
    /// Overrides the configured abort-if-unprofitable policy for this attempt.
    pub abort_if_unprofitable: Option<bool>,
}

impl SettlementRequest {
    #[must_use]
    pub fn new(primary: SignedOrder, secondary: SecondaryVenueOrder, operator: Address) -> Self {
        Self {
            primary,
            secondary,
            operator,
            primary_fill: None,
            secondary_fill: None,
            abort_if_unprofitable: None,
        }
    }

    #[must_use]
    pub fn with_primary_fill(mut self, amount: U256) -> Self {
        self.primary_fill = Some(amount);
        self
    }

    #[must_use]
    pub fn with_secondary_fill(mut self, amount: U256) -> Self {
        self.secondary_fill = Some(amount);
        self
    }

    #[must_use]
    pub fn abort_if_unprofitable(mut self, abort: bool) -> Self {
        self.abort_if_unprofitable = Some(abort);
        self
    }
}

// ---------------------------------------------------------------------------
// AbortReason
// ---------------------------------------------------------------------------

/// Reason code attached to an aborted attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbortReason {
    MalformedOrder,
    InvalidSignature,
    OrderExpired,
    InsufficientBalance,
    InsufficientAllowance,
    PreAuthorizationFailed,
    SettlementReverted,
    InconsistentState,
    CompensationFailed,
    Unprofitable,
    Cancelled,
    LedgerUnavailable,
    Internal,
}

impl AbortReason {
    /// Whether the attempt may have left operator funds out of place.
    #[must_use]
    pub fn needs_operator_attention(self) -> bool {
        matches!(self, Self::CompensationFailed | Self::Internal)
    }
}

impl From<&CrossfillError> for AbortReason {
    fn from(err: &CrossfillError) -> Self {
        match err {
            CrossfillError::MalformedOrder { .. } => Self::MalformedOrder,
            CrossfillError::InvalidSignature { .. } => Self::InvalidSignature,
            CrossfillError::OrderExpired { .. } => Self::OrderExpired,
            CrossfillError::InsufficientBalance { .. } => Self::InsufficientBalance,
            CrossfillError::InsufficientAllowance { .. } => Self::InsufficientAllowance,
            CrossfillError::PreAuthorizationFailed { .. } => Self::PreAuthorizationFailed,
            CrossfillError::SettlementReverted { .. } => Self::SettlementReverted,
            CrossfillError::InconsistentState { .. } => Self::InconsistentState,
            CrossfillError::CompensationFailed { .. } => Self::CompensationFailed,
            CrossfillError::Unprofitable { .. } => Self::Unprofitable,
            CrossfillError::Cancelled => Self::Cancelled,
            CrossfillError::LedgerUnavailable { .. } => Self::LedgerUnavailable,
            CrossfillError::InvalidTransition { .. }
            | CrossfillError::Internal(_)
            | CrossfillError::Serialization(_)
            | CrossfillError::Configuration(_) => Self::Internal,
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MalformedOrder => "MALFORMED_ORDER",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::OrderExpired => "ORDER_EXPIRED",
            Self::InsufficientBalance => "INSUFFICIENT_BALANCE",
            Self::InsufficientAllowance => "INSUFFICIENT_ALLOWANCE",
            Self::PreAuthorizationFailed => "PRE_AUTHORIZATION_FAILED",
            Self::SettlementReverted => "SETTLEMENT_REVERTED",
            Self::InconsistentState => "INCONSISTENT_STATE",
            Self::CompensationFailed => "COMPENSATION_FAILED",
            Self::Unprofitable => "UNPROFITABLE",
            Self::Cancelled => "CANCELLED",
            Self::LedgerUnavailable => "LEDGER_UNAVAILABLE",
            Self::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// SettlementResult
// ---------------------------------------------------------------------------

/// Final outcome of one settlement attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SettlementResult {
    /// Both legs applied. `net_delta` may still be non-positive.
    Committed {
        attempt: AttemptId,
        net_asset: Address,
        /// Post-leg-2 balance minus pre-leg-1 balance of `net_asset`.
        net_delta: I256,
        profitable: bool,
        legs: Vec<LegOutcome>,
        receipt: SettlementReceipt,
    },
    /// The attempt failed; applied legs were compensated or reverted.
    Aborted {
        attempt: AttemptId,
        reason: AbortReason,
        /// Rendered error message, including its `XF_ERR_` code.
        detail: String,
        /// Phase in which the failure surfaced.
        failed_in: SettlementPhase,
        legs: Vec<LegOutcome>,
        receipt: SettlementReceipt,
    },
}

impl SettlementResult {
    #[must_use]
    pub fn attempt(&self) -> AttemptId {
        match self {
            Self::Committed { attempt, .. } | Self::Aborted { attempt, .. } => *attempt,
        }
    }

    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    #[must_use]
    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self {
            Self::Committed { .. } => None,
            Self::Aborted { reason, .. } => Some(*reason),
        }
    }

    #[must_use]
    pub fn net_delta(&self) -> Option<I256> {
        match self {
            Self::Committed { net_delta, .. } => Some(*net_delta),
            Self::Aborted { .. } => None,
        }
    }

    #[must_use]
    pub fn legs(&self) -> &[LegOutcome] {
        match self {
            Self::Committed { legs, .. } | Self::Aborted { legs, .. } => legs,
        }
    }

    #[must_use]
    pub fn receipt(&self) -> &SettlementReceipt {
        match self {
            Self::Committed { receipt, .. } | Self::Aborted { receipt, .. } => receipt,
        }
    }

    pub fn receipt_mut(&mut self) -> &mut SettlementReceipt {
        match self {
            Self::Committed { receipt, .. } | Self::Aborted { receipt, .. } => receipt,
        }
    }

    /// Canonical bytes a receipt commits to: the JSON encoding of the result
    /// with the receipt's own hash and signature blanked.
    ///
    /// Every field serializes as a string, number, bool, fixed array or
    /// nested struct, and no result holds a map, so `serde_json` has nothing
    /// to reject. The `Result` only carries the encoder's signature.
    pub fn payload_bytes(&self) -> Result<Vec<u8>> {
        let mut unsigned = self.clone();
        unsigned.receipt_mut().clear_proof();
        Ok(serde_json::to_vec(&unsigned)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VenueId;

    #[test]
    fn happy_path_transitions() {
        use SettlementPhase::*;
        let path = [Idle, Validating, Leg1Executing, Leg2Executing, Committed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn abort_reachable_from_every_non_terminal_phase() {
        use SettlementPhase::*;
        for phase in [Idle, Validating, Leg1Executing, Leg2Executing] {
            assert!(phase.can_transition_to(Aborting), "{phase}");
            assert!(!phase.is_terminal());
        }
        assert!(Aborting.can_transition_to(Aborted));
    }

    #[test]
    fn terminal_phases_are_final() {
        use SettlementPhase::*;
        for terminal in [Committed, Aborted] {
            assert!(terminal.is_terminal());
            for next in [
                Idle,
                Validating,
                Leg1Executing,
                Leg2Executing,
                Committed,
                Aborting,
                Aborted,
            ] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn legs_cannot_be_skipped() {
        use SettlementPhase::*;
        assert!(!Validating.can_transition_to(Leg2Executing));
        assert!(!Leg1Executing.can_transition_to(Committed));
        assert!(!Idle.can_transition_to(Leg1Executing));
        assert!(!Aborting.can_transition_to(Committed));
    }

    #[test]
    fn abort_reason_from_error() {
        let err = CrossfillError::SettlementReverted {
            venue: VenueId::Secondary,
            reason: "order consumed".into(),
        };
        assert_eq!(AbortReason::from(&err), AbortReason::SettlementReverted);
        assert_eq!(
            AbortReason::from(&CrossfillError::Internal("x".into())),
            AbortReason::Internal
        );
        assert_eq!(AbortReason::from(&CrossfillError::Cancelled), AbortReason::Cancelled);
    }

    #[test]
    fn abort_reason_display() {
        assert_eq!(format!("{}", AbortReason::SettlementReverted), "SETTLEMENT_REVERTED");
        assert!(AbortReason::CompensationFailed.needs_operator_attention());
        assert!(!AbortReason::OrderExpired.needs_operator_attention());
    }

    #[test]
    fn request_builder_sets_overrides() {
        let primary = SignedOrder::dummy(
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            U256::from(1u64),
            U256::from(1u64),
        );
        let secondary = SecondaryVenueOrder::dummy(
            Address::repeat_byte(1),
            U256::from(1u64),
            Address::repeat_byte(2),
            U256::from(2u64),
            100,
        );
        let req = SettlementRequest::new(primary, secondary, Address::repeat_byte(9))
            .with_primary_fill(U256::from(1u64))
            .abort_if_unprofitable(true);
        assert_eq!(req.primary_fill, Some(U256::from(1u64)));
        assert_eq!(req.secondary_fill, None);
        assert_eq!(req.abort_if_unprofitable, Some(true));
    }
}
