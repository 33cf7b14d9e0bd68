//! Error types for the Crossfill settlement engine.
//!
//! All errors use the `XF_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Order errors (shape, signature, expiry)
//! - 2xx: Ledger / balance errors
//! - 3xx: Authorization (allowance) errors
//! - 4xx: Execution errors (leg failures, compensation)
//! - 9xx: General / internal errors

use alloy_primitives::{Address, B256, U256};
use thiserror::Error;

use crate::{SettlementPhase, VenueId};

/// Central error enum for all Crossfill operations.
#[derive(Debug, Error)]
pub enum CrossfillError {
    // =================================================================
    // Order Errors (1xx)
    // =================================================================
    /// A required field is missing, unparsable, or non-positive.
    #[error("XF_ERR_100: Malformed order: {reason}")]
    MalformedOrder { reason: String },

    /// The order signature does not recover to the claimed signer.
    #[error("XF_ERR_101: Invalid signature on {venue} order {order_hash}")]
    InvalidSignature { venue: VenueId, order_hash: B256 },

    /// The order is past its expiration in its own venue's unit.
    #[error("XF_ERR_102: {venue} order {order_hash} expired: {detail}")]
    OrderExpired {
        venue: VenueId,
        order_hash: B256,
        detail: String,
    },

    // =================================================================
    // Ledger / Balance Errors (2xx)
    // =================================================================
    /// An account does not hold enough of an asset.
    #[error(
        "XF_ERR_200: Insufficient balance of {asset} for {account}: need {needed}, have {available}"
    )]
    InsufficientBalance {
        account: Address,
        asset: Address,
        needed: U256,
        available: U256,
    },

    /// The ledger could not be read.
    #[error("XF_ERR_201: Ledger unavailable: {reason}")]
    LedgerUnavailable { reason: String },

    // =================================================================
    // Authorization Errors (3xx)
    // =================================================================
    /// An owner has not approved enough of an asset to a venue spender.
    #[error(
        "XF_ERR_300: Insufficient allowance of {asset} from {owner} to {spender}: need {needed}, have {approved}"
    )]
    InsufficientAllowance {
        owner: Address,
        asset: Address,
        spender: Address,
        needed: U256,
        approved: U256,
    },

    /// The engine's own allowance could not be established before execution.
    #[error("XF_ERR_301: Pre-authorization failed for {asset} to {spender}: {reason}")]
    PreAuthorizationFailed {
        asset: Address,
        spender: Address,
        reason: String,
    },

    // =================================================================
    // Execution Errors (4xx)
    // =================================================================
    /// The venue rejected the fill (front-run, consumed, or venue-side failure).
    #[error("XF_ERR_400: Settlement reverted on {venue}: {reason}")]
    SettlementReverted { venue: VenueId, reason: String },

    /// Post-leg balances do not match the expected movements.
    #[error("XF_ERR_401: Inconsistent state after {venue} leg: {reason}")]
    InconsistentState { venue: VenueId, reason: String },

    /// Undoing an applied leg failed. Operator funds may be out of place.
    #[error("XF_ERR_402: Compensation failed for {venue} leg: {reason}")]
    CompensationFailed { venue: VenueId, reason: String },

    /// Abort-if-unprofitable policy triggered.
    #[error("XF_ERR_403: Unprofitable settlement: net delta {net} of {asset}")]
    Unprofitable { asset: Address, net: String },

    /// The caller cancelled the attempt before the first leg.
    #[error("XF_ERR_404: Settlement cancelled before execution")]
    Cancelled,

    /// The state machine was asked to make an illegal move.
    #[error("XF_ERR_405: Invalid phase transition: {from} -> {to}")]
    InvalidTransition {
        from: SettlementPhase,
        to: SettlementPhase,
    },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("XF_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("XF_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("XF_ERR_902: Configuration error: {0}")]
    Configuration(String),
}

impl CrossfillError {
    /// Shorthand for [`CrossfillError::MalformedOrder`].
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedOrder {
            reason: reason.into(),
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, CrossfillError>;

impl From<serde_json::Error> for CrossfillError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = CrossfillError::malformed("makerAmount missing");
        let msg = format!("{err}");
        assert!(msg.starts_with("XF_ERR_100"), "Got: {msg}");
        assert!(msg.contains("makerAmount"));
    }

    #[test]
    fn insufficient_balance_display() {
        let err = CrossfillError::InsufficientBalance {
            account: Address::ZERO,
            asset: Address::repeat_byte(0x11),
            needed: U256::from(100u64),
            available: U256::from(50u64),
        };
        let msg = format!("{err}");
        assert!(msg.contains("XF_ERR_200"));
        assert!(msg.contains("100"));
        assert!(msg.contains("50"));
    }

    #[test]
    fn invalid_transition_display() {
        let err = CrossfillError::InvalidTransition {
            from: SettlementPhase::Committed,
            to: SettlementPhase::Leg1Executing,
        };
        let msg = format!("{err}");
        assert!(msg.contains("XF_ERR_405"));
        assert!(msg.contains("COMMITTED"));
        assert!(msg.contains("LEG1_EXECUTING"));
    }

    #[test]
    fn all_errors_have_xf_err_prefix() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(CrossfillError::Cancelled),
            Box::new(CrossfillError::Internal("test".into())),
            Box::new(CrossfillError::LedgerUnavailable {
                reason: "rpc down".into(),
            }),
            Box::new(CrossfillError::InconsistentState {
                venue: VenueId::Primary,
                reason: "skimmed".into(),
            }),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with("XF_ERR_"),
                "Error missing XF_ERR_ prefix: {msg}"
            );
        }
    }
}
