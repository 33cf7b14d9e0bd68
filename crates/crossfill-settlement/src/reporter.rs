//! Outcome reporter: turns a finished attempt into a signed
//! [`SettlementResult`] and logs it.
//!
//! Receipts commit to the SHA-256 of [`SettlementResult::payload_bytes`]
//! and are signed with the engine's ed25519 key.

use alloy_primitives::{Address, I256};
use crossfill_types::{
    AbortReason, AttemptId, CrossfillError, EngineId, LegOutcome, ReportingConfig, Result,
    SettlementPhase, SettlementReceipt, SettlementResult, to_units,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

/// Builds, signs, and logs settlement results.
pub struct OutcomeReporter {
    signing_key: SigningKey,
    engine_id: EngineId,
    reporting: ReportingConfig,
}

impl OutcomeReporter {
    #[must_use]
    pub fn new(signing_key: SigningKey, reporting: ReportingConfig) -> Self {
        let engine_id = EngineId::from_pubkey(signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            engine_id,
            reporting,
        }
    }

    #[must_use]
    pub fn engine_id(&self) -> EngineId {
        self.engine_id
    }

    /// Report a committed attempt.
    pub fn committed(
        &self,
        attempt: AttemptId,
        net_asset: Address,
        net_delta: I256,
        legs: Vec<LegOutcome>,
    ) -> SettlementResult {
        let profitable = net_delta > I256::ZERO;
        let units = to_units(net_delta, self.reporting.decimals_of(net_asset));
        info!(
            %attempt,
            %net_asset,
            %net_delta,
            net_units = ?units,
            profitable,
            "settlement committed"
        );
        self.sign(SettlementResult::Committed {
            attempt,
            net_asset,
            net_delta,
            profitable,
            legs,
            receipt: SettlementReceipt::unsigned(attempt, self.engine_id),
        })
    }

    /// Report an aborted attempt.
    pub fn aborted(
        &self,
        attempt: AttemptId,
        err: &CrossfillError,
        failed_in: SettlementPhase,
        legs: Vec<LegOutcome>,
    ) -> SettlementResult {
        let reason = AbortReason::from(err);
        if reason.needs_operator_attention() {
            error!(
                %attempt,
                %reason,
                %failed_in,
                error = %err,
                "settlement aborted; operator funds may be out of place"
            );
        } else {
            warn!(%attempt, %reason, %failed_in, error = %err, "settlement aborted");
        }
        self.sign(SettlementResult::Aborted {
            attempt,
            reason,
            detail: err.to_string(),
            failed_in,
            legs,
            receipt: SettlementReceipt::unsigned(attempt, self.engine_id),
        })
    }

    /// Fill in the receipt. `payload_bytes` cannot fail for a result built
    /// here (see its docs); should it ever, the receipt is left unsigned and
    /// `SettlementReceipt::is_signed` reports it.
    fn sign(&self, mut result: SettlementResult) -> SettlementResult {
        match result.payload_bytes() {
            Ok(payload) => {
                let hash: [u8; 32] = Sha256::digest(&payload).into();
                let signature = self.signing_key.sign(&hash);
                let receipt = result.receipt_mut();
                receipt.payload_hash = hash;
                receipt.signature = signature.to_bytes().to_vec();
                info!(
                    attempt = %receipt.attempt,
                    issuer = %receipt.issuer,
                    payload_hash = %hex::encode(hash),
                    "receipt signed"
                );
            }
            Err(e) => error!(
                attempt = %result.attempt(),
                error = %e,
                "receipt payload not encodable; receipt left unsigned"
            ),
        }
        result
    }
}

/// Check a result's receipt: payload hash matches and the issuer signed it.
pub fn verify_receipt(result: &SettlementResult) -> Result<bool> {
    let receipt = result.receipt();
    if !receipt.is_signed() {
        return Ok(false);
    }
    let hash: [u8; 32] = Sha256::digest(&result.payload_bytes()?).into();
    if &hash != receipt.signing_bytes() {
        return Ok(false);
    }
    let Ok(key) = VerifyingKey::from_bytes(receipt.issuer.as_bytes()) else {
        return Ok(false);
    };
    let Ok(signature) = Signature::from_slice(&receipt.signature) else {
        return Ok(false);
    };
    Ok(key.verify(&hash, &signature).is_ok())
}
