//! Signed settlement receipts.
//!
//! Every settlement attempt, committed or aborted, produces a
//! [`SettlementReceipt`] that can be verified independently of the engine:
//! - A SHA-256 hash of the result payload (see [`crate::SettlementResult::payload_bytes`])
//! - An ed25519 signature over that hash from the issuing engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AttemptId, EngineId};

/// Proof that an engine produced a particular settlement result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub attempt: AttemptId,
    /// SHA-256 hash of the result payload.
    pub payload_hash: [u8; 32],
    /// Ed25519 signature over `payload_hash` from the issuing engine.
    pub signature: Vec<u8>,
    /// The engine that issued this receipt.
    pub issuer: EngineId,
    pub issued_at: DateTime<Utc>,
}

impl SettlementReceipt {
    /// A receipt with no proof attached yet.
    #[must_use]
    pub fn unsigned(attempt: AttemptId, issuer: EngineId) -> Self {
        Self {
            attempt,
            payload_hash: [0u8; 32],
            signature: Vec::new(),
            issuer,
            issued_at: Utc::now(),
        }
    }

    /// Construct the bytes that should be signed: the payload hash.
    #[must_use]
    pub fn signing_bytes(&self) -> &[u8; 32] {
        &self.payload_hash
    }

    #[must_use]
    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }

    pub(crate) fn clear_proof(&mut self) {
        self.payload_hash = [0u8; 32];
        self.signature.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_receipt_has_no_proof() {
        let receipt = SettlementReceipt::unsigned(AttemptId::new(), EngineId([7; 32]));
        assert!(!receipt.is_signed());
        assert_eq!(receipt.signing_bytes(), &[0u8; 32]);
    }

    #[test]
    fn clear_proof_resets_hash_and_signature() {
        let mut receipt = SettlementReceipt::unsigned(AttemptId::new(), EngineId([7; 32]));
        receipt.payload_hash = [1; 32];
        receipt.signature = vec![2; 64];
        receipt.clear_proof();
        assert!(!receipt.is_signed());
        assert_eq!(receipt.payload_hash, [0u8; 32]);
    }

    #[test]
    fn receipt_serde_roundtrip() {
        let receipt = SettlementReceipt::unsigned(AttemptId::new(), EngineId([7; 32]));
        let json = serde_json::to_string(&receipt).unwrap();
        let back: SettlementReceipt = serde_json::from_str(&json).unwrap();
        assert_eq!(receipt, back);
    }
}
