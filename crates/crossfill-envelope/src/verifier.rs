//! Signature verification for venue orders.
//!
//! The verifier answers one question: does `signature` over `hash` recover
//! to `claimed_signer`? It never errors. Unknown `v` values, zero or
//! out-of-range scalars, and failed recovery are all simply `false`.

use alloy_primitives::{Address, B256, Signature, U256, eip191_hash_message};
use crossfill_types::{DigestScheme, EcSignature};

/// Capability consumed by the validator.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, hash: B256, signature: &EcSignature, claimed_signer: Address) -> bool;
}

/// secp256k1 public-key recovery over the order hash or its EIP-191 digest.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcdsaVerifier {
    scheme: DigestScheme,
}

impl EcdsaVerifier {
    #[must_use]
    pub fn new(scheme: DigestScheme) -> Self {
        Self { scheme }
    }

    /// The digest a maker actually signs for an order `hash`.
    #[must_use]
    pub fn digest(&self, hash: B256) -> B256 {
        match self.scheme {
            DigestScheme::Raw => hash,
            DigestScheme::PersonalMessage => eip191_hash_message(hash.as_slice()),
        }
    }

    /// Recover the signing address, if the signature is well formed.
    #[must_use]
    pub fn recover(&self, hash: B256, signature: &EcSignature) -> Option<Address> {
        let parity = signature.y_parity()?;
        let sig = Signature::new(
            U256::from_be_bytes(signature.r.0),
            U256::from_be_bytes(signature.s.0),
            parity,
        );
        sig.recover_address_from_prehash(&self.digest(hash)).ok()
    }
}

impl SignatureVerifier for EcdsaVerifier {
    fn verify(&self, hash: B256, signature: &EcSignature, claimed_signer: Address) -> bool {
        if claimed_signer == Address::ZERO {
            return false;
        }
        self.recover(hash, signature) == Some(claimed_signer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;

    fn signer() -> PrivateKeySigner {
        PrivateKeySigner::from_bytes(&B256::repeat_byte(0x11)).unwrap()
    }

    fn sign(verifier: &EcdsaVerifier, signer: &PrivateKeySigner, hash: B256) -> EcSignature {
        let sig = signer.sign_hash_sync(&verifier.digest(hash)).unwrap();
        EcSignature {
            v: 27 + u8::from(sig.v()),
            r: B256::from(sig.r().to_be_bytes::<32>()),
            s: B256::from(sig.s().to_be_bytes::<32>()),
        }
    }

    #[test]
    fn personal_message_signature_verifies() {
        let verifier = EcdsaVerifier::default();
        let signer = signer();
        let hash = B256::repeat_byte(0x42);
        let sig = sign(&verifier, &signer, hash);
        assert!(verifier.verify(hash, &sig, signer.address()));
    }

    #[test]
    fn raw_signature_verifies_only_under_raw_scheme() {
        let raw = EcdsaVerifier::new(DigestScheme::Raw);
        let personal = EcdsaVerifier::new(DigestScheme::PersonalMessage);
        let signer = signer();
        let hash = B256::repeat_byte(0x42);
        let sig = sign(&raw, &signer, hash);
        assert!(raw.verify(hash, &sig, signer.address()));
        assert!(!personal.verify(hash, &sig, signer.address()));
    }

    #[test]
    fn wrong_signer_or_hash_fails() {
        let verifier = EcdsaVerifier::default();
        let signer = signer();
        let hash = B256::repeat_byte(0x42);
        let sig = sign(&verifier, &signer, hash);
        assert!(!verifier.verify(hash, &sig, Address::repeat_byte(0x99)));
        assert!(!verifier.verify(B256::repeat_byte(0x43), &sig, signer.address()));
    }

    #[test]
    fn malformed_signature_is_false_not_error() {
        let verifier = EcdsaVerifier::default();
        let zero = EcSignature {
            v: 27,
            r: B256::ZERO,
            s: B256::ZERO,
        };
        assert!(!verifier.verify(B256::repeat_byte(1), &zero, Address::repeat_byte(1)));

        let signer = signer();
        let hash = B256::repeat_byte(0x42);
        let mut bad_v = sign(&verifier, &signer, hash);
        bad_v.v = 35;
        assert!(!verifier.verify(hash, &bad_v, signer.address()));
    }

    #[test]
    fn zero_claimed_signer_never_verifies() {
        let verifier = EcdsaVerifier::default();
        let zero = EcSignature {
            v: 27,
            r: B256::ZERO,
            s: B256::ZERO,
        };
        assert!(!verifier.verify(B256::ZERO, &zero, Address::ZERO));
    }
}
