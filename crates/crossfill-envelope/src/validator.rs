//! Order validator: hard gate before any ledger read.
//!
//! Checks run in a fixed order and stop at the first failure:
//! 1. Field positivity and venue binding
//! 2. Signatures (so a forged order never costs a balance read)
//! 3. Expiry, each venue in its own unit
//! 4. Taker restriction and cycle shape
//!
//! Validation has no side effects: running it twice on the same inputs
//! gives the same answer.

use std::sync::Arc;

use alloy_primitives::{Address, B256};
use chrono::Utc;
use crossfill_types::{
    CrossfillError, EngineConfig, Order, ReferencePoint, Result, SecondaryVenueOrder, SignedOrder,
};
use tracing::debug;

use crate::{ledger_reader::LedgerReader, verifier::SignatureVerifier};

/// Hashes and reference point of a pair that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedPair {
    pub primary_hash: B256,
    pub secondary_hash: B256,
    pub reference: ReferencePoint,
}

/// Current wall clock plus the ledger's latest block height.
pub fn reference_point(reader: &dyn LedgerReader) -> Result<ReferencePoint> {
    Ok(ReferencePoint::new(Utc::now(), reader.latest_block()?))
}

/// Stateless validator for a primary/secondary order pair.
pub struct OrderValidator {
    verifier: Arc<dyn SignatureVerifier>,
    primary_exchange: Address,
    secondary_venue: Address,
}

impl OrderValidator {
    #[must_use]
    pub fn new(verifier: Arc<dyn SignatureVerifier>, config: &EngineConfig) -> Self {
        Self {
            verifier,
            primary_exchange: config.primary.exchange,
            secondary_venue: config.secondary.contract,
        }
    }

    /// Fields, venue binding, and signature. Returns the order hash.
    fn check_authentic(&self, order: &Order) -> Result<B256> {
        order.validate_fields()?;
        let (bound_to, expected) = match order {
            Order::Primary(o) => (o.exchange, self.primary_exchange),
            Order::Secondary(o) => (o.venue, self.secondary_venue),
        };
        if bound_to != expected {
            return Err(CrossfillError::malformed(format!(
                "{} order bound to {bound_to}, expected {expected}",
                order.venue()
            )));
        }

        let hash = order.hash();
        if !self.verifier.verify(hash, order.signature(), order.signer()) {
            return Err(CrossfillError::InvalidSignature {
                venue: order.venue(),
                order_hash: hash,
            });
        }
        debug!(venue = %order.venue(), order_hash = %hash, "signature valid");
        Ok(hash)
    }

    /// Validate both orders and check that they close a cycle for `taker`.
    ///
    /// Both signatures are checked before either expiry.
    pub fn validate_pair(
        &self,
        primary: &SignedOrder,
        secondary: &SecondaryVenueOrder,
        taker: Address,
        reference: &ReferencePoint,
    ) -> Result<ValidatedPair> {
        let primary_order = Order::Primary(primary.clone());
        let secondary_order = Order::Secondary(secondary.clone());

        let primary_hash = self.check_authentic(&primary_order)?;
        let secondary_hash = self.check_authentic(&secondary_order)?;
        check_unexpired(&primary_order, primary_hash, reference)?;
        check_unexpired(&secondary_order, secondary_hash, reference)?;

        if !primary.accepts_taker(taker) {
            return Err(CrossfillError::malformed(format!(
                "primary order {primary_hash} is reserved for another taker"
            )));
        }
        check_cycle(primary, secondary)?;

        debug!(
            primary_hash = %primary_hash,
            secondary_hash = %secondary_hash,
            block = reference.block_height,
            "order pair valid"
        );
        Ok(ValidatedPair {
            primary_hash,
            secondary_hash,
            reference: *reference,
        })
    }
}

fn check_unexpired(order: &Order, hash: B256, reference: &ReferencePoint) -> Result<()> {
    if order.is_expired(reference) {
        return Err(CrossfillError::OrderExpired {
            venue: order.venue(),
            order_hash: hash,
            detail: order.expiry_detail(reference),
        });
    }
    Ok(())
}

/// The secondary order must take what the primary yields and give back
/// what the primary costs.
fn check_cycle(primary: &SignedOrder, secondary: &SecondaryVenueOrder) -> Result<()> {
    if secondary.asset_to_get != primary.maker_asset {
        return Err(CrossfillError::malformed(format!(
            "secondary order wants {}, primary yields {}",
            secondary.asset_to_get, primary.maker_asset
        )));
    }
    if secondary.asset_to_give != primary.taker_asset {
        return Err(CrossfillError::malformed(format!(
            "secondary order gives {}, primary costs {}",
            secondary.asset_to_give, primary.taker_asset
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;
    use crossfill_types::{
        DigestScheme, EcSignature, PrimaryVenueConfig, SecondaryVenueConfig, VenueId,
    };

    use super::*;
    use crate::verifier::EcdsaVerifier;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;

    fn a() -> Address {
        Address::repeat_byte(0x0a)
    }

    fn b() -> Address {
        Address::repeat_byte(0x0b)
    }

    fn config() -> EngineConfig {
        EngineConfig::new(
            PrimaryVenueConfig {
                exchange: Address::repeat_byte(0xe0),
                transfer_proxy: Address::repeat_byte(0xe1),
                fee_asset: Address::repeat_byte(0xfe),
            },
            SecondaryVenueConfig {
                contract: Address::repeat_byte(0xed),
            },
        )
    }

    fn sign(hash: B256, key: &PrivateKeySigner) -> EcSignature {
        let digest = EcdsaVerifier::new(DigestScheme::PersonalMessage).digest(hash);
        let sig = key.sign_hash_sync(&digest).unwrap();
        EcSignature {
            v: 27 + u8::from(sig.v()),
            r: B256::from(sig.r().to_be_bytes::<32>()),
            s: B256::from(sig.s().to_be_bytes::<32>()),
        }
    }

    fn key(byte: u8) -> PrivateKeySigner {
        PrivateKeySigner::from_bytes(&B256::repeat_byte(byte)).unwrap()
    }

    /// Primary: maker offers 1 A for 1 B. Secondary: counterparty offers 2 B for 1 A.
    fn signed_pair() -> (SignedOrder, SecondaryVenueOrder) {
        let one = U256::from(1u64);
        let mut primary = SignedOrder::dummy(a(), b(), one, one);
        let maker = key(0x21);
        primary.maker = maker.address();
        primary.signature = sign(primary.hash(), &maker);

        let mut secondary = SecondaryVenueOrder::dummy(a(), one, b(), U256::from(2u64), 1_000);
        let counterparty = key(0x22);
        secondary.maker = counterparty.address();
        secondary.signature = sign(secondary.hash(), &counterparty);
        (primary, secondary)
    }

    fn validator() -> OrderValidator {
        OrderValidator::new(Arc::new(EcdsaVerifier::default()), &config())
    }

    fn now_at(block: u64) -> ReferencePoint {
        ReferencePoint::new(Utc::now(), block)
    }

    #[test]
    fn valid_pair_passes() {
        let (primary, secondary) = signed_pair();
        let pair = validator()
            .validate_pair(&primary, &secondary, Address::repeat_byte(9), &now_at(100))
            .unwrap();
        assert_eq!(pair.primary_hash, primary.hash());
        assert_eq!(pair.secondary_hash, secondary.hash());
    }

    #[test]
    fn validation_is_idempotent() {
        let (primary, secondary) = signed_pair();
        let v = validator();
        let at = now_at(100);
        let first = v.validate_pair(&primary, &secondary, Address::repeat_byte(9), &at).unwrap();
        let second = v.validate_pair(&primary, &secondary, Address::repeat_byte(9), &at).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn tampered_order_fails_signature() {
        let (mut primary, secondary) = signed_pair();
        primary.maker_amount = U256::from(5u64);
        let err = validator()
            .validate_pair(&primary, &secondary, Address::repeat_byte(9), &now_at(100))
            .unwrap_err();
        assert!(matches!(
            err,
            CrossfillError::InvalidSignature { venue: VenueId::Primary, .. }
        ));
    }

    #[test]
    fn signature_checked_before_expiry() {
        let (primary, mut secondary) = signed_pair();
        // Expired and forged: the signature error wins.
        secondary.signature.s = B256::repeat_byte(0x77);
        let err = validator()
            .validate_pair(&primary, &secondary, Address::repeat_byte(9), &now_at(5_000))
            .unwrap_err();
        assert!(matches!(
            err,
            CrossfillError::InvalidSignature { venue: VenueId::Secondary, .. }
        ));
    }

    #[test]
    fn secondary_expiry_uses_block_height() {
        let (primary, secondary) = signed_pair();
        let v = validator();
        let taker = Address::repeat_byte(9);
        assert!(v.validate_pair(&primary, &secondary, taker, &now_at(1_000)).is_ok());
        let err = v
            .validate_pair(&primary, &secondary, taker, &now_at(1_001))
            .unwrap_err();
        assert!(matches!(
            err,
            CrossfillError::OrderExpired { venue: VenueId::Secondary, .. }
        ));
    }

    #[test]
    fn primary_expiry_uses_wall_clock() {
        let (primary, secondary) = signed_pair();
        let later = Utc::now() + chrono::Duration::hours(2);
        let err = validator()
            .validate_pair(
                &primary,
                &secondary,
                Address::repeat_byte(9),
                &ReferencePoint::new(later, 100),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CrossfillError::OrderExpired { venue: VenueId::Primary, .. }
        ));
    }

    #[test]
    fn reserved_taker_is_enforced() {
        let (mut primary, secondary) = signed_pair();
        let maker = key(0x21);
        primary.taker = Some(Address::repeat_byte(0x33));
        primary.signature = sign(primary.hash(), &maker);
        let err = validator()
            .validate_pair(&primary, &secondary, Address::repeat_byte(9), &now_at(100))
            .unwrap_err();
        assert!(matches!(err, CrossfillError::MalformedOrder { .. }));
    }

    #[test]
    fn non_cycle_pair_is_malformed() {
        let (primary, mut secondary) = signed_pair();
        let counterparty = key(0x22);
        secondary.asset_to_give = Address::repeat_byte(0x0c);
        secondary.signature = sign(secondary.hash(), &counterparty);
        let err = validator()
            .validate_pair(&primary, &secondary, Address::repeat_byte(9), &now_at(100))
            .unwrap_err();
        assert!(matches!(err, CrossfillError::MalformedOrder { .. }));
    }

    #[test]
    fn wrong_venue_binding_is_malformed() {
        let (mut primary, secondary) = signed_pair();
        primary.exchange = Address::repeat_byte(0x01);
        let err = validator()
            .validate_pair(&primary, &secondary, Address::repeat_byte(9), &now_at(100))
            .unwrap_err();
        assert!(matches!(err, CrossfillError::MalformedOrder { .. }));
    }
}
