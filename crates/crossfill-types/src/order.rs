//! Order model for the two venues.
//!
//! The venues publish structurally different signed orders and verify
//! signatures against different canonical hashes:
//!
//! | Venue     | Hash        | Expiry unit        | Maker in hash |
//! |-----------|-------------|--------------------|---------------|
//! | Primary   | keccak-256  | unix seconds       | yes           |
//! | Secondary | SHA-256     | block height       | no            |
//!
//! Both hashes use Solidity tight packing: addresses as 20 bytes, integers
//! as 32-byte big-endian words. The two schemes never share a code path.

use alloy_primitives::{Address, B256, U256, keccak256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{CrossfillError, Result, VenueId};

/// Width of a packed address.
const ADDRESS_BYTES: usize = 20;
/// Width of a packed `uint256`.
const WORD_BYTES: usize = 32;

// ---------------------------------------------------------------------------
// EcSignature
// ---------------------------------------------------------------------------

/// A secp256k1 signature in `{v, r, s}` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EcSignature {
    pub v: u8,
    pub r: B256,
    pub s: B256,
}

impl EcSignature {
    /// The recovery parity encoded by `v`, or `None` if `v` is not one of
    /// `0`, `1`, `27`, `28`.
    #[must_use]
    pub fn y_parity(&self) -> Option<bool> {
        match self.v {
            0 | 27 => Some(false),
            1 | 28 => Some(true),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ReferencePoint
// ---------------------------------------------------------------------------

/// The point in time against which expirations are judged.
///
/// Each venue reads only its own unit: the primary venue compares
/// `timestamp`, the secondary venue compares `block_height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub timestamp: DateTime<Utc>,
    pub block_height: u64,
}

impl ReferencePoint {
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, block_height: u64) -> Self {
        Self {
            timestamp,
            block_height,
        }
    }

    /// Wall-clock seconds since the UNIX epoch, clamped at zero.
    #[must_use]
    pub fn unix_secs(&self) -> u64 {
        u64::try_from(self.timestamp.timestamp()).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Fill arithmetic
// ---------------------------------------------------------------------------

/// `floor(numerator * target / denominator)`, `None` on overflow or a zero
/// denominator.
#[must_use]
pub fn partial_amount(numerator: U256, denominator: U256, target: U256) -> Option<U256> {
    numerator.checked_mul(target)?.checked_div(denominator)
}

fn push_address(packed: &mut Vec<u8>, address: Address) {
    packed.extend_from_slice(address.as_slice());
}

fn push_word(packed: &mut Vec<u8>, word: U256) {
    packed.extend_from_slice(&word.to_be_bytes::<WORD_BYTES>());
}

// ---------------------------------------------------------------------------
// SignedOrder (primary venue)
// ---------------------------------------------------------------------------

/// A primary-venue signed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOrder {
    /// Exchange contract the order is bound to (part of the hash).
    pub exchange: Address,
    pub maker: Address,
    /// Restricted taker, or `None` for an open order.
    pub taker: Option<Address>,
    pub maker_asset: Address,
    pub taker_asset: Address,
    pub fee_recipient: Address,
    pub maker_amount: U256,
    pub taker_amount: U256,
    pub maker_fee: U256,
    pub taker_fee: U256,
    /// Expiration in unix seconds.
    pub expiration_unix_secs: u64,
    pub salt: U256,
    pub signature: EcSignature,
}

impl SignedOrder {
    /// keccak-256 over the tightly packed order fields.
    #[must_use]
    pub fn hash(&self) -> B256 {
        let mut packed = Vec::with_capacity(6 * ADDRESS_BYTES + 6 * WORD_BYTES);
        push_address(&mut packed, self.exchange);
        push_address(&mut packed, self.maker);
        push_address(&mut packed, self.taker.unwrap_or(Address::ZERO));
        push_address(&mut packed, self.maker_asset);
        push_address(&mut packed, self.taker_asset);
        push_address(&mut packed, self.fee_recipient);
        push_word(&mut packed, self.maker_amount);
        push_word(&mut packed, self.taker_amount);
        push_word(&mut packed, self.maker_fee);
        push_word(&mut packed, self.taker_fee);
        push_word(&mut packed, U256::from(self.expiration_unix_secs));
        push_word(&mut packed, self.salt);
        keccak256(&packed)
    }

    /// Expired once the wall clock reaches the expiration second.
    #[must_use]
    pub fn is_expired(&self, reference: &ReferencePoint) -> bool {
        reference.unix_secs() >= self.expiration_unix_secs
    }

    /// Whether `taker` may fill this order.
    #[must_use]
    pub fn accepts_taker(&self, taker: Address) -> bool {
        self.taker.is_none_or(|restricted| restricted == taker)
    }

    /// Positivity checks on the amounts.
    pub fn validate_fields(&self) -> Result<()> {
        if self.maker_amount.is_zero() {
            return Err(CrossfillError::malformed("primary makerAmount must be positive"));
        }
        if self.taker_amount.is_zero() {
            return Err(CrossfillError::malformed("primary takerAmount must be positive"));
        }
        if self.maker_asset == self.taker_asset {
            return Err(CrossfillError::malformed(
                "primary maker and taker assets must differ",
            ));
        }
        Ok(())
    }

    /// Maker asset released for a fill of `fill_taker_amount` taker asset.
    pub fn maker_amount_for(&self, fill_taker_amount: U256) -> Result<U256> {
        if fill_taker_amount.is_zero() || fill_taker_amount > self.taker_amount {
            return Err(CrossfillError::malformed(format!(
                "primary fill {fill_taker_amount} outside (0, {}]",
                self.taker_amount
            )));
        }
        let amount = partial_amount(fill_taker_amount, self.taker_amount, self.maker_amount)
            .ok_or_else(|| CrossfillError::malformed("primary fill amount overflows"))?;
        if amount.is_zero() {
            return Err(CrossfillError::malformed(
                "primary fill rounds to zero maker amount",
            ));
        }
        Ok(amount)
    }

    /// Taker fee owed for a fill, proportional to the filled share. An order
    /// without a fee recipient charges nothing.
    pub fn taker_fee_for(&self, fill_taker_amount: U256) -> Result<U256> {
        if self.taker_fee.is_zero() || self.fee_recipient == Address::ZERO {
            return Ok(U256::ZERO);
        }
        partial_amount(fill_taker_amount, self.taker_amount, self.taker_fee)
            .ok_or_else(|| CrossfillError::malformed("primary taker fee overflows"))
    }
}

// ---------------------------------------------------------------------------
// SecondaryVenueOrder
// ---------------------------------------------------------------------------

/// A secondary-venue order. Field names follow the venue's own vocabulary:
/// the maker *gets* `asset_to_get` and *gives* `asset_to_give`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryVenueOrder {
    /// Venue contract the order is bound to (part of the hash).
    pub venue: Address,
    pub asset_to_get: Address,
    pub amount_to_get: U256,
    pub asset_to_give: Address,
    pub amount_to_give: U256,
    /// Last block height at which the order can be filled.
    pub expires_block: u64,
    pub nonce: U256,
    pub maker: Address,
    pub signature: EcSignature,
}

impl SecondaryVenueOrder {
    /// SHA-256 over the tightly packed order fields. The maker is not hashed.
    #[must_use]
    pub fn hash(&self) -> B256 {
        let mut packed = Vec::with_capacity(3 * ADDRESS_BYTES + 4 * WORD_BYTES);
        push_address(&mut packed, self.venue);
        push_address(&mut packed, self.asset_to_get);
        push_word(&mut packed, self.amount_to_get);
        push_address(&mut packed, self.asset_to_give);
        push_word(&mut packed, self.amount_to_give);
        push_word(&mut packed, U256::from(self.expires_block));
        push_word(&mut packed, self.nonce);
        B256::from_slice(&Sha256::digest(&packed))
    }

    /// Expired once the chain has moved past `expires_block`.
    #[must_use]
    pub fn is_expired(&self, reference: &ReferencePoint) -> bool {
        reference.block_height > self.expires_block
    }

    /// Positivity checks on the amounts.
    pub fn validate_fields(&self) -> Result<()> {
        if self.amount_to_get.is_zero() {
            return Err(CrossfillError::malformed("secondary amountGet must be positive"));
        }
        if self.amount_to_give.is_zero() {
            return Err(CrossfillError::malformed("secondary amountGive must be positive"));
        }
        if self.asset_to_get == self.asset_to_give {
            return Err(CrossfillError::malformed(
                "secondary get and give assets must differ",
            ));
        }
        Ok(())
    }

    /// `asset_to_give` released for a fill of `fill_get_amount` `asset_to_get`.
    pub fn give_amount_for(&self, fill_get_amount: U256) -> Result<U256> {
        if fill_get_amount.is_zero() || fill_get_amount > self.amount_to_get {
            return Err(CrossfillError::malformed(format!(
                "secondary fill {fill_get_amount} outside (0, {}]",
                self.amount_to_get
            )));
        }
        let amount = partial_amount(fill_get_amount, self.amount_to_get, self.amount_to_give)
            .ok_or_else(|| CrossfillError::malformed("secondary fill amount overflows"))?;
        if amount.is_zero() {
            return Err(CrossfillError::malformed(
                "secondary fill rounds to zero give amount",
            ));
        }
        Ok(amount)
    }
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// A signed order from either venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Order {
    Primary(SignedOrder),
    Secondary(SecondaryVenueOrder),
}

impl Order {
    #[must_use]
    pub fn venue(&self) -> VenueId {
        match self {
            Self::Primary(_) => VenueId::Primary,
            Self::Secondary(_) => VenueId::Secondary,
        }
    }

    /// The venue-specific canonical hash.
    #[must_use]
    pub fn hash(&self) -> B256 {
        match self {
            Self::Primary(order) => order.hash(),
            Self::Secondary(order) => order.hash(),
        }
    }

    /// Expiry judged in the venue's own unit.
    #[must_use]
    pub fn is_expired(&self, reference: &ReferencePoint) -> bool {
        match self {
            Self::Primary(order) => order.is_expired(reference),
            Self::Secondary(order) => order.is_expired(reference),
        }
    }

    /// Human-readable expiry comparison for error reporting.
    #[must_use]
    pub fn expiry_detail(&self, reference: &ReferencePoint) -> String {
        match self {
            Self::Primary(order) => format!(
                "expiration {}s, now {}s",
                order.expiration_unix_secs,
                reference.unix_secs()
            ),
            Self::Secondary(order) => format!(
                "expires at block {}, chain at block {}",
                order.expires_block, reference.block_height
            ),
        }
    }

    /// The account whose signature authorizes the order.
    #[must_use]
    pub fn signer(&self) -> Address {
        match self {
            Self::Primary(order) => order.maker,
            Self::Secondary(order) => order.maker,
        }
    }

    #[must_use]
    pub fn signature(&self) -> &EcSignature {
        match self {
            Self::Primary(order) => &order.signature,
            Self::Secondary(order) => &order.signature,
        }
    }

    pub fn validate_fields(&self) -> Result<()> {
        match self {
            Self::Primary(order) => order.validate_fields(),
            Self::Secondary(order) => order.validate_fields(),
        }
    }
}

impl From<SignedOrder> for Order {
    fn from(order: SignedOrder) -> Self {
        Self::Primary(order)
    }
}

impl From<SecondaryVenueOrder> for Order {
    fn from(order: SecondaryVenueOrder) -> Self {
        Self::Secondary(order)
    }
}

/// Test helpers. Orders carry an all-zero signature.
#[cfg(any(test, feature = "test-helpers"))]
impl SignedOrder {
    pub fn dummy(
        maker_asset: Address,
        taker_asset: Address,
        maker_amount: U256,
        taker_amount: U256,
    ) -> Self {
        Self {
            exchange: Address::repeat_byte(0xe0),
            maker: Address::repeat_byte(0xa1),
            taker: None,
            maker_asset,
            taker_asset,
            fee_recipient: Address::ZERO,
            maker_amount,
            taker_amount,
            maker_fee: U256::ZERO,
            taker_fee: U256::ZERO,
            expiration_unix_secs: u64::try_from(Utc::now().timestamp()).unwrap_or(0) + 3600,
            salt: U256::from(rand::random::<u64>()),
            signature: EcSignature {
                v: 27,
                r: B256::ZERO,
                s: B256::ZERO,
            },
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl SecondaryVenueOrder {
    pub fn dummy(
        asset_to_get: Address,
        amount_to_get: U256,
        asset_to_give: Address,
        amount_to_give: U256,
        expires_block: u64,
    ) -> Self {
        Self {
            venue: Address::repeat_byte(0xed),
            asset_to_get,
            amount_to_get,
            asset_to_give,
            amount_to_give,
            expires_block,
            nonce: U256::from(rand::random::<u64>()),
            maker: Address::repeat_byte(0xb2),
            signature: EcSignature {
                v: 27,
                r: B256::ZERO,
                s: B256::ZERO,
            },
        }
    }
}
