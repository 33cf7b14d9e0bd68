//! Raw wire layouts and normalization into the canonical order structs.
//!
//! Each venue publishes orders in its own JSON shape. Every field is
//! optional on the wire; [`normalize`] is the single place that decides
//! what is required, parses amounts (decimal or `0x` hex strings), and
//! rejects non-positive values with [`CrossfillError::MalformedOrder`].

use std::str::FromStr;

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::{CrossfillError, EcSignature, Order, Result, SecondaryVenueOrder, SignedOrder};

/// A `{v, r, s}` signature as it appears on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSignature {
    pub v: Option<u8>,
    pub r: Option<String>,
    pub s: Option<String>,
}

/// Primary-venue order in its published camelCase layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPrimaryOrder {
    pub exchange_contract_address: Option<String>,
    pub maker: Option<String>,
    pub taker: Option<String>,
    pub maker_token_address: Option<String>,
    pub taker_token_address: Option<String>,
    pub fee_recipient: Option<String>,
    pub maker_token_amount: Option<String>,
    pub taker_token_amount: Option<String>,
    pub maker_fee: Option<String>,
    pub taker_fee: Option<String>,
    pub expiration_unix_timestamp_sec: Option<String>,
    pub salt: Option<String>,
    pub ec_signature: Option<RawSignature>,
}

/// Secondary-venue order in its published layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSecondaryOrder {
    pub contract_addr: Option<String>,
    pub token_get: Option<String>,
    pub amount_get: Option<String>,
    pub token_give: Option<String>,
    pub amount_give: Option<String>,
    pub expires: Option<String>,
    pub nonce: Option<String>,
    pub user: Option<String>,
    pub v: Option<u8>,
    pub r: Option<String>,
    pub s: Option<String>,
}

/// An order as received from either venue, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawOrder {
    Primary(RawPrimaryOrder),
    Secondary(RawSecondaryOrder),
}

impl RawOrder {
    /// Parse a raw order from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Normalize a raw order into its canonical venue struct.
pub fn normalize(raw: &RawOrder) -> Result<Order> {
    let order = match raw {
        RawOrder::Primary(raw) => Order::Primary(normalize_primary(raw)?),
        RawOrder::Secondary(raw) => Order::Secondary(normalize_secondary(raw)?),
    };
    order.validate_fields()?;
    Ok(order)
}

fn normalize_primary(raw: &RawPrimaryOrder) -> Result<SignedOrder> {
    let signature = raw
        .ec_signature
        .as_ref()
        .ok_or_else(|| missing("ecSignature"))?;
    Ok(SignedOrder {
        exchange: address("exchangeContractAddress", raw.exchange_contract_address.as_deref())?,
        maker: address("maker", raw.maker.as_deref())?,
        taker: optional_taker(raw.taker.as_deref())?,
        maker_asset: address("makerTokenAddress", raw.maker_token_address.as_deref())?,
        taker_asset: address("takerTokenAddress", raw.taker_token_address.as_deref())?,
        fee_recipient: raw
            .fee_recipient
            .as_deref()
            .map_or(Ok(Address::ZERO), |v| parse_address("feeRecipient", v))?,
        maker_amount: positive("makerTokenAmount", raw.maker_token_amount.as_deref())?,
        taker_amount: positive("takerTokenAmount", raw.taker_token_amount.as_deref())?,
        maker_fee: fee("makerFee", raw.maker_fee.as_deref())?,
        taker_fee: fee("takerFee", raw.taker_fee.as_deref())?,
        expiration_unix_secs: small(
            "expirationUnixTimestampSec",
            raw.expiration_unix_timestamp_sec.as_deref(),
        )?,
        salt: amount("salt", raw.salt.as_deref())?,
        signature: ec_signature(signature.v, signature.r.as_deref(), signature.s.as_deref())?,
    })
}

fn normalize_secondary(raw: &RawSecondaryOrder) -> Result<SecondaryVenueOrder> {
    Ok(SecondaryVenueOrder {
        venue: address("contractAddr", raw.contract_addr.as_deref())?,
        asset_to_get: address("tokenGet", raw.token_get.as_deref())?,
        amount_to_get: positive("amountGet", raw.amount_get.as_deref())?,
        asset_to_give: address("tokenGive", raw.token_give.as_deref())?,
        amount_to_give: positive("amountGive", raw.amount_give.as_deref())?,
        expires_block: small("expires", raw.expires.as_deref())?,
        nonce: amount("nonce", raw.nonce.as_deref())?,
        maker: address("user", raw.user.as_deref())?,
        signature: ec_signature(raw.v, raw.r.as_deref(), raw.s.as_deref())?,
    })
}

// ---------------------------------------------------------------------------
// Field parsers
// ---------------------------------------------------------------------------

fn missing(field: &str) -> CrossfillError {
    CrossfillError::malformed(format!("missing required field `{field}`"))
}

fn parse_address(field: &str, value: &str) -> Result<Address> {
    Address::from_str(value.trim())
        .map_err(|e| CrossfillError::malformed(format!("`{field}` is not an address: {e}")))
}

fn address(field: &str, value: Option<&str>) -> Result<Address> {
    parse_address(field, value.ok_or_else(|| missing(field))?)
}

/// The null address and an absent taker both mean "open order".
fn optional_taker(value: Option<&str>) -> Result<Option<Address>> {
    match value {
        None => Ok(None),
        Some(v) => {
            let taker = parse_address("taker", v)?;
            Ok((taker != Address::ZERO).then_some(taker))
        }
    }
}

fn amount(field: &str, value: Option<&str>) -> Result<U256> {
    let value = value.ok_or_else(|| missing(field))?;
    U256::from_str(value.trim())
        .map_err(|e| CrossfillError::malformed(format!("`{field}` is not an integer: {e}")))
}

fn positive(field: &str, value: Option<&str>) -> Result<U256> {
    let parsed = amount(field, value)?;
    if parsed.is_zero() {
        return Err(CrossfillError::malformed(format!("`{field}` must be positive")));
    }
    Ok(parsed)
}

/// Fees default to zero when absent.
fn fee(field: &str, value: Option<&str>) -> Result<U256> {
    value.map_or(Ok(U256::ZERO), |v| amount(field, Some(v)))
}

fn small(field: &str, value: Option<&str>) -> Result<u64> {
    let parsed = positive(field, value)?;
    u64::try_from(parsed)
        .map_err(|_| CrossfillError::malformed(format!("`{field}` does not fit in 64 bits")))
}

fn word(field: &str, value: Option<&str>) -> Result<B256> {
    let value = value.ok_or_else(|| missing(field))?;
    B256::from_str(value.trim())
        .map_err(|e| CrossfillError::malformed(format!("`{field}` is not a 32-byte word: {e}")))
}

fn ec_signature(v: Option<u8>, r: Option<&str>, s: Option<&str>) -> Result<EcSignature> {
    Ok(EcSignature {
        v: v.ok_or_else(|| missing("v"))?,
        r: word("r", r)?,
        s: word("s", s)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const R: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";
    const S: &str = "0x2222222222222222222222222222222222222222222222222222222222222222";

    fn raw_primary() -> RawPrimaryOrder {
        RawPrimaryOrder {
            exchange_contract_address: Some("0x00000000000000000000000000000000000000e0".into()),
            maker: Some("0x00000000000000000000000000000000000000a1".into()),
            taker: Some("0x0000000000000000000000000000000000000000".into()),
            maker_token_address: Some("0x0000000000000000000000000000000000000001".into()),
            taker_token_address: Some("0x0000000000000000000000000000000000000002".into()),
            fee_recipient: None,
            maker_token_amount: Some("1000000000000000000".into()),
            taker_token_amount: Some("0xde0b6b3a7640000".into()),
            maker_fee: None,
            taker_fee: Some("0".into()),
            expiration_unix_timestamp_sec: Some("4102444800".into()),
            salt: Some("42".into()),
            ec_signature: Some(RawSignature {
                v: Some(27),
                r: Some(R.into()),
                s: Some(S.into()),
            }),
        }
    }

    fn raw_secondary() -> RawSecondaryOrder {
        RawSecondaryOrder {
            contract_addr: Some("0x00000000000000000000000000000000000000ed".into()),
            token_get: Some("0x0000000000000000000000000000000000000001".into()),
            amount_get: Some("1".into()),
            token_give: Some("0x0000000000000000000000000000000000000002".into()),
            amount_give: Some("2".into()),
            expires: Some("110".into()),
            nonce: Some("42".into()),
            user: Some("0x00000000000000000000000000000000000000b2".into()),
            v: Some(28),
            r: Some(R.into()),
            s: Some(S.into()),
        }
    }

    #[test]
    fn normalizes_primary_with_hex_and_decimal_amounts() {
        let order = normalize(&RawOrder::Primary(raw_primary())).unwrap();
        let Order::Primary(order) = order else {
            panic!("expected primary order");
        };
        assert_eq!(order.maker_amount, order.taker_amount);
        assert_eq!(order.taker, None, "zero taker means open order");
        assert_eq!(order.fee_recipient, Address::ZERO);
        assert_eq!(order.maker_fee, U256::ZERO);
        assert_eq!(order.expiration_unix_secs, 4_102_444_800);
        assert_eq!(order.signature.v, 27);
    }

    #[test]
    fn normalizes_secondary() {
        let order = normalize(&RawOrder::Secondary(raw_secondary())).unwrap();
        let Order::Secondary(order) = order else {
            panic!("expected secondary order");
        };
        assert_eq!(order.amount_to_get, U256::from(1u64));
        assert_eq!(order.amount_to_give, U256::from(2u64));
        assert_eq!(order.expires_block, 110);
        assert_eq!(order.nonce, U256::from(42u64));
    }

    #[test]
    fn missing_field_is_malformed() {
        let mut raw = raw_primary();
        raw.maker = None;
        let err = normalize(&RawOrder::Primary(raw)).unwrap_err();
        assert!(
            matches!(&err, CrossfillError::MalformedOrder { reason } if reason.contains("maker")),
            "Got: {err}"
        );
    }

    #[test]
    fn zero_amount_is_malformed() {
        let mut raw = raw_secondary();
        raw.amount_give = Some("0".into());
        let err = normalize(&RawOrder::Secondary(raw)).unwrap_err();
        assert!(matches!(err, CrossfillError::MalformedOrder { .. }));
    }

    #[test]
    fn garbage_amount_is_malformed() {
        let mut raw = raw_primary();
        raw.taker_token_amount = Some("one ether".into());
        let err = normalize(&RawOrder::Primary(raw)).unwrap_err();
        assert!(matches!(err, CrossfillError::MalformedOrder { .. }));
    }

    #[test]
    fn missing_signature_is_malformed() {
        let mut raw = raw_secondary();
        raw.r = None;
        assert!(normalize(&RawOrder::Secondary(raw)).is_err());

        let mut raw = raw_primary();
        raw.ec_signature = None;
        assert!(normalize(&RawOrder::Primary(raw)).is_err());
    }

    #[test]
    fn parses_tagged_json() {
        let json = r#"{
            "kind": "secondary",
            "contractAddr": "0x00000000000000000000000000000000000000ed",
            "tokenGet": "0x0000000000000000000000000000000000000001",
            "amountGet": "1",
            "tokenGive": "0x0000000000000000000000000000000000000002",
            "amountGive": "2",
            "expires": "110",
            "nonce": "42",
            "user": "0x00000000000000000000000000000000000000b2",
            "v": 28,
            "r": "0x1111111111111111111111111111111111111111111111111111111111111111",
            "s": "0x2222222222222222222222222222222222222222222222222222222222222222"
        }"#;
        let raw = RawOrder::from_json(json).unwrap();
        assert_eq!(raw, RawOrder::Secondary(raw_secondary()));
        assert!(normalize(&raw).is_ok());
    }
}
