//! Configuration types for a Crossfill engine.
//!
//! Loaded from JSON. Only the two venue sections are required; every other
//! section falls back to its `Default`.

use std::{collections::BTreeMap, path::Path};

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::{CrossfillError, Result, constants};

/// Top-level configuration passed to the orchestrator at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub primary: PrimaryVenueConfig,
    pub secondary: SecondaryVenueConfig,
    #[serde(default)]
    pub signatures: SignatureConfig,
    #[serde(default)]
    pub approvals: ApprovalConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub settlement: SettlementPolicyConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Config with defaults for everything but the venue addresses.
    #[must_use]
    pub fn new(primary: PrimaryVenueConfig, secondary: SecondaryVenueConfig) -> Self {
        Self {
            primary,
            secondary,
            signatures: SignatureConfig::default(),
            approvals: ApprovalConfig::default(),
            execution: ExecutionConfig::default(),
            settlement: SettlementPolicyConfig::default(),
            reporting: ReportingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CrossfillError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CrossfillError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Reject zero or colliding venue addresses and out-of-range decimals.
    pub fn validate(&self) -> Result<()> {
        let nonzero = |name: &str, addr: Address| {
            if addr == Address::ZERO {
                Err(CrossfillError::Configuration(format!("{name} must not be the zero address")))
            } else {
                Ok(())
            }
        };
        nonzero("primary.exchange", self.primary.exchange)?;
        nonzero("primary.transfer_proxy", self.primary.transfer_proxy)?;
        nonzero("primary.fee_asset", self.primary.fee_asset)?;
        nonzero("secondary.contract", self.secondary.contract)?;

        if self.primary.exchange == self.secondary.contract {
            return Err(CrossfillError::Configuration(
                "primary and secondary venues share a contract address".into(),
            ));
        }
        if self.settlement.profit_asset == Some(Address::ZERO) {
            return Err(CrossfillError::Configuration(
                "settlement.profit_asset must not be the zero address".into(),
            ));
        }
        let too_wide = std::iter::once(self.reporting.default_decimals)
            .chain(self.reporting.decimals.values().copied())
            .find(|d| *d > constants::MAX_REPORTING_DECIMALS);
        if let Some(d) = too_wide {
            return Err(CrossfillError::Configuration(format!(
                "reporting decimals {d} exceed {}",
                constants::MAX_REPORTING_DECIMALS
            )));
        }
        if self.logging.level.trim().is_empty() {
            return Err(CrossfillError::Configuration("logging.level is empty".into()));
        }
        Ok(())
    }
}

/// Primary (signed-order) venue addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryVenueConfig {
    /// Exchange contract; part of every primary order hash.
    pub exchange: Address,
    /// Contract that pulls taker and maker assets; the allowance spender.
    pub transfer_proxy: Address,
    /// Asset in which maker and taker fees are denominated.
    pub fee_asset: Address,
}

/// Secondary (order-book) venue addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryVenueConfig {
    /// Venue contract; part of every secondary order hash and the allowance spender.
    pub contract: Address,
}

/// Digest that order signatures are computed over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestScheme {
    /// The order hash itself.
    Raw,
    /// EIP-191 personal-message digest of the order hash.
    #[default]
    PersonalMessage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureConfig {
    #[serde(default)]
    pub scheme: DigestScheme,
}

/// How much the pre-authorization manager approves when short.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalPolicy {
    /// Exactly the amount the attempt needs.
    Exact,
    /// The maximum representable allowance.
    #[default]
    Unlimited,
}

impl ApprovalPolicy {
    #[must_use]
    pub fn grant_amount(self, needed: U256) -> U256 {
        match self {
            Self::Exact => needed,
            Self::Unlimited => constants::UNLIMITED_ALLOWANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default)]
    pub policy: ApprovalPolicy,
}

/// What the execution platform guarantees about failed multi-leg submissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// The platform unwinds every applied leg when a later one fails; the
    /// orchestrator only verifies the reversal instead of compensating.
    #[serde(default)]
    pub atomic_reversal: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementPolicyConfig {
    /// Asset the net delta is measured in. Defaults to the primary order's taker asset.
    #[serde(default)]
    pub profit_asset: Option<Address>,
    /// Abort (and compensate) attempts whose net delta is not positive.
    #[serde(default)]
    pub abort_if_unprofitable: bool,
}

/// Human-readable rendering of base-unit amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Per-asset decimals overrides.
    #[serde(default)]
    pub decimals: BTreeMap<Address, u32>,
    #[serde(default = "default_decimals")]
    pub default_decimals: u32,
}

impl ReportingConfig {
    #[must_use]
    pub fn decimals_of(&self, asset: Address) -> u32 {
        self.decimals
            .get(&asset)
            .copied()
            .unwrap_or(self.default_decimals)
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            decimals: BTreeMap::new(),
            default_decimals: constants::DEFAULT_ASSET_DECIMALS,
        }
    }
}

fn default_decimals() -> u32 {
    constants::DEFAULT_ASSET_DECIMALS
}

/// Log output settings consumed by the telemetry initializer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `info` or `crossfill_settlement=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    constants::DEFAULT_LOG_LEVEL.to_string()
}
