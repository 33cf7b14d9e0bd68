//! System-wide constants for the Crossfill settlement engine.

use alloy_primitives::U256;

/// Amount granted under the unlimited approval policy.
pub const UNLIMITED_ALLOWANCE: U256 = U256::MAX;

/// Decimals assumed for assets with no reporting override.
pub const DEFAULT_ASSET_DECIMALS: u32 = 18;

/// Largest scale a `rust_decimal::Decimal` can carry.
pub const MAX_REPORTING_DECIMALS: u32 = 28;

/// Default log filter directive.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Crossfill";
