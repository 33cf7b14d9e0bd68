//! # crossfill-types
//!
//! Shared types, errors, and configuration for the **Crossfill** two-venue
//! settlement engine.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`AttemptId`], [`EngineId`], [`VenueId`]
//! - **Order model**: [`SignedOrder`], [`SecondaryVenueOrder`], [`Order`],
//!   [`EcSignature`], [`ReferencePoint`]
//! - **Wire layouts**: [`RawOrder`] and [`normalize`]
//! - **Ledger snapshots**: [`BlockRef`], [`TokenBalanceSnapshot`],
//!   [`AllowanceSnapshot`], [`BalanceMovement`]
//! - **Legs**: [`ArbitrageLeg`], [`LegStatus`], [`FillInstruction`],
//!   [`RollbackToken`], [`AppliedFill`]
//! - **Settlement lifecycle**: [`SettlementPhase`], [`SettlementRequest`],
//!   [`SettlementResult`], [`AbortReason`]
//! - **Receipts**: [`SettlementReceipt`]
//! - **Configuration**: [`EngineConfig`] and its sections
//! - **Errors**: [`CrossfillError`] with `XF_ERR_` prefix codes
//! - **Constants**: system-wide defaults

pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod leg;
pub mod order;
pub mod raw;
pub mod receipt;
pub mod settlement;

// Re-export all primary types at crate root for ergonomic imports:
//   use crossfill_types::{Order, SignedOrder, SettlementResult, ...};

pub use config::*;
pub use error::*;
pub use ids::*;
pub use ledger::*;
pub use leg::*;
pub use order::*;
pub use raw::*;
pub use receipt::*;
pub use settlement::*;

// Ledger primitives used across every crate's public API.
pub use alloy_primitives::{Address, B256, I256, U256};

// Constants are accessed via `crossfill_types::constants::FOO`
// (not re-exported to avoid name collisions).
