//! # crossfill-settlement
//!
//! **Finality Plane**: two-leg execution, compensation, and signed
//! settlement receipts.
//!
//! ## Architecture
//!
//! The Finality Plane receives a [`SettlementRequest`] and:
//! 1. Runs the Validation Envelope (signatures, expiry, funding, allowances)
//! 2. Records a rollback token and submits leg 1 on the primary venue
//! 3. Records a rollback token and submits leg 2 on the secondary venue
//! 4. Verifies every leg against the ledger and measures the net delta
//! 5. Signs a [`SettlementResult`] receipt for the audit trail
//!
//! ## Failure Handling
//!
//! - **Atomic platform**: an [`AtomicScope`] wraps both legs; an abort
//!   reverts the whole scope
//! - **Non-atomic platform**: applied legs are compensated in reverse order
//!   through their [`VenueGateway`]
//!
//! Either way the engine's balances are checked against the rollback tokens
//! before the attempt is reported as aborted.
//!
//! [`SettlementRequest`]: crossfill_types::SettlementRequest
//! [`SettlementResult`]: crossfill_types::SettlementResult

pub mod cancel;
pub mod orchestrator;
pub mod reporter;
pub mod rollback;
pub mod telemetry;
pub mod venue;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testkit;

pub use cancel::CancelHandle;
pub use orchestrator::{Collaborators, SettlementOrchestrator};
pub use reporter::{OutcomeReporter, verify_receipt};
pub use rollback::{RollbackLog, verify_restored};
pub use telemetry::init_tracing;
pub use venue::{AtomicScope, FillFailure, VenueGateway};
