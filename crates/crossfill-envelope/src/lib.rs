//! # crossfill-envelope
//!
//! **Validation Envelope**: everything that must hold before a settlement
//! attempt touches the ledger.
//!
//! ## Architecture
//!
//! The envelope sits between order intake and the Finality Plane:
//! 1. **OrderValidator**: signature, expiry, venue binding, cycle shape
//! 2. **FillPlan**: literal amounts and expected balance movements per leg
//! 3. **check_funding**: one pinned ledger view, engine and maker coverage
//! 4. **PreAuthorizationManager**: allowances for every venue spender
//!
//! ## Attempt Flow
//!
//! ```text
//! orders → OrderValidator.validate_pair() → FillPlan::build()
//!        → check_funding(PinnedLedgerView) → PreAuthorizationManager.ensure_all()
//!        → Finality Plane (leg execution)
//! ```
//!
//! A forged order is rejected before a single balance is read.

pub mod ledger_reader;
pub mod plan;
pub mod preauth;
pub mod validator;
pub mod verifier;

pub use ledger_reader::{LedgerReader, PinnedLedgerView, allowance_snapshot, balance_snapshot};
pub use plan::{AllowanceRequirement, FillPlan, FundingSnapshot, VenueSpenders, check_funding};
pub use preauth::{AllowanceOutcome, ApprovalSubmitter, PreAuthorizationManager};
pub use validator::{OrderValidator, ValidatedPair, reference_point};
pub use verifier::{EcdsaVerifier, SignatureVerifier};
