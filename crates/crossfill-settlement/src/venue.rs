//! Execution capabilities consumed by the orchestrator.
//!
//! A [`VenueGateway`] submits one fill and can undo an applied one. An
//! [`AtomicScope`] is the platform's transaction boundary, present only when
//! the platform guarantees that a failed attempt unwinds every applied leg.

use std::fmt;

use alloy_primitives::Address;
use crossfill_types::{AppliedFill, ArbitrageLeg, FillInstruction, Order, VenueId};

/// Why a venue or the platform refused an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillFailure {
    pub reason: String,
}

impl FillFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FillFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// One venue's fill submission surface.
pub trait VenueGateway: Send + Sync {
    /// The venue this gateway submits to.
    fn venue(&self) -> VenueId;

    /// Fill `order` as `taker` for exactly the amounts in `instruction`.
    fn submit_fill(
        &self,
        order: &Order,
        instruction: &FillInstruction,
        taker: Address,
    ) -> Result<AppliedFill, FillFailure>;

    /// Issue the inverse transfers of an applied leg.
    fn compensate(&self, leg: &ArbitrageLeg, taker: Address) -> Result<(), FillFailure>;
}

/// Platform transaction boundary around both legs.
pub trait AtomicScope: Send + Sync {
    fn begin(&self) -> Result<(), FillFailure>;

    fn commit(&self) -> Result<(), FillFailure>;

    /// Unwind everything applied since `begin`.
    fn revert(&self) -> Result<(), FillFailure>;
}
