//! Rollback log: the in-flight legs of one attempt and their restore points.
//!
//! Legs are recorded *before* submission, each with a rollback token of the
//! engine's balances. Unwinding walks the log in reverse: legs that never
//! applied are checked to have moved nothing, applied legs are compensated
//! (or, on an atomic platform, marked reverted) and then checked against
//! their token.

use alloy_primitives::Address;
use crossfill_envelope::LedgerReader;
use crossfill_types::{
    ArbitrageLeg, BlockRef, CrossfillError, LegOutcome, LegStatus, Result, RollbackToken, VenueId,
};
use tracing::{debug, error};

use crate::venue::{AtomicScope, VenueGateway};

/// Ordered legs of one settlement attempt. Owned by the orchestrator.
#[derive(Debug, Default)]
pub struct RollbackLog {
    legs: Vec<ArbitrageLeg>,
}

impl RollbackLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pending leg and return its index.
    pub fn record(&mut self, leg: ArbitrageLeg) -> usize {
        self.legs.push(leg);
        self.legs.len() - 1
    }

    #[must_use]
    pub fn legs(&self) -> &[ArbitrageLeg] {
        &self.legs
    }

    pub fn leg_mut(&mut self, index: usize) -> Result<&mut ArbitrageLeg> {
        self.legs
            .get_mut(index)
            .ok_or_else(|| CrossfillError::Internal(format!("no leg at index {index}")))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    #[must_use]
    pub fn outcomes(&self) -> Vec<LegOutcome> {
        self.legs.iter().map(LegOutcome::from).collect()
    }

    /// Undo applied legs in reverse order through their venue gateways.
    pub fn compensate_all(
        &mut self,
        gateways: &[&dyn VenueGateway],
        reader: &dyn LedgerReader,
        taker: Address,
    ) -> Result<()> {
        for leg in self.legs.iter_mut().rev() {
            match leg.status {
                LegStatus::Pending | LegStatus::Failed => {
                    verify_restored(reader, leg.venue, &leg.rollback)?;
                }
                LegStatus::Applied => {
                    let gateway = gateways
                        .iter()
                        .find(|g| g.venue() == leg.venue)
                        .ok_or_else(|| {
                            CrossfillError::Internal(format!("no gateway for {}", leg.venue))
                        })?;
                    gateway.compensate(leg, taker).map_err(|failure| {
                        error!(
                            venue = %leg.venue,
                            order_hash = %leg.order_hash,
                            reason = %failure,
                            "compensation rejected"
                        );
                        CrossfillError::CompensationFailed {
                            venue: leg.venue,
                            reason: failure.reason,
                        }
                    })?;
                    leg.transition(LegStatus::Compensated)?;
                    verify_restored(reader, leg.venue, &leg.rollback)?;
                    debug!(venue = %leg.venue, order_hash = %leg.order_hash, "leg compensated");
                }
                LegStatus::Compensated | LegStatus::Reverted => {}
            }
        }
        Ok(())
    }

    /// Ask the platform to unwind the whole attempt, then check the engine is
    /// back at the first leg's restore point.
    pub fn revert_all(&mut self, scope: &dyn AtomicScope, reader: &dyn LedgerReader) -> Result<()> {
        let venue = self.legs.last().map_or(VenueId::Primary, |l| l.venue);
        scope.revert().map_err(|failure| {
            error!(reason = %failure, "platform reversal rejected");
            CrossfillError::CompensationFailed {
                venue,
                reason: format!("atomic reversal failed: {failure}"),
            }
        })?;
        for leg in self.legs.iter_mut().rev() {
            if leg.status == LegStatus::Applied {
                leg.transition(LegStatus::Reverted)?;
            }
        }
        if let Some(first) = self.legs.first() {
            verify_restored(reader, first.venue, &first.rollback)?;
        }
        debug!(legs = self.legs.len(), "attempt reverted by platform");
        Ok(())
    }
}

/// Every balance in `token` must read back unchanged.
pub fn verify_restored(
    reader: &dyn LedgerReader,
    venue: VenueId,
    token: &RollbackToken,
) -> Result<()> {
    for snap in &token.balances {
        let now = reader.balance_of(snap.asset, token.account, BlockRef::Latest)?;
        if now != snap.amount {
            error!(
                %venue,
                asset = %snap.asset,
                expected = %snap.amount,
                found = %now,
                "balance not restored"
            );
            return Err(CrossfillError::CompensationFailed {
                venue,
                reason: format!(
                    "balance of {} is {now}, restore point was {}",
                    snap.asset, snap.amount
                ),
            });
        }
    }
    Ok(())
}
