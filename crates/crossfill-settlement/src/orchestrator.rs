//! Settlement orchestrator: drives one two-leg attempt to commit or abort.
//!
//! ```text
//! IDLE → VALIDATING → LEG1_EXECUTING → LEG2_EXECUTING → COMMITTED
//!   └────────┴──────────────┴────────────────┴──→ ABORTING → ABORTED
//! ```
//!
//! 1. Validate both orders (signatures, expiry, cycle) and fix the fill plan
//! 2. Check funding on one pinned block; apply the unprofitable pre-check
//! 3. Honour cancellation, then pre-authorize every venue spender
//! 4. Leg 1 on the primary venue, leg 2 on the secondary venue; each leg
//!    records a rollback token first and is verified against the ledger after
//! 5. Measure the net delta of the profit asset and commit
//!
//! Any failure unwinds applied legs in reverse order (compensation, or a
//! platform reversal when configured) and yields
//! [`SettlementResult::Aborted`]. `settle` never returns `Err` and never panics.

use std::sync::Arc;

use alloy_primitives::{Address, I256};
use crossfill_envelope::{
    ApprovalSubmitter, FillPlan, LedgerReader, OrderValidator, PinnedLedgerView,
    PreAuthorizationManager, SignatureVerifier, ValidatedPair, VenueSpenders, balance_snapshot,
    check_funding, reference_point,
};
use crossfill_types::{
    ArbitrageLeg, AttemptId, BlockRef, CrossfillError, EngineConfig, EngineId, FillInstruction,
    LegStatus, Order, Result, RollbackToken, SettlementPhase, SettlementRequest, SettlementResult,
    VenueId, signed_delta,
};
use ed25519_dalek::SigningKey;
use tracing::{debug, error, info_span, warn};

use crate::{
    cancel::CancelHandle,
    reporter::OutcomeReporter,
    rollback::RollbackLog,
    venue::{AtomicScope, VenueGateway},
};

/// External capabilities the orchestrator is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub reader: Arc<dyn LedgerReader>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub approvals: Arc<dyn ApprovalSubmitter>,
    pub primary: Arc<dyn VenueGateway>,
    pub secondary: Arc<dyn VenueGateway>,
    /// Required exactly when `execution.atomic_reversal` is on.
    pub atomic: Option<Arc<dyn AtomicScope>>,
}

/// What a successful run hands to the reporter.
struct Commit {
    net_asset: Address,
    net_delta: I256,
}

/// Runs settlement attempts one at a time.
pub struct SettlementOrchestrator {
    config: EngineConfig,
    reader: Arc<dyn LedgerReader>,
    validator: OrderValidator,
    preauth: PreAuthorizationManager,
    primary: Arc<dyn VenueGateway>,
    secondary: Arc<dyn VenueGateway>,
    atomic: Option<Arc<dyn AtomicScope>>,
    reporter: OutcomeReporter,
    phase: SettlementPhase,
    scope_open: bool,
}

impl SettlementOrchestrator {
    /// Wire an orchestrator. Rejects inconsistent configuration up front.
    pub fn new(
        config: EngineConfig,
        collaborators: Collaborators,
        signing_key: SigningKey,
    ) -> Result<Self> {
        config.validate()?;
        if collaborators.primary.venue() != VenueId::Primary
            || collaborators.secondary.venue() != VenueId::Secondary
        {
            return Err(CrossfillError::Configuration(
                "venue gateways are wired to the wrong legs".into(),
            ));
        }
        match (config.execution.atomic_reversal, collaborators.atomic.is_some()) {
            (true, false) => {
                return Err(CrossfillError::Configuration(
                    "execution.atomic_reversal is on but no atomic scope was supplied".into(),
                ));
            }
            (false, true) => {
                return Err(CrossfillError::Configuration(
                    "an atomic scope was supplied but execution.atomic_reversal is off".into(),
                ));
            }
            _ => {}
        }

        let validator = OrderValidator::new(collaborators.verifier, &config);
        let preauth = PreAuthorizationManager::new(
            Arc::clone(&collaborators.reader),
            collaborators.approvals,
            config.approvals.policy,
        );
        let reporter = OutcomeReporter::new(signing_key, config.reporting.clone());
        Ok(Self {
            config,
            reader: collaborators.reader,
            validator,
            preauth,
            primary: collaborators.primary,
            secondary: collaborators.secondary,
            atomic: collaborators.atomic,
            reporter,
            phase: SettlementPhase::Idle,
            scope_open: false,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Phase of the most recent attempt (terminal once it finished).
    #[must_use]
    pub fn phase(&self) -> SettlementPhase {
        self.phase
    }

    #[must_use]
    pub fn engine_id(&self) -> EngineId {
        self.reporter.engine_id()
    }

    /// Run only the validation step. No balance is read and nothing changes.
    pub fn validate(&self, request: &SettlementRequest) -> Result<ValidatedPair> {
        let reference = reference_point(self.reader.as_ref())?;
        self.validator.validate_pair(
            &request.primary,
            &request.secondary,
            request.operator,
            &reference,
        )
    }

    /// Settle without a cancellation handle.
    pub fn settle(&mut self, request: &SettlementRequest) -> SettlementResult {
        self.settle_with_cancel(request, &CancelHandle::new())
    }

    /// Settle one attempt. `cancel` is consulted once, just before leg 1.
    pub fn settle_with_cancel(
        &mut self,
        request: &SettlementRequest,
        cancel: &CancelHandle,
    ) -> SettlementResult {
        let attempt = AttemptId::new();
        let span = info_span!("settle", %attempt, operator = %request.operator);
        let _entered = span.enter();

        self.phase = SettlementPhase::Idle;
        self.scope_open = false;
        let mut log = RollbackLog::new();

        match self.run(request, cancel, &mut log) {
            Ok(commit) => {
                self.reporter
                    .committed(attempt, commit.net_asset, commit.net_delta, log.outcomes())
            }
            Err(err) => {
                let failed_in = self.phase;
                let err = self.abort(&mut log, request.operator, err);
                self.reporter.aborted(attempt, &err, failed_in, log.outcomes())
            }
        }
    }

    fn run(
        &mut self,
        request: &SettlementRequest,
        cancel: &CancelHandle,
        log: &mut RollbackLog,
    ) -> Result<Commit> {
        let operator = request.operator;
        self.transition(SettlementPhase::Validating)?;
        let reference = reference_point(self.reader.as_ref())?;
        let pair = self.validator.validate_pair(
            &request.primary,
            &request.secondary,
            operator,
            &reference,
        )?;
        let plan = FillPlan::build(
            &request.primary,
            &request.secondary,
            &pair,
            self.config.primary.fee_asset,
            request.primary_fill,
            request.secondary_fill,
        )?;
        let view = PinnedLedgerView::at(self.reader.as_ref(), reference.block_height);
        check_funding(
            &view,
            &plan,
            &request.primary,
            operator,
            self.config.primary.transfer_proxy,
        )?;

        let net_asset = self
            .config
            .settlement
            .profit_asset
            .unwrap_or(request.primary.taker_asset);
        let abort_if_unprofitable = request
            .abort_if_unprofitable
            .unwrap_or(self.config.settlement.abort_if_unprofitable);
        let expected = plan.expected_net(net_asset)?;
        if abort_if_unprofitable && expected <= I256::ZERO {
            return Err(CrossfillError::Unprofitable {
                asset: net_asset,
                net: format!("{expected} (expected)"),
            });
        }

        if cancel.is_cancelled() {
            return Err(CrossfillError::Cancelled);
        }

        let spenders = VenueSpenders {
            primary: self.config.primary.transfer_proxy,
            secondary: self.config.secondary.contract,
        };
        self.preauth
            .ensure_all(operator, &plan.required_allowances(spenders))?;

        let mut assets = plan.touched_assets();
        if !assets.contains(&net_asset) {
            assets.push(net_asset);
        }

        self.transition(SettlementPhase::Leg1Executing)?;
        if let Some(scope) = &self.atomic {
            scope
                .begin()
                .map_err(|failure| CrossfillError::SettlementReverted {
                    venue: VenueId::Primary,
                    reason: format!("atomic scope not opened: {failure}"),
                })?;
            self.scope_open = true;
        }
        let primary = Order::Primary(request.primary.clone());
        self.execute_leg(log, &primary, plan.leg1, &assets, operator)?;

        self.transition(SettlementPhase::Leg2Executing)?;
        let secondary = Order::Secondary(request.secondary.clone());
        self.execute_leg(log, &secondary, plan.leg2, &assets, operator)?;

        let before = log
            .legs()
            .first()
            .and_then(|leg| leg.rollback.balance_of(net_asset))
            .ok_or_else(|| CrossfillError::Internal("no pre-leg balance of profit asset".into()))?;
        let after = self.reader.balance_of(net_asset, operator, BlockRef::Latest)?;
        let net_delta = signed_delta(before, after)?;
        if abort_if_unprofitable && net_delta <= I256::ZERO {
            return Err(CrossfillError::Unprofitable {
                asset: net_asset,
                net: net_delta.to_string(),
            });
        }

        if self.scope_open {
            if let Some(scope) = &self.atomic {
                scope
                    .commit()
                    .map_err(|failure| CrossfillError::SettlementReverted {
                        venue: VenueId::Secondary,
                        reason: format!("atomic commit rejected: {failure}"),
                    })?;
            }
            self.scope_open = false;
        }
        self.transition(SettlementPhase::Committed)?;
        Ok(Commit {
            net_asset,
            net_delta,
        })
    }

    /// Record, submit, and verify one leg. A leg the rollback token cannot
    /// fund fails before it reaches the venue.
    fn execute_leg(
        &self,
        log: &mut RollbackLog,
        order: &Order,
        instruction: FillInstruction,
        assets: &[Address],
        operator: Address,
    ) -> Result<()> {
        let venue = instruction.venue;
        let balances = assets
            .iter()
            .map(|asset| {
                balance_snapshot(self.reader.as_ref(), *asset, operator, BlockRef::Latest)
            })
            .collect::<Result<Vec<_>>>()?;
        let rollback = RollbackToken {
            account: operator,
            balances,
        };
        let index = log.record(ArbitrageLeg::new(instruction, rollback));
        let leg = log.leg_mut(index)?;

        let expected = match leg.rollback.expected_after(&leg.instruction) {
            Ok(expected) => expected,
            Err(err) => {
                leg.transition(LegStatus::Failed)?;
                warn!(%venue, order_hash = %leg.order_hash, error = %err, "leg not submitted");
                return Err(err);
            }
        };

        debug!(
            %venue,
            order_hash = %leg.order_hash,
            fill = %leg.instruction.fill_amount,
            "submitting leg"
        );
        match self.gateway(venue).submit_fill(order, &leg.instruction, operator) {
            Ok(fill) => leg.mark_applied(fill)?,
            Err(failure) => {
                leg.transition(LegStatus::Failed)?;
                warn!(
                    %venue,
                    order_hash = %leg.order_hash,
                    reason = %failure,
                    "leg rejected by venue"
                );
                return Err(CrossfillError::SettlementReverted {
                    venue,
                    reason: failure.reason,
                });
            }
        }

        for (asset, expected) in expected {
            let found = self.reader.balance_of(asset, operator, BlockRef::Latest)?;
            if found != expected {
                warn!(%venue, %asset, %expected, %found, "post-leg balance mismatch");
                return Err(CrossfillError::InconsistentState {
                    venue,
                    reason: format!("balance of {asset} is {found}, expected {expected}"),
                });
            }
        }
        debug!(%venue, order_hash = %leg.order_hash, "leg applied and verified");
        Ok(())
    }

    /// Unwind whatever applied and settle on the error to report.
    fn abort(
        &mut self,
        log: &mut RollbackLog,
        operator: Address,
        err: CrossfillError,
    ) -> CrossfillError {
        if let Err(e) = self.transition(SettlementPhase::Aborting) {
            error!(error = %e, "abort from unexpected phase");
        }

        let unwound = match (&self.atomic, self.scope_open) {
            (Some(scope), true) => log.revert_all(scope.as_ref(), self.reader.as_ref()),
            _ if log.is_empty() => Ok(()),
            _ => log.compensate_all(
                &[self.primary.as_ref(), self.secondary.as_ref()],
                self.reader.as_ref(),
                operator,
            ),
        };
        self.scope_open = false;

        if let Err(e) = self.transition(SettlementPhase::Aborted) {
            error!(error = %e, "forcing ABORTED");
            self.phase = SettlementPhase::Aborted;
        }

        match unwound {
            Ok(()) => err,
            Err(CrossfillError::CompensationFailed { venue, reason }) => {
                CrossfillError::CompensationFailed {
                    venue,
                    reason: format!("{reason}; while aborting after: {err}"),
                }
            }
            Err(other) => {
                error!(error = %other, original = %err, "unwind failed");
                other
            }
        }
    }

    fn transition(&mut self, next: SettlementPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(CrossfillError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        debug!(from = %self.phase, to = %next, "phase");
        self.phase = next;
        Ok(())
    }

    fn gateway(&self, venue: VenueId) -> &dyn VenueGateway {
        match venue {
            VenueId::Primary => self.primary.as_ref(),
            VenueId::Secondary => self.secondary.as_ref(),
        }
    }
}
