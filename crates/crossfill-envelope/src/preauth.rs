//! Pre-authorization manager: makes sure venue spenders may pull the
//! engine's assets before any leg runs.
//!
//! `ensure_allowance` is idempotent: a sufficient allowance is left alone.
//! Otherwise an approval is submitted under the configured
//! [`ApprovalPolicy`] and the allowance is re-read to confirm it landed.
//! Granted allowances are standing approvals and outlive the attempt.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use crossfill_types::{ApprovalPolicy, BlockRef, CrossfillError, Result};
use tracing::{debug, info, warn};

use crate::{ledger_reader::LedgerReader, plan::AllowanceRequirement};

/// Capability that submits an ERC-20 style approval on the owner's behalf.
pub trait ApprovalSubmitter: Send + Sync {
    fn approve(
        &self,
        asset: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> std::result::Result<(), String>;
}

/// What `ensure_allowance` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowanceOutcome {
    /// The existing allowance already covered the requirement.
    AlreadyAllowed,
    /// An approval was submitted and confirmed.
    Granted { amount: U256 },
}

/// Ensures allowances for an owner account ahead of execution.
pub struct PreAuthorizationManager {
    reader: Arc<dyn LedgerReader>,
    submitter: Arc<dyn ApprovalSubmitter>,
    policy: ApprovalPolicy,
}

impl PreAuthorizationManager {
    #[must_use]
    pub fn new(
        reader: Arc<dyn LedgerReader>,
        submitter: Arc<dyn ApprovalSubmitter>,
        policy: ApprovalPolicy,
    ) -> Self {
        Self {
            reader,
            submitter,
            policy,
        }
    }

    /// Make sure `spender` may move at least `min_amount` of `owner`'s `asset`.
    pub fn ensure_allowance(
        &self,
        owner: Address,
        asset: Address,
        spender: Address,
        min_amount: U256,
    ) -> Result<AllowanceOutcome> {
        let current = self.reader.allowance(asset, owner, spender, BlockRef::Latest)?;
        if current >= min_amount {
            debug!(%asset, %spender, %current, "allowance already sufficient");
            return Ok(AllowanceOutcome::AlreadyAllowed);
        }

        let amount = self.policy.grant_amount(min_amount);
        self.submitter
            .approve(asset, owner, spender, amount)
            .map_err(|reason| {
                warn!(%asset, %spender, %reason, "approval rejected");
                CrossfillError::PreAuthorizationFailed {
                    asset,
                    spender,
                    reason,
                }
            })?;

        let confirmed = self.reader.allowance(asset, owner, spender, BlockRef::Latest)?;
        if confirmed < min_amount {
            return Err(CrossfillError::PreAuthorizationFailed {
                asset,
                spender,
                reason: format!("allowance {confirmed} still below {min_amount} after approval"),
            });
        }
        info!(%asset, %spender, %amount, "allowance granted");
        Ok(AllowanceOutcome::Granted { amount })
    }

    /// Run [`Self::ensure_allowance`] for every requirement, stopping at the
    /// first failure.
    pub fn ensure_all(
        &self,
        owner: Address,
        requirements: &[AllowanceRequirement],
    ) -> Result<Vec<AllowanceOutcome>> {
        requirements
            .iter()
            .map(|r| self.ensure_allowance(owner, r.asset, r.spender, r.amount))
            .collect()
    }
}
