//! Payout settlement: admin approval debits the doctor and closes the request.

use super::models::{Payout, PayoutFilter, PayoutId, PayoutStatus, PendingPayout};
use crate::accounts::{Identity, resolve_doctor};
use crate::admin::AdminGate;
use crate::errors::{ClinicError, ClinicResult};
use crate::ledger::EntryKind;
use crate::store::{ClinicStore, Guard, Mutation, Settlement};
use chrono::Utc;
use std::sync::Arc;

const PAYOUT_NOT_PENDING: &str = "Payout request not found or already processed";

/// Payout manager
#[derive(Clone)]
pub struct PayoutManager {
    store: Arc<dyn ClinicStore>,
    gate: AdminGate,
}

impl PayoutManager {
    /// Create a new payout manager
    ///
    /// # Arguments
    ///
    /// * `store` - Persistent store
    /// * `gate` - Admin gate guarding approval and the pending listing
    pub fn new(store: Arc<dyn ClinicStore>, gate: AdminGate) -> Self {
        Self { store, gate }
    }

    /// Approve a PROCESSING payout
    ///
    /// Marks it PROCESSED and debits the doctor by the payout's credits in one
    /// settlement. The stored amounts are never recomputed.
    ///
    /// # Arguments
    ///
    /// * `identity` - Calling session, must be an admin
    /// * `payout_id` - Payout to approve
    ///
    /// # Returns
    ///
    /// * `ClinicResult<Payout>` - The processed payout
    ///
    /// # Errors
    ///
    /// * `ClinicError::Unauthorized` - Caller is not an admin
    /// * `ClinicError::NotFound` - Payout missing or no longer PROCESSING, or doctor missing
    /// * `ClinicError::InvalidInput` - Payout carries zero or negative credits
    /// * `ClinicError::InsufficientCredits` - Doctor holds fewer credits than requested
    pub async fn approve(
        &self,
        identity: Option<&Identity>,
        payout_id: PayoutId,
    ) -> ClinicResult<Payout> {
        let admin = self.gate.require_admin(identity).await?;

        let payout = self
            .store
            .find_payout(payout_id, Some(PayoutStatus::Processing))
            .await?
            .ok_or_else(|| ClinicError::NotFound(PAYOUT_NOT_PENDING.to_string()))?;

        if payout.credits <= 0 {
            log::error!("Payout {payout_id} carries non-positive credits {}", payout.credits);
            return Err(ClinicError::InvalidInput(
                "Payout credits must be positive".to_string(),
            ));
        }

        let doctor = self
            .store
            .find_account(payout.doctor_id)
            .await?
            .ok_or_else(|| ClinicError::NotFound("Doctor not found".to_string()))?;

        if doctor.credits < payout.credits {
            log::warn!(
                "Payout {payout_id} exceeds balance of doctor {}: {} < {}",
                doctor.id,
                doctor.credits,
                payout.credits
            );
            return Err(ClinicError::InsufficientCredits {
                available: doctor.credits,
                required: payout.credits,
            });
        }

        self.store
            .apply(
                Settlement::new("approve_payout")
                    .guard(Guard::PayoutStatus {
                        payout: payout.id,
                        expected: PayoutStatus::Processing,
                    })
                    .guard(Guard::MinimumBalance {
                        account: doctor.id,
                        required: payout.credits,
                    })
                    .mutate(Mutation::PayoutProcessed {
                        payout: payout.id,
                        processed_at: Utc::now(),
                        processed_by: admin.id,
                    })
                    .entry(doctor.id, -payout.credits, EntryKind::AdminAdjustment),
            )
            .await?;

        log::info!(
            "Payout {payout_id} of {} credits approved by {} for doctor {}",
            payout.credits,
            admin.id,
            doctor.id
        );

        self.store
            .find_payout(payout_id, None)
            .await?
            .ok_or_else(|| ClinicError::NotFound(PAYOUT_NOT_PENDING.to_string()))
    }

    /// Every PROCESSING payout with its doctor's summary, newest first
    pub async fn list_pending(&self, identity: Option<&Identity>) -> ClinicResult<Vec<PendingPayout>> {
        self.gate.require_admin(identity).await?;

        let payouts = self
            .store
            .payouts(PayoutFilter {
                status: Some(PayoutStatus::Processing),
                ..Default::default()
            })
            .await?;

        let mut pending = Vec::with_capacity(payouts.len());
        for payout in payouts {
            let Some(doctor) = self.store.find_account(payout.doctor_id).await? else {
                log::warn!("Payout {} references missing doctor {}", payout.id, payout.doctor_id);
                continue;
            };
            pending.push(PendingPayout {
                doctor: doctor.doctor_summary(),
                payout,
            });
        }
        Ok(pending)
    }

    /// Payouts requested by the calling doctor, newest first
    pub async fn doctor_payouts(&self, identity: Option<&Identity>) -> ClinicResult<Vec<Payout>> {
        let doctor = resolve_doctor(self.store.as_ref(), identity).await?;
        Ok(self
            .store
            .payouts(PayoutFilter {
                doctor_id: Some(doctor.id),
                ..Default::default()
            })
            .await?)
    }
}
