//! Availability window store.

use super::models::{AvailabilityWindow, WindowRequest};
use crate::accounts::{AccountId, Identity, resolve_doctor};
use crate::errors::{ClinicError, ClinicResult};
use crate::store::{ClinicStore, Mutation, Settlement};
use std::sync::Arc;
use uuid::Uuid;

/// Availability manager
#[derive(Clone)]
pub struct AvailabilityManager {
    store: Arc<dyn ClinicStore>,
}

impl AvailabilityManager {
    pub fn new(store: Arc<dyn ClinicStore>) -> Self {
        Self { store }
    }

    /// Replace the calling doctor's window
    ///
    /// Prior windows are deleted and the new one inserted in one settlement.
    ///
    /// # Errors
    ///
    /// * `ClinicError::NotFound` - Caller is not a doctor
    /// * `ClinicError::InvalidInput` - Missing bound, or start not before end
    pub async fn set_window(
        &self,
        identity: Option<&Identity>,
        request: WindowRequest,
    ) -> ClinicResult<AvailabilityWindow> {
        let doctor = resolve_doctor(self.store.as_ref(), identity).await?;

        let (Some(start_time), Some(end_time)) = (request.start_time, request.end_time) else {
            return Err(ClinicError::InvalidInput(
                "Start time and end time are required".to_string(),
            ));
        };
        if start_time >= end_time {
            return Err(ClinicError::InvalidInput(
                "Start time must be before end time".to_string(),
            ));
        }

        let window = AvailabilityWindow {
            id: Uuid::new_v4(),
            doctor_id: doctor.id,
            start_time,
            end_time,
        };

        self.store
            .apply(
                Settlement::new("set_availability")
                    .mutate(Mutation::ReplaceAvailability(window.clone())),
            )
            .await?;

        log::info!(
            "Doctor {} set availability {start_time} to {end_time}",
            doctor.id
        );

        Ok(window)
    }

    /// Windows of the calling doctor
    pub async fn window(&self, identity: Option<&Identity>) -> ClinicResult<Vec<AvailabilityWindow>> {
        let doctor = resolve_doctor(self.store.as_ref(), identity).await?;
        self.window_for(doctor.id).await
    }

    /// Windows of any doctor, for slot materialization
    pub async fn window_for(&self, doctor_id: AccountId) -> ClinicResult<Vec<AvailabilityWindow>> {
        Ok(self.store.windows(doctor_id).await?)
    }
}
