//! Appointment lifecycle: cancellation with credit reversal, completion, notes.

use super::models::{Appointment, AppointmentFilter, AppointmentId, AppointmentStatus};
use crate::accounts::{AccountId, Identity, resolve_actor, resolve_doctor};
use crate::errors::{ClinicError, ClinicResult};
use crate::ledger::{APPOINTMENT_CREDIT_COST, EntryKind};
use crate::store::{ClinicStore, Guard, Mutation, Settlement};
use chrono::Utc;
use std::sync::Arc;

/// Appointment manager
#[derive(Clone)]
pub struct AppointmentManager {
    store: Arc<dyn ClinicStore>,
}

impl AppointmentManager {
    pub fn new(store: Arc<dyn ClinicStore>) -> Self {
        Self { store }
    }

    /// Cancel an appointment and reverse the booking transfer
    ///
    /// Either counterparty may cancel. The patient is refunded and the doctor
    /// debited in the same settlement; the doctor side is not checked for
    /// sufficiency and may go negative.
    ///
    /// # Arguments
    ///
    /// * `appointment_id` - Appointment to cancel
    /// * `identity` - Calling session
    ///
    /// # Errors
    ///
    /// * `ClinicError::Unauthorized` - No session, or caller is not a counterparty
    /// * `ClinicError::NotFound` - Caller account or appointment missing
    /// * `ClinicError::IllegalTransition` - Appointment already completed or cancelled
    pub async fn cancel(
        &self,
        appointment_id: AppointmentId,
        identity: Option<&Identity>,
    ) -> ClinicResult<Appointment> {
        let actor = resolve_actor(self.store.as_ref(), identity).await?;
        let appointment = self.load(appointment_id).await?;

        if !appointment.involves(actor.id) {
            log::warn!(
                "Account {} tried to cancel appointment {appointment_id} it is not part of",
                actor.id
            );
            return Err(ClinicError::Unauthorized(
                "You are not authorized to cancel this appointment".to_string(),
            ));
        }

        if appointment.status.is_terminal() {
            return Err(ClinicError::IllegalTransition(format!(
                "Appointment is already {}",
                appointment.status
            )));
        }

        self.store
            .apply(
                Settlement::new("cancel_appointment")
                    .guard(Guard::AppointmentStatus {
                        appointment: appointment.id,
                        expected: AppointmentStatus::Scheduled,
                    })
                    .mutate(Mutation::AppointmentStatus {
                        appointment: appointment.id,
                        status: AppointmentStatus::Cancelled,
                    })
                    .entry(
                        appointment.patient_id,
                        APPOINTMENT_CREDIT_COST,
                        EntryKind::AdminAdjustment,
                    )
                    .entry(
                        appointment.doctor_id,
                        -APPOINTMENT_CREDIT_COST,
                        EntryKind::AdminAdjustment,
                    ),
            )
            .await?;

        log::info!(
            "Appointment {appointment_id} cancelled by {}; refunded {APPOINTMENT_CREDIT_COST} credits to {}",
            actor.id,
            appointment.patient_id
        );

        self.load(appointment_id).await
    }

    /// Mark an appointment completed once its end time has passed
    ///
    /// # Errors
    ///
    /// * `ClinicError::NotFound` - Caller is not a doctor, or not this appointment's doctor
    /// * `ClinicError::IllegalTransition` - Not SCHEDULED, or end time not reached
    pub async fn mark_completed(
        &self,
        appointment_id: AppointmentId,
        identity: Option<&Identity>,
    ) -> ClinicResult<Appointment> {
        let doctor = resolve_doctor(self.store.as_ref(), identity).await?;
        let appointment = scoped_to_doctor(self.load(appointment_id).await?, doctor.id)?;

        if appointment.status != AppointmentStatus::Scheduled {
            return Err(ClinicError::IllegalTransition(
                "Only scheduled appointments can be marked as completed".to_string(),
            ));
        }

        if Utc::now() < appointment.end_time {
            return Err(ClinicError::IllegalTransition(
                "Cannot mark appointment as completed before the scheduled end time".to_string(),
            ));
        }

        self.store
            .apply(
                Settlement::new("complete_appointment")
                    .guard(Guard::AppointmentStatus {
                        appointment: appointment.id,
                        expected: AppointmentStatus::Scheduled,
                    })
                    .mutate(Mutation::AppointmentStatus {
                        appointment: appointment.id,
                        status: AppointmentStatus::Completed,
                    }),
            )
            .await?;

        log::info!("Appointment {appointment_id} completed by doctor {}", doctor.id);

        self.load(appointment_id).await
    }

    /// Replace the doctor's notes on an appointment
    pub async fn set_notes(
        &self,
        appointment_id: AppointmentId,
        identity: Option<&Identity>,
        notes: &str,
    ) -> ClinicResult<Appointment> {
        let doctor = resolve_doctor(self.store.as_ref(), identity).await?;
        let appointment = scoped_to_doctor(self.load(appointment_id).await?, doctor.id)?;

        let notes = notes.trim();
        if notes.is_empty() {
            return Err(ClinicError::InvalidInput("Notes cannot be empty".to_string()));
        }

        self.store
            .apply(
                Settlement::new("appointment_notes").mutate(Mutation::AppointmentNotes {
                    appointment: appointment.id,
                    notes: notes.to_string(),
                }),
            )
            .await?;

        self.load(appointment_id).await
    }

    /// Upcoming (SCHEDULED) appointments of the calling doctor, earliest first
    pub async fn doctor_appointments(
        &self,
        identity: Option<&Identity>,
    ) -> ClinicResult<Vec<Appointment>> {
        let doctor = resolve_doctor(self.store.as_ref(), identity).await?;
        Ok(self
            .store
            .appointments(AppointmentFilter {
                doctor_id: Some(doctor.id),
                status: Some(AppointmentStatus::Scheduled),
                ..Default::default()
            })
            .await?)
    }

    /// Every appointment of the calling patient, earliest first
    pub async fn patient_appointments(
        &self,
        identity: Option<&Identity>,
    ) -> ClinicResult<Vec<Appointment>> {
        let patient = resolve_actor(self.store.as_ref(), identity).await?;
        if !patient.is_patient() {
            return Err(ClinicError::NotFound("Patient not found".to_string()));
        }
        Ok(self
            .store
            .appointments(AppointmentFilter {
                patient_id: Some(patient.id),
                ..Default::default()
            })
            .await?)
    }

    async fn load(&self, appointment_id: AppointmentId) -> ClinicResult<Appointment> {
        self.store
            .find_appointment(appointment_id)
            .await?
            .ok_or_else(|| ClinicError::NotFound("Appointment not found".to_string()))
    }
}

/// Lookups scoped to a doctor treat someone else's appointment as missing
fn scoped_to_doctor(appointment: Appointment, doctor_id: AccountId) -> ClinicResult<Appointment> {
    if appointment.doctor_id == doctor_id {
        Ok(appointment)
    } else {
        Err(ClinicError::NotFound("Appointment not found".to_string()))
    }
}
