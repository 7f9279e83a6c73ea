//! Appointment data models.

use crate::accounts::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Appointment ID type
pub type AppointmentId = Uuid;

/// Appointment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "SCHEDULED",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
        }
    }

    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        match self {
            AppointmentStatus::Scheduled => false,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled => true,
        }
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(AppointmentStatus::Scheduled),
            "COMPLETED" => Ok(AppointmentStatus::Completed),
            "CANCELLED" => Ok(AppointmentStatus::Cancelled),
            other => Err(format!("unknown appointment status: {other}")),
        }
    }
}

/// Appointment model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub doctor_id: AccountId,
    pub patient_id: AccountId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub patient_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Whether the account is one of the two counterparties
    pub fn involves(&self, account_id: AccountId) -> bool {
        self.doctor_id == account_id || self.patient_id == account_id
    }
}

/// Appointment row created by the booking flow
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub doctor_id: AccountId,
    pub patient_id: AccountId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub patient_description: Option<String>,
}

/// Appointment listing filter, results ordered by start time ascending
#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub doctor_id: Option<AccountId>,
    pub patient_id: Option<AccountId>,
    pub status: Option<AppointmentStatus>,
}

impl AppointmentFilter {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.doctor_id.is_none_or(|id| appointment.doctor_id == id)
            && self.patient_id.is_none_or(|id| appointment.patient_id == id)
            && self.status.is_none_or(|status| appointment.status == status)
    }
}
