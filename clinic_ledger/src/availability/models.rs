//! Availability data models.

use crate::accounts::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Availability window ID type
pub type WindowId = Uuid;

/// A doctor's bookable window; at most one exists per doctor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: WindowId,
    pub doctor_id: AccountId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Window submitted by a doctor; both ends are required
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowRequest {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}
