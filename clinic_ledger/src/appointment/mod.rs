//! Appointment module: lifecycle transitions and their credit effects.
//!
//! Appointments are created SCHEDULED by the booking flow, which charges the
//! patient through
//! [`LedgerManager::deduct_credits_for_appointment`](crate::ledger::LedgerManager::deduct_credits_for_appointment).
//! From there an appointment moves once to COMPLETED (doctor, after the end
//! time) or CANCELLED (either counterparty, with the charge reversed).

pub mod manager;
pub mod models;

pub use manager::AppointmentManager;
pub use models::{
    Appointment, AppointmentFilter, AppointmentId, AppointmentStatus, NewAppointment,
};
