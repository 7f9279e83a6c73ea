//! Engine error types.

use crate::appointment::AppointmentStatus;
use crate::store::{Rejection, StoreError};
use thiserror::Error;

/// Failure classification surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    InvalidInput,
    InvariantViolation,
    IllegalTransition,
    Internal,
}

/// Engine errors
#[derive(Debug, Error)]
pub enum ClinicError {
    /// Failed identity, ownership or admin-gate check
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Missing account, appointment, payout or doctor
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed or missing required input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Not enough credits for a deduction or payout approval
    #[error("Insufficient credits: available {available}, required {required}")]
    InsufficientCredits { available: i64, required: i64 },

    /// Status not eligible for the requested transition
    #[error("Illegal transition: {0}")]
    IllegalTransition(String),

    /// Store failure (connection, transaction conflict, corrupt row)
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl ClinicError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClinicError::Unauthorized(_) => ErrorKind::Unauthorized,
            ClinicError::NotFound(_) => ErrorKind::NotFound,
            ClinicError::InvalidInput(_) => ErrorKind::InvalidInput,
            ClinicError::InsufficientCredits { .. } => ErrorKind::InvariantViolation,
            ClinicError::IllegalTransition(_) => ErrorKind::IllegalTransition,
            ClinicError::Store(_) => ErrorKind::Internal,
        }
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Store errors are sanitized so SQL details never reach the caller.
    pub fn client_message(&self) -> String {
        match self {
            ClinicError::Store(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<StoreError> for ClinicError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Rejected(rejection) => rejection.into(),
            StoreError::MissingRow { entity, id } => {
                ClinicError::NotFound(format!("{entity} {id} not found"))
            }
            other => ClinicError::Store(other),
        }
    }
}

impl From<Rejection> for ClinicError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::InsufficientBalance {
                available,
                required,
                ..
            } => ClinicError::InsufficientCredits {
                available,
                required,
            },
            Rejection::MissingAccount(_) => ClinicError::NotFound("User not found".to_string()),
            Rejection::AppointmentStatus { actual: None, .. } => {
                ClinicError::NotFound("Appointment not found".to_string())
            }
            Rejection::AppointmentStatus {
                actual: Some(status),
                ..
            } => ClinicError::IllegalTransition(match status {
                AppointmentStatus::Scheduled => "Appointment is already scheduled".to_string(),
                AppointmentStatus::Completed | AppointmentStatus::Cancelled => {
                    format!("Appointment is already {status}")
                }
            }),
            Rejection::PayoutStatus { .. } => {
                ClinicError::NotFound("Payout request not found or already processed".to_string())
            }
            Rejection::AccountRole { .. } | Rejection::AccountVerification { .. } => {
                ClinicError::IllegalTransition("Account changed concurrently".to_string())
            }
            Rejection::AlreadyAllocated { plan_id, .. } => ClinicError::IllegalTransition(format!(
                "Credits for plan {plan_id} already allocated this period"
            )),
        }
    }
}

/// Result type for engine operations
pub type ClinicResult<T> = Result<T, ClinicError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_insufficient_balance_is_invariant_violation() {
        let err: ClinicError = StoreError::Rejected(Rejection::InsufficientBalance {
            account: Uuid::new_v4(),
            available: 1,
            required: 2,
        })
        .into();

        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert!(err.to_string().contains("available 1, required 2"));
    }

    #[test]
    fn test_payout_status_rejection_reads_as_not_found() {
        let err: ClinicError = Rejection::PayoutStatus {
            payout: Uuid::new_v4(),
            actual: None,
        }
        .into();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("already processed"));
    }

    #[test]
    fn test_terminal_appointment_rejection_is_illegal_transition() {
        let err: ClinicError = Rejection::AppointmentStatus {
            appointment: Uuid::new_v4(),
            actual: Some(AppointmentStatus::Cancelled),
        }
        .into();

        assert_eq!(err.kind(), ErrorKind::IllegalTransition);
        assert!(err.to_string().contains("CANCELLED"));
    }

    #[test]
    fn test_client_message_hides_store_details() {
        let err = ClinicError::Store(StoreError::InvalidColumn {
            column: "role",
            value: "SUPERUSER".to_string(),
        });
        assert_eq!(err.client_message(), "Internal server error");

        let err = ClinicError::NotFound("Doctor not found".to_string());
        assert_eq!(err.client_message(), "Not found: Doctor not found");
    }
}
