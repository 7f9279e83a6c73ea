//! Doctor verification state machine and onboarding role selection.

use crate::accounts::{
    Account, AccountId, DoctorFilter, DoctorOrder, DoctorProfile, Identity, Role,
    VerificationStatus, resolve_actor,
};
use crate::admin::AdminGate;
use crate::errors::{ClinicError, ClinicResult};
use crate::store::{ClinicStore, Guard, Mutation, Settlement};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DESCRIPTION_MIN_CHARS: usize = 20;
const DESCRIPTION_MAX_CHARS: usize = 1000;

/// Admin decision on a doctor, as submitted
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DoctorStatusUpdate {
    pub doctor_id: Option<AccountId>,
    /// `"VERIFIED"` or `"REJECTED"`
    pub status: String,
    /// Send the doctor back to PENDING regardless of `status`
    pub suspend: bool,
}

/// Outcome of a resubmission request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResubmitOutcome {
    /// Caller was not a rejected doctor; nothing changed
    Unchanged,
    /// Profile cleared; the caller restarts onboarding
    RedirectToOnboarding,
}

/// Role picked during onboarding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleSelection {
    Patient,
    Doctor(DoctorProfile),
}

/// Verification manager
#[derive(Clone)]
pub struct VerificationManager {
    store: Arc<dyn ClinicStore>,
    gate: AdminGate,
}

impl VerificationManager {
    pub fn new(store: Arc<dyn ClinicStore>, gate: AdminGate) -> Self {
        Self { store, gate }
    }

    /// Set a doctor's verification status
    ///
    /// # Returns
    ///
    /// * `ClinicResult<VerificationStatus>` - The status written
    ///
    /// # Errors
    ///
    /// * `ClinicError::Unauthorized` - Caller is not an admin
    /// * `ClinicError::InvalidInput` - Missing doctor id, or status not VERIFIED/REJECTED
    /// * `ClinicError::NotFound` - No doctor with that id
    pub async fn update_doctor_status(
        &self,
        identity: Option<&Identity>,
        update: DoctorStatusUpdate,
    ) -> ClinicResult<VerificationStatus> {
        let admin = self.gate.require_admin(identity).await?;

        let target = match update.status.parse::<VerificationStatus>() {
            Ok(status @ (VerificationStatus::Verified | VerificationStatus::Rejected)) => status,
            Ok(VerificationStatus::Pending) | Err(_) => {
                return Err(ClinicError::InvalidInput("Invalid input".to_string()));
            }
        };
        let doctor_id = update
            .doctor_id
            .ok_or_else(|| ClinicError::InvalidInput("Invalid input".to_string()))?;

        let doctor = self
            .store
            .find_account(doctor_id)
            .await?
            .filter(Account::is_doctor)
            .ok_or_else(|| ClinicError::NotFound("Doctor not found".to_string()))?;

        let status = if update.suspend {
            VerificationStatus::Pending
        } else {
            target
        };

        self.store
            .apply(
                Settlement::new("update_doctor_status")
                    .guard(Guard::AccountRole {
                        account: doctor.id,
                        role: Role::Doctor,
                    })
                    .mutate(Mutation::VerificationStatus {
                        account: doctor.id,
                        status,
                    }),
            )
            .await?;

        log::info!("Doctor {} set to {status} by admin {}", doctor.id, admin.id);

        Ok(status)
    }

    /// Let a rejected doctor start over
    ///
    /// Resets the account to UNASSIGNED with verification PENDING and the
    /// doctor profile cleared. Anyone else gets `Unchanged`.
    pub async fn resubmit(&self, identity: Option<&Identity>) -> ClinicResult<ResubmitOutcome> {
        let account = resolve_actor(self.store.as_ref(), identity).await?;

        match (account.role, account.verification_status) {
            (Role::Doctor, Some(VerificationStatus::Rejected)) => {}
            _ => return Ok(ResubmitOutcome::Unchanged),
        }

        self.store
            .apply(
                Settlement::new("resubmit_verification")
                    .guard(Guard::AccountRole {
                        account: account.id,
                        role: Role::Doctor,
                    })
                    .guard(Guard::AccountVerification {
                        account: account.id,
                        status: VerificationStatus::Rejected,
                    })
                    .mutate(Mutation::ResetDoctorProfile {
                        account: account.id,
                    }),
            )
            .await?;

        log::info!("Rejected doctor {} returned to onboarding", account.id);

        Ok(ResubmitOutcome::RedirectToOnboarding)
    }

    /// Pick a role for an UNASSIGNED account
    ///
    /// Doctors start PENDING and need a complete profile.
    ///
    /// # Errors
    ///
    /// * `ClinicError::InvalidInput` - Incomplete doctor profile
    /// * `ClinicError::IllegalTransition` - Account already has a role
    pub async fn select_role(
        &self,
        identity: Option<&Identity>,
        selection: RoleSelection,
    ) -> ClinicResult<Account> {
        let account = resolve_actor(self.store.as_ref(), identity).await?;

        if account.role != Role::Unassigned {
            return Err(ClinicError::IllegalTransition(format!(
                "Account already has role {}",
                account.role
            )));
        }

        let mutation = match selection {
            RoleSelection::Patient => Mutation::AssignRole {
                account: account.id,
                role: Role::Patient,
                profile: None,
                verification: None,
            },
            RoleSelection::Doctor(profile) => Mutation::AssignRole {
                account: account.id,
                role: Role::Doctor,
                profile: Some(validate_profile(profile)?),
                verification: Some(VerificationStatus::Pending),
            },
        };

        self.store
            .apply(
                Settlement::new("select_role")
                    .guard(Guard::AccountRole {
                        account: account.id,
                        role: Role::Unassigned,
                    })
                    .mutate(mutation),
            )
            .await?;

        let account = self
            .store
            .find_account(account.id)
            .await?
            .ok_or_else(|| ClinicError::NotFound("User not found".to_string()))?;

        log::info!("Account {} selected role {}", account.id, account.role);

        Ok(account)
    }

    /// Doctors awaiting review, newest first
    pub async fn pending_doctors(&self, identity: Option<&Identity>) -> ClinicResult<Vec<Account>> {
        self.gate.require_admin(identity).await?;
        Ok(self
            .store
            .list_doctors(DoctorFilter::by_status(
                VerificationStatus::Pending,
                DoctorOrder::NewestFirst,
            ))
            .await?)
    }

    /// Verified doctors, oldest first
    pub async fn verified_doctors(&self, identity: Option<&Identity>) -> ClinicResult<Vec<Account>> {
        self.gate.require_admin(identity).await?;
        Ok(self
            .store
            .list_doctors(DoctorFilter::by_status(
                VerificationStatus::Verified,
                DoctorOrder::OldestFirst,
            ))
            .await?)
    }

    /// Public listing: verified doctors of one specialty, by name
    pub async fn doctors_by_specialty(&self, specialty: &str) -> ClinicResult<Vec<Account>> {
        Ok(self
            .store
            .list_doctors(DoctorFilter {
                verification_status: Some(VerificationStatus::Verified),
                specialty: Some(specialty.to_string()),
                order: DoctorOrder::Name,
            })
            .await?)
    }
}

fn validate_profile(profile: DoctorProfile) -> ClinicResult<DoctorProfile> {
    let specialty = profile.specialty.trim();
    if specialty.is_empty() {
        return Err(ClinicError::InvalidInput("Specialty is required".to_string()));
    }

    if profile.experience_years < 1 {
        return Err(ClinicError::InvalidInput(
            "Experience must be at least 1 year".to_string(),
        ));
    }

    let credential_url = profile.credential_url.trim();
    if !(credential_url.starts_with("https://") || credential_url.starts_with("http://")) {
        return Err(ClinicError::InvalidInput(
            "Please enter a valid credential URL".to_string(),
        ));
    }

    let description = profile.description.trim();
    let chars = description.chars().count();
    if chars < DESCRIPTION_MIN_CHARS {
        return Err(ClinicError::InvalidInput(format!(
            "Description must be at least {DESCRIPTION_MIN_CHARS} characters"
        )));
    }
    if chars > DESCRIPTION_MAX_CHARS {
        return Err(ClinicError::InvalidInput(format!(
            "Description cannot exceed {DESCRIPTION_MAX_CHARS} characters"
        )));
    }

    Ok(DoctorProfile {
        specialty: specialty.to_string(),
        experience_years: profile.experience_years,
        credential_url: credential_url.to_string(),
        description: description.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> DoctorProfile {
        DoctorProfile {
            specialty: " Neurology ".to_string(),
            experience_years: 4,
            credential_url: "https://credentials.example.com/neuro.pdf".to_string(),
            description: "Neurologist with a focus on migraine care".to_string(),
        }
    }

    #[test]
    fn test_validate_profile_trims() {
        let validated = validate_profile(profile()).unwrap();
        assert_eq!(validated.specialty, "Neurology");
    }

    #[test]
    fn test_validate_profile_rejects_incomplete() {
        let mut no_experience = profile();
        no_experience.experience_years = 0;
        assert!(validate_profile(no_experience).is_err());

        let mut short = profile();
        short.description = "Too short".to_string();
        assert!(validate_profile(short).is_err());

        let mut long = profile();
        long.description = "x".repeat(DESCRIPTION_MAX_CHARS + 1);
        assert!(validate_profile(long).is_err());

        let mut bad_url = profile();
        bad_url.credential_url = "not a url".to_string();
        assert!(validate_profile(bad_url).is_err());

        let mut blank = profile();
        blank.specialty = "   ".to_string();
        assert!(validate_profile(blank).is_err());
    }
}
