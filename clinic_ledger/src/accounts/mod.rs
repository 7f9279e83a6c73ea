//! Accounts: one role-tagged entity for patients, doctors and admins.
//!
//! Role-conditioned behavior is always an explicit `match` over [`Role`];
//! there is no per-role type. Identity resolution itself happens outside this
//! crate; callers hand in the already-verified [`Identity`] of the session (or
//! `None` when there is no session) and the engine maps it onto an
//! [`Account`] through its `external_id`.

pub mod models;

pub use models::{
    Account, AccountId, DoctorFilter, DoctorOrder, DoctorProfile, DoctorSummary, Identity,
    NewAccount, Role, VerificationStatus,
};

use crate::errors::{ClinicError, ClinicResult};
use crate::store::ClinicStore;

/// Resolve the calling account for an actor-scoped operation.
///
/// No session is `Unauthorized`; a session without an account is `NotFound`.
pub(crate) async fn resolve_actor(
    store: &dyn ClinicStore,
    identity: Option<&Identity>,
) -> ClinicResult<Account> {
    let identity = identity.ok_or_else(|| ClinicError::Unauthorized("Unauthorized".to_string()))?;

    store
        .find_account_by_external_id(identity.subject())
        .await?
        .ok_or_else(|| ClinicError::NotFound("User not found".to_string()))
}

/// Resolve the caller and require the doctor role.
pub(crate) async fn resolve_doctor(
    store: &dyn ClinicStore,
    identity: Option<&Identity>,
) -> ClinicResult<Account> {
    let account = resolve_actor(store, identity).await?;
    match account.role {
        Role::Doctor => Ok(account),
        Role::Unassigned | Role::Patient | Role::Admin => {
            Err(ClinicError::NotFound("Doctor not found".to_string()))
        }
    }
}
