//! Admin gate: the authorization check every privileged operation makes first.

use crate::accounts::{Account, Identity, Role};
use crate::errors::{ClinicError, ClinicResult};
use crate::store::ClinicStore;
use std::sync::Arc;

/// Admin gate
#[derive(Clone)]
pub struct AdminGate {
    store: Arc<dyn ClinicStore>,
}

impl AdminGate {
    pub fn new(store: Arc<dyn ClinicStore>) -> Self {
        Self { store }
    }

    /// Whether the identity belongs to an ADMIN account.
    ///
    /// Never fails: no session, unknown account and store errors all read as
    /// `false`.
    pub async fn is_admin(&self, identity: Option<&Identity>) -> bool {
        self.lookup(identity).await.is_some()
    }

    /// Resolve the admin account behind the identity
    ///
    /// # Errors
    ///
    /// * `ClinicError::Unauthorized` - The gate says no
    pub async fn require_admin(&self, identity: Option<&Identity>) -> ClinicResult<Account> {
        self.lookup(identity).await.ok_or_else(|| {
            log::warn!(
                "Admin access denied for {}",
                identity.map_or("anonymous caller", Identity::subject)
            );
            ClinicError::Unauthorized("Unauthorized".to_string())
        })
    }

    async fn lookup(&self, identity: Option<&Identity>) -> Option<Account> {
        let identity = identity?;
        match self.store.find_account_by_external_id(identity.subject()).await {
            Ok(Some(account)) => match account.role {
                Role::Admin => Some(account),
                Role::Unassigned | Role::Patient | Role::Doctor => None,
            },
            Ok(None) => None,
            Err(e) => {
                log::error!("Admin check failed for {}: {e}", identity.subject());
                None
            }
        }
    }
}
