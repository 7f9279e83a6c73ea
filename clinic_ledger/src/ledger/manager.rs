//! Ledger manager: every credit movement routes through here.

use super::models::{
    APPOINTMENT_CREDIT_COST, BalanceAudit, BillingPeriod, EntryKind, LedgerEntry, NewLedgerEntry,
    Plan, already_allocated,
};
use crate::accounts::{Account, AccountId, Role};
use crate::config::CreditPolicy;
use crate::errors::{ClinicError, ClinicResult};
use crate::store::{ClinicStore, Guard, Mutation, Rejection, Settlement, StoreError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// External subscription entitlements (the billing provider)
#[async_trait]
pub trait EntitlementSource: Send + Sync {
    /// Whether the account currently holds `plan`
    async fn has_plan(&self, account: &Account, plan: Plan) -> anyhow::Result<bool>;
}

/// Entitlements held in process, keyed by account
#[derive(Debug, Default)]
pub struct StaticEntitlements {
    plans: RwLock<HashMap<AccountId, HashSet<Plan>>>,
}

impl StaticEntitlements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, account_id: AccountId, plan: Plan) {
        if let Ok(mut plans) = self.plans.write() {
            plans.entry(account_id).or_default().insert(plan);
        }
    }

    pub fn revoke(&self, account_id: AccountId, plan: Plan) {
        if let Ok(mut plans) = self.plans.write() {
            if let Some(held) = plans.get_mut(&account_id) {
                held.remove(&plan);
            }
        }
    }
}

#[async_trait]
impl EntitlementSource for StaticEntitlements {
    async fn has_plan(&self, account: &Account, plan: Plan) -> anyhow::Result<bool> {
        let plans = self
            .plans
            .read()
            .map_err(|_| anyhow::anyhow!("entitlement table poisoned"))?;
        Ok(plans
            .get(&account.id)
            .is_some_and(|held| held.contains(&plan)))
    }
}

/// Resolve the highest tier the account holds
async fn resolve_plan(
    entitlements: &dyn EntitlementSource,
    account: &Account,
) -> anyhow::Result<Option<Plan>> {
    for plan in Plan::BY_PRIORITY {
        if entitlements.has_plan(account, plan).await? {
            return Ok(Some(plan));
        }
    }
    Ok(None)
}

/// Ledger manager
#[derive(Clone)]
pub struct LedgerManager {
    store: Arc<dyn ClinicStore>,
    policy: CreditPolicy,
}

impl LedgerManager {
    /// Create a new ledger manager
    ///
    /// # Arguments
    ///
    /// * `store` - Persistent store
    /// * `policy` - Monthly credit grant per tier
    pub fn new(store: Arc<dyn ClinicStore>, policy: CreditPolicy) -> Self {
        Self { store, policy }
    }

    /// Append an entry and adjust the owner's cached balance in one step
    ///
    /// The ledger does not clamp: a debit is applied even if it drives the
    /// balance negative. Callers check sufficiency first.
    ///
    /// # Returns
    ///
    /// * `ClinicResult<i64>` - Owner's balance after the entry
    ///
    /// # Errors
    ///
    /// * `ClinicError::NotFound` - Owner does not exist
    pub async fn apply_entry(
        &self,
        owner_id: AccountId,
        amount: i64,
        kind: EntryKind,
        plan_id: Option<String>,
    ) -> ClinicResult<i64> {
        let entry = NewLedgerEntry::new(owner_id, amount, kind).with_plan(plan_id);
        let receipt = self
            .store
            .apply(Settlement::new("apply_entry").mutate(Mutation::Entry(entry)))
            .await?;

        log::info!("Applied {kind} entry of {amount} to account {owner_id}");

        receipt
            .balance(owner_id)
            .ok_or_else(|| ClinicError::NotFound(format!("Account {owner_id} not found")))
    }

    /// Grant this month's subscription credits, at most once per period and plan
    ///
    /// Never fails: when anything goes wrong the account is handed back as it
    /// was passed in.
    pub async fn allocate_monthly_credits(
        &self,
        account: Account,
        entitlements: &dyn EntitlementSource,
    ) -> Account {
        match self.try_allocate(&account, entitlements).await {
            Ok(Some(updated)) => updated,
            Ok(None) => account,
            Err(e) => {
                log::error!("Error allocating credits for account {}: {e:#}", account.id);
                account
            }
        }
    }

    async fn try_allocate(
        &self,
        account: &Account,
        entitlements: &dyn EntitlementSource,
    ) -> anyhow::Result<Option<Account>> {
        if account.role != Role::Patient {
            return Ok(None);
        }

        let Some(plan) = resolve_plan(entitlements, account).await? else {
            return Ok(None);
        };

        let period = BillingPeriod::current();
        let latest = self.store.latest_entry(account.id).await?;
        if already_allocated(latest.as_ref(), plan.id(), period) {
            log::debug!("Account {} already received {plan} credits for {period}", account.id);
            return Ok(None);
        }

        let credits = self.policy.credits_for(plan);
        let settlement = Settlement::new("allocate_monthly_credits")
            .guard(Guard::NotYetAllocated {
                account: account.id,
                plan_id: plan.id().to_string(),
                period,
            })
            .mutate(Mutation::Entry(
                NewLedgerEntry::new(account.id, credits, EntryKind::CreditPurchase)
                    .with_plan(Some(plan.id().to_string())),
            ));

        let receipt = match self.store.apply(settlement).await {
            Ok(receipt) => receipt,
            // A concurrent call won the race for this period
            Err(StoreError::Rejected(Rejection::AlreadyAllocated { .. })) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        log::info!(
            "Allocated {credits} {plan} credits to account {} for {period}",
            account.id
        );

        let mut updated = account.clone();
        updated.credits = receipt.balance(account.id).unwrap_or(account.credits + credits);
        Ok(Some(updated))
    }

    /// Charge a booking: move the appointment cost from patient to doctor
    ///
    /// # Returns
    ///
    /// * `ClinicResult<Account>` - The patient with the updated balance
    ///
    /// # Errors
    ///
    /// * `ClinicError::NotFound` - Patient or doctor missing
    /// * `ClinicError::InsufficientCredits` - Patient holds less than the cost; nothing written
    pub async fn deduct_credits_for_appointment(
        &self,
        patient_id: AccountId,
        doctor_id: AccountId,
    ) -> ClinicResult<Account> {
        let mut patient = self
            .store
            .find_account(patient_id)
            .await?
            .ok_or_else(|| ClinicError::NotFound("User not found".to_string()))?;
        let doctor = self
            .store
            .find_account(doctor_id)
            .await?
            .ok_or_else(|| ClinicError::NotFound("Doctor not found".to_string()))?;

        if patient.credits < APPOINTMENT_CREDIT_COST {
            log::warn!(
                "Account {patient_id} cannot book: {} credits, {APPOINTMENT_CREDIT_COST} required",
                patient.credits
            );
            return Err(ClinicError::InsufficientCredits {
                available: patient.credits,
                required: APPOINTMENT_CREDIT_COST,
            });
        }

        let receipt = self
            .store
            .apply(
                Settlement::new("deduct_credits_for_appointment")
                    .guard(Guard::MinimumBalance {
                        account: patient.id,
                        required: APPOINTMENT_CREDIT_COST,
                    })
                    .entry(patient.id, -APPOINTMENT_CREDIT_COST, EntryKind::AppointmentDeduction)
                    .entry(doctor.id, APPOINTMENT_CREDIT_COST, EntryKind::AppointmentDeduction),
            )
            .await?;

        log::info!(
            "Transferred {APPOINTMENT_CREDIT_COST} credits from patient {patient_id} to doctor {doctor_id}"
        );

        patient.credits = receipt
            .balance(patient.id)
            .unwrap_or(patient.credits - APPOINTMENT_CREDIT_COST);
        Ok(patient)
    }

    /// Entries of the account, newest first
    pub async fn entries(&self, owner_id: AccountId, limit: i64) -> ClinicResult<Vec<LedgerEntry>> {
        Ok(self.store.entries(owner_id, limit).await?)
    }

    /// Cached balance of the account
    pub async fn balance(&self, owner_id: AccountId) -> ClinicResult<i64> {
        self.store
            .find_account(owner_id)
            .await?
            .map(|account| account.credits)
            .ok_or_else(|| ClinicError::NotFound(format!("Account {owner_id} not found")))
    }

    /// Recompute the balance from the log and compare it with the cache
    pub async fn audit(&self, owner_id: AccountId) -> ClinicResult<BalanceAudit> {
        let cached = self.balance(owner_id).await?;
        let recomputed = self.store.entry_sum(owner_id).await?;

        let audit = BalanceAudit {
            account_id: owner_id,
            cached,
            recomputed,
        };
        if !audit.is_consistent() {
            log::error!(
                "Balance drift on account {owner_id}: cached {cached}, ledger {recomputed}"
            );
        }
        Ok(audit)
    }
}
