//! In-process store.
//!
//! All tables sit behind one async mutex. A settlement checks its guards
//! against the live tables, stages its mutations on a copy and swaps the copy
//! in only when every mutation succeeded.

use super::{
    ClinicStore, Guard, Mutation, Rejection, Settlement, SettlementReceipt, StoreError,
    StoreResult,
};
use crate::accounts::{Account, AccountId, DoctorFilter, DoctorOrder, NewAccount, Role, VerificationStatus};
use crate::appointment::{Appointment, AppointmentFilter, AppointmentId, AppointmentStatus, NewAppointment};
use crate::availability::AvailabilityWindow;
use crate::ledger::{LedgerEntry, already_allocated};
use crate::payout::{NewPayout, Payout, PayoutFilter, PayoutId, PayoutStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    /// Append order is preserved; ties on `created_at` resolve to the later entry
    entries: Vec<LedgerEntry>,
    appointments: HashMap<AppointmentId, Appointment>,
    windows: Vec<AvailabilityWindow>,
    payouts: HashMap<PayoutId, Payout>,
}

impl Tables {
    fn latest_entry(&self, owner_id: AccountId) -> Option<&LedgerEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.owner_id == owner_id)
            .max_by_key(|entry| entry.created_at)
    }

    fn check(&self, guard: &Guard) -> Result<(), Rejection> {
        match guard {
            Guard::MinimumBalance { account, required } => {
                let available = self
                    .accounts
                    .get(account)
                    .ok_or(Rejection::MissingAccount(*account))?
                    .credits;
                if available < *required {
                    return Err(Rejection::InsufficientBalance {
                        account: *account,
                        available,
                        required: *required,
                    });
                }
            }
            Guard::AppointmentStatus {
                appointment,
                expected,
            } => {
                let actual = self.appointments.get(appointment).map(|a| a.status);
                if actual != Some(*expected) {
                    return Err(Rejection::AppointmentStatus {
                        appointment: *appointment,
                        actual,
                    });
                }
            }
            Guard::PayoutStatus { payout, expected } => {
                let actual = self.payouts.get(payout).map(|p| p.status);
                if actual != Some(*expected) {
                    return Err(Rejection::PayoutStatus {
                        payout: *payout,
                        actual,
                    });
                }
            }
            Guard::AccountRole { account, role } => {
                let actual = self.accounts.get(account).map(|a| a.role);
                if actual != Some(*role) {
                    return Err(Rejection::AccountRole {
                        account: *account,
                        actual,
                    });
                }
            }
            Guard::AccountVerification { account, status } => {
                let actual = self
                    .accounts
                    .get(account)
                    .and_then(|a| a.verification_status);
                if actual != Some(*status) {
                    return Err(Rejection::AccountVerification {
                        account: *account,
                        actual,
                    });
                }
            }
            Guard::NotYetAllocated {
                account,
                plan_id,
                period,
            } => {
                if !self.accounts.contains_key(account) {
                    return Err(Rejection::MissingAccount(*account));
                }
                if already_allocated(self.latest_entry(*account), plan_id, *period) {
                    return Err(Rejection::AlreadyAllocated {
                        account: *account,
                        plan_id: plan_id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn account_mut(&mut self, id: AccountId) -> StoreResult<&mut Account> {
        self.accounts
            .get_mut(&id)
            .ok_or(StoreError::MissingRow { entity: "Account", id })
    }

    fn apply(&mut self, mutation: Mutation, receipt: &mut SettlementReceipt) -> StoreResult<()> {
        let now = Utc::now();
        match mutation {
            Mutation::Entry(entry) => {
                let account = self.account_mut(entry.owner_id)?;
                account.credits += entry.amount;
                account.updated_at = now;
                receipt.balances.insert(account.id, account.credits);
                self.entries.push(entry.into_entry());
            }
            Mutation::AppointmentStatus {
                appointment,
                status,
            } => {
                let row = self.appointments.get_mut(&appointment).ok_or(StoreError::MissingRow {
                    entity: "Appointment",
                    id: appointment,
                })?;
                row.status = status;
                row.updated_at = now;
            }
            Mutation::AppointmentNotes { appointment, notes } => {
                let row = self.appointments.get_mut(&appointment).ok_or(StoreError::MissingRow {
                    entity: "Appointment",
                    id: appointment,
                })?;
                row.notes = Some(notes);
                row.updated_at = now;
            }
            Mutation::PayoutProcessed {
                payout,
                processed_at,
                processed_by,
            } => {
                let row = self.payouts.get_mut(&payout).ok_or(StoreError::MissingRow {
                    entity: "Payout",
                    id: payout,
                })?;
                row.status = PayoutStatus::Processed;
                row.processed_at = Some(processed_at);
                row.processed_by = Some(processed_by);
            }
            Mutation::VerificationStatus { account, status } => {
                let row = self.account_mut(account)?;
                row.verification_status = Some(status);
                row.updated_at = now;
            }
            Mutation::AssignRole {
                account,
                role,
                profile,
                verification,
            } => {
                let row = self.account_mut(account)?;
                row.role = role;
                row.verification_status = verification;
                if let Some(profile) = profile {
                    row.specialty = Some(profile.specialty);
                    row.experience_years = profile.experience_years;
                    row.credential_url = Some(profile.credential_url);
                    row.description = Some(profile.description);
                }
                row.updated_at = now;
            }
            Mutation::ResetDoctorProfile { account } => {
                let row = self.account_mut(account)?;
                row.role = Role::Unassigned;
                row.verification_status = Some(VerificationStatus::Pending);
                row.specialty = None;
                row.experience_years = 0;
                row.credential_url = None;
                row.description = None;
                row.updated_at = now;
            }
            Mutation::ReplaceAvailability(window) => {
                if !self.accounts.contains_key(&window.doctor_id) {
                    return Err(StoreError::MissingRow {
                        entity: "Account",
                        id: window.doctor_id,
                    });
                }
                self.windows.retain(|w| w.doctor_id != window.doctor_id);
                self.windows.push(window);
            }
        }
        Ok(())
    }
}

/// In-memory implementation of [`ClinicStore`]
#[derive(Clone, Default)]
pub struct MemoryClinicStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryClinicStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a payout row as-is, skipping intake validation
    #[cfg(test)]
    pub(crate) async fn put_payout(&self, payout: Payout) {
        self.tables.lock().await.payouts.insert(payout.id, payout);
    }
}

#[async_trait]
impl ClinicStore for MemoryClinicStore {
    async fn insert_account(&self, new: NewAccount) -> StoreResult<Account> {
        let mut tables = self.tables.lock().await;
        if tables
            .accounts
            .values()
            .any(|account| account.external_id == new.external_id)
        {
            return Err(StoreError::Duplicate(format!("external id {}", new.external_id)));
        }

        let now = Utc::now();
        let profile = new.profile;
        let account = Account {
            id: Uuid::new_v4(),
            external_id: new.external_id,
            name: new.name,
            email: new.email,
            role: new.role,
            credits: 0,
            specialty: profile.as_ref().map(|p| p.specialty.clone()),
            experience_years: profile.as_ref().map_or(0, |p| p.experience_years),
            credential_url: profile.as_ref().map(|p| p.credential_url.clone()),
            description: profile.map(|p| p.description),
            verification_status: new.verification_status,
            created_at: now,
            updated_at: now,
        };
        tables.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn find_account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        Ok(self.tables.lock().await.accounts.get(&id).cloned())
    }

    async fn find_account_by_external_id(&self, external_id: &str) -> StoreResult<Option<Account>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .accounts
            .values()
            .find(|account| account.external_id == external_id)
            .cloned())
    }

    async fn list_doctors(&self, filter: DoctorFilter) -> StoreResult<Vec<Account>> {
        let tables = self.tables.lock().await;
        let mut doctors: Vec<Account> = tables
            .accounts
            .values()
            .filter(|account| filter.matches(account))
            .cloned()
            .collect();

        match filter.order {
            DoctorOrder::NewestFirst => doctors.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            DoctorOrder::OldestFirst => doctors.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            DoctorOrder::Name => doctors.sort_by(|a, b| a.name.cmp(&b.name)),
        }
        Ok(doctors)
    }

    async fn latest_entry(&self, owner_id: AccountId) -> StoreResult<Option<LedgerEntry>> {
        Ok(self.tables.lock().await.latest_entry(owner_id).cloned())
    }

    async fn entries(&self, owner_id: AccountId, limit: i64) -> StoreResult<Vec<LedgerEntry>> {
        let tables = self.tables.lock().await;
        let mut entries: Vec<LedgerEntry> = tables
            .entries
            .iter()
            .rev()
            .filter(|entry| entry.owner_id == owner_id)
            .cloned()
            .collect();
        // Stable sort keeps later appends first among equal timestamps
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(entries)
    }

    async fn entry_sum(&self, owner_id: AccountId) -> StoreResult<i64> {
        let tables = self.tables.lock().await;
        Ok(tables
            .entries
            .iter()
            .filter(|entry| entry.owner_id == owner_id)
            .map(|entry| entry.amount)
            .sum())
    }

    async fn insert_appointment(&self, new: NewAppointment) -> StoreResult<Appointment> {
        let mut tables = self.tables.lock().await;
        for id in [new.doctor_id, new.patient_id] {
            if !tables.accounts.contains_key(&id) {
                return Err(StoreError::MissingRow { entity: "Account", id });
            }
        }

        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            doctor_id: new.doctor_id,
            patient_id: new.patient_id,
            start_time: new.start_time,
            end_time: new.end_time,
            status: AppointmentStatus::Scheduled,
            notes: None,
            patient_description: new.patient_description,
            created_at: now,
            updated_at: now,
        };
        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn find_appointment(&self, id: AppointmentId) -> StoreResult<Option<Appointment>> {
        Ok(self.tables.lock().await.appointments.get(&id).cloned())
    }

    async fn appointments(&self, filter: AppointmentFilter) -> StoreResult<Vec<Appointment>> {
        let tables = self.tables.lock().await;
        let mut appointments: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|appointment| filter.matches(appointment))
            .cloned()
            .collect();
        appointments.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(appointments)
    }

    async fn windows(&self, doctor_id: AccountId) -> StoreResult<Vec<AvailabilityWindow>> {
        let tables = self.tables.lock().await;
        let mut windows: Vec<AvailabilityWindow> = tables
            .windows
            .iter()
            .filter(|window| window.doctor_id == doctor_id)
            .cloned()
            .collect();
        windows.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(windows)
    }

    async fn insert_payout(&self, new: NewPayout) -> StoreResult<Payout> {
        let mut tables = self.tables.lock().await;
        if !tables.accounts.contains_key(&new.doctor_id) {
            return Err(StoreError::MissingRow {
                entity: "Account",
                id: new.doctor_id,
            });
        }
        let quote = new.quote().ok_or_else(|| StoreError::InvalidColumn {
            column: "credits",
            value: new.credits.to_string(),
        })?;

        let payout = Payout {
            id: Uuid::new_v4(),
            doctor_id: new.doctor_id,
            credits: quote.credits,
            gross_amount: quote.gross_amount,
            platform_fee: quote.platform_fee,
            net_amount: quote.net_amount,
            paypal_email: new.paypal_email,
            status: PayoutStatus::Processing,
            created_at: Utc::now(),
            processed_at: None,
            processed_by: None,
        };
        tables.payouts.insert(payout.id, payout.clone());
        Ok(payout)
    }

    async fn find_payout(&self, id: PayoutId, status: Option<PayoutStatus>) -> StoreResult<Option<Payout>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .payouts
            .get(&id)
            .filter(|payout| status.is_none_or(|s| payout.status == s))
            .cloned())
    }

    async fn payouts(&self, filter: PayoutFilter) -> StoreResult<Vec<Payout>> {
        let tables = self.tables.lock().await;
        let mut payouts: Vec<Payout> = tables
            .payouts
            .values()
            .filter(|payout| filter.matches(payout))
            .cloned()
            .collect();
        payouts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payouts)
    }

    async fn apply(&self, settlement: Settlement) -> StoreResult<SettlementReceipt> {
        let mut tables = self.tables.lock().await;
        let (guards, mutations) = settlement.into_parts();

        for guard in &guards {
            tables.check(guard).map_err(StoreError::Rejected)?;
        }

        let mut staged = tables.clone();
        let mut receipt = SettlementReceipt::default();
        for mutation in mutations {
            staged.apply(mutation, &mut receipt)?;
        }

        *tables = staged;
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{BillingPeriod, EntryKind, NewLedgerEntry};

    async fn store_with_patient() -> (MemoryClinicStore, Account) {
        let store = MemoryClinicStore::new();
        let patient = store
            .insert_account(NewAccount::patient("ext_patient", "patient@example.com"))
            .await
            .unwrap();
        (store, patient)
    }

    #[tokio::test]
    async fn test_entry_mutation_moves_balance_and_log_together() {
        let (store, patient) = store_with_patient().await;

        let receipt = store
            .apply(Settlement::new("grant").entry(patient.id, 7, EntryKind::CreditPurchase))
            .await
            .unwrap();

        assert_eq!(receipt.balance(patient.id), Some(7));
        let account = store.find_account(patient.id).await.unwrap().unwrap();
        assert_eq!(account.credits, 7);
        assert_eq!(store.entry_sum(patient.id).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_tables_untouched() {
        let (store, patient) = store_with_patient().await;
        let ghost = Uuid::new_v4();

        let result = store
            .apply(
                Settlement::new("half_transfer")
                    .entry(patient.id, 5, EntryKind::AdminAdjustment)
                    .entry(ghost, -5, EntryKind::AdminAdjustment),
            )
            .await;

        assert!(matches!(result, Err(StoreError::MissingRow { id, .. }) if id == ghost));
        let account = store.find_account(patient.id).await.unwrap().unwrap();
        assert_eq!(account.credits, 0, "First entry must be rolled back");
        assert!(store.entries(patient.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_guard_rejection_writes_nothing() {
        let (store, patient) = store_with_patient().await;

        let result = store
            .apply(
                Settlement::new("deduct")
                    .guard(Guard::MinimumBalance {
                        account: patient.id,
                        required: 2,
                    })
                    .entry(patient.id, -2, EntryKind::AppointmentDeduction),
            )
            .await;

        assert!(matches!(
            result,
            Err(StoreError::Rejected(Rejection::InsufficientBalance {
                available: 0,
                required: 2,
                ..
            }))
        ));
        assert_eq!(store.entry_sum(patient.id).await.unwrap(), 0);
    }

    async fn grant_standard(store: &MemoryClinicStore, account: AccountId) -> StoreResult<SettlementReceipt> {
        store
            .apply(
                Settlement::new("allocate")
                    .guard(Guard::NotYetAllocated {
                        account,
                        plan_id: "standard".to_string(),
                        period: BillingPeriod::current(),
                    })
                    .mutate(Mutation::Entry(
                        NewLedgerEntry::new(account, 10, EntryKind::CreditPurchase)
                            .with_plan(Some("standard".to_string())),
                    )),
            )
            .await
    }

    #[tokio::test]
    async fn test_not_yet_allocated_guard() {
        let (store, patient) = store_with_patient().await;

        assert!(grant_standard(&store, patient.id).await.is_ok());
        assert!(matches!(
            grant_standard(&store, patient.id).await,
            Err(StoreError::Rejected(Rejection::AlreadyAllocated { .. }))
        ));
        assert_eq!(store.entry_sum(patient.id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_duplicate_external_id_rejected() {
        let (store, _) = store_with_patient().await;
        let result = store
            .insert_account(NewAccount::patient("ext_patient", "other@example.com"))
            .await;
        assert!(matches!(result, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_entries_newest_first_and_limited() {
        let (store, patient) = store_with_patient().await;
        for amount in [1, 2, 3] {
            store
                .apply(Settlement::new("grant").entry(patient.id, amount, EntryKind::CreditPurchase))
                .await
                .unwrap();
        }

        let entries = store.entries(patient.id, 2).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].amount, 3);
        assert_eq!(entries[1].amount, 2);
        assert_eq!(store.latest_entry(patient.id).await.unwrap().unwrap().amount, 3);
    }
}
