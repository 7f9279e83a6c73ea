//! Settlement: the single atomic unit of work every mutation goes through.
//!
//! A settlement is a list of guards (preconditions the store re-checks inside
//! its transaction, under row locks) followed by mutations. Stores apply all
//! of it or none of it.

use crate::accounts::{AccountId, DoctorProfile, Role, VerificationStatus};
use crate::appointment::{AppointmentId, AppointmentStatus};
use crate::availability::AvailabilityWindow;
use crate::ledger::{BillingPeriod, EntryKind, NewLedgerEntry};
use crate::payout::{PayoutId, PayoutStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Precondition checked inside the settlement transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// Account balance must be at least `required`
    MinimumBalance { account: AccountId, required: i64 },
    AppointmentStatus {
        appointment: AppointmentId,
        expected: AppointmentStatus,
    },
    PayoutStatus {
        payout: PayoutId,
        expected: PayoutStatus,
    },
    AccountRole { account: AccountId, role: Role },
    AccountVerification {
        account: AccountId,
        status: VerificationStatus,
    },
    /// The latest entry must not already be a grant of `plan_id` in `period`
    NotYetAllocated {
        account: AccountId,
        plan_id: String,
        period: BillingPeriod,
    },
}

/// Write applied by the settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Append the entry and adjust the owner's cached balance by its amount.
    ///
    /// This is the only way to change a balance.
    Entry(NewLedgerEntry),
    AppointmentStatus {
        appointment: AppointmentId,
        status: AppointmentStatus,
    },
    AppointmentNotes {
        appointment: AppointmentId,
        notes: String,
    },
    PayoutProcessed {
        payout: PayoutId,
        processed_at: DateTime<Utc>,
        processed_by: AccountId,
    },
    VerificationStatus {
        account: AccountId,
        status: VerificationStatus,
    },
    AssignRole {
        account: AccountId,
        role: Role,
        profile: Option<DoctorProfile>,
        verification: Option<VerificationStatus>,
    },
    /// Back to onboarding: UNASSIGNED, PENDING, doctor profile cleared
    ResetDoctorProfile { account: AccountId },
    /// Delete every window of the doctor and insert this one
    ReplaceAvailability(AvailabilityWindow),
}

/// Atomic unit of work
#[derive(Debug, Clone)]
pub struct Settlement {
    label: &'static str,
    guards: Vec<Guard>,
    mutations: Vec<Mutation>,
}

impl Settlement {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            guards: Vec::new(),
            mutations: Vec::new(),
        }
    }

    pub fn guard(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn mutate(mut self, mutation: Mutation) -> Self {
        self.mutations.push(mutation);
        self
    }

    /// Shorthand for an entry mutation stamped now
    pub fn entry(self, owner_id: AccountId, amount: i64, kind: EntryKind) -> Self {
        self.mutate(Mutation::Entry(NewLedgerEntry::new(owner_id, amount, kind)))
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn into_parts(self) -> (Vec<Guard>, Vec<Mutation>) {
        (self.guards, self.mutations)
    }

    /// Net credit movement across all entries
    pub fn net_credits(&self) -> i64 {
        self.mutations
            .iter()
            .map(|mutation| match mutation {
                Mutation::Entry(entry) => entry.amount,
                _ => 0,
            })
            .sum()
    }
}

/// Outcome of an applied settlement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementReceipt {
    /// Cached balance of every account touched by an entry, after commit
    pub balances: HashMap<AccountId, i64>,
}

impl SettlementReceipt {
    pub fn balance(&self, account: AccountId) -> Option<i64> {
        self.balances.get(&account).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_builder_preserves_order() {
        let patient = Uuid::new_v4();
        let doctor = Uuid::new_v4();
        let settlement = Settlement::new("transfer")
            .guard(Guard::MinimumBalance {
                account: patient,
                required: 2,
            })
            .entry(patient, -2, EntryKind::AppointmentDeduction)
            .entry(doctor, 2, EntryKind::AppointmentDeduction);

        assert_eq!(settlement.label(), "transfer");
        assert_eq!(settlement.guards().len(), 1);
        assert_eq!(settlement.mutations().len(), 2);
        assert_eq!(settlement.net_credits(), 0, "Two-sided transfer is balanced");
    }

    #[test]
    fn test_net_credits_ignores_status_mutations() {
        let doctor = Uuid::new_v4();
        let settlement = Settlement::new("approve")
            .mutate(Mutation::PayoutProcessed {
                payout: Uuid::new_v4(),
                processed_at: Utc::now(),
                processed_by: Uuid::new_v4(),
            })
            .entry(doctor, -10, EntryKind::AdminAdjustment);

        assert_eq!(settlement.net_credits(), -10);
    }
}
