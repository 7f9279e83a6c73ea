//! Ledger module: the append-only credit log and the cached balances it feeds.
//!
//! This module implements:
//! - Atomic entry application (entry and cached balance written together)
//! - Idempotent monthly subscription grants
//! - The patient-to-doctor booking transfer
//! - Balance audits that recompute the running sum from the log
//!
//! ## Example
//!
//! ```no_run
//! use clinic_ledger::config::CreditPolicy;
//! use clinic_ledger::ledger::{LedgerManager, StaticEntitlements};
//! use clinic_ledger::store::MemoryClinicStore;
//! use std::sync::Arc;
//!
//! # async fn run(patient: clinic_ledger::accounts::Account, doctor_id: uuid::Uuid) -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = LedgerManager::new(Arc::new(MemoryClinicStore::new()), CreditPolicy::load());
//!
//! let patient = ledger
//!     .allocate_monthly_credits(patient, &StaticEntitlements::new())
//!     .await;
//! let patient = ledger
//!     .deduct_credits_for_appointment(patient.id, doctor_id)
//!     .await?;
//! println!("Balance after booking: {}", patient.credits);
//! # Ok(())
//! # }
//! ```

pub mod manager;
pub mod models;

pub use manager::{EntitlementSource, LedgerManager, StaticEntitlements};
pub use models::{
    APPOINTMENT_CREDIT_COST, BalanceAudit, BillingPeriod, EntryId, EntryKind, LedgerEntry,
    NewLedgerEntry, Plan, already_allocated,
};
