//! # Clinic Ledger
//!
//! Credit ledger and lifecycle settlement engine for a patient/doctor
//! appointment marketplace.
//!
//! Patients hold credits granted monthly by their subscription and spend them
//! on bookings; doctors earn them and convert them into payouts approved by an
//! admin. Every balance is the running sum of an append-only ledger, and
//! every operation that touches more than one row (a booking transfer, a
//! cancellation refund, a payout approval) is applied as one atomic
//! [`Settlement`](store::Settlement).
//!
//! ## Architecture
//!
//! - [`store`]: The persistence seam ([`ClinicStore`](store::ClinicStore)) with
//!   PostgreSQL and in-memory backends
//! - [`ledger`]: Entries, monthly grants, the booking transfer, audits
//! - [`appointment`]: Cancellation with refund, completion, notes
//! - [`verification`]: Doctor onboarding and admin review
//! - [`payout`]: Admin approval of doctor payouts
//! - [`availability`]: One bookable window per doctor
//! - [`admin`]: The admin gate in front of privileged operations
//!
//! ## Example
//!
//! ```
//! use clinic_ledger::ClinicEngine;
//! use clinic_ledger::config::CreditPolicy;
//! use clinic_ledger::store::MemoryClinicStore;
//! use std::sync::Arc;
//!
//! let engine = ClinicEngine::new(Arc::new(MemoryClinicStore::new()), CreditPolicy::default());
//! let _ledger = engine.ledger.clone();
//! ```

pub mod accounts;
pub mod admin;
pub mod appointment;
pub mod availability;
pub mod config;
pub mod db;
pub mod errors;
pub mod ledger;
pub mod payout;
pub mod store;
pub mod verification;

pub use accounts::{Account, AccountId, Identity, Role, VerificationStatus};
pub use errors::{ClinicError, ClinicResult, ErrorKind};

use admin::AdminGate;
use appointment::AppointmentManager;
use availability::AvailabilityManager;
use config::CreditPolicy;
use ledger::LedgerManager;
use payout::PayoutManager;
use std::sync::Arc;
use store::ClinicStore;
use verification::VerificationManager;

/// Every manager wired to one store
#[derive(Clone)]
pub struct ClinicEngine {
    pub store: Arc<dyn ClinicStore>,
    pub admin: AdminGate,
    pub ledger: LedgerManager,
    pub appointments: AppointmentManager,
    pub verification: VerificationManager,
    pub payouts: PayoutManager,
    pub availability: AvailabilityManager,
}

impl ClinicEngine {
    pub fn new(store: Arc<dyn ClinicStore>, policy: CreditPolicy) -> Self {
        let admin = AdminGate::new(store.clone());
        Self {
            ledger: LedgerManager::new(store.clone(), policy),
            appointments: AppointmentManager::new(store.clone()),
            verification: VerificationManager::new(store.clone(), admin.clone()),
            payouts: PayoutManager::new(store.clone(), admin.clone()),
            availability: AvailabilityManager::new(store.clone()),
            admin,
            store,
        }
    }
}
