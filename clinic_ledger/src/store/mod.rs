//! Persistent store abstraction.
//!
//! Reads are plain point lookups and filtered scans. Every write goes through
//! [`ClinicStore::apply`] as one [`Settlement`], which the backend commits in
//! a single transaction. Two backends ship with the crate:
//!
//! - [`PgClinicStore`]: PostgreSQL through sqlx
//! - [`MemoryClinicStore`]: in-process tables, for tests and embedding

pub mod memory;
pub mod postgres;
pub mod settlement;

pub use memory::MemoryClinicStore;
pub use postgres::PgClinicStore;
pub use settlement::{Guard, Mutation, Settlement, SettlementReceipt};

use crate::accounts::{Account, AccountId, DoctorFilter, NewAccount, Role, VerificationStatus};
use crate::appointment::{Appointment, AppointmentFilter, AppointmentId, AppointmentStatus, NewAppointment};
use crate::availability::AvailabilityWindow;
use crate::ledger::LedgerEntry;
use crate::payout::{NewPayout, Payout, PayoutFilter, PayoutId, PayoutStatus};
use async_trait::async_trait;
use thiserror::Error;

/// Guard that failed inside a settlement
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Insufficient balance for {account}: available {available}, required {required}")]
    InsufficientBalance {
        account: AccountId,
        available: i64,
        required: i64,
    },

    #[error("Account {0} not found")]
    MissingAccount(AccountId),

    /// `actual` is `None` when the appointment does not exist
    #[error("Appointment {appointment} is {actual:?}")]
    AppointmentStatus {
        appointment: AppointmentId,
        actual: Option<AppointmentStatus>,
    },

    /// `actual` is `None` when the payout does not exist
    #[error("Payout {payout} is {actual:?}")]
    PayoutStatus {
        payout: PayoutId,
        actual: Option<PayoutStatus>,
    },

    #[error("Account {account} has role {actual:?}")]
    AccountRole {
        account: AccountId,
        actual: Option<Role>,
    },

    #[error("Account {account} has verification status {actual:?}")]
    AccountVerification {
        account: AccountId,
        actual: Option<VerificationStatus>,
    },

    #[error("Plan {plan_id} already allocated to {account} this period")]
    AlreadyAllocated { account: AccountId, plan_id: String },
}

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A settlement guard did not hold; nothing was written
    #[error("Settlement rejected: {0}")]
    Rejected(Rejection),

    /// A mutation targeted a row that does not exist; nothing was written
    #[error("{entity} {id} not found")]
    MissingRow { entity: &'static str, id: uuid::Uuid },

    /// A column held text that does not decode into its enum
    #[error("Invalid value {value:?} in column {column}")]
    InvalidColumn { column: &'static str, value: String },

    /// Unique key already taken
    #[error("Duplicate {0}")]
    Duplicate(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistent store operations
#[async_trait]
pub trait ClinicStore: Send + Sync {
    /// Insert an account with zero credits
    async fn insert_account(&self, account: NewAccount) -> StoreResult<Account>;

    async fn find_account(&self, id: AccountId) -> StoreResult<Option<Account>>;

    async fn find_account_by_external_id(&self, external_id: &str) -> StoreResult<Option<Account>>;

    async fn list_doctors(&self, filter: DoctorFilter) -> StoreResult<Vec<Account>>;

    /// Most recent entry of the account
    async fn latest_entry(&self, owner_id: AccountId) -> StoreResult<Option<LedgerEntry>>;

    /// Entries of the account, newest first
    async fn entries(&self, owner_id: AccountId, limit: i64) -> StoreResult<Vec<LedgerEntry>>;

    /// Sum of every entry of the account, recomputed from the log
    async fn entry_sum(&self, owner_id: AccountId) -> StoreResult<i64>;

    /// Insert a SCHEDULED appointment
    async fn insert_appointment(&self, appointment: NewAppointment) -> StoreResult<Appointment>;

    async fn find_appointment(&self, id: AppointmentId) -> StoreResult<Option<Appointment>>;

    /// Appointments matching the filter, start time ascending
    async fn appointments(&self, filter: AppointmentFilter) -> StoreResult<Vec<Appointment>>;

    /// Windows of the doctor, start time ascending
    async fn windows(&self, doctor_id: AccountId) -> StoreResult<Vec<AvailabilityWindow>>;

    /// Insert a PROCESSING payout
    async fn insert_payout(&self, payout: NewPayout) -> StoreResult<Payout>;

    /// Find a payout, optionally constrained to a status
    async fn find_payout(&self, id: PayoutId, status: Option<PayoutStatus>) -> StoreResult<Option<Payout>>;

    /// Payouts matching the filter, newest first
    async fn payouts(&self, filter: PayoutFilter) -> StoreResult<Vec<Payout>>;

    /// Apply a settlement atomically
    async fn apply(&self, settlement: Settlement) -> StoreResult<SettlementReceipt>;
}

pub(crate) fn parse_column<T: std::str::FromStr>(column: &'static str, value: String) -> StoreResult<T> {
    value
        .parse()
        .map_err(|_| StoreError::InvalidColumn { column, value })
}
