//! Ledger data models.

use crate::accounts::AccountId;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Ledger entry ID type
pub type EntryId = Uuid;

/// Fixed credit cost of one appointment, charged at booking and reversed on cancellation
pub const APPOINTMENT_CREDIT_COST: i64 = 2;

/// Ledger entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    CreditPurchase,
    AppointmentDeduction,
    AdminAdjustment,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::CreditPurchase => "CREDIT_PURCHASE",
            EntryKind::AppointmentDeduction => "APPOINTMENT_DEDUCTION",
            EntryKind::AdminAdjustment => "ADMIN_ADJUSTMENT",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREDIT_PURCHASE" => Ok(EntryKind::CreditPurchase),
            "APPOINTMENT_DEDUCTION" => Ok(EntryKind::AppointmentDeduction),
            "ADMIN_ADJUSTMENT" => Ok(EntryKind::AdminAdjustment),
            other => Err(format!("unknown entry kind: {other}")),
        }
    }
}

/// Immutable ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub owner_id: AccountId,
    pub amount: i64,
    pub kind: EntryKind,
    pub plan_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Entry to append; the store assigns nothing but persistence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub id: EntryId,
    pub owner_id: AccountId,
    pub amount: i64,
    pub kind: EntryKind,
    pub plan_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewLedgerEntry {
    pub fn new(owner_id: AccountId, amount: i64, kind: EntryKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            amount,
            kind,
            plan_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_plan(mut self, plan_id: Option<String>) -> Self {
        self.plan_id = plan_id;
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn into_entry(self) -> LedgerEntry {
        LedgerEntry {
            id: self.id,
            owner_id: self.owner_id,
            amount: self.amount,
            kind: self.kind,
            plan_id: self.plan_id,
            created_at: self.created_at,
        }
    }
}

/// Subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    FreeUser,
    Standard,
    Premium,
}

impl Plan {
    /// Tiers in resolution order, highest first
    pub const BY_PRIORITY: [Plan; 3] = [Plan::Premium, Plan::Standard, Plan::FreeUser];

    /// Identifier recorded as the entry's `plan_id`
    pub fn id(&self) -> &'static str {
        match self {
            Plan::FreeUser => "free_user",
            Plan::Standard => "standard",
            Plan::Premium => "premium",
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Calendar month (UTC) used for subscription grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BillingPeriod {
    pub year: i32,
    pub month: u32,
}

impl BillingPeriod {
    pub fn containing(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    pub fn current() -> Self {
        Self::containing(Utc::now())
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        Self::containing(at) == *self
    }
}

impl std::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Whether the latest entry already records a grant for `plan_id` in `period`.
///
/// Allocation idempotence is derived from the ledger itself, never from a
/// separate flag.
pub fn already_allocated(latest: Option<&LedgerEntry>, plan_id: &str, period: BillingPeriod) -> bool {
    latest.is_some_and(|entry| {
        period.contains(entry.created_at) && entry.plan_id.as_deref() == Some(plan_id)
    })
}

/// Result of recomputing a balance from the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceAudit {
    pub account_id: AccountId,
    pub cached: i64,
    pub recomputed: i64,
}

impl BalanceAudit {
    pub fn is_consistent(&self) -> bool {
        self.cached == self.recomputed
    }
}
