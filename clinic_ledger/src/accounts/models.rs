//! Account data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Account ID type
pub type AccountId = Uuid;

/// Opaque, already-verified caller identity issued by the external auth provider.
///
/// The engine never inspects the subject beyond matching it against
/// [`Account::external_id`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self(subject.into())
    }

    pub fn subject(&self) -> &str {
        &self.0
    }
}

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Unassigned,
    Patient,
    Doctor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Unassigned => "UNASSIGNED",
            Role::Patient => "PATIENT",
            Role::Doctor => "DOCTOR",
            Role::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNASSIGNED" => Ok(Role::Unassigned),
            "PATIENT" => Ok(Role::Patient),
            "DOCTOR" => Ok(Role::Doctor),
            "ADMIN" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Doctor admission state into the public listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "PENDING",
            VerificationStatus::Verified => "VERIFIED",
            VerificationStatus::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(VerificationStatus::Pending),
            "VERIFIED" => Ok(VerificationStatus::Verified),
            "REJECTED" => Ok(VerificationStatus::Rejected),
            other => Err(format!("unknown verification status: {other}")),
        }
    }
}

/// Doctor-only profile fields collected during onboarding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorProfile {
    pub specialty: String,
    pub experience_years: i32,
    pub credential_url: String,
    pub description: String,
}

/// Account model
///
/// One entity for every role. Doctor-only fields are `None` (and
/// `experience_years` is 0) for other roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub external_id: String,
    pub name: Option<String>,
    pub email: String,
    pub role: Role,
    /// Materialized sum of this account's ledger entries
    pub credits: i64,
    pub specialty: Option<String>,
    pub experience_years: i32,
    pub credential_url: Option<String>,
    pub description: Option<String>,
    pub verification_status: Option<VerificationStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_doctor(&self) -> bool {
        self.role == Role::Doctor
    }

    pub fn is_patient(&self) -> bool {
        self.role == Role::Patient
    }

    /// Profile summary shown next to payouts in the admin view
    pub fn doctor_summary(&self) -> DoctorSummary {
        DoctorSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            specialty: self.specialty.clone(),
            credits: self.credits,
        }
    }
}

/// Doctor profile summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorSummary {
    pub id: AccountId,
    pub name: Option<String>,
    pub email: String,
    pub specialty: Option<String>,
    pub credits: i64,
}

/// New account, as synced from the external auth provider.
///
/// Accounts always start with zero credits; balance only ever arrives
/// through the ledger.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub external_id: String,
    pub name: Option<String>,
    pub email: String,
    pub role: Role,
    pub profile: Option<DoctorProfile>,
    pub verification_status: Option<VerificationStatus>,
}

impl NewAccount {
    pub fn unassigned(external_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            name: None,
            email: email.into(),
            role: Role::Unassigned,
            profile: None,
            verification_status: None,
        }
    }

    pub fn patient(external_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            role: Role::Patient,
            ..Self::unassigned(external_id, email)
        }
    }

    pub fn admin(external_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            role: Role::Admin,
            ..Self::unassigned(external_id, email)
        }
    }

    pub fn doctor(
        external_id: impl Into<String>,
        email: impl Into<String>,
        profile: DoctorProfile,
        status: VerificationStatus,
    ) -> Self {
        Self {
            role: Role::Doctor,
            profile: Some(profile),
            verification_status: Some(status),
            ..Self::unassigned(external_id, email)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Ordering for doctor listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoctorOrder {
    NewestFirst,
    OldestFirst,
    Name,
}

/// Doctor listing filter
#[derive(Debug, Clone)]
pub struct DoctorFilter {
    pub verification_status: Option<VerificationStatus>,
    pub specialty: Option<String>,
    pub order: DoctorOrder,
}

impl DoctorFilter {
    pub fn by_status(status: VerificationStatus, order: DoctorOrder) -> Self {
        Self {
            verification_status: Some(status),
            specialty: None,
            order,
        }
    }

    /// Whether an account belongs in this listing
    pub fn matches(&self, account: &Account) -> bool {
        account.role == Role::Doctor
            && self
                .verification_status
                .is_none_or(|status| account.verification_status == Some(status))
            && self
                .specialty
                .as_deref()
                .is_none_or(|specialty| account.specialty.as_deref() == Some(specialty))
    }
}
