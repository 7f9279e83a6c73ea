//! Payout data models.

use crate::accounts::{AccountId, DoctorSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Payout ID type
pub type PayoutId = Uuid;

/// Gross value of one credit, in cents
pub const CREDIT_GROSS_CENTS: i64 = 1_000;

/// Platform fee withheld per credit, in cents
pub const CREDIT_FEE_CENTS: i64 = 200;

/// Payout status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    Processing,
    Processed,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Processing => "PROCESSING",
            PayoutStatus::Processed => "PROCESSED",
        }
    }
}

impl std::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayoutStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSING" => Ok(PayoutStatus::Processing),
            "PROCESSED" => Ok(PayoutStatus::Processed),
            other => Err(format!("unknown payout status: {other}")),
        }
    }
}

/// Money figures for converting credits into an off-platform transfer.
///
/// Fixed at request time; approval never recomputes them. Only positive
/// credit counts whose gross amount fits in an `i64` have a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutQuote {
    pub credits: i64,
    pub gross_amount: i64,
    pub platform_fee: i64,
    pub net_amount: i64,
}

impl PayoutQuote {
    pub fn for_credits(credits: i64) -> Option<Self> {
        if credits <= 0 {
            return None;
        }
        let gross_amount = credits.checked_mul(CREDIT_GROSS_CENTS)?;
        let platform_fee = credits.checked_mul(CREDIT_FEE_CENTS)?;
        Some(Self {
            credits,
            gross_amount,
            platform_fee,
            net_amount: gross_amount - platform_fee,
        })
    }
}

/// Payout model; amounts in cents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub id: PayoutId,
    pub doctor_id: AccountId,
    pub credits: i64,
    pub gross_amount: i64,
    pub platform_fee: i64,
    pub net_amount: i64,
    pub paypal_email: String,
    pub status: PayoutStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<AccountId>,
}

/// Payout row created by the request intake
#[derive(Debug, Clone)]
pub struct NewPayout {
    pub doctor_id: AccountId,
    pub credits: i64,
    pub paypal_email: String,
}

impl NewPayout {
    pub fn new(doctor_id: AccountId, credits: i64, paypal_email: impl Into<String>) -> Self {
        Self {
            doctor_id,
            credits,
            paypal_email: paypal_email.into(),
        }
    }

    /// Quote for the requested credits, `None` when they cannot be paid out
    pub fn quote(&self) -> Option<PayoutQuote> {
        PayoutQuote::for_credits(self.credits)
    }
}

/// Payout listing filter, results ordered newest first
#[derive(Debug, Clone, Default)]
pub struct PayoutFilter {
    pub doctor_id: Option<AccountId>,
    pub status: Option<PayoutStatus>,
}

impl PayoutFilter {
    pub fn matches(&self, payout: &Payout) -> bool {
        self.doctor_id.is_none_or(|id| payout.doctor_id == id)
            && self.status.is_none_or(|status| payout.status == status)
    }
}

/// Pending payout with the requesting doctor's summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPayout {
    pub payout: Payout,
    pub doctor: DoctorSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_rate_card() {
        let quote = PayoutQuote::for_credits(10).unwrap();
        assert_eq!(quote.gross_amount, 10_000, "$10 per credit");
        assert_eq!(quote.platform_fee, 2_000, "$2 fee per credit");
        assert_eq!(quote.net_amount, 8_000, "$8 net per credit");
    }

    #[test]
    fn test_quote_conserves_gross() {
        for credits in [1, 3, 17, 250] {
            let quote = PayoutQuote::for_credits(credits).unwrap();
            assert_eq!(quote.net_amount + quote.platform_fee, quote.gross_amount);
        }
    }

    #[test]
    fn test_quote_rejects_unpayable_credits() {
        assert_eq!(PayoutQuote::for_credits(0), None);
        assert_eq!(PayoutQuote::for_credits(-5), None);
        assert_eq!(PayoutQuote::for_credits(i64::MAX / 10), None, "Gross overflows");
        assert!(PayoutQuote::for_credits(i64::MAX / CREDIT_GROSS_CENTS).is_some());
    }
}
