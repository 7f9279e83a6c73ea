//! Engine configuration.
//!
//! Consolidates the environment reads for subscription credit grants.

use crate::ledger::Plan;

/// Monthly credit grant per subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditPolicy {
    pub free_user: i64,
    pub standard: i64,
    pub premium: i64,
}

impl CreditPolicy {
    /// Read the policy from environment variables
    ///
    /// - `PLAN_CREDITS_FREE` (default: 0)
    /// - `PLAN_CREDITS_STANDARD` (default: 10)
    /// - `PLAN_CREDITS_PREMIUM` (default: 24)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            free_user: parse_env_or("PLAN_CREDITS_FREE", defaults.free_user),
            standard: parse_env_or("PLAN_CREDITS_STANDARD", defaults.standard),
            premium: parse_env_or("PLAN_CREDITS_PREMIUM", defaults.premium),
        }
    }

    /// Load a `.env` file if present, then read the environment
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_env()
    }

    pub fn credits_for(&self, plan: Plan) -> i64 {
        match plan {
            Plan::FreeUser => self.free_user,
            Plan::Standard => self.standard,
            Plan::Premium => self.premium,
        }
    }
}

impl Default for CreditPolicy {
    fn default() -> Self {
        Self {
            free_user: 0,
            standard: 10,
            premium: 24,
        }
    }
}

/// Parse an environment variable, falling back to `default` when unset or invalid
pub(crate) fn parse_env_or<T: std::str::FromStr + std::fmt::Display>(var: &str, default: T) -> T {
    match std::env::var(var) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            log::warn!("Ignoring invalid {var}={value:?}, using {default}");
            default
        }),
        Err(_) => default,
    }
}
