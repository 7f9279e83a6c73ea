//! Payout module: converting doctor credits into off-platform transfers.
//!
//! Requests arrive PROCESSING with their amounts fixed by [`PayoutQuote`].
//! An admin approval moves a request once, irreversibly, to PROCESSED and
//! debits the doctor's credits in the same settlement. The money itself moves
//! outside this crate.

pub mod manager;
pub mod models;

pub use manager::PayoutManager;
pub use models::{
    CREDIT_FEE_CENTS, CREDIT_GROSS_CENTS, NewPayout, Payout, PayoutFilter, PayoutId, PayoutQuote,
    PayoutStatus, PendingPayout,
};
