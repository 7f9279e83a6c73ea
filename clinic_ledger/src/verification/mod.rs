//! Verification module: doctor admission into the public listing.
//!
//! ```text
//! UNASSIGNED --select_role(Doctor)--> PENDING --admin--> VERIFIED
//!                                        |     <-suspend--'
//!                                        '--admin--> REJECTED --resubmit--> UNASSIGNED
//! ```

pub mod manager;

pub use manager::{DoctorStatusUpdate, ResubmitOutcome, RoleSelection, VerificationManager};
