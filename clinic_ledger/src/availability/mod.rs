//! Availability module: one bookable window per doctor.

pub mod manager;
pub mod models;

pub use manager::AvailabilityManager;
pub use models::{AvailabilityWindow, WindowId, WindowRequest};
