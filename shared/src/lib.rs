//! Shared types and models for the Field Workforce Attendance Platform
//!
//! This crate contains types shared between the backend, the mobile punch
//! surface, and operational reporting tooling.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
