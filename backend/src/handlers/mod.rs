//! HTTP handlers for the Field Workforce Attendance Platform

pub mod attendance;
pub mod auth;
pub mod face;
pub mod health;
pub mod master;
pub mod punch;
pub mod rbac;
pub mod whatsapp;

pub use attendance::*;
pub use auth::*;
pub use face::*;
pub use health::*;
pub use master::*;
pub use punch::*;
pub use rbac::*;
pub use whatsapp::*;
