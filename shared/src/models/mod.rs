//! Domain models for the Field Workforce Attendance Platform

mod attendance;
mod location;
mod user;

pub use attendance::*;
pub use location::*;
pub use user::*;
