//! Business logic services for the Field Workforce Attendance Platform

pub mod attendance;
pub mod auth;
pub mod enrollment;
pub mod imaging;
pub mod master;
pub mod permission;
pub mod punch;
pub mod rbac;
pub mod report;
pub mod scope;

pub use attendance::AttendanceService;
pub use auth::AuthService;
pub use enrollment::EnrollmentService;
pub use master::MasterService;
pub use permission::PermissionResolver;
pub use punch::PunchService;
pub use rbac::RbacService;
pub use report::ReportService;
