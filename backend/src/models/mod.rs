//! Database models for the Field Workforce Attendance Platform
//!
//! Re-exports models from the shared crate and adds backend row types

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

pub use shared::models::*;

/// Column list matching [`AttendanceRow`]; keep in sync with the schema
pub const ATTENDANCE_COLUMNS: &str = "attendance_id, emp_id, att_date, ward_id, \
    punch_in_time, punch_out_time, punch_in_image_ref, punch_out_image_ref, \
    latitude_in, longitude_in, latitude_out, longitude_out, \
    in_address, out_address, duration_minutes, punched_in_by, punched_out_by";

/// An attendance table row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AttendanceRow {
    pub attendance_id: i64,
    pub emp_id: i64,
    pub att_date: NaiveDate,
    pub ward_id: Option<i64>,
    pub punch_in_time: Option<DateTime<Utc>>,
    pub punch_out_time: Option<DateTime<Utc>>,
    pub punch_in_image_ref: Option<String>,
    pub punch_out_image_ref: Option<String>,
    pub latitude_in: Option<Decimal>,
    pub longitude_in: Option<Decimal>,
    pub latitude_out: Option<Decimal>,
    pub longitude_out: Option<Decimal>,
    pub in_address: Option<String>,
    pub out_address: Option<String>,
    pub duration_minutes: Option<i64>,
    pub punched_in_by: Option<i64>,
    pub punched_out_by: Option<i64>,
}

impl AttendanceRow {
    pub fn state(&self) -> AttendanceState {
        match (self.punch_in_time, self.punch_out_time) {
            (None, _) => AttendanceState::Absent,
            (Some(_), None) => AttendanceState::PunchedIn,
            (Some(_), Some(_)) => AttendanceState::Completed,
        }
    }
}

/// An employee table row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EmployeeRow {
    pub emp_id: i64,
    pub emp_code: String,
    pub name: String,
    pub phone: Option<String>,
    pub ward_id: Option<i64>,
    pub designation_id: Option<i64>,
    pub face_image_ref: Option<String>,
    pub face_id: Option<String>,
    pub face_confidence: Option<f32>,
}
