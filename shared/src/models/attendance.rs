//! Attendance states and punch outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a daily attendance record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceState {
    /// No punch recorded for the logical date
    Absent,
    /// Punched in, not yet out
    PunchedIn,
    /// Both punches recorded
    Completed,
}

/// Outcome of one detected face in a group-mode punch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GroupPunchStatus {
    Punched,
    Unmatched,
    Duplicate,
    Skipped,
    Error,
}

/// Per-face result row in a group-mode punch response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupPunchOutcome {
    pub face_index: usize,
    pub status: GroupPunchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub punched_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_status_serialises_lowercase() {
        let json = serde_json::to_string(&GroupPunchStatus::Punched).unwrap();
        assert_eq!(json, "\"punched\"");
        let json = serde_json::to_string(&GroupPunchStatus::Duplicate).unwrap();
        assert_eq!(json, "\"duplicate\"");
    }

    #[test]
    fn test_outcome_omits_empty_fields() {
        let outcome = GroupPunchOutcome {
            face_index: 1,
            status: GroupPunchStatus::Unmatched,
            employee_id: None,
            employee_name: None,
            similarity: None,
            attendance_id: None,
            punched_at: None,
            message: None,
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"face_index\":1"));
        assert!(!json.contains("employee_id"));
        assert!(!json.contains("message"));
    }
}
