//! HTTP handlers for attendance records and reporting

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::types::LocationType;

use crate::error::{AppError, AppResult};
use crate::middleware::{require_permission, CityScopeCtx, CurrentUser};
use crate::models::AttendanceRow;
use crate::services::report::{
    csv_filename, json_envelope, render_csv, GroupBy, ReportFilters, ReportRequest, ShortReportRow,
};
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateAttendanceRequest {
    pub emp_id: Option<i64>,
    pub emp_code: Option<String>,
}

#[derive(Serialize)]
pub struct AttendanceEnvelope {
    pub message: String,
    pub data: AttendanceRow,
}

/// Get-or-create today's attendance record. Re-posting for an existing
/// record answers 200 with the row instead of a conflict.
pub async fn create_attendance(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(body): Json<CreateAttendanceRequest>,
) -> AppResult<(StatusCode, Json<AttendanceEnvelope>)> {
    require_permission(&state, &current_user.0, "attendance", "create").await?;

    let employee = match (body.emp_id, body.emp_code.as_deref()) {
        (Some(emp_id), _) => state.attendance.find_employee(emp_id).await?,
        (None, Some(emp_code)) => state.attendance.find_employee_by_code(emp_code).await?,
        (None, None) => {
            return Err(AppError::ValidationError(
                "emp_id or emp_code is required".to_string(),
            ))
        }
    };

    let (row, created) = state.attendance.get_or_create(&employee).await?;

    if created {
        Ok((
            StatusCode::CREATED,
            Json(AttendanceEnvelope {
                message: "Attendance record created".to_string(),
                data: row,
            }),
        ))
    } else {
        Ok((
            StatusCode::OK,
            Json(AttendanceEnvelope {
                message: "Record exists, skipping".to_string(),
                data: row,
            }),
        ))
    }
}

#[derive(Deserialize)]
pub struct DownloadQuery {
    pub format: Option<String>,
    pub group_by: Option<String>,
    pub location_type: Option<String>,
    pub absentees_only: Option<bool>,
    pub date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub zone_id: Option<i64>,
    pub ward_id: Option<i64>,
    pub city_id: Option<i64>,
    pub supervisor_id: Option<i64>,
    pub employee_id: Option<i64>,
    pub emp_code: Option<String>,
    pub zone_name: Option<String>,
    pub ward_name: Option<String>,
    pub city_name: Option<String>,
    pub supervisor_name: Option<String>,
    pub search: Option<String>,
    pub location: Option<String>,
    pub has_punch_in: Option<bool>,
    pub has_punch_out: Option<bool>,
}

impl DownloadQuery {
    fn filters(&self) -> ReportFilters {
        ReportFilters {
            date: self.date,
            start_date: self.start_date,
            end_date: self.end_date,
            zone_id: self.zone_id,
            ward_id: self.ward_id,
            city_id: self.city_id,
            supervisor_id: self.supervisor_id,
            employee_id: self.employee_id,
            emp_code: self.emp_code.clone(),
            zone_name: self.zone_name.clone(),
            ward_name: self.ward_name.clone(),
            city_name: self.city_name.clone(),
            supervisor_name: self.supervisor_name.clone(),
            search: self.search.clone(),
            location: self.location.clone(),
            has_punch_in: self.has_punch_in,
            has_punch_out: self.has_punch_out,
        }
    }
}

/// Report download: the seven grouping variants as JSON or CSV
pub async fn download_report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    scope: CityScopeCtx,
    Query(query): Query<DownloadQuery>,
) -> AppResult<Response> {
    let format = query.format.as_deref().unwrap_or("json").to_ascii_lowercase();

    // CSV export is gated separately from on-screen viewing
    let perm_scope = if format == "csv" {
        require_permission(&state, &current_user.0, "report", "export").await?
    } else {
        require_permission(&state, &current_user.0, "report", "view").await?
    };
    let effective = scope.0.intersect(&perm_scope);

    let group_by = match query.group_by.as_deref() {
        None => GroupBy::Detail,
        Some(raw) => GroupBy::parse(raw).ok_or_else(|| {
            AppError::ValidationError(format!("Unknown group_by: {}", raw))
        })?,
    };
    let location_type = match query.location_type.as_deref() {
        None => LocationType::Both,
        Some(raw) => LocationType::parse(raw).ok_or_else(|| {
            AppError::ValidationError(format!("Unknown location_type: {}", raw))
        })?,
    };

    let request = ReportRequest {
        group_by,
        location_type,
        filters: query.filters(),
        absentees_only: query.absentees_only.unwrap_or(false),
    };

    let output = state.reports.run(request, &effective).await?;

    match format.as_str() {
        "json" => Ok(Json(json_envelope(&output)).into_response()),
        "csv" => {
            let body = render_csv(output.columns, &output.data)?;
            let filename = csv_filename(output.group_by.as_str(), Utc::now());
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", filename),
                    ),
                ],
                body,
            )
                .into_response())
        }
        other => Err(AppError::ValidationError(format!(
            "Unknown format: {}",
            other
        ))),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortReportQuery {
    pub city_name: Option<String>,
    pub zone_name: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Serialize)]
pub struct ShortReportResponse {
    pub date: NaiveDate,
    pub count: usize,
    pub wards: Vec<ShortReportRow>,
}

/// Per-ward present/registered tallies
pub async fn short_report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    scope: CityScopeCtx,
    Query(query): Query<ShortReportQuery>,
) -> AppResult<Json<ShortReportResponse>> {
    let perm_scope = require_permission(&state, &current_user.0, "attendance", "view").await?;
    let effective = scope.0.intersect(&perm_scope);

    let date = query.date.unwrap_or_else(|| state.attendance.today());
    let wards = state
        .reports
        .short_report(
            date,
            query.city_name.as_deref(),
            query.zone_name.as_deref(),
            &effective,
        )
        .await?;

    Ok(Json(ShortReportResponse {
        date,
        count: wards.len(),
        wards,
    }))
}
