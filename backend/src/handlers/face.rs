//! HTTP handlers for face enrolment

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};

use crate::error::{AppError, AppResult};
use crate::middleware::{require_permission, CurrentUser};
use crate::services::enrollment::EnrollmentOutcome;
use crate::AppState;

/// Enrol (or re-enrol) an employee's reference face (multipart:
/// `emp_code` + `image`)
pub async fn store_face(
    State(state): State<AppState>,
    current_user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<EnrollmentOutcome>)> {
    require_permission(&state, &current_user.0, "employee", "enroll").await?;

    let mut emp_code: Option<String> = None;
    let mut image: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::ValidationError(format!("Invalid multipart body: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "image" | "file" | "photo" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::ValidationError(format!("Image read failed: {}", e)))?;
                image = Some(bytes.to_vec());
            }
            "emp_code" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::ValidationError(format!("Field read failed: {}", e)))?;
                if !value.is_empty() {
                    emp_code = Some(value);
                }
            }
            _ => {}
        }
    }

    let emp_code =
        emp_code.ok_or_else(|| AppError::ValidationError("emp_code is required".to_string()))?;
    let image = image.ok_or_else(|| AppError::ValidationError("image is required".to_string()))?;

    let outcome = state.enrollment.store_face(&emp_code, image).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Remove an employee's enrolment
pub async fn delete_face(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(emp_id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    require_permission(&state, &current_user.0, "employee", "enroll").await?;

    state.enrollment.delete_enrollment(emp_id).await?;
    Ok(Json(serde_json::json!({ "message": "Enrolment removed" })))
}
