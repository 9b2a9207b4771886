//! HTTP handlers for the mobile punch surface

use std::collections::HashMap;

use axum::{
    extract::{Multipart, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::types::PunchType;

use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::services::punch::{
    FacePunchResponse, GroupPunchResponse, PlainPunchRequest, PunchRequest,
};
use crate::AppState;

/// Uploads above this size are rejected before decoding
const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Text fields plus at most one image from a multipart form
struct PunchForm {
    fields: HashMap<String, String>,
    image: Option<Vec<u8>>,
}

impl PunchForm {
    fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }

    fn decimal(&self, name: &str) -> AppResult<Option<Decimal>> {
        match self.text(name) {
            None => Ok(None),
            Some(raw) => raw.parse::<Decimal>().map(Some).map_err(|_| {
                AppError::ValidationError(format!("Invalid {}: {}", name, raw))
            }),
        }
    }

    fn punch_type(&self) -> AppResult<PunchType> {
        let raw = self
            .text("punch_type")
            .ok_or_else(|| AppError::ValidationError("punch_type is required".to_string()))?;
        PunchType::parse(raw)
            .ok_or_else(|| AppError::ValidationError(format!("Invalid punch_type: {}", raw)))
    }

    fn threshold(&self) -> AppResult<Option<f32>> {
        match self.text("threshold") {
            None => Ok(None),
            Some(raw) => {
                let value: f32 = raw.parse().map_err(|_| {
                    AppError::ValidationError(format!("Invalid threshold: {}", raw))
                })?;
                if !(0.0..=100.0).contains(&value) {
                    return Err(AppError::ValidationError(
                        "threshold must be between 0 and 100".to_string(),
                    ));
                }
                Ok(Some(value))
            }
        }
    }
}

async fn collect_form(mut multipart: Multipart) -> AppResult<PunchForm> {
    let mut fields = HashMap::new();
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::ValidationError(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" | "file" | "photo" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::ValidationError(format!("Image read failed: {}", e)))?;
                if bytes.len() > MAX_IMAGE_BYTES {
                    return Err(AppError::ValidationError(
                        "Image too large (max 10MB)".to_string(),
                    ));
                }
                image = Some(bytes.to_vec());
            }
            _ => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::ValidationError(format!("Field read failed: {}", e)))?;
                fields.insert(name, value);
            }
        }
    }

    Ok(PunchForm { fields, image })
}

#[derive(Deserialize)]
pub struct MobileCreateRequest {
    pub emp_code: String,
}

/// Mobile get-or-create for today's record
pub async fn app_create_attendance(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Json(body): Json<MobileCreateRequest>,
) -> AppResult<(StatusCode, Json<super::attendance::AttendanceEnvelope>)> {
    let employee = state.attendance.find_employee_by_code(&body.emp_code).await?;
    let (row, created) = state.attendance.get_or_create(&employee).await?;

    let (status, message) = if created {
        (StatusCode::CREATED, "Attendance record created")
    } else {
        (StatusCode::OK, "Record exists, skipping")
    };

    Ok((
        status,
        Json(super::attendance::AttendanceEnvelope {
            message: message.to_string(),
            data: row,
        }),
    ))
}

/// Mobile punch without face verification (multipart)
pub async fn app_punch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Json<super::attendance::AttendanceEnvelope>> {
    let form = collect_form(multipart).await?;

    let emp_code = form
        .text("emp_code")
        .ok_or_else(|| AppError::ValidationError("emp_code is required".to_string()))?
        .to_string();

    let request = PlainPunchRequest {
        punch_type: form.punch_type()?,
        image: form.image.clone(),
        latitude: form.decimal("latitude")?,
        longitude: form.decimal("longitude")?,
        address: form.text("address").map(str::to_string),
        actor: Some(current_user.0.user_id),
        emp_code,
    };

    let row = state.punch.plain_punch(request).await?;
    Ok(Json(super::attendance::AttendanceEnvelope {
        message: "Punch recorded".to_string(),
        data: row,
    }))
}

/// Face-verified punch, single or group mode (multipart)
pub async fn face_attendance(
    State(state): State<AppState>,
    current_user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let form = collect_form(multipart).await?;

    let image = form
        .image
        .clone()
        .ok_or_else(|| AppError::ValidationError("image is required".to_string()))?;

    let request = PunchRequest {
        punch_type: form.punch_type()?,
        image,
        latitude: form.decimal("latitude")?,
        longitude: form.decimal("longitude")?,
        address: form.text("address").map(str::to_string),
        emp_code: form.text("emp_code").map(str::to_string),
        threshold: form.threshold()?,
        actor: Some(current_user.0.user_id),
    };

    let group = form
        .text("group")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false);

    if group {
        let response: GroupPunchResponse = state.punch.group_punch(request).await?;
        Ok(Json(response).into_response())
    } else {
        let response: FacePunchResponse = state.punch.face_punch(request).await?;
        Ok(Json(response).into_response())
    }
}

#[derive(Deserialize)]
pub struct ImageQuery {
    pub attendance_id: i64,
    pub punch_type: String,
}

/// Stream a stored punch image from whichever backend owns it
pub async fn attendance_image(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<ImageQuery>,
) -> AppResult<Response> {
    let punch_type = PunchType::parse(&query.punch_type).ok_or_else(|| {
        AppError::ValidationError(format!("Invalid punch_type: {}", query.punch_type))
    })?;

    let record = state.attendance.get_record(query.attendance_id).await?;
    let reference = match punch_type {
        PunchType::In => record.punch_in_image_ref,
        PunchType::Out => record.punch_out_image_ref,
    }
    .ok_or_else(|| AppError::NotFound("Image".to_string()))?;

    let object = state.storage.fetch(&reference).await?;

    let basename = reference.rsplit('/').next().unwrap_or("image.jpg");
    Ok((
        [
            (header::CONTENT_TYPE, object.content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", basename),
            ),
        ],
        object.bytes,
    )
        .into_response())
}
