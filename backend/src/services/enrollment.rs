//! Face enrolment: registering and removing reference faces
//!
//! Enrolment indexes the reference image into the gallery and stores it in
//! the object store; the employee row carries both the `face_id` and the
//! image reference, and un-enrolment clears both together.

use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use serde::Serialize;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::external::face::FaceClient;
use crate::external::storage::{StorageRouter, DEFAULT_CONTENT_TYPE};
use crate::models::EmployeeRow;
use crate::services::imaging;
use crate::services::punch::slugify;

/// Face enrolment service
#[derive(Clone)]
pub struct EnrollmentService {
    db: PgPool,
    face: FaceClient,
    storage: Arc<StorageRouter>,
    tz: Tz,
}

/// Enrolment result returned to the caller
#[derive(Debug, Serialize)]
pub struct EnrollmentOutcome {
    pub emp_id: i64,
    pub emp_code: String,
    pub face_id: String,
    pub confidence: f32,
    pub face_image_ref: String,
}

impl EnrollmentService {
    pub fn new(db: PgPool, face: FaceClient, storage: Arc<StorageRouter>, config: &Config) -> Self {
        Self {
            db,
            face,
            storage,
            tz: config.attendance.tz(),
        }
    }

    async fn find_employee(&self, emp_code: &str) -> AppResult<EmployeeRow> {
        sqlx::query_as::<_, EmployeeRow>(
            r#"
            SELECT emp_id, emp_code, name, phone, ward_id, designation_id,
                   face_image_ref, face_id, face_confidence
            FROM employees
            WHERE emp_code = $1
            "#,
        )
        .bind(emp_code)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Employee".to_string()))
    }

    /// Enrol (or re-enrol) an employee's reference face
    pub async fn store_face(&self, emp_code: &str, image: Vec<u8>) -> AppResult<EnrollmentOutcome> {
        let employee = self.find_employee(emp_code).await?;

        let frame = imaging::normalise(&image)?;
        let jpeg = imaging::encode_jpeg(&frame)?;

        // Re-enrolment replaces the previous gallery entry
        if let Some(old_face_id) = employee.face_id.as_deref() {
            self.face.delete_face(old_face_id).await?;
        }

        let indexed = self.face.index_face(&jpeg, &employee.emp_code).await?;

        let key = format!(
            "enrollment/{}/{}.jpg",
            slugify(&employee.name),
            Utc::now().with_timezone(&self.tz).format("%Y%m%d-%H%M%S")
        );
        let face_image_ref = self.storage.store(&key, jpeg, DEFAULT_CONTENT_TYPE).await?;

        sqlx::query(
            r#"
            UPDATE employees
            SET face_id = $1, face_image_ref = $2, face_confidence = $3
            WHERE emp_id = $4
            "#,
        )
        .bind(&indexed.face_id)
        .bind(&face_image_ref)
        .bind(indexed.confidence)
        .bind(employee.emp_id)
        .execute(&self.db)
        .await?;

        tracing::info!(
            emp_code = %employee.emp_code,
            face_id = %indexed.face_id,
            "face enrolled"
        );

        Ok(EnrollmentOutcome {
            emp_id: employee.emp_id,
            emp_code: employee.emp_code,
            face_id: indexed.face_id,
            confidence: indexed.confidence,
            face_image_ref,
        })
    }

    /// Remove an employee's enrolment: gallery entry and both row fields
    pub async fn delete_enrollment(&self, emp_id: i64) -> AppResult<()> {
        let employee = sqlx::query_as::<_, EmployeeRow>(
            r#"
            SELECT emp_id, emp_code, name, phone, ward_id, designation_id,
                   face_image_ref, face_id, face_confidence
            FROM employees
            WHERE emp_id = $1
            "#,
        )
        .bind(emp_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Employee".to_string()))?;

        if let Some(face_id) = employee.face_id.as_deref() {
            self.face.delete_face(face_id).await?;
        }

        sqlx::query(
            r#"
            UPDATE employees
            SET face_id = NULL, face_image_ref = NULL, face_confidence = NULL
            WHERE emp_id = $1
            "#,
        )
        .bind(emp_id)
        .execute(&self.db)
        .await?;

        tracing::info!(emp_code = %employee.emp_code, "face enrolment removed");
        Ok(())
    }
}
