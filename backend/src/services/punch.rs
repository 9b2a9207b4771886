//! Face-verified punch pipeline
//!
//! Orchestrates normalise → identify → verify → transition → persist for a
//! single captured frame, and the group-mode fan-out that detects, crops,
//! matches, and punches many employees from one frame. Faces in a group
//! frame are processed sequentially so the duplicate-suppression set stays
//! coherent.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::Serialize;
use shared::models::{GroupPunchOutcome, GroupPunchStatus};
use shared::types::PunchType;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::external::face::{FaceClient, FaceMatch};
use crate::external::storage::{StorageRouter, DEFAULT_CONTENT_TYPE};
use crate::models::{AttendanceRow, EmployeeRow};
use crate::services::attendance::{AttendanceService, PunchContext};
use crate::services::imaging;

/// Matches returned per gallery search
const MAX_SEARCH_MATCHES: u32 = 5;

/// A punch request after multipart extraction
#[derive(Debug)]
pub struct PunchRequest {
    pub punch_type: PunchType,
    pub image: Vec<u8>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub address: Option<String>,
    /// Optional employee hint; a face match must agree with it
    pub emp_code: Option<String>,
    /// Per-request similarity threshold override
    pub threshold: Option<f32>,
    /// Requesting user (supervisor-assisted punches)
    pub actor: Option<i64>,
}

/// A punch request without face verification (legacy mobile path)
#[derive(Debug)]
pub struct PlainPunchRequest {
    pub emp_code: String,
    pub punch_type: PunchType,
    pub image: Option<Vec<u8>>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub address: Option<String>,
    pub actor: Option<i64>,
}

/// Single-mode punch response
#[derive(Debug, Serialize)]
pub struct FacePunchResponse {
    pub employee_id: i64,
    pub employee_name: String,
    pub similarity: f32,
    pub attendance: AttendanceRow,
}

/// Group-mode punch response
#[derive(Debug, Serialize)]
pub struct GroupPunchResponse {
    pub total_faces: usize,
    pub punched_count: usize,
    pub success: bool,
    pub results: Vec<GroupPunchOutcome>,
}

/// Face-verified punch pipeline
#[derive(Clone)]
pub struct PunchService {
    attendance: AttendanceService,
    face: FaceClient,
    storage: Arc<StorageRouter>,
    tz: Tz,
    threshold: f32,
}

/// Fold a free-text name into a storage slug: ascii lowercase, runs of
/// anything else collapsed to a single dash
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug
    }
}

/// Deterministic, time-qualified storage key for a punch image:
/// `YYYY/MM/DD/<emp-slug>/<location-slug>/<punch>_<capture-ts>_<location-slug>.jpg`
pub fn punch_image_key(
    punch_type: PunchType,
    employee_name: &str,
    location: &str,
    captured_at: chrono::DateTime<Tz>,
) -> String {
    let emp_slug = slugify(employee_name);
    let location_slug = slugify(location);
    let ts = captured_at.format("%Y%m%d-%H%M%S");

    format!(
        "{}/{}/{}/{}_{}_{}.jpg",
        captured_at.format("%Y/%m/%d"),
        emp_slug,
        location_slug,
        punch_type.as_str().to_ascii_lowercase(),
        ts,
        location_slug,
    )
}

impl PunchService {
    pub fn new(
        attendance: AttendanceService,
        face: FaceClient,
        storage: Arc<StorageRouter>,
        config: &Config,
    ) -> Self {
        Self {
            attendance,
            face,
            storage,
            tz: config.attendance.tz(),
            threshold: config.face.match_threshold,
        }
    }

    fn effective_threshold(&self, request: &PunchRequest) -> f32 {
        request.threshold.unwrap_or(self.threshold).clamp(0.0, 100.0)
    }

    fn context(&self, request: &PunchRequest, image_ref: Option<String>) -> PunchContext {
        PunchContext {
            latitude: request.latitude,
            longitude: request.longitude,
            address: request.address.clone(),
            image_ref,
            actor: request.actor,
        }
    }

    async fn upload_punch_image(
        &self,
        punch_type: PunchType,
        employee_name: &str,
        location: &str,
        bytes: Vec<u8>,
    ) -> AppResult<String> {
        let key = punch_image_key(punch_type, employee_name, location, Utc::now().with_timezone(&self.tz));
        self.storage.store(&key, bytes, DEFAULT_CONTENT_TYPE).await
    }

    /// Punch without face verification (legacy mobile path). The image is
    /// optional; when present it is normalised and persisted before the
    /// transition.
    pub async fn plain_punch(&self, request: PlainPunchRequest) -> AppResult<AttendanceRow> {
        let employee = self
            .attendance
            .find_employee_by_code(&request.emp_code)
            .await?;

        let image_ref = match request.image {
            Some(ref bytes) => {
                let frame = imaging::normalise(bytes)?;
                let jpeg = imaging::encode_jpeg(&frame)?;
                let location = request.address.as_deref().unwrap_or("unknown");
                Some(
                    self.upload_punch_image(request.punch_type, &employee.name, location, jpeg)
                        .await?,
                )
            }
            None => None,
        };

        let ctx = PunchContext {
            latitude: request.latitude,
            longitude: request.longitude,
            address: request.address.clone(),
            image_ref,
            actor: request.actor,
        };

        self.attendance
            .punch(&employee, request.punch_type, ctx)
            .await
    }

    /// Single-mode face punch: gallery search on the full frame, pairwise
    /// verification against the enrolled reference, then the transition.
    pub async fn face_punch(&self, request: PunchRequest) -> AppResult<FacePunchResponse> {
        let threshold = self.effective_threshold(&request);

        let frame = imaging::normalise(&request.image)?;
        let jpeg = imaging::encode_jpeg(&frame)?;

        // Identify
        let matches = self.face.search_faces(&jpeg, MAX_SEARCH_MATCHES).await?;
        let best = best_match(&matches, threshold).ok_or(AppError::NoFaceMatched)?;
        let employee = self.resolve_matched_employee(best).await?;

        if let Some(hint) = request.emp_code.as_deref() {
            if employee.emp_code != hint {
                return Err(AppError::ValidationError(format!(
                    "Matched employee {} does not match requested employee {}",
                    employee.emp_code, hint
                )));
            }
        }

        // Verify against the enrolled reference
        let similarity = self.verify(&employee, &jpeg, threshold).await?;

        // Persist the capture, then transition
        let location = request.address.as_deref().unwrap_or("unknown");
        let image_ref = self
            .upload_punch_image(request.punch_type, &employee.name, location, jpeg)
            .await?;

        let attendance = self
            .attendance
            .punch(
                &employee,
                request.punch_type,
                self.context(&request, Some(image_ref)),
            )
            .await?;

        Ok(FacePunchResponse {
            employee_id: employee.emp_id,
            employee_name: employee.name,
            similarity,
            attendance,
        })
    }

    /// Group-mode face punch: detect every face, crop, match, and punch each
    /// resolved employee independently. Individual failures become per-face
    /// outcomes; the batch itself always succeeds with a report.
    pub async fn group_punch(&self, request: PunchRequest) -> AppResult<GroupPunchResponse> {
        let threshold = self.effective_threshold(&request);

        let frame = imaging::normalise(&request.image)?;
        let frame_jpeg = imaging::encode_jpeg(&frame)?;

        let boxes = self.face.detect_faces(&frame_jpeg).await?;
        if boxes.is_empty() {
            return Err(AppError::NoFaceDetected);
        }

        let mut processed: HashSet<i64> = HashSet::new();
        let mut results: Vec<GroupPunchOutcome> = Vec::with_capacity(boxes.len());

        for (face_index, bb) in boxes.iter().enumerate() {
            let outcome = self
                .punch_one_face(face_index, bb, &frame, &request, threshold, &mut processed)
                .await;
            results.push(outcome);
        }

        let punched_count = results
            .iter()
            .filter(|r| r.status == GroupPunchStatus::Punched)
            .count();

        Ok(GroupPunchResponse {
            total_faces: results.len(),
            punched_count,
            success: punched_count > 0,
            results,
        })
    }

    async fn punch_one_face(
        &self,
        face_index: usize,
        bb: &crate::external::face::BoundingBox,
        frame: &image::DynamicImage,
        request: &PunchRequest,
        threshold: f32,
        processed: &mut HashSet<i64>,
    ) -> GroupPunchOutcome {
        let crop = match imaging::face_crop(frame, bb) {
            Ok(crop) => crop,
            Err(e) => return outcome_error(face_index, format!("crop failed: {}", e)),
        };

        let matches = match self.face.search_faces(&crop, 1).await {
            Ok(matches) => matches,
            Err(e) => return outcome_error(face_index, format!("search failed: {}", e)),
        };

        let Some(best) = best_match(&matches, threshold) else {
            return GroupPunchOutcome {
                face_index,
                status: GroupPunchStatus::Unmatched,
                employee_id: None,
                employee_name: None,
                similarity: matches.first().map(|m| m.similarity),
                attendance_id: None,
                punched_at: None,
                message: None,
            };
        };

        let employee = match self.resolve_matched_employee(best).await {
            Ok(employee) => employee,
            Err(AppError::NotFound(_)) => {
                return GroupPunchOutcome {
                    face_index,
                    status: GroupPunchStatus::Unmatched,
                    employee_id: None,
                    employee_name: None,
                    similarity: Some(best.similarity),
                    attendance_id: None,
                    punched_at: None,
                    message: Some("matched face has no employee record".to_string()),
                }
            }
            Err(e) => return outcome_error(face_index, e.to_string()),
        };

        if !processed.insert(employee.emp_id) {
            return GroupPunchOutcome {
                face_index,
                status: GroupPunchStatus::Duplicate,
                employee_id: Some(employee.emp_id),
                employee_name: Some(employee.name),
                similarity: Some(best.similarity),
                attendance_id: None,
                punched_at: None,
                message: None,
            };
        }

        // Reject ineligible transitions before any external write
        if let Err(e) = self
            .attendance
            .precheck(employee.emp_id, request.punch_type)
            .await
        {
            return GroupPunchOutcome {
                face_index,
                status: GroupPunchStatus::Skipped,
                employee_id: Some(employee.emp_id),
                employee_name: Some(employee.name),
                similarity: Some(best.similarity),
                attendance_id: None,
                punched_at: None,
                message: Some(e.to_string()),
            };
        }

        let similarity = match self.verify(&employee, &crop, threshold).await {
            Ok(similarity) => similarity,
            Err(AppError::NoFaceMatched) => {
                return GroupPunchOutcome {
                    face_index,
                    status: GroupPunchStatus::Unmatched,
                    employee_id: Some(employee.emp_id),
                    employee_name: Some(employee.name),
                    similarity: Some(best.similarity),
                    attendance_id: None,
                    punched_at: None,
                    message: Some("verification below threshold".to_string()),
                }
            }
            Err(e) => return outcome_error(face_index, e.to_string()),
        };

        let location = request.address.as_deref().unwrap_or("unknown");
        let image_ref = match self
            .upload_punch_image(request.punch_type, &employee.name, location, crop)
            .await
        {
            Ok(image_ref) => image_ref,
            // Verification depends on the persisted capture, so upload
            // failure is fatal to this punch
            Err(e) => return outcome_error(face_index, e.to_string()),
        };

        let ctx = PunchContext {
            latitude: request.latitude,
            longitude: request.longitude,
            address: request.address.clone(),
            image_ref: Some(image_ref),
            actor: request.actor,
        };

        match self
            .attendance
            .punch(&employee, request.punch_type, ctx)
            .await
        {
            Ok(row) => {
                let punched_at = match request.punch_type {
                    PunchType::In => row.punch_in_time,
                    PunchType::Out => row.punch_out_time,
                };
                GroupPunchOutcome {
                    face_index,
                    status: GroupPunchStatus::Punched,
                    employee_id: Some(employee.emp_id),
                    employee_name: Some(employee.name),
                    similarity: Some(similarity),
                    attendance_id: Some(row.attendance_id),
                    punched_at,
                    message: None,
                }
            }
            // A race lost to a concurrent punch reads as skipped, not failed
            Err(AppError::InvalidTransition(msg)) => GroupPunchOutcome {
                face_index,
                status: GroupPunchStatus::Skipped,
                employee_id: Some(employee.emp_id),
                employee_name: Some(employee.name),
                similarity: Some(similarity),
                attendance_id: None,
                punched_at: None,
                message: Some(msg),
            },
            Err(e) => outcome_error(face_index, e.to_string()),
        }
    }

    /// Resolve a gallery match to an employee: by indexed `face_id` first,
    /// falling back to the external id (the employee code)
    async fn resolve_matched_employee(&self, matched: &FaceMatch) -> AppResult<EmployeeRow> {
        if let Some(employee) = self
            .attendance
            .find_employee_by_face_id(&matched.face_id)
            .await?
        {
            return Ok(employee);
        }

        match matched.external_id.as_deref() {
            Some(emp_code) => self.attendance.find_employee_by_code(emp_code).await,
            None => Err(AppError::NotFound("Employee".to_string())),
        }
    }

    /// Pairwise verification of the capture against the enrolled reference
    async fn verify(
        &self,
        employee: &EmployeeRow,
        capture: &[u8],
        threshold: f32,
    ) -> AppResult<f32> {
        let reference_ref = employee
            .face_image_ref
            .as_deref()
            .ok_or_else(|| AppError::EnrollmentMissing(employee.emp_code.clone()))?;

        let reference = self.storage.fetch(reference_ref).await?;
        let similarity = self
            .face
            .compare_faces(&reference.bytes, capture)
            .await?;

        if similarity < threshold {
            return Err(AppError::NoFaceMatched);
        }
        Ok(similarity)
    }
}

fn best_match(matches: &[FaceMatch], threshold: f32) -> Option<&FaceMatch> {
    matches
        .iter()
        .filter(|m| m.similarity >= threshold)
        .max_by(|a, b| a.similarity.total_cmp(&b.similarity))
}

fn outcome_error(face_index: usize, message: String) -> GroupPunchOutcome {
    GroupPunchOutcome {
        face_index,
        status: GroupPunchStatus::Error,
        employee_id: None,
        employee_name: None,
        similarity: None,
        attendance_id: None,
        punched_at: None,
        message: Some(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_slugify_folds_and_collapses() {
        assert_eq!(slugify("Ravi Kumar"), "ravi-kumar");
        assert_eq!(slugify("Ward  #12 / North"), "ward-12-north");
        assert_eq!(slugify("--Main. Depot--"), "main-depot");
    }

    #[test]
    fn test_slugify_drops_non_ascii() {
        assert_eq!(slugify("Pune Café"), "pune-caf");
        assert_eq!(slugify("वॉर्ड"), "unknown");
        assert_eq!(slugify(""), "unknown");
    }

    #[test]
    fn test_image_key_shape() {
        let captured = chrono_tz::Asia::Kolkata
            .with_ymd_and_hms(2023, 6, 14, 9, 15, 2)
            .unwrap();
        let key = punch_image_key(PunchType::In, "Ravi Kumar", "Ward 12", captured);
        assert_eq!(
            key,
            "2023/06/14/ravi-kumar/ward-12/in_20230614-091502_ward-12.jpg"
        );
    }

    #[test]
    fn test_image_key_out_punch() {
        let captured = chrono_tz::Asia::Kolkata
            .with_ymd_and_hms(2023, 12, 1, 18, 0, 0)
            .unwrap();
        let key = punch_image_key(PunchType::Out, "A", "", captured);
        assert_eq!(key, "2023/12/01/a/unknown/out_20231201-180000_unknown.jpg");
    }

    fn fm(face_id: &str, similarity: f32) -> FaceMatch {
        FaceMatch {
            face_id: face_id.to_string(),
            external_id: None,
            similarity,
        }
    }

    #[test]
    fn test_best_match_respects_threshold() {
        let matches = vec![fm("a", 85.0), fm("b", 92.5), fm("c", 91.0)];
        assert_eq!(best_match(&matches, 90.0).unwrap().face_id, "b");
        assert!(best_match(&matches, 95.0).is_none());
        assert!(best_match(&[], 50.0).is_none());
    }
}
