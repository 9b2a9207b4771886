//! Face-matching service client
//!
//! Thin interface over the external face service: index (enrolment), search
//! (gallery identification), compare (pairwise verification), detect
//! (bounding boxes), and face deletion. Verification itself stays in the
//! punch pipeline; this client only moves bytes and classifies errors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::FaceConfig;
use crate::error::{AppError, AppResult};

/// Client for the face-matching service
#[derive(Clone)]
pub struct FaceClient {
    endpoint: String,
    api_key: String,
    collection: String,
    http_client: Client,
    /// Set once the collection is known to exist
    collection_ready: Arc<AtomicBool>,
}

/// A gallery match returned by search
#[derive(Debug, Clone, Deserialize)]
pub struct FaceMatch {
    pub face_id: String,
    /// The external id supplied at indexing time (the employee code)
    pub external_id: Option<String>,
    pub similarity: f32,
}

/// A face detected in a frame; coordinates are normalised to 0..1
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// Result of indexing a reference face
#[derive(Debug, Deserialize)]
pub struct IndexedFace {
    pub face_id: String,
    pub confidence: f32,
}

#[derive(Serialize)]
struct CollectionRequest<'a> {
    collection_id: &'a str,
}

#[derive(Serialize)]
struct IndexRequest<'a> {
    collection_id: &'a str,
    image_base64: String,
    external_id: &'a str,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    collection_id: &'a str,
    image_base64: String,
    max_matches: u32,
}

#[derive(Deserialize)]
struct SearchResponse {
    matches: Vec<FaceMatch>,
}

#[derive(Serialize)]
struct CompareRequest {
    source_base64: String,
    target_base64: String,
}

#[derive(Deserialize)]
struct CompareResponse {
    similarity: f32,
}

#[derive(Serialize)]
struct DetectRequest {
    image_base64: String,
}

#[derive(Deserialize)]
struct DetectResponse {
    faces: Vec<BoundingBox>,
}

#[derive(Deserialize)]
struct ServiceError {
    error: ServiceErrorDetail,
}

#[derive(Deserialize)]
struct ServiceErrorDetail {
    code: String,
    message: String,
}

impl FaceClient {
    pub fn new(config: &FaceConfig) -> Self {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            collection: config.collection.clone(),
            http_client,
            collection_ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create the gallery collection if this process has not seen it yet.
    /// An "already exists" answer from the service counts as ready.
    pub async fn ensure_collection(&self) -> AppResult<()> {
        if self.collection_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let response = self
            .http_client
            .post(format!("{}/collections", self.endpoint))
            .header("x-api-key", &self.api_key)
            .json(&CollectionRequest {
                collection_id: &self.collection,
            })
            .send()
            .await
            .map_err(|e| AppError::FaceService(format!("Request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::CONFLICT {
            self.collection_ready.store(true, Ordering::Release);
            return Ok(());
        }

        Err(Self::classify(status, response.text().await.ok()))
    }

    /// Index a reference face into the gallery
    pub async fn index_face(&self, image: &[u8], external_id: &str) -> AppResult<IndexedFace> {
        self.ensure_collection().await?;

        let response = self
            .http_client
            .post(format!("{}/faces/index", self.endpoint))
            .header("x-api-key", &self.api_key)
            .json(&IndexRequest {
                collection_id: &self.collection,
                image_base64: BASE64.encode(image),
                external_id,
            })
            .send()
            .await
            .map_err(|e| AppError::FaceService(format!("Request failed: {}", e)))?;

        Self::parse(response).await
    }

    /// Search the gallery for faces matching the supplied frame
    pub async fn search_faces(&self, image: &[u8], max_matches: u32) -> AppResult<Vec<FaceMatch>> {
        self.ensure_collection().await?;

        let response = self
            .http_client
            .post(format!("{}/faces/search", self.endpoint))
            .header("x-api-key", &self.api_key)
            .json(&SearchRequest {
                collection_id: &self.collection,
                image_base64: BASE64.encode(image),
                max_matches,
            })
            .send()
            .await
            .map_err(|e| AppError::FaceService(format!("Request failed: {}", e)))?;

        let parsed: SearchResponse = Self::parse(response).await?;
        Ok(parsed.matches)
    }

    /// Pairwise comparison; returns percent similarity
    pub async fn compare_faces(&self, source: &[u8], target: &[u8]) -> AppResult<f32> {
        let response = self
            .http_client
            .post(format!("{}/faces/compare", self.endpoint))
            .header("x-api-key", &self.api_key)
            .json(&CompareRequest {
                source_base64: BASE64.encode(source),
                target_base64: BASE64.encode(target),
            })
            .send()
            .await
            .map_err(|e| AppError::FaceService(format!("Request failed: {}", e)))?;

        let parsed: CompareResponse = Self::parse(response).await?;
        Ok(parsed.similarity)
    }

    /// Detect every face in a frame
    pub async fn detect_faces(&self, image: &[u8]) -> AppResult<Vec<BoundingBox>> {
        let response = self
            .http_client
            .post(format!("{}/faces/detect", self.endpoint))
            .header("x-api-key", &self.api_key)
            .json(&DetectRequest {
                image_base64: BASE64.encode(image),
            })
            .send()
            .await
            .map_err(|e| AppError::FaceService(format!("Request failed: {}", e)))?;

        let parsed: DetectResponse = Self::parse(response).await?;
        Ok(parsed.faces)
    }

    /// Remove an indexed face from the gallery
    pub async fn delete_face(&self, face_id: &str) -> AppResult<()> {
        let response = self
            .http_client
            .delete(format!(
                "{}/collections/{}/faces/{}",
                self.endpoint, self.collection, face_id
            ))
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| AppError::FaceService(format!("Request failed: {}", e)))?;

        let status = response.status();
        // A face the gallery no longer knows is already the desired state
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(Self::classify(status, response.text().await.ok()))
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> AppResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.ok();
            return Err(Self::classify(status, body));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::FaceService(format!("Failed to parse response: {}", e)))
    }

    /// Map a failed service response onto an error kind
    fn classify(status: reqwest::StatusCode, body: Option<String>) -> AppError {
        if let Some(body) = body.as_deref() {
            if let Ok(parsed) = serde_json::from_str::<ServiceError>(body) {
                return match parsed.error.code.as_str() {
                    "NO_FACE" | "NO_FACE_DETECTED" => AppError::NoFaceDetected,
                    "COLLECTION_NOT_FOUND" => AppError::FaceService(format!(
                        "Face collection missing: {}",
                        parsed.error.message
                    )),
                    _ => AppError::FaceService(parsed.error.message),
                };
            }
        }

        AppError::FaceService(format!(
            "API returned {}: {}",
            status,
            body.unwrap_or_else(|| "Unknown error".to_string())
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_face_code_classifies_as_422() {
        let err = FaceClient::classify(
            reqwest::StatusCode::BAD_REQUEST,
            Some(r#"{"error":{"code":"NO_FACE","message":"no face found"}}"#.to_string()),
        );
        assert!(matches!(err, AppError::NoFaceDetected));
    }

    #[test]
    fn test_collection_missing_is_service_error() {
        let err = FaceClient::classify(
            reqwest::StatusCode::NOT_FOUND,
            Some(
                r#"{"error":{"code":"COLLECTION_NOT_FOUND","message":"gone"}}"#.to_string(),
            ),
        );
        match err {
            AppError::FaceService(msg) => assert!(msg.contains("collection missing")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unparseable_body_falls_back_to_status() {
        let err = FaceClient::classify(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            Some("boom".to_string()),
        );
        match err {
            AppError::FaceService(msg) => assert!(msg.contains("500")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
