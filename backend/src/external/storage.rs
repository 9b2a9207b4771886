//! Object storage backends and the stored-reference router
//!
//! Attendance and enrolment images are written through the primary backend
//! (S3 or local filesystem). Reads also serve legacy references: paths under
//! `uploads/` from the old on-disk layout, `archive:` keys held by the
//! secondary HTTP object store, and absolute URLs proxied from external
//! origins.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use reqwest::Client;
use serde::Deserialize;
use tokio::fs;
use tokio::sync::Mutex;

use crate::config::StorageConfig;
use crate::error::{AppError, AppResult};

/// Fallback content type for stored images
pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// Secondary-store tokens are refreshed after this long even without a 401
const SECONDARY_TOKEN_TTL: Duration = Duration::from_secs(25 * 60);

/// An object fetched from any backend
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> AppResult<()>;
    async fn get(&self, key: &str) -> AppResult<StoredObject>;
}

fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

// ---------------------------------------------------------------------------
// Local filesystem backend
// ---------------------------------------------------------------------------

pub struct LocalStore {
    base_path: PathBuf,
}

impl LocalStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(&self, key: &str, data: Vec<u8>, _content_type: &str) -> AppResult<()> {
        let path = self.base_path.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("mkdir failed: {}", e)))?;
        }
        fs::write(path, data)
            .await
            .map_err(|e| AppError::Storage(format!("write failed: {}", e)))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<StoredObject> {
        let path = self.base_path.join(key);
        let bytes = fs::read(&path)
            .await
            .map_err(|_| AppError::NotFound("Image".to_string()))?;
        Ok(StoredObject {
            bytes,
            content_type: content_type_for(key).to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Primary S3 backend
// ---------------------------------------------------------------------------

pub struct S3Store {
    client: S3Client,
    bucket: String,
}

impl S3Store {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> AppResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 upload failed: {}", e)))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<StoredObject> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 download failed: {}", e)))?;

        let content_type = output
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| AppError::Storage(format!("S3 body collection failed: {}", e)))?
            .into_bytes()
            .to_vec();

        Ok(StoredObject {
            bytes,
            content_type,
        })
    }
}

// ---------------------------------------------------------------------------
// Secondary HTTP object store (token-authenticated)
// ---------------------------------------------------------------------------

struct CachedToken {
    value: String,
    acquired_at: Instant,
}

pub struct SecondaryStore {
    endpoint: String,
    username: String,
    password: String,
    http_client: Client,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

impl SecondaryStore {
    pub fn new(endpoint: &str, username: &str, password: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            http_client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            token: Mutex::new(None),
        }
    }

    /// Cached auth token, renewed when absent, expired, or force-refreshed
    async fn auth_token(&self, force_refresh: bool) -> AppResult<String> {
        let mut guard = self.token.lock().await;

        if !force_refresh {
            if let Some(cached) = guard.as_ref() {
                if cached.acquired_at.elapsed() < SECONDARY_TOKEN_TTL {
                    return Ok(cached.value.clone());
                }
            }
        }

        let response = self
            .http_client
            .post(format!("{}/auth/token", self.endpoint))
            .json(&serde_json::json!({
                "username": self.username,
                "password": self.password,
            }))
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("secondary auth failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Storage(format!(
                "secondary auth returned {}",
                response.status()
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Storage(format!("secondary auth parse failed: {}", e)))?;

        let value = parsed.token.clone();
        *guard = Some(CachedToken {
            value: parsed.token,
            acquired_at: Instant::now(),
        });
        Ok(value)
    }

    async fn get_with_token(&self, key: &str, token: &str) -> AppResult<reqwest::Response> {
        self.http_client
            .get(format!("{}/objects/{}", self.endpoint, key))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("secondary download failed: {}", e)))
    }
}

#[async_trait]
impl ObjectStore for SecondaryStore {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> AppResult<()> {
        let token = self.auth_token(false).await?;
        let response = self
            .http_client
            .put(format!("{}/objects/{}", self.endpoint, key))
            .bearer_auth(token)
            .header("content-type", content_type.to_string())
            .body(data)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("secondary upload failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Storage(format!(
                "secondary upload returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<StoredObject> {
        let token = self.auth_token(false).await?;
        let mut response = self.get_with_token(key, &token).await?;

        // A rejected token means it expired early; refresh once and retry
        if matches!(
            response.status(),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN
        ) {
            let token = self.auth_token(true).await?;
            response = self.get_with_token(key, &token).await?;
        }

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound("Image".to_string()));
        }
        if !response.status().is_success() {
            return Err(AppError::Storage(format!(
                "secondary download returned {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|h| h.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Storage(format!("secondary body read failed: {}", e)))?
            .to_vec();

        Ok(StoredObject {
            bytes,
            content_type,
        })
    }
}

// ---------------------------------------------------------------------------
// Reference router
// ---------------------------------------------------------------------------

/// Where a stored reference resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Primary,
    Secondary,
    ExternalHttp,
}

/// Classify a stored reference
pub fn classify(reference: &str) -> BackendKind {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        BackendKind::ExternalHttp
    } else if reference.starts_with("archive:") {
        BackendKind::Secondary
    } else if reference.starts_with("uploads/") {
        BackendKind::Local
    } else {
        BackendKind::Primary
    }
}

/// Routes stored references to the owning backend
pub struct StorageRouter {
    primary: Box<dyn ObjectStore>,
    local: LocalStore,
    secondary: Option<SecondaryStore>,
    http_client: Client,
}

impl StorageRouter {
    /// Build from configuration; the S3 client is only constructed when the
    /// primary backend is `s3`
    pub async fn from_config(config: &StorageConfig) -> AppResult<Self> {
        let primary: Box<dyn ObjectStore> = if config.backend == "s3" {
            if config.s3_bucket.is_empty() {
                return Err(AppError::Configuration(
                    "storage.s3_bucket is required for the s3 backend".to_string(),
                ));
            }
            let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .load()
                .await;
            Box::new(S3Store::new(
                S3Client::new(&aws_config),
                config.s3_bucket.clone(),
            ))
        } else {
            Box::new(LocalStore::new(&config.local_dir))
        };

        let secondary = (!config.secondary_endpoint.is_empty()).then(|| {
            SecondaryStore::new(
                &config.secondary_endpoint,
                &config.secondary_username,
                &config.secondary_password,
            )
        });

        Ok(Self {
            primary,
            local: LocalStore::new(&config.local_dir),
            secondary,
            http_client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
        })
    }

    /// Store an image through the primary backend; the key is the reference
    pub async fn store(&self, key: &str, data: Vec<u8>, content_type: &str) -> AppResult<String> {
        self.primary.put(key, data, content_type).await?;
        Ok(key.to_string())
    }

    /// Fetch a stored reference from whichever backend owns it
    pub async fn fetch(&self, reference: &str) -> AppResult<StoredObject> {
        match classify(reference) {
            BackendKind::Primary => self.primary.get(reference).await,
            BackendKind::Local => {
                let key = reference.strip_prefix("uploads/").unwrap_or(reference);
                self.local.get(key).await
            }
            BackendKind::Secondary => {
                let key = reference.strip_prefix("archive:").unwrap_or(reference);
                let secondary = self.secondary.as_ref().ok_or_else(|| {
                    AppError::Configuration("secondary object store not configured".to_string())
                })?;
                secondary.get(key).await
            }
            BackendKind::ExternalHttp => {
                let response = self
                    .http_client
                    .get(reference)
                    .send()
                    .await
                    .map_err(|e| AppError::Storage(format!("external fetch failed: {}", e)))?;

                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    return Err(AppError::NotFound("Image".to_string()));
                }
                if !response.status().is_success() {
                    return Err(AppError::Storage(format!(
                        "external origin returned {}",
                        response.status()
                    )));
                }

                let content_type = response
                    .headers()
                    .get("content-type")
                    .and_then(|h| h.to_str().ok())
                    .unwrap_or(DEFAULT_CONTENT_TYPE)
                    .to_string();
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| AppError::Storage(format!("external body read failed: {}", e)))?
                    .to_vec();

                Ok(StoredObject {
                    bytes,
                    content_type,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_external_urls() {
        assert_eq!(
            classify("https://cdn.example.com/a/b.jpg"),
            BackendKind::ExternalHttp
        );
        assert_eq!(classify("http://old-host/x.jpg"), BackendKind::ExternalHttp);
    }

    #[test]
    fn test_classify_secondary_and_local() {
        assert_eq!(classify("archive:2019/old.jpg"), BackendKind::Secondary);
        assert_eq!(classify("uploads/2021/06/x.jpg"), BackendKind::Local);
    }

    #[test]
    fn test_classify_plain_keys_to_primary() {
        assert_eq!(
            classify("2023/06/14/ravi-kumar/ward-12/in_20230614-091502_ward-12.jpg"),
            BackendKind::Primary
        );
    }

    #[test]
    fn test_content_type_guess() {
        assert_eq!(content_type_for("a/b/c.png"), "image/png");
        assert_eq!(content_type_for("a/b/c.webp"), "image/webp");
        assert_eq!(content_type_for("a/b/c.jpg"), "image/jpeg");
        assert_eq!(content_type_for("noext"), "image/jpeg");
    }
}
