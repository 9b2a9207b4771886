//! Authentication middleware
//!
//! Token verification and the `AuthUser` request context. Protected routers
//! apply [`authenticate`] first; scope middleware and handlers read the
//! attached [`AuthUser`].

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::types::PrimaryRole;

use crate::error::{AppError, AppResult};
use crate::AppState;

/// JWT claims carried by the access token
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

/// Authenticated user information extracted from the token
#[derive(Clone, Copy, Debug)]
pub struct AuthUser {
    pub user_id: i64,
    pub role: PrimaryRole,
}

/// Sign a token for a user
pub fn issue_token(
    secret: &str,
    user_id: i64,
    role: PrimaryRole,
    expiry_hours: i64,
) -> AppResult<String> {
    let now = Utc::now();
    let claims = Claims {
        user_id,
        role: role.as_str().to_string(),
        exp: (now + Duration::hours(expiry_hours)).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

/// Decode and validate a token, including expiry
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

/// Extract the bearer credential from the request.
///
/// Sources, first non-empty wins: `token` cookie, `Authorization: Bearer`,
/// `x-access-token` header, `token` query parameter.
pub fn extract_token(request: &Request) -> Option<String> {
    let jar = CookieJar::from_headers(request.headers());
    if let Some(cookie) = jar.get("token") {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    if let Some(header) = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some(token) = header.strip_prefix("Bearer ") {
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    if let Some(token) = request
        .headers()
        .get("x-access-token")
        .and_then(|h| h.to_str().ok())
    {
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    if let Some(query) = request.uri().query() {
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("token=") {
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    None
}

/// Authentication middleware that validates tokens on protected routes
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(&request).ok_or(AppError::NoToken)?;

    let claims =
        verify_token(&state.config.jwt.secret, &token).map_err(|_| AppError::InvalidToken)?;

    let auth_user = AuthUser {
        user_id: claims.user_id,
        role: PrimaryRole::parse(&claims.role),
    };

    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

/// Extractor for the authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Copy, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    fn request(builder: axum::http::request::Builder) -> Request {
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_token_roundtrip() {
        let token = issue_token("secret", 42, PrimaryRole::Supervisor, 24).unwrap();
        let claims = verify_token("secret", &token).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.role, "supervisor");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_token("secret", 42, PrimaryRole::Admin, 24).unwrap();
        assert!(verify_token("other-secret", &token).is_err());
    }

    #[test]
    fn test_extract_token_priority() {
        // Cookie wins over header
        let req = request(
            HttpRequest::builder()
                .uri("/api/attendance")
                .header("cookie", "token=from-cookie")
                .header(AUTHORIZATION, "Bearer from-bearer"),
        );
        assert_eq!(extract_token(&req).as_deref(), Some("from-cookie"));

        // Bearer wins over x-access-token
        let req = request(
            HttpRequest::builder()
                .uri("/api/attendance")
                .header(AUTHORIZATION, "Bearer from-bearer")
                .header("x-access-token", "from-legacy"),
        );
        assert_eq!(extract_token(&req).as_deref(), Some("from-bearer"));

        // Fallback header, then query parameter
        let req = request(
            HttpRequest::builder()
                .uri("/api/attendance")
                .header("x-access-token", "from-legacy"),
        );
        assert_eq!(extract_token(&req).as_deref(), Some("from-legacy"));

        let req = request(HttpRequest::builder().uri("/api/attendance?x=1&token=from-query"));
        assert_eq!(extract_token(&req).as_deref(), Some("from-query"));

        let req = request(HttpRequest::builder().uri("/api/attendance"));
        assert_eq!(extract_token(&req), None);
    }

    #[test]
    fn test_empty_sources_skipped() {
        let req = request(
            HttpRequest::builder()
                .uri("/api/attendance?token=from-query")
                .header("cookie", "token=")
                .header(AUTHORIZATION, "Bearer "),
        );
        assert_eq!(extract_token(&req).as_deref(), Some("from-query"));
    }
}
