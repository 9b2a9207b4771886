//! Scope middleware
//!
//! Runs after [`super::authenticate`] on protected routes: attaches the
//! caller's city scope, gates on non-empty scope, and resolves per-permission
//! scopes for handlers. The permission scope is returned to the handler as a
//! plain value so downstream query builders receive it explicitly.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use shared::models::{permission_key, CityScope};

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::scope as scope_service;
use crate::AppState;

/// The caller's city scope, attached per request
#[derive(Clone, Debug)]
pub struct CityScopeCtx(pub CityScope);

/// Compute and attach the caller's city scope
pub async fn attach_city_scope(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .copied()
        .ok_or_else(|| {
            AppError::Internal("city scope middleware ran before authentication".to_string())
        })?;

    let scope = scope_service::resolve_city_scope(&state.db, &state.permissions, &user)
        .await
        .map_err(|e| {
            tracing::error!(user_id = user.user_id, error = %e, "city scope resolution failed");
            AppError::Internal("unable to resolve city scope".to_string())
        })?;

    request.extensions_mut().insert(CityScopeCtx(scope));

    Ok(next.run(request).await)
}

/// Reject callers whose city scope is neither `all` nor non-empty
pub async fn require_city_scope(request: Request, next: Next) -> Result<Response, AppError> {
    let ctx = request.extensions().get::<CityScopeCtx>().ok_or_else(|| {
        AppError::Internal("scope gate ran before city scope attachment".to_string())
    })?;

    if ctx.0.is_empty() {
        return Err(AppError::NoCityAccess);
    }

    Ok(next.run(request).await)
}

/// Check a `(module, action)` requirement and return that permission's city
/// scope for query narrowing. Admin bypasses with an `all` scope.
pub async fn require_permission(
    state: &AppState,
    user: &AuthUser,
    module: &str,
    action: &str,
) -> AppResult<CityScope> {
    if user.role.is_admin() {
        return Ok(CityScope::all_cities());
    }

    let resolved = state.permissions.resolve(&state.db, user.user_id).await?;
    let key = permission_key(module, action);

    if !resolved.perms.contains(&key) {
        return Err(AppError::Forbidden(format!(
            "Permission denied: requires {}",
            key
        )));
    }

    Ok(resolved.scopes.get(&key).cloned().unwrap_or_default())
}

/// Extractor for the attached city scope
#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CityScopeCtx
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<CityScopeCtx>().cloned().ok_or_else(|| {
            AppError::Internal("handler requires the city scope middleware".to_string())
        })
    }
}
