//! Authentication handlers

use axum::{extract::State, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use time::Duration as CookieDuration;

use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::services::auth::{LoginOutcome, MeResponse};
use crate::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct SupervisorLoginRequest {
    pub emp_code: String,
    pub password: String,
}

fn token_cookie(token: String, expiry_hours: i64) -> Cookie<'static> {
    Cookie::build(("token", token))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .max_age(CookieDuration::hours(expiry_hours))
        .build()
}

/// Login endpoint handler
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<LoginOutcome>)> {
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(AppError::ValidationError(
            "Email and password are required".to_string(),
        ));
    }

    let outcome = state.auth.login(body.email.trim(), &body.password).await?;
    let jar = jar.add(token_cookie(
        outcome.token.clone(),
        state.config.jwt.token_expiry_hours,
    ));

    Ok((jar, Json(outcome)))
}

/// Supervisor login endpoint handler
pub async fn supervisor_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<SupervisorLoginRequest>,
) -> AppResult<(CookieJar, Json<LoginOutcome>)> {
    if body.emp_code.trim().is_empty() || body.password.is_empty() {
        return Err(AppError::ValidationError(
            "Employee code and password are required".to_string(),
        ));
    }

    let outcome = state
        .auth
        .supervisor_login(body.emp_code.trim(), &body.password)
        .await?;
    let jar = jar.add(token_cookie(
        outcome.token.clone(),
        state.config.jwt.token_expiry_hours,
    ));

    Ok((jar, Json(outcome)))
}

/// Current user and access profile
pub async fn me(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<MeResponse>> {
    let response = state.auth.me(&current_user.0).await?;
    Ok(Json(response))
}

/// Logout: clear the token cookie
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<serde_json::Value>) {
    let jar = jar.remove(Cookie::build(("token", "")).path("/").build());
    (jar, Json(serde_json::json!({ "message": "Logged out" })))
}
