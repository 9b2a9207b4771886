//! Authentication service: credential checks, token issue, and the
//! current-user access profile

use serde::Serialize;
use shared::models::{AccessProfile, CityScope};
use shared::types::PrimaryRole;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{issue_token, AuthUser};
use crate::services::permission::PermissionResolver;
use crate::services::scope;

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: PgPool,
    permissions: PermissionResolver,
    jwt_secret: String,
    token_expiry_hours: i64,
}

/// User info from database
#[derive(Debug, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub emp_code: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub primary_role: String,
    pub department: Option<String>,
    pub password_hash: String,
}

/// Profile embedded in login and `/auth/me` responses
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    pub emp_code: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub primary_role: PrimaryRole,
    pub department: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

/// Successful login payload
#[derive(Debug, Serialize)]
pub struct LoginOutcome {
    pub token: String,
    pub user: UserProfile,
}

/// `/auth/me` payload
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserProfile,
    pub access: AccessProfile,
}

impl AuthService {
    pub fn new(db: PgPool, permissions: PermissionResolver, config: &Config) -> Self {
        Self {
            db,
            permissions,
            jwt_secret: config.jwt.secret.clone(),
            token_expiry_hours: config.jwt.token_expiry_hours,
        }
    }

    /// Authenticate by email and password
    pub async fn login(&self, email: &str, password: &str) -> AppResult<LoginOutcome> {
        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, emp_code, email, phone, primary_role, department, password_hash
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".to_string()))?;

        self.finish_login(user, "Invalid email or password", password)
            .await
    }

    /// Authenticate a supervisor by employee code and password
    pub async fn supervisor_login(&self, emp_code: &str, password: &str) -> AppResult<LoginOutcome> {
        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, emp_code, email, phone, primary_role, department, password_hash
            FROM users
            WHERE emp_code = $1
            "#,
        )
        .bind(emp_code)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid employee code or password".to_string()))?;

        let role = PrimaryRole::parse(&user.primary_role);
        if !matches!(role, PrimaryRole::Supervisor | PrimaryRole::Admin) {
            return Err(AppError::Unauthorized(
                "Not a supervisor account".to_string(),
            ));
        }

        self.finish_login(user, "Invalid employee code or password", password)
            .await
    }

    async fn finish_login(
        &self,
        user: UserRow,
        bad_credentials: &str,
        password: &str,
    ) -> AppResult<LoginOutcome> {
        let valid = bcrypt::verify(password, &user.password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;

        if !valid {
            return Err(AppError::Unauthorized(bad_credentials.to_string()));
        }

        let role = PrimaryRole::parse(&user.primary_role);
        let token = issue_token(&self.jwt_secret, user.id, role, self.token_expiry_hours)?;
        let profile = self.build_profile(user).await?;

        Ok(LoginOutcome {
            token,
            user: profile,
        })
    }

    /// Current user and access profile for `/auth/me`
    pub async fn me(&self, auth: &AuthUser) -> AppResult<MeResponse> {
        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, emp_code, email, phone, primary_role, department, password_hash
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(auth.user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        let city_scope = if auth.role.is_admin() {
            CityScope::all_cities()
        } else {
            scope::resolve_city_scope(&self.db, &self.permissions, auth).await?
        };
        let zone_ids = scope::resolve_zone_scope(&self.db, auth.user_id).await?;

        let profile = self.build_profile(user).await?;
        let access = AccessProfile {
            roles: profile.roles.clone(),
            permissions: profile.permissions.clone(),
            city_scope,
            zone_ids,
        };

        Ok(MeResponse {
            user: profile,
            access,
        })
    }

    async fn build_profile(&self, user: UserRow) -> AppResult<UserProfile> {
        let roles = sqlx::query_scalar::<_, String>(
            r#"
            SELECT r.name
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(user.id)
        .fetch_all(&self.db)
        .await?;

        let resolved = self.permissions.resolve(&self.db, user.id).await?;
        let mut permissions: Vec<String> = resolved.perms.iter().cloned().collect();
        permissions.sort();

        Ok(UserProfile {
            id: user.id,
            name: user.name,
            emp_code: user.emp_code,
            email: user.email,
            phone: user.phone,
            primary_role: PrimaryRole::parse(&user.primary_role),
            department: user.department,
            roles,
            permissions,
        })
    }
}
