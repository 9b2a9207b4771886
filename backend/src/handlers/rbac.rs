//! HTTP handlers for role, permission, and user-access administration

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use shared::models::Permission;

use crate::error::{AppError, AppResult};
use crate::middleware::{AuthUser, CurrentUser};
use crate::services::rbac::{
    self, CreatePermissionInput, CreateRoleInput, RoleWithPermissions, UpdatePermissionInput,
    UpdateRoleInput, UpdateUserAccessInput, UserListRow,
};
use crate::AppState;

/// RBAC administration requires admin or `permissions:manage`
async fn require_rbac_admin(state: &AppState, user: &AuthUser) -> AppResult<()> {
    if user.role.is_admin() {
        return Ok(());
    }
    let resolved = state.permissions.resolve(&state.db, user.user_id).await?;
    if rbac::can_manage(user.role, &resolved) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Permission denied: requires permissions:manage".to_string(),
        ))
    }
}

pub async fn list_permissions(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<Permission>>> {
    require_rbac_admin(&state, &current_user.0).await?;
    Ok(Json(state.rbac.list_permissions().await?))
}

pub async fn create_permission(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreatePermissionInput>,
) -> AppResult<(StatusCode, Json<Permission>)> {
    require_rbac_admin(&state, &current_user.0).await?;
    let permission = state.rbac.create_permission(input).await?;
    Ok((StatusCode::CREATED, Json(permission)))
}

pub async fn update_permission(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(permission_id): Path<i64>,
    Json(input): Json<UpdatePermissionInput>,
) -> AppResult<Json<Permission>> {
    require_rbac_admin(&state, &current_user.0).await?;
    Ok(Json(state.rbac.update_permission(permission_id, input).await?))
}

pub async fn delete_permission(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(permission_id): Path<i64>,
) -> AppResult<StatusCode> {
    require_rbac_admin(&state, &current_user.0).await?;
    state.rbac.delete_permission(permission_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_roles(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<RoleWithPermissions>>> {
    require_rbac_admin(&state, &current_user.0).await?;
    Ok(Json(state.rbac.list_roles().await?))
}

pub async fn get_role(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(role_id): Path<i64>,
) -> AppResult<Json<RoleWithPermissions>> {
    require_rbac_admin(&state, &current_user.0).await?;
    Ok(Json(state.rbac.get_role(role_id).await?))
}

pub async fn create_role(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateRoleInput>,
) -> AppResult<(StatusCode, Json<RoleWithPermissions>)> {
    require_rbac_admin(&state, &current_user.0).await?;
    let role = state.rbac.create_role(input).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

pub async fn update_role(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(role_id): Path<i64>,
    Json(input): Json<UpdateRoleInput>,
) -> AppResult<Json<RoleWithPermissions>> {
    require_rbac_admin(&state, &current_user.0).await?;
    Ok(Json(state.rbac.update_role(role_id, input).await?))
}

pub async fn delete_role(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(role_id): Path<i64>,
) -> AppResult<StatusCode> {
    require_rbac_admin(&state, &current_user.0).await?;
    state.rbac.delete_role(role_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_users(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<UserListRow>>> {
    require_rbac_admin(&state, &current_user.0).await?;
    Ok(Json(state.rbac.list_users().await?))
}

pub async fn update_user_access(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(user_id): Path<i64>,
    Json(input): Json<UpdateUserAccessInput>,
) -> AppResult<Json<serde_json::Value>> {
    require_rbac_admin(&state, &current_user.0).await?;
    state
        .rbac
        .update_user_access(user_id, input, current_user.0.user_id)
        .await?;
    Ok(Json(serde_json::json!({ "message": "Access updated" })))
}
