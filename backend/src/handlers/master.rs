//! HTTP handlers for master-data lookups

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use shared::models::{City, Department, Designation, Ward, Zone};

use crate::error::AppResult;
use crate::middleware::{require_permission, CityScopeCtx, CurrentUser};
use crate::AppState;

#[derive(Deserialize)]
pub struct ZoneQuery {
    pub city_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct WardQuery {
    pub zone_id: Option<i64>,
}

/// Cities visible to the caller
pub async fn list_cities(
    State(state): State<AppState>,
    current_user: CurrentUser,
    scope: CityScopeCtx,
) -> AppResult<Json<Vec<City>>> {
    let perm_scope = require_permission(&state, &current_user.0, "city", "view").await?;
    let effective = scope.0.intersect(&perm_scope);
    Ok(Json(state.master.list_cities(&effective).await?))
}

/// Zones visible to the caller, optionally within one city
pub async fn list_zones(
    State(state): State<AppState>,
    current_user: CurrentUser,
    scope: CityScopeCtx,
    Query(query): Query<ZoneQuery>,
) -> AppResult<Json<Vec<Zone>>> {
    let perm_scope = require_permission(&state, &current_user.0, "zone", "view").await?;
    let effective = scope.0.intersect(&perm_scope);
    Ok(Json(state.master.list_zones(query.city_id, &effective).await?))
}

/// Wards visible to the caller, optionally within one zone
pub async fn list_wards(
    State(state): State<AppState>,
    current_user: CurrentUser,
    scope: CityScopeCtx,
    Query(query): Query<WardQuery>,
) -> AppResult<Json<Vec<Ward>>> {
    let perm_scope = require_permission(&state, &current_user.0, "ward", "view").await?;
    let effective = scope.0.intersect(&perm_scope);
    Ok(Json(state.master.list_wards(query.zone_id, &effective).await?))
}

pub async fn list_departments(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<Department>>> {
    require_permission(&state, &current_user.0, "department", "view").await?;
    Ok(Json(state.master.list_departments().await?))
}

pub async fn list_designations(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<Designation>>> {
    require_permission(&state, &current_user.0, "designation", "view").await?;
    Ok(Json(state.master.list_designations().await?))
}
