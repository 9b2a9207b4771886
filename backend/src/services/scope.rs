//! City and zone scope resolution
//!
//! A user's city scope is `all` for admins and for holders of any
//! `city:view` permission with a null city; otherwise it is the union of
//! explicit `user_city_access` grants and city-qualified `city:view` user
//! permissions. Zone scope is the plain union of `user_zone_access` grants.

use std::collections::BTreeSet;

use shared::models::CityScope;
use sqlx::PgPool;

use crate::error::AppResult;
use crate::middleware::AuthUser;
use crate::services::permission::PermissionResolver;

/// Resolve the caller's overall city scope
pub async fn resolve_city_scope(
    db: &PgPool,
    resolver: &PermissionResolver,
    user: &AuthUser,
) -> AppResult<CityScope> {
    if user.role.is_admin() {
        return Ok(CityScope::all_cities());
    }

    let resolved = resolver.resolve(db, user.user_id).await?;

    let city_view = resolved.scopes.get("city:view");
    if city_view.map(|s| s.all).unwrap_or(false) {
        return Ok(CityScope::all_cities());
    }

    let mut cities: BTreeSet<i64> = city_view
        .map(|s| s.cities.iter().copied().collect())
        .unwrap_or_default();

    let grants = sqlx::query_scalar::<_, i64>(
        "SELECT city_id FROM user_city_access WHERE user_id = $1",
    )
    .bind(user.user_id)
    .fetch_all(db)
    .await?;
    cities.extend(grants);

    Ok(CityScope {
        all: false,
        cities: cities.into_iter().collect(),
    })
}

/// Resolve the caller's zone scope (explicit grants only)
pub async fn resolve_zone_scope(db: &PgPool, user_id: i64) -> AppResult<Vec<i64>> {
    let zones = sqlx::query_scalar::<_, i64>(
        "SELECT zone_id FROM user_zone_access WHERE user_id = $1 ORDER BY zone_id",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    Ok(zones)
}
