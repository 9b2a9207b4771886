//! Permission resolution with a versioned in-process cache
//!
//! A user's effective permissions are the union of their roles' permissions
//! (unscoped, i.e. all cities) and direct grants (optionally qualified by a
//! city). Results are memoised under `(user_id, version)`; every RBAC write
//! bumps the version so later lookups miss the stale entries. The counter is
//! per process: in a multi-replica deployment each replica converges on its
//! own schedule, an accepted trade-off.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use shared::models::{permission_key, CityScope};
use sqlx::PgPool;

use crate::error::AppResult;

/// Entry count above which stale generations are swept on insert
const SWEEP_THRESHOLD: usize = 1024;

/// A user's effective permissions and per-permission city scopes
#[derive(Debug, Default, Clone)]
pub struct ResolvedPermissions {
    /// Canonical `module:action` keys
    pub perms: HashSet<String>,
    /// City scope per permission key
    pub scopes: HashMap<String, CityScope>,
}

impl ResolvedPermissions {
    pub fn has(&self, module: &str, action: &str) -> bool {
        self.perms.contains(&permission_key(module, action))
    }
}

/// One source row feeding the resolver: a role-derived permission
/// (`city_id = None`) or a direct user grant
#[derive(Debug, sqlx::FromRow)]
pub struct PermissionRow {
    pub module: String,
    pub action: String,
    pub city_id: Option<i64>,
}

/// Merge source rows into the effective permission set.
///
/// For each `(module, action)` key a single null-city row collapses the
/// scope to `all`; otherwise the scope is the union of the city ids.
pub fn merge_permission_rows(rows: impl IntoIterator<Item = PermissionRow>) -> ResolvedPermissions {
    let mut perms = HashSet::new();
    let mut sets: HashMap<String, (bool, BTreeSet<i64>)> = HashMap::new();

    for row in rows {
        let key = permission_key(&row.module, &row.action);
        let entry = sets.entry(key.clone()).or_default();
        match row.city_id {
            None => entry.0 = true,
            Some(city_id) => {
                entry.1.insert(city_id);
            }
        }
        perms.insert(key);
    }

    let scopes = sets
        .into_iter()
        .map(|(key, (all, cities))| {
            let scope = if all {
                CityScope::all_cities()
            } else {
                CityScope {
                    all: false,
                    cities: cities.into_iter().collect(),
                }
            };
            (key, scope)
        })
        .collect();

    ResolvedPermissions { perms, scopes }
}

/// Memoising permission resolver shared across requests
#[derive(Clone)]
pub struct PermissionResolver {
    cache: Arc<DashMap<(i64, u64), Arc<ResolvedPermissions>>>,
    version: Arc<AtomicU64>,
}

impl Default for PermissionResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionResolver {
    pub fn new() -> Self {
        Self {
            cache: Arc::new(DashMap::new()),
            version: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current cache generation
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Invalidate all cached lookups; called after any RBAC write
    pub fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Resolve a user's effective permissions, memoised under the current
    /// version. Database errors propagate and are never cached.
    pub async fn resolve(
        &self,
        db: &PgPool,
        user_id: i64,
    ) -> AppResult<Arc<ResolvedPermissions>> {
        let version = self.version();
        if let Some(hit) = self.cache.get(&(user_id, version)) {
            return Ok(hit.value().clone());
        }

        let rows = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT p.module, p.action, NULL::BIGINT AS city_id
            FROM user_roles ur
            JOIN role_permissions rp ON rp.role_id = ur.role_id
            JOIN permissions p ON p.id = rp.permission_id
            WHERE ur.user_id = $1
            UNION ALL
            SELECT p.module, p.action, up.city_id
            FROM user_permissions up
            JOIN permissions p ON p.id = up.permission_id
            WHERE up.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;

        let resolved = Arc::new(merge_permission_rows(rows));

        // Growth pressure reclaims entries from dead generations
        if self.cache.len() >= SWEEP_THRESHOLD {
            self.cache.retain(|&(_, v), _| v == version);
        }
        self.cache.insert((user_id, version), resolved.clone());

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(module: &str, action: &str, city_id: Option<i64>) -> PermissionRow {
        PermissionRow {
            module: module.to_string(),
            action: action.to_string(),
            city_id,
        }
    }

    #[test]
    fn test_merge_role_rows_grant_all() {
        let resolved = merge_permission_rows(vec![row("attendance", "view", None)]);
        assert!(resolved.has("attendance", "view"));
        let scope = &resolved.scopes["attendance:view"];
        assert!(scope.all);
        assert!(scope.cities.is_empty());
    }

    #[test]
    fn test_merge_unions_city_ids() {
        let resolved = merge_permission_rows(vec![
            row("city", "view", Some(2)),
            row("city", "view", Some(5)),
            row("city", "view", Some(2)),
        ]);
        let scope = &resolved.scopes["city:view"];
        assert!(!scope.all);
        assert_eq!(scope.cities, vec![2, 5]);
    }

    #[test]
    fn test_null_city_collapses_to_all() {
        let resolved = merge_permission_rows(vec![
            row("city", "view", Some(2)),
            row("city", "view", None),
            row("city", "view", Some(5)),
        ]);
        let scope = &resolved.scopes["city:view"];
        assert!(scope.all);
    }

    #[test]
    fn test_merge_normalises_key_case() {
        let resolved = merge_permission_rows(vec![
            row("City", "View", Some(2)),
            row("city", "view", Some(5)),
        ]);
        assert_eq!(resolved.scopes.len(), 1);
        assert_eq!(resolved.scopes["city:view"].cities, vec![2, 5]);
    }

    #[test]
    fn test_distinct_permissions_do_not_interfere() {
        let resolved = merge_permission_rows(vec![
            row("city", "view", None),
            row("zone", "view", Some(3)),
        ]);
        assert!(resolved.scopes["city:view"].all);
        assert!(!resolved.scopes["zone:view"].all);
        assert_eq!(resolved.scopes["zone:view"].cities, vec![3]);
    }

    #[test]
    fn test_version_bump_changes_generation() {
        let resolver = PermissionResolver::new();
        let before = resolver.version();
        resolver.bump_version();
        assert_eq!(resolver.version(), before + 1);
    }
}
