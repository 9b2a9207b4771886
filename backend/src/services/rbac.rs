//! Role, permission, and user-access administration
//!
//! All writes here invalidate the permission resolver cache by bumping its
//! version counter.

use serde::{Deserialize, Serialize};
use shared::models::{Permission, Role};
use shared::types::PrimaryRole;
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::services::permission::PermissionResolver;

/// Reserved names for seeded roles
const SYSTEM_ROLE_NAMES: &[&str] = &["admin", "supervisor", "manager", "operator", "user"];

/// RBAC administration service
#[derive(Clone)]
pub struct RbacService {
    db: PgPool,
    permissions: PermissionResolver,
}

/// Input for creating a permission
#[derive(Debug, Deserialize)]
pub struct CreatePermissionInput {
    pub module: String,
    pub action: String,
    pub label: Option<String>,
    pub description: Option<String>,
}

/// Input for updating a permission's metadata
#[derive(Debug, Deserialize)]
pub struct UpdatePermissionInput {
    pub label: Option<String>,
    pub description: Option<String>,
}

/// Input for creating a custom role
#[derive(Debug, Deserialize)]
pub struct CreateRoleInput {
    pub name: String,
    pub description: Option<String>,
    pub permission_ids: Vec<i64>,
}

/// Input for updating a custom role
#[derive(Debug, Deserialize)]
pub struct UpdateRoleInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permission_ids: Option<Vec<i64>>,
}

/// Role with its permissions
#[derive(Debug, Serialize)]
pub struct RoleWithPermissions {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<Permission>,
}

/// A direct permission grant, optionally qualified by city
#[derive(Debug, Deserialize)]
pub struct DirectPermissionGrant {
    pub permission_id: i64,
    pub city_id: Option<i64>,
}

/// Input for replacing a user's access assignments; omitted fields are left
/// untouched
#[derive(Debug, Deserialize)]
pub struct UpdateUserAccessInput {
    pub role_ids: Option<Vec<i64>>,
    pub permissions: Option<Vec<DirectPermissionGrant>>,
    pub city_ids: Option<Vec<i64>>,
    pub zone_ids: Option<Vec<i64>>,
}

/// User listing row with assigned role names
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct UserListRow {
    pub id: i64,
    pub name: String,
    pub emp_code: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub primary_role: String,
    pub department: Option<String>,
    pub roles: Vec<String>,
}

#[derive(sqlx::FromRow)]
struct RoleRow {
    id: i64,
    name: String,
    description: Option<String>,
    is_system: bool,
}

impl From<RoleRow> for Role {
    fn from(r: RoleRow) -> Self {
        Role {
            id: r.id,
            name: r.name,
            description: r.description,
            is_system: r.is_system,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PermissionRow {
    id: i64,
    module: String,
    action: String,
    label: Option<String>,
    description: Option<String>,
}

impl From<PermissionRow> for Permission {
    fn from(p: PermissionRow) -> Self {
        Permission {
            id: p.id,
            module: p.module,
            action: p.action,
            label: p.label,
            description: p.description,
        }
    }
}

impl RbacService {
    pub fn new(db: PgPool, permissions: PermissionResolver) -> Self {
        Self { db, permissions }
    }

    // ------------------------------------------------------------------
    // Permissions
    // ------------------------------------------------------------------

    pub async fn list_permissions(&self) -> AppResult<Vec<Permission>> {
        let rows = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT id, module, action, label, description
            FROM permissions
            ORDER BY module, action
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Permission::from).collect())
    }

    pub async fn create_permission(&self, input: CreatePermissionInput) -> AppResult<Permission> {
        let module = input.module.trim().to_ascii_lowercase();
        let action = input.action.trim().to_ascii_lowercase();

        if module.is_empty() || action.is_empty() {
            return Err(AppError::Validation {
                field: "module".to_string(),
                message: "Module and action are required".to_string(),
            });
        }

        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM permissions WHERE module = $1 AND action = $2",
        )
        .bind(&module)
        .bind(&action)
        .fetch_one(&self.db)
        .await?;

        if existing > 0 {
            return Err(AppError::Conflict {
                resource: "permission".to_string(),
                message: format!("Permission {}:{} already exists", module, action),
            });
        }

        let row = sqlx::query_as::<_, PermissionRow>(
            r#"
            INSERT INTO permissions (module, action, label, description)
            VALUES ($1, $2, $3, $4)
            RETURNING id, module, action, label, description
            "#,
        )
        .bind(&module)
        .bind(&action)
        .bind(&input.label)
        .bind(&input.description)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            // A concurrent create can slip past the pre-check
            map_unique(e.into(), "permission", "Permission already exists")
        })?;

        self.permissions.bump_version();
        Ok(row.into())
    }

    pub async fn update_permission(
        &self,
        permission_id: i64,
        input: UpdatePermissionInput,
    ) -> AppResult<Permission> {
        let row = sqlx::query_as::<_, PermissionRow>(
            r#"
            UPDATE permissions
            SET label = COALESCE($1, label), description = COALESCE($2, description)
            WHERE id = $3
            RETURNING id, module, action, label, description
            "#,
        )
        .bind(&input.label)
        .bind(&input.description)
        .bind(permission_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Permission".to_string()))?;

        self.permissions.bump_version();
        Ok(row.into())
    }

    pub async fn delete_permission(&self, permission_id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(permission_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Permission".to_string()));
        }

        self.permissions.bump_version();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    pub async fn list_roles(&self) -> AppResult<Vec<RoleWithPermissions>> {
        let roles = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, name, description, is_system
            FROM roles
            ORDER BY is_system DESC, name ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut out = Vec::with_capacity(roles.len());
        for role in roles {
            let permissions = self.role_permissions(role.id).await?;
            out.push(RoleWithPermissions {
                role: role.into(),
                permissions,
            });
        }
        Ok(out)
    }

    pub async fn get_role(&self, role_id: i64) -> AppResult<RoleWithPermissions> {
        let role = sqlx::query_as::<_, RoleRow>(
            "SELECT id, name, description, is_system FROM roles WHERE id = $1",
        )
        .bind(role_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Role".to_string()))?;

        let permissions = self.role_permissions(role.id).await?;
        Ok(RoleWithPermissions {
            role: role.into(),
            permissions,
        })
    }

    async fn role_permissions(&self, role_id: i64) -> AppResult<Vec<Permission>> {
        let rows = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT p.id, p.module, p.action, p.label, p.description
            FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = $1
            ORDER BY p.module, p.action
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Permission::from).collect())
    }

    pub async fn create_role(&self, input: CreateRoleInput) -> AppResult<RoleWithPermissions> {
        let name = input.name.trim().to_string();
        if SYSTEM_ROLE_NAMES.contains(&name.to_lowercase().as_str()) {
            return Err(AppError::Validation {
                field: "name".to_string(),
                message: "Cannot use reserved role name".to_string(),
            });
        }

        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM roles WHERE LOWER(name) = LOWER($1)",
        )
        .bind(&name)
        .fetch_one(&self.db)
        .await?;

        if existing > 0 {
            return Err(AppError::Conflict {
                resource: "role".to_string(),
                message: "Role with this name already exists".to_string(),
            });
        }

        self.check_permission_ids(&input.permission_ids).await?;

        let mut tx = self.db.begin().await?;

        let role_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO roles (name, description, is_system)
            VALUES ($1, $2, FALSE)
            RETURNING id
            "#,
        )
        .bind(&name)
        .bind(&input.description)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique(e.into(), "role", "Role with this name already exists"))?;

        for permission_id in &input.permission_ids {
            sqlx::query("INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2)")
                .bind(role_id)
                .bind(permission_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.permissions.bump_version();
        self.get_role(role_id).await
    }

    pub async fn update_role(
        &self,
        role_id: i64,
        input: UpdateRoleInput,
    ) -> AppResult<RoleWithPermissions> {
        let existing = sqlx::query_as::<_, RoleRow>(
            "SELECT id, name, description, is_system FROM roles WHERE id = $1",
        )
        .bind(role_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Role".to_string()))?;

        if existing.is_system {
            return Err(AppError::Validation {
                field: "role_id".to_string(),
                message: "System roles cannot be edited".to_string(),
            });
        }

        if let Some(ref name) = input.name {
            if SYSTEM_ROLE_NAMES.contains(&name.trim().to_lowercase().as_str()) {
                return Err(AppError::Validation {
                    field: "name".to_string(),
                    message: "Cannot use reserved role name".to_string(),
                });
            }

            let duplicate = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM roles WHERE LOWER(name) = LOWER($1) AND id != $2",
            )
            .bind(name.trim())
            .bind(role_id)
            .fetch_one(&self.db)
            .await?;

            if duplicate > 0 {
                return Err(AppError::Conflict {
                    resource: "role".to_string(),
                    message: "Role with this name already exists".to_string(),
                });
            }
        }

        if let Some(ref permission_ids) = input.permission_ids {
            self.check_permission_ids(permission_ids).await?;
        }

        let mut tx = self.db.begin().await?;

        let name = input.name.map(|n| n.trim().to_string()).unwrap_or(existing.name);
        let description = input.description.or(existing.description);

        sqlx::query("UPDATE roles SET name = $1, description = $2 WHERE id = $3")
            .bind(&name)
            .bind(&description)
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        if let Some(permission_ids) = input.permission_ids {
            sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
                .bind(role_id)
                .execute(&mut *tx)
                .await?;

            for permission_id in &permission_ids {
                sqlx::query(
                    "INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2)",
                )
                .bind(role_id)
                .bind(permission_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        self.permissions.bump_version();
        self.get_role(role_id).await
    }

    pub async fn delete_role(&self, role_id: i64) -> AppResult<()> {
        let role = sqlx::query_as::<_, RoleRow>(
            "SELECT id, name, description, is_system FROM roles WHERE id = $1",
        )
        .bind(role_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Role".to_string()))?;

        if role.is_system {
            return Err(AppError::Validation {
                field: "role_id".to_string(),
                message: "System roles cannot be deleted".to_string(),
            });
        }

        // FK cascades drop role_permissions and user_roles edges
        sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(role_id)
            .execute(&self.db)
            .await?;

        self.permissions.bump_version();
        Ok(())
    }

    async fn check_permission_ids(&self, permission_ids: &[i64]) -> AppResult<()> {
        if permission_ids.is_empty() {
            return Ok(());
        }

        let valid_count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM permissions WHERE id = ANY($1)",
        )
        .bind(permission_ids)
        .fetch_one(&self.db)
        .await?;

        if valid_count != permission_ids.len() as i64 {
            return Err(AppError::Validation {
                field: "permission_ids".to_string(),
                message: "One or more permission IDs are invalid".to_string(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub async fn list_users(&self) -> AppResult<Vec<UserListRow>> {
        let users = sqlx::query_as::<_, UserListRow>(
            r#"
            SELECT u.id, u.name, u.emp_code, u.email, u.phone, u.primary_role, u.department,
                   COALESCE(
                       ARRAY_AGG(r.name ORDER BY r.name) FILTER (WHERE r.name IS NOT NULL),
                       '{}'
                   ) AS roles
            FROM users u
            LEFT JOIN user_roles ur ON ur.user_id = u.id
            LEFT JOIN roles r ON r.id = ur.role_id
            GROUP BY u.id
            ORDER BY u.name
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(users)
    }

    /// Replace a user's role, direct-permission, and city/zone assignments.
    /// Provided sets replace in full; omitted sets are untouched. One
    /// transaction covers every table.
    pub async fn update_user_access(
        &self,
        user_id: i64,
        input: UpdateUserAccessInput,
        actor: i64,
    ) -> AppResult<()> {
        let exists =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_one(&self.db)
                .await?;
        if exists == 0 {
            return Err(AppError::NotFound("User".to_string()));
        }

        let mut tx = self.db.begin().await?;

        if let Some(role_ids) = &input.role_ids {
            sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            for role_id in role_ids {
                sqlx::query(
                    r#"
                    INSERT INTO user_roles (user_id, role_id, assigned_by)
                    VALUES ($1, $2, $3)
                    "#,
                )
                .bind(user_id)
                .bind(role_id)
                .bind(actor)
                .execute(&mut *tx)
                .await?;
            }
        }

        if let Some(grants) = &input.permissions {
            sqlx::query("DELETE FROM user_permissions WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            for grant in grants {
                sqlx::query(
                    r#"
                    INSERT INTO user_permissions (user_id, permission_id, city_id)
                    VALUES ($1, $2, $3)
                    "#,
                )
                .bind(user_id)
                .bind(grant.permission_id)
                .bind(grant.city_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        if let Some(city_ids) = &input.city_ids {
            sqlx::query("DELETE FROM user_city_access WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            for city_id in city_ids {
                sqlx::query("INSERT INTO user_city_access (user_id, city_id) VALUES ($1, $2)")
                    .bind(user_id)
                    .bind(city_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        if let Some(zone_ids) = &input.zone_ids {
            sqlx::query("DELETE FROM user_zone_access WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            for zone_id in zone_ids {
                sqlx::query("INSERT INTO user_zone_access (user_id, zone_id) VALUES ($1, $2)")
                    .bind(user_id)
                    .bind(zone_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;

        self.permissions.bump_version();
        Ok(())
    }
}

/// True when the caller may administer RBAC: admin, or `permissions:manage`
pub fn can_manage(role: PrimaryRole, resolved: &crate::services::permission::ResolvedPermissions) -> bool {
    role.is_admin() || resolved.has("permissions", "manage")
}

/// Rewrite a unique violation into a conflict; other errors pass through
fn map_unique(err: AppError, resource: &str, message: &str) -> AppError {
    if err.is_unique_violation() {
        AppError::Conflict {
            resource: resource.to_string(),
            message: message.to_string(),
        }
    } else {
        err
    }
}
