//! Database schema and RBAC bootstrap
//!
//! Runs once at startup in a single transaction. Every statement is
//! idempotent (`IF NOT EXISTS` / `ON CONFLICT DO NOTHING`), so restarts and
//! concurrent replicas converge on the same catalogue.

use sqlx::PgPool;

use crate::config::Config;
use crate::error::AppResult;

/// Schema statements, dependency-ordered
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS cities (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS zones (
        id BIGSERIAL PRIMARY KEY,
        city_id BIGINT NOT NULL REFERENCES cities(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        UNIQUE (city_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS wards (
        id BIGSERIAL PRIMARY KEY,
        zone_id BIGINT NOT NULL REFERENCES zones(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        UNIQUE (zone_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS departments (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS designations (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        emp_code TEXT UNIQUE,
        email TEXT UNIQUE,
        phone TEXT,
        primary_role TEXT NOT NULL DEFAULT 'user',
        department TEXT,
        password_hash TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT,
        is_system BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS permissions (
        id BIGSERIAL PRIMARY KEY,
        module TEXT NOT NULL,
        action TEXT NOT NULL,
        label TEXT,
        description TEXT,
        UNIQUE (module, action)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS role_permissions (
        role_id BIGINT NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        permission_id BIGINT NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
        PRIMARY KEY (role_id, permission_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_roles (
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        role_id BIGINT NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        assigned_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        assigned_by BIGINT REFERENCES users(id) ON DELETE SET NULL,
        PRIMARY KEY (user_id, role_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_permissions (
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        permission_id BIGINT NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
        city_id BIGINT REFERENCES cities(id) ON DELETE CASCADE,
        UNIQUE (user_id, permission_id, city_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_city_access (
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        city_id BIGINT NOT NULL REFERENCES cities(id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, city_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_zone_access (
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        zone_id BIGINT NOT NULL REFERENCES zones(id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, zone_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS employees (
        emp_id BIGSERIAL PRIMARY KEY,
        emp_code TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        phone TEXT,
        ward_id BIGINT REFERENCES wards(id) ON DELETE SET NULL,
        designation_id BIGINT REFERENCES designations(id) ON DELETE SET NULL,
        face_image_ref TEXT,
        face_id TEXT,
        face_confidence REAL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS supervisor_wards (
        assigned_id BIGSERIAL PRIMARY KEY,
        supervisor_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        ward_id BIGINT NOT NULL REFERENCES wards(id) ON DELETE CASCADE,
        UNIQUE (supervisor_id, ward_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS attendance (
        attendance_id BIGSERIAL PRIMARY KEY,
        emp_id BIGINT NOT NULL REFERENCES employees(emp_id) ON DELETE CASCADE,
        att_date DATE NOT NULL,
        ward_id BIGINT REFERENCES wards(id) ON DELETE SET NULL,
        punch_in_time TIMESTAMPTZ,
        punch_out_time TIMESTAMPTZ,
        punch_in_image_ref TEXT,
        punch_out_image_ref TEXT,
        latitude_in NUMERIC(10, 7),
        longitude_in NUMERIC(10, 7),
        latitude_out NUMERIC(10, 7),
        longitude_out NUMERIC(10, 7),
        in_address TEXT,
        out_address TEXT,
        duration_minutes BIGINT,
        punched_in_by BIGINT,
        punched_out_by BIGINT,
        UNIQUE (emp_id, att_date)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(att_date)",
    "CREATE INDEX IF NOT EXISTS idx_attendance_ward ON attendance(ward_id)",
    "CREATE INDEX IF NOT EXISTS idx_employees_ward ON employees(ward_id)",
    "CREATE INDEX IF NOT EXISTS idx_zones_city ON zones(city_id)",
    "CREATE INDEX IF NOT EXISTS idx_wards_zone ON wards(zone_id)",
];

/// Permission catalogue seeded at startup: (module, action, label)
pub const PERMISSION_CATALOGUE: &[(&str, &str, &str)] = &[
    ("attendance", "view", "View attendance"),
    ("attendance", "create", "Record attendance"),
    ("attendance", "manage", "Correct attendance records"),
    ("report", "view", "View reports"),
    ("report", "export", "Export reports"),
    ("city", "view", "View cities"),
    ("city", "manage", "Manage cities"),
    ("zone", "view", "View zones"),
    ("zone", "manage", "Manage zones"),
    ("ward", "view", "View wards"),
    ("ward", "manage", "Manage wards"),
    ("department", "view", "View departments"),
    ("designation", "view", "View designations"),
    ("employee", "view", "View employees"),
    ("employee", "manage", "Manage employees"),
    ("employee", "enroll", "Enrol employee faces"),
    ("users", "view", "View users"),
    ("users", "manage", "Manage users"),
    ("permissions", "manage", "Manage roles and permissions"),
];

/// System roles and the permission keys they carry
const SYSTEM_ROLES: &[(&str, &str, &[&str])] = &[
    ("admin", "Full platform access", &["*"]),
    (
        "supervisor",
        "Field supervisor: punches and day-to-day tracking",
        &[
            "attendance:view",
            "attendance:create",
            "employee:view",
            "employee:enroll",
            "report:view",
            "city:view",
            "zone:view",
            "ward:view",
        ],
    ),
    (
        "manager",
        "Operations manager: oversight and reporting",
        &[
            "attendance:view",
            "report:view",
            "report:export",
            "city:view",
            "zone:view",
            "ward:view",
            "employee:view",
            "users:view",
        ],
    ),
    (
        "operator",
        "Control-room operator",
        &["attendance:view", "attendance:create", "employee:view"],
    ),
    ("user", "Basic account", &["attendance:view"]),
];

/// Create the schema and seed the RBAC catalogue, in one transaction.
pub async fn bootstrap(pool: &PgPool, config: &Config) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    for statement in SCHEMA {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    for (module, action, label) in PERMISSION_CATALOGUE {
        sqlx::query(
            r#"
            INSERT INTO permissions (module, action, label)
            VALUES ($1, $2, $3)
            ON CONFLICT (module, action) DO NOTHING
            "#,
        )
        .bind(module)
        .bind(action)
        .bind(label)
        .execute(&mut *tx)
        .await?;
    }

    for (name, description, permission_keys) in SYSTEM_ROLES {
        let role_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO roles (name, description, is_system)
            VALUES ($1, $2, TRUE)
            ON CONFLICT (name) DO UPDATE SET description = EXCLUDED.description
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(description)
        .fetch_one(&mut *tx)
        .await?;

        if permission_keys.len() == 1 && permission_keys[0] == "*" {
            sqlx::query(
                r#"
                INSERT INTO role_permissions (role_id, permission_id)
                SELECT $1, id FROM permissions
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(role_id)
            .execute(&mut *tx)
            .await?;
        } else {
            for key in *permission_keys {
                let (module, action) = key
                    .split_once(':')
                    .expect("system role permission keys are module:action");
                sqlx::query(
                    r#"
                    INSERT INTO role_permissions (role_id, permission_id)
                    SELECT $1, id FROM permissions WHERE module = $2 AND action = $3
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(role_id)
                .bind(module)
                .bind(action)
                .execute(&mut *tx)
                .await?;
            }
        }
    }

    // Optional seed admin account
    if !config.bootstrap.admin_email.is_empty() {
        let password_hash = bcrypt::hash(&config.bootstrap.admin_password, bcrypt::DEFAULT_COST)
            .map_err(|e| crate::error::AppError::Internal(format!("password hashing failed: {}", e)))?;

        let user_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO users (name, email, primary_role, password_hash)
            VALUES ('Administrator', $1, 'admin', $2)
            ON CONFLICT (email) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&config.bootstrap.admin_email)
        .bind(&password_hash)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(user_id) = user_id {
            sqlx::query(
                r#"
                INSERT INTO user_roles (user_id, role_id)
                SELECT $1, id FROM roles WHERE name = 'admin'
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
            tracing::info!(email = %config.bootstrap.admin_email, "seeded admin account");
        }
    }

    tx.commit().await?;

    tracing::info!("database bootstrap complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_keys_are_unique_and_lowercase() {
        let mut seen = std::collections::HashSet::new();
        for (module, action, _) in PERMISSION_CATALOGUE {
            assert_eq!(module.to_ascii_lowercase(), *module);
            assert_eq!(action.to_ascii_lowercase(), *action);
            assert!(seen.insert((module, action)), "duplicate {}:{}", module, action);
        }
    }

    #[test]
    fn test_system_role_permissions_exist_in_catalogue() {
        let keys: std::collections::HashSet<String> = PERMISSION_CATALOGUE
            .iter()
            .map(|(m, a, _)| format!("{}:{}", m, a))
            .collect();
        for (role, _, perms) in SYSTEM_ROLES {
            if perms.len() == 1 && perms[0] == "*" {
                continue;
            }
            for perm in *perms {
                assert!(keys.contains(*perm), "role {} references unknown {}", role, perm);
            }
        }
    }
}
