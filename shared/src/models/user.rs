//! User, role, and permission models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::PrimaryRole;

/// A user account on the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub emp_code: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub primary_role: PrimaryRole,
    pub department: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A dynamically managed role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_system: bool,
}

/// A `(module, action)` permission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permission {
    pub id: i64,
    pub module: String,
    pub action: String,
    pub label: Option<String>,
    pub description: Option<String>,
}

impl Permission {
    /// Canonical `module:action` key, lower-cased
    pub fn key(&self) -> String {
        permission_key(&self.module, &self.action)
    }
}

/// Canonical permission key for a `(module, action)` pair
pub fn permission_key(module: &str, action: &str) -> String {
    format!(
        "{}:{}",
        module.trim().to_ascii_lowercase(),
        action.trim().to_ascii_lowercase()
    )
}

/// City reach of one permission: everything, or an explicit id set
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CityScope {
    pub all: bool,
    pub cities: Vec<i64>,
}

impl CityScope {
    pub fn all_cities() -> Self {
        Self {
            all: true,
            cities: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.all && self.cities.is_empty()
    }

    pub fn allows(&self, city_id: i64) -> bool {
        self.all || self.cities.contains(&city_id)
    }

    /// Narrow this scope by another; used when an endpoint combines the
    /// caller's overall city scope with a permission-qualified one
    pub fn intersect(&self, other: &CityScope) -> CityScope {
        match (self.all, other.all) {
            (true, true) => CityScope::all_cities(),
            (true, false) => other.clone(),
            (false, true) => self.clone(),
            (false, false) => CityScope {
                all: false,
                cities: self
                    .cities
                    .iter()
                    .copied()
                    .filter(|id| other.cities.contains(id))
                    .collect(),
            },
        }
    }
}

/// The access profile returned by `/auth/me`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessProfile {
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub city_scope: CityScope,
    pub zone_ids: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_key_normalises_case() {
        assert_eq!(permission_key("Attendance", "View"), "attendance:view");
        assert_eq!(permission_key(" city ", " VIEW "), "city:view");
    }

    #[test]
    fn test_city_scope_allows() {
        let all = CityScope::all_cities();
        assert!(all.allows(7));
        assert!(!all.is_empty());

        let some = CityScope {
            all: false,
            cities: vec![2, 5],
        };
        assert!(some.allows(2));
        assert!(!some.allows(7));

        let none = CityScope::default();
        assert!(none.is_empty());
        assert!(!none.allows(1));
    }

    #[test]
    fn test_city_scope_intersect() {
        let all = CityScope::all_cities();
        let some = CityScope {
            all: false,
            cities: vec![2, 5, 9],
        };
        let other = CityScope {
            all: false,
            cities: vec![5, 9, 11],
        };

        assert_eq!(all.intersect(&all), CityScope::all_cities());
        assert_eq!(all.intersect(&some), some);
        assert_eq!(some.intersect(&all), some);
        assert_eq!(
            some.intersect(&other),
            CityScope {
                all: false,
                cities: vec![5, 9],
            }
        );
        assert!(some.intersect(&CityScope::default()).is_empty());
    }
}
