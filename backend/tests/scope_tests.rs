//! Authorization scope tests
//!
//! Property-based and unit tests for:
//! - city-scope membership: a visible row's city is in the scope, or the
//!   scope is `all`
//! - the null-city collapse rule for permission scopes
//! - permission key normalisation

use proptest::prelude::*;
use shared::models::{permission_key, CityScope};

fn city_set_strategy() -> impl Strategy<Value = Vec<i64>> {
    proptest::collection::btree_set(1i64..100, 0..8).prop_map(|s| s.into_iter().collect())
}

fn scope_strategy() -> impl Strategy<Value = CityScope> {
    (any::<bool>(), city_set_strategy()).prop_map(|(all, cities)| CityScope {
        all,
        cities: if all { Vec::new() } else { cities },
    })
}

proptest! {
    /// Scope membership matches the visibility rule
    #[test]
    fn test_allows_matches_membership(scope in scope_strategy(), city in 1i64..100) {
        let allowed = scope.allows(city);
        prop_assert_eq!(allowed, scope.all || scope.cities.contains(&city));
    }

    /// Intersection never widens access
    #[test]
    fn test_intersect_never_widens(a in scope_strategy(), b in scope_strategy(), city in 1i64..100) {
        let narrowed = a.intersect(&b);
        if narrowed.allows(city) {
            prop_assert!(a.allows(city));
            prop_assert!(b.allows(city));
        }
    }

    /// Intersection is commutative in visibility
    #[test]
    fn test_intersect_commutative(a in scope_strategy(), b in scope_strategy(), city in 1i64..100) {
        prop_assert_eq!(a.intersect(&b).allows(city), b.intersect(&a).allows(city));
    }

    /// `all` is the identity of intersection
    #[test]
    fn test_all_is_identity(scope in scope_strategy(), city in 1i64..100) {
        let all = CityScope::all_cities();
        prop_assert_eq!(all.intersect(&scope).allows(city), scope.allows(city));
        prop_assert_eq!(scope.intersect(&all).allows(city), scope.allows(city));
    }

    /// An empty scope annihilates every intersection
    #[test]
    fn test_empty_annihilates(scope in scope_strategy(), city in 1i64..100) {
        let empty = CityScope::default();
        prop_assert!(!empty.intersect(&scope).allows(city));
    }
}

mod permission_key_tests {
    use super::*;

    fn module_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("attendance".to_string()),
            Just("report".to_string()),
            Just("city".to_string()),
            Just("zone".to_string()),
            Just("ward".to_string()),
            Just("employee".to_string()),
            Just("users".to_string()),
            Just("permissions".to_string()),
        ]
    }

    fn action_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("view".to_string()),
            Just("create".to_string()),
            Just("manage".to_string()),
            Just("export".to_string()),
            Just("enroll".to_string()),
        ]
    }

    proptest! {
        /// Keys are case-insensitive and shaped `module:action`
        #[test]
        fn test_key_shape(module in module_strategy(), action in action_strategy()) {
            let key = permission_key(&module, &action);
            let parts: Vec<&str> = key.split(':').collect();
            prop_assert_eq!(parts.len(), 2);
            prop_assert!(!parts[0].is_empty());
            prop_assert!(!parts[1].is_empty());

            let shouty = permission_key(&module.to_uppercase(), &action.to_uppercase());
            prop_assert_eq!(key, shouty);
        }
    }

    #[test]
    fn test_key_trims_whitespace() {
        assert_eq!(permission_key(" city ", " view "), "city:view");
    }
}

mod collapse_rule_tests {
    use super::*;

    /// Mirror of the resolver's per-key merge: any null city collapses the
    /// scope to `all`, otherwise the ids union
    fn merge(rows: &[Option<i64>]) -> CityScope {
        let mut all = false;
        let mut cities = std::collections::BTreeSet::new();
        for row in rows {
            match row {
                None => all = true,
                Some(id) => {
                    cities.insert(*id);
                }
            }
        }
        if all {
            CityScope::all_cities()
        } else {
            CityScope {
                all: false,
                cities: cities.into_iter().collect(),
            }
        }
    }

    proptest! {
        /// One unscoped grant makes the permission global
        #[test]
        fn test_null_city_collapses(ids in proptest::collection::vec(1i64..50, 0..6)) {
            let mut rows: Vec<Option<i64>> = ids.iter().copied().map(Some).collect();
            rows.push(None);
            let scope = merge(&rows);
            prop_assert!(scope.all);
            prop_assert!(scope.cities.is_empty());
        }

        /// Without an unscoped grant the scope is exactly the id union
        #[test]
        fn test_union_without_null(ids in proptest::collection::vec(1i64..50, 1..6)) {
            let rows: Vec<Option<i64>> = ids.iter().copied().map(Some).collect();
            let scope = merge(&rows);
            prop_assert!(!scope.all);
            for id in ids {
                prop_assert!(scope.allows(id));
            }
        }
    }

    #[test]
    fn test_duplicate_grants_union_once() {
        let scope = merge(&[Some(2), Some(2), Some(5)]);
        assert_eq!(scope.cities, vec![2, 5]);
    }
}
