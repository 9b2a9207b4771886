//! Input validation tests
//!
//! Property-based and unit tests for shared validation rules used at the
//! API boundary: employee codes, phone numbers, thresholds, and the token
//! claim shape.

use proptest::prelude::*;
use shared::types::{LocationType, PrimaryRole, PunchType};
use shared::validation::{
    validate_coordinates, validate_emp_code, validate_match_threshold, validate_phone,
    validate_rollover_hour,
};

fn emp_code_strategy() -> impl Strategy<Value = String> {
    "[A-Z0-9]{2,8}(-[A-Z0-9]{1,6}){0,2}".prop_filter("length cap", |s| s.len() <= 20)
}

fn phone_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        // Domestic mobile
        "[6-9][0-9]{9}",
        // With country code
        "91[6-9][0-9]{9}",
    ]
}

proptest! {
    #[test]
    fn test_generated_emp_codes_valid(code in emp_code_strategy()) {
        prop_assert!(validate_emp_code(&code).is_ok(), "code {} should be valid", code);
    }

    #[test]
    fn test_lowercase_emp_codes_invalid(code in "[a-z]{3,10}") {
        prop_assert!(validate_emp_code(&code).is_err());
    }

    #[test]
    fn test_generated_phones_valid(phone in phone_strategy()) {
        prop_assert!(validate_phone(&phone).is_ok(), "phone {} should be valid", phone);
    }

    #[test]
    fn test_threshold_range(threshold in 0.0f32..=100.0) {
        prop_assert!(validate_match_threshold(threshold).is_ok());
    }

    #[test]
    fn test_threshold_out_of_range(threshold in 100.1f32..1000.0) {
        prop_assert!(validate_match_threshold(threshold).is_err());
    }

    #[test]
    fn test_rollover_hours(hour in 0i64..24) {
        prop_assert!(validate_rollover_hour(hour).is_ok());
    }

    #[test]
    fn test_coordinates_on_globe(lat in -90.0f64..=90.0, lng in -180.0f64..=180.0) {
        prop_assert!(validate_coordinates(lat, lng).is_ok());
    }
}

mod punch_type_tests {
    use super::*;

    #[test]
    fn test_parse_accepts_any_case() {
        assert_eq!(PunchType::parse("IN"), Some(PunchType::In));
        assert_eq!(PunchType::parse("in"), Some(PunchType::In));
        assert_eq!(PunchType::parse(" Out "), Some(PunchType::Out));
        assert_eq!(PunchType::parse("sideways"), None);
        assert_eq!(PunchType::parse(""), None);
    }

    #[test]
    fn test_as_str_roundtrip() {
        for punch in [PunchType::In, PunchType::Out] {
            assert_eq!(PunchType::parse(punch.as_str()), Some(punch));
        }
    }
}

mod location_type_tests {
    use super::*;

    #[test]
    fn test_parse_and_default() {
        assert_eq!(LocationType::parse("in"), Some(LocationType::In));
        assert_eq!(LocationType::parse("OUT"), Some(LocationType::Out));
        assert_eq!(LocationType::parse("both"), Some(LocationType::Both));
        assert_eq!(LocationType::parse("nowhere"), None);
        assert_eq!(LocationType::default(), LocationType::Both);
    }
}

mod primary_role_tests {
    use super::*;

    #[test]
    fn test_known_roles_parse() {
        assert_eq!(PrimaryRole::parse("admin"), PrimaryRole::Admin);
        assert_eq!(PrimaryRole::parse("SUPERVISOR"), PrimaryRole::Supervisor);
        assert_eq!(PrimaryRole::parse("manager"), PrimaryRole::Manager);
        assert_eq!(PrimaryRole::parse("operator"), PrimaryRole::Operator);
        assert_eq!(PrimaryRole::parse("user"), PrimaryRole::User);
    }

    #[test]
    fn test_unknown_roles_are_custom() {
        assert_eq!(PrimaryRole::parse("auditor"), PrimaryRole::Custom);
        assert_eq!(PrimaryRole::parse(""), PrimaryRole::Custom);
    }

    #[test]
    fn test_only_admin_bypasses() {
        assert!(PrimaryRole::Admin.is_admin());
        for role in [
            PrimaryRole::Supervisor,
            PrimaryRole::Manager,
            PrimaryRole::Operator,
            PrimaryRole::User,
            PrimaryRole::Custom,
        ] {
            assert!(!role.is_admin());
        }
    }
}

mod phone_format_tests {
    use super::*;

    #[test]
    fn test_accepted_formats() {
        assert!(validate_phone("9812345678").is_ok());
        assert!(validate_phone("98123-45678").is_ok());
        assert!(validate_phone("+91 98123 45678").is_ok());
    }

    #[test]
    fn test_rejected_formats() {
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("5812345678").is_err()); // bad leading digit
        assert!(validate_phone("981234567890123").is_err());
        assert!(validate_phone("").is_err());
    }
}
