//! Validation utilities for the Field Workforce Attendance Platform

// ============================================================================
// General Validations
// ============================================================================

/// Validate email format (basic check)
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    if email.contains('@') && email.contains('.') && email.len() >= 5 {
        Ok(())
    } else {
        Err("Invalid email format")
    }
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters");
    }
    Ok(())
}

/// Validate employee code format (2-20 chars, uppercase alphanumeric with
/// optional dashes, e.g. "SW-1042")
pub fn validate_emp_code(code: &str) -> Result<(), &'static str> {
    if code.len() < 2 {
        return Err("Employee code must be at least 2 characters");
    }
    if code.len() > 20 {
        return Err("Employee code must be at most 20 characters");
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("Employee code must be uppercase alphanumeric (dashes allowed)");
    }
    Ok(())
}

/// Validate mobile number format
/// Accepts: 9812345678, 98123-45678, +919812345678
pub fn validate_phone(phone: &str) -> Result<(), &'static str> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

    // Domestic mobile: 10 digits starting 6-9
    if digits.len() == 10 && matches!(digits.as_bytes()[0], b'6'..=b'9') {
        return Ok(());
    }
    // With country code: 12 digits starting with 91
    if digits.len() == 12 && digits.starts_with("91") {
        return Ok(());
    }

    Err("Invalid mobile number format")
}

// ============================================================================
// Attendance-Specific Validations
// ============================================================================

/// Validate a night-shift rollover hour (0..=23)
pub fn validate_rollover_hour(hour: i64) -> Result<(), &'static str> {
    if !(0..=23).contains(&hour) {
        return Err("Rollover hour must be between 0 and 23");
    }
    Ok(())
}

/// Validate a face-match similarity threshold (0..=100)
pub fn validate_match_threshold(threshold: f32) -> Result<(), &'static str> {
    if !(0.0..=100.0).contains(&threshold) || threshold.is_nan() {
        return Err("Match threshold must be between 0 and 100");
    }
    Ok(())
}

/// Validate latitude/longitude are on the globe
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), &'static str> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err("Latitude must be between -90 and 90");
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err("Longitude must be between -180 and 180");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email_valid() {
        assert!(validate_email("test@example.com").is_ok());
        assert!(validate_email("user.name@domain.co.in").is_ok());
    }

    #[test]
    fn test_validate_email_invalid() {
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("no@domain").is_err());
        assert!(validate_email("@.").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("password123").is_ok());
        assert!(validate_password("12345678").is_ok());
        assert!(validate_password("short").is_err());
    }

    #[test]
    fn test_validate_emp_code_valid() {
        assert!(validate_emp_code("SW-1042").is_ok());
        assert!(validate_emp_code("E1").is_ok());
        assert!(validate_emp_code("FIELD-OPS-007").is_ok());
    }

    #[test]
    fn test_validate_emp_code_invalid() {
        assert!(validate_emp_code("X").is_err()); // Too short
        assert!(validate_emp_code("ABCDEFGHIJKLMNOPQRSTU").is_err()); // Too long
        assert!(validate_emp_code("sw-1042").is_err()); // Lowercase
        assert!(validate_emp_code("SW_1042").is_err()); // Underscore
    }

    #[test]
    fn test_validate_phone_valid() {
        assert!(validate_phone("9812345678").is_ok());
        assert!(validate_phone("98123-45678").is_ok());
        assert!(validate_phone("+919812345678").is_ok());
        assert!(validate_phone("919812345678").is_ok());
    }

    #[test]
    fn test_validate_phone_invalid() {
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("1812345678").is_err()); // Bad leading digit
        assert!(validate_phone("abcdefghij").is_err());
    }

    #[test]
    fn test_validate_rollover_hour() {
        assert!(validate_rollover_hour(0).is_ok());
        assert!(validate_rollover_hour(4).is_ok());
        assert!(validate_rollover_hour(23).is_ok());
        assert!(validate_rollover_hour(24).is_err());
        assert!(validate_rollover_hour(-1).is_err());
    }

    #[test]
    fn test_validate_match_threshold() {
        assert!(validate_match_threshold(0.0).is_ok());
        assert!(validate_match_threshold(90.0).is_ok());
        assert!(validate_match_threshold(100.0).is_ok());
        assert!(validate_match_threshold(-0.1).is_err());
        assert!(validate_match_threshold(100.5).is_err());
        assert!(validate_match_threshold(f32::NAN).is_err());
    }

    #[test]
    fn test_validate_coordinates() {
        assert!(validate_coordinates(19.076, 72.8777).is_ok());
        assert!(validate_coordinates(-90.0, 180.0).is_ok());
        assert!(validate_coordinates(90.5, 0.0).is_err());
        assert!(validate_coordinates(0.0, -180.5).is_err());
    }
}
