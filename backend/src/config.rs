//! Configuration management for the Field Workforce Attendance Platform
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with ATTEND_ prefix
//! 4. Flat environment names carried over from existing deployments
//!    (PORT, ATTENDANCE_TIMEZONE, ATTENDANCE_ROLLOVER_HOUR /
//!    NIGHT_SHIFT_ROLLOVER_HOUR, FACE_MATCH_THRESHOLD, FRONTEND_ORIGINS)

use chrono_tz::Tz;
use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Origins always allowed regardless of `FRONTEND_ORIGINS`
const DEFAULT_FRONTEND_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:5173",
];

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT authentication configuration
    pub jwt: JwtConfig,

    /// CORS configuration
    pub cors: CorsConfig,

    /// Attendance day semantics
    pub attendance: AttendanceConfig,

    /// Face-matching service configuration
    pub face: FaceConfig,

    /// Object storage configuration
    pub storage: StorageConfig,

    /// WhatsApp messaging gateway configuration
    pub messaging: MessagingConfig,

    /// Startup bootstrap configuration
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key for signing JWT tokens
    pub secret: String,

    /// Token expiry in hours
    pub token_expiry_hours: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    /// Comma-separated allowlist, merged with the built-in defaults
    pub frontend_origins: String,
}

impl CorsConfig {
    /// Allowed origins: configured list merged with defaults, deduplicated
    pub fn origins(&self) -> Vec<String> {
        let mut origins: Vec<String> = DEFAULT_FRONTEND_ORIGINS
            .iter()
            .map(|o| o.to_string())
            .collect();
        for origin in self.frontend_origins.split(',') {
            let origin = origin.trim();
            if !origin.is_empty() && !origins.iter().any(|o| o == origin) {
                origins.push(origin.to_string());
            }
        }
        origins
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AttendanceConfig {
    /// IANA timezone attendance days are reckoned in
    pub timezone: String,

    /// Punches before this local hour belong to the previous day (0..=23)
    pub rollover_hour: u32,
}

impl AttendanceConfig {
    /// Parsed timezone; unknown names fall back to Asia/Kolkata with a warning
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or_else(|_| {
            tracing::warn!(timezone = %self.timezone, "unknown timezone, using Asia/Kolkata");
            chrono_tz::Asia::Kolkata
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FaceConfig {
    /// Face-matching service endpoint
    pub endpoint: String,

    /// Face-matching service API key
    pub api_key: String,

    /// Gallery (collection) the employee faces are indexed into
    pub collection: String,

    /// Similarity threshold for a match, percent (0..=100)
    pub match_threshold: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Primary backend: "s3" or "local"
    pub backend: String,

    /// Directory for the local backend
    pub local_dir: String,

    /// S3 bucket for attendance and enrolment images
    pub s3_bucket: String,

    /// Secondary HTTP object store (empty endpoint disables it)
    pub secondary_endpoint: String,
    pub secondary_username: String,
    pub secondary_password: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MessagingConfig {
    /// WhatsApp gateway endpoint (empty disables forwarding)
    pub endpoint: String,

    /// Gateway auth key
    pub auth_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BootstrapConfig {
    /// Seed admin account credentials; empty email skips user seeding
    pub admin_email: String,
    pub admin_password: String,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("ATTEND_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let mut builder = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 5002)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("jwt.token_expiry_hours", 24)?
            .set_default("cors.frontend_origins", "")?
            .set_default("attendance.timezone", "Asia/Kolkata")?
            .set_default("attendance.rollover_hour", 4)?
            .set_default("face.endpoint", "")?
            .set_default("face.api_key", "")?
            .set_default("face.collection", "employee-faces")?
            .set_default("face.match_threshold", 90.0)?
            .set_default("storage.backend", "local")?
            .set_default("storage.local_dir", "./uploads")?
            .set_default("storage.s3_bucket", "")?
            .set_default("storage.secondary_endpoint", "")?
            .set_default("storage.secondary_username", "")?
            .set_default("storage.secondary_password", "")?
            .set_default("messaging.endpoint", "")?
            .set_default("messaging.auth_key", "")?
            .set_default("bootstrap.admin_email", "")?
            .set_default("bootstrap.admin_password", "")?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (ATTEND_ prefix)
            .add_source(
                Environment::with_prefix("ATTEND")
                    .separator("__")
                    .try_parsing(true),
            );

        // Flat names recognised for compatibility with existing deployments
        if let Ok(port) = std::env::var("PORT") {
            builder = builder.set_override("server.port", port)?;
        }
        if let Ok(tz) = std::env::var("ATTENDANCE_TIMEZONE") {
            builder = builder.set_override("attendance.timezone", tz)?;
        }
        if let Ok(hour) = std::env::var("ATTENDANCE_ROLLOVER_HOUR")
            .or_else(|_| std::env::var("NIGHT_SHIFT_ROLLOVER_HOUR"))
        {
            builder = builder.set_override("attendance.rollover_hour", hour)?;
        }
        if let Ok(threshold) = std::env::var("FACE_MATCH_THRESHOLD") {
            builder = builder.set_override("face.match_threshold", threshold)?;
        }
        if let Ok(origins) = std::env::var("FRONTEND_ORIGINS") {
            builder = builder.set_override("cors.frontend_origins", origins)?;
        }

        let config: Config = builder.build()?.try_deserialize()?;

        if config.attendance.rollover_hour > 23 {
            return Err(ConfigError::Message(format!(
                "attendance.rollover_hour must be 0..=23, got {}",
                config.attendance.rollover_hour
            )));
        }
        if !(0.0..=100.0).contains(&config.face.match_threshold) {
            return Err(ConfigError::Message(format!(
                "face.match_threshold must be 0..=100, got {}",
                config.face.match_threshold
            )));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cors(origins: &str) -> CorsConfig {
        CorsConfig {
            frontend_origins: origins.to_string(),
        }
    }

    #[test]
    fn test_origins_merge_with_defaults() {
        let origins = cors("https://ops.example.com, https://admin.example.com").origins();
        assert!(origins.iter().any(|o| o == "http://localhost:3000"));
        assert!(origins.iter().any(|o| o == "https://ops.example.com"));
        assert!(origins.iter().any(|o| o == "https://admin.example.com"));
    }

    #[test]
    fn test_origins_deduplicate_and_trim() {
        let origins = cors(" http://localhost:3000 ,, https://a.example ").origins();
        let localhost = origins.iter().filter(|o| *o == "http://localhost:3000").count();
        assert_eq!(localhost, 1);
        assert!(origins.iter().any(|o| o == "https://a.example"));
    }

    #[test]
    fn test_timezone_fallback() {
        let attendance = AttendanceConfig {
            timezone: "Not/AZone".to_string(),
            rollover_hour: 4,
        };
        assert_eq!(attendance.tz(), chrono_tz::Asia::Kolkata);

        let attendance = AttendanceConfig {
            timezone: "Asia/Dubai".to_string(),
            rollover_hour: 4,
        };
        assert_eq!(attendance.tz(), chrono_tz::Asia::Dubai);
    }
}
