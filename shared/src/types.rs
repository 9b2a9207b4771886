//! Common types used across the platform

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// GPS coordinates captured with a punch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GpsPoint {
    pub latitude: Decimal,
    pub longitude: Decimal,
}

impl GpsPoint {
    pub fn new(latitude: Decimal, longitude: Decimal) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Direction of a punch event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum PunchType {
    In,
    Out,
}

impl PunchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PunchType::In => "IN",
            PunchType::Out => "OUT",
        }
    }

    /// Parse from a request value; accepts any casing of `in`/`out`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "IN" => Some(PunchType::In),
            "OUT" => Some(PunchType::Out),
            _ => None,
        }
    }
}

/// Which captured address a location-grouped report reads
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    In,
    Out,
    #[default]
    Both,
}

impl LocationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationType::In => "in",
            LocationType::Out => "out",
            LocationType::Both => "both",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "in" => Some(LocationType::In),
            "out" => Some(LocationType::Out),
            "both" => Some(LocationType::Both),
            _ => None,
        }
    }
}

/// Built-in account categories; `Custom` covers dynamically created roles
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PrimaryRole {
    Admin,
    Supervisor,
    Manager,
    Operator,
    User,
    Custom,
}

impl PrimaryRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimaryRole::Admin => "admin",
            PrimaryRole::Supervisor => "supervisor",
            PrimaryRole::Manager => "manager",
            PrimaryRole::Operator => "operator",
            PrimaryRole::User => "user",
            PrimaryRole::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => PrimaryRole::Admin,
            "supervisor" => PrimaryRole::Supervisor,
            "manager" => PrimaryRole::Manager,
            "operator" => PrimaryRole::Operator,
            "user" => PrimaryRole::User,
            _ => PrimaryRole::Custom,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, PrimaryRole::Admin)
    }
}

/// Inclusive date range for report queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub start: chrono::NaiveDate,
    pub end: chrono::NaiveDate,
}
