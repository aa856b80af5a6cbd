//! Data model shared by the console core and the presentation layer
//!
//! Wire shapes follow the registry backend's snake_case JSON:
//! - `InverterRecord`: one registered collection agent
//! - `InverterConfig`: creation payload (carries portal credentials)
//! - `StatusReport` / `LogsReport`: observability answers

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Opaque inverter identifier. The registry hands out integers, but the
/// console never does arithmetic on them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct InverterId(String);

impl InverterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InverterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InverterId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for InverterId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl<'de> Deserialize<'de> for InverterId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => InverterId(n.to_string()),
            RawId::Text(s) => InverterId(s),
        })
    }
}

/// Worker template used to build the collection agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InverterType {
    #[default]
    Goodwe,
    /// Template unknown to this console build
    #[serde(other)]
    Unsupported,
}

impl InverterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InverterType::Goodwe => "goodwe",
            InverterType::Unsupported => "unsupported",
        }
    }
}

impl std::str::FromStr for InverterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "goodwe" => Ok(InverterType::Goodwe),
            other => Err(format!("unknown inverter type: {other}")),
        }
    }
}

/// Portal region the worker logs into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    #[default]
    Au,
    Eu,
    Us,
    /// Free-form value stored by the registry that this build does not know
    Other,
}

// The registry keeps the region as a free string; one odd record must not
// fail the whole list.
impl<'de> Deserialize<'de> for Region {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or(Region::Other))
    }
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Au => "au",
            Region::Eu => "eu",
            Region::Us => "us",
            Region::Other => "other",
        }
    }
}

impl std::str::FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "au" => Ok(Region::Au),
            "eu" => Ok(Region::Eu),
            "us" => Ok(Region::Us),
            other => Err(format!("unknown region: {other} (expected au, eu or us)")),
        }
    }
}

/// Server-authoritative worker status held by the registry.
/// Never mutated locally; only replaced by a re-fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InverterStatus {
    Active,
    #[default]
    Inactive,
    Error,
    /// Also used for any status string the console does not know
    #[serde(other)]
    Pending,
}

impl InverterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InverterStatus::Active => "active",
            InverterStatus::Inactive => "inactive",
            InverterStatus::Error => "error",
            InverterStatus::Pending => "pending",
        }
    }

    /// Operator-facing label
    pub fn label(&self) -> &'static str {
        match self {
            InverterStatus::Active => "Running",
            InverterStatus::Inactive => "Stopped",
            InverterStatus::Error => "Error",
            InverterStatus::Pending => "Pending",
        }
    }
}

impl fmt::Display for InverterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registered inverter, as returned by `GET /inverters`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InverterRecord {
    pub id: InverterId,
    pub name: String,
    #[serde(default)]
    pub inverter_type: InverterType,
    pub region: Region,
    /// IANA zone name, informational only
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Polling cadence of the worker (not of the console)
    #[serde(rename = "interval", default = "default_interval")]
    pub interval_seconds: u32,
    #[serde(default)]
    pub status: InverterStatus,
    #[serde(default)]
    pub container_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub last_update: Option<String>,
}

impl InverterRecord {
    /// First 12 characters of the worker handle, the way container ids are usually shown
    pub fn short_container_id(&self) -> Option<&str> {
        self.container_id
            .as_deref()
            .map(|id| id.get(..12).unwrap_or(id))
    }

    pub fn created_display(&self) -> String {
        format_timestamp(self.created_at.as_deref())
    }

    pub fn last_update_display(&self) -> String {
        format_timestamp(self.last_update.as_deref())
    }
}

/// Display-only timestamp rendering. The registry emits naive ISO-8601
/// datetimes, sometimes with an offset.
pub fn format_timestamp(raw: Option<&str>) -> String {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return "N/A".to_string();
    };

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return dt.format("%b %-d, %Y %H:%M").to_string();
    }
    match chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(dt) => dt.format("%b %-d, %Y %H:%M").to_string(),
        Err(_) => "Invalid Date".to_string(),
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_interval() -> u32 {
    300
}

/// Registration payload for `POST /inverters`
#[derive(Clone, Serialize, Deserialize)]
pub struct InverterConfig {
    pub name: String,
    pub inverter_type: InverterType,
    pub region: Region,
    pub timezone: String,
    pub sems_username: String,
    pub sems_password: String,
    #[serde(rename = "interval")]
    pub interval_seconds: u32,
}

impl InverterConfig {
    pub fn new(name: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sems_username: username.into(),
            sems_password: password.into(),
            ..Self::default()
        }
    }

    /// Client-side checks before anything is submitted
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name cannot be empty".to_string());
        }
        if self.sems_username.trim().is_empty() {
            return Err("portal username cannot be empty".to_string());
        }
        if self.interval_seconds == 0 {
            return Err("interval must be a positive number of seconds".to_string());
        }
        if self.inverter_type == InverterType::Unsupported {
            return Err("inverter type is not supported".to_string());
        }
        if self.region == Region::Other {
            return Err("region must be au, eu or us".to_string());
        }
        Ok(())
    }
}

impl Default for InverterConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            inverter_type: InverterType::Goodwe,
            region: Region::Au,
            timezone: default_timezone(),
            sems_username: String::new(),
            sems_password: String::new(),
            interval_seconds: default_interval(),
        }
    }
}

impl fmt::Debug for InverterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InverterConfig")
            .field("name", &self.name)
            .field("inverter_type", &self.inverter_type)
            .field("region", &self.region)
            .field("timezone", &self.timezone)
            .field("sems_username", &self.sems_username)
            .field("sems_password", &"<redacted>")
            .field("interval_seconds", &self.interval_seconds)
            .finish()
    }
}

/// `GET /inverters/{id}/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: String,
}

/// `GET /inverters/{id}/logs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsReport {
    pub logs: String,
}

/// `GET /templates`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatesReport {
    pub templates: Vec<String>,
}

/// Fleet counters as shown above the inverter list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FleetSummary {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub error: usize,
    pub pending: usize,
}

impl FleetSummary {
    pub fn from_records(records: &[InverterRecord]) -> Self {
        let mut by_status: HashMap<InverterStatus, usize> = HashMap::new();
        for record in records {
            *by_status.entry(record.status).or_insert(0) += 1;
        }

        Self {
            total: records.len(),
            active: by_status.get(&InverterStatus::Active).copied().unwrap_or(0),
            inactive: by_status.get(&InverterStatus::Inactive).copied().unwrap_or(0),
            error: by_status.get(&InverterStatus::Error).copied().unwrap_or(0),
            pending: by_status.get(&InverterStatus::Pending).copied().unwrap_or(0),
        }
    }
}
