// src/models/alarm.rs - Alarm levels and normalised alarm definitions

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_BLOCK_STEP_MINUTES: u64 = 10;
pub const MIN_BLOCK_STEP_MINUTES: u64 = 1;
pub const DEFAULT_MAX_BLOCK_MINUTES: u64 = 60;
pub const MIN_MAX_BLOCK_MINUTES: u64 = 10;
pub const DEFAULT_EVERY_MINUTES: u64 = 1;

/// Upper bounds applied to registry settings, minutes.
pub const MAX_EVERY_MINUTES: u64 = 24 * 60;
pub const MAX_BLOCK_STEP_MINUTES: u64 = 24 * 60;
pub const MAX_MAX_BLOCK_MINUTES: u64 = 7 * 24 * 60;

/// Severity of an alarm or an event.
///
/// Accepts both the registry's numeric codes ("1" critical, "2" warning,
/// "3" info) and the alerting engine's names. Anything unrecognised is
/// `Unknown`, which is not healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Level {
    Ok,
    Critical,
    Warning,
    Info,
    #[default]
    Unknown,
}

impl Level {
    /// The only healthy level.
    pub fn is_ok(&self) -> bool {
        matches!(self, Level::Ok)
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, Level::Critical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Ok => "OK",
            Level::Critical => "CRIT",
            Level::Warning => "WARN",
            Level::Info => "INFO",
            Level::Unknown => "UNKNOWN",
        }
    }
}

impl FromStr for Level {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "OK" => Level::Ok,
            "1" | "CRIT" | "CRITICAL" => Level::Critical,
            "2" | "WARN" | "WARNING" => Level::Warning,
            "3" | "INFO" => Level::Info,
            _ => Level::Unknown,
        })
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}

/// Alarm resource as published by the registry. Numeric settings arrive as
/// strings and may be empty or malformed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAlarm {
    pub name: String,
    pub version: String,
    pub measurement: String,
    pub expression: String,
    pub value: String,
    pub every: String,
    pub period: String,
    pub level: String,
    /// Comma separated channel names
    pub alert: String,
    /// Comma separated group names
    pub groups: String,
    #[serde(alias = "blockStep")]
    pub blockstep: String,
    #[serde(alias = "maxBlockTime")]
    pub maxblocktime: String,
}

/// Normalised alarm rule for one version. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmDefinition {
    pub version: String,
    pub name: String,
    pub measurement: String,
    pub expression: String,
    pub threshold: String,
    /// Check interval in minutes
    pub every_minutes: u64,
    pub level: Level,
    pub channels: Vec<String>,
    pub groups: Vec<String>,
    pub block_step_minutes: u64,
    pub max_block_minutes: u64,
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_bounded(raw: &str, min: u64, max: u64, default: u64) -> u64 {
    match raw.trim().parse::<i64>() {
        Ok(v) if v >= min as i64 => (v as u64).min(max),
        _ => default,
    }
}

impl AlarmDefinition {
    pub fn from_raw(raw: RawAlarm) -> Self {
        Self {
            every_minutes: parse_every(&raw.every),
            level: raw.level.parse().unwrap_or_default(),
            channels: split_list(&raw.alert),
            groups: split_list(&raw.groups),
            block_step_minutes: parse_bounded(
                &raw.blockstep,
                MIN_BLOCK_STEP_MINUTES,
                MAX_BLOCK_STEP_MINUTES,
                DEFAULT_BLOCK_STEP_MINUTES,
            ),
            max_block_minutes: parse_bounded(
                &raw.maxblocktime,
                MIN_MAX_BLOCK_MINUTES,
                MAX_MAX_BLOCK_MINUTES,
                DEFAULT_MAX_BLOCK_MINUTES,
            ),
            version: raw.version,
            name: raw.name,
            measurement: raw.measurement,
            expression: raw.expression,
            threshold: raw.value,
        }
    }

    /// Expression with its threshold, e.g. "> 90".
    pub fn condition(&self) -> String {
        format!("{}{}", self.expression, self.threshold)
    }
}

/// Parse an interval like "5", "5m" or "2h" into minutes; falls back to one
/// minute and never exceeds [`MAX_EVERY_MINUTES`].
pub fn parse_every(raw: &str) -> u64 {
    let raw = raw.trim();
    let (digits, scale) = if let Some(v) = raw.strip_suffix('h') {
        (v, 60)
    } else if let Some(v) = raw.strip_suffix('m') {
        (v, 1)
    } else {
        (raw, 1)
    };
    match digits.parse::<u64>() {
        Ok(v) if v > 0 => v.saturating_mul(scale).min(MAX_EVERY_MINUTES),
        _ => DEFAULT_EVERY_MINUTES,
    }
}
