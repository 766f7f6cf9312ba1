// src/models/status.rs - Persisted status record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alarm::Level;
use super::event::TagMap;
use crate::error::Result;

/// Round to two decimal places. Non-finite input becomes 0 so the record
/// stays representable in JSON.
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}

/// Persisted state of one target.
///
/// `created_at` marks when the current level was first reached and is kept
/// across writes at the same level. `last_time` is derived at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub ns: String,
    pub alarm_version: String,
    /// Alarm display name
    pub alarm: String,
    pub measurement: String,
    pub host: String,
    #[serde(default)]
    pub ip: String,
    pub level: Level,
    pub value: f64,
    #[serde(default)]
    pub tags: TagMap,
    #[serde(default)]
    pub receivers: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Seconds spent at the current level
    #[serde(default)]
    pub last_time: i64,
    #[serde(default)]
    pub msg: String,
}

impl Status {
    pub fn to_record(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_record(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Copy with `last_time` filled in relative to `now`.
    pub fn with_last_time(&self, now: DateTime<Utc>) -> Self {
        let mut status = self.clone();
        status.last_time = (now - self.created_at).num_seconds().max(0);
        status
    }
}
