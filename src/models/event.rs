// src/models/event.rs - Alert callback payload

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::alarm::Level;

pub const HOST_TAG: &str = "host";

pub type TagMap = BTreeMap<String, String>;

/// Body of an alert callback from the alerting engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub message: String,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub duration: i64,
    pub level: Level,
    #[serde(default)]
    pub data: EventResult,
    /// Attached by the handler, never read from the wire.
    #[serde(skip)]
    pub ns: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventResult {
    #[serde(default, alias = "Series")]
    pub series: Vec<Row>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Row {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tags: TagMap,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}

impl EventData {
    fn first_series(&self) -> Option<&Row> {
        self.data.series.first()
    }

    /// Host tag of the first series. Series are grouped by host upstream, so
    /// the first one is representative; cluster-mode alarms carry none.
    pub fn host(&self) -> Option<&str> {
        self.first_series()
            .and_then(|row| row.tags.get(HOST_TAG))
            .map(String::as_str)
            .filter(|h| !h.is_empty())
    }

    pub fn tags(&self) -> TagMap {
        self.first_series()
            .map(|row| row.tags.clone())
            .unwrap_or_default()
    }

    /// Tags identifying the target within its host: every tag but `host`.
    pub fn target_tags(&self) -> TagMap {
        let mut tags = self.tags();
        tags.remove(HOST_TAG);
        tags
    }

    pub fn measurement(&self) -> &str {
        self.first_series().map(|row| row.name.as_str()).unwrap_or("")
    }

    /// Value of the first point, or 0 when the event carries none or a
    /// non-finite one.
    pub fn value(&self) -> f64 {
        self.first_series()
            .and_then(|row| row.values.first())
            .and_then(|point| point.get(1))
            .and_then(|v| match v {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::String(s) => s.parse().ok(),
                _ => None,
            })
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }

    pub fn local_time(&self) -> DateTime<Local> {
        self.time.with_timezone(&Local)
    }
}
