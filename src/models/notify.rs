// src/models/notify.rs - Normalised notification records

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::alarm::Level;
use super::event::{EventData, TagMap};
use super::status::round2;

/// Normalised message handed to every notification channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotifyData {
    /// Usernames
    pub receivers: Vec<String>,
    pub ns: String,
    pub host: String,
    pub ip: String,
    pub measurement: String,
    pub level: Level,
    pub tags: TagMap,
    pub value: f64,
    pub time: DateTime<Local>,
    pub alarm_name: String,
    pub expression: String,
    /// Free text; replaces the rendered alert body when set
    pub msg: String,
}

impl NotifyData {
    pub fn from_event(
        event: &EventData,
        alarm_name: &str,
        expression: &str,
        host: &str,
        ip: &str,
        receivers: Vec<String>,
    ) -> Self {
        Self {
            receivers,
            ns: event.ns.clone(),
            host: host.to_string(),
            ip: ip.to_string(),
            measurement: event.measurement().to_string(),
            level: event.level,
            tags: event.tags(),
            value: round2(event.value()),
            time: event.local_time(),
            alarm_name: alarm_name.to_string(),
            expression: expression.to_string(),
            msg: String::new(),
        }
    }

    /// Free-text message with no alert context.
    pub fn message(receivers: Vec<String>, subject: &str, content: &str) -> Self {
        Self {
            receivers,
            ns: String::new(),
            host: String::new(),
            ip: String::new(),
            measurement: String::new(),
            level: Level::Unknown,
            tags: TagMap::new(),
            value: 0.0,
            time: Local::now(),
            alarm_name: subject.to_string(),
            expression: String::new(),
            msg: content.to_string(),
        }
    }

    pub fn is_free_text(&self) -> bool {
        !self.msg.is_empty()
    }
}

/// Ad-hoc notification request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyRequest {
    pub types: Vec<String>,
    pub subject: String,
    pub content: String,
    pub groups: Vec<String>,
}
