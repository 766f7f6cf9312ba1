// src/status/transitions.rs - Sink for status transitions and sent alarms

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::TransitionLogConfig;
use crate::error::{AlertGateError, Result};
use crate::models::{round2, NotifyData, Status};

const ALARM_METRIC: &str = "alert";
const STATUS_METRIC: &str = "statusv2";

/// Receives the history of a target's levels. Implementations never fail the
/// caller; delivery problems are logged.
#[async_trait]
pub trait TransitionLog: Send + Sync {
    /// First status seen for a target.
    async fn new_status(&self, status: &Status);

    /// Level changed; `old.created_at` marks when the old level started.
    async fn status_changed(&self, old: &Status, new: &Status);

    /// A notification went out.
    async fn alarm_sent(&self, data: &NotifyData);
}

/// Writes transitions as structured log records.
#[derive(Debug, Default)]
pub struct TracingTransitionLog;

#[async_trait]
impl TransitionLog for TracingTransitionLog {
    async fn new_status(&self, status: &Status) {
        info!(
            ns = %status.ns,
            version = %status.alarm_version,
            host = %status.host,
            level = %status.level,
            value = status.value,
            "New status"
        );
    }

    async fn status_changed(&self, old: &Status, new: &Status) {
        info!(
            ns = %new.ns,
            version = %new.alarm_version,
            host = %new.host,
            from = %old.level,
            to = %new.level,
            last_seconds = (Utc::now() - old.created_at).num_seconds().max(0),
            "Status changed"
        );
    }

    async fn alarm_sent(&self, data: &NotifyData) {
        info!(
            ns = %data.ns,
            alarm = %data.alarm_name,
            host = %data.host,
            level = %data.level,
            receivers = data.receivers.len(),
            "Alarm sent"
        );
    }
}

/// Point in the event log's metric format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionPoint {
    pub name: String,
    pub timestamp: i64,
    pub tags: BTreeMap<String, String>,
    pub value: f64,
}

impl TransitionPoint {
    #[allow(clippy::too_many_arguments)]
    fn new(
        name: &str,
        alarm: &str,
        ns: &str,
        measurement: &str,
        host: &str,
        level: &str,
        receivers: &[String],
        value: f64,
    ) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert("alertname".to_string(), alarm.to_string());
        tags.insert("host".to_string(), host.to_string());
        tags.insert("measurement".to_string(), measurement.to_string());
        tags.insert("ns".to_string(), ns.to_string());
        tags.insert("level".to_string(), level.to_string());
        tags.insert("to".to_string(), receivers.join("\\,"));

        Self {
            name: name.to_string(),
            timestamp: Utc::now().timestamp(),
            tags,
            value: round2(value),
        }
    }

    fn from_status(status: &Status) -> Self {
        Self::new(
            STATUS_METRIC,
            &status.alarm,
            &status.ns,
            &status.measurement,
            &status.host,
            status.level.as_str(),
            &status.receivers,
            status.value,
        )
    }

    fn with_last(mut self, seconds: i64) -> Self {
        self.tags.insert("last".to_string(), seconds.to_string());
        self
    }
}

/// Posts transitions to an HTTP event log under a configured namespace.
pub struct HttpTransitionLog {
    client: reqwest::Client,
    url: Url,
}

impl HttpTransitionLog {
    pub fn new(config: &TransitionLogConfig, endpoint: &str) -> Result<Self> {
        let mut url = Url::parse(endpoint).map_err(|e| {
            AlertGateError::Configuration(format!("invalid transition log endpoint {}: {}", endpoint, e))
        })?;
        url.query_pairs_mut().append_pair("ns", &config.ns);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| AlertGateError::Configuration(format!("transition log client: {}", e)))?;

        Ok(Self { client, url })
    }

    async fn post(&self, points: &[TransitionPoint]) {
        let result = self.client.post(self.url.clone()).json(points).send().await;
        match result {
            Ok(response) if response.status().is_success() => {
                debug!(points = points.len(), "Transition log posted");
            }
            Ok(response) => warn!(status = %response.status(), "Transition log rejected points"),
            Err(e) => warn!(error = %e, "Failed to post transition log"),
        }
    }
}

#[async_trait]
impl TransitionLog for HttpTransitionLog {
    async fn new_status(&self, status: &Status) {
        self.post(&[TransitionPoint::from_status(status).with_last(0)])
            .await;
    }

    async fn status_changed(&self, old: &Status, _new: &Status) {
        let last = (Utc::now() - old.created_at).num_seconds().max(0);
        self.post(&[TransitionPoint::from_status(old).with_last(last)])
            .await;
    }

    async fn alarm_sent(&self, data: &NotifyData) {
        let point = TransitionPoint::new(
            ALARM_METRIC,
            &data.alarm_name,
            &data.ns,
            &data.measurement,
            &data.host,
            data.level.as_str(),
            &data.receivers,
            data.value,
        );
        self.post(&[point]).await;
    }
}

/// Pick the sink from configuration.
pub fn create_transition_log(config: &TransitionLogConfig) -> Result<Arc<dyn TransitionLog>> {
    match config.endpoint.as_deref() {
        Some(endpoint) if !endpoint.is_empty() => {
            info!(endpoint, ns = %config.ns, "Posting status transitions over HTTP");
            Ok(Arc::new(HttpTransitionLog::new(config, endpoint)?))
        }
        _ => Ok(Arc::new(TracingTransitionLog)),
    }
}
