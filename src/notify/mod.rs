// src/notify/mod.rs - Channel-keyed notification dispatch

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::NotifyConfig;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::models::{Level, NotifyData};
use crate::registry::UserDirectory;

pub mod render;
pub mod script;

pub use script::{ScriptKind, ScriptNotifier};

pub const MAIL: &str = "mail";
pub const SMS: &str = "sms";
pub const WECHAT: &str = "wechat";

/// Delivers a normalised message over one channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> &str;

    async fn notify(&self, data: &NotifyData) -> Result<()>;
}

#[derive(Default)]
pub struct NotifyDispatcher {
    notifiers: HashMap<String, Arc<dyn Notifier>>,
    metrics: Option<Arc<Metrics>>,
}

impl NotifyDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script sinks for every channel that has a script configured.
    pub fn from_config(config: &NotifyConfig, users: Arc<UserDirectory>) -> Self {
        let mut dispatcher = Self::new();
        let scripts = [
            (ScriptKind::Mail, &config.mail_script),
            (ScriptKind::Sms, &config.sms_script),
            (ScriptKind::Wechat, &config.wechat_script),
        ];
        for (kind, script) in scripts {
            match script {
                Some(path) if !path.is_empty() => {
                    dispatcher.register(Arc::new(ScriptNotifier::new(
                        kind,
                        path,
                        config,
                        users.clone(),
                    )));
                }
                _ => debug!(channel = kind.channel(), "No script configured"),
            }
        }
        info!(channels = ?dispatcher.channels(), "Notification channels ready");
        dispatcher
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Replaces any notifier already registered for the same channel.
    pub fn register(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.insert(notifier.channel().to_string(), notifier);
    }

    pub fn has_channel(&self, channel: &str) -> bool {
        self.notifiers.contains_key(channel)
    }

    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.notifiers.keys().cloned().collect();
        channels.sort();
        channels
    }

    /// Channel list for an alarm: order kept, duplicates and blanks removed,
    /// `wechat` added when the alarm itself is critical.
    pub fn resolve_channels(channels: &[String], level: Level) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut resolved: Vec<String> = channels
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .filter(|c| seen.insert(c.to_string()))
            .map(str::to_string)
            .collect();
        if level.is_critical() && !seen.contains(WECHAT) {
            resolved.push(WECHAT.to_string());
        }
        resolved
    }

    /// Send over each channel in turn. Stops at the first failing channel and
    /// returns its error; returns how many channels delivered otherwise.
    pub async fn dispatch(
        &self,
        channels: &[String],
        alarm_level: Level,
        data: &NotifyData,
    ) -> Result<usize> {
        let mut delivered = 0;
        for channel in Self::resolve_channels(channels, alarm_level) {
            let Some(notifier) = self.notifiers.get(&channel) else {
                warn!(channel = %channel, alarm = %data.alarm_name, "Unknown notify channel, skipping");
                continue;
            };

            let result = notifier.notify(data).await;
            if let Some(metrics) = &self.metrics {
                metrics.notification_sent(&channel, result.is_ok());
            }
            match result {
                Ok(()) => {
                    debug!(channel = %channel, ns = %data.ns, host = %data.host, "Notification delivered");
                    delivered += 1;
                }
                Err(e) => {
                    warn!(channel = %channel, ns = %data.ns, error = %e, "Notification failed");
                    return Err(e);
                }
            }
        }
        Ok(delivered)
    }
}
