// src/handler.rs - Per-event pipeline: status, suppression, notification

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::block::BlockEngine;
use crate::error::{AlertGateError, Result};
use crate::keyspace::NO_HOST;
use crate::metrics::Metrics;
use crate::models::{AlarmDefinition, EventData, Level, NotifyData, NotifyRequest};
use crate::notify::NotifyDispatcher;
use crate::registry::{AlarmCache, MachineInventory, UserDirectory};
use crate::status::{StatusEngine, TransitionLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Host is offline; nothing recorded or sent
    Dropped,
    /// Status recorded, notification withheld by the block engine
    Suppressed,
    Notified,
    /// Recovery: block state cleared and notification sent
    Recovered,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Dropped => "dropped",
            EventOutcome::Suppressed => "suppressed",
            EventOutcome::Notified => "notified",
            EventOutcome::Recovered => "recovered",
        }
    }
}

/// Services an event touches on its way through.
pub struct EventHandler {
    alarms: Arc<AlarmCache>,
    inventory: Arc<dyn MachineInventory>,
    users: Arc<UserDirectory>,
    status: Arc<StatusEngine>,
    blocks: Arc<BlockEngine>,
    dispatcher: Arc<NotifyDispatcher>,
    transitions: Arc<dyn TransitionLog>,
    metrics: Option<Arc<Metrics>>,
}

impl EventHandler {
    pub fn new(
        alarms: Arc<AlarmCache>,
        inventory: Arc<dyn MachineInventory>,
        users: Arc<UserDirectory>,
        status: Arc<StatusEngine>,
        blocks: Arc<BlockEngine>,
        dispatcher: Arc<NotifyDispatcher>,
        transitions: Arc<dyn TransitionLog>,
    ) -> Self {
        Self {
            alarms,
            inventory,
            users,
            status,
            blocks,
            dispatcher,
            transitions,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn dispatcher(&self) -> &NotifyDispatcher {
        &self.dispatcher
    }

    /// Run one alert event for alarm `version` of `ns`.
    ///
    /// An unknown alarm or an empty receiver list aborts the event. Status
    /// and block bookkeeping failures are logged; a delivery failure is
    /// returned after the status has been written.
    pub async fn handle_event(
        &self,
        ns: &str,
        version: &str,
        event: EventData,
    ) -> Result<EventOutcome> {
        let result = self.process(ns, version, event).await;
        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(outcome) => metrics.event_handled(outcome.as_str()),
                Err(_) => metrics.event_handled("error"),
            }
        }
        result
    }

    async fn process(&self, ns: &str, version: &str, mut event: EventData) -> Result<EventOutcome> {
        let alarm = self.alarms.get(ns, version).await.ok_or_else(|| {
            warn!(ns, version, "Event for unknown alarm");
            AlertGateError::AlarmNotFound {
                ns: ns.to_string(),
                version: version.to_string(),
            }
        })?;
        event.ns = ns.to_string();

        let host = match event.host() {
            Some(host) => host.to_string(),
            None => {
                debug!(ns, version, "Event carries no host tag");
                NO_HOST.to_string()
            }
        };

        if host != NO_HOST && self.inventory.is_offline(ns, &host).await {
            info!(ns, version, host = %host, "Host is offline, dropping event");
            return Ok(EventOutcome::Dropped);
        }

        let receivers = self.users.group_members(&alarm.groups).await;
        if receivers.is_empty() {
            return Err(AlertGateError::EmptyReceivers {
                ns: ns.to_string(),
                alarm: alarm.name.clone(),
            });
        }

        let ip = if host == NO_HOST {
            String::new()
        } else {
            self.inventory.machine_ip(ns, &host).await.unwrap_or_default()
        };

        let display = match self.users.display_names(&receivers).await {
            Ok(names) => names,
            Err(e) => {
                warn!(ns, error = %e, "User lookup failed, recording usernames");
                receivers.clone()
            }
        };
        if let Err(e) = self
            .status
            .update_status(&alarm, &host, &ip, &event, display)
            .await
        {
            warn!(ns, version, host = %host, error = %e, "Failed to update status");
        }

        let tags = event.target_tags();
        if event.level.is_ok() {
            if let Err(e) = self.blocks.clear_block(ns, &alarm.version, &host, &tags).await {
                warn!(ns, version, host = %host, error = %e, "Failed to clear block state");
            }
            self.send(&alarm, &host, &ip, &event, receivers).await?;
            return Ok(EventOutcome::Recovered);
        }

        let blocked = self.blocks.is_block(ns, &alarm, &host, &tags).await;
        if let Some(metrics) = &self.metrics {
            metrics.block_decision(blocked);
        }
        if blocked {
            debug!(ns, version, host = %host, "Notification suppressed");
            return Ok(EventOutcome::Suppressed);
        }

        self.send(&alarm, &host, &ip, &event, receivers).await?;
        Ok(EventOutcome::Notified)
    }

    async fn send(
        &self,
        alarm: &AlarmDefinition,
        host: &str,
        ip: &str,
        event: &EventData,
        receivers: Vec<String>,
    ) -> Result<()> {
        let data = NotifyData::from_event(event, &alarm.name, &alarm.condition(), host, ip, receivers);
        self.transitions.alarm_sent(&data).await;
        self.dispatcher
            .dispatch(&alarm.channels, alarm.level, &data)
            .await?;
        Ok(())
    }

    /// Send a free-text message to the members of `groups` over the listed
    /// channels. Every channel must be known.
    pub async fn notify_groups(&self, request: NotifyRequest) -> Result<usize> {
        let types: Vec<String> = request
            .types
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if types.is_empty() || request.content.is_empty() || request.groups.is_empty() {
            return Err(AlertGateError::InvalidRequest(
                "types, content and groups are required".to_string(),
            ));
        }
        if let Some(unknown) = types.iter().find(|t| !self.dispatcher.has_channel(t)) {
            return Err(AlertGateError::UnknownChannel(unknown.clone()));
        }

        let receivers = self.users.group_members(&request.groups).await;
        if receivers.is_empty() {
            return Err(AlertGateError::EmptyReceivers {
                ns: String::new(),
                alarm: request.subject,
            });
        }

        let data = NotifyData::message(receivers, &request.subject, &request.content);
        info!(
            subject = %request.subject,
            receivers = data.receivers.len(),
            channels = ?types,
            "Sending ad-hoc notification"
        );
        self.dispatcher.dispatch(&types, Level::Unknown, &data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawAlarm;
    use crate::notify::Notifier;
    use crate::registry::{FixtureRegistry, Group, MachineCache, User};
    use crate::status::TracingTransitionLog;
    use crate::store::faulty::FaultyStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<NotifyData>>,
    }

    #[async_trait]
    impl Notifier for Recorder {
        fn channel(&self) -> &str {
            "mail"
        }

        async fn notify(&self, data: &NotifyData) -> Result<()> {
            self.sent.lock().unwrap().push(data.clone());
            Ok(())
        }
    }

    struct Harness {
        handler: EventHandler,
        registry: Arc<FixtureRegistry>,
        machines: Arc<MachineCache>,
        alarms: Arc<AlarmCache>,
        mail: Arc<Recorder>,
        store: Arc<FaultyStore>,
    }

    async fn harness() -> Harness {
        let registry = Arc::new(FixtureRegistry::new());
        registry.set_alarms(
            "web",
            vec![RawAlarm {
                name: "cpu high".into(),
                version: "v1".into(),
                measurement: "cpu.idle".into(),
                level: "2".into(),
                alert: "mail".into(),
                groups: "ops".into(),
                ..Default::default()
            }],
        );
        registry.set_group(Group {
            gname: "ops".into(),
            managers: vec!["alice".into()],
            members: vec![],
        });
        registry.set_user(User {
            username: "alice".into(),
            mobile: "13800000000".into(),
        });
        registry.add_machine("web", "h1", "10.0.0.1");

        let alarms = Arc::new(AlarmCache::new(registry.clone()));
        alarms.refresh().await.unwrap();
        let machines = Arc::new(MachineCache::new(registry.clone()));
        machines.refresh(&["web".to_string()]).await.unwrap();

        let store = Arc::new(FaultyStore::new());
        let transitions: Arc<dyn TransitionLog> = Arc::new(TracingTransitionLog);
        let users = Arc::new(UserDirectory::new(
            registry.clone(),
            "loda-defaultuser".into(),
            Duration::from_secs(60),
        ));
        let mail = Arc::new(Recorder::default());
        let mut dispatcher = NotifyDispatcher::new();
        dispatcher.register(mail.clone());

        let handler = EventHandler::new(
            alarms.clone(),
            machines.clone(),
            users,
            Arc::new(StatusEngine::new(store.clone(), transitions.clone())),
            Arc::new(BlockEngine::new(store.clone())),
            Arc::new(dispatcher),
            transitions,
        );
        Harness {
            handler,
            registry,
            machines,
            alarms,
            mail,
            store,
        }
    }

    fn event(host: &str, level: &str) -> EventData {
        serde_json::from_value(serde_json::json!({
            "time": "2024-05-01T10:00:00Z",
            "level": level,
            "data": {"series": [{
                "name": "cpu.idle",
                "tags": {"host": host},
                "columns": ["time", "value"],
                "values": [["2024-05-01T10:00:00Z", 3.5]]
            }]}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_warn_then_repeat_then_recover() {
        let h = harness().await;

        let first = h.handler.handle_event("web", "v1", event("h1", "2")).await.unwrap();
        assert_eq!(first, EventOutcome::Notified);
        let second = h.handler.handle_event("web", "v1", event("h1", "2")).await.unwrap();
        assert_eq!(second, EventOutcome::Suppressed);
        let third = h.handler.handle_event("web", "v1", event("h1", "OK")).await.unwrap();
        assert_eq!(third, EventOutcome::Recovered);

        let sent = h.mail.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].ip, "10.0.0.1");
        assert_eq!(sent[0].receivers, vec!["alice".to_string()]);
        assert_eq!(sent[1].level, Level::Ok);
    }

    #[tokio::test]
    async fn test_unknown_alarm_is_rejected() {
        let h = harness().await;
        let result = h.handler.handle_event("web", "v9", event("h1", "2")).await;
        assert!(matches!(result, Err(AlertGateError::AlarmNotFound { .. })));
        assert!(h.store.inner().is_empty());
    }

    #[tokio::test]
    async fn test_offline_host_is_dropped() {
        let h = harness().await;
        h.registry.set_offline("web", "h1");
        h.machines.refresh(&["web".to_string()]).await.unwrap();

        let outcome = h.handler.handle_event("web", "v1", event("h1", "2")).await.unwrap();
        assert_eq!(outcome, EventOutcome::Dropped);
        assert!(h.store.inner().is_empty());
        assert!(h.mail.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_receivers_abort() {
        let h = harness().await;
        h.registry.set_group(Group {
            gname: "ops".into(),
            ..Default::default()
        });
        let result = h.handler.handle_event("web", "v1", event("h1", "2")).await;
        assert!(matches!(result, Err(AlertGateError::EmptyReceivers { .. })));
        assert!(h.store.inner().is_empty());
    }

    #[tokio::test]
    async fn test_suppressed_event_still_updates_status() {
        let h = harness().await;
        h.handler.handle_event("web", "v1", event("h1", "2")).await.unwrap();
        h.handler.handle_event("web", "v1", event("h1", "1")).await.unwrap();

        let status = h
            .handler
            .status
            .get_status_from_cluster("web", "v1", "h1", crate::keyspace::EMPTY_TAGS)
            .await
            .unwrap();
        assert_eq!(status.level, Level::Critical);
        assert_eq!(status.receivers, vec!["alice(13800000000)".to_string()]);
        assert_eq!(h.alarms.snapshot().await.version_count(), 1);
    }

    #[tokio::test]
    async fn test_status_write_failure_still_notifies() {
        let h = harness().await;
        h.store.fail("set");

        let outcome = h.handler.handle_event("web", "v1", event("h1", "2")).await.unwrap();
        assert_eq!(outcome, EventOutcome::Notified);
        assert_eq!(h.mail.sent.lock().unwrap().len(), 1);
        assert!(h
            .store
            .inner()
            .keys()
            .iter()
            .all(|k| !k.ends_with("/status")));
    }

    #[tokio::test]
    async fn test_notify_groups_validates_channels() {
        let h = harness().await;
        let request = NotifyRequest {
            types: vec!["pager".into()],
            subject: "deploy".into(),
            content: "done".into(),
            groups: vec!["ops".into()],
        };
        assert!(matches!(
            h.handler.notify_groups(request.clone()).await,
            Err(AlertGateError::UnknownChannel(_))
        ));

        let request = NotifyRequest {
            types: vec!["mail".into()],
            ..request
        };
        assert_eq!(h.handler.notify_groups(request).await.unwrap(), 1);
        assert_eq!(h.mail.sent.lock().unwrap()[0].msg, "done");
    }
}
