// src/metrics.rs - Prometheus metrics for the event pipeline

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use crate::error::{AlertGateError, Result};
use crate::reconciler::ReconcileReport;

#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,

    // Event pipeline
    pub events_total: IntCounterVec,
    pub notifications_total: IntCounterVec,
    pub block_decisions_total: IntCounterVec,

    // Background loops
    pub reconcile_mutations_total: IntCounterVec,
    pub status_targets: IntGauge,
    pub status_rebuild_duration: Histogram,
    pub alarm_versions: IntGauge,
    pub registry_refresh_failures_total: IntCounterVec,
    pub loop_failures_total: IntCounterVec,

    // HTTP
    pub request_duration: HistogramVec,
    pub request_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let events_total = IntCounterVec::new(
            Opts::new("alertgate_events_total", "Alert events handled by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(events_total.clone()))?;

        let notifications_total = IntCounterVec::new(
            Opts::new("alertgate_notifications_total", "Notifications by channel and result"),
            &["channel", "result"],
        )?;
        registry.register(Box::new(notifications_total.clone()))?;

        let block_decisions_total = IntCounterVec::new(
            Opts::new("alertgate_block_decisions_total", "Suppression decisions"),
            &["decision"],
        )?;
        registry.register(Box::new(block_decisions_total.clone()))?;

        let reconcile_mutations_total = IntCounterVec::new(
            Opts::new(
                "alertgate_reconcile_mutations_total",
                "Store mutations made by the reconciler by kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(reconcile_mutations_total.clone()))?;

        let status_targets = IntGauge::new(
            "alertgate_status_targets",
            "Targets in the in-memory status snapshot",
        )?;
        registry.register(Box::new(status_targets.clone()))?;

        let status_rebuild_duration = Histogram::with_opts(
            HistogramOpts::new(
                "alertgate_status_rebuild_duration_seconds",
                "Duration of a status snapshot rebuild",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        registry.register(Box::new(status_rebuild_duration.clone()))?;

        let alarm_versions = IntGauge::new(
            "alertgate_alarm_versions",
            "Alarm versions held by the registry cache",
        )?;
        registry.register(Box::new(alarm_versions.clone()))?;

        let registry_refresh_failures_total = IntCounterVec::new(
            Opts::new(
                "alertgate_registry_refresh_failures_total",
                "Failed registry fetches by source",
            ),
            &["source"],
        )?;
        registry.register(Box::new(registry_refresh_failures_total.clone()))?;

        let loop_failures_total = IntCounterVec::new(
            Opts::new("alertgate_loop_failures_total", "Failed background loop cycles"),
            &["loop"],
        )?;
        registry.register(Box::new(loop_failures_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "alertgate_request_duration_seconds",
                "Duration of HTTP requests in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["route", "status"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        let request_total = IntCounterVec::new(
            Opts::new("alertgate_requests_total", "Total number of HTTP requests"),
            &["route", "status"],
        )?;
        registry.register(Box::new(request_total.clone()))?;

        Ok(Self {
            registry,
            events_total,
            notifications_total,
            block_decisions_total,
            reconcile_mutations_total,
            status_targets,
            status_rebuild_duration,
            alarm_versions,
            registry_refresh_failures_total,
            loop_failures_total,
            request_duration,
            request_total,
        })
    }

    pub fn event_handled(&self, outcome: &str) {
        self.events_total.with_label_values(&[outcome]).inc();
    }

    pub fn notification_sent(&self, channel: &str, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.notifications_total
            .with_label_values(&[channel, result])
            .inc();
    }

    pub fn block_decision(&self, blocked: bool) {
        let decision = if blocked { "blocked" } else { "passed" };
        self.block_decisions_total.with_label_values(&[decision]).inc();
    }

    pub fn reconcile_finished(&self, report: &ReconcileReport) {
        let kinds = [
            ("namespace_removed", report.namespaces_removed),
            ("alarm_removed", report.alarms_removed),
            ("host_removed", report.hosts_removed),
            ("namespace_created", report.namespaces_created),
            ("alarm_created", report.alarms_created),
        ];
        for (kind, count) in kinds {
            if count > 0 {
                self.reconcile_mutations_total
                    .with_label_values(&[kind])
                    .inc_by(count as u64);
            }
        }
    }

    pub fn status_rebuild_started(&self) -> prometheus::HistogramTimer {
        self.status_rebuild_duration.start_timer()
    }

    pub fn status_rebuilt(&self, targets: usize) {
        self.status_targets.set(targets as i64);
    }

    pub fn alarms_refreshed(&self, versions: usize, failed_namespaces: usize) {
        self.alarm_versions.set(versions as i64);
        if failed_namespaces > 0 {
            self.registry_refresh_failures_total
                .with_label_values(&["alarms"])
                .inc_by(failed_namespaces as u64);
        }
    }

    pub fn registry_refresh_failed(&self, source: &str) {
        self.registry_refresh_failures_total
            .with_label_values(&[source])
            .inc();
    }

    pub fn loop_failed(&self, name: &str) {
        self.loop_failures_total.with_label_values(&[name]).inc();
    }

    pub fn record_request(&self, route: &str, status: &str, duration: f64) {
        self.request_duration
            .with_label_values(&[route, status])
            .observe(duration);
        self.request_total.with_label_values(&[route, status]).inc();
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Prometheus text exposition of every registered metric.
    pub fn export_text(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.gather(), &mut buffer)
            .map_err(|e| AlertGateError::Internal(format!("encode metrics: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| AlertGateError::Internal(format!("metrics are not utf-8: {}", e)))
    }
}
