// src/service/loops.rs - Periodic refresh, rebuild and reconcile tasks

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::metrics::Metrics;
use crate::reconciler::Reconciler;
use crate::registry::{AlarmCache, MachineCache};
use crate::shutdown::TaskHandle;
use crate::status::StatusEngine;

#[derive(Debug, Clone)]
pub struct LoopIntervals {
    pub alarm_refresh: Duration,
    pub machine_refresh: Duration,
    pub status_rebuild: Duration,
    pub reconcile: Duration,
    /// Poll period of the reconciler while the alarm cache is still empty
    pub startup_poll: Duration,
}

impl LoopIntervals {
    pub fn from_config(config: &Config) -> Self {
        Self {
            alarm_refresh: config.alarm_refresh_interval(),
            machine_refresh: config.machine_refresh_interval(),
            status_rebuild: config.status_rebuild_interval(),
            reconcile: config.reconcile_interval(),
            startup_poll: config.startup_poll_interval(),
        }
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// The long-running tasks of the service. Each `run_*` method loops until
/// its handle is signalled and marks the task completed on the way out.
#[derive(Clone)]
pub struct BackgroundLoops {
    pub(crate) alarms: Arc<AlarmCache>,
    pub(crate) machines: Arc<MachineCache>,
    pub(crate) status: Arc<StatusEngine>,
    pub(crate) reconciler: Arc<Reconciler>,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) intervals: LoopIntervals,
}

impl BackgroundLoops {
    pub fn new(
        alarms: Arc<AlarmCache>,
        machines: Arc<MachineCache>,
        status: Arc<StatusEngine>,
        reconciler: Arc<Reconciler>,
        metrics: Arc<Metrics>,
        intervals: LoopIntervals,
    ) -> Self {
        Self {
            alarms,
            machines,
            status,
            reconciler,
            metrics,
            intervals,
        }
    }

    pub async fn refresh_alarms_once(&self) {
        match self.alarms.refresh().await {
            Ok(report) => {
                let snapshot = self.alarms.snapshot().await;
                self.metrics
                    .alarms_refreshed(snapshot.version_count(), report.failed.len());
            }
            Err(e) => {
                error!(error = %e, "Alarm refresh failed, keeping previous cache");
                self.metrics.registry_refresh_failed("namespaces");
                self.metrics.loop_failed("alarm_refresh");
            }
        }
    }

    pub async fn refresh_machines_once(&self) {
        let namespaces = self.alarms.snapshot().await.namespaces();
        if namespaces.is_empty() {
            debug!("No namespaces known yet, skipping machine refresh");
            return;
        }
        match self.machines.refresh(&namespaces).await {
            Ok(0) => {}
            Ok(failed) => {
                warn!(failed, "Some machine lists could not be fetched");
                for _ in 0..failed {
                    self.metrics.registry_refresh_failed("machines");
                }
            }
            Err(e) => {
                error!(error = %e, "Machine refresh failed");
                self.metrics.loop_failed("machine_refresh");
            }
        }
    }

    pub async fn rebuild_status_once(&self) {
        let timer = self.metrics.status_rebuild_started();
        match self.status.gen_global_status().await {
            Ok(targets) => {
                timer.observe_duration();
                self.metrics.status_rebuilt(targets);
            }
            Err(e) => {
                timer.stop_and_discard();
                error!(error = %e, "Status rebuild failed, keeping previous snapshot");
                self.metrics.loop_failed("status_rebuild");
            }
        }
    }

    pub async fn reconcile_once(&self) {
        match self.reconciler.reconcile().await {
            Ok(report) => self.metrics.reconcile_finished(&report),
            Err(e) => {
                error!(error = %e, "Reconcile cycle failed");
                self.metrics.loop_failed("reconciler");
            }
        }
    }

    pub async fn run_alarm_refresh(self, mut handle: TaskHandle) {
        info!(interval = ?self.intervals.alarm_refresh, "🔄 Alarm refresh loop started");
        let mut ticker = ticker(self.intervals.alarm_refresh);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.refresh_alarms_once().await,
                _ = handle.wait_for_shutdown() => break,
            }
        }
        info!("Alarm refresh loop stopped");
        handle.mark_completed().await;
    }

    pub async fn run_machine_refresh(self, mut handle: TaskHandle) {
        info!(interval = ?self.intervals.machine_refresh, "🔄 Machine refresh loop started");
        let mut ticker = ticker(self.intervals.machine_refresh);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.refresh_machines_once().await,
                _ = handle.wait_for_shutdown() => break,
            }
        }
        info!("Machine refresh loop stopped");
        handle.mark_completed().await;
    }

    pub async fn run_status_rebuild(self, mut handle: TaskHandle) {
        info!(interval = ?self.intervals.status_rebuild, "📊 Status rebuild loop started");
        let mut ticker = ticker(self.intervals.status_rebuild);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.rebuild_status_once().await,
                _ = handle.wait_for_shutdown() => break,
            }
        }
        info!("Status rebuild loop stopped");
        handle.mark_completed().await;
    }

    /// Waits for the first populated alarm cache, then reconciles on every
    /// tick.
    pub async fn run_reconciler(self, mut handle: TaskHandle) {
        if !self
            .alarms
            .wait_until_populated(self.intervals.startup_poll, &mut handle)
            .await
        {
            info!("Reconciler stopped before the alarm cache was populated");
            handle.mark_completed().await;
            return;
        }

        info!(interval = ?self.intervals.reconcile, "🧹 Reconciler loop started");
        let mut ticker = ticker(self.intervals.reconcile);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.reconcile_once().await,
                _ = handle.wait_for_shutdown() => break,
            }
        }
        info!("Reconciler loop stopped");
        handle.mark_completed().await;
    }

    /// Purges store data of alarm versions as soon as a refresh drops them.
    pub async fn run_removal_listener(self, mut handle: TaskHandle) {
        let mut removals = self.alarms.subscribe_removals();
        loop {
            tokio::select! {
                removed = removals.recv() => match removed {
                    Ok(removed) => {
                        if let Err(e) = self.reconciler.purge_alarm(&removed.ns, &removed.version).await {
                            warn!(ns = %removed.ns, version = %removed.version, error = %e, "Failed to purge removed alarm");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Removal listener lagged; the reconciler will catch up");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = handle.wait_for_shutdown() => break,
            }
        }
        debug!("Removal listener stopped");
        handle.mark_completed().await;
    }
}
