// src/service/mod.rs - Composition root wiring caches, engines and tasks

mod http;
mod loops;

pub use http::{namespace_of, routes, serve, Envelope, HttpApi, VERSION_SEPARATOR};
pub use loops::{BackgroundLoops, LoopIntervals};

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use crate::block::BlockEngine;
use crate::config::Config;
use crate::error::{AlertGateError, Result};
use crate::handler::EventHandler;
use crate::metrics::Metrics;
use crate::notify::NotifyDispatcher;
use crate::reconciler::Reconciler;
use crate::registry::{AlarmCache, MachineCache, RegistryClient, UserDirectory};
use crate::shutdown::{ShutdownCoordinator, TaskPriority, TaskType};
use crate::status::{create_transition_log, StatusEngine, TransitionLog};
use crate::store::CoordinationStore;

/// Owns every long-lived component of the service.
#[derive(Clone)]
pub struct AlertGateService {
    pub(crate) config: Arc<Config>,
    pub(crate) store: Arc<dyn CoordinationStore>,
    pub(crate) metrics: Arc<Metrics>,
    alarms: Arc<AlarmCache>,
    machines: Arc<MachineCache>,
    status: Arc<StatusEngine>,
    reconciler: Arc<Reconciler>,
    handler: Arc<EventHandler>,
}

impl AlertGateService {
    /// Build the service with the transition log and notification channels
    /// described by `config`.
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn CoordinationStore>,
        registry: Arc<dyn RegistryClient>,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let transitions = create_transition_log(&config.transition_log)?;
        let users = Self::user_directory(&config, registry.clone());
        let dispatcher = NotifyDispatcher::from_config(&config.notify, users.clone())
            .with_metrics(metrics.clone());
        Ok(Self::from_parts(
            config,
            store,
            registry,
            users,
            transitions,
            dispatcher,
            metrics,
        ))
    }

    pub fn user_directory(config: &Config, registry: Arc<dyn RegistryClient>) -> Arc<UserDirectory> {
        Arc::new(UserDirectory::new(
            registry,
            config.registry.default_user.clone(),
            config.user_cache_ttl(),
        ))
    }

    /// Build the service around an explicit transition log and dispatcher.
    pub fn from_parts(
        config: Arc<Config>,
        store: Arc<dyn CoordinationStore>,
        registry: Arc<dyn RegistryClient>,
        users: Arc<UserDirectory>,
        transitions: Arc<dyn TransitionLog>,
        dispatcher: NotifyDispatcher,
        metrics: Arc<Metrics>,
    ) -> Self {
        let alarms = Arc::new(AlarmCache::new(registry.clone()));
        let machines = Arc::new(MachineCache::new(registry));
        let status = Arc::new(StatusEngine::new(store.clone(), transitions.clone()));
        let blocks = Arc::new(BlockEngine::new(store.clone()));
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            alarms.clone(),
            machines.clone(),
        ));
        let handler = Arc::new(
            EventHandler::new(
                alarms.clone(),
                machines.clone(),
                users,
                status.clone(),
                blocks,
                Arc::new(dispatcher),
                transitions,
            )
            .with_metrics(metrics.clone()),
        );

        Self {
            config,
            store,
            metrics,
            alarms,
            machines,
            status,
            reconciler,
            handler,
        }
    }

    pub fn alarms(&self) -> &Arc<AlarmCache> {
        &self.alarms
    }

    pub fn machines(&self) -> &Arc<MachineCache> {
        &self.machines
    }

    pub fn status(&self) -> &Arc<StatusEngine> {
        &self.status
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn handler(&self) -> &Arc<EventHandler> {
        &self.handler
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn loops(&self) -> BackgroundLoops {
        BackgroundLoops::new(
            self.alarms.clone(),
            self.machines.clone(),
            self.status.clone(),
            self.reconciler.clone(),
            self.metrics.clone(),
            LoopIntervals::from_config(&self.config),
        )
    }

    pub fn api(&self) -> Arc<HttpApi> {
        Arc::new(HttpApi::new(
            self.handler.clone(),
            self.status.clone(),
            self.metrics.clone(),
            self.config.metrics.enabled,
        ))
    }

    fn listen_addr(&self) -> Result<SocketAddr> {
        let raw = format!("{}:{}", self.config.server.host, self.config.server.port);
        raw.parse()
            .map_err(|e| AlertGateError::Configuration(format!("invalid listen address {}: {}", raw, e)))
    }

    /// Register and spawn the background loops and the HTTP server.
    pub async fn start(&self, coordinator: &ShutdownCoordinator) -> Result<()> {
        let addr = self.listen_addr()?;
        info!(
            "🚀 Starting alertgate on {} (store: {})",
            addr,
            self.store.backend_name()
        );

        let loops = self.loops();

        let handle = coordinator
            .register_task("alarm-refresh", TaskType::AlarmRefresh, TaskPriority::Normal)
            .await;
        let task = tokio::spawn(loops.clone().run_alarm_refresh(handle));
        coordinator.attach("alarm-refresh", task).await;

        let handle = coordinator
            .register_task("machine-refresh", TaskType::MachineRefresh, TaskPriority::Normal)
            .await;
        let task = tokio::spawn(loops.clone().run_machine_refresh(handle));
        coordinator.attach("machine-refresh", task).await;

        let handle = coordinator
            .register_task("status-rebuild", TaskType::StatusRebuild, TaskPriority::Normal)
            .await;
        let task = tokio::spawn(loops.clone().run_status_rebuild(handle));
        coordinator.attach("status-rebuild", task).await;

        let handle = coordinator
            .register_task("reconciler", TaskType::Reconciler, TaskPriority::High)
            .await;
        let task = tokio::spawn(loops.clone().run_reconciler(handle));
        coordinator.attach("reconciler", task).await;

        let handle = coordinator
            .register_task(
                "alarm-removals",
                TaskType::Custom("alarm-removals".to_string()),
                TaskPriority::High,
            )
            .await;
        let task = tokio::spawn(loops.run_removal_listener(handle));
        coordinator.attach("alarm-removals", task).await;

        let handle = coordinator
            .register_task("http-server", TaskType::HttpServer, TaskPriority::Low)
            .await;
        let api = self.api();
        let task = tokio::spawn(async move {
            if let Err(e) = serve(api, addr, handle.clone()).await {
                error!("❌ HTTP server failed: {}", e);
                handle.mark_failed(e.to_string()).await;
            }
        });
        coordinator.attach("http-server", task).await;

        info!("✅ All tasks started");
        Ok(())
    }
}
