// src/startup.rs - Builds the collaborators from config and runs the service

use std::sync::Arc;
use tracing::{error, info};

use crate::config::Config;
use crate::dependencies::DependencyChecker;
use crate::error::{AlertGateError, Result};
use crate::metrics::Metrics;
use crate::registry::{create_registry, RegistryClient};
use crate::service::AlertGateService;
use crate::shutdown::{ShutdownConfig, ShutdownCoordinator};
use crate::store::{create_store, CoordinationStore};

/// Handles application startup and component initialization
pub struct ApplicationStartup {
    config: Arc<Config>,
    metrics: Arc<Metrics>,
}

impl ApplicationStartup {
    pub fn new(config: Config) -> Result<Self> {
        let metrics = Metrics::new()
            .map_err(|e| AlertGateError::Internal(format!("metrics registry: {}", e)))?;
        Ok(Self {
            config: Arc::new(config),
            metrics: Arc::new(metrics),
        })
    }

    /// Start the complete application and block until it has shut down.
    pub async fn start(&self) -> Result<()> {
        info!("🚀 Starting alertgate application");

        let store = self.initialize_store().await?;
        let registry = create_registry(&self.config)?;
        self.check_dependencies(store.as_ref(), registry.as_ref())
            .await?;

        let service = AlertGateService::new(
            self.config.clone(),
            store,
            registry,
            self.metrics.clone(),
        )?;

        let coordinator = ShutdownCoordinator::new(ShutdownConfig::default());
        let signals = coordinator.listen_for_signals();
        service.start(&coordinator).await?;

        info!("✅ Application startup completed successfully");

        signals
            .await
            .map_err(|e| AlertGateError::Internal(format!("signal listener: {}", e)))?;
        Ok(())
    }

    async fn check_dependencies(
        &self,
        store: &dyn CoordinationStore,
        registry: &dyn RegistryClient,
    ) -> Result<()> {
        let checker = DependencyChecker::new(&self.config, store, registry);
        if let Err(e) = checker.check_all_dependencies().await {
            error!("❌ Dependency check failed: {}", e);
            return Err(AlertGateError::Store(e.to_string()));
        }
        info!("✅ All dependencies are available");
        Ok(())
    }

    async fn initialize_store(&self) -> Result<Arc<dyn CoordinationStore>> {
        info!(
            "💾 Initializing coordination store: {} (root {})",
            self.config.store.backend, self.config.store.root
        );
        let store = create_store(&self.config).await?;
        info!("✅ Coordination store initialized");
        Ok(store)
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}
