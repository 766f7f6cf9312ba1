// src/dependencies.rs - Startup checks for the store and the registry

use anyhow::Result;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::registry::RegistryClient;
use crate::store::CoordinationStore;

/// Handles checking external dependencies during startup
pub struct DependencyChecker<'a> {
    config: &'a Config,
    store: &'a dyn CoordinationStore,
    registry: &'a dyn RegistryClient,
}

impl<'a> DependencyChecker<'a> {
    pub fn new(
        config: &'a Config,
        store: &'a dyn CoordinationStore,
        registry: &'a dyn RegistryClient,
    ) -> Self {
        Self {
            config,
            store,
            registry,
        }
    }

    /// The store must answer; everything else only warns, since the caches
    /// and loops recover once the collaborator comes back.
    pub async fn check_all_dependencies(&self) -> Result<()> {
        info!("🔍 Checking external dependencies...");

        self.check_store().await?;
        self.check_registry().await;
        self.check_notify_scripts();
        self.check_server_port().await;

        Ok(())
    }

    /// Read the store root.
    async fn check_store(&self) -> Result<()> {
        let started = Instant::now();
        match self.store.get("").await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                error!("❌ Coordination store ({}) unreachable: {}", self.store.backend_name(), e);
                return Err(anyhow::anyhow!(
                    "coordination store {} unreachable: {}",
                    self.store.backend_name(),
                    e
                ));
            }
        }
        info!(
            "✅ Coordination store ({}) ready in {:.3}s",
            self.store.backend_name(),
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }

    async fn check_registry(&self) {
        let started = Instant::now();
        match self.registry.namespaces().await {
            Ok(namespaces) => info!(
                "✅ Registry ({}) answered with {} namespaces in {:.3}s",
                self.config.registry.backend,
                namespaces.len(),
                started.elapsed().as_secs_f64()
            ),
            Err(e) => warn!(
                "⚠️  Registry ({}) check failed after {:.3}s: {}",
                self.config.registry.backend,
                started.elapsed().as_secs_f64(),
                e
            ),
        }
    }

    fn check_notify_scripts(&self) {
        let notify = &self.config.notify;
        let scripts = [
            ("mail", &notify.mail_script),
            ("sms", &notify.sms_script),
            ("wechat", &notify.wechat_script),
        ];
        for (channel, script) in scripts {
            match script {
                Some(path) if !path.is_empty() && !Path::new(path).is_file() => {
                    warn!("⚠️  {} script {} does not exist", channel, path);
                }
                _ => {}
            }
        }
    }

    async fn check_server_port(&self) {
        use tokio::net::TcpListener;

        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        match TcpListener::bind(&addr).await {
            Ok(_) => info!("✅ Listen address {} is available", addr),
            Err(e) => warn!("⚠️  Listen address {} is not available: {}", addr, e),
        }
    }
}
