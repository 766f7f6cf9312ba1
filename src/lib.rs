// src/lib.rs - Alarm event gateway library

pub mod block;
pub mod config;
pub mod error;
pub mod handler;
pub mod keyspace;
pub mod metrics;
pub mod models;
pub mod notify;
pub mod reconciler;
pub mod registry;
pub mod service;
pub mod shutdown;
pub mod status;
pub mod store;

// Startup and dependencies modules
pub mod dependencies;
pub mod startup;

// Re-export commonly used items for convenience
pub use block::{BlockEngine, BlockState};
pub use config::Config;
pub use error::{AlertGateError, Result};
pub use handler::{EventHandler, EventOutcome};
pub use models::{AlarmDefinition, EventData, Level, NotifyData, NotifyRequest, Status};
pub use notify::{Notifier, NotifyDispatcher};
pub use reconciler::{ReconcileReport, Reconciler};
pub use registry::{AlarmCache, MachineCache, MachineInventory, RegistryClient, UserDirectory};
pub use service::AlertGateService;
pub use shutdown::{
    ShutdownConfig, ShutdownCoordinator, ShutdownReason, TaskHandle, TaskPriority, TaskType,
};
pub use startup::ApplicationStartup;
pub use status::{NsStatus, StatusEngine, TransitionLog};
pub use store::{create_store, CoordinationStore, MemoryStore, StoreNode};

// Re-export metrics
pub use metrics::Metrics;

/// alertgate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get build information
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION,
        git_sha: option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        rust_version: option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown"),
    }
}

#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_sha: &'static str,
    pub rust_version: &'static str,
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "alertgate v{} ({}) built with Rust {}",
            self.version, self.git_sha, self.rust_version
        )
    }
}

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        AlertGateError, AlertGateService, Config, CoordinationStore, EventData, EventOutcome,
        Level, Result, StatusEngine,
    };
}
