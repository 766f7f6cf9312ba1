// src/registry/mod.rs - Upstream registry collaborators

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{AlertGateError, Result};
use crate::models::RawAlarm;

pub mod alarms;
pub mod fixture;
pub mod http;
pub mod machines;
pub mod users;

pub use alarms::{AlarmCache, AlarmSnapshot, RefreshReport, RemovedAlarm};
pub use fixture::FixtureRegistry;
pub use http::HttpRegistry;
pub use machines::MachineCache;
pub use users::UserDirectory;

/// Machine attributes as returned by the registry (`hostname`, `ip`, ...).
pub type MachineRecord = HashMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    pub gname: String,
    pub managers: Vec<String>,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub username: String,
    pub mobile: String,
}

impl User {
    pub fn display(&self) -> String {
        format!("{}({})", self.username, self.mobile)
    }
}

/// Read access to the alarm/namespace/machine/user registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn namespaces(&self) -> Result<Vec<String>>;

    async fn alarms(&self, ns: &str) -> Result<Vec<RawAlarm>>;

    async fn group(&self, name: &str) -> Result<Group>;

    /// Contact records keyed by username. Unknown names are simply absent.
    async fn users(&self, usernames: &[String]) -> Result<HashMap<String, User>>;

    async fn machines(&self, ns: &str) -> Result<Vec<MachineRecord>>;

    /// Offline machines keyed by namespace.
    async fn offline_machines(&self) -> Result<HashMap<String, Vec<MachineRecord>>>;
}

/// Host lookups the pipeline needs from the machine inventory.
#[async_trait]
pub trait MachineInventory: Send + Sync {
    async fn machine_ip(&self, ns: &str, host: &str) -> Option<String>;

    async fn is_offline(&self, ns: &str, host: &str) -> bool;

    /// Whether the inventory holds a machine list for `ns`.
    async fn knows_namespace(&self, ns: &str) -> bool;
}

pub fn create_registry(config: &Config) -> Result<Arc<dyn RegistryClient>> {
    match config.registry.backend.as_str() {
        "http" => {
            tracing::info!(link = %config.registry.link, "Creating HTTP registry client");
            Ok(Arc::new(HttpRegistry::new(&config.registry)?))
        }
        "fixture" => {
            let path = config.registry.fixture_path.as_deref().ok_or_else(|| {
                AlertGateError::Configuration("fixture registry requires fixture_path".to_string())
            })?;
            tracing::info!(path, "Loading fixture registry");
            Ok(Arc::new(FixtureRegistry::from_file(Path::new(path))?))
        }
        backend => Err(AlertGateError::Configuration(format!(
            "Unknown registry backend: {}",
            backend
        ))),
    }
}
