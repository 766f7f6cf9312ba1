// src/registry/machines.rs - Host inventory for address lookup and offline filtering

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::Result;

use super::{MachineInventory, MachineRecord, RegistryClient};

#[derive(Debug, Default)]
struct Inventory {
    /// ns -> hostname -> ip
    hosts: HashMap<String, HashMap<String, String>>,
    /// (ns, hostname)
    offline: HashSet<(String, String)>,
}

fn field<'a>(record: &'a MachineRecord, name: &str) -> Option<&'a str> {
    record.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

/// Machine inventory refreshed from the registry.
///
/// Namespaces whose machine fetch fails keep their previous host list.
pub struct MachineCache {
    registry: Arc<dyn RegistryClient>,
    inventory: RwLock<Arc<Inventory>>,
}

impl MachineCache {
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        Self {
            registry,
            inventory: RwLock::new(Arc::new(Inventory::default())),
        }
    }

    /// Reload machines for `namespaces` and the offline set. Returns the
    /// number of namespaces that failed.
    pub async fn refresh(&self, namespaces: &[String]) -> Result<usize> {
        let current = self.inventory.read().await.clone();
        let mut next = Inventory::default();
        let mut failed = 0;

        for ns in namespaces {
            match self.registry.machines(ns).await {
                Ok(records) => {
                    let hosts = records
                        .iter()
                        .filter_map(|r| {
                            let host = field(r, "hostname")?;
                            Some((host.to_string(), field(r, "ip").unwrap_or("").to_string()))
                        })
                        .collect();
                    next.hosts.insert(ns.clone(), hosts);
                }
                Err(e) => {
                    failed += 1;
                    warn!(ns = %ns, error = %e, "Machine fetch failed, keeping cached hosts");
                    if let Some(hosts) = current.hosts.get(ns) {
                        next.hosts.insert(ns.clone(), hosts.clone());
                    }
                }
            }
        }

        match self.registry.offline_machines().await {
            Ok(offline) => {
                for (ns, records) in offline {
                    for record in &records {
                        if let Some(host) = field(record, "hostname") {
                            next.offline.insert((ns.clone(), host.to_string()));
                        }
                    }
                }
            }
            Err(e) => {
                failed += 1;
                warn!(error = %e, "Offline machine fetch failed, keeping cached set");
                next.offline = current.offline.clone();
            }
        }

        debug!(
            namespaces = next.hosts.len(),
            offline = next.offline.len(),
            "Machine inventory refreshed"
        );
        *self.inventory.write().await = Arc::new(next);
        Ok(failed)
    }
}

#[async_trait]
impl MachineInventory for MachineCache {
    async fn machine_ip(&self, ns: &str, host: &str) -> Option<String> {
        let inventory = self.inventory.read().await;
        inventory
            .hosts
            .get(ns)?
            .get(host)
            .filter(|ip| !ip.is_empty())
            .cloned()
    }

    async fn is_offline(&self, ns: &str, host: &str) -> bool {
        self.inventory
            .read()
            .await
            .offline
            .contains(&(ns.to_string(), host.to_string()))
    }

    async fn knows_namespace(&self, ns: &str) -> bool {
        self.inventory.read().await.hosts.contains_key(ns)
    }
}
