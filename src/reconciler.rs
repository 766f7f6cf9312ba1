// src/reconciler.rs - Keeps the store's directory tree in line with the registry

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{AlertGateError, Result};
use crate::keyspace;
use crate::registry::{AlarmCache, AlarmSnapshot, MachineInventory};
use crate::store::{CoordinationStore, StoreNode};

/// Mutations made by one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub namespaces_removed: usize,
    pub alarms_removed: usize,
    pub hosts_removed: usize,
    pub namespaces_created: usize,
    pub alarms_created: usize,
    /// Items skipped because a store call failed
    pub errors: usize,
}

impl ReconcileReport {
    pub fn mutations(&self) -> usize {
        self.namespaces_removed
            + self.alarms_removed
            + self.hosts_removed
            + self.namespaces_created
            + self.alarms_created
    }
}

/// Removes namespaces, alarm versions and hosts that no longer exist upstream
/// and creates directories for new ones.
///
/// Namespaces whose last registry fetch failed are left alone, and hosts are
/// only pruned when the inventory has a machine list for their namespace.
pub struct Reconciler {
    store: Arc<dyn CoordinationStore>,
    alarms: Arc<AlarmCache>,
    inventory: Arc<dyn MachineInventory>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        alarms: Arc<AlarmCache>,
        inventory: Arc<dyn MachineInventory>,
    ) -> Self {
        Self {
            store,
            alarms,
            inventory,
        }
    }

    async fn list(&self, key: &str) -> Result<Option<StoreNode>> {
        match self.store.get(key).await {
            Ok(node) => Ok(Some(node)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn remove_dir(&self, key: &str, counter: &mut usize, errors: &mut usize) {
        match self.store.delete_dir(key).await {
            Ok(()) => {
                *counter += 1;
                info!(key, "Removed stale directory");
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                *errors += 1;
                error!(key, error = %e, "Failed to remove stale directory");
            }
        }
    }

    async fn create_dir(&self, key: &str, counter: &mut usize, errors: &mut usize) {
        match self.store.mkdir(key).await {
            Ok(()) => {
                *counter += 1;
                debug!(key, "Created directory");
            }
            Err(AlertGateError::KeyExists { .. }) => {}
            Err(e) => {
                *errors += 1;
                error!(key, error = %e, "Failed to create directory");
            }
        }
    }

    /// Run one reconciliation pass.
    ///
    /// Fails only when the root listing fails; every other store error skips
    /// the affected item. A second pass with no upstream change mutates
    /// nothing.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let snapshot = self.alarms.snapshot().await;
        let mut report = ReconcileReport::default();

        if snapshot.is_empty() {
            warn!("Alarm cache is empty, skipping reconciliation");
            return Ok(report);
        }

        let root = self.list("").await?.unwrap_or_default();
        let mut stored_namespaces = HashSet::new();

        for ns_node in root.child_dirs() {
            let ns = ns_node.name().to_string();
            if !snapshot.contains_namespace(&ns) {
                self.remove_dir(
                    &keyspace::ns_dir(&ns),
                    &mut report.namespaces_removed,
                    &mut report.errors,
                )
                .await;
                continue;
            }
            stored_namespaces.insert(ns.clone());

            if snapshot.is_unsynced(&ns) {
                debug!(ns = %ns, "Namespace unsynced, not pruning");
                continue;
            }
            self.reconcile_namespace(&snapshot, &ns, &mut report).await;
        }

        for (ns, versions) in &snapshot.alarms {
            if !stored_namespaces.contains(ns) {
                self.create_dir(
                    &keyspace::ns_dir(ns),
                    &mut report.namespaces_created,
                    &mut report.errors,
                )
                .await;
            }

            let existing = if stored_namespaces.contains(ns) {
                match self.list(&keyspace::ns_dir(ns)).await {
                    Ok(node) => node
                        .map(|n| n.child_dirs().map(|c| c.name().to_string()).collect())
                        .unwrap_or_default(),
                    Err(e) => {
                        report.errors += 1;
                        error!(ns = %ns, error = %e, "Failed to list alarm directories");
                        continue;
                    }
                }
            } else {
                HashSet::new()
            };

            // Host directories sit directly under the alarm directory.
            for version in versions.keys() {
                if !existing.contains(version) {
                    self.create_dir(
                        &keyspace::alarm_dir(ns, version),
                        &mut report.alarms_created,
                        &mut report.errors,
                    )
                    .await;
                }
            }
        }

        if report.mutations() > 0 || report.errors > 0 {
            info!(
                namespaces_removed = report.namespaces_removed,
                alarms_removed = report.alarms_removed,
                hosts_removed = report.hosts_removed,
                namespaces_created = report.namespaces_created,
                alarms_created = report.alarms_created,
                errors = report.errors,
                "Reconciliation finished"
            );
        } else {
            debug!("Reconciliation found nothing to change");
        }
        Ok(report)
    }

    async fn reconcile_namespace(
        &self,
        snapshot: &AlarmSnapshot,
        ns: &str,
        report: &mut ReconcileReport,
    ) {
        let ns_node = match self.list(&keyspace::ns_dir(ns)).await {
            Ok(Some(node)) => node,
            Ok(None) => return,
            Err(e) => {
                report.errors += 1;
                error!(ns, error = %e, "Failed to list alarm directories");
                return;
            }
        };

        let prune_hosts = self.inventory.knows_namespace(ns).await;

        for alarm_node in ns_node.child_dirs() {
            let version = alarm_node.name();
            if !snapshot.contains_version(ns, version) {
                self.remove_dir(
                    &keyspace::alarm_dir(ns, version),
                    &mut report.alarms_removed,
                    &mut report.errors,
                )
                .await;
                continue;
            }
            if !prune_hosts {
                continue;
            }

            let hosts = match self.list(&keyspace::alarm_dir(ns, version)).await {
                Ok(Some(node)) => node,
                Ok(None) => continue,
                Err(e) => {
                    report.errors += 1;
                    error!(ns, version, error = %e, "Failed to list host directories");
                    continue;
                }
            };

            for host_node in hosts.child_dirs() {
                let host = host_node.name();
                if host == keyspace::NO_HOST {
                    continue;
                }
                if self.inventory.machine_ip(ns, host).await.is_none() {
                    self.remove_dir(
                        &keyspace::host_dir(ns, version, host),
                        &mut report.hosts_removed,
                        &mut report.errors,
                    )
                    .await;
                }
            }
        }
    }

    /// Drop everything stored under an alarm version that left the registry.
    pub async fn purge_alarm(&self, ns: &str, version: &str) -> Result<()> {
        if self.alarms.snapshot().await.contains_version(ns, version) {
            debug!(ns, version, "Alarm version is back, not purging");
            return Ok(());
        }
        match self.store.delete_dir(&keyspace::alarm_dir(ns, version)).await {
            Ok(()) => {
                info!(ns, version, "Purged removed alarm");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
