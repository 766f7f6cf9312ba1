// src/registry/alarms.rs - Alarm definitions per namespace and version

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::AlarmDefinition;
use crate::shutdown::TaskHandle;

use super::RegistryClient;

const REMOVAL_CHANNEL_CAPACITY: usize = 256;

/// One immutable view of the registry.
#[derive(Debug, Clone, Default)]
pub struct AlarmSnapshot {
    /// ns -> version -> definition
    pub alarms: HashMap<String, HashMap<String, Arc<AlarmDefinition>>>,
    /// Namespaces whose last fetch failed; their entries may be stale.
    pub unsynced: HashSet<String>,
}

impl AlarmSnapshot {
    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }

    pub fn get(&self, ns: &str, version: &str) -> Option<Arc<AlarmDefinition>> {
        self.alarms.get(ns)?.get(version).cloned()
    }

    pub fn contains_namespace(&self, ns: &str) -> bool {
        self.alarms.contains_key(ns)
    }

    pub fn contains_version(&self, ns: &str, version: &str) -> bool {
        self.alarms
            .get(ns)
            .map(|versions| versions.contains_key(version))
            .unwrap_or(false)
    }

    pub fn is_unsynced(&self, ns: &str) -> bool {
        self.unsynced.contains(ns)
    }

    pub fn version_count(&self) -> usize {
        self.alarms.values().map(HashMap::len).sum()
    }

    /// Sorted namespace names.
    pub fn namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = self.alarms.keys().cloned().collect();
        namespaces.sort();
        namespaces
    }
}

/// An alarm version that disappeared upstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemovedAlarm {
    pub ns: String,
    pub version: String,
}

/// Outcome of one refresh cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub added: Vec<(String, String)>,
    pub removed: Vec<RemovedAlarm>,
    /// Namespaces kept stale because their fetch failed
    pub failed: Vec<String>,
}

impl RefreshReport {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Periodically refreshed map of alarm definitions.
///
/// Refreshes build a new snapshot and swap it in whole, so readers see either
/// the previous or the next view. Existing definitions are shared between
/// snapshots and never modified; a changed alarm arrives as a new version.
pub struct AlarmCache {
    registry: Arc<dyn RegistryClient>,
    snapshot: RwLock<Arc<AlarmSnapshot>>,
    removed_tx: broadcast::Sender<RemovedAlarm>,
}

impl AlarmCache {
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        let (removed_tx, _) = broadcast::channel(REMOVAL_CHANNEL_CAPACITY);
        Self {
            registry,
            snapshot: RwLock::new(Arc::new(AlarmSnapshot::default())),
            removed_tx,
        }
    }

    pub async fn snapshot(&self) -> Arc<AlarmSnapshot> {
        self.snapshot.read().await.clone()
    }

    pub async fn get(&self, ns: &str, version: &str) -> Option<Arc<AlarmDefinition>> {
        self.snapshot.read().await.get(ns, version)
    }

    /// Receive every `(ns, version)` dropped by later refreshes.
    pub fn subscribe_removals(&self) -> broadcast::Receiver<RemovedAlarm> {
        self.removed_tx.subscribe()
    }

    /// Pull the namespace list and each namespace's alarms, then swap in the
    /// new snapshot.
    ///
    /// A failed namespace listing leaves the cache untouched and returns the
    /// error. A failed per-namespace fetch keeps that namespace's previous
    /// entries and marks it unsynced.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let namespaces = self.registry.namespaces().await?;
        let current = self.snapshot().await;

        let mut next = AlarmSnapshot::default();
        let mut report = RefreshReport::default();

        let listed: HashSet<&str> = namespaces.iter().map(String::as_str).collect();
        for (ns, versions) in &current.alarms {
            if !listed.contains(ns.as_str()) {
                for version in versions.keys() {
                    report.removed.push(RemovedAlarm {
                        ns: ns.clone(),
                        version: version.clone(),
                    });
                }
            }
        }

        for ns in listed {
            let previous = current.alarms.get(ns);

            let raw_alarms = match self.registry.alarms(ns).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(ns, error = %e, "Alarm fetch failed, keeping cached entries");
                    report.failed.push(ns.to_string());
                    next.unsynced.insert(ns.to_string());
                    next.alarms
                        .insert(ns.to_string(), previous.cloned().unwrap_or_default());
                    continue;
                }
            };

            let mut versions: HashMap<String, Arc<AlarmDefinition>> = HashMap::new();
            for raw in raw_alarms {
                if raw.version.is_empty() {
                    debug!(ns, alarm = %raw.name, "Skipping alarm without version");
                    continue;
                }
                match previous.and_then(|p| p.get(&raw.version)) {
                    Some(existing) => {
                        versions.insert(raw.version.clone(), existing.clone());
                    }
                    None => {
                        report.added.push((ns.to_string(), raw.version.clone()));
                        let definition = AlarmDefinition::from_raw(raw);
                        versions.insert(definition.version.clone(), Arc::new(definition));
                    }
                }
            }

            if let Some(previous) = previous {
                for version in previous.keys() {
                    if !versions.contains_key(version) {
                        report.removed.push(RemovedAlarm {
                            ns: ns.to_string(),
                            version: version.clone(),
                        });
                    }
                }
            }

            next.alarms.insert(ns.to_string(), versions);
        }

        *self.snapshot.write().await = Arc::new(next);

        for removed in &report.removed {
            // No subscribers is fine; the reconciler catches up on its cycle.
            let _ = self.removed_tx.send(removed.clone());
        }

        if !report.is_unchanged() || !report.failed.is_empty() {
            info!(
                added = report.added.len(),
                removed = report.removed.len(),
                failed = report.failed.len(),
                "Alarm cache refreshed"
            );
        }
        Ok(report)
    }

    /// Poll until the first refresh produced data. Returns false when the
    /// task was told to stop first.
    pub async fn wait_until_populated(&self, poll: Duration, handle: &mut TaskHandle) -> bool {
        loop {
            if !self.snapshot.read().await.is_empty() {
                return true;
            }
            tokio::select! {
                _ = tokio::time::sleep(poll) => {}
                _ = handle.wait_for_shutdown() => return false,
            }
        }
    }
}
