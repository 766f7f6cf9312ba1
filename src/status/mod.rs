// src/status/mod.rs - Persisted per-target status and its aggregate cache

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::error::{AlertGateError, Result};
use crate::keyspace;
use crate::models::{round2, AlarmDefinition, EventData, Status};
use crate::store::{CoordinationStore, StoreNode};

pub mod snapshot;
pub mod transitions;

pub use snapshot::{namespace_matches, NsStatus, StatusFilter, TargetPath};
pub use transitions::{
    create_transition_log, HttpTransitionLog, TracingTransitionLog, TransitionLog,
};

/// Writes status records straight to the store and serves aggregate queries
/// from a snapshot rebuilt by [`StatusEngine::gen_global_status`].
pub struct StatusEngine {
    store: Arc<dyn CoordinationStore>,
    transitions: Arc<dyn TransitionLog>,
    cache: RwLock<Arc<NsStatus>>,
}

impl StatusEngine {
    pub fn new(store: Arc<dyn CoordinationStore>, transitions: Arc<dyn TransitionLog>) -> Self {
        Self {
            store,
            transitions,
            cache: RwLock::new(Arc::new(NsStatus::default())),
        }
    }

    /// Current aggregate snapshot.
    pub async fn snapshot(&self) -> Arc<NsStatus> {
        self.cache.read().await.clone()
    }

    /// Snapshot restricted to namespaces selected by `ns` (exact or dotted
    /// suffix; empty selects all).
    pub async fn status_for(&self, ns: &str) -> NsStatus {
        self.snapshot().await.filter_namespaces(ns)
    }

    /// Read one status from the store. A missing record is `KeyNotFound`.
    pub async fn get_status_from_cluster(
        &self,
        ns: &str,
        version: &str,
        host: &str,
        tag_fp: &str,
    ) -> Result<Status> {
        let key = keyspace::status_key(ns, version, host, tag_fp);
        let node = self.store.get(&key).await?;
        let raw = node.value.ok_or_else(|| AlertGateError::Store(format!("{} is a directory", key)))?;
        Status::from_record(&raw)
    }

    /// Overwrite the status of a target. Status records never expire.
    pub async fn set_status(
        &self,
        ns: &str,
        alarm: &AlarmDefinition,
        host: &str,
        tag_fp: &str,
        status: &Status,
    ) -> Result<()> {
        let key = keyspace::status_key(ns, &alarm.version, host, tag_fp);
        self.store.set(&key, &status.to_record()?).await
    }

    /// Record the level carried by `event` for its target.
    ///
    /// The creation time carries over while the level stays the same and
    /// resets when it changes. The new record is always written.
    pub async fn update_status(
        &self,
        alarm: &AlarmDefinition,
        host: &str,
        ip: &str,
        event: &EventData,
        receivers: Vec<String>,
    ) -> Result<Status> {
        let ns = event.ns.as_str();
        let tags = event.target_tags();
        let tag_fp = keyspace::tag_fingerprint(&tags);
        let now = Utc::now();

        let mut status = Status {
            ns: ns.to_string(),
            alarm_version: alarm.version.clone(),
            alarm: alarm.name.clone(),
            measurement: match event.measurement() {
                "" => alarm.measurement.clone(),
                m => m.to_string(),
            },
            host: host.to_string(),
            ip: ip.to_string(),
            level: event.level,
            value: round2(event.value()),
            tags,
            receivers,
            created_at: now,
            updated_at: now,
            last_time: 0,
            msg: event.message.clone(),
        };

        match self
            .get_status_from_cluster(ns, &alarm.version, host, &tag_fp)
            .await
        {
            Ok(old) if old.level == status.level => {
                status.created_at = old.created_at;
            }
            Ok(old) => self.transitions.status_changed(&old, &status).await,
            Err(e) => {
                debug!(ns, version = %alarm.version, host, error = %e, "No previous status");
                self.transitions.new_status(&status).await;
            }
        }

        self.set_status(ns, alarm, host, &tag_fp, &status).await?;
        Ok(status)
    }

    /// Delete the records of `ns` selected by the optional version, host and
    /// tag fingerprint filters, from the store and from the cached snapshot.
    ///
    /// Without a tag filter whole host directories go, block state included.
    /// Returns the number of directories removed.
    pub async fn clear_status(
        &self,
        ns: &str,
        version: &str,
        host: &str,
        tag_fp: &str,
    ) -> Result<usize> {
        if ns.is_empty() {
            return Err(AlertGateError::InvalidRequest(
                "namespace is required to clear status".to_string(),
            ));
        }
        let filter = StatusFilter {
            ns,
            version,
            host,
            tag_fp,
        };

        let mut targets: BTreeSet<TargetPath> =
            self.snapshot().await.matching(&filter).into_iter().collect();
        targets.extend(self.stored_targets(&filter).await?);

        let dirs: BTreeSet<String> = targets
            .iter()
            .map(|t| {
                if tag_fp.is_empty() {
                    keyspace::host_dir(&t.ns, &t.version, &t.host)
                } else {
                    keyspace::tag_dir(&t.ns, &t.version, &t.host, &t.tag_fp)
                }
            })
            .collect();

        let mut first_error = None;
        let mut removed = 0;
        for dir in &dirs {
            match self.store.delete_dir(dir).await {
                Ok(()) => removed += 1,
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    error!(key = %dir, error = %e, "Failed to clear status");
                    first_error.get_or_insert(e);
                }
            }
        }

        {
            let mut cache = self.cache.write().await;
            let next = cache.without(&filter);
            *cache = Arc::new(next);
        }

        info!(ns, version, host, tag_fp, removed, "Cleared status");
        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    async fn stored_targets(&self, filter: &StatusFilter<'_>) -> Result<Vec<TargetPath>> {
        let ns_node = match self.store.recursive_get(&keyspace::ns_dir(filter.ns)).await {
            Ok(node) => node,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut targets = Vec::new();
        for alarm_node in ns_node.child_dirs() {
            for host_node in alarm_node.child_dirs() {
                for tag_node in host_node.child_dirs() {
                    let target = TargetPath {
                        ns: filter.ns.to_string(),
                        version: alarm_node.name().to_string(),
                        host: host_node.name().to_string(),
                        tag_fp: tag_node.name().to_string(),
                    };
                    let selected = [
                        (filter.version, &target.version),
                        (filter.host, &target.host),
                        (filter.tag_fp, &target.tag_fp),
                    ]
                    .iter()
                    .all(|(f, v)| f.is_empty() || f == v);
                    if selected {
                        targets.push(target);
                    }
                }
            }
        }
        Ok(targets)
    }

    /// Rebuild the aggregate snapshot from one recursive read of the store
    /// and swap it in. Returns the number of records.
    pub async fn gen_global_status(&self) -> Result<usize> {
        let root = match self.store.recursive_get("").await {
            Ok(root) => root,
            Err(e) if e.is_not_found() => StoreNode::default(),
            Err(e) => return Err(e),
        };

        let next = NsStatus::from_tree(&root);
        let count = next.len();
        *self.cache.write().await = Arc::new(next);

        debug!(records = count, "Global status rebuilt");
        Ok(count)
    }
}
