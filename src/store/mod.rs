// src/store/mod.rs - Coordination store trait and factory

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{AlertGateError, Result};
use crate::keyspace;

pub mod etcd;
#[cfg(test)]
pub(crate) mod faulty;
pub mod memory;

pub use etcd::EtcdStore;
pub use memory::MemoryStore;

/// One node of the hierarchical key space.
///
/// `key` is relative to the store root. Directories carry their children in
/// `nodes`; for a plain `get` only the direct children are filled in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreNode {
    pub key: String,
    pub value: Option<String>,
    pub dir: bool,
    #[serde(default)]
    pub nodes: Vec<StoreNode>,
}

impl StoreNode {
    pub fn name(&self) -> &str {
        keyspace::last_segment(&self.key)
    }

    pub fn child(&self, name: &str) -> Option<&StoreNode> {
        self.nodes.iter().find(|n| n.name() == name)
    }

    /// Names of the direct child directories.
    pub fn child_dirs(&self) -> impl Iterator<Item = &StoreNode> {
        self.nodes.iter().filter(|n| n.dir)
    }
}

/// Hierarchical key/value store shared by every instance of the service.
///
/// Keys are relative; implementations prepend their configured root. Deletes
/// succeed when the key is already gone so that cleanup stays idempotent.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Read a key. Directories come back with their direct children.
    async fn get(&self, key: &str) -> Result<StoreNode>;

    /// Read a key and its full subtree. An empty key reads the root.
    async fn recursive_get(&self, key: &str) -> Result<StoreNode>;

    /// Write a durable value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Write a value that the store expires after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Remove a single value.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove a directory and everything below it.
    async fn delete_dir(&self, key: &str) -> Result<()>;

    /// Create a directory. Fails with `KeyExists` if the key is taken.
    async fn mkdir(&self, key: &str) -> Result<()>;

    /// Create `key` only if absent, expiring after `ttl`. Returns whether the
    /// lock was taken.
    async fn try_lock(&self, key: &str, ttl: Duration) -> Result<bool>;

    async fn unlock(&self, key: &str) -> Result<()>;

    fn backend_name(&self) -> &'static str;
}

/// Read a value, treating an absent key as `None`.
pub async fn get_value(store: &dyn CoordinationStore, key: &str) -> Result<Option<String>> {
    match store.get(key).await {
        Ok(node) => Ok(node.value),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Build the store selected by configuration.
pub async fn create_store(config: &Config) -> Result<Arc<dyn CoordinationStore>> {
    match config.store.backend.as_str() {
        "memory" => {
            tracing::info!(root = %config.store.root, "Creating memory coordination store");
            Ok(Arc::new(MemoryStore::with_root(&config.store.root)))
        }
        "etcd" => {
            tracing::info!(
                endpoints = ?config.store.endpoints,
                root = %config.store.root,
                "Creating etcd coordination store"
            );
            Ok(Arc::new(EtcdStore::new(&config.store)?))
        }
        backend => Err(AlertGateError::Configuration(format!(
            "Unknown store backend: {}",
            backend
        ))),
    }
}
