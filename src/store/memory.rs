// src/store/memory.rs - In-memory coordination store

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{AlertGateError, Result};
use crate::keyspace;

use super::{CoordinationStore, StoreNode};

const DEFAULT_ROOT: &str = "/alertgate";

const MUTATING_OPS: &[&str] = &["set", "set_with_ttl", "delete", "delete_dir", "mkdir", "try_lock"];

#[derive(Debug, Clone)]
struct MemEntry {
    /// `None` marks a directory.
    value: Option<String>,
    expires_at: Option<Instant>,
}

impl MemEntry {
    fn dir() -> Self {
        Self {
            value: None,
            expires_at: None,
        }
    }

    fn is_dir(&self) -> bool {
        self.value.is_none()
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Hierarchical store kept in a DashMap keyed by absolute path.
///
/// Parent directories are created implicitly on write, and TTL'd keys expire
/// lazily against `tokio::time`, so paused-clock tests can step through expiry.
#[derive(Clone)]
pub struct MemoryStore {
    root: String,
    entries: Arc<DashMap<String, MemEntry>>,
    stats: Arc<DashMap<String, u64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_root(DEFAULT_ROOT)
    }

    pub fn with_root(root: &str) -> Self {
        let root = format!("/{}", root.trim_matches('/'));
        Self {
            root,
            entries: Arc::new(DashMap::new()),
            stats: Arc::new(DashMap::new()),
        }
    }

    /// Number of live keys, directories included.
    pub fn len(&self) -> usize {
        self.purge_expired();
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted relative keys of all live entries.
    pub fn keys(&self) -> Vec<String> {
        self.purge_expired();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .map(|e| self.relative(e.key()).to_string())
            .collect();
        keys.sort();
        keys
    }

    pub fn operation_count(&self, operation: &str) -> u64 {
        self.stats.get(operation).map(|v| *v).unwrap_or(0)
    }

    /// Calls that may have changed the store.
    pub fn mutation_count(&self) -> u64 {
        MUTATING_OPS.iter().map(|op| self.operation_count(op)).sum()
    }

    fn increment_stat(&self, operation: &str) {
        let mut counter = self.stats.entry(operation.to_string()).or_insert(0);
        *counter += 1;
    }

    fn absolute(&self, key: &str) -> String {
        keyspace::abs_path(&self.root, key)
    }

    fn relative<'a>(&self, abs: &'a str) -> &'a str {
        abs.strip_prefix(&self.root)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(abs)
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.is_live(now));
    }

    /// Create missing ancestors of `abs` as directories.
    fn ensure_parents(&self, abs: &str) -> Result<()> {
        let relative = self.relative(abs).to_string();
        let segments: Vec<&str> = relative.split('/').collect();
        let mut path = self.root.clone();

        for segment in &segments[..segments.len().saturating_sub(1)] {
            path = format!("{}/{}", path, segment);
            match self.entries.entry(path.clone()) {
                Entry::Occupied(existing) => {
                    if !existing.get().is_dir() {
                        return Err(AlertGateError::NotADirectory {
                            key: self.relative(&path).to_string(),
                        });
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(MemEntry::dir());
                }
            }
        }
        Ok(())
    }

    fn write(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        if key.trim_matches('/').is_empty() {
            return Err(AlertGateError::Store("cannot write to the store root".to_string()));
        }
        self.purge_expired();

        let abs = self.absolute(key);
        if let Some(existing) = self.entries.get(&abs) {
            if existing.is_dir() {
                return Err(AlertGateError::Store(format!("{} is a directory", key)));
            }
        }
        self.ensure_parents(&abs)?;

        self.entries.insert(
            abs,
            MemEntry {
                value: Some(value.to_string()),
                expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl)),
            },
        );
        Ok(())
    }

    fn read(&self, key: &str, depth: Option<usize>) -> Result<StoreNode> {
        self.purge_expired();

        let abs = self.absolute(key);
        if abs == self.root {
            return Ok(self.build_node(&abs, None, depth));
        }

        let entry = self
            .entries
            .get(&abs)
            .map(|e| e.value().clone())
            .ok_or_else(|| AlertGateError::KeyNotFound {
                key: key.trim_matches('/').to_string(),
            })?;
        Ok(self.build_node(&abs, entry.value, depth))
    }

    fn build_node(&self, abs: &str, value: Option<String>, depth: Option<usize>) -> StoreNode {
        let dir = value.is_none();
        let mut node = StoreNode {
            key: self.relative(abs).to_string(),
            value,
            dir,
            nodes: Vec::new(),
        };
        if !dir || depth == Some(0) {
            return node;
        }

        let prefix = format!("{}/", abs);
        let mut children: Vec<(String, Option<String>)> = self
            .entries
            .iter()
            .filter(|e| {
                e.key()
                    .strip_prefix(&prefix)
                    .map_or(false, |rest| !rest.is_empty() && !rest.contains('/'))
            })
            .map(|e| (e.key().clone(), e.value().value.clone()))
            .collect();
        children.sort_by(|a, b| a.0.cmp(&b.0));

        let next_depth = depth.map(|d| d - 1);
        node.nodes = children
            .into_iter()
            .map(|(child, value)| self.build_node(&child, value, next_depth))
            .collect();
        node
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<StoreNode> {
        self.increment_stat("get");
        self.read(key, Some(1))
    }

    async fn recursive_get(&self, key: &str) -> Result<StoreNode> {
        self.increment_stat("recursive_get");
        self.read(key, None)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.increment_stat("set");
        self.write(key, value, None)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.increment_stat("set_with_ttl");
        self.write(key, value, Some(ttl))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.increment_stat("delete");
        self.purge_expired();

        let abs = self.absolute(key);
        if let Some(existing) = self.entries.get(&abs) {
            if existing.is_dir() {
                return Err(AlertGateError::Store(format!("{} is a directory", key)));
            }
        }
        if self.entries.remove(&abs).is_none() {
            debug!(key, "Delete of absent key ignored");
        }
        Ok(())
    }

    async fn delete_dir(&self, key: &str) -> Result<()> {
        self.increment_stat("delete_dir");
        self.purge_expired();

        let abs = self.absolute(key);
        let prefix = format!("{}/", abs);
        let before = self.entries.len();
        self.entries
            .retain(|k, _| k != &abs && !k.starts_with(&prefix));
        let removed = before - self.entries.len();

        if removed == 0 {
            debug!(key, "Delete of absent directory ignored");
        } else {
            debug!(key, removed, "Deleted directory from memory store");
        }
        Ok(())
    }

    async fn mkdir(&self, key: &str) -> Result<()> {
        self.increment_stat("mkdir");
        self.purge_expired();

        let abs = self.absolute(key);
        if self.entries.contains_key(&abs) {
            return Err(AlertGateError::KeyExists {
                key: key.trim_matches('/').to_string(),
            });
        }
        self.ensure_parents(&abs)?;
        self.entries.insert(abs, MemEntry::dir());
        Ok(())
    }

    async fn try_lock(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.increment_stat("try_lock");
        self.purge_expired();

        let abs = self.absolute(key);
        self.ensure_parents(&abs)?;
        match self.entries.entry(abs) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(MemEntry {
                    value: Some("locked".to_string()),
                    expires_at: Instant::now().checked_add(ttl),
                });
                Ok(true)
            }
        }
    }

    async fn unlock(&self, key: &str) -> Result<()> {
        self.delete(key).await
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
