// src/store/faulty.rs - Memory store wrapper that fails selected operations

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{AlertGateError, Result};

use super::{CoordinationStore, MemoryStore, StoreNode};

/// Delegates to a [`MemoryStore`] unless the operation has been switched to
/// fail with a `Store` error.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<&'static str>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn heal(&self, op: &'static str) {
        self.failing.lock().unwrap().remove(op);
    }

    fn check(&self, op: &'static str) -> Result<()> {
        if self.failing.lock().unwrap().contains(op) {
            Err(AlertGateError::Store(format!("{} unavailable", op)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CoordinationStore for FaultyStore {
    async fn get(&self, key: &str) -> Result<StoreNode> {
        self.check("get")?;
        self.inner.get(key).await
    }

    async fn recursive_get(&self, key: &str) -> Result<StoreNode> {
        self.check("recursive_get")?;
        self.inner.recursive_get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check("set")?;
        self.inner.set(key, value).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check("set_with_ttl")?;
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check("delete")?;
        self.inner.delete(key).await
    }

    async fn delete_dir(&self, key: &str) -> Result<()> {
        self.check("delete_dir")?;
        self.inner.delete_dir(key).await
    }

    async fn mkdir(&self, key: &str) -> Result<()> {
        self.check("mkdir")?;
        self.inner.mkdir(key).await
    }

    async fn try_lock(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.check("try_lock")?;
        self.inner.try_lock(key, ttl).await
    }

    async fn unlock(&self, key: &str) -> Result<()> {
        self.check("unlock")?;
        self.inner.unlock(key).await
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}
