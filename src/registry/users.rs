// src/registry/users.rs - Recipient resolution from groups to contacts

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::Result;

use super::{RegistryClient, User};

#[derive(Debug, Clone)]
struct CachedUser {
    user: Option<User>,
    fetched_at: Instant,
}

/// Resolves alarm groups to usernames and usernames to contact records.
///
/// Contact records are cached for `ttl`; unknown usernames are cached as
/// misses so they are not refetched on every event.
pub struct UserDirectory {
    registry: Arc<dyn RegistryClient>,
    default_user: String,
    ttl: Duration,
    cache: DashMap<String, CachedUser>,
}

impl UserDirectory {
    pub fn new(registry: Arc<dyn RegistryClient>, default_user: String, ttl: Duration) -> Self {
        Self {
            registry,
            default_user,
            ttl,
            cache: DashMap::new(),
        }
    }

    /// Managers and members of every group, de-duplicated in first-seen order.
    /// Groups that fail to resolve are skipped.
    pub async fn group_members(&self, groups: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut members = Vec::new();

        for name in groups {
            let group = match self.registry.group(name).await {
                Ok(group) => group,
                Err(e) => {
                    warn!(group = %name, error = %e, "Failed to resolve group");
                    continue;
                }
            };
            for user in group.managers.into_iter().chain(group.members) {
                if user.is_empty() || user == self.default_user {
                    continue;
                }
                if seen.insert(user.clone()) {
                    members.push(user);
                }
            }
        }
        members
    }

    /// Contact records for `usernames`, in input order. Unknown names are
    /// omitted.
    pub async fn users(&self, usernames: &[String]) -> Result<Vec<User>> {
        let now = Instant::now();
        let missing: Vec<String> = usernames
            .iter()
            .filter(|name| match self.cache.get(name.as_str()) {
                Some(entry) => now.duration_since(entry.fetched_at) >= self.ttl,
                None => true,
            })
            .cloned()
            .collect();

        if !missing.is_empty() {
            debug!(count = missing.len(), "Fetching user records");
            let mut fetched = self.registry.users(&missing).await?;
            for name in missing {
                let user = fetched.remove(&name);
                self.cache.insert(name, CachedUser { user, fetched_at: now });
            }
        }

        Ok(usernames
            .iter()
            .filter_map(|name| self.cache.get(name.as_str()).and_then(|e| e.user.clone()))
            .collect())
    }

    /// `username(mobile)` for each known user.
    pub async fn display_names(&self, usernames: &[String]) -> Result<Vec<String>> {
        Ok(self.users(usernames).await?.iter().map(User::display).collect())
    }

    /// Non-empty mobile numbers for `usernames`.
    pub async fn mobiles(&self, usernames: &[String]) -> Result<Vec<String>> {
        Ok(self
            .users(usernames)
            .await?
            .into_iter()
            .map(|u| u.mobile)
            .filter(|m| !m.is_empty())
            .collect())
    }
}
