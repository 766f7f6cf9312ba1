// src/registry/fixture.rs - In-process registry for local runs and tests

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::RwLock;

use crate::error::{AlertGateError, Result};
use crate::models::RawAlarm;

use super::{Group, MachineRecord, RegistryClient, User};

/// File layout accepted by [`FixtureRegistry::from_file`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FixtureFile {
    /// ns -> alarms
    alarms: BTreeMap<String, Vec<RawAlarm>>,
    groups: Vec<Group>,
    users: Vec<User>,
    /// ns -> hostname -> ip
    machines: BTreeMap<String, BTreeMap<String, String>>,
    /// ns -> hostnames
    offline: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default)]
struct FixtureState {
    namespaces: Vec<String>,
    alarms: HashMap<String, Vec<RawAlarm>>,
    groups: HashMap<String, Group>,
    users: HashMap<String, User>,
    machines: HashMap<String, Vec<MachineRecord>>,
    offline: HashMap<String, Vec<MachineRecord>>,
    failing: HashSet<String>,
    namespaces_down: bool,
}

/// Registry backed by in-memory data that can be changed at runtime.
///
/// Failures can be injected per call family to exercise the stale-cache paths
/// of the consumers.
#[derive(Debug, Default)]
pub struct FixtureRegistry {
    state: RwLock<FixtureState>,
}

fn machine(hostname: &str, ip: &str) -> MachineRecord {
    let mut record = MachineRecord::new();
    record.insert("hostname".to_string(), hostname.to_string());
    record.insert("ip".to_string(), ip.to_string());
    record
}

impl FixtureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AlertGateError::Configuration(format!("read fixture {}: {}", path.display(), e))
        })?;
        let file: FixtureFile = serde_json::from_str(&raw)?;

        let registry = Self::new();
        for (ns, alarms) in file.alarms {
            registry.set_alarms(&ns, alarms);
        }
        for group in file.groups {
            registry.set_group(group);
        }
        for user in file.users {
            registry.set_user(user);
        }
        for (ns, hosts) in file.machines {
            for (host, ip) in hosts {
                registry.add_machine(&ns, &host, &ip);
            }
        }
        for (ns, hosts) in file.offline {
            for host in hosts {
                registry.set_offline(&ns, &host);
            }
        }
        Ok(registry)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FixtureState) -> R) -> R {
        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state)
    }

    /// Replace the alarm list of `ns`, registering the namespace if new.
    pub fn set_alarms(&self, ns: &str, alarms: Vec<RawAlarm>) {
        self.with_state(|s| {
            if !s.namespaces.iter().any(|n| n == ns) {
                s.namespaces.push(ns.to_string());
            }
            s.alarms.insert(ns.to_string(), alarms);
        });
    }

    pub fn remove_namespace(&self, ns: &str) {
        self.with_state(|s| {
            s.namespaces.retain(|n| n != ns);
            s.alarms.remove(ns);
        });
    }

    pub fn set_group(&self, group: Group) {
        self.with_state(|s| {
            s.groups.insert(group.gname.clone(), group);
        });
    }

    pub fn set_user(&self, user: User) {
        self.with_state(|s| {
            s.users.insert(user.username.clone(), user);
        });
    }

    pub fn add_machine(&self, ns: &str, host: &str, ip: &str) {
        self.with_state(|s| {
            s.machines
                .entry(ns.to_string())
                .or_default()
                .push(machine(host, ip));
        });
    }

    pub fn remove_machine(&self, ns: &str, host: &str) {
        self.with_state(|s| {
            if let Some(list) = s.machines.get_mut(ns) {
                list.retain(|m| m.get("hostname").map(String::as_str) != Some(host));
            }
        });
    }

    pub fn set_offline(&self, ns: &str, host: &str) {
        self.with_state(|s| {
            s.offline
                .entry(ns.to_string())
                .or_default()
                .push(machine(host, ""));
        });
    }

    /// Make per-namespace alarm fetches for `ns` fail.
    pub fn fail_alarms_for(&self, ns: &str, failing: bool) {
        self.with_state(|s| {
            if failing {
                s.failing.insert(ns.to_string());
            } else {
                s.failing.remove(ns);
            }
        });
    }

    /// Make the namespace listing fail.
    pub fn fail_namespaces(&self, failing: bool) {
        self.with_state(|s| s.namespaces_down = failing);
    }
}

#[async_trait]
impl RegistryClient for FixtureRegistry {
    async fn namespaces(&self) -> Result<Vec<String>> {
        self.with_state(|s| {
            if s.namespaces_down {
                Err(AlertGateError::Registry("namespace listing unavailable".to_string()))
            } else {
                Ok(s.namespaces.clone())
            }
        })
    }

    async fn alarms(&self, ns: &str) -> Result<Vec<RawAlarm>> {
        self.with_state(|s| {
            if s.failing.contains(ns) {
                Err(AlertGateError::Registry(format!("alarm listing for {} unavailable", ns)))
            } else {
                Ok(s.alarms.get(ns).cloned().unwrap_or_default())
            }
        })
    }

    async fn group(&self, name: &str) -> Result<Group> {
        self.with_state(|s| {
            s.groups
                .get(name)
                .cloned()
                .ok_or_else(|| AlertGateError::Registry(format!("group {} not found", name)))
        })
    }

    async fn users(&self, usernames: &[String]) -> Result<HashMap<String, User>> {
        Ok(self.with_state(|s| {
            usernames
                .iter()
                .filter_map(|name| s.users.get(name).map(|u| (name.clone(), u.clone())))
                .collect()
        }))
    }

    async fn machines(&self, ns: &str) -> Result<Vec<MachineRecord>> {
        Ok(self.with_state(|s| s.machines.get(ns).cloned().unwrap_or_default()))
    }

    async fn offline_machines(&self) -> Result<HashMap<String, Vec<MachineRecord>>> {
        Ok(self.with_state(|s| s.offline.clone()))
    }
}
