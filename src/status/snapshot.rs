// src/status/snapshot.rs - In-memory aggregate of every persisted status

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::warn;

use crate::keyspace;
use crate::models::{Level, Status};
use crate::store::StoreNode;

/// tag fingerprint -> status
pub type TagStatuses = BTreeMap<String, Status>;
/// host -> tags
pub type HostStatuses = BTreeMap<String, TagStatuses>;
/// alarm version -> hosts
pub type AlarmStatuses = BTreeMap<String, HostStatuses>;

/// Full target of one status record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TargetPath {
    pub ns: String,
    pub version: String,
    pub host: String,
    pub tag_fp: String,
}

/// Match on `ns` plus optional version/host/tag filters; empty filters match
/// everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusFilter<'a> {
    pub ns: &'a str,
    pub version: &'a str,
    pub host: &'a str,
    pub tag_fp: &'a str,
}

impl StatusFilter<'_> {
    fn matches(&self, ns: &str, version: &str, host: &str, tag_fp: &str) -> bool {
        let field = |filter: &str, value: &str| filter.is_empty() || filter == value;
        self.ns == ns
            && field(self.version, version)
            && field(self.host, host)
            && field(self.tag_fp, tag_fp)
    }
}

/// Whether namespace `ns` is selected by query filter `filter`: empty selects
/// everything, otherwise an exact name or a dotted suffix (`b` selects `a.b`).
pub fn namespace_matches(ns: &str, filter: &str) -> bool {
    filter.is_empty() || ns == filter || ns.ends_with(&format!(".{}", filter))
}

/// Namespace -> alarm version -> host -> tag -> status.
///
/// Built wholesale and never modified once published; removals produce a
/// filtered copy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NsStatus {
    namespaces: BTreeMap<String, AlarmStatuses>,
}

impl NsStatus {
    /// Build from a recursive listing of the store root. Leaves that do not
    /// parse are logged and skipped; their siblings are kept.
    pub fn from_tree(root: &StoreNode) -> Self {
        let mut snapshot = NsStatus::default();

        for ns_node in root.child_dirs() {
            let alarms = snapshot
                .namespaces
                .entry(ns_node.name().to_string())
                .or_default();

            for alarm_node in ns_node.child_dirs() {
                let hosts = alarms.entry(alarm_node.name().to_string()).or_default();

                for host_node in alarm_node.child_dirs() {
                    for tag_node in host_node.child_dirs() {
                        let Some(raw) = tag_node
                            .child(keyspace::STATUS_LEAF)
                            .and_then(|leaf| leaf.value.as_deref())
                        else {
                            continue;
                        };

                        match Status::from_record(raw) {
                            Ok(status) => {
                                hosts
                                    .entry(host_node.name().to_string())
                                    .or_default()
                                    .insert(tag_node.name().to_string(), status);
                            }
                            Err(e) => warn!(
                                key = %tag_node.key,
                                error = %e,
                                "Skipping unreadable status record"
                            ),
                        }
                    }
                }
            }
        }
        snapshot
    }

    pub fn insert(&mut self, target: TargetPath, status: Status) {
        self.namespaces
            .entry(target.ns)
            .or_default()
            .entry(target.version)
            .or_default()
            .entry(target.host)
            .or_default()
            .insert(target.tag_fp, status);
    }

    /// Number of status records.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn namespace_count(&self) -> usize {
        self.namespaces.len()
    }

    pub fn get(&self, target: &TargetPath) -> Option<&Status> {
        self.namespaces
            .get(&target.ns)?
            .get(&target.version)?
            .get(&target.host)?
            .get(&target.tag_fp)
    }

    /// Every record with its target.
    pub fn iter(&self) -> impl Iterator<Item = (TargetPath, &Status)> {
        self.namespaces.iter().flat_map(|(ns, alarms)| {
            alarms.iter().flat_map(move |(version, hosts)| {
                hosts.iter().flat_map(move |(host, tags)| {
                    tags.iter().map(move |(tag_fp, status)| {
                        (
                            TargetPath {
                                ns: ns.clone(),
                                version: version.clone(),
                                host: host.clone(),
                                tag_fp: tag_fp.clone(),
                            },
                            status,
                        )
                    })
                })
            })
        })
    }

    /// Targets selected by `filter`.
    pub fn matching(&self, filter: &StatusFilter<'_>) -> Vec<TargetPath> {
        self.iter()
            .filter(|(t, _)| filter.matches(&t.ns, &t.version, &t.host, &t.tag_fp))
            .map(|(t, _)| t)
            .collect()
    }

    /// Copy without the records selected by `filter`. Emptied containers are
    /// kept so namespaces and alarms stay visible as healthy.
    pub fn without(&self, filter: &StatusFilter<'_>) -> NsStatus {
        let mut copy = self.clone();
        if let Some(alarms) = copy.namespaces.get_mut(filter.ns) {
            for (version, hosts) in alarms.iter_mut() {
                for (host, tags) in hosts.iter_mut() {
                    tags.retain(|tag_fp, _| !filter.matches(filter.ns, version, host, tag_fp));
                }
                hosts.retain(|_, tags| !tags.is_empty());
            }
        }
        copy
    }

    /// Copy restricted to the namespaces selected by `filter`.
    pub fn filter_namespaces(&self, filter: &str) -> NsStatus {
        NsStatus {
            namespaces: self
                .namespaces
                .iter()
                .filter(|(ns, _)| namespace_matches(ns, filter))
                .map(|(ns, alarms)| (ns.clone(), alarms.clone()))
                .collect(),
        }
    }

    /// ns -> every record under it is OK. Namespaces without records are OK.
    pub fn ns_status(&self) -> BTreeMap<String, bool> {
        self.namespaces
            .iter()
            .map(|(ns, alarms)| {
                let ok = alarms
                    .values()
                    .flat_map(|hosts| hosts.values())
                    .flat_map(|tags| tags.values())
                    .all(|s| s.level.is_ok());
                (ns.clone(), ok)
            })
            .collect()
    }

    /// ns -> version -> every record under it is OK.
    pub fn alarm_status(&self) -> BTreeMap<String, BTreeMap<String, bool>> {
        self.namespaces
            .iter()
            .map(|(ns, alarms)| {
                let versions = alarms
                    .iter()
                    .map(|(version, hosts)| {
                        let ok = hosts
                            .values()
                            .flat_map(|tags| tags.values())
                            .all(|s| s.level.is_ok());
                        (version.clone(), ok)
                    })
                    .collect();
                (ns.clone(), versions)
            })
            .collect()
    }

    /// ns -> host -> false, for hosts with at least one non-OK record. Every
    /// namespace is present, possibly with an empty map.
    pub fn not_ok_hosts(&self) -> BTreeMap<String, BTreeMap<String, bool>> {
        self.namespaces
            .iter()
            .map(|(ns, alarms)| {
                let mut hosts = BTreeMap::new();
                for (host, tags) in alarms.values().flat_map(|h| h.iter()) {
                    if tags.values().any(|s| !s.level.is_ok()) {
                        hosts.insert(host.clone(), false);
                    }
                }
                (ns.clone(), hosts)
            })
            .collect()
    }

    /// Records at `level`, or all records when `level` is `None`, with
    /// `last_time` filled in against `now`.
    pub fn status_list(&self, level: Option<Level>, now: DateTime<Utc>) -> Vec<Status> {
        self.iter()
            .map(|(_, status)| status)
            .filter(|s| level.map_or(true, |l| s.level == l))
            .map(|s| s.with_last_time(now))
            .collect()
    }
}
