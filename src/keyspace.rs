// src/keyspace.rs - Key layout of the coordination store
//
// Every target lives under `ns/version/host/tagfp`, with the status record at
// `.../status` and the suppression state under `.../block/`. All functions here
// are pure and return keys relative to the store root.

/// Segment used when a tag set is empty.
pub const EMPTY_TAGS: &str = "none";

/// Host segment for events that are not grouped by host.
pub const NO_HOST: &str = "none";

pub const STATUS_LEAF: &str = "status";
pub const BLOCK_DIR: &str = "block";
pub const BLOCK_STATUS_LEAF: &str = "blockstatus";
pub const BLOCK_TIMES_LEAF: &str = "blocktimes";

/// Join a relative key onto the store root prefix.
pub fn abs_path(root: &str, relative: &str) -> String {
    let root = root.trim_end_matches('/');
    let relative = relative.trim_matches('/');
    if relative.is_empty() {
        return root.to_string();
    }
    format!("{}/{}", root, relative)
}

pub fn ns_dir(ns: &str) -> String {
    ns.to_string()
}

pub fn alarm_dir(ns: &str, version: &str) -> String {
    format!("{}/{}", ns, version)
}

pub fn host_dir(ns: &str, version: &str, host: &str) -> String {
    format!("{}/{}", alarm_dir(ns, version), host)
}

pub fn tag_dir(ns: &str, version: &str, host: &str, tag_fp: &str) -> String {
    format!("{}/{}", host_dir(ns, version, host), tag_fp)
}

pub fn status_key(ns: &str, version: &str, host: &str, tag_fp: &str) -> String {
    format!("{}/{}", tag_dir(ns, version, host, tag_fp), STATUS_LEAF)
}

pub fn block_dir(ns: &str, version: &str, host: &str, tag_fp: &str) -> String {
    format!("{}/{}", tag_dir(ns, version, host, tag_fp), BLOCK_DIR)
}

pub fn block_status_key(ns: &str, version: &str, host: &str, tag_fp: &str) -> String {
    format!("{}/{}", block_dir(ns, version, host, tag_fp), BLOCK_STATUS_LEAF)
}

pub fn block_times_key(ns: &str, version: &str, host: &str, tag_fp: &str) -> String {
    format!("{}/{}", block_dir(ns, version, host, tag_fp), BLOCK_TIMES_LEAF)
}

/// Stable digest of a tag set.
///
/// Pairs are sorted by key, joined as `k1=v1;k2=v2` and md5-hashed into
/// lowercase hex. An empty set maps to [`EMPTY_TAGS`]. The result depends only
/// on the sorted key/value bytes, so it is identical across restarts and
/// independent of the map type or insertion order.
pub fn tag_fingerprint<'a, I>(tags: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut pairs: Vec<(&String, &String)> = tags.into_iter().collect();
    if pairs.is_empty() {
        return EMPTY_TAGS.to_string();
    }
    pairs.sort();

    let joined = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(";");

    format!("{:x}", md5::compute(joined.as_bytes()))
}

/// Last segment of a relative key.
pub fn last_segment(key: &str) -> &str {
    key.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}
