// tests/helpers/assertions.rs - Custom test assertions

use alertgate::keyspace;
use alertgate::store::MemoryStore;

/// Assert that the store holds a key under the given directory.
pub fn assert_has_prefix(store: &MemoryStore, prefix: &str) {
    let keys = store.keys();
    assert!(
        keys.iter().any(|k| k.starts_with(prefix)),
        "Expected a key under {}, found {:?}",
        prefix,
        keys
    );
}

/// Assert that nothing in the store lives under the given directory.
pub fn assert_no_prefix(store: &MemoryStore, prefix: &str) {
    let keys = store.keys();
    let found: Vec<_> = keys.iter().filter(|k| k.starts_with(prefix)).collect();
    assert!(
        found.is_empty(),
        "Expected no keys under {}, found {:?}",
        prefix,
        found
    );
}

/// Assert that a status record exists for the target.
pub fn assert_status_stored(store: &MemoryStore, ns: &str, version: &str, host: &str, tag_fp: &str) {
    let key = keyspace::status_key(ns, version, host, tag_fp);
    assert!(
        store.keys().contains(&key),
        "Expected status record {}, found {:?}",
        key,
        store.keys()
    );
}
