// tests/integration/reconcile.rs - Store layout reconciliation against the registry

use pretty_assertions::assert_eq;
use std::time::Duration;

use alertgate::keyspace::{self, EMPTY_TAGS};
use alertgate::shutdown::TaskHandle;
use alertgate::store::CoordinationStore;

use crate::helpers::assertions::{assert_has_prefix, assert_no_prefix};
use crate::helpers::test_data::{cpu_alarm, event, CPU_VERSION, DISK_VERSION, NS};
use crate::helpers::{wait_for_condition, TestHarness};

#[tokio::test]
async fn test_reconcile_creates_layout_and_is_idempotent() {
    let h = TestHarness::new().await;

    let first = h.service.reconciler().reconcile().await.unwrap();
    assert_eq!(first.namespaces_created, 1);
    assert_eq!(first.alarms_created, 2);
    assert!(h.store.keys().contains(&keyspace::alarm_dir(NS, CPU_VERSION)));
    assert!(h.store.keys().contains(&keyspace::alarm_dir(NS, DISK_VERSION)));

    let before = h.store.mutation_count();
    let second = h.service.reconciler().reconcile().await.unwrap();
    assert_eq!(second.mutations(), 0);
    assert_eq!(h.store.mutation_count(), before);
}

#[tokio::test]
async fn test_reconcile_prunes_stale_entries() {
    let h = TestHarness::new().await;
    let handler = h.service.handler();
    handler
        .handle_event(NS, CPU_VERSION, event("web-01", "2", 1.0, &[]))
        .await
        .unwrap();
    handler
        .handle_event(NS, CPU_VERSION, event("web-02", "2", 1.0, &[]))
        .await
        .unwrap();
    h.store
        .set(&keyspace::status_key("gone.ns", "gone.ns__x__1", "h", EMPTY_TAGS), "{}")
        .await
        .unwrap();

    // web-02 leaves the inventory
    h.registry.remove_machine(NS, "web-02");
    h.refresh().await;

    let report = h.service.reconciler().reconcile().await.unwrap();
    assert_eq!(report.namespaces_removed, 1);
    assert_eq!(report.hosts_removed, 1);
    assert_no_prefix(&h.store, "gone.ns");
    assert_no_prefix(&h.store, &keyspace::host_dir(NS, CPU_VERSION, "web-02"));
    assert_has_prefix(&h.store, &keyspace::host_dir(NS, CPU_VERSION, "web-01"));
}

#[tokio::test]
async fn test_unsynced_namespace_is_left_alone() {
    let h = TestHarness::new().await;
    h.service
        .handler()
        .handle_event(NS, CPU_VERSION, event("web-01", "2", 1.0, &[]))
        .await
        .unwrap();

    h.registry.fail_alarms_for(NS, true);
    h.registry.remove_machine(NS, "web-01");
    h.refresh().await;

    let report = h.service.reconciler().reconcile().await.unwrap();
    assert_eq!(report.hosts_removed, 0);
    assert_has_prefix(&h.store, &keyspace::host_dir(NS, CPU_VERSION, "web-01"));
}

#[tokio::test]
async fn test_removed_alarm_is_purged_by_listener() {
    let h = TestHarness::new().await;
    h.service
        .handler()
        .handle_event(NS, DISK_VERSION, event("web-01", "1", 99.0, &[]))
        .await
        .unwrap();
    assert_has_prefix(&h.store, &keyspace::alarm_dir(NS, DISK_VERSION));

    let loops = h.service.loops();
    let (handle, stop) = TaskHandle::detached("alarm-removals");
    let listener = tokio::spawn(loops.clone().run_removal_listener(handle));
    tokio::time::sleep(Duration::from_millis(20)).await;

    h.registry.set_alarms(NS, vec![cpu_alarm()]);
    loops.refresh_alarms_once().await;

    let store = h.store.clone();
    let prefix = keyspace::alarm_dir(NS, DISK_VERSION);
    let purged = wait_for_condition(
        move || store.keys().iter().all(|k| !k.starts_with(&prefix)),
        Duration::from_secs(2),
    )
    .await;
    assert!(purged, "removed alarm directory should be purged");

    stop.send(true).unwrap();
    listener.await.unwrap();
}

#[tokio::test]
async fn test_empty_alarm_cache_skips_reconcile() {
    let h = TestHarness::new().await;
    h.registry.remove_namespace(NS);
    h.refresh().await;
    h.store.set("stray/key", "x").await.unwrap();

    let report = h.service.reconciler().reconcile().await.unwrap();
    assert_eq!(report.mutations(), 0);
    assert_has_prefix(&h.store, "stray");
}
