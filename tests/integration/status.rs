// tests/integration/status.rs - Status snapshot rebuild, aggregation and clearing

use pretty_assertions::assert_eq;

use alertgate::keyspace::{self, EMPTY_TAGS};
use alertgate::{AlertGateError, Level};

use crate::helpers::assertions::{assert_has_prefix, assert_no_prefix};
use crate::helpers::test_data::{event, CPU_VERSION, DISK_VERSION, NS};
use crate::helpers::TestHarness;

async fn seeded() -> TestHarness {
    let h = TestHarness::new().await;
    let handler = h.service.handler();
    handler
        .handle_event(NS, CPU_VERSION, event("web-01", "2", 1.0, &[]))
        .await
        .unwrap();
    handler
        .handle_event(NS, CPU_VERSION, event("web-02", "OK", 50.0, &[]))
        .await
        .unwrap();
    handler
        .handle_event(NS, DISK_VERSION, event("web-02", "OK", 10.0, &[]))
        .await
        .unwrap();
    h
}

#[tokio::test]
async fn test_rebuild_aggregates_by_namespace_alarm_and_host() {
    let h = seeded().await;
    let targets = h.service.status().gen_global_status().await.unwrap();
    assert_eq!(targets, 3);

    let status = h.service.status().status_for(NS).await;
    assert_eq!(status.ns_status().get(NS), Some(&false));

    let alarms = status.alarm_status();
    assert_eq!(alarms[NS][CPU_VERSION], false);
    assert_eq!(alarms[NS][DISK_VERSION], true);

    let hosts = status.not_ok_hosts();
    assert_eq!(hosts[NS].len(), 1);
    assert_eq!(hosts[NS].get("web-01"), Some(&false));

    let warnings = status.status_list(Some(Level::Warning), chrono::Utc::now());
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].host, "web-01");
    assert_eq!(status.status_list(None, chrono::Utc::now()).len(), 3);
}

#[tokio::test]
async fn test_namespace_filter_matches_dotted_suffix() {
    let h = seeded().await;
    h.service.status().gen_global_status().await.unwrap();

    assert_eq!(h.service.status().status_for("prod").await.len(), 3);
    assert!(h.service.status().status_for("web").await.is_empty());
    assert_eq!(h.service.status().status_for("").await.len(), 3);
}

#[tokio::test]
async fn test_clear_by_alarm_version() {
    let h = seeded().await;
    h.service.status().gen_global_status().await.unwrap();

    let removed = h
        .service
        .status()
        .clear_status(NS, CPU_VERSION, "", "")
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert_no_prefix(&h.store, &keyspace::host_dir(NS, CPU_VERSION, "web-01"));
    assert_has_prefix(&h.store, &keyspace::host_dir(NS, DISK_VERSION, "web-02"));

    // The cached snapshot drops the cleared targets right away
    let status = h.service.status().status_for(NS).await;
    assert_eq!(status.len(), 1);
    assert_eq!(status.ns_status().get(NS), Some(&true));
}

#[tokio::test]
async fn test_clear_by_tag_keeps_block_of_other_tags() {
    let h = TestHarness::new().await;
    let handler = h.service.handler();
    handler
        .handle_event(NS, CPU_VERSION, event("web-01", "2", 1.0, &[]))
        .await
        .unwrap();
    handler
        .handle_event(NS, CPU_VERSION, event("web-01", "2", 1.0, &[("cpu", "cpu0")]))
        .await
        .unwrap();

    let removed = h
        .service
        .status()
        .clear_status(NS, CPU_VERSION, "web-01", EMPTY_TAGS)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_no_prefix(
        &h.store,
        &keyspace::tag_dir(NS, CPU_VERSION, "web-01", EMPTY_TAGS),
    );
    assert_has_prefix(&h.store, &keyspace::host_dir(NS, CPU_VERSION, "web-01"));
}

#[tokio::test]
async fn test_clear_without_namespace_is_rejected() {
    let h = seeded().await;
    let before = h.store.len();
    let result = h.service.status().clear_status("", CPU_VERSION, "", "").await;
    assert!(matches!(result, Err(AlertGateError::InvalidRequest(_))));
    assert_eq!(h.store.len(), before);
}

#[tokio::test]
async fn test_creation_time_survives_same_level_updates() {
    let h = TestHarness::new().await;
    let handler = h.service.handler();
    let engine = h.service.status();

    handler
        .handle_event(NS, CPU_VERSION, event("web-01", "2", 1.0, &[]))
        .await
        .unwrap();
    let first = engine
        .get_status_from_cluster(NS, CPU_VERSION, "web-01", EMPTY_TAGS)
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    handler
        .handle_event(NS, CPU_VERSION, event("web-01", "2", 2.0, &[]))
        .await
        .unwrap();
    let second = engine
        .get_status_from_cluster(NS, CPU_VERSION, "web-01", EMPTY_TAGS)
        .await
        .unwrap();
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at > first.updated_at);

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    handler
        .handle_event(NS, CPU_VERSION, event("web-01", "OK", 50.0, &[]))
        .await
        .unwrap();
    let third = engine
        .get_status_from_cluster(NS, CPU_VERSION, "web-01", EMPTY_TAGS)
        .await
        .unwrap();
    assert!(third.created_at > first.created_at);
    assert_eq!(third.level, Level::Ok);
}
