// tests/integration/events.rs - Event pipeline from alarm lookup to delivery

use pretty_assertions::assert_eq;

use alertgate::keyspace::{self, EMPTY_TAGS, NO_HOST};
use alertgate::models::TagMap;
use alertgate::{AlertGateError, EventOutcome, Level};

use crate::helpers::assertions::{assert_no_prefix, assert_status_stored};
use crate::helpers::test_data::{event, CPU_VERSION, DISK_VERSION, NS};
use crate::helpers::TestHarness;
use crate::integration::{print_test_header, print_test_success};

#[tokio::test]
async fn test_warn_repeat_recover_cycle() {
    print_test_header("warn/repeat/recover cycle", "🔔");
    let h = TestHarness::new().await;
    let handler = h.service.handler();

    let outcome = handler
        .handle_event(NS, CPU_VERSION, event("web-01", "2", 3.456, &[]))
        .await
        .unwrap();
    assert_eq!(outcome, EventOutcome::Notified);

    let outcome = handler
        .handle_event(NS, CPU_VERSION, event("web-01", "2", 2.0, &[]))
        .await
        .unwrap();
    assert_eq!(outcome, EventOutcome::Suppressed);
    assert_eq!(h.mail.count(), 1);

    let outcome = handler
        .handle_event(NS, CPU_VERSION, event("web-01", "OK", 40.0, &[]))
        .await
        .unwrap();
    assert_eq!(outcome, EventOutcome::Recovered);
    assert_no_prefix(
        &h.store,
        &keyspace::block_dir(NS, CPU_VERSION, "web-01", EMPTY_TAGS),
    );

    // Recovery resets suppression for the next problem
    let outcome = handler
        .handle_event(NS, CPU_VERSION, event("web-01", "2", 1.0, &[]))
        .await
        .unwrap();
    assert_eq!(outcome, EventOutcome::Notified);

    let sent = h.mail.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].receivers, vec!["alice".to_string(), "bob".to_string()]);
    assert_eq!(sent[0].ip, "10.0.0.1");
    assert_eq!(sent[0].value, 3.46);
    assert_eq!(sent[1].level, Level::Ok);
    assert_eq!(h.sms.count() + h.wechat.count(), 0);
    print_test_success("warn/repeat/recover cycle");
}

#[tokio::test]
async fn test_status_record_reflects_latest_event() {
    let h = TestHarness::new().await;
    let handler = h.service.handler();

    handler
        .handle_event(NS, CPU_VERSION, event("web-02", "2", 4.0, &[]))
        .await
        .unwrap();
    handler
        .handle_event(NS, CPU_VERSION, event("web-02", "1", 0.5, &[]))
        .await
        .unwrap();

    assert_status_stored(&h.store, NS, CPU_VERSION, "web-02", EMPTY_TAGS);
    let status = h
        .service
        .status()
        .get_status_from_cluster(NS, CPU_VERSION, "web-02", EMPTY_TAGS)
        .await
        .unwrap();
    assert_eq!(status.level, Level::Critical);
    assert_eq!(status.ip, "10.0.0.2");
    assert_eq!(status.value, 0.5);
    assert_eq!(
        status.receivers,
        vec!["alice(13800000001)".to_string(), "bob()".to_string()]
    );
}

#[tokio::test]
async fn test_critical_alarm_forces_wechat() {
    let h = TestHarness::new().await;

    let outcome = h
        .service
        .handler()
        .handle_event(NS, DISK_VERSION, event("web-01", "1", 97.0, &[]))
        .await
        .unwrap();
    assert_eq!(outcome, EventOutcome::Notified);
    assert_eq!(h.sms.count(), 1);
    assert_eq!(h.wechat.count(), 1);
    assert_eq!(h.mail.count(), 0);
}

#[tokio::test]
async fn test_tag_sets_are_tracked_separately() {
    let h = TestHarness::new().await;
    let handler = h.service.handler();

    let root = handler
        .handle_event(NS, CPU_VERSION, event("web-01", "2", 1.0, &[("path", "/")]))
        .await
        .unwrap();
    let data = handler
        .handle_event(NS, CPU_VERSION, event("web-01", "2", 1.0, &[("path", "/data")]))
        .await
        .unwrap();
    assert_eq!(root, EventOutcome::Notified);
    assert_eq!(data, EventOutcome::Notified);
    assert_eq!(h.mail.count(), 2);

    let mut tags = TagMap::new();
    tags.insert("path".to_string(), "/".to_string());
    let root_fp = keyspace::tag_fingerprint(&tags);
    assert_status_stored(&h.store, NS, CPU_VERSION, "web-01", &root_fp);
}

#[tokio::test]
async fn test_event_without_host_is_recorded_under_placeholder() {
    let h = TestHarness::new().await;

    let outcome = h
        .service
        .handler()
        .handle_event(NS, CPU_VERSION, event("", "2", 1.0, &[]))
        .await
        .unwrap();
    assert_eq!(outcome, EventOutcome::Notified);
    assert_status_stored(&h.store, NS, CPU_VERSION, NO_HOST, EMPTY_TAGS);
    assert_eq!(h.mail.sent()[0].ip, "");
}

#[tokio::test]
async fn test_offline_host_is_dropped() {
    let h = TestHarness::new().await;
    h.registry.set_offline(NS, "web-02");
    h.refresh().await;

    let outcome = h
        .service
        .handler()
        .handle_event(NS, CPU_VERSION, event("web-02", "2", 1.0, &[]))
        .await
        .unwrap();
    assert_eq!(outcome, EventOutcome::Dropped);
    assert!(h.store.is_empty());
    assert_eq!(h.sent_total(), 0);
}

#[tokio::test]
async fn test_unknown_version_is_rejected() {
    let h = TestHarness::new().await;

    let result = h
        .service
        .handler()
        .handle_event(NS, "web.prod__gone__zz", event("web-01", "2", 1.0, &[]))
        .await;
    assert!(matches!(result, Err(AlertGateError::AlarmNotFound { .. })));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_delivery_failure_keeps_status() {
    let h = TestHarness::new().await;
    h.mail.set_should_fail(true);

    let result = h
        .service
        .handler()
        .handle_event(NS, CPU_VERSION, event("web-01", "2", 1.0, &[]))
        .await;
    assert!(matches!(result, Err(AlertGateError::Notify { .. })));
    assert_status_stored(&h.store, NS, CPU_VERSION, "web-01", EMPTY_TAGS);
}

#[tokio::test]
async fn test_removed_alarm_stops_matching_after_refresh() {
    let h = TestHarness::new().await;
    h.registry.set_alarms(NS, vec![crate::helpers::test_data::disk_alarm()]);
    h.refresh().await;

    let result = h
        .service
        .handler()
        .handle_event(NS, CPU_VERSION, event("web-01", "2", 1.0, &[]))
        .await;
    assert!(matches!(result, Err(AlertGateError::AlarmNotFound { .. })));
}
