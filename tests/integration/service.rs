// tests/integration/service.rs - Full service lifecycle over a real listener

use pretty_assertions::assert_eq;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

use alertgate::keyspace;
use alertgate::service::Envelope;
use alertgate::shutdown::{ShutdownConfig, ShutdownCoordinator, ShutdownReason};
use alertgate::Config;

use crate::helpers::test_data::{default_registry, event_json, CPU_VERSION, DISK_VERSION, NS};
use crate::helpers::{get_next_port, wait_for_condition, wait_for_service, TestHarness};
use crate::integration::{print_test_header, print_test_success};

fn fast_config(port: u16) -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = port;
    config.loops.alarm_refresh_seconds = 1;
    config.loops.machine_refresh_seconds = 1;
    config.loops.status_rebuild_seconds = 1;
    config.loops.reconcile_seconds = 1;
    config
}

#[tokio::test]
#[serial]
async fn test_service_lifecycle() {
    print_test_header("service lifecycle", "🚀");
    let port = get_next_port();
    let h = TestHarness::with_registry(Arc::new(default_registry()), fast_config(port)).await;

    let coordinator = ShutdownCoordinator::new(ShutdownConfig {
        graceful_timeout: Duration::from_secs(5),
        ..Default::default()
    });
    h.service.start(&coordinator).await.unwrap();

    let addr = format!("127.0.0.1:{}", port);
    assert!(wait_for_service(&addr, 5000).await, "server should accept connections");

    // The reconciler lays out every known alarm directory
    let store = h.store.clone();
    let laid_out = wait_for_condition(
        move || {
            let keys = store.keys();
            keys.contains(&keyspace::alarm_dir(NS, CPU_VERSION))
                && keys.contains(&keyspace::alarm_dir(NS, DISK_VERSION))
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(laid_out, "alarm directories should be created");

    let client = reqwest::Client::new();
    let body: Envelope<serde_json::Value> = client
        .post(format!("http://{}/event/post?version={}", addr, CPU_VERSION))
        .json(&event_json("web-01", "2", 1.0, &[]))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body.httpstatus, 200);
    assert_eq!(h.mail.count(), 1);

    // The rebuild loop picks the new record up
    let status = h.service.status().clone();
    let mut rebuilt = false;
    for _ in 0..50 {
        if status.snapshot().await.len() == 1 {
            rebuilt = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(rebuilt, "status snapshot should include the posted event");

    let stats = coordinator
        .initiate_shutdown(ShutdownReason::Graceful)
        .await
        .unwrap();
    assert_eq!(stats.total_tasks, 6);
    assert_eq!(stats.forced_kills, 0);
    assert_eq!(stats.failed_tasks, 0);

    assert!(
        tokio::net::TcpStream::connect(&addr).await.is_err(),
        "listener should be closed after shutdown"
    );
    print_test_success("service lifecycle");
}

#[tokio::test]
#[serial]
async fn test_port_conflict_marks_http_task_failed() {
    let port = get_next_port();
    let _occupied = std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
    let h = TestHarness::with_registry(Arc::new(default_registry()), fast_config(port)).await;

    let coordinator = ShutdownCoordinator::new(ShutdownConfig {
        graceful_timeout: Duration::from_secs(5),
        ..Default::default()
    });
    h.service.start(&coordinator).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let stats = coordinator
        .initiate_shutdown(ShutdownReason::Graceful)
        .await
        .unwrap();
    assert_eq!(stats.failed_tasks, 1);
    assert_eq!(stats.forced_kills, 0);
}
