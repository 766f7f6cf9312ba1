// tests/integration/config.rs - Building the service from configuration files

use pretty_assertions::assert_eq;
use serial_test::serial;
use std::io::Write;
use std::sync::Arc;

use alertgate::registry::create_registry;
use alertgate::store::create_store;
use alertgate::{AlertGateService, Config, EventOutcome, Metrics};

use crate::helpers::test_data::{event, CPU_VERSION, NS};

const FIXTURE: &str = r#"{
  "alarms": {
    "web.prod": [
      {"name": "cpu idle low", "version": "web.prod__cpu__a1", "measurement": "cpu.idle",
       "expression": "<", "value": "5", "every": "1m", "level": "2",
       "alert": "mail,pager", "groups": "ops"}
    ]
  },
  "groups": [{"gname": "ops", "managers": ["alice"], "members": []}],
  "users": [{"username": "alice", "mobile": "13800000001"}],
  "machines": {"web.prod": {"web-01": "10.0.0.1"}}
}"#;

#[tokio::test]
#[serial]
async fn test_service_from_config_file() {
    let mut fixture = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    fixture.write_all(FIXTURE.as_bytes()).unwrap();

    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[server]
host = "127.0.0.1"
port = 0

[store]
backend = "memory"
root = "/alertgate-test"

[registry]
backend = "fixture"
fixture_path = "{}"
"#,
        fixture.path().display()
    )
    .unwrap();

    let config = Arc::new(Config::from_file(file.path()).unwrap());
    assert!(config.validate_detailed().success);

    let store = create_store(&config).await.unwrap();
    let registry = create_registry(&config).unwrap();
    let service = AlertGateService::new(
        config.clone(),
        store,
        registry,
        Arc::new(Metrics::new().unwrap()),
    )
    .unwrap();

    let loops = service.loops();
    loops.refresh_alarms_once().await;
    loops.refresh_machines_once().await;
    assert_eq!(service.alarms().snapshot().await.version_count(), 1);

    // No delivery scripts are configured, so every channel is skipped
    let outcome = service
        .handler()
        .handle_event(NS, CPU_VERSION, event("web-01", "2", 1.0, &[]))
        .await
        .unwrap();
    assert_eq!(outcome, EventOutcome::Notified);
    assert!(service.handler().dispatcher().channels().is_empty());
}

#[test]
#[serial]
fn test_unknown_backends_are_rejected() {
    let mut config = Config::default();
    config.registry.backend = "ldap".to_string();
    assert!(create_registry(&config).is_err());

    config.registry.backend = "fixture".to_string();
    config.registry.fixture_path = None;
    assert!(create_registry(&config).is_err());
}
