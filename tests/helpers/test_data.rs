// tests/helpers/test_data.rs - Test data generators

use alertgate::models::{EventData, RawAlarm};
use alertgate::registry::{FixtureRegistry, Group, User};

pub const NS: &str = "web.prod";
pub const CPU_VERSION: &str = "web.prod__cpu__a1";
pub const DISK_VERSION: &str = "web.prod__disk__b2";

/// Warning-level alarm delivered by mail to the `ops` group.
pub fn cpu_alarm() -> RawAlarm {
    RawAlarm {
        name: "cpu idle low".into(),
        version: CPU_VERSION.into(),
        measurement: "cpu.idle".into(),
        expression: "<".into(),
        value: "5".into(),
        every: "1m".into(),
        period: "5m".into(),
        level: "2".into(),
        alert: "mail".into(),
        groups: "ops".into(),
        ..Default::default()
    }
}

/// Critical alarm delivered by sms; wechat is forced on top.
pub fn disk_alarm() -> RawAlarm {
    RawAlarm {
        name: "disk full".into(),
        version: DISK_VERSION.into(),
        measurement: "disk.used_percent".into(),
        expression: ">".into(),
        value: "95".into(),
        every: "1m".into(),
        period: "5m".into(),
        level: "1".into(),
        alert: "sms".into(),
        groups: "ops".into(),
        ..Default::default()
    }
}

/// One namespace with two alarms, two machines and a two-person `ops` group.
pub fn default_registry() -> FixtureRegistry {
    let registry = FixtureRegistry::new();
    registry.set_alarms(NS, vec![cpu_alarm(), disk_alarm()]);
    registry.set_group(Group {
        gname: "ops".into(),
        managers: vec!["alice".into()],
        members: vec!["bob".into()],
    });
    registry.set_user(User {
        username: "alice".into(),
        mobile: "13800000001".into(),
    });
    registry.set_user(User {
        username: "bob".into(),
        mobile: String::new(),
    });
    registry.add_machine(NS, "web-01", "10.0.0.1");
    registry.add_machine(NS, "web-02", "10.0.0.2");
    registry
}

/// Event for `host` at `level`, with extra series tags.
pub fn event(host: &str, level: &str, value: f64, tags: &[(&str, &str)]) -> EventData {
    serde_json::from_value(event_json(host, level, value, tags)).expect("valid event")
}

/// Wire form of [`event`], as posted by the alerting engine.
pub fn event_json(host: &str, level: &str, value: f64, tags: &[(&str, &str)]) -> serde_json::Value {
    let mut tag_map = serde_json::Map::new();
    if !host.is_empty() {
        tag_map.insert("host".into(), host.into());
    }
    for (k, v) in tags {
        tag_map.insert((*k).into(), (*v).into());
    }
    serde_json::json!({
        "id": "cpu idle low",
        "message": format!("{} {}", host, level),
        "time": "2024-05-01T10:00:00Z",
        "duration": 0,
        "level": level,
        "data": {"series": [{
            "name": "cpu.idle",
            "tags": tag_map,
            "columns": ["time", "value"],
            "values": [["2024-05-01T10:00:00Z", value]]
        }]}
    })
}
