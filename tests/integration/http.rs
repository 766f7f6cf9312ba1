// tests/integration/http.rs - HTTP routes exercised through warp's test client

use pretty_assertions::assert_eq;
use serde_json::Value;
use warp::http::StatusCode;

use alertgate::service::{routes, Envelope};

use crate::helpers::test_data::{event_json, CPU_VERSION, NS};
use crate::helpers::TestHarness;

fn envelope(body: &[u8]) -> Envelope<Value> {
    serde_json::from_slice(body).expect("response is an envelope")
}

async fn post_event(h: &TestHarness, version: &str, body: &Value) -> (StatusCode, Envelope<Value>) {
    let response = warp::test::request()
        .method("POST")
        .path(&format!("/event/post?version={}", version))
        .body(body.to_string())
        .reply(&routes(h.service.api()))
        .await;
    (response.status(), envelope(response.body()))
}

#[tokio::test]
async fn test_post_event_and_query_status() {
    let h = TestHarness::new().await;

    let (status, body) = post_event(&h, CPU_VERSION, &event_json("web-01", "2", 1.5, &[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.httpstatus, 200);
    assert_eq!(body.data, Some(Value::from("notified")));

    h.service.status().gen_global_status().await.unwrap();
    let api = routes(h.service.api());

    let response = warp::test::request()
        .path(&format!("/event/status?ns={}&level=ns", NS))
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let data = envelope(response.body()).data.unwrap();
    assert_eq!(data[NS], Value::Bool(false));

    let response = warp::test::request()
        .path(&format!("/event/status?ns={}&level=host", NS))
        .reply(&api)
        .await;
    let data = envelope(response.body()).data.unwrap();
    assert_eq!(data[NS]["web-01"], Value::Bool(false));
    assert_eq!(data[NS].as_object().unwrap().len(), 1);

    let response = warp::test::request()
        .path(&format!("/event/status?ns={}&status=WARN", NS))
        .reply(&api)
        .await;
    let body = envelope(response.body());
    let list = body.data.unwrap();
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["host"], "web-01");
    assert_eq!(list[0]["level"], "WARN");
}

#[tokio::test]
async fn test_post_event_rejects_bad_input() {
    let h = TestHarness::new().await;

    let (status, body) = post_event(&h, "", &event_json("web-01", "2", 1.0, &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.msg, "invalid alarm version");

    let response = warp::test::request()
        .method("POST")
        .path(&format!("/event/post?version={}", CPU_VERSION))
        .body("{not json")
        .reply(&routes(h.service.api()))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(envelope(response.body()).msg.starts_with("parse json error"));

    let (status, _) = post_event(&h, "web.prod__nope__00", &event_json("web-01", "2", 1.0, &[])).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(h.sent_total(), 0);
}

#[tokio::test]
async fn test_clear_status_requires_namespace() {
    let h = TestHarness::new().await;
    post_event(&h, CPU_VERSION, &event_json("web-01", "2", 1.0, &[])).await;

    let response = warp::test::request()
        .method("POST")
        .path("/event/clear/status")
        .reply(&routes(h.service.api()))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = warp::test::request()
        .method("POST")
        .path(&format!("/event/clear/status?ns={}&host=web-01", NS))
        .reply(&routes(h.service.api()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(envelope(response.body()).data, Some(Value::from(1)));
    assert!(h.store.keys().iter().all(|k| !k.contains("web-01")));
}

#[tokio::test]
async fn test_output_validates_and_delivers() {
    let h = TestHarness::new().await;
    let api = routes(h.service.api());

    let response = warp::test::request()
        .path("/event/output?types=mail&subject=deploy")
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = warp::test::request()
        .path("/event/output?types=pager&subject=deploy&content=done&groups=ops")
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.sent_total(), 0);

    let response = warp::test::request()
        .method("POST")
        .path("/event/output?types=mail,sms&subject=deploy&content=done&groups=ops")
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(envelope(response.body()).data, Some(Value::from(2)));
    assert_eq!(h.mail.sent()[0].msg, "done");
    assert_eq!(h.sms.sent()[0].alarm_name, "deploy");
}

#[tokio::test]
async fn test_method_and_path_rejections() {
    let h = TestHarness::new().await;
    let api = routes(h.service.api());

    let response = warp::test::request()
        .method("PUT")
        .path("/event/post?version=x")
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    let response = warp::test::request().path("/nowhere").reply(&api).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let h = TestHarness::new().await;
    post_event(&h, CPU_VERSION, &event_json("web-01", "2", 1.0, &[])).await;
    let api = routes(h.service.api());

    let response = warp::test::request().path("/health").reply(&api).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["status"], "ok");

    let response = warp::test::request().path("/metrics").reply(&api).await;
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8_lossy(response.body());
    assert!(text.contains("alertgate_events_total"));
}
