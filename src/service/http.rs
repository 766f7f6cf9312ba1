// src/service/http.rs - HTTP control surface

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::error::{AlertGateError, Result};
use crate::handler::EventHandler;
use crate::metrics::Metrics;
use crate::models::{EventData, Level, NotifyRequest};
use crate::shutdown::TaskHandle;
use crate::status::StatusEngine;

/// Separator between the namespace and the rest of an alarm version.
pub const VERSION_SEPARATOR: &str = "__";

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub httpstatus: u16,
    pub msg: String,
    pub data: Option<T>,
}

fn success<T: Serialize>(data: T) -> Response {
    let body = Envelope {
        httpstatus: StatusCode::OK.as_u16(),
        msg: "OK".to_string(),
        data: Some(data),
    };
    warp::reply::json(&body).into_response()
}

fn failure(status: StatusCode, msg: impl Into<String>) -> Response {
    let body: Envelope<()> = Envelope {
        httpstatus: status.as_u16(),
        msg: msg.into(),
        data: None,
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

fn from_error(err: &AlertGateError) -> Response {
    failure(err.status_code(), err.to_string())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PostQuery {
    version: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StatusQuery {
    ns: String,
    level: String,
    status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ClearQuery {
    ns: String,
    alarm: String,
    host: String,
    tag: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OutputQuery {
    types: String,
    subject: String,
    content: String,
    groups: String,
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Namespace part of an alarm version, i.e. everything before the first
/// separator.
pub fn namespace_of(version: &str) -> &str {
    version
        .split_once(VERSION_SEPARATOR)
        .map(|(ns, _)| ns)
        .unwrap_or(version)
}

/// State shared by the route handlers.
pub struct HttpApi {
    handler: Arc<EventHandler>,
    status: Arc<StatusEngine>,
    metrics: Arc<Metrics>,
    metrics_enabled: bool,
}

impl HttpApi {
    pub fn new(
        handler: Arc<EventHandler>,
        status: Arc<StatusEngine>,
        metrics: Arc<Metrics>,
        metrics_enabled: bool,
    ) -> Self {
        Self {
            handler,
            status,
            metrics,
            metrics_enabled,
        }
    }

    fn observe(&self, route: &str, started: Instant, response: &Response) {
        self.metrics.record_request(
            route,
            response.status().as_str(),
            started.elapsed().as_secs_f64(),
        );
    }

    async fn post_event(&self, query: PostQuery, body: warp::hyper::body::Bytes) -> Response {
        let started = Instant::now();
        let request_id = Uuid::new_v4();
        let version = query.version;
        let ns = namespace_of(&version).to_string();
        let span = info_span!("event", %request_id, ns = %ns, version = %version);

        let response = async {
            if version.is_empty() {
                return failure(StatusCode::BAD_REQUEST, "invalid alarm version");
            }
            let event: EventData = match serde_json::from_slice(&body) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Unparseable event body");
                    return failure(StatusCode::BAD_REQUEST, format!("parse json error: {}", e));
                }
            };
            match self.handler.handle_event(&ns, &version, event).await {
                Ok(outcome) => {
                    debug!(outcome = outcome.as_str(), "Event handled");
                    success(outcome.as_str())
                }
                Err(e) => {
                    warn!(error = %e, "Event handling failed");
                    from_error(&e)
                }
            }
        }
        .instrument(span)
        .await;

        self.observe("event_post", started, &response);
        response
    }

    async fn query_status(&self, query: StatusQuery) -> Response {
        let started = Instant::now();
        let status = self.status.status_for(&query.ns).await;
        let response = match query.level.as_str() {
            "ns" => success(status.ns_status()),
            "alarm" => success(status.alarm_status()),
            "host" => success(status.not_ok_hosts()),
            _ => {
                let level = match query.status.as_str() {
                    "" => None,
                    raw => raw.parse::<Level>().ok(),
                };
                success(status.status_list(level, chrono::Utc::now()))
            }
        };
        self.observe("event_status", started, &response);
        response
    }

    async fn clear_status(&self, query: ClearQuery) -> Response {
        let started = Instant::now();
        let response = match self
            .status
            .clear_status(&query.ns, &query.alarm, &query.host, &query.tag)
            .await
        {
            Ok(removed) => {
                info!(ns = %query.ns, alarm = %query.alarm, host = %query.host, removed, "Status cleared");
                success(removed)
            }
            Err(e) => {
                warn!(ns = %query.ns, error = %e, "Clear status failed");
                from_error(&e)
            }
        };
        self.observe("event_clear_status", started, &response);
        response
    }

    async fn output(&self, query: OutputQuery) -> Response {
        let started = Instant::now();
        let request = NotifyRequest {
            types: split_csv(&query.types),
            subject: query.subject,
            content: query.content,
            groups: split_csv(&query.groups),
        };
        let response = match self.handler.notify_groups(request).await {
            Ok(delivered) => success(delivered),
            Err(e) => {
                warn!(error = %e, "Ad-hoc notification failed");
                from_error(&e)
            }
        };
        self.observe("event_output", started, &response);
        response
    }

    async fn health(&self) -> Response {
        let snapshot = self.status.snapshot().await;
        warp::reply::json(&serde_json::json!({
            "status": "ok",
            "service": "alertgate",
            "status_targets": snapshot.len(),
            "namespaces": snapshot.namespace_count(),
        }))
        .into_response()
    }

    fn metrics_text(&self) -> Response {
        if !self.metrics_enabled {
            return failure(StatusCode::NOT_FOUND, "metrics disabled");
        }
        match self.metrics.export_text() {
            Ok(text) => warp::reply::with_header(
                text,
                "content-type",
                "text/plain; version=0.0.4; charset=utf-8",
            )
            .into_response(),
            Err(e) => from_error(&e),
        }
    }
}

fn with_api(
    api: Arc<HttpApi>,
) -> impl Filter<Extract = (Arc<HttpApi>,), Error = Infallible> + Clone {
    warp::any().map(move || api.clone())
}

fn get_or_post() -> impl Filter<Extract = (), Error = Rejection> + Copy {
    warp::get().or(warp::post()).unify()
}

/// Every route, with CORS and envelope-shaped rejections.
pub fn routes(api: Arc<HttpApi>) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let post = warp::path!("event" / "post")
        .and(get_or_post())
        .and(warp::query::<PostQuery>())
        .and(warp::body::bytes())
        .and(with_api(api.clone()))
        .then(|query, body, api: Arc<HttpApi>| async move { api.post_event(query, body).await });

    let status = warp::path!("event" / "status")
        .and(warp::get())
        .and(warp::query::<StatusQuery>())
        .and(with_api(api.clone()))
        .then(|query, api: Arc<HttpApi>| async move { api.query_status(query).await });

    let clear = warp::path!("event" / "clear" / "status")
        .and(get_or_post())
        .and(warp::query::<ClearQuery>())
        .and(with_api(api.clone()))
        .then(|query, api: Arc<HttpApi>| async move { api.clear_status(query).await });

    let output = warp::path!("event" / "output")
        .and(get_or_post())
        .and(warp::query::<OutputQuery>())
        .and(with_api(api.clone()))
        .then(|query, api: Arc<HttpApi>| async move { api.output(query).await });

    let health = warp::path!("health")
        .and(warp::get())
        .and(with_api(api.clone()))
        .then(|api: Arc<HttpApi>| async move { api.health().await });

    let metrics = warp::path!("metrics")
        .and(warp::get())
        .and(with_api(api))
        .map(|api: Arc<HttpApi>| api.metrics_text());

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["DELETE", "GET", "OPTIONS", "POST", "PUT"])
        .allow_headers(vec![
            "Accept",
            "Accept-Encoding",
            "Authorization",
            "Content-Length",
            "Content-Type",
            "X-CSRF-Token",
            "X-HTTP-Method-Override",
            "AuthToken",
            "NS",
            "Resource",
            "X-Requested-With",
        ]);

    post.or(status)
        .unify()
        .or(clear)
        .unify()
        .or(output)
        .unify()
        .or(health)
        .unify()
        .or(metrics)
        .unify()
        .with(cors)
        .recover(handle_rejection)
}

async fn handle_rejection(err: Rejection) -> std::result::Result<Response, Infallible> {
    let response = if err.is_not_found() {
        failure(StatusCode::NOT_FOUND, "not found")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        failure(StatusCode::METHOD_NOT_ALLOWED, "Get or POST please!")
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        failure(StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<warp::cors::CorsForbidden>() {
        failure(StatusCode::FORBIDDEN, e.to_string())
    } else {
        warn!(rejection = ?err, "Unhandled rejection");
        failure(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    };
    Ok(response)
}

/// Serve until the task handle is signalled.
pub async fn serve(api: Arc<HttpApi>, addr: SocketAddr, mut handle: TaskHandle) -> Result<()> {
    let (bound, server) = warp::serve(routes(api))
        .try_bind_with_graceful_shutdown(addr, async move {
            handle.wait_for_shutdown().await;
        })
        .map_err(|e| AlertGateError::Network(format!("bind {}: {}", addr, e)))?;

    info!("🌐 HTTP server listening on http://{}", bound);
    server.await;
    info!("HTTP server stopped");
    Ok(())
}
