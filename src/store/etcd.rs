// src/store/etcd.rs - etcd v2 keys API backend

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{AlertGateError, Result};
use crate::keyspace;

use super::{CoordinationStore, StoreNode};

const ERR_KEY_NOT_FOUND: u64 = 100;
const ERR_NOT_FILE: u64 = 102;
const ERR_NOT_DIR: u64 = 104;
const ERR_NODE_EXIST: u64 = 105;

#[derive(Debug, Deserialize)]
struct EtcdResponse {
    #[serde(default)]
    action: String,
    node: Option<EtcdNode>,
}

#[derive(Debug, Deserialize)]
struct EtcdNode {
    #[serde(default)]
    key: String,
    value: Option<String>,
    #[serde(default)]
    dir: bool,
    #[serde(default)]
    nodes: Vec<EtcdNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EtcdErrorBody {
    error_code: u64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    cause: String,
}

/// Client for the etcd v2 `/v2/keys` HTTP API.
///
/// Requests go to a randomly chosen endpoint first and fail over to the
/// others on transport errors.
pub struct EtcdStore {
    client: Client,
    endpoints: Vec<String>,
    root: String,
    credentials: Option<(String, String)>,
    timeout: Duration,
}

impl EtcdStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        if config.endpoints.is_empty() {
            return Err(AlertGateError::Configuration(
                "etcd store requires at least one endpoint".to_string(),
            ));
        }

        let timeout = Duration::from_secs(config.request_timeout_seconds);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AlertGateError::Configuration(format!("etcd client: {}", e)))?;

        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(pass)) if !user.is_empty() => Some((user.clone(), pass.clone())),
            _ => None,
        };

        Ok(Self {
            client,
            endpoints: config
                .endpoints
                .iter()
                .map(|e| e.trim_end_matches('/').to_string())
                .collect(),
            root: format!("/{}", config.root.trim_matches('/')),
            credentials,
            timeout,
        })
    }

    fn relative<'a>(&self, abs: &'a str) -> &'a str {
        abs.strip_prefix(&self.root)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(abs)
    }

    fn convert(&self, node: EtcdNode) -> StoreNode {
        StoreNode {
            key: self.relative(&node.key).to_string(),
            value: if node.dir { None } else { node.value },
            dir: node.dir,
            nodes: node.nodes.into_iter().map(|n| self.convert(n)).collect(),
        }
    }

    fn map_error(&self, key: &str, status: StatusCode, body: &str) -> AlertGateError {
        let key = key.trim_matches('/').to_string();
        match serde_json::from_str::<EtcdErrorBody>(body) {
            Ok(err) => match err.error_code {
                ERR_KEY_NOT_FOUND => AlertGateError::KeyNotFound { key },
                ERR_NOT_FILE | ERR_NOT_DIR => AlertGateError::NotADirectory { key },
                ERR_NODE_EXIST => AlertGateError::KeyExists { key },
                code => AlertGateError::Store(format!(
                    "etcd error {}: {} ({})",
                    code, err.message, err.cause
                )),
            },
            Err(_) => AlertGateError::Store(format!("etcd returned {}: {}", status, body)),
        }
    }

    /// Send one request, failing over across endpoints on transport errors.
    async fn send(
        &self,
        method: Method,
        key: &str,
        query: &[(&str, String)],
        form: &[(&str, String)],
    ) -> Result<EtcdResponse> {
        let path = keyspace::abs_path(&self.root, key);
        let start = fastrand::usize(..self.endpoints.len());
        let mut last_error = None;

        for offset in 0..self.endpoints.len() {
            let endpoint = &self.endpoints[(start + offset) % self.endpoints.len()];
            let url = format!("{}/v2/keys{}", endpoint, path);

            let mut request = self.client.request(method.clone(), &url).query(query);
            if !form.is_empty() {
                request = request.form(form);
            }
            if let Some((user, pass)) = &self.credentials {
                request = request.basic_auth(user, Some(pass));
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) if e.is_timeout() => {
                    warn!(endpoint = %endpoint, key, "etcd request timed out");
                    last_error = Some(AlertGateError::Timeout {
                        timeout_seconds: self.timeout.as_secs(),
                    });
                    continue;
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, key, error = %e, "etcd endpoint unreachable");
                    last_error = Some(AlertGateError::from(e));
                    continue;
                }
            };

            let status = response.status();
            let body = response.text().await?;
            if !status.is_success() {
                return Err(self.map_error(key, status, &body));
            }

            let parsed: EtcdResponse = serde_json::from_str(&body).map_err(|e| {
                AlertGateError::Store(format!("invalid etcd response for {}: {}", key, e))
            })?;
            debug!(action = %parsed.action, key, "etcd request completed");
            return Ok(parsed);
        }

        Err(last_error.unwrap_or_else(|| {
            AlertGateError::Store("no etcd endpoint configured".to_string())
        }))
    }

    async fn read(&self, key: &str, recursive: bool) -> Result<StoreNode> {
        let query = if recursive {
            vec![("recursive", "true".to_string())]
        } else {
            Vec::new()
        };

        match self.send(Method::GET, key, &query, &[]).await {
            Ok(response) => response
                .node
                .map(|node| self.convert(node))
                .ok_or_else(|| AlertGateError::Store(format!("etcd returned no node for {}", key))),
            // The root directory may not exist yet on a fresh cluster
            Err(e) if e.is_not_found() && key.trim_matches('/').is_empty() => Ok(StoreNode {
                dir: true,
                ..Default::default()
            }),
            Err(e) => Err(e),
        }
    }

    async fn put(&self, key: &str, form: Vec<(&str, String)>) -> Result<()> {
        self.send(Method::PUT, key, &[], &form).await.map(|_| ())
    }
}

#[async_trait]
impl CoordinationStore for EtcdStore {
    async fn get(&self, key: &str) -> Result<StoreNode> {
        self.read(key, false).await
    }

    async fn recursive_get(&self, key: &str) -> Result<StoreNode> {
        self.read(key, true).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.put(key, vec![("value", value.to_string())]).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.put(
            key,
            vec![
                ("value", value.to_string()),
                ("ttl", ttl.as_secs().max(1).to_string()),
            ],
        )
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self.send(Method::DELETE, key, &[], &[]).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(key, "Delete of absent key ignored");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_dir(&self, key: &str) -> Result<()> {
        let query = [
            ("recursive", "true".to_string()),
            ("dir", "true".to_string()),
        ];
        match self.send(Method::DELETE, key, &query, &[]).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(key, "Delete of absent directory ignored");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn mkdir(&self, key: &str) -> Result<()> {
        self.put(
            key,
            vec![("dir", "true".to_string()), ("prevExist", "false".to_string())],
        )
        .await
    }

    async fn try_lock(&self, key: &str, ttl: Duration) -> Result<bool> {
        let form = vec![
            ("value", "locked".to_string()),
            ("ttl", ttl.as_secs().max(1).to_string()),
            ("prevExist", "false".to_string()),
        ];
        match self.put(key, form).await {
            Ok(()) => Ok(true),
            Err(AlertGateError::KeyExists { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn unlock(&self, key: &str) -> Result<()> {
        self.delete(key).await
    }

    fn backend_name(&self) -> &'static str {
        "etcd"
    }
}
