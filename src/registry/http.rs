// src/registry/http.rs - Registry client over its HTTP API

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::RegistryConfig;
use crate::error::{AlertGateError, Result};
use crate::models::RawAlarm;

use super::{Group, MachineRecord, RegistryClient, User};

const NS_PATH: &str = "/api/v1/event/ns";
const RESOURCE_PATH: &str = "/api/v1/event/resource";
const SEARCH_PATH: &str = "/api/v1/event/resource/search";
const GROUP_PATH: &str = "/api/v1/event/group";
const USER_LIST_PATH: &str = "/api/v1/event/user/list";

/// Namespace holding the machine status index.
const MACHINE_INDEX_NS: &str = "loda";

const MAX_ATTEMPTS: u32 = 2;
const RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    httpstatus: u16,
    data: T,
}

pub struct HttpRegistry {
    client: reqwest::Client,
    base: Url,
}

impl HttpRegistry {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let base = Url::parse(&config.link).map_err(|e| {
            AlertGateError::Configuration(format!("invalid registry link {}: {}", config.link, e))
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| AlertGateError::Configuration(format!("registry client: {}", e)))?;

        Ok(Self { client, base })
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| AlertGateError::Registry(format!("bad registry path {}: {}", path, e)))?;
        url.query_pairs_mut().extend_pairs(query);
        Ok(url)
    }

    async fn get_data<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.url(path, query)?;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.try_get::<T>(&url).await {
                Ok(data) => return Ok(data),
                Err(e) => {
                    warn!(
                        url = %url,
                        attempt,
                        max_attempts = MAX_ATTEMPTS,
                        error = %e,
                        "Registry request failed"
                    );
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_DELAY).await;
                    } else {
                        return Err(e);
                    }
                }
            }
        }

        Err(AlertGateError::Registry(format!("no attempt made for {}", url)))
    }

    async fn try_get<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AlertGateError::Registry(format!(
                "{} returned http status code {}",
                url.path(),
                status.as_u16()
            )));
        }

        let body = response.bytes().await?;
        let envelope: Envelope<T> = serde_json::from_slice(&body).map_err(|e| {
            AlertGateError::Registry(format!("unmarshal {} response: {}", url.path(), e))
        })?;
        if envelope.httpstatus != 0 && envelope.httpstatus != 200 {
            return Err(AlertGateError::Registry(format!(
                "{} returned envelope status {}",
                url.path(),
                envelope.httpstatus
            )));
        }

        debug!(path = url.path(), "Registry request succeeded");
        Ok(envelope.data)
    }
}

#[async_trait]
impl RegistryClient for HttpRegistry {
    async fn namespaces(&self) -> Result<Vec<String>> {
        self.get_data(NS_PATH, &[("ns", ""), ("format", "list")]).await
    }

    async fn alarms(&self, ns: &str) -> Result<Vec<RawAlarm>> {
        self.get_data(RESOURCE_PATH, &[("ns", ns), ("type", "alarm")])
            .await
    }

    async fn group(&self, name: &str) -> Result<Group> {
        self.get_data(GROUP_PATH, &[("gname", name)]).await
    }

    async fn users(&self, usernames: &[String]) -> Result<HashMap<String, User>> {
        if usernames.is_empty() {
            return Ok(HashMap::new());
        }
        let joined = usernames.join(",");
        self.get_data(USER_LIST_PATH, &[("usernames", joined.as_str())])
            .await
    }

    async fn machines(&self, ns: &str) -> Result<Vec<MachineRecord>> {
        self.get_data(RESOURCE_PATH, &[("ns", ns), ("type", "machine")])
            .await
    }

    async fn offline_machines(&self) -> Result<HashMap<String, Vec<MachineRecord>>> {
        self.get_data(
            SEARCH_PATH,
            &[
                ("ns", MACHINE_INDEX_NS),
                ("type", "machine"),
                ("k", "status"),
                ("v", "offline"),
            ],
        )
        .await
    }
}
