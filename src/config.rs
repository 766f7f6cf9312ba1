// src/config.rs - Service configuration: defaults, TOML file, environment

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub registry: RegistryConfig,
    pub loops: LoopConfig,
    pub notify: NotifyConfig,
    pub transition_log: TransitionLogConfig,
    pub metrics: MetricsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store backend type: "memory", "etcd"
    pub backend: String,
    /// etcd client URLs
    pub endpoints: Vec<String>,
    /// Prefix prepended to every key
    pub root: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Per-request timeout (in seconds)
    pub request_timeout_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            endpoints: Vec::new(),
            root: "/alertgate".to_string(),
            username: None,
            password: None,
            request_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry backend: "http" or "fixture"
    pub backend: String,
    /// Base URL of the registry HTTP API
    pub link: String,
    /// JSON file for the fixture backend
    pub fixture_path: Option<String>,
    pub request_timeout_seconds: u64,
    /// Placeholder account the registry adds to every group
    pub default_user: String,
    /// How long resolved contacts are cached (in seconds)
    pub user_cache_seconds: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: "http".to_string(),
            link: "http://127.0.0.1:8001".to_string(),
            fixture_path: None,
            request_timeout_seconds: 10,
            default_user: "loda-defaultuser".to_string(),
            user_cache_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub alarm_refresh_seconds: u64,
    pub machine_refresh_seconds: u64,
    pub status_rebuild_seconds: u64,
    pub reconcile_seconds: u64,
    /// Poll period of the reconciler's startup barrier (in milliseconds)
    pub startup_poll_millis: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            alarm_refresh_seconds: 120,
            machine_refresh_seconds: 60,
            status_rebuild_seconds: 10,
            reconcile_seconds: 60,
            startup_poll_millis: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub mail_script: Option<String>,
    pub sms_script: Option<String>,
    pub wechat_script: Option<String>,
    /// Appended to usernames to form mail addresses, e.g. "@example.com"
    pub mail_suffix: String,
    pub subject_prefix: String,
    pub script_timeout_seconds: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            mail_script: None,
            sms_script: None,
            wechat_script: None,
            mail_suffix: String::new(),
            subject_prefix: "[alertgate]".to_string(),
            script_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionLogConfig {
    /// When set, transitions are posted here as metric points
    pub endpoint: Option<String>,
    /// Namespace the points are reported under
    pub ns: String,
    pub request_timeout_seconds: u64,
}

impl Default for TransitionLogConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            ns: "alertgate.events".to_string(),
            request_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to expose Prometheus metrics on /metrics
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default tracing filter; RUST_LOG takes precedence
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Detailed validation result with specific error information
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub success: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub error_type: String,
    pub message: String,
    pub suggested_fix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub recommendation: Option<String>,
}

/// Parse `name` into `target` if set, recording parse failures.
fn read_env<T>(name: &str, target: &mut T, parse_errors: &mut Vec<String>)
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(name) {
        match raw.parse() {
            Ok(value) => {
                debug!("Found {}: {}", name, raw);
                *target = value;
            }
            Err(e) => parse_errors.push(format!("Invalid {} '{}': {}", name, raw, e)),
        }
    }
}

fn read_env_opt(name: &str, target: &mut Option<String>) {
    if let Ok(raw) = std::env::var(name) {
        debug!("Found {}", name);
        *target = if raw.is_empty() { None } else { Some(raw) };
    }
}

impl Config {
    /// Load configuration from `ALERTGATE_*` environment variables over defaults
    pub fn from_env() -> Result<Self> {
        let start_time = std::time::Instant::now();
        let mut config = Config::default();
        let mut parse_errors = Vec::new();

        debug!("Loading configuration from environment variables");

        read_env("ALERTGATE_SERVER_HOST", &mut config.server.host, &mut parse_errors);
        read_env("ALERTGATE_SERVER_PORT", &mut config.server.port, &mut parse_errors);

        read_env("ALERTGATE_STORE_BACKEND", &mut config.store.backend, &mut parse_errors);
        read_env("ALERTGATE_STORE_ROOT", &mut config.store.root, &mut parse_errors);
        read_env(
            "ALERTGATE_STORE_TIMEOUT",
            &mut config.store.request_timeout_seconds,
            &mut parse_errors,
        );
        if let Ok(endpoints) = std::env::var("ALERTGATE_STORE_ENDPOINTS") {
            debug!("Found ALERTGATE_STORE_ENDPOINTS: {}", endpoints);
            config.store.endpoints = endpoints
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(String::from)
                .collect();
        }
        read_env_opt("ALERTGATE_STORE_USERNAME", &mut config.store.username);
        read_env_opt("ALERTGATE_STORE_PASSWORD", &mut config.store.password);

        read_env("ALERTGATE_REGISTRY_BACKEND", &mut config.registry.backend, &mut parse_errors);
        read_env("ALERTGATE_REGISTRY_LINK", &mut config.registry.link, &mut parse_errors);
        read_env_opt("ALERTGATE_REGISTRY_FIXTURE", &mut config.registry.fixture_path);
        read_env(
            "ALERTGATE_REGISTRY_TIMEOUT",
            &mut config.registry.request_timeout_seconds,
            &mut parse_errors,
        );

        read_env(
            "ALERTGATE_ALARM_REFRESH_INTERVAL",
            &mut config.loops.alarm_refresh_seconds,
            &mut parse_errors,
        );
        read_env(
            "ALERTGATE_MACHINE_REFRESH_INTERVAL",
            &mut config.loops.machine_refresh_seconds,
            &mut parse_errors,
        );
        read_env(
            "ALERTGATE_STATUS_REBUILD_INTERVAL",
            &mut config.loops.status_rebuild_seconds,
            &mut parse_errors,
        );
        read_env(
            "ALERTGATE_RECONCILE_INTERVAL",
            &mut config.loops.reconcile_seconds,
            &mut parse_errors,
        );

        read_env_opt("ALERTGATE_NOTIFY_MAIL_SCRIPT", &mut config.notify.mail_script);
        read_env_opt("ALERTGATE_NOTIFY_SMS_SCRIPT", &mut config.notify.sms_script);
        read_env_opt("ALERTGATE_NOTIFY_WECHAT_SCRIPT", &mut config.notify.wechat_script);
        read_env("ALERTGATE_NOTIFY_MAIL_SUFFIX", &mut config.notify.mail_suffix, &mut parse_errors);

        read_env_opt(
            "ALERTGATE_TRANSITION_LOG_ENDPOINT",
            &mut config.transition_log.endpoint,
        );

        read_env("ALERTGATE_METRICS_ENABLED", &mut config.metrics.enabled, &mut parse_errors);
        read_env("ALERTGATE_LOG_LEVEL", &mut config.log.level, &mut parse_errors);

        let load_duration = start_time.elapsed();

        if !parse_errors.is_empty() {
            return Err(anyhow::anyhow!(
                "Configuration parsing failed after {:.3}s with {} errors: {}",
                load_duration.as_secs_f64(),
                parse_errors.len(),
                parse_errors.join(", ")
            ));
        }

        info!(
            "Configuration loaded from environment in {:.3}s (store: {}, registry: {})",
            load_duration.as_secs_f64(),
            config.store.backend,
            config.registry.backend
        );

        Ok(config)
    }

    /// Load a TOML file layered over defaults, with `ALERTGATE__SECTION__KEY`
    /// environment overrides on top
    pub fn from_file(path: &Path) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::Config::try_from(&Config::default())?)
            .add_source(::config::File::from(path))
            .add_source(
                ::config::Environment::with_prefix("ALERTGATE")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("store.endpoints")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        info!(
            "Configuration loaded from {} (store: {}, registry: {})",
            path.display(),
            config.store.backend,
            config.registry.backend
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let validation_result = self.validate_detailed();

        if !validation_result.success {
            let error_messages: Vec<String> = validation_result
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();

            return Err(anyhow::anyhow!(
                "Configuration validation failed: {}",
                error_messages.join(", ")
            ));
        }

        for warning in &validation_result.warnings {
            warn!(
                "Configuration warning for {}: {}{}",
                warning.field,
                warning.message,
                warning
                    .recommendation
                    .as_ref()
                    .map(|r| format!(" (Recommendation: {})", r))
                    .unwrap_or_default()
            );
        }

        Ok(())
    }

    pub fn validate_detailed(&self) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        match self.store.backend.as_str() {
            "memory" => {
                warnings.push(ValidationWarning {
                    field: "store.backend".to_string(),
                    message: "Memory store is not shared between instances".to_string(),
                    recommendation: Some("Use 'etcd' when running more than one instance".to_string()),
                });
            }
            "etcd" => {
                if self.store.endpoints.is_empty() {
                    errors.push(ValidationError {
                        field: "store.endpoints".to_string(),
                        error_type: "missing_config".to_string(),
                        message: "etcd backend requires at least one endpoint".to_string(),
                        suggested_fix: Some(
                            "Set ALERTGATE_STORE_ENDPOINTS=http://127.0.0.1:2379".to_string(),
                        ),
                    });
                }
                if self.store.username.is_some() != self.store.password.is_some() {
                    warnings.push(ValidationWarning {
                        field: "store.username".to_string(),
                        message: "Only one of username/password is set; auth is disabled".to_string(),
                        recommendation: Some("Set both or neither".to_string()),
                    });
                }
            }
            backend => {
                errors.push(ValidationError {
                    field: "store.backend".to_string(),
                    error_type: "unsupported_backend".to_string(),
                    message: format!("Unsupported store backend: {}", backend),
                    suggested_fix: Some("Use 'memory' or 'etcd'".to_string()),
                });
            }
        }

        if self.store.root.trim_matches('/').is_empty() {
            errors.push(ValidationError {
                field: "store.root".to_string(),
                error_type: "empty_path".to_string(),
                message: "Store root prefix cannot be empty".to_string(),
                suggested_fix: Some("Use a dedicated prefix such as /alertgate".to_string()),
            });
        }

        if self.store.request_timeout_seconds == 0 {
            errors.push(ValidationError {
                field: "store.request_timeout_seconds".to_string(),
                error_type: "invalid_range".to_string(),
                message: "Store request timeout must be positive".to_string(),
                suggested_fix: Some("Use a few seconds, e.g. 5".to_string()),
            });
        }

        match self.registry.backend.as_str() {
            "http" => {
                if url::Url::parse(&self.registry.link).is_err() {
                    errors.push(ValidationError {
                        field: "registry.link".to_string(),
                        error_type: "invalid_url".to_string(),
                        message: format!("Registry link is not a URL: {}", self.registry.link),
                        suggested_fix: Some("Use a full URL like http://registry:8001".to_string()),
                    });
                }
            }
            "fixture" => {
                if self.registry.fixture_path.is_none() {
                    errors.push(ValidationError {
                        field: "registry.fixture_path".to_string(),
                        error_type: "missing_config".to_string(),
                        message: "Fixture registry requires a JSON file".to_string(),
                        suggested_fix: Some("Set ALERTGATE_REGISTRY_FIXTURE".to_string()),
                    });
                }
            }
            backend => {
                errors.push(ValidationError {
                    field: "registry.backend".to_string(),
                    error_type: "unsupported_backend".to_string(),
                    message: format!("Unsupported registry backend: {}", backend),
                    suggested_fix: Some("Use 'http' or 'fixture'".to_string()),
                });
            }
        }

        let intervals = [
            ("loops.alarm_refresh_seconds", self.loops.alarm_refresh_seconds),
            ("loops.machine_refresh_seconds", self.loops.machine_refresh_seconds),
            ("loops.status_rebuild_seconds", self.loops.status_rebuild_seconds),
            ("loops.reconcile_seconds", self.loops.reconcile_seconds),
            ("loops.startup_poll_millis", self.loops.startup_poll_millis),
        ];
        for (field, value) in intervals {
            if value == 0 {
                errors.push(ValidationError {
                    field: field.to_string(),
                    error_type: "invalid_range".to_string(),
                    message: "Loop interval must be positive".to_string(),
                    suggested_fix: None,
                });
            }
        }

        if self.loops.alarm_refresh_seconds > 0
            && !(60..=120).contains(&self.loops.alarm_refresh_seconds)
        {
            warnings.push(ValidationWarning {
                field: "loops.alarm_refresh_seconds".to_string(),
                message: "Alarm refresh interval outside the usual 1-2 minute range".to_string(),
                recommendation: Some("Use a value between 60 and 120".to_string()),
            });
        }

        let scripts = [
            ("notify.mail_script", &self.notify.mail_script),
            ("notify.sms_script", &self.notify.sms_script),
            ("notify.wechat_script", &self.notify.wechat_script),
        ];
        if scripts.iter().all(|(_, script)| script.is_none()) {
            warnings.push(ValidationWarning {
                field: "notify".to_string(),
                message: "No notification channel is configured".to_string(),
                recommendation: Some("Set at least one of mail/sms/wechat scripts".to_string()),
            });
        }

        if self.server.port < 1024 {
            warnings.push(ValidationWarning {
                field: "server.port".to_string(),
                message: format!("Port {} is a privileged port", self.server.port),
                recommendation: Some("Consider using a port >= 1024 for non-root execution".to_string()),
            });
        }

        ValidationResult {
            success: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn summary(&self) -> ConfigSummary {
        let mut channels = Vec::new();
        if self.notify.mail_script.is_some() {
            channels.push("mail".to_string());
        }
        if self.notify.sms_script.is_some() {
            channels.push("sms".to_string());
        }
        if self.notify.wechat_script.is_some() {
            channels.push("wechat".to_string());
        }

        ConfigSummary {
            server_endpoint: format!("{}:{}", self.server.host, self.server.port),
            store_backend: self.store.backend.clone(),
            store_root: self.store.root.clone(),
            registry_backend: self.registry.backend.clone(),
            notify_channels: channels,
            status_rebuild_interval: self.loops.status_rebuild_seconds,
            reconcile_interval: self.loops.reconcile_seconds,
            metrics_enabled: self.metrics.enabled,
        }
    }

    pub fn alarm_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.loops.alarm_refresh_seconds)
    }

    pub fn machine_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.loops.machine_refresh_seconds)
    }

    pub fn status_rebuild_interval(&self) -> Duration {
        Duration::from_secs(self.loops.status_rebuild_seconds)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.loops.reconcile_seconds)
    }

    pub fn startup_poll_interval(&self) -> Duration {
        Duration::from_millis(self.loops.startup_poll_millis)
    }

    pub fn user_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.registry.user_cache_seconds)
    }
}

/// Configuration summary for startup logging
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub server_endpoint: String,
    pub store_backend: String,
    pub store_root: String,
    pub registry_backend: String,
    pub notify_channels: Vec<String>,
    pub status_rebuild_interval: u64,
    pub reconcile_interval: u64,
    pub metrics_enabled: bool,
}
