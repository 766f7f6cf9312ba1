// tests/helpers/mod.rs - Common test utilities

pub mod assertions;
pub mod recorder;
pub mod test_data;

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alertgate::metrics::Metrics;
use alertgate::registry::FixtureRegistry;
use alertgate::service::AlertGateService;
use alertgate::status::TracingTransitionLog;
use alertgate::store::MemoryStore;
use alertgate::{Config, NotifyDispatcher};

use recorder::RecordingNotifier;

/// Fully wired service over an in-memory store and a fixture registry, with
/// recording notifiers in place of the delivery scripts.
pub struct TestHarness {
    pub service: AlertGateService,
    pub registry: Arc<FixtureRegistry>,
    pub store: Arc<MemoryStore>,
    pub mail: Arc<RecordingNotifier>,
    pub sms: Arc<RecordingNotifier>,
    pub wechat: Arc<RecordingNotifier>,
}

impl TestHarness {
    /// Harness over the default fixture data, caches already refreshed.
    pub async fn new() -> Self {
        let registry = Arc::new(test_data::default_registry());
        Self::with_registry(registry, Config::default()).await
    }

    pub async fn with_registry(registry: Arc<FixtureRegistry>, config: Config) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(MemoryStore::new());
        let metrics = Arc::new(Metrics::new().expect("metrics registry"));

        let mail = Arc::new(RecordingNotifier::new("mail"));
        let sms = Arc::new(RecordingNotifier::new("sms"));
        let wechat = Arc::new(RecordingNotifier::new("wechat"));
        let mut dispatcher = NotifyDispatcher::new().with_metrics(metrics.clone());
        dispatcher.register(mail.clone());
        dispatcher.register(sms.clone());
        dispatcher.register(wechat.clone());

        let users = AlertGateService::user_directory(&config, registry.clone());
        let service = AlertGateService::from_parts(
            config,
            store.clone(),
            registry.clone(),
            users,
            Arc::new(TracingTransitionLog),
            dispatcher,
            metrics,
        );

        let harness = Self {
            service,
            registry,
            store,
            mail,
            sms,
            wechat,
        };
        harness.refresh().await;
        harness
    }

    /// Pull alarms and machines from the registry into the caches.
    pub async fn refresh(&self) {
        let loops = self.service.loops();
        loops.refresh_alarms_once().await;
        loops.refresh_machines_once().await;
    }

    /// Total notifications recorded across every channel.
    pub fn sent_total(&self) -> usize {
        self.mail.count() + self.sms.count() + self.wechat.count()
    }
}

// Global port counter to avoid conflicts
static PORT_COUNTER: AtomicU16 = AtomicU16::new(18080);

/// Get next available port for testing
pub fn get_next_port() -> u16 {
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Wait for a service to accept connections
pub async fn wait_for_service(addr: &str, timeout_ms: u64) -> bool {
    let timeout = Duration::from_millis(timeout_ms);
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Wait for a condition to be true
pub async fn wait_for_condition<F>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
