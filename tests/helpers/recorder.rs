// tests/helpers/recorder.rs - Notifier that records deliveries instead of sending them

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use alertgate::error::{AlertGateError, Result};
use alertgate::models::NotifyData;
use alertgate::notify::Notifier;

pub struct RecordingNotifier {
    channel: String,
    sent: Mutex<Vec<NotifyData>>,
    should_fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            sent: Mutex::new(Vec::new()),
            should_fail: AtomicBool::new(false),
        }
    }

    pub fn sent(&self) -> Vec<NotifyData> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn notify(&self, data: &NotifyData) -> Result<()> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(AlertGateError::Notify {
                channel: self.channel.clone(),
                message: "injected failure".to_string(),
            });
        }
        self.sent.lock().unwrap().push(data.clone());
        Ok(())
    }
}
