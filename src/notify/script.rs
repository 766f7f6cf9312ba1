// src/notify/script.rs - Channels delivered by external scripts

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::NotifyConfig;
use crate::error::{AlertGateError, Result};
use crate::models::NotifyData;
use crate::registry::UserDirectory;

use super::{render, Notifier, MAIL, SMS, WECHAT};

/// Interpreter the delivery scripts run under.
const SHELL: &str = "/bin/sh";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    /// `script <mobile> <content> <user>`, once per recipient
    Sms,
    /// `script <user1|user2> <title> <content>`
    Wechat,
    /// `script <addr1,addr2> <subject> <html>`
    Mail,
}

impl ScriptKind {
    pub fn channel(&self) -> &'static str {
        match self {
            ScriptKind::Sms => SMS,
            ScriptKind::Wechat => WECHAT,
            ScriptKind::Mail => MAIL,
        }
    }
}

pub struct ScriptNotifier {
    kind: ScriptKind,
    script: PathBuf,
    timeout: Duration,
    users: Arc<UserDirectory>,
    mail_suffix: String,
    subject_prefix: String,
}

impl ScriptNotifier {
    pub fn new(
        kind: ScriptKind,
        script: impl Into<PathBuf>,
        config: &NotifyConfig,
        users: Arc<UserDirectory>,
    ) -> Self {
        Self {
            kind,
            script: script.into(),
            timeout: Duration::from_secs(config.script_timeout_seconds),
            users,
            mail_suffix: config.mail_suffix.clone(),
            subject_prefix: config.subject_prefix.clone(),
        }
    }

    async fn run(&self, args: &[String]) -> Result<()> {
        let mut command = Command::new(SHELL);
        command.arg(&self.script).args(args).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| AlertGateError::Timeout {
                timeout_seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| AlertGateError::Notify {
                channel: self.kind.channel().to_string(),
                message: format!("spawn {}: {}", self.script.display(), e),
            })?;

        if !output.status.success() {
            return Err(AlertGateError::Notify {
                channel: self.kind.channel().to_string(),
                message: format!(
                    "{} exited with {}: {}",
                    self.script.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        debug!(channel = self.kind.channel(), "Delivery script finished");
        Ok(())
    }

    async fn send_sms(&self, data: &NotifyData) -> Result<()> {
        let content = render::sms_content(data);
        let users = self.users.users(&data.receivers).await?;

        let mut first_error = None;
        for user in users {
            if user.mobile.is_empty() {
                warn!(user = %user.username, "No mobile number, skipping sms");
                continue;
            }
            let args = [user.mobile.clone(), content.clone(), user.username.clone()];
            if let Err(e) = self.run(&args).await {
                warn!(user = %user.username, error = %e, "Sms delivery failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn send_wechat(&self, data: &NotifyData) -> Result<()> {
        if data.receivers.is_empty() {
            warn!(alarm = %data.alarm_name, "No wechat receivers");
            return Ok(());
        }
        let args = [
            data.receivers.join("|"),
            render::wechat_title(data),
            render::wechat_content(data),
        ];
        self.run(&args).await
    }

    async fn send_mail(&self, data: &NotifyData) -> Result<()> {
        let to = data
            .receivers
            .iter()
            .map(|user| format!("{}{}", user, self.mail_suffix))
            .collect::<Vec<_>>()
            .join(",");
        let args = [
            to,
            render::mail_subject(data, &self.subject_prefix),
            render::mail_body(data),
        ];
        self.run(&args).await
    }
}

#[async_trait]
impl Notifier for ScriptNotifier {
    fn channel(&self) -> &str {
        self.kind.channel()
    }

    async fn notify(&self, data: &NotifyData) -> Result<()> {
        match self.kind {
            ScriptKind::Sms => self.send_sms(data).await,
            ScriptKind::Wechat => self.send_wechat(data).await,
            ScriptKind::Mail => self.send_mail(data).await,
        }
    }
}
