// src/error.rs - Error types and HTTP status mapping

use thiserror::Error;
use warp::http::StatusCode;

#[derive(Error, Debug)]
pub enum AlertGateError {
    #[error("Key not found: {key}")]
    KeyNotFound { key: String },

    #[error("Key already exists: {key}")]
    KeyExists { key: String },

    #[error("Not a directory: {key}")]
    NotADirectory { key: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("not have alarm data: ns {ns} version {version}")]
    AlarmNotFound { ns: String, version: String },

    #[error("No receivers resolved for alarm {alarm} in namespace {ns}")]
    EmptyReceivers { ns: String, alarm: String },

    #[error("Unknown notify channel: {0}")]
    UnknownChannel(String),

    #[error("Notification via {channel} failed: {message}")]
    Notify { channel: String, message: String },

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout error: operation timed out after {timeout_seconds} seconds")]
    Timeout { timeout_seconds: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AlertGateError {
    /// True when the error only says the key is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AlertGateError::KeyNotFound { .. })
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AlertGateError::InvalidEvent(_)
            | AlertGateError::InvalidRequest(_)
            | AlertGateError::UnknownChannel(_)
            | AlertGateError::Serialization(_) => StatusCode::BAD_REQUEST,
            AlertGateError::AlarmNotFound { .. } | AlertGateError::KeyNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            AlertGateError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for AlertGateError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AlertGateError::Network(format!("request timed out: {}", err))
        } else {
            AlertGateError::Network(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, AlertGateError>;
