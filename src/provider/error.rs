use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network failure, 5xx or 429. Retried.
    #[error("transient provider error{}: {message}", status_suffix(.status))]
    Transient {
        message: String,
        status: Option<u16>,
    },

    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    /// Non-retryable provider response, body kept as returned.
    #[error("provider rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("provider call failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<ProviderError>,
    },

    #[error("provider call cancelled")]
    Cancelled,

    #[error("failed to decode provider response: {0}")]
    Decode(String),

    #[error("provider misconfigured: {0}")]
    Configuration(String),

    /// The task's source URL cannot be fetched at all.
    #[error("invalid source url {url}: {reason}")]
    InvalidSource { url: String, reason: String },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {})", s)).unwrap_or_default()
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            status: None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout(_))
    }

    /// Map a non-success HTTP status and body into a provider error.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Self::Transient {
                message: body,
                status: Some(status.as_u16()),
            }
        } else {
            Self::Rejected {
                status: status.as_u16(),
                body,
            }
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        if err.is_builder() {
            return Self::Configuration(err.to_string());
        }
        Self::Transient {
            message: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
        }
    }
}
