use livechat_api::RecordError;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("protocol violation: {0}")]
    Protocol(#[from] RecordError),
}

impl ApiError {
    /// True when the request never reached the server, so resending a
    /// non-idempotent call cannot duplicate it.
    pub fn was_not_sent(&self) -> bool {
        match self {
            Self::Network(e) => e.is_connect(),
            _ => false,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Network(e) => e.status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
