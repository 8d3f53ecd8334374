//! ML client error types.

use std::time::Duration;

use thiserror::Error;

pub type MlResult<T> = Result<T, MlError>;

#[derive(Debug, Error)]
pub enum MlError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Request failed with status {status}: {detail}")]
    RequestFailed { status: u16, detail: String },

    #[error("Prediction {status}: {detail}")]
    PredictionFailed { status: String, detail: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MlError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Whether the call ran out of time, either in transport or while polling.
    pub fn is_timeout(&self) -> bool {
        match self {
            MlError::Timeout(_) => true,
            MlError::Network(e) => e.is_timeout(),
            _ => false,
        }
    }
}
