//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use roofpaint_models::PipelineStage;
use roofpaint_pipeline::PipelineError;
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The request body could not be read as a form.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Pipeline(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Pipeline(_) => StatusCode::BAD_GATEWAY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    fn stage(&self) -> PipelineStage {
        match self {
            ApiError::Pipeline(e) => e.stage(),
            ApiError::BadRequest(_) | ApiError::PayloadTooLarge(_) => PipelineStage::Validation,
        }
    }

    fn message(&self, production: bool) -> String {
        match self {
            ApiError::Pipeline(PipelineError::Validation(e)) => e.message.clone(),
            // Provider detail stays in the logs in production
            ApiError::Pipeline(e) if production => match e.stage() {
                PipelineStage::Segmentation => "Segmentation error".to_string(),
                _ => "In-paint error".to_string(),
            },
            ApiError::Pipeline(e) => e.to_string(),
            ApiError::BadRequest(msg) | ApiError::PayloadTooLarge(msg) => msg.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    stage: PipelineStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.message(is_production()),
            stage: self.stage(),
            field: match &self {
                ApiError::Pipeline(e) => e.field(),
                _ => None,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// `ENVIRONMENT=production` hides provider detail from clients.
fn is_production() -> bool {
    std::env::var("ENVIRONMENT")
        .map(|v| v.trim().eq_ignore_ascii_case("production"))
        .unwrap_or(false)
}
