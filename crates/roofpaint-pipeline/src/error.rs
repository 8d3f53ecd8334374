//! Classified pipeline errors.

use roofpaint_ml_client::MlError;
use roofpaint_models::{PipelineStage, ValidationError};
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// A recolor failure, tagged with the stage it happened in.
///
/// Messages carry the provider's failure detail but never credentials.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Segmentation failed: {message}")]
    Segmentation { message: String, timed_out: bool },

    #[error("Inpainting failed: {message}")]
    Inpainting { message: String, timed_out: bool },
}

impl PipelineError {
    pub fn segmentation(err: MlError) -> Self {
        Self::Segmentation {
            timed_out: err.is_timeout(),
            message: err.to_string(),
        }
    }

    pub fn inpainting(err: MlError) -> Self {
        Self::Inpainting {
            timed_out: err.is_timeout(),
            message: err.to_string(),
        }
    }

    /// Inpainting produced no output to download.
    pub fn no_output() -> Self {
        Self::Inpainting {
            message: "Prediction returned no output".to_string(),
            timed_out: false,
        }
    }

    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::Validation(_) => PipelineStage::Validation,
            PipelineError::Segmentation { .. } => PipelineStage::Segmentation,
            PipelineError::Inpainting { .. } => PipelineStage::Inpainting,
        }
    }

    /// Offending request field, for validation failures.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            PipelineError::Validation(e) => Some(e.field),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            PipelineError::Segmentation { timed_out, .. }
            | PipelineError::Inpainting { timed_out, .. } => *timed_out,
            PipelineError::Validation(_) => false,
        }
    }

    /// Whether the caller is at fault rather than the provider.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::Validation(_))
    }
}
