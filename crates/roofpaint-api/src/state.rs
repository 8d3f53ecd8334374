//! Application state.

use std::sync::Arc;

use roofpaint_ml_client::{MlResult, ReplicateClient};
use roofpaint_pipeline::{PipelineConfig, RecolorPipeline};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: Arc<RecolorPipeline>,
}

impl AppState {
    /// Create new application state from the environment.
    ///
    /// Fails when the provider token is missing or a model reference is malformed.
    pub fn new(config: ApiConfig) -> MlResult<Self> {
        let client = ReplicateClient::from_env()?;
        let pipeline_config = PipelineConfig::from_env()?;

        Ok(Self::from_parts(
            config,
            RecolorPipeline::new(Arc::new(client), pipeline_config),
        ))
    }

    pub fn from_parts(config: ApiConfig, pipeline: RecolorPipeline) -> Self {
        Self {
            config,
            pipeline: Arc::new(pipeline),
        }
    }
}
