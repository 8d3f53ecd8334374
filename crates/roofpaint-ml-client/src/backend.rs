//! Inference backend abstraction used by the recolor pipeline.

use async_trait::async_trait;
use roofpaint_models::UploadedImage;

use crate::client::ReplicateClient;
use crate::error::MlResult;
use crate::types::{Download, InpaintingInput, ModelRef, SegmentationInput};

/// Remote operations the recolor pipeline depends on.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Store the source image with the provider and return a URL for it.
    async fn upload_image(&self, image: &UploadedImage) -> MlResult<String>;

    /// Run the segmentation model; returns zero or more mask URLs.
    async fn segment(&self, model: &ModelRef, input: &SegmentationInput) -> MlResult<Vec<String>>;

    /// Run the inpainting model; returns the generated image URLs.
    async fn inpaint(&self, model: &ModelRef, input: &InpaintingInput) -> MlResult<Vec<String>>;

    /// Encoded size of a remote object, without downloading it.
    async fn probe_size(&self, url: &str) -> MlResult<Option<u64>>;

    /// Fetch a remote object.
    async fn download(&self, url: &str) -> MlResult<Download>;
}

#[async_trait]
impl InferenceBackend for ReplicateClient {
    async fn upload_image(&self, image: &UploadedImage) -> MlResult<String> {
        self.upload_file(image).await
    }

    async fn segment(&self, model: &ModelRef, input: &SegmentationInput) -> MlResult<Vec<String>> {
        self.run(model, input).await
    }

    async fn inpaint(&self, model: &ModelRef, input: &InpaintingInput) -> MlResult<Vec<String>> {
        self.run(model, input).await
    }

    async fn probe_size(&self, url: &str) -> MlResult<Option<u64>> {
        self.content_length(url).await
    }

    async fn download(&self, url: &str) -> MlResult<Download> {
        ReplicateClient::download(self, url).await
    }
}
