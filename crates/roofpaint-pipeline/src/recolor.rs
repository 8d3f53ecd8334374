//! Recolor orchestrator.
//!
//! Validates the request, segments the roof, selects one mask, inpaints the
//! masked region (or the whole image when no mask was found) and downloads
//! the result. Remote calls run strictly one after another; dropping the
//! returned future abandons the in-flight call.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use roofpaint_ml_client::{InferenceBackend, InpaintingInput, SegmentationInput};
use roofpaint_models::{
    roof_prompt, ImageEncoding, MaskCandidate, MaskReference, PipelineState, RecolorInput,
    RecolorRequest, RecoloredImage, UploadedImage, NEGATIVE_PROMPT,
};
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::metrics;

/// Two-stage segmentation + inpainting pipeline.
///
/// Holds only immutable configuration and a shared backend, so one instance
/// serves all requests.
#[derive(Clone)]
pub struct RecolorPipeline {
    backend: Arc<dyn InferenceBackend>,
    config: PipelineConfig,
}

impl RecolorPipeline {
    pub fn new(backend: Arc<dyn InferenceBackend>, config: PipelineConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Recolor the roof in an uploaded photograph.
    pub async fn recolor(&self, input: RecolorInput) -> PipelineResult<RecoloredImage> {
        let result = self.run(input).await;

        match &result {
            Ok(image) => {
                metrics::record_outcome("success");
                info!(bytes = image.bytes.len(), content_type = %image.content_type, "Recolor completed");
            }
            Err(e) => {
                metrics::record_outcome(e.stage().as_str());
                enter(PipelineState::Failed(e.stage()));
                if e.is_client_error() {
                    warn!(stage = %e.stage(), error = %e, "Recolor rejected");
                } else {
                    error!(stage = %e.stage(), timed_out = e.is_timeout(), error = %e, "Recolor failed");
                }
            }
        }

        result
    }

    async fn run(&self, input: RecolorInput) -> PipelineResult<RecoloredImage> {
        enter(PipelineState::Validating);
        let request = input.validate(&self.config.allowed_extensions)?;

        enter(PipelineState::SegmentingRoof);
        let image_ref = self.prepare_image(&request.image).await?;
        let mask = self.segment(&image_ref).await?;

        match &mask {
            Some(mask) => {
                enter(PipelineState::MaskFound);
                debug!(mask = %mask, "Roof mask selected");
            }
            None => {
                enter(PipelineState::NoMaskFallback);
                metrics::record_no_mask_fallback();
                warn!("No roof mask found, recolouring the whole image");
            }
        }

        enter(PipelineState::Inpainting);
        let output_url = self.inpaint(&request, image_ref, mask).await?;

        enter(PipelineState::Downloading);
        let download = timed("download", self.backend.download(&output_url))
            .await
            .map_err(PipelineError::inpainting)?;

        enter(PipelineState::Done);
        Ok(RecoloredImage::new(download.bytes, download.content_type.as_deref()))
    }

    /// Build the image reference sent to both stages. Computed once per request.
    async fn prepare_image(&self, image: &UploadedImage) -> PipelineResult<String> {
        match self.config.image_encoding {
            ImageEncoding::DataUri => Ok(image.to_data_uri()),
            ImageEncoding::Upload => {
                let url = timed("upload", self.backend.upload_image(image))
                    .await
                    .map_err(PipelineError::segmentation)?;
                debug!(url = %url, "Source image uploaded");
                Ok(url)
            }
        }
    }

    async fn segment(&self, image_ref: &str) -> PipelineResult<Option<MaskReference>> {
        let input = SegmentationInput {
            image: image_ref.to_string(),
            mask_prompt: self.config.mask_prompt.clone(),
            negative_mask_prompt: self.config.negative_mask_prompt.clone(),
            adjustment_factor: self.config.adjustment_factor,
        };

        let masks = timed(
            "segmentation",
            self.backend.segment(&self.config.segmentation_model, &input),
        )
        .await
        .map_err(PipelineError::segmentation)?;

        debug!(count = masks.len(), model = %self.config.segmentation_model, "Segmentation returned masks");
        Ok(self.select_mask(masks).await)
    }

    /// Apply the mask-selection policy. Probe failures degrade to an unknown size.
    async fn select_mask(&self, masks: Vec<String>) -> Option<MaskReference> {
        let policy = self.config.mask_selection;

        let mut candidates = Vec::with_capacity(masks.len());
        for url in masks {
            let encoded_size = if policy.needs_probe() {
                self.probe(&url).await
            } else {
                None
            };
            candidates.push(MaskCandidate {
                reference: MaskReference::new(url),
                encoded_size,
            });
        }

        policy.choose(candidates)
    }

    async fn probe(&self, url: &str) -> Option<u64> {
        match timed("mask_probe", self.backend.probe_size(url)).await {
            Ok(size) => {
                debug!(url, size = ?size, "Probed mask size");
                size
            }
            Err(e) => {
                metrics::record_mask_probe_failure();
                warn!(url, error = %e, "Mask probe failed, treating size as unknown");
                None
            }
        }
    }

    async fn inpaint(
        &self,
        request: &RecolorRequest,
        image_ref: String,
        mask: Option<MaskReference>,
    ) -> PipelineResult<String> {
        let params = &self.config.inpaint;
        let (width, height) = params.output_size(request.image.dimensions());

        let input = InpaintingInput {
            prompt: roof_prompt(&request.colour),
            negative_prompt: Some(NEGATIVE_PROMPT.to_string()),
            image: image_ref,
            mask: mask.map(|m| m.as_str().to_string()),
            prompt_strength: params.prompt_strength,
            num_inference_steps: params.num_inference_steps,
            guidance_scale: params.guidance_scale,
            width,
            height,
        };

        let outputs = timed(
            "inpainting",
            self.backend.inpaint(&self.config.inpainting_model, &input),
        )
        .await
        .map_err(PipelineError::inpainting)?;

        outputs.into_iter().next().ok_or_else(PipelineError::no_output)
    }
}

fn enter(state: PipelineState) {
    debug!(state = %state, "Pipeline state");
}

async fn timed<F: Future>(stage: &'static str, fut: F) -> F::Output {
    let start = Instant::now();
    let output = fut.await;
    metrics::record_stage_duration(stage, start.elapsed().as_secs_f64());
    output
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use image::{DynamicImage, ImageOutputFormat, RgbImage};
    use roofpaint_ml_client::{Download, MlError, MlResult, ModelRef};
    use roofpaint_models::{MaskSelection, PipelineStage};

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Upload(Bytes),
        Segment(SegmentationInput),
        Probe(String),
        Inpaint(InpaintingInput),
        Download(String),
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Fault {
        Upload,
        Segment,
        SegmentTimeout,
        Inpaint,
        Download,
    }

    /// In-memory backend that records every call.
    #[derive(Default)]
    struct FakeBackend {
        masks: Vec<String>,
        /// Probe results by URL; missing entries fail the probe
        sizes: HashMap<String, u64>,
        outputs: Vec<String>,
        fault: Option<Fault>,
        calls: Mutex<Vec<Call>>,
    }

    impl FakeBackend {
        fn with_masks(masks: &[&str]) -> Self {
            Self {
                masks: masks.iter().map(|m| m.to_string()).collect(),
                outputs: vec!["https://cdn.example.com/out.png".to_string()],
                ..Default::default()
            }
        }

        fn sizes(mut self, sizes: &[(&str, u64)]) -> Self {
            self.sizes = sizes.iter().map(|(u, s)| (u.to_string(), *s)).collect();
            self
        }

        fn fault(mut self, fault: Fault) -> Self {
            self.fault = Some(fault);
            self
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn fails(&self, fault: Fault) -> bool {
            self.fault == Some(fault)
        }
    }

    #[async_trait]
    impl InferenceBackend for FakeBackend {
        async fn upload_image(&self, image: &UploadedImage) -> MlResult<String> {
            self.record(Call::Upload(image.bytes().clone()));
            if self.fails(Fault::Upload) {
                return Err(MlError::RequestFailed {
                    status: 413,
                    detail: "file too large".to_string(),
                });
            }
            Ok("https://files.example.com/source".to_string())
        }

        async fn segment(&self, _model: &ModelRef, input: &SegmentationInput) -> MlResult<Vec<String>> {
            self.record(Call::Segment(input.clone()));
            if self.fails(Fault::Segment) {
                return Err(MlError::PredictionFailed {
                    status: "failed".to_string(),
                    detail: "model crashed".to_string(),
                });
            }
            if self.fails(Fault::SegmentTimeout) {
                return Err(MlError::Timeout(Duration::from_secs(60)));
            }
            Ok(self.masks.clone())
        }

        async fn inpaint(&self, _model: &ModelRef, input: &InpaintingInput) -> MlResult<Vec<String>> {
            self.record(Call::Inpaint(input.clone()));
            if self.fails(Fault::Inpaint) {
                return Err(MlError::RequestFailed {
                    status: 500,
                    detail: "internal error".to_string(),
                });
            }
            Ok(self.outputs.clone())
        }

        async fn probe_size(&self, url: &str) -> MlResult<Option<u64>> {
            self.record(Call::Probe(url.to_string()));
            self.sizes
                .get(url)
                .map(|s| Some(*s))
                .ok_or_else(|| MlError::RequestFailed {
                    status: 404,
                    detail: "not found".to_string(),
                })
        }

        async fn download(&self, url: &str) -> MlResult<Download> {
            self.record(Call::Download(url.to_string()));
            if self.fails(Fault::Download) {
                return Err(MlError::RequestFailed {
                    status: 403,
                    detail: "expired".to_string(),
                });
            }
            Ok(Download {
                bytes: Bytes::from_static(b"recolored-png"),
                content_type: Some("image/png".to_string()),
            })
        }
    }

    fn encoded(width: u32, height: u32, format: ImageOutputFormat) -> Vec<u8> {
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut Cursor::new(&mut out), format)
            .unwrap();
        out
    }

    fn pipeline(backend: &Arc<FakeBackend>, config: PipelineConfig) -> RecolorPipeline {
        RecolorPipeline::new(backend.clone(), config)
    }

    fn segment_inputs(calls: &[Call]) -> Vec<&SegmentationInput> {
        calls
            .iter()
            .filter_map(|c| match c {
                Call::Segment(input) => Some(input),
                _ => None,
            })
            .collect()
    }

    fn inpaint_inputs(calls: &[Call]) -> Vec<&InpaintingInput> {
        calls
            .iter()
            .filter_map(|c| match c {
                Call::Inpaint(input) => Some(input),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_single_mask_recolor() {
        let backend = Arc::new(FakeBackend::with_masks(&["https://cdn.example.com/m1.png"]));
        let jpeg = encoded(64, 48, ImageOutputFormat::Jpeg(80));
        let source = UploadedImage::new(jpeg.clone(), "house.jpg");

        let result = pipeline(&backend, PipelineConfig::default())
            .recolor(RecolorInput::new(jpeg, "house.jpg", "forest green"))
            .await
            .unwrap();

        assert_eq!(result.bytes.as_ref(), b"recolored-png");
        assert_eq!(result.content_type, "image/png");

        let calls = backend.calls();
        // A single mask needs no probe under the largest policy
        assert!(!calls.iter().any(|c| matches!(c, Call::Probe(_))));

        let inpaint = inpaint_inputs(&calls)[0];
        assert_eq!(inpaint.mask.as_deref(), Some("https://cdn.example.com/m1.png"));
        assert!(inpaint.prompt.contains("forest green"));
        assert_eq!(inpaint.negative_prompt.as_deref(), Some(NEGATIVE_PROMPT));
        assert_eq!(inpaint.image, source.to_data_uri());
        assert_eq!(inpaint.num_inference_steps, 35);
        assert_eq!(inpaint.guidance_scale, 7.5);
        assert_eq!(inpaint.prompt_strength, Some(0.35));
        assert_eq!((inpaint.width, inpaint.height), (Some(64), Some(48)));

        assert_eq!(
            calls.last(),
            Some(&Call::Download("https://cdn.example.com/out.png".to_string()))
        );
    }

    #[tokio::test]
    async fn test_no_mask_falls_back_to_whole_image() {
        let backend = Arc::new(FakeBackend::with_masks(&[]));
        let png = encoded(8, 8, ImageOutputFormat::Png);

        let result = pipeline(&backend, PipelineConfig::default())
            .recolor(RecolorInput::new(png, "house.png", "red"))
            .await;
        assert!(result.is_ok());

        let calls = backend.calls();
        let inpaint = inpaint_inputs(&calls);
        assert_eq!(inpaint.len(), 1);
        assert_eq!(inpaint[0].mask, None);
        assert!(inpaint[0].prompt.contains("red"));
    }

    #[tokio::test]
    async fn test_rejected_extension_makes_no_remote_call() {
        let backend = Arc::new(FakeBackend::with_masks(&["https://cdn.example.com/m1.png"]));

        let err = pipeline(&backend, PipelineConfig::default())
            .recolor(RecolorInput::new(b"%PDF-1.7".to_vec(), "document.pdf", "blue"))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), PipelineStage::Validation);
        assert_eq!(err.field(), Some("image"));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_validation_failures_make_no_remote_call() {
        let backend = Arc::new(FakeBackend::with_masks(&[]));
        let pipeline = pipeline(&backend, PipelineConfig::default());

        let cases = vec![
            (RecolorInput::default(), "image"),
            (RecolorInput::new(Vec::new(), "house.png", "red"), "image"),
            (RecolorInput::new(b"x".to_vec(), "", "red"), "image"),
            (RecolorInput::new(b"x".to_vec(), "house.png", "   "), "color"),
            (
                RecolorInput {
                    colour: None,
                    ..RecolorInput::new(b"x".to_vec(), "house.png", "red")
                },
                "color",
            ),
        ];

        for (input, field) in cases {
            let err = pipeline.recolor(input).await.unwrap_err();
            assert_eq!(err.field(), Some(field));
        }
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_extension_check_is_case_insensitive() {
        let backend = Arc::new(FakeBackend::with_masks(&[]));
        let png = encoded(8, 8, ImageOutputFormat::Png);

        let result = pipeline(&backend, PipelineConfig::default())
            .recolor(RecolorInput::new(png, "HOUSE.PNG", "red"))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_both_stages_receive_identical_image() {
        let backend = Arc::new(FakeBackend::with_masks(&["https://cdn.example.com/m1.png"]));
        let png = encoded(16, 16, ImageOutputFormat::Png);

        pipeline(&backend, PipelineConfig::default())
            .recolor(RecolorInput::new(png, "house.png", "slate grey"))
            .await
            .unwrap();

        let calls = backend.calls();
        assert_eq!(segment_inputs(&calls)[0].image, inpaint_inputs(&calls)[0].image);
    }

    #[tokio::test]
    async fn test_upload_encoding_uploads_once() {
        let backend = Arc::new(FakeBackend::with_masks(&["https://cdn.example.com/m1.png"]));
        let png = encoded(16, 16, ImageOutputFormat::Png);
        let config = PipelineConfig {
            image_encoding: ImageEncoding::Upload,
            ..Default::default()
        };

        pipeline(&backend, config)
            .recolor(RecolorInput::new(png.clone(), "house.png", "red"))
            .await
            .unwrap();

        let calls = backend.calls();
        assert_eq!(calls[0], Call::Upload(Bytes::from(png)));
        assert_eq!(calls.iter().filter(|c| matches!(c, Call::Upload(_))).count(), 1);
        assert_eq!(segment_inputs(&calls)[0].image, "https://files.example.com/source");
        assert_eq!(inpaint_inputs(&calls)[0].image, "https://files.example.com/source");
    }

    #[tokio::test]
    async fn test_upload_failure_is_segmentation_error() {
        let backend = Arc::new(FakeBackend::with_masks(&[]).fault(Fault::Upload));
        let config = PipelineConfig {
            image_encoding: ImageEncoding::Upload,
            ..Default::default()
        };

        let err = pipeline(&backend, config)
            .recolor(RecolorInput::new(b"x".to_vec(), "house.png", "red"))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), PipelineStage::Segmentation);
        assert!(segment_inputs(&backend.calls()).is_empty());
    }

    #[tokio::test]
    async fn test_segmentation_input_from_config() {
        let backend = Arc::new(FakeBackend::with_masks(&[]));
        let png = encoded(8, 8, ImageOutputFormat::Png);

        pipeline(&backend, PipelineConfig::default())
            .recolor(RecolorInput::new(png, "house.png", "red"))
            .await
            .unwrap();

        let calls = backend.calls();
        let input = segment_inputs(&calls)[0];
        assert_eq!(input.mask_prompt, "roof");
        assert_eq!(input.negative_mask_prompt.as_deref(), Some("sky"));
        assert_eq!(input.adjustment_factor, Some(-10));
    }

    #[tokio::test]
    async fn test_largest_mask_selected() {
        let backend = Arc::new(
            FakeBackend::with_masks(&["https://m/a", "https://m/b", "https://m/c"]).sizes(&[
                ("https://m/a", 100),
                ("https://m/b", 900),
                ("https://m/c", 400),
            ]),
        );
        let png = encoded(8, 8, ImageOutputFormat::Png);

        pipeline(&backend, PipelineConfig::default())
            .recolor(RecolorInput::new(png, "house.png", "red"))
            .await
            .unwrap();

        let calls = backend.calls();
        assert_eq!(inpaint_inputs(&calls)[0].mask.as_deref(), Some("https://m/b"));
        assert_eq!(calls.iter().filter(|c| matches!(c, Call::Probe(_))).count(), 3);
    }

    #[tokio::test]
    async fn test_largest_mask_ties_and_probe_failures() {
        // b ties with a, c fails its probe
        let backend = Arc::new(
            FakeBackend::with_masks(&["https://m/a", "https://m/b", "https://m/c"])
                .sizes(&[("https://m/a", 500), ("https://m/b", 500)]),
        );
        let png = encoded(8, 8, ImageOutputFormat::Png);

        let result = pipeline(&backend, PipelineConfig::default())
            .recolor(RecolorInput::new(png, "house.png", "red"))
            .await;
        assert!(result.is_ok());

        let calls = backend.calls();
        assert_eq!(inpaint_inputs(&calls)[0].mask.as_deref(), Some("https://m/a"));
    }

    #[tokio::test]
    async fn test_first_mask_policy_skips_probes() {
        let backend = Arc::new(
            FakeBackend::with_masks(&["https://m/a", "https://m/b"])
                .sizes(&[("https://m/a", 1), ("https://m/b", 1000)]),
        );
        let png = encoded(8, 8, ImageOutputFormat::Png);
        let config = PipelineConfig {
            mask_selection: MaskSelection::First,
            ..Default::default()
        };

        pipeline(&backend, config)
            .recolor(RecolorInput::new(png, "house.png", "red"))
            .await
            .unwrap();

        let calls = backend.calls();
        assert!(!calls.iter().any(|c| matches!(c, Call::Probe(_))));
        assert_eq!(inpaint_inputs(&calls)[0].mask.as_deref(), Some("https://m/a"));
    }

    #[tokio::test]
    async fn test_segmentation_failure_aborts() {
        let backend = Arc::new(FakeBackend::with_masks(&[]).fault(Fault::Segment));
        let png = encoded(8, 8, ImageOutputFormat::Png);

        let err = pipeline(&backend, PipelineConfig::default())
            .recolor(RecolorInput::new(png, "house.png", "red"))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), PipelineStage::Segmentation);
        assert!(!err.is_timeout());
        assert!(err.to_string().contains("model crashed"));
        assert!(inpaint_inputs(&backend.calls()).is_empty());
    }

    #[tokio::test]
    async fn test_segmentation_timeout() {
        let backend = Arc::new(FakeBackend::with_masks(&[]).fault(Fault::SegmentTimeout));
        let png = encoded(8, 8, ImageOutputFormat::Png);

        let err = pipeline(&backend, PipelineConfig::default())
            .recolor(RecolorInput::new(png, "house.png", "red"))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), PipelineStage::Segmentation);
        assert!(err.is_timeout());
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_inpainting_failure_skips_download() {
        let backend = Arc::new(FakeBackend::with_masks(&[]).fault(Fault::Inpaint));
        let png = encoded(8, 8, ImageOutputFormat::Png);

        let err = pipeline(&backend, PipelineConfig::default())
            .recolor(RecolorInput::new(png, "house.png", "red"))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), PipelineStage::Inpainting);
        assert!(!backend.calls().iter().any(|c| matches!(c, Call::Download(_))));
    }

    #[tokio::test]
    async fn test_empty_inpainting_output() {
        let backend = Arc::new(FakeBackend {
            outputs: Vec::new(),
            ..FakeBackend::with_masks(&[])
        });
        let png = encoded(8, 8, ImageOutputFormat::Png);

        let err = pipeline(&backend, PipelineConfig::default())
            .recolor(RecolorInput::new(png, "house.png", "red"))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), PipelineStage::Inpainting);
        assert!(!backend.calls().iter().any(|c| matches!(c, Call::Download(_))));
    }

    #[tokio::test]
    async fn test_download_failure_is_inpainting_error() {
        let backend = Arc::new(FakeBackend::with_masks(&[]).fault(Fault::Download));
        let png = encoded(8, 8, ImageOutputFormat::Png);

        let err = pipeline(&backend, PipelineConfig::default())
            .recolor(RecolorInput::new(png, "house.png", "red"))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), PipelineStage::Inpainting);
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn test_output_size_override_and_unreadable_header() {
        let backend = Arc::new(FakeBackend::with_masks(&[]));
        let mut config = PipelineConfig::default();
        config.inpaint.width = Some(1024);

        // Not a decodable image: only the override survives
        pipeline(&backend, config)
            .recolor(RecolorInput::new(b"not an image".to_vec(), "house.png", "red"))
            .await
            .unwrap();

        let calls = backend.calls();
        let inpaint = inpaint_inputs(&calls)[0];
        assert_eq!(inpaint.width, Some(1024));
        assert_eq!(inpaint.height, None);
    }
}
