//! Inpainting controls and prompts.

use serde::{Deserialize, Serialize};

use crate::colour::ColourSpec;
use crate::media::ImageDimensions;

/// Suppresses the usual failure modes of the inpainting model.
pub const NEGATIVE_PROMPT: &str = "blurry, oversaturated, distorted, extra objects";

/// Build the positive instruction for repainting the roof.
pub fn roof_prompt(colour: &ColourSpec) -> String {
    format!(
        "Replace only the roof with {}. \
         Keep lighting, perspective, and everything else identical. Ultra-realistic photo.",
        colour
    )
}

/// Numeric controls passed through to the inpainting model unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InpaintParams {
    /// Denoising steps
    pub num_inference_steps: u32,
    /// Higher values follow the prompt more strictly
    pub guidance_scale: f32,
    /// Higher values deviate further from the source image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_strength: Option<f32>,
    /// Output width override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Output height override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl Default for InpaintParams {
    fn default() -> Self {
        Self {
            num_inference_steps: 35,
            guidance_scale: 7.5,
            prompt_strength: Some(0.35),
            width: None,
            height: None,
        }
    }
}

impl InpaintParams {
    /// Resolve output dimensions: explicit overrides win, otherwise the source size.
    pub fn output_size(&self, source: Option<ImageDimensions>) -> (Option<u32>, Option<u32>) {
        (
            self.width.or(source.map(|d| d.width)),
            self.height.or(source.map(|d| d.height)),
        )
    }
}
