//! Pipeline configuration.

use std::str::FromStr;

use roofpaint_ml_client::{MlResult, ModelRef};
use roofpaint_models::{AllowedExtensions, ImageEncoding, InpaintParams, MaskSelection};
use tracing::warn;

pub const DEFAULT_SEGMENTATION_MODEL: &str = "schananas/grounded_sam";
pub const DEFAULT_INPAINTING_MODEL: &str = "lucataco/sdxl-inpainting";
pub const DEFAULT_MASK_PROMPT: &str = "roof";
pub const DEFAULT_NEGATIVE_MASK_PROMPT: &str = "sky";
pub const DEFAULT_ADJUSTMENT_FACTOR: i32 = -10;

/// Configuration of the two-stage recolor pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Model producing roof masks
    pub segmentation_model: ModelRef,
    /// Model repainting the masked region
    pub inpainting_model: ModelRef,
    /// What the segmentation model should find
    pub mask_prompt: String,
    /// What the segmentation model should exclude
    pub negative_mask_prompt: Option<String>,
    /// Grows (positive) or shrinks (negative) the mask, in pixels
    pub adjustment_factor: Option<i32>,
    pub mask_selection: MaskSelection,
    pub image_encoding: ImageEncoding,
    pub inpaint: InpaintParams,
    pub allowed_extensions: AllowedExtensions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            segmentation_model: ModelRef {
                owner: "schananas".to_string(),
                name: "grounded_sam".to_string(),
                version: None,
            },
            inpainting_model: ModelRef {
                owner: "lucataco".to_string(),
                name: "sdxl-inpainting".to_string(),
                version: None,
            },
            mask_prompt: DEFAULT_MASK_PROMPT.to_string(),
            negative_mask_prompt: Some(DEFAULT_NEGATIVE_MASK_PROMPT.to_string()),
            adjustment_factor: Some(DEFAULT_ADJUSTMENT_FACTOR),
            mask_selection: MaskSelection::default(),
            image_encoding: ImageEncoding::default(),
            inpaint: InpaintParams::default(),
            allowed_extensions: AllowedExtensions::default(),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    ///
    /// Malformed numbers fall back to their defaults; malformed model
    /// references are rejected.
    pub fn from_env() -> MlResult<Self> {
        let defaults = Self::default();

        let segmentation_model = ModelRef::parse(
            &std::env::var("SEGMENTATION_MODEL")
                .unwrap_or_else(|_| DEFAULT_SEGMENTATION_MODEL.to_string()),
        )?;
        let inpainting_model = ModelRef::parse(
            &std::env::var("INPAINTING_MODEL")
                .unwrap_or_else(|_| DEFAULT_INPAINTING_MODEL.to_string()),
        )?;

        let mask_prompt = std::env::var("MASK_PROMPT")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.mask_prompt);

        // Set but blank disables the optional inputs
        let negative_mask_prompt = match std::env::var("NEGATIVE_MASK_PROMPT") {
            Ok(s) if s.trim().is_empty() => None,
            Ok(s) => Some(s),
            Err(_) => defaults.negative_mask_prompt,
        };
        let adjustment_factor = match std::env::var("MASK_ADJUSTMENT_FACTOR") {
            Ok(s) if s.trim().is_empty() => None,
            Ok(s) => Some(s.trim().parse().unwrap_or(DEFAULT_ADJUSTMENT_FACTOR)),
            Err(_) => defaults.adjustment_factor,
        };
        let prompt_strength = match std::env::var("PROMPT_STRENGTH") {
            Ok(s) if s.trim().is_empty() => None,
            Ok(s) => s.trim().parse().ok().or(defaults.inpaint.prompt_strength),
            Err(_) => defaults.inpaint.prompt_strength,
        };

        let inpaint = InpaintParams {
            num_inference_steps: env_parse("INFERENCE_STEPS")
                .unwrap_or(defaults.inpaint.num_inference_steps),
            guidance_scale: env_parse("GUIDANCE_SCALE").unwrap_or(defaults.inpaint.guidance_scale),
            prompt_strength,
            width: env_parse("OUTPUT_WIDTH"),
            height: env_parse("OUTPUT_HEIGHT"),
        };

        let allowed_extensions = std::env::var("ALLOWED_EXTENSIONS")
            .ok()
            .map(|s| AllowedExtensions::from_list(&s))
            .unwrap_or(defaults.allowed_extensions);

        Ok(Self {
            segmentation_model,
            inpainting_model,
            mask_prompt,
            negative_mask_prompt,
            adjustment_factor,
            mask_selection: env_enum("MASK_SELECTION", defaults.mask_selection),
            image_encoding: env_enum("IMAGE_ENCODING", defaults.image_encoding),
            inpaint,
            allowed_extensions,
        })
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_enum<T>(key: &str, default: T) -> T
where
    T: FromStr<Err = String> + Copy,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e: String| {
            warn!(variable = key, error = %e, "Invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}
