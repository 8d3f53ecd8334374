//! Shared data models for the roof recolor service.
//!
//! This crate provides the request-scoped types that flow through a recolor:
//! - Uploaded source images and the final recolored output
//! - Colour specifications and the prompts built from them
//! - Mask references and the mask-selection policy
//! - Pipeline stage tags used for error reporting

pub mod colour;
pub mod error;
pub mod inpaint;
pub mod mask;
pub mod media;
pub mod request;
pub mod stage;

// Re-export common types
pub use colour::ColourSpec;
pub use error::{ValidationError, ValidationResult};
pub use inpaint::{roof_prompt, InpaintParams, NEGATIVE_PROMPT};
pub use mask::{MaskCandidate, MaskReference, MaskSelection};
pub use media::{AllowedExtensions, ImageDimensions, ImageEncoding, RecoloredImage, UploadedImage};
pub use request::{RecolorInput, RecolorRequest};
pub use stage::{PipelineStage, PipelineState};
