//! Roof recolor pipeline.
//!
//! Orchestrates one recolor request end to end:
//! - Input validation before any remote call
//! - Roof segmentation and mask selection
//! - Guided inpainting, with a whole-image fallback when no mask was found
//! - Download of the generated image
//!
//! Every remote failure is classified into a [`PipelineError`] tagged with
//! the stage it happened in.

pub mod config;
pub mod error;
pub mod metrics;
pub mod recolor;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use recolor::RecolorPipeline;
