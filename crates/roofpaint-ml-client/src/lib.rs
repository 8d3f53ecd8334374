//! Client for the hosted segmentation and inpainting models.
//!
//! This crate talks to a Replicate-compatible prediction API: it creates
//! predictions, polls them to completion within a deadline, uploads source
//! images, probes mask sizes and downloads results. The `InferenceBackend`
//! trait is the seam the recolor pipeline is written against.

pub mod backend;
pub mod client;
pub mod error;
pub mod types;

pub use backend::InferenceBackend;
pub use client::{ProviderConfig, ReplicateClient, DEFAULT_API_BASE};
pub use error::{MlError, MlResult};
pub use types::{Download, InpaintingInput, ModelRef, Prediction, PredictionStatus, SegmentationInput};
