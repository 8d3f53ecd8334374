//! Pipeline stages and per-request states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Validation,
    Segmentation,
    Inpainting,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Validation => "validation",
            PipelineStage::Segmentation => "segmentation",
            PipelineStage::Inpainting => "inpainting",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State of a single recolor request.
///
/// `Validating -> SegmentingRoof -> {MaskFound | NoMaskFallback} -> Inpainting
/// -> Downloading -> Done`; any state may move to `Failed`. No state is
/// revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Validating,
    SegmentingRoof,
    MaskFound,
    NoMaskFallback,
    Inpainting,
    Downloading,
    Done,
    Failed(PipelineStage),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Validating => write!(f, "validating"),
            PipelineState::SegmentingRoof => write!(f, "segmenting_roof"),
            PipelineState::MaskFound => write!(f, "mask_found"),
            PipelineState::NoMaskFallback => write!(f, "no_mask_fallback"),
            PipelineState::Inpainting => write!(f, "inpainting"),
            PipelineState::Downloading => write!(f, "downloading"),
            PipelineState::Done => write!(f, "done"),
            PipelineState::Failed(stage) => write!(f, "failed({})", stage),
        }
    }
}
