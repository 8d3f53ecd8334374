//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade; they are no-ops until the binary
//! installs a recorder.

use metrics::{counter, histogram};

pub mod names {
    pub const STAGE_DURATION_SECONDS: &str = "roofpaint_stage_duration_seconds";
    pub const RECOLOR_OUTCOMES_TOTAL: &str = "roofpaint_recolor_outcomes_total";
    pub const NO_MASK_FALLBACK_TOTAL: &str = "roofpaint_no_mask_fallback_total";
    pub const MASK_PROBE_FAILURES_TOTAL: &str = "roofpaint_mask_probe_failures_total";
}

/// Record how long one remote stage took (`upload`, `segmentation`,
/// `mask_probe`, `inpainting`, `download`).
pub fn record_stage_duration(stage: &'static str, duration_secs: f64) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage).record(duration_secs);
}

/// Record the final outcome of a recolor: `success` or the failing stage.
pub fn record_outcome(outcome: &'static str) {
    counter!(names::RECOLOR_OUTCOMES_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_no_mask_fallback() {
    counter!(names::NO_MASK_FALLBACK_TOTAL).increment(1);
}

pub fn record_mask_probe_failure() {
    counter!(names::MASK_PROBE_FAILURES_TOTAL).increment(1);
}
