//! Mask references and the mask-selection policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// URL of a mask produced by the segmentation stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaskReference(String);

impl MaskReference {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MaskReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MaskReference {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A mask returned by segmentation together with its probed encoded size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskCandidate {
    pub reference: MaskReference,
    /// Encoded byte size, `None` when the probe could not determine it
    pub encoded_size: Option<u64>,
}

/// Policy for choosing one mask out of several segmentation outputs.
///
/// `Largest` assumes the roof is the dominant large surface in a house
/// photograph and uses the encoded size of each mask as a cheap proxy for
/// its area. It is a heuristic, not a roof detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaskSelection {
    /// Largest encoded size wins; ties go to the first seen
    #[default]
    Largest,
    /// First mask returned by the provider
    First,
}

impl MaskSelection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaskSelection::Largest => "largest",
            MaskSelection::First => "first",
        }
    }

    /// Whether this policy needs the encoded size of each candidate.
    pub fn needs_probe(&self) -> bool {
        matches!(self, MaskSelection::Largest)
    }

    /// Choose a mask. Unknown sizes count as zero.
    pub fn choose(&self, candidates: Vec<MaskCandidate>) -> Option<MaskReference> {
        match self {
            MaskSelection::First => candidates.into_iter().next().map(|c| c.reference),
            MaskSelection::Largest => {
                let mut best: Option<MaskCandidate> = None;
                for candidate in candidates {
                    let replace = match &best {
                        None => true,
                        Some(current) => {
                            candidate.encoded_size.unwrap_or(0) > current.encoded_size.unwrap_or(0)
                        }
                    };
                    if replace {
                        best = Some(candidate);
                    }
                }
                best.map(|c| c.reference)
            }
        }
    }
}

impl FromStr for MaskSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "largest" | "largest_size" => Ok(MaskSelection::Largest),
            "first" => Ok(MaskSelection::First),
            other => Err(format!("unknown mask selection: {}", other)),
        }
    }
}

impl fmt::Display for MaskSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
