//! Prediction API request/response types.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MlError, MlResult};

/// Hosted model identifier: `owner/name` or `owner/name:version`.
///
/// A missing version or `:latest` runs the model's current default version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelRef {
    pub owner: String,
    pub name: String,
    pub version: Option<String>,
}

impl ModelRef {
    pub fn parse(s: &str) -> MlResult<Self> {
        let s = s.trim();
        let (path, version) = match s.split_once(':') {
            Some((path, "latest")) | Some((path, "")) => (path, None),
            Some((path, version)) => (path, Some(version.to_string())),
            None => (s, None),
        };

        let (owner, name) = path
            .split_once('/')
            .filter(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'))
            .ok_or_else(|| {
                MlError::configuration(format!(
                    "Invalid model reference '{}', expected owner/name[:version]",
                    s
                ))
            })?;

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            version,
        })
    }
}

impl FromStr for ModelRef {
    type Err = MlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}/{}:{}", self.owner, self.name, version),
            None => write!(f, "{}/{}", self.owner, self.name),
        }
    }
}

/// Body of a create-prediction call.
#[derive(Debug, Serialize)]
pub struct PredictionRequest<'a, I: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<&'a str>,
    pub input: &'a I,
}

/// Lifecycle status of a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    #[default]
    #[serde(other)]
    Unknown,
}

impl PredictionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PredictionStatus::Succeeded | PredictionStatus::Failed | PredictionStatus::Canceled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionStatus::Starting => "starting",
            PredictionStatus::Processing => "processing",
            PredictionStatus::Succeeded => "succeeded",
            PredictionStatus::Failed => "failed",
            PredictionStatus::Canceled => "canceled",
            PredictionStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionUrls {
    pub get: Option<String>,
    pub cancel: Option<String>,
}

/// Prediction resource as returned by create and poll calls.
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: PredictionStatus,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub urls: PredictionUrls,
}

impl Prediction {
    /// All http(s) URLs found in the output, in order, without duplicates.
    pub fn output_urls(&self) -> Vec<String> {
        let mut urls = Vec::new();
        if let Some(output) = &self.output {
            collect_urls(output, &mut urls);
        }
        urls
    }

    /// Failure detail reported by the provider.
    pub fn error_detail(&self) -> String {
        match &self.error {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Null) | None => "no error detail reported".to_string(),
            Some(other) => other.to_string(),
        }
    }
}

fn collect_urls(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(url) => {
            let trimmed = url.trim();
            if trimmed.starts_with("http") && !out.iter().any(|existing| existing == trimmed) {
                out.push(trimmed.to_string());
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_urls(item, out);
            }
        }
        Value::Object(obj) => {
            if let Some(url) = obj.get("url") {
                collect_urls(url, out);
            }
            if let Some(urls) = obj.get("urls") {
                collect_urls(urls, out);
            }
        }
        _ => {}
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileUrls {
    pub get: String,
}

/// Response of a file upload.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedFile {
    #[serde(default)]
    pub id: Option<String>,
    pub urls: FileUrls,
}

/// Input of the segmentation model.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SegmentationInput {
    /// Data URI or URL of the source image
    pub image: String,
    /// Region to segment
    pub mask_prompt: String,
    /// Region to exclude
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_mask_prompt: Option<String>,
    /// Mask erosion (negative) or dilation (positive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustment_factor: Option<i32>,
}

/// Input of the inpainting model.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InpaintingInput {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    /// Data URI or URL of the source image
    pub image: String,
    /// Mask URL; absent means the whole image is edited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_strength: Option<f32>,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Downloaded content.
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_model_ref_parse() {
        let model = ModelRef::parse("schananas/grounded_sam").unwrap();
        assert_eq!(model.owner, "schananas");
        assert_eq!(model.name, "grounded_sam");
        assert_eq!(model.version, None);

        let latest = ModelRef::parse("lucataco/sdxl-inpainting:latest").unwrap();
        assert_eq!(latest.version, None);

        let pinned = ModelRef::parse("owner/model:abc123").unwrap();
        assert_eq!(pinned.version.as_deref(), Some("abc123"));
        assert_eq!(pinned.to_string(), "owner/model:abc123");
    }

    #[test]
    fn test_model_ref_invalid() {
        for raw in ["", "no-slash", "/name", "owner/", "a/b/c"] {
            assert!(ModelRef::parse(raw).is_err(), "{} should be rejected", raw);
        }
    }

    #[test]
    fn test_output_urls_shapes() {
        let prediction: Prediction = serde_json::from_value(json!({
            "id": "p1",
            "status": "succeeded",
            "output": [
                "https://cdn.example.com/annotated.jpg",
                {"url": "https://cdn.example.com/mask.jpg"},
                "https://cdn.example.com/annotated.jpg",
                "not a url",
                42
            ]
        }))
        .unwrap();

        assert_eq!(
            prediction.output_urls(),
            vec![
                "https://cdn.example.com/annotated.jpg".to_string(),
                "https://cdn.example.com/mask.jpg".to_string(),
            ]
        );
    }

    #[test]
    fn test_single_string_output() {
        let prediction: Prediction = serde_json::from_value(json!({
            "status": "succeeded",
            "output": "https://cdn.example.com/out.png"
        }))
        .unwrap();
        assert_eq!(prediction.output_urls(), vec!["https://cdn.example.com/out.png"]);
    }

    #[test]
    fn test_unknown_status() {
        let prediction: Prediction =
            serde_json::from_value(json!({"status": "queued"})).unwrap();
        assert_eq!(prediction.status, PredictionStatus::Unknown);
        assert!(!prediction.status.is_terminal());
        assert!(prediction.output_urls().is_empty());
    }

    #[test]
    fn test_inpainting_input_omits_mask() {
        let input = InpaintingInput {
            prompt: "p".to_string(),
            negative_prompt: None,
            image: "data:image/png;base64,AA==".to_string(),
            mask: None,
            prompt_strength: None,
            num_inference_steps: 35,
            guidance_scale: 7.5,
            width: None,
            height: None,
        };
        let value = serde_json::to_value(&input).unwrap();
        assert!(value.get("mask").is_none());
        assert!(value.get("width").is_none());
        assert_eq!(value["num_inference_steps"], 35);
    }
}
