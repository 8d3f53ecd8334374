//! Source and result images.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use image::ImageFormat;
use serde::{Deserialize, Serialize};

/// Extensions accepted when no allow-list is configured.
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Content type used when the provider does not report a usable one.
pub const DEFAULT_OUTPUT_CONTENT_TYPE: &str = "image/png";

/// Filename advertised for the recolored result.
pub const OUTPUT_FILENAME: &str = "recolored.png";

/// Case-insensitive allow-list of upload file extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedExtensions(Vec<String>);

impl AllowedExtensions {
    /// Build an allow-list, normalizing entries to lowercase without a leading dot.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            extensions
                .into_iter()
                .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        )
    }

    /// Parse a comma-separated list (e.g. `"png,jpg,jpeg"`).
    /// An empty list falls back to the defaults.
    pub fn from_list(list: &str) -> Self {
        let parsed = Self::new(list.split(','));
        if parsed.0.is_empty() {
            Self::default()
        } else {
            parsed
        }
    }

    /// Check whether the filename ends in an allowed extension.
    pub fn permits(&self, filename: &str) -> bool {
        match extension_of(filename) {
            Some(ext) => self.0.iter().any(|allowed| *allowed == ext),
            None => false,
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl Default for AllowedExtensions {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_EXTENSIONS)
    }
}

impl fmt::Display for AllowedExtensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}

fn extension_of(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Pixel dimensions read from an image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

/// Uploaded source photograph.
///
/// The bytes are materialized once per request; cloning shares the same
/// buffer, so both remote stages read the identical original content.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    bytes: Bytes,
    filename: String,
}

impl UploadedImage {
    pub fn new(bytes: impl Into<Bytes>, filename: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.filename)
    }

    /// MIME type, sniffed from the content and falling back to the extension.
    pub fn mime_type(&self) -> &'static str {
        match image::guess_format(&self.bytes) {
            Ok(ImageFormat::Png) => return "image/png",
            Ok(ImageFormat::Jpeg) => return "image/jpeg",
            Ok(ImageFormat::WebP) => return "image/webp",
            Ok(ImageFormat::Gif) => return "image/gif",
            _ => {}
        }

        match self.extension().as_deref() {
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("webp") => "image/webp",
            Some("gif") => "image/gif",
            _ => "application/octet-stream",
        }
    }

    /// Read the pixel dimensions from the image header without decoding pixels.
    pub fn dimensions(&self) -> Option<ImageDimensions> {
        let reader = image::io::Reader::new(Cursor::new(self.bytes.as_ref()))
            .with_guessed_format()
            .ok()?;
        let (width, height) = reader.into_dimensions().ok()?;
        Some(ImageDimensions { width, height })
    }

    /// Encode as a `data:` URI accepted by the prediction API for file inputs.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), STANDARD.encode(&self.bytes))
    }
}

/// How the source image is handed to the prediction API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImageEncoding {
    /// Inline base64 `data:` URI in each prediction input
    #[default]
    DataUri,
    /// Upload once to the provider's file store and pass the returned URL
    Upload,
}

impl ImageEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageEncoding::DataUri => "data_uri",
            ImageEncoding::Upload => "upload",
        }
    }
}

impl FromStr for ImageEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "data_uri" | "datauri" | "inline" => Ok(ImageEncoding::DataUri),
            "upload" | "file" => Ok(ImageEncoding::Upload),
            other => Err(format!("unknown image encoding: {}", other)),
        }
    }
}

impl fmt::Display for ImageEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final image returned to the caller. Never written to disk.
#[derive(Debug, Clone)]
pub struct RecoloredImage {
    pub bytes: Bytes,
    pub content_type: String,
}

impl RecoloredImage {
    /// Wrap downloaded bytes, keeping the reported content type only if it is an image type.
    pub fn new(bytes: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        let content_type = content_type
            .map(|ct| ct.trim())
            .filter(|ct| ct.starts_with("image/"))
            .unwrap_or(DEFAULT_OUTPUT_CONTENT_TYPE)
            .to_string();

        Self {
            bytes: bytes.into(),
            content_type,
        }
    }
}
