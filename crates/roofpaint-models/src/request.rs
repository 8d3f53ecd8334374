//! Raw and validated recolor requests.

use bytes::Bytes;

use crate::colour::ColourSpec;
use crate::error::{ValidationError, ValidationResult};
use crate::media::{AllowedExtensions, UploadedImage};

/// Unvalidated form input, as extracted from the multipart body.
#[derive(Debug, Clone, Default)]
pub struct RecolorInput {
    /// Contents of the `image` field
    pub image: Option<Bytes>,
    /// Filename declared for the `image` field
    pub filename: Option<String>,
    /// Contents of the `color` field
    pub colour: Option<String>,
}

impl RecolorInput {
    pub fn new(
        image: impl Into<Bytes>,
        filename: impl Into<String>,
        colour: impl Into<String>,
    ) -> Self {
        Self {
            image: Some(image.into()),
            filename: Some(filename.into()),
            colour: Some(colour.into()),
        }
    }

    /// Check the preconditions of a recolor.
    ///
    /// Order: image present and non-empty, filename extension allowed,
    /// colour non-blank. The first violation is reported.
    pub fn validate(self, allowed: &AllowedExtensions) -> ValidationResult<RecolorRequest> {
        let bytes = match self.image {
            Some(bytes) if !bytes.is_empty() => bytes,
            Some(_) => return Err(ValidationError::image("Empty image file")),
            None => return Err(ValidationError::image("No image file")),
        };

        let filename = self.filename.unwrap_or_default();
        if filename.trim().is_empty() {
            return Err(ValidationError::image("Bad filename"));
        }
        if !allowed.permits(&filename) {
            return Err(ValidationError::image(format!(
                "Bad filename: expected one of {}",
                allowed
            )));
        }

        let colour = ColourSpec::parse(self.colour.as_deref().unwrap_or_default())?;

        Ok(RecolorRequest {
            image: UploadedImage::new(bytes, filename),
            colour,
        })
    }
}

/// A request that passed validation.
#[derive(Debug, Clone)]
pub struct RecolorRequest {
    pub image: UploadedImage,
    pub colour: ColourSpec,
}
