//! Core image and identity types shared by the session pipeline

use image::{DynamicImage, GenericImageView, RgbaImage};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Content identity of an uploaded image: SHA-256 of the uploaded bytes, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageIdentity(String);

impl ImageIdentity {
    /// Compute the identity of raw upload bytes
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("{:x}", hasher.finalize()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for ImageIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encodings accepted at the upload boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadFormat {
    Png,
    Jpeg,
}

impl UploadFormat {
    #[must_use]
    pub fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
        }
    }

    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}

impl std::fmt::Display for UploadFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => write!(f, "PNG"),
            Self::Jpeg => write!(f, "JPEG"),
        }
    }
}

/// Decoded upload plus its identity. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct SourceImage {
    image: Arc<DynamicImage>,
    identity: ImageIdentity,
    format: UploadFormat,
    file_name: Option<String>,
    byte_len: usize,
}

impl SourceImage {
    #[must_use]
    pub fn new(
        image: DynamicImage,
        identity: ImageIdentity,
        format: UploadFormat,
        file_name: Option<String>,
        byte_len: usize,
    ) -> Self {
        Self {
            image: Arc::new(image),
            identity,
            format,
            file_name,
            byte_len,
        }
    }

    #[must_use]
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Shared handle to the bitmap, for handing to background tasks
    #[must_use]
    pub fn shared_image(&self) -> Arc<DynamicImage> {
        Arc::clone(&self.image)
    }

    #[must_use]
    pub fn identity(&self) -> &ImageIdentity {
        &self.identity
    }

    #[must_use]
    pub fn format(&self) -> UploadFormat {
        self.format
    }

    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Background-removed bitmap for one upload
#[derive(Debug, Clone)]
pub struct ResultImage {
    image: RgbaImage,
    identity: ImageIdentity,
}

impl ResultImage {
    #[must_use]
    pub fn new(image: RgbaImage, identity: ImageIdentity) -> Self {
        Self { image, identity }
    }

    #[must_use]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Identity of the upload this result was computed from
    #[must_use]
    pub fn identity(&self) -> &ImageIdentity {
        &self.identity
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Number of fully transparent pixels
    #[must_use]
    pub fn transparent_pixels(&self) -> usize {
        self.image.pixels().filter(|p| p[3] == 0).count()
    }

    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

/// Resized copy of a source or result, for display only
#[derive(Debug, Clone)]
pub struct DisplayImage {
    image: DynamicImage,
    source_dimensions: (u32, u32),
}

impl DisplayImage {
    #[must_use]
    pub fn new(image: DynamicImage, source_dimensions: (u32, u32)) -> Self {
        Self {
            image,
            source_dimensions,
        }
    }

    #[must_use]
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Dimensions of the bitmap this preview was derived from
    #[must_use]
    pub fn source_dimensions(&self) -> (u32, u32) {
        self.source_dimensions
    }

    /// Whether the preview is smaller than its source
    #[must_use]
    pub fn was_downscaled(&self) -> bool {
        self.dimensions() != self.source_dimensions
    }

    #[must_use]
    pub fn into_image(self) -> DynamicImage {
        self.image
    }
}
