//! Upload boundary: format validation, decoding and identity
//!
//! Only JPEG and PNG uploads are accepted. The format is sniffed from the
//! content; a file name, when present, must also carry a supported extension.

use crate::{
    error::{EraserError, Result},
    types::{ImageIdentity, SourceImage, UploadFormat},
};
use image::{DynamicImage, ImageFormat};
use std::path::Path;

/// File extensions accepted by the upload widget
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Service for turning uploaded bytes into a `SourceImage`
pub struct UploadService;

impl UploadService {
    /// Detect the upload format from its content
    ///
    /// # Errors
    /// - `Decode` for empty input
    /// - `UnsupportedFormat` for any recognised format other than JPEG/PNG, or unrecognised bytes
    pub fn detect_format(bytes: &[u8]) -> Result<UploadFormat> {
        if bytes.is_empty() {
            return Err(EraserError::decode("Uploaded file is empty"));
        }

        match image::guess_format(bytes) {
            Ok(ImageFormat::Png) => Ok(UploadFormat::Png),
            Ok(ImageFormat::Jpeg) => Ok(UploadFormat::Jpeg),
            Ok(other) => Err(EraserError::unsupported_format(format!("{other:?}"))),
            Err(_) => Err(EraserError::unsupported_format("unknown")),
        }
    }

    /// Check that a file name carries a supported extension
    ///
    /// # Errors
    /// - `UnsupportedFormat` when the extension is missing or not jpg/jpeg/png
    pub fn validate_file_name(file_name: &str) -> Result<()> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension {
            Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
            Some(ext) => Err(EraserError::unsupported_format(format!(".{ext}"))),
            None => Err(EraserError::unsupported_format(format!(
                "'{file_name}' has no file extension"
            ))),
        }
    }

    /// Decode bytes of a known format
    ///
    /// # Errors
    /// - `Decode` for corrupt or truncated data
    pub fn decode(bytes: &[u8], format: UploadFormat) -> Result<DynamicImage> {
        image::load_from_memory_with_format(bytes, format.image_format())
            .map_err(|e| EraserError::decode(format!("Failed to decode {format} upload: {e}")))
    }

    /// Validate, decode and identify an upload
    ///
    /// # Errors
    /// - `UnsupportedFormat` before decoding for anything other than JPEG/PNG
    /// - `Decode` for corrupt data
    ///
    /// # Examples
    /// ```rust,no_run
    /// use bg_eraser::services::UploadService;
    ///
    /// let bytes = std::fs::read("portrait.jpg")?;
    /// let source = UploadService::load(&bytes, Some("portrait.jpg"))?;
    /// println!("{} {:?}", source.identity().short(), source.dimensions());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load(bytes: &[u8], file_name: Option<&str>) -> Result<SourceImage> {
        if let Some(name) = file_name {
            Self::validate_file_name(name)?;
        }

        let format = Self::detect_format(bytes)?;
        let image = Self::decode(bytes, format)?;
        let identity = ImageIdentity::from_bytes(bytes);

        log::debug!(
            "Loaded {} upload {} ({}x{}, {} bytes)",
            format,
            identity.short(),
            image.width(),
            image.height(),
            bytes.len()
        );

        Ok(SourceImage::new(
            image,
            identity,
            format,
            file_name.map(ToString::to_string),
            bytes.len(),
        ))
    }

    /// Read an upload from disk, returning its bytes and file name
    ///
    /// # Errors
    /// - File I/O errors
    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<(Vec<u8>, Option<String>)> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).map_err(|e| EraserError::file_io_error("read upload", path, &e))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToString::to_string);
        Ok((bytes, file_name))
    }
}
