//! Export encoding service
//!
//! Serializes background-removed results into downloadable PNG and JPEG byte
//! streams. PNG keeps the alpha channel; JPEG has none, so the image is first
//! composited onto an opaque background colour.

use crate::{
    config::{AppConfig, BackgroundColor, ExportFormat},
    error::{EraserError, Result},
    types::ResultImage,
};
use chrono::NaiveDateTime;
use image::{
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType, PngEncoder},
    },
    ExtendedColorType, ImageBuffer, ImageEncoder, Rgb, RgbImage, RgbaImage,
};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Timestamp layout embedded in export file names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Encoded export ready for download
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub format: ExportFormat,
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl ExportArtifact {
    /// Write the artifact into a directory without overwriting existing files
    ///
    /// If `file_name` is taken, `_1`, `_2`, ... is appended to the stem.
    ///
    /// # Errors
    /// - Directory creation or file write failures
    pub fn save_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .map_err(|e| EraserError::file_io_error("create output directory", dir, &e))?;

        let path = Path::new(&self.file_name);
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("export");
        let extension = ExportEncoder::extension(self.format);

        let mut candidate = dir.join(&self.file_name);
        let mut counter = 1u32;
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(file) => {
                    write_or_remove(file, &candidate, &self.bytes)?;
                    return Ok(candidate);
                },
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    candidate = dir.join(format!("{stem}_{counter}.{extension}"));
                    counter += 1;
                },
                Err(e) => return Err(EraserError::file_io_error("write export", &candidate, &e)),
            }
        }
    }
}

/// Write `bytes` to a freshly created file, deleting it if the write fails
fn write_or_remove<W: Write>(mut writer: W, path: &Path, bytes: &[u8]) -> Result<()> {
    match writer.write_all(bytes).and_then(|()| writer.flush()) {
        Ok(()) => Ok(()),
        Err(e) => {
            drop(writer);
            if let Err(remove_error) = std::fs::remove_file(path) {
                log::warn!(
                    "Could not remove partial export {}: {}",
                    path.display(),
                    remove_error
                );
            }
            Err(EraserError::file_io_error("write export", path, &e))
        },
    }
}

/// Service for encoding results into export formats
pub struct ExportEncoder;

impl ExportEncoder {
    /// Encode an RGBA image as PNG, preserving the alpha channel losslessly
    ///
    /// Encoder settings are fixed so identical input yields identical bytes.
    ///
    /// # Errors
    /// - `Encode` when the PNG encoder fails
    pub fn to_png(image: &RgbaImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let encoder =
            PngEncoder::new_with_quality(&mut buffer, CompressionType::Default, FilterType::Adaptive);
        encoder
            .write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgba8,
            )
            .map_err(|e| EraserError::encode(format!("Failed to encode PNG: {e}")))?;
        Ok(buffer)
    }

    /// Composite an RGBA image onto an opaque background colour
    ///
    /// Each channel is `src * a + bg * (1 - a)`, rounded. Fully transparent
    /// pixels become exactly the background colour.
    #[must_use]
    pub fn flatten(image: &RgbaImage, background: BackgroundColor) -> RgbImage {
        let (width, height) = image.dimensions();
        let bg = background.to_rgb();
        let mut flattened: RgbImage = ImageBuffer::new(width, height);

        for (x, y, pixel) in image.enumerate_pixels() {
            let alpha = u32::from(pixel[3]);
            let inv_alpha = 255 - alpha;
            let blend = |src: u8, dst: u8| -> u8 {
                // Integer blend with rounding; result always fits in u8
                ((u32::from(src) * alpha + u32::from(dst) * inv_alpha + 127) / 255) as u8
            };
            flattened.put_pixel(
                x,
                y,
                Rgb([
                    blend(pixel[0], bg[0]),
                    blend(pixel[1], bg[1]),
                    blend(pixel[2], bg[2]),
                ]),
            );
        }

        flattened
    }

    /// Flatten onto `background` and encode as baseline JPEG
    ///
    /// # Errors
    /// - `Encode` for quality outside 1-100 or encoder failures
    pub fn to_jpeg(image: &RgbaImage, background: BackgroundColor, quality: u8) -> Result<Vec<u8>> {
        if quality == 0 || quality > 100 {
            return Err(EraserError::encode(format!(
                "JPEG quality must be 1-100, got {quality}"
            )));
        }

        let rgb = Self::flatten(image, background);
        let mut buffer = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        encoder
            .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
            .map_err(|e| EraserError::encode(format!("Failed to encode JPEG: {e}")))?;
        Ok(buffer)
    }

    /// Build a download file name: `<prefix>_<YYYYMMDD_HHMMSS>.<ext>`
    ///
    /// # Examples
    /// ```rust
    /// use bg_eraser::{services::ExportEncoder, ExportFormat};
    /// use chrono::NaiveDate;
    ///
    /// let ts = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(14, 5, 7).unwrap();
    /// assert_eq!(
    ///     ExportEncoder::file_name("processed_image", ExportFormat::Jpeg, &ts),
    ///     "processed_image_20240309_140507.jpg"
    /// );
    /// ```
    #[must_use]
    pub fn file_name(prefix: &str, format: ExportFormat, timestamp: &NaiveDateTime) -> String {
        format!(
            "{}_{}.{}",
            prefix,
            timestamp.format(TIMESTAMP_FORMAT),
            Self::extension(format)
        )
    }

    /// Encode a result into a downloadable artifact
    ///
    /// # Errors
    /// - `Encode` when encoding fails
    pub fn export(
        result: &ResultImage,
        format: ExportFormat,
        config: &AppConfig,
        timestamp: &NaiveDateTime,
    ) -> Result<ExportArtifact> {
        if !Self::supports_transparency(format) {
            log::debug!(
                "Export format {} has no alpha channel; flattening onto {}",
                format,
                config.background_color.to_hex()
            );
        }

        let bytes = match format {
            ExportFormat::Png => Self::to_png(result.image())?,
            ExportFormat::Jpeg => {
                Self::to_jpeg(result.image(), config.background_color, config.jpeg_quality)?
            },
        };

        Ok(ExportArtifact {
            format,
            file_name: Self::file_name(&config.export_prefix, format, timestamp),
            mime_type: Self::mime_type(format),
            bytes,
        })
    }

    /// File extension for a format (without the dot)
    #[must_use]
    pub fn extension(format: ExportFormat) -> &'static str {
        match format {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
        }
    }

    /// MIME type for a format
    #[must_use]
    pub fn mime_type(format: ExportFormat) -> &'static str {
        match format {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg => "image/jpeg",
        }
    }

    /// Check if a format supports transparency (alpha channel)
    #[must_use]
    pub fn supports_transparency(format: ExportFormat) -> bool {
        match format {
            ExportFormat::Png => true,
            ExportFormat::Jpeg => false,
        }
    }
}
