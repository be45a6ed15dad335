//! Model input preprocessing
//!
//! Converts a decoded upload into the square, normalised NCHW tensor a
//! segmentation model expects, and records the letterbox geometry needed to map
//! the model's mask back onto the original image.

use crate::error::{EraserError, Result};
use image::{imageops::FilterType, DynamicImage, ImageBuffer, Rgb, RgbImage};
use ndarray::Array4;
use serde::{Deserialize, Serialize};

/// Model input preprocessing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Model input size `[width, height]`
    pub target_size: [u32; 2],
    /// Per-channel mean (RGB, 0-1 range)
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation (RGB)
    pub normalization_std: [f32; 3],
}

/// Where the resized image sits inside the square model canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Side length of the square canvas
    pub canvas_size: u32,
    /// Scale applied to the original image
    pub scale: f32,
    /// Horizontal padding before the image
    pub offset_x: u32,
    /// Vertical padding before the image
    pub offset_y: u32,
    /// Original image dimensions
    pub original: (u32, u32),
}

impl Letterbox {
    /// Compute the letterbox for fitting `width x height` into a square canvas
    ///
    /// # Errors
    /// - Zero-sized image or canvas
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn fit(width: u32, height: u32, canvas_size: u32) -> Result<Self> {
        if width == 0 || height == 0 || canvas_size == 0 {
            return Err(EraserError::processing(format!(
                "Cannot letterbox {width}x{height} into {canvas_size}x{canvas_size}"
            )));
        }

        let canvas = canvas_size as f32;
        let scale = (canvas / width as f32).min(canvas / height as f32);
        let (new_width, new_height) = Self::scaled((width, height), scale, canvas_size);

        Ok(Self {
            canvas_size,
            scale,
            offset_x: (canvas_size - new_width) / 2,
            offset_y: (canvas_size - new_height) / 2,
            original: (width, height),
        })
    }

    /// Dimensions of the resized image inside the canvas
    #[must_use]
    pub fn resized_dimensions(&self) -> (u32, u32) {
        Self::scaled(self.original, self.scale, self.canvas_size)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn scaled((width, height): (u32, u32), scale: f32, limit: u32) -> (u32, u32) {
        let w = ((width as f32 * scale).round() as u32).clamp(1, limit);
        let h = ((height as f32 * scale).round() as u32).clamp(1, limit);
        (w, h)
    }
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Padding colour around the letterboxed image
    pub const PADDING: Rgb<u8> = Rgb([255, 255, 255]);

    /// Preprocess an image for model inference
    ///
    /// - RGB conversion
    /// - Aspect ratio preserving resize
    /// - Center padding to the square target size
    /// - Normalization to NCHW tensor layout
    ///
    /// # Errors
    /// - Non-square target size or zero-sized input
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        config: &PreprocessingConfig,
    ) -> Result<(Array4<f32>, Letterbox)> {
        let [target_width, target_height] = config.target_size;
        if target_width != target_height {
            return Err(EraserError::processing(format!(
                "Model input must be square, got {target_width}x{target_height}"
            )));
        }

        let rgb_image = image.to_rgb8();
        let letterbox = Letterbox::fit(rgb_image.width(), rgb_image.height(), target_width)?;
        let (new_width, new_height) = letterbox.resized_dimensions();

        let resized =
            image::imageops::resize(&rgb_image, new_width, new_height, FilterType::Triangle);

        let mut canvas: RgbImage = ImageBuffer::from_pixel(target_width, target_width, Self::PADDING);
        image::imageops::replace(
            &mut canvas,
            &resized,
            i64::from(letterbox.offset_x),
            i64::from(letterbox.offset_y),
        );

        Ok((Self::canvas_to_tensor(&canvas, config), letterbox))
    }

    /// Convert canvas to normalized tensor
    fn canvas_to_tensor(canvas: &RgbImage, config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions pre-allocated to match canvas size
        for (x, y, pixel) in canvas.enumerate_pixels() {
            for channel in 0..3 {
                let value = f32::from(pixel[channel]) / 255.0;
                tensor[[0, channel, y as usize, x as usize]] = (value
                    - config.normalization_mean[channel])
                    / config.normalization_std[channel];
            }
        }

        tensor
    }
}
