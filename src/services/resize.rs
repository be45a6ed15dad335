//! Preview resizing service
//!
//! Produces display copies of uploads and results that fit a bounding box.
//! Images are only ever scaled down.

use crate::{
    config::PreviewBounds,
    error::{EraserError, Result},
    types::DisplayImage,
};
use image::{imageops::FilterType, DynamicImage, GenericImageView};

/// Service for fitting images inside a display bounding box
pub struct ImageResizer;

impl ImageResizer {
    /// Resampling filter used for previews
    pub const FILTER: FilterType = FilterType::Lanczos3;

    /// Compute the dimensions `width x height` takes when fitted within the bounds
    ///
    /// Returns the input unchanged when it already fits. Otherwise the image is
    /// scaled by `min(max_width / width, max_height / height)`, with each side
    /// rounded to the nearest pixel and never below one.
    ///
    /// # Errors
    /// - Zero bounds
    ///
    /// # Examples
    /// ```rust
    /// use bg_eraser::services::ImageResizer;
    ///
    /// assert_eq!(ImageResizer::target_dimensions(1600, 800, 800, 800).unwrap(), (800, 400));
    /// assert_eq!(ImageResizer::target_dimensions(800, 1600, 800, 800).unwrap(), (400, 800));
    /// assert_eq!(ImageResizer::target_dimensions(100, 50, 800, 800).unwrap(), (100, 50));
    /// ```
    pub fn target_dimensions(
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    ) -> Result<(u32, u32)> {
        PreviewBounds::new(max_width, max_height).validate()?;

        if width == 0 || height == 0 {
            return Err(EraserError::decode(format!(
                "Image has zero dimension: {width}x{height}"
            )));
        }

        if width <= max_width && height <= max_height {
            return Ok((width, height));
        }

        let scale = (f64::from(max_width) / f64::from(width))
            .min(f64::from(max_height) / f64::from(height));

        let new_width = (f64::from(width) * scale).round().max(1.0) as u32;
        let new_height = (f64::from(height) * scale).round().max(1.0) as u32;

        Ok((new_width.min(max_width), new_height.min(max_height)))
    }

    /// Fit an image within `max_width x max_height` for display
    ///
    /// # Errors
    /// - Zero bounds
    pub fn fit_within(image: &DynamicImage, max_width: u32, max_height: u32) -> Result<DisplayImage> {
        let (width, height) = image.dimensions();
        let (target_width, target_height) =
            Self::target_dimensions(width, height, max_width, max_height)?;

        if (target_width, target_height) == (width, height) {
            return Ok(DisplayImage::new(image.clone(), (width, height)));
        }

        log::debug!(
            "Resizing preview {}x{} -> {}x{}",
            width,
            height,
            target_width,
            target_height
        );

        let resized = image.resize_exact(target_width, target_height, Self::FILTER);
        Ok(DisplayImage::new(resized, (width, height)))
    }

    /// Fit an image within preview bounds
    ///
    /// # Errors
    /// - Zero bounds
    pub fn fit_to_bounds(image: &DynamicImage, bounds: PreviewBounds) -> Result<DisplayImage> {
        Self::fit_within(image, bounds.max_width, bounds.max_height)
    }
}
