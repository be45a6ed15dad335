//! Segmentation mask extraction and application

use crate::{
    error::{EraserError, Result},
    utils::preprocessing::Letterbox,
};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use ndarray::Array4;

/// Per-pixel foreground alpha at the original image size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    data: Vec<u8>,
    dimensions: (u32, u32),
}

impl SegmentationMask {
    /// # Errors
    /// - `data` length does not match `dimensions`
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Result<Self> {
        let expected = dimensions.0 as usize * dimensions.1 as usize;
        if data.len() != expected {
            return Err(EraserError::processing(format!(
                "Mask has {} values for {}x{} pixels",
                data.len(),
                dimensions.0,
                dimensions.1
            )));
        }
        Ok(Self { data, dimensions })
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    /// Alpha at `(x, y)`, zero outside the mask
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        if x >= self.dimensions.0 || y >= self.dimensions.1 {
            return 0;
        }
        let index = y as usize * self.dimensions.0 as usize + x as usize;
        self.data.get(index).copied().unwrap_or(0)
    }

    /// Map a `[1, 1, H, W]` model output back onto the original image
    ///
    /// Each original pixel samples the tensor at its letterboxed position.
    /// Values are clamped to 0-1 before scaling to 0-255.
    ///
    /// # Errors
    /// - Output tensor is not single-batch, single-channel
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_tensor(tensor: &Array4<f32>, letterbox: &Letterbox) -> Result<Self> {
        let shape = tensor.shape();
        if shape.first() != Some(&1) || shape.get(1) != Some(&1) {
            return Err(EraserError::processing(format!(
                "Invalid output tensor shape {shape:?}, expected [1, 1, H, W]"
            )));
        }
        let mask_height = shape.get(2).copied().unwrap_or(0);
        let mask_width = shape.get(3).copied().unwrap_or(0);
        // The output may be smaller than the input canvas
        let ratio_x = mask_width as f32 / letterbox.canvas_size as f32;
        let ratio_y = mask_height as f32 / letterbox.canvas_size as f32;

        let (width, height) = letterbox.original;
        let mut data = Vec::with_capacity(width as usize * height as usize);

        for y in 0..height {
            for x in 0..width {
                let canvas_x = (x as f32 * letterbox.scale).round() + letterbox.offset_x as f32;
                let canvas_y = (y as f32 * letterbox.scale).round() + letterbox.offset_y as f32;
                let tensor_x = (canvas_x * ratio_x) as usize;
                let tensor_y = (canvas_y * ratio_y) as usize;

                let value = tensor
                    .get([0, 0, tensor_y, tensor_x])
                    .copied()
                    .unwrap_or(0.0);
                data.push((value.clamp(0.0, 1.0) * 255.0).round() as u8);
            }
        }

        Self::new(data, (width, height))
    }

    /// Write the mask into the alpha channel of `image`
    ///
    /// Pixels with zero alpha become fully transparent black.
    ///
    /// # Errors
    /// - Mask dimensions differ from the image
    pub fn apply(&self, image: &DynamicImage) -> Result<RgbaImage> {
        if image.dimensions() != self.dimensions {
            return Err(EraserError::processing(format!(
                "Mask is {}x{} but image is {}x{}",
                self.dimensions.0,
                self.dimensions.1,
                image.width(),
                image.height()
            )));
        }

        let rgba = image.to_rgba8();
        Ok(RgbaImage::from_fn(self.dimensions.0, self.dimensions.1, |x, y| {
            let alpha = self.get(x, y);
            if alpha == 0 {
                Rgba([0, 0, 0, 0])
            } else {
                let pixel = rgba.get_pixel(x, y);
                Rgba([pixel[0], pixel[1], pixel[2], alpha])
            }
        }))
    }
}
