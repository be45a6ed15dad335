//! Mock removers for unit tests
//!
//! These implement [`BackgroundRemover`] without a model file so the adapter,
//! session and context logic can be tested deterministically.

use crate::{
    error::{EraserError, Result},
    remover::BackgroundRemover,
    services::ProgressHandle,
};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use std::sync::{Arc, Condvar, Mutex};

/// Cut-out with a transparent left half and an opaque right half
pub fn half_mask(image: &DynamicImage) -> RgbaImage {
    let (width, height) = image.dimensions();
    let rgba = image.to_rgba8();
    RgbaImage::from_fn(width, height, |x, y| {
        let pixel = rgba.get_pixel(x, y);
        let alpha = if x < width / 2 { 0 } else { 255 };
        Rgba([pixel[0], pixel[1], pixel[2], alpha])
    })
}

/// Mock remover that records each call
#[derive(Debug, Clone, Default)]
pub struct MockRemover {
    call_history: Arc<Mutex<Vec<String>>>,
}

impl MockRemover {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.call_history.lock().unwrap().len()
    }
}

impl BackgroundRemover for MockRemover {
    fn name(&self) -> &str {
        "mock"
    }

    fn remove_background(
        &self,
        image: &DynamicImage,
        progress: &ProgressHandle,
    ) -> Result<RgbaImage> {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(progress.identity().to_string());
        }
        progress.percentage(50);
        let result = half_mask(image);
        progress.percentage(100);
        Ok(result)
    }
}

/// Mock remover that always returns an error
#[derive(Debug)]
pub struct FailingRemover {
    error: fn() -> EraserError,
}

impl FailingRemover {
    #[must_use]
    pub fn decode_error() -> Self {
        Self {
            error: || EraserError::decode("mock model could not read its input"),
        }
    }

    #[must_use]
    pub fn processing_error() -> Self {
        Self {
            error: || EraserError::processing("mock inference failure"),
        }
    }
}

impl BackgroundRemover for FailingRemover {
    fn name(&self) -> &str {
        "failing"
    }

    fn remove_background(
        &self,
        _image: &DynamicImage,
        _progress: &ProgressHandle,
    ) -> Result<RgbaImage> {
        Err((self.error)())
    }
}

/// Mock remover that panics
#[derive(Debug)]
pub struct PanickingRemover;

impl BackgroundRemover for PanickingRemover {
    fn name(&self) -> &str {
        "panicking"
    }

    fn remove_background(
        &self,
        _image: &DynamicImage,
        _progress: &ProgressHandle,
    ) -> Result<RgbaImage> {
        panic!("model exploded")
    }
}

/// Mock remover returning a bitmap of the wrong size
#[derive(Debug)]
pub struct WrongSizeRemover;

impl BackgroundRemover for WrongSizeRemover {
    fn name(&self) -> &str {
        "wrong-size"
    }

    fn remove_background(
        &self,
        image: &DynamicImage,
        _progress: &ProgressHandle,
    ) -> Result<RgbaImage> {
        let (width, height) = image.dimensions();
        Ok(RgbaImage::new(width + 1, height))
    }
}

/// Mock remover that blocks until the test releases it
#[derive(Debug, Default)]
pub struct GatedRemover {
    inner: MockRemover,
    open: Mutex<bool>,
    signal: Condvar,
}

impl GatedRemover {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Let every pending and future call proceed
    pub fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.signal.notify_all();
    }

    pub fn call_count(&self) -> usize {
        self.inner.call_count()
    }
}

impl BackgroundRemover for GatedRemover {
    fn name(&self) -> &str {
        "gated"
    }

    fn remove_background(
        &self,
        image: &DynamicImage,
        progress: &ProgressHandle,
    ) -> Result<RgbaImage> {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.signal.wait(open).unwrap();
        }
        drop(open);
        self.inner.remove_background(image, progress)
    }
}
