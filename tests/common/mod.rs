//! Shared fixtures for integration tests

#![allow(dead_code)]

use bg_eraser::{BackgroundRemover, EraserError, ProgressHandle, Result};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

/// Route `log` output through the test harness; set `RUST_LOG` to see it
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}

/// Encode a solid-colour RGB image
pub fn encoded_image(width: u32, height: u32, color: [u8; 3], format: ImageFormat) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)));
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, format).unwrap();
    buffer.into_inner()
}

pub fn png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    encoded_image(width, height, color, ImageFormat::Png)
}

pub fn jpeg(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    encoded_image(width, height, color, ImageFormat::Jpeg)
}

/// Keeps a centred disc opaque and makes everything else transparent
#[derive(Debug, Default)]
pub struct MockRemover {
    calls: AtomicUsize,
}

impl MockRemover {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
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
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (width, height) = image.dimensions();
        let rgba = image.to_rgba8();
        let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
        let radius = width.min(height) as f32 / 4.0;

        progress.percentage(40);
        let result = RgbaImage::from_fn(width, height, |x, y| {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            let pixel = rgba.get_pixel(x, y);
            if (dx * dx + dy * dy).sqrt() <= radius {
                Rgba([pixel[0], pixel[1], pixel[2], 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        });
        progress.percentage(100);
        Ok(result)
    }
}

/// Fails the first `failures` calls, then behaves like `MockRemover`
#[derive(Debug)]
pub struct FlakyRemover {
    remaining_failures: AtomicUsize,
    inner: MockRemover,
}

impl FlakyRemover {
    pub fn new(failures: usize) -> Self {
        Self {
            remaining_failures: AtomicUsize::new(failures),
            inner: MockRemover::default(),
        }
    }
}

impl BackgroundRemover for FlakyRemover {
    fn name(&self) -> &str {
        "flaky"
    }

    fn remove_background(
        &self,
        image: &DynamicImage,
        progress: &ProgressHandle,
    ) -> Result<RgbaImage> {
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(EraserError::processing("model unavailable"));
        }
        self.inner.remove_background(image, progress)
    }
}

/// Panics on every call
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
        panic!("segmentation model crashed")
    }
}

/// Blocks each call until released by the test
#[derive(Debug, Default)]
pub struct GatedRemover {
    open: Mutex<bool>,
    signal: Condvar,
    inner: MockRemover,
}

impl GatedRemover {
    pub fn new() -> Self {
        Self::default()
    }

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
