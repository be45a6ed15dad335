//! Background removal adapter
//!
//! The segmentation model is a black box behind [`BackgroundRemover`]. The
//! [`RemovalAdapter`] runs it off the interactive task, normalises every kind
//! of failure (returned errors, panics, malformed output) into
//! `EraserError::Processing`, and never yields a partial result.

use crate::{
    error::{EraserError, Result},
    services::ProgressHandle,
    types::ResultImage,
};
use image::{DynamicImage, GenericImageView, RgbaImage};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tracing::{debug, instrument, warn};

/// Contract for an opaque background-removal model
///
/// Implementations receive the decoded upload and must return an RGBA bitmap
/// of identical dimensions, with the alpha channel marking the foreground.
/// Calls are blocking and may be slow.
pub trait BackgroundRemover: Send + Sync {
    /// Short name used in logs and error messages
    fn name(&self) -> &str;

    /// Remove the background from `image`
    ///
    /// # Errors
    /// - Any model or conversion failure
    fn remove_background(&self, image: &DynamicImage, progress: &ProgressHandle)
        -> Result<RgbaImage>;
}

/// Runs a [`BackgroundRemover`] and enforces its output contract
#[derive(Clone)]
pub struct RemovalAdapter {
    remover: Arc<dyn BackgroundRemover>,
    invocations: Arc<AtomicUsize>,
}

impl RemovalAdapter {
    #[must_use]
    pub fn new(remover: Arc<dyn BackgroundRemover>) -> Self {
        Self {
            remover,
            invocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn remover_name(&self) -> &str {
        self.remover.name()
    }

    /// Number of times the underlying remover has been invoked
    #[must_use]
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Remove the background on tokio's blocking pool
    ///
    /// The result is tagged with the identity carried by `progress`.
    ///
    /// # Errors
    /// - `Processing` for remover errors, panics and mismatched output dimensions
    #[instrument(skip_all, fields(remover = %self.remover.name(), identity = %progress.identity().short()))]
    pub async fn remove_background(
        &self,
        image: Arc<DynamicImage>,
        progress: ProgressHandle,
    ) -> Result<ResultImage> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let expected = image.dimensions();
        let remover = Arc::clone(&self.remover);
        let task_progress = progress.clone();

        let joined = tokio::task::spawn_blocking(move || {
            remover.remove_background(&image, &task_progress)
        })
        .await;

        let output = match joined {
            Ok(result) => result.map_err(|e| e.into_processing(self.remover.name()))?,
            Err(join_error) if join_error.is_panic() => {
                let message = panic_message(join_error.into_panic().as_ref());
                warn!(message = %message, "Background remover panicked");
                return Err(EraserError::processing(format!(
                    "{} panicked: {}",
                    self.remover.name(),
                    message
                )));
            },
            Err(join_error) => {
                return Err(EraserError::processing(format!(
                    "{} task did not complete: {}",
                    self.remover.name(),
                    join_error
                )));
            },
        };

        self.finish(output, expected, &progress)
    }

    /// Remove the background on the calling thread
    ///
    /// For callers without a tokio runtime. Panics are caught and reported as
    /// processing failures.
    ///
    /// # Errors
    /// - `Processing` for remover errors, panics and mismatched output dimensions
    pub fn remove_background_blocking(
        &self,
        image: &DynamicImage,
        progress: &ProgressHandle,
    ) -> Result<ResultImage> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let expected = image.dimensions();

        let output = catch_unwind(AssertUnwindSafe(|| {
            self.remover.remove_background(image, progress)
        }))
        .map_err(|payload| {
            EraserError::processing(format!(
                "{} panicked: {}",
                self.remover.name(),
                panic_message(payload.as_ref())
            ))
        })?
        .map_err(|e| e.into_processing(self.remover.name()))?;

        self.finish(output, expected, progress)
    }

    fn finish(
        &self,
        output: RgbaImage,
        expected: (u32, u32),
        progress: &ProgressHandle,
    ) -> Result<ResultImage> {
        if output.dimensions() != expected {
            return Err(EraserError::processing(format!(
                "{} returned {}x{} output for a {}x{} input",
                self.remover.name(),
                output.width(),
                output.height(),
                expected.0,
                expected.1
            )));
        }

        debug!(
            elapsed_ms = progress.elapsed_ms(),
            "Background removal finished"
        );
        Ok(ResultImage::new(output, progress.identity().clone()))
    }
}

impl std::fmt::Debug for RemovalAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemovalAdapter")
            .field("remover", &self.remover.name())
            .field("invocations", &self.invocations())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{
        FailingRemover, MockRemover, PanickingRemover, WrongSizeRemover,
    };
    use crate::types::ImageIdentity;
    use image::{Rgb, RgbImage};

    fn image() -> Arc<DynamicImage> {
        Arc::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            12,
            8,
            Rgb([90, 120, 30]),
        )))
    }

    fn progress() -> ProgressHandle {
        ProgressHandle::detached(ImageIdentity::from_bytes(b"adapter"))
    }

    #[tokio::test]
    async fn test_successful_removal_keeps_dimensions() {
        let remover = Arc::new(MockRemover::new());
        let adapter = RemovalAdapter::new(remover.clone());

        let result = adapter.remove_background(image(), progress()).await.unwrap();

        assert_eq!(result.dimensions(), (12, 8));
        assert_eq!(result.identity(), &ImageIdentity::from_bytes(b"adapter"));
        assert_eq!(adapter.invocations(), 1);
        assert_eq!(remover.call_count(), 1);
    }

    #[tokio::test]
    async fn test_remover_error_becomes_processing_failure() {
        let adapter = RemovalAdapter::new(Arc::new(FailingRemover::decode_error()));
        let err = adapter.remove_background(image(), progress()).await.unwrap_err();

        assert!(matches!(err, EraserError::Processing(_)));
        assert!(err.to_string().contains("failing"));
    }

    #[tokio::test]
    async fn test_panic_becomes_processing_failure() {
        let adapter = RemovalAdapter::new(Arc::new(PanickingRemover));
        let err = adapter.remove_background(image(), progress()).await.unwrap_err();

        assert!(matches!(err, EraserError::Processing(_)));
        assert!(err.to_string().contains("model exploded"));
    }

    #[tokio::test]
    async fn test_wrong_output_size_rejected() {
        let adapter = RemovalAdapter::new(Arc::new(WrongSizeRemover));
        let err = adapter.remove_background(image(), progress()).await.unwrap_err();

        assert!(matches!(err, EraserError::Processing(_)));
        assert!(err.to_string().contains("12x8"));
    }

    #[test]
    fn test_blocking_variant_catches_panics() {
        let adapter = RemovalAdapter::new(Arc::new(PanickingRemover));
        let err = adapter
            .remove_background_blocking(&image(), &progress())
            .unwrap_err();

        assert!(matches!(err, EraserError::Processing(_)));
        assert_eq!(adapter.invocations(), 1);
    }

    #[test]
    fn test_blocking_variant_success() {
        let adapter = RemovalAdapter::new(Arc::new(MockRemover::new()));
        let result = adapter
            .remove_background_blocking(&image(), &progress())
            .unwrap();
        assert_eq!(result.dimensions(), (12, 8));
    }

    #[test]
    fn test_panic_message_extraction() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("borrowed");
        let other: Box<dyn Any + Send> = Box::new(7_u32);

        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "borrowed");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
