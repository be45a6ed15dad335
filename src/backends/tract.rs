//! Tract backend: pure Rust ONNX inference for segmentation models
//!
//! Runs a single-input, single-output model taking a normalised `[1, 3, S, S]`
//! image and producing a `[1, 1, H, W]` foreground probability map. The mask is
//! mapped back to the upload's size and written into its alpha channel.

use crate::{
    error::{EraserError, Result},
    remover::BackgroundRemover,
    services::ProgressHandle,
    utils::{ImagePreprocessor, PreprocessingConfig, SegmentationMask},
};
use image::{DynamicImage, RgbaImage};
use instant::Instant;
use ndarray::Array4;
use std::path::Path;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Background remover backed by a Tract-optimised ONNX model
#[derive(Debug)]
pub struct TractRemover {
    model: TractModel,
    preprocessing: PreprocessingConfig,
    name: String,
}

impl TractRemover {
    /// Load a model from an ONNX file
    ///
    /// # Errors
    /// - File I/O errors
    /// - `Processing` when the model cannot be parsed or optimised
    pub fn from_path<P: AsRef<Path>>(path: P, preprocessing: PreprocessingConfig) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).map_err(|e| EraserError::file_io_error("read model", path, &e))?;
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("onnx");
        Self::from_bytes(&bytes, preprocessing, format!("tract:{name}"))
    }

    /// Load a model from in-memory ONNX bytes
    ///
    /// # Errors
    /// - `Processing` when the model cannot be parsed or optimised
    pub fn from_bytes(
        bytes: &[u8],
        preprocessing: PreprocessingConfig,
        name: impl Into<String>,
    ) -> Result<Self> {
        let load_start = Instant::now();
        let [width, height] = preprocessing.target_size;
        let name = name.into();

        log::info!("🚀 Initializing Tract backend ({name})");
        #[allow(clippy::cast_precision_loss)] // Precision loss acceptable for logging display
        let size_mb = bytes.len() as f64 / (1024.0 * 1024.0);
        log::info!("📏 Model size: {size_mb:.2} MB, input {width}x{height}");

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(bytes))
            .map_err(|e| EraserError::processing(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(
                0,
                f32::fact([1, 3, height as usize, width as usize]).into(),
            )
            .map_err(|e| EraserError::processing(format!("Model input is incompatible: {e}")))?
            .into_optimized()
            .map_err(|e| EraserError::processing(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| {
                EraserError::processing(format!("Failed to create runnable model: {e}"))
            })?;

        log::info!(
            "✅ Tract backend initialized in {}ms",
            load_start.elapsed().as_millis()
        );

        Ok(Self {
            model,
            preprocessing,
            name,
        })
    }

    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        log::debug!("🔮 Running Tract inference, input {:?}", input.shape());
        let inference_start = Instant::now();

        let data = input
            .as_slice()
            .ok_or_else(|| EraserError::processing("Input tensor is not contiguous"))?;
        let input_tensor = Tensor::from_shape(input.shape(), data)
            .map_err(|e| EraserError::processing(format!("Failed to build input tensor: {e}")))?;

        let outputs = self
            .model
            .run(tvec![input_tensor.into()])
            .map_err(|e| EraserError::processing(format!("Tract inference failed: {e}")))?;

        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| EraserError::processing("No output tensor found"))?;
        let view = output.to_array_view::<f32>().map_err(|e| {
            EraserError::processing(format!("Failed to convert output tensor: {e}"))
        })?;

        let shape = view.shape().to_vec();
        let [batch, channels, mask_height, mask_width] = shape[..] else {
            return Err(EraserError::processing(format!(
                "Expected 4D output tensor, got {}D",
                shape.len()
            )));
        };

        let output_array = Array4::from_shape_vec(
            (batch, channels, mask_height, mask_width),
            view.iter().copied().collect(),
        )
        .map_err(|e| EraserError::processing(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "✅ Tract inference completed in {}ms, output {:?}",
            inference_start.elapsed().as_millis(),
            output_array.shape()
        );
        Ok(output_array)
    }
}

impl BackgroundRemover for TractRemover {
    fn name(&self) -> &str {
        &self.name
    }

    fn remove_background(
        &self,
        image: &DynamicImage,
        progress: &ProgressHandle,
    ) -> Result<RgbaImage> {
        let (input, letterbox) =
            ImagePreprocessor::preprocess_for_inference(image, &self.preprocessing)?;
        progress.percentage(15);

        let output = self.infer(&input)?;
        progress.percentage(85);

        let mask = SegmentationMask::from_tensor(&output, &letterbox)?;
        progress.percentage(95);

        let result = mask.apply(image)?;
        progress.percentage(100);
        Ok(result)
    }
}
