//! Tensor preprocessing and mask utilities for model backends

pub mod mask;
pub mod preprocessing;

pub use mask::SegmentationMask;
pub use preprocessing::{ImagePreprocessor, Letterbox, PreprocessingConfig};
