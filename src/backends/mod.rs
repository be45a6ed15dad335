//! Model backends implementing `BackgroundRemover`
//!
//! - Tract backend (pure Rust ONNX inference, `tract` feature)

#[cfg(feature = "tract")]
pub mod tract;

// Mock removers for unit tests
#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "tract")]
pub use self::tract::TractRemover;
