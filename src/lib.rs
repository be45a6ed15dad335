#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # bg-eraser
//!
//! Upload an image, strip its background with a segmentation model, preview the
//! cut-out and export it as PNG (transparency kept) or JPEG (flattened onto an
//! opaque background colour).
//!
//! ## Features
//!
//! - **Session state machine**: one [`SessionContext`] per user; re-uploading the
//!   same image never runs the model twice, and a result for a replaced upload
//!   is discarded instead of overwriting the newer one
//! - **Opaque model boundary**: any [`BackgroundRemover`] can be plugged in; the
//!   [`RemovalAdapter`] runs it off the async runtime and turns errors, panics
//!   and malformed output into `EraserError::Processing`
//! - **Tract backend**: pure Rust ONNX inference (`tract` feature)
//! - **Exports**: lossless PNG with alpha, baseline JPEG with configurable
//!   quality and background colour, timestamped file names
//! - **Real progress only**: backends report actual percentages, or frontends
//!   show an indeterminate indicator
//! - **CLI**: the `bg-eraser` binary (`cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bg_eraser::{backends::TractRemover, AppConfig, ExportFormat, SessionContext};
//! use std::sync::Arc;
//!
//! # async fn example() -> bg_eraser::Result<()> {
//! let config = AppConfig::builder().model_path("isnet.onnx").build()?;
//! let remover = TractRemover::from_path("isnet.onnx", config.model.preprocessing())?;
//! let session = SessionContext::new(config, Arc::new(remover))?;
//!
//! let bytes = std::fs::read("portrait.jpg")?;
//! session.upload(&bytes, Some("portrait.jpg"))?;
//! session.process().await?;
//!
//! for artifact in session.export_all()? {
//!     artifact.save_to_dir("out")?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): pure Rust ONNX backend
//! - `cli` (default): command-line interface and tracing subscriber setup
//! - `tracing-json`: JSON log output for the CLI

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod processor;
pub mod remover;
pub mod services;
pub mod session;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use config::{
    AppConfig, AppConfigBuilder, BackgroundColor, ExportFormat, LayoutVariant, ModelConfig,
    PreviewBounds, ProgressMode,
};
pub use error::{EraserError, Result};
pub use processor::{ProcessOutcome, ProcessingJob, SessionContext, UploadReport};
pub use remover::{BackgroundRemover, RemovalAdapter};
pub use services::{
    ChannelProgressReporter, ConsoleProgressReporter, ExportArtifact, ExportEncoder,
    ImageResizer, NoOpProgressReporter, ProgressEvent, ProgressHandle, ProgressReporter,
    ProgressUpdate, UploadService,
};
pub use session::{
    CommitOutcome, ProcessingStart, ProcessingTicket, SessionPhase, SessionSnapshot, SessionState,
    UploadOutcome,
};
pub use types::{DisplayImage, ImageIdentity, ResultImage, SourceImage, UploadFormat};

#[cfg(feature = "cli")]
pub use tracing_config::{spans, TracingConfig, TracingFormat};
