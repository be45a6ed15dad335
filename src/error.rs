//! Error types for upload, removal and export operations

use thiserror::Error;

/// Result type alias for bg-eraser operations
pub type Result<T> = std::result::Result<T, EraserError>;

/// Error kinds surfaced to the user.
///
/// None of these are fatal to a session: each is recovered at the boundary
/// where it originates and the user may retry by uploading again.
#[derive(Error, Debug)]
pub enum EraserError {
    /// Upload rejected before decoding (not a JPEG or PNG)
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Upload bytes could not be decoded into a bitmap
    #[error("Decode failure: {0}")]
    Decode(String),

    /// The background removal model raised or returned invalid output
    #[error("Processing failure: {0}")]
    Processing(String),

    /// Export encoding failed
    #[error("Encode failure: {0}")]
    Encode(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation not valid in the current session phase
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EraserError {
    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(format: S) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Wrap any error coming out of a model backend as a processing failure
    ///
    /// Processing errors pass through unchanged; every other kind is folded
    /// into `Processing` with the backend name as context.
    pub fn into_processing(self, backend: &str) -> Self {
        match self {
            Self::Processing(_) => self,
            other => Self::Processing(format!("{backend}: {other}")),
        }
    }

    /// Message suitable for showing to the user
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedFormat(format) => {
                format!("❌ Unsupported file type ({format}). Please upload a JPG, JPEG or PNG image.")
            },
            Self::Decode(details) => {
                format!("❌ The uploaded file could not be read as an image: {details}")
            },
            Self::Processing(details) => {
                format!("❌ Background removal failed: {details}. Upload again to retry.")
            },
            Self::Encode(details) => format!("❌ Could not prepare the download: {details}"),
            Self::InvalidConfig(details) => format!("❌ Invalid settings: {details}"),
            Self::InvalidState(details) => format!("❌ {details}"),
            Self::Io(err) => format!("❌ An error occurred: {err}"),
        }
    }
}
