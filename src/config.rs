//! Configuration types for sessions, previews and exports

use crate::error::{EraserError, Result};
use crate::utils::PreprocessingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Export formats offered for download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// PNG with alpha channel transparency
    Png,
    /// JPEG flattened onto the configured background colour
    Jpeg,
}

impl Default for ExportFormat {
    fn default() -> Self {
        Self::Png
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => write!(f, "png"),
            Self::Jpeg => write!(f, "jpeg"),
        }
    }
}

/// Opaque colour used when flattening transparent results (JPEG export)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl BackgroundColor {
    pub const WHITE: Self = Self::new(255, 255, 255);
    pub const BLACK: Self = Self::new(0, 0, 0);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` or `rrggbb`
    pub fn from_hex(value: &str) -> Result<Self> {
        let hex = value.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(EraserError::invalid_config(format!(
                "Invalid colour '{value}': expected #rrggbb"
            )));
        }
        let channel = |range: std::ops::Range<usize>| {
            hex.get(range)
                .and_then(|digits| u8::from_str_radix(digits, 16).ok())
                .ok_or_else(|| EraserError::invalid_config(format!("Invalid colour '{value}'")))
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    #[must_use]
    pub fn to_rgb(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl Default for BackgroundColor {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Maximum bounding box for display previews
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewBounds {
    pub max_width: u32,
    pub max_height: u32,
}

impl PreviewBounds {
    #[must_use]
    pub const fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            max_width,
            max_height,
        }
    }

    /// Reject zero-sized bounds
    pub fn validate(&self) -> Result<()> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(EraserError::invalid_config(format!(
                "Preview bounds must be positive, got {}x{}",
                self.max_width, self.max_height
            )));
        }
        Ok(())
    }
}

/// Page layouts. They differ only in arrangement, preview size and labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutVariant {
    /// Three equal columns: upload, preview, result
    #[default]
    Columns,
    /// Upload on top, original and result side by side underneath
    Stacked,
}

impl LayoutVariant {
    /// Default preview bounds for this layout
    #[must_use]
    pub fn preview_bounds(&self) -> PreviewBounds {
        match self {
            Self::Columns => PreviewBounds::new(200, 200),
            Self::Stacked => PreviewBounds::new(400, 400),
        }
    }

    /// Section headings in display order
    #[must_use]
    pub fn section_headers(&self) -> &'static [&'static str] {
        match self {
            Self::Columns => &["Upload Image", "Preview", "Result"],
            Self::Stacked => &["Upload Image", "Original", "Background Removed"],
        }
    }
}

impl std::fmt::Display for LayoutVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Columns => write!(f, "columns"),
            Self::Stacked => write!(f, "stacked"),
        }
    }
}

/// How processing progress is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressMode {
    /// Forward percentages reported by the backend, if it reports any
    #[default]
    Reported,
    /// Only start and end events; the UI shows a busy indicator
    Indeterminate,
}

/// Segmentation model settings for the tract backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to an ONNX segmentation model (NCHW float input, single-channel mask output)
    pub path: Option<PathBuf>,
    /// Square input size expected by the model
    pub target_size: u32,
    /// Per-channel normalisation mean (RGB, 0-1 range)
    pub normalization_mean: [f32; 3],
    /// Per-channel normalisation standard deviation (RGB)
    pub normalization_std: [f32; 3],
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: None,
            target_size: 1024,
            normalization_mean: [0.485, 0.456, 0.406],
            normalization_std: [0.229, 0.224, 0.225],
        }
    }
}

impl ModelConfig {
    /// Preprocessing parameters derived from this model configuration
    #[must_use]
    pub fn preprocessing(&self) -> PreprocessingConfig {
        PreprocessingConfig {
            target_size: [self.target_size, self.target_size],
            normalization_mean: self.normalization_mean,
            normalization_std: self.normalization_std,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_size == 0 {
            return Err(EraserError::invalid_config(
                "Model target size must be positive",
            ));
        }
        if self.normalization_std.iter().any(|s| *s <= 0.0 || !s.is_finite()) {
            return Err(EraserError::invalid_config(
                "Model normalization std values must be positive",
            ));
        }
        Ok(())
    }
}

/// Application configuration shared by every session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Page layout variant
    pub layout: LayoutVariant,

    /// Preview bounds override (None = layout default)
    pub preview_bounds: Option<PreviewBounds>,

    /// Page title
    pub title: String,

    /// Page subtitle
    pub subtitle: String,

    /// Accent colour used by the page styling
    pub accent_color: String,

    /// JPEG quality (1-100)
    pub jpeg_quality: u8,

    /// Background colour for JPEG flattening
    pub background_color: BackgroundColor,

    /// Prefix for exported file names
    pub export_prefix: String,

    /// Progress presentation mode
    pub progress_mode: ProgressMode,

    /// Model settings
    pub model: ModelConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            layout: LayoutVariant::default(),
            preview_bounds: None,
            title: "✂️ AI Background Remover".to_string(),
            subtitle: "Transform your images by removing backgrounds instantly using AI"
                .to_string(),
            accent_color: "#4c85f2".to_string(),
            jpeg_quality: 90,
            background_color: BackgroundColor::WHITE,
            export_prefix: "processed_image".to_string(),
            progress_mode: ProgressMode::default(),
            model: ModelConfig::default(),
        }
    }
}

impl AppConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use bg_eraser::{AppConfig, LayoutVariant};
    ///
    /// let config = AppConfig::builder()
    ///     .layout(LayoutVariant::Stacked)
    ///     .jpeg_quality(85)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.effective_preview_bounds().max_width, 400);
    /// ```
    #[must_use]
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Preview bounds in effect: the explicit override or the layout default
    #[must_use]
    pub fn effective_preview_bounds(&self) -> PreviewBounds {
        self.preview_bounds
            .unwrap_or_else(|| self.layout.preview_bounds())
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - JPEG quality outside 1-100
    /// - Zero preview bounds
    /// - Empty export prefix or one containing path separators
    /// - Malformed accent colour
    /// - Invalid model settings
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(EraserError::config_value_error(
                "JPEG quality",
                self.jpeg_quality,
                "1-100",
                Some(90),
            ));
        }

        if let Some(bounds) = &self.preview_bounds {
            bounds.validate()?;
        }

        if self.export_prefix.trim().is_empty() {
            return Err(EraserError::invalid_config("Export prefix must not be empty"));
        }
        if self
            .export_prefix
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':' | '\0'))
        {
            return Err(EraserError::invalid_config(format!(
                "Export prefix '{}' must not contain path separators",
                self.export_prefix
            )));
        }

        BackgroundColor::from_hex(&self.accent_color)?;
        self.model.validate()
    }

    /// Load and validate a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| EraserError::file_io_error("read config file", path, &e))?;
        Self::from_json_str(&content)
    }

    /// Parse and validate a configuration from JSON text
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| EraserError::invalid_config(format!("Malformed config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EraserError::invalid_config(format!("Failed to serialize config: {e}")))
    }
}

/// Builder for `AppConfig`
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    /// Start from an existing configuration (e.g. one loaded from disk)
    #[must_use]
    pub fn from_config(config: AppConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn layout(mut self, layout: LayoutVariant) -> Self {
        self.config.layout = layout;
        self
    }

    #[must_use]
    pub fn preview_bounds(mut self, max_width: u32, max_height: u32) -> Self {
        self.config.preview_bounds = Some(PreviewBounds::new(max_width, max_height));
        self
    }

    #[must_use]
    pub fn title<S: Into<String>>(mut self, title: S) -> Self {
        self.config.title = title.into();
        self
    }

    #[must_use]
    pub fn subtitle<S: Into<String>>(mut self, subtitle: S) -> Self {
        self.config.subtitle = subtitle.into();
        self
    }

    #[must_use]
    pub fn accent_color<S: Into<String>>(mut self, color: S) -> Self {
        self.config.accent_color = color.into();
        self
    }

    /// Set JPEG quality (clamped to 1-100)
    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    #[must_use]
    pub fn background_color(mut self, color: BackgroundColor) -> Self {
        self.config.background_color = color;
        self
    }

    #[must_use]
    pub fn export_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.export_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn progress_mode(mut self, mode: ProgressMode) -> Self {
        self.config.progress_mode = mode;
        self
    }

    #[must_use]
    pub fn model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.model.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn model(mut self, model: ModelConfig) -> Self {
        self.config.model = model;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<AppConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}
