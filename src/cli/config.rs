//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliExportFormat, CliLayout};
use crate::config::{AppConfig, AppConfigBuilder, BackgroundColor, ExportFormat, LayoutVariant};
use anyhow::{Context, Result};

/// Convert CLI arguments into an `AppConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the configuration: config file (or defaults), then CLI overrides
    pub(crate) fn from_cli(cli: &Cli) -> Result<AppConfig> {
        let base = match &cli.config {
            Some(path) => AppConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => AppConfig::default(),
        };

        let mut builder = AppConfigBuilder::from_config(base);

        if let Some(layout) = cli.layout {
            builder = builder.layout(match layout {
                CliLayout::Columns => LayoutVariant::Columns,
                CliLayout::Stacked => LayoutVariant::Stacked,
            });
        }
        if let Some(prefix) = &cli.prefix {
            builder = builder.export_prefix(prefix.clone());
        }
        if let Some(quality) = cli.jpeg_quality {
            builder = builder.jpeg_quality(quality);
        }
        if let Some(background) = &cli.background {
            let color = BackgroundColor::from_hex(background)
                .context("Invalid --background colour")?;
            builder = builder.background_color(color);
        }
        if let Some(model) = &cli.model {
            builder = builder.model_path(model.clone());
        }

        builder.build().context("Invalid configuration")
    }

    /// Export formats requested on the command line
    pub(crate) fn export_formats(format: CliExportFormat) -> Vec<ExportFormat> {
        match format {
            CliExportFormat::Png => vec![ExportFormat::Png],
            CliExportFormat::Jpeg => vec![ExportFormat::Jpeg],
            CliExportFormat::Both => vec![ExportFormat::Png, ExportFormat::Jpeg],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("bg-eraser").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["photo.jpg"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config, AppConfig::default());
        assert_eq!(
            CliConfigBuilder::export_formats(cli.format),
            vec![ExportFormat::Png, ExportFormat::Jpeg]
        );
    }

    #[test]
    fn test_overrides_applied() {
        let cli = parse(&[
            "--layout",
            "stacked",
            "--prefix",
            "cutout",
            "--jpeg-quality",
            "70",
            "--background",
            "#102030",
            "--model",
            "model.onnx",
            "-f",
            "jpeg",
            "a.png",
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.layout, LayoutVariant::Stacked);
        assert_eq!(config.export_prefix, "cutout");
        assert_eq!(config.jpeg_quality, 70);
        assert_eq!(config.background_color, BackgroundColor::new(0x10, 0x20, 0x30));
        assert_eq!(
            config.model.path.as_deref(),
            Some(std::path::Path::new("model.onnx"))
        );
        assert_eq!(
            CliConfigBuilder::export_formats(cli.format),
            vec![ExportFormat::Jpeg]
        );
    }

    #[test]
    fn test_invalid_background_rejected() {
        let cli = parse(&["--background", "blue", "a.png"]);
        assert!(CliConfigBuilder::from_cli(&cli).is_err());
    }

    #[test]
    fn test_config_file_then_cli_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"export_prefix": "from_file", "jpeg_quality": 60}}"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = parse(&["--config", &path, "--jpeg-quality", "80", "a.png"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.export_prefix, "from_file");
        assert_eq!(config.jpeg_quality, 80);
    }

    #[test]
    fn test_input_required() {
        assert!(Cli::try_parse_from(["bg-eraser"]).is_err());
    }
}
