//! Background eraser CLI
//!
//! Uploads each input into one session, removes its background and writes the
//! requested exports. Identical inputs reuse the session's result instead of
//! running the model again.

use super::config::CliConfigBuilder;
use crate::{
    config::{AppConfig, ExportFormat},
    error::EraserError,
    processor::{ProcessOutcome, SessionContext},
    remover::BackgroundRemover,
    services::{
        ChannelProgressReporter, ConsoleProgressReporter, ExportArtifact, ExportEncoder,
        ProgressEvent, ProgressReporter, ProgressUpdate, UploadService,
    },
    session::UploadOutcome,
    tracing_config::{spans, TracingConfig, TracingFormat},
    types::DisplayImage,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn, Instrument};

/// Remove image backgrounds and export PNG/JPEG cut-outs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bg-eraser")]
pub struct Cli {
    /// Input images (JPEG or PNG)
    #[arg(value_name = "INPUT", required = true)]
    pub input: Vec<PathBuf>,

    /// Directory for exports and previews
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Export format
    #[arg(short, long, value_enum, default_value_t = CliExportFormat::Both)]
    pub format: CliExportFormat,

    /// Path to an ONNX segmentation model
    #[arg(short, long, value_name = "ONNX")]
    pub model: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Export file name prefix [default: processed_image]
    #[arg(long)]
    pub prefix: Option<String>,

    /// JPEG quality (1-100) [default: 90]
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: Option<u8>,

    /// Background colour for JPEG export, as #rrggbb [default: #ffffff]
    #[arg(long, value_name = "COLOR")]
    pub background: Option<String>,

    /// Page layout, which selects the default preview size
    #[arg(long, value_enum)]
    pub layout: Option<CliLayout>,

    /// Also save original and result previews as PNG
    #[arg(long)]
    pub previews: bool,

    /// Print the session snapshot as JSON after each input
    #[arg(long)]
    pub json: bool,

    /// Log output: console, plain or json (json needs the tracing-json feature)
    #[arg(long, value_name = "FORMAT", default_value = "console")]
    pub log_format: TracingFormat,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliExportFormat {
    Png,
    Jpeg,
    Both,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLayout {
    Columns,
    Stacked,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    let session_id = uuid::Uuid::new_v4().to_string();

    TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(cli.log_format)
        .with_session_id(session_id.clone())
        .init()
        .context("Failed to initialize tracing subscriber")?;

    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    let remover = create_remover(&config)?;
    let formats = CliConfigBuilder::export_formats(cli.format);

    // Progress bar on a terminal, plain log lines when stderr is redirected
    let (reporter, progress_task) = if std::io::stderr().is_terminal() {
        let (reporter, receiver) = ChannelProgressReporter::channel();
        let reporter: Arc<dyn ProgressReporter> = Arc::new(reporter);
        (reporter, Some(tokio::spawn(drive_progress_bar(receiver))))
    } else {
        let reporter: Arc<dyn ProgressReporter> =
            Arc::new(ConsoleProgressReporter::new(cli.verbose > 0));
        (reporter, None)
    };
    let session = SessionContext::new(config, remover)
        .context("Failed to create session")?
        .with_reporter(reporter);
    let span = spans::session(&session_id, session.adapter().remover_name());

    let failed = async {
        info!(title = %session.config().title, "Starting session");
        let mut failed = 0usize;
        for input in &cli.input {
            let result = process_input(&cli, &session, input, &formats)
                .instrument(spans::file_processing(input))
                .await;
            if let Err(e) = result {
                failed += 1;
                error!("{}: {}", input.display(), e.user_message());
            }
        }
        info!(
            model_runs = session.adapter().invocations(),
            inputs = cli.input.len(),
            failed,
            "Session finished"
        );
        failed
    }
    .instrument(span)
    .await;

    // Closing the session closes the progress channel
    drop(session);
    if let Some(progress_task) = progress_task {
        if let Err(e) = progress_task.await {
            warn!("Progress display task failed: {e}");
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} input(s) failed", cli.input.len());
    }
    Ok(())
}

/// Build the model backend named by the configuration
#[cfg(feature = "tract")]
fn create_remover(config: &AppConfig) -> Result<Arc<dyn BackgroundRemover>> {
    let path = config.model.path.as_ref().context(
        "No model specified. Pass --model <file.onnx> or set model.path in the config file",
    )?;
    let remover = crate::backends::TractRemover::from_path(path, config.model.preprocessing())
        .with_context(|| format!("Failed to load model {}", path.display()))?;
    Ok(Arc::new(remover))
}

#[cfg(not(feature = "tract"))]
fn create_remover(_config: &AppConfig) -> Result<Arc<dyn BackgroundRemover>> {
    anyhow::bail!("No model backend enabled. Please rebuild with --features tract")
}

async fn process_input(
    cli: &Cli,
    session: &SessionContext,
    input: &Path,
    formats: &[ExportFormat],
) -> crate::Result<()> {
    let (bytes, file_name) = UploadService::read_file(input)?;
    let report = session.upload(&bytes, file_name.as_deref())?;

    match report.outcome {
        UploadOutcome::Unchanged => {
            info!("Same image as the current upload; reusing its result");
        },
        _ => info!(
            "Uploaded {} {}x{}",
            report.format, report.dimensions.0, report.dimensions.1
        ),
    }

    if cli.previews {
        save_preview(&report.preview, &preview_name(input, "original"), &cli.output_dir)?;
    }

    match session.process().await? {
        ProcessOutcome::Completed { elapsed_ms, .. } => {
            info!("Background removed in {elapsed_ms}ms");
        },
        ProcessOutcome::AlreadyComplete => {},
        ProcessOutcome::InProgress { .. } => {
            return Err(EraserError::invalid_state(
                "Image is still being processed by another job",
            ));
        },
        ProcessOutcome::Discarded => {
            return Err(EraserError::invalid_state(
                "Result was discarded before it could be exported",
            ));
        },
    }

    let timestamp = chrono::Local::now().naive_local();
    for format in formats {
        let artifact = session.export_at(*format, &timestamp)?;
        let path = artifact.save_to_dir(&cli.output_dir)?;
        println!("💾 {}", path.display());
    }

    if cli.previews {
        save_preview(
            &session.result_preview()?,
            &preview_name(input, "result"),
            &cli.output_dir,
        )?;
    }

    if cli.json {
        let snapshot = serde_json::to_string_pretty(&session.snapshot()?)
            .map_err(|e| EraserError::encode(format!("Failed to serialize snapshot: {e}")))?;
        println!("{snapshot}");
    }

    Ok(())
}

fn preview_name(input: &Path, kind: &str) -> String {
    let stem = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("image");
    format!("{stem}_{kind}_preview.png")
}

fn save_preview(preview: &DisplayImage, file_name: &str, dir: &Path) -> crate::Result<()> {
    let artifact = ExportArtifact {
        format: ExportFormat::Png,
        file_name: file_name.to_string(),
        mime_type: ExportEncoder::mime_type(ExportFormat::Png),
        bytes: ExportEncoder::to_png(&preview.image().to_rgba8())?,
    };
    let path = artifact.save_to_dir(dir)?;
    println!("🖼️  {}", path.display());
    Ok(())
}

/// Render progress events: a spinner while no percentage is known, a bar otherwise
async fn drive_progress_bar(mut receiver: UnboundedReceiver<ProgressUpdate>) {
    let spinner_style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let bar_style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");

    let mut bar: Option<ProgressBar> = None;

    while let Some(update) = receiver.recv().await {
        match &update.event {
            ProgressEvent::Started => {
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(spinner_style.clone());
                spinner.enable_steady_tick(Duration::from_millis(100));
                spinner.set_message(update.event.description());
                bar = Some(spinner);
            },
            ProgressEvent::Percentage(percent) => {
                if let Some(bar) = &bar {
                    if bar.length().is_none() {
                        bar.set_length(100);
                        bar.set_style(bar_style.clone());
                    }
                    bar.set_position(u64::from(*percent));
                }
            },
            event => {
                if let Some(bar) = bar.take() {
                    bar.finish_and_clear();
                }
                match event {
                    ProgressEvent::Succeeded => {
                        info!("✅ {} ({}ms)", event.description(), update.elapsed_ms);
                    },
                    ProgressEvent::Discarded => warn!("{}", event.description()),
                    _ => error!("❌ {}", event.description()),
                }
            },
        }
    }

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
}
