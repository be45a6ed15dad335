//! Subscriber setup for the `bg-eraser` binary
//!
//! The library only emits `tracing` spans and events (and `log` records from
//! the small services); installing a subscriber is the application's job.

use std::str::FromStr;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// How log lines are rendered on stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingFormat {
    /// Coloured, one line per event
    #[default]
    Console,
    /// No ANSI colours, for CI logs and redirected output
    Plain,
    /// One JSON object per event, including the active spans
    #[cfg(feature = "tracing-json")]
    Json,
}

impl FromStr for TracingFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "plain" => Ok(Self::Plain),
            #[cfg(feature = "tracing-json")]
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

#[derive(Debug, Default)]
pub struct TracingConfig {
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Explicit filter directives; `RUST_LOG` and verbosity are ignored when set
    pub env_filter: Option<String>,
    pub session_id: Option<String>,
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `-v` count from the command line
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Level for this crate's own targets
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Directives used when neither an explicit filter nor `RUST_LOG` is set.
    /// Dependencies (tract in particular) stay at `warn` below `-vv`.
    #[must_use]
    pub fn default_directives(&self) -> String {
        let crate_level = self.verbosity_to_filter();
        let deps_level = if self.verbosity >= 2 { "debug" } else { "warn" };
        format!("{deps_level},bg_eraser={crate_level}")
    }

    fn filter(&self) -> anyhow::Result<EnvFilter> {
        if let Some(directives) = &self.env_filter {
            return Ok(EnvFilter::try_new(directives)?);
        }
        match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(directives) if !directives.trim().is_empty() => Ok(EnvFilter::try_new(directives)?),
            _ => Ok(EnvFilter::try_new(self.default_directives())?),
        }
    }

    fn output_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let base = fmt::layer().with_target(false).with_writer(std::io::stderr);
        match self.format {
            TracingFormat::Console => base.with_ansi(true).compact().boxed(),
            TracingFormat::Plain => base.with_ansi(false).compact().boxed(),
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => base
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .boxed(),
        }
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directives
    /// - A global subscriber is already installed
    pub fn init(self) -> anyhow::Result<()> {
        let filter = self.filter()?;
        Registry::default()
            .with(self.output_layer())
            .with(filter)
            .try_init()?;

        if let Some(session_id) = &self.session_id {
            tracing::debug!(session_id = %session_id, format = ?self.format, "Tracing initialized");
        }
        Ok(())
    }
}

/// Spans shared by the CLI run loop
pub mod spans {
    use tracing::{info_span, Span};

    /// One CLI run: every input goes through the same session
    pub fn session(session_id: &str, remover: &str) -> Span {
        info_span!("session", session_id = %session_id, remover = %remover)
    }

    pub fn file_processing(file_path: &std::path::Path) -> Span {
        info_span!("input", path = %file_path.display())
    }
}
