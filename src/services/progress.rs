//! Progress reporting service
//!
//! Separates progress reporting from the processing pipeline so each frontend
//! can present it its own way. Percentages only ever come from a backend's real
//! work; a backend that reports none yields just the start and terminal events,
//! which frontends show as an indeterminate busy indicator.

use crate::{config::ProgressMode, types::ImageIdentity};
use instant::Instant;
use std::sync::{
    atomic::{AtomicBool, AtomicU8, Ordering},
    Arc,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Discrete processing events for one upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Removal was started
    Started,
    /// Backend-reported completion percentage (0-100)
    Percentage(u8),
    /// Result committed to the session
    Succeeded,
    /// Removal failed; the session keeps waiting for a retry
    Failed(String),
    /// Result arrived after a newer upload and was dropped
    Discarded,
}

impl ProgressEvent {
    /// Whether no further events follow for this job
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_) | Self::Discarded)
    }

    /// Short human-readable description
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Started => "Removing background...".to_string(),
            Self::Percentage(p) => format!("Removing background ({p}%)"),
            Self::Succeeded => "Background removed successfully!".to_string(),
            Self::Failed(reason) => format!("Error processing image: {reason}"),
            Self::Discarded => "Discarded result for a replaced upload".to_string(),
        }
    }
}

/// Progress update for one upload
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Identity of the upload being processed
    pub identity: ImageIdentity,
    /// What happened
    pub event: ProgressEvent,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

/// Trait for receiving progress updates
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}
}

/// Console progress reporter that logs progress
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to include elapsed time and percentage events
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ConsoleProgressReporter {
    /// Log level and line for an update, or `None` when it is not shown
    #[must_use]
    pub fn render(&self, update: &ProgressUpdate) -> Option<(log::Level, String)> {
        let id = update.identity.short();
        match &update.event {
            ProgressEvent::Failed(reason) => Some((
                log::Level::Error,
                format!("❌ [{id}] Error processing image: {reason}"),
            )),
            ProgressEvent::Succeeded => Some((
                log::Level::Info,
                format!(
                    "✅ [{id}] Background removed successfully! ({}ms)",
                    update.elapsed_ms
                ),
            )),
            ProgressEvent::Percentage(_) if !self.verbose => None,
            event if self.verbose => Some((
                log::Level::Info,
                format!(
                    "[{id}] {} ({}ms elapsed)",
                    event.description(),
                    update.elapsed_ms
                ),
            )),
            event => Some((log::Level::Info, format!("[{id}] {}", event.description()))),
        }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if let Some((level, line)) = self.render(&update) {
            log::log!(level, "{line}");
        }
    }
}

/// Reporter forwarding updates over a tokio channel to a UI loop
///
/// Sends never block. Updates are dropped once the receiver is gone.
pub struct ChannelProgressReporter {
    sender: UnboundedSender<ProgressUpdate>,
}

impl ChannelProgressReporter {
    /// Create a reporter and the receiving end of its channel
    #[must_use]
    pub fn channel() -> (Self, UnboundedReceiver<ProgressUpdate>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressReporter for ChannelProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.sender.send(update).is_err() {
            log::trace!("Progress receiver dropped; update discarded");
        }
    }
}

/// Per-job handle given to backends for reporting progress
///
/// Cloning shares the monotonic percentage guard, so clones never report a
/// lower percentage than any earlier report. Clones also share the terminal
/// guard: only the first of succeeded, failed or discarded is emitted.
#[derive(Clone)]
pub struct ProgressHandle {
    identity: ImageIdentity,
    reporter: Arc<dyn ProgressReporter>,
    start_time: Instant,
    last_percentage: Arc<AtomicU8>,
    finished: Arc<AtomicBool>,
    report_percentages: bool,
}

impl ProgressHandle {
    #[must_use]
    pub fn new(
        identity: ImageIdentity,
        reporter: Arc<dyn ProgressReporter>,
        mode: ProgressMode,
    ) -> Self {
        Self {
            identity,
            reporter,
            start_time: Instant::now(),
            last_percentage: Arc::new(AtomicU8::new(0)),
            finished: Arc::new(AtomicBool::new(false)),
            report_percentages: mode == ProgressMode::Reported,
        }
    }

    /// Handle that reports nowhere
    #[must_use]
    pub fn detached(identity: ImageIdentity) -> Self {
        Self::new(
            identity,
            Arc::new(NoOpProgressReporter),
            ProgressMode::Indeterminate,
        )
    }

    #[must_use]
    pub fn identity(&self) -> &ImageIdentity {
        &self.identity
    }

    /// Milliseconds since the handle was created
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Highest percentage reported so far
    #[must_use]
    pub fn last_percentage(&self) -> u8 {
        self.last_percentage.load(Ordering::SeqCst)
    }

    /// Whether a terminal event has been emitted
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Report a completion percentage
    ///
    /// Values above 100 are clamped. Values not above the last reported
    /// percentage are ignored, as is anything after a terminal event.
    pub fn percentage(&self, percent: u8) {
        if !self.report_percentages || self.is_finished() {
            return;
        }
        let percent = percent.min(100);
        let previous = self.last_percentage.fetch_max(percent, Ordering::SeqCst);
        if percent > previous {
            self.emit(ProgressEvent::Percentage(percent));
        }
    }

    pub fn started(&self) {
        self.emit(ProgressEvent::Started);
    }

    pub fn succeeded(&self) {
        self.finish(ProgressEvent::Succeeded);
    }

    pub fn failed(&self, reason: impl Into<String>) {
        self.finish(ProgressEvent::Failed(reason.into()));
    }

    pub fn discarded(&self) {
        self.finish(ProgressEvent::Discarded);
    }

    fn finish(&self, event: ProgressEvent) {
        if !self.finished.swap(true, Ordering::SeqCst) {
            self.emit(event);
        }
    }

    fn emit(&self, event: ProgressEvent) {
        self.reporter.report_progress(ProgressUpdate {
            identity: self.identity.clone(),
            event,
            elapsed_ms: self.elapsed_ms(),
        });
    }
}

impl std::fmt::Debug for ProgressHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressHandle")
            .field("identity", &self.identity.short())
            .field("last_percentage", &self.last_percentage())
            .field("finished", &self.is_finished())
            .field("report_percentages", &self.report_percentages)
            .finish()
    }
}
