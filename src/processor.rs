//! Per-session processing context
//!
//! [`SessionContext`] is the object a frontend holds for one user or
//! connection. It owns the session state, the removal adapter, the
//! configuration and the progress reporter; there is no global state.
//!
//! Processing runs as a background tokio task. When it finishes, the task
//! re-acquires the session lock and commits the outcome, so the identity check
//! and the state change happen atomically. A result for an upload that has
//! since been replaced is discarded.

use crate::{
    config::{AppConfig, ExportFormat},
    error::{EraserError, Result},
    remover::{BackgroundRemover, RemovalAdapter},
    services::{
        ExportArtifact, ExportEncoder, ImageResizer, NoOpProgressReporter, ProgressHandle,
        ProgressReporter, UploadService,
    },
    session::{
        CommitOutcome, ProcessingStart, ProcessingTicket, SessionPhase, SessionSnapshot,
        SessionState, UploadOutcome,
    },
    types::{DisplayImage, ImageIdentity, ResultImage, UploadFormat},
};
use chrono::NaiveDateTime;
use image::DynamicImage;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

/// Summary of an accepted upload
#[derive(Debug, Clone)]
pub struct UploadReport {
    pub outcome: UploadOutcome,
    pub identity: ImageIdentity,
    pub format: UploadFormat,
    pub dimensions: (u32, u32),
    pub phase: SessionPhase,
    /// Display copy fitted to the configured preview bounds
    pub preview: DisplayImage,
}

/// How a processing job ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The result was committed
    Completed {
        identity: ImageIdentity,
        dimensions: (u32, u32),
        elapsed_ms: u64,
    },
    /// The current upload already had a result; the model was not run
    AlreadyComplete,
    /// Another job is already processing the current upload; no second run was started
    InProgress { identity: ImageIdentity },
    /// The upload was replaced (or the job cancelled) before the result arrived
    Discarded,
}

/// Handle to an in-flight processing task
#[derive(Debug)]
pub struct ProcessingJob {
    identity: ImageIdentity,
    handle: JoinHandle<Result<ProcessOutcome>>,
    state: Arc<Mutex<SessionState>>,
    progress: ProgressHandle,
}

impl ProcessingJob {
    /// Identity of the upload being processed
    #[must_use]
    pub fn identity(&self) -> &ImageIdentity {
        &self.identity
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the job to finish
    ///
    /// # Errors
    /// - `Processing` when the removal failed; the session stays awaiting processing
    pub async fn wait(mut self) -> Result<ProcessOutcome> {
        match (&mut self.handle).await {
            Ok(outcome) => outcome,
            Err(join_error) if join_error.is_cancelled() => Ok(ProcessOutcome::Discarded),
            Err(join_error) => {
                self.release();
                let error =
                    EraserError::processing(format!("Processing task failed: {join_error}"));
                self.progress.failed(error.to_string());
                Err(error)
            },
        }
    }

    /// Stop waiting for the job; its result will not be committed
    ///
    /// The session can start a new job for the upload right away. A model call
    /// already running on the blocking pool finishes in the background and its
    /// output is dropped.
    pub fn cancel(&self) {
        debug!(identity = %self.identity.short(), "Cancelling processing job");
        self.handle.abort();
        self.release();
        self.progress.discarded();
    }

    fn release(&self) {
        match lock_state(&self.state) {
            Ok(mut state) => state.release(&self.identity),
            Err(e) => warn!(error = %e, "Could not release processing slot"),
        }
    }
}

/// One user's session: upload, process, preview and export
pub struct SessionContext {
    config: AppConfig,
    adapter: RemovalAdapter,
    state: Arc<Mutex<SessionState>>,
    reporter: Arc<dyn ProgressReporter>,
}

impl SessionContext {
    /// Create a session around a remover
    ///
    /// # Errors
    /// - `InvalidConfig` when the configuration fails validation
    ///
    /// # Examples
    /// ```rust,no_run
    /// use bg_eraser::{AppConfig, ExportFormat, SessionContext};
    /// # use bg_eraser::BackgroundRemover;
    /// # async fn example(remover: std::sync::Arc<dyn BackgroundRemover>) -> bg_eraser::Result<()> {
    /// let session = SessionContext::new(AppConfig::default(), remover)?;
    /// let bytes = std::fs::read("portrait.png")?;
    /// session.upload(&bytes, Some("portrait.png"))?;
    /// session.process().await?;
    /// let png = session.export(ExportFormat::Png)?;
    /// png.save_to_dir("out")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: AppConfig, remover: Arc<dyn BackgroundRemover>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            adapter: RemovalAdapter::new(remover),
            state: Arc::new(Mutex::new(SessionState::new())),
            reporter: Arc::new(NoOpProgressReporter),
        })
    }

    /// Replace the progress reporter
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn adapter(&self) -> &RemovalAdapter {
        &self.adapter
    }

    /// Validate, decode and record an upload
    ///
    /// Rejected uploads leave the session untouched.
    ///
    /// # Errors
    /// - `UnsupportedFormat` or `Decode` for unusable uploads
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    pub fn upload(&self, bytes: &[u8], file_name: Option<&str>) -> Result<UploadReport> {
        let source = UploadService::load(bytes, file_name)?;
        let preview = ImageResizer::fit_to_bounds(source.image(), self.config.effective_preview_bounds())?;
        let identity = source.identity().clone();
        let format = source.format();
        let dimensions = source.dimensions();

        let (outcome, phase) = {
            let mut state = self.lock()?;
            let outcome = state.upload(source);
            (outcome, state.phase())
        };

        match &outcome {
            UploadOutcome::New => info!(identity = %identity.short(), "📥 New upload"),
            UploadOutcome::Replaced { previous } => info!(
                identity = %identity.short(),
                previous = %previous.short(),
                "🔄 Upload replaced previous image"
            ),
            UploadOutcome::Unchanged => {
                debug!(identity = %identity.short(), "Re-upload of current image ignored");
            },
        }

        Ok(UploadReport {
            outcome,
            identity,
            format,
            dimensions,
            phase,
            preview,
        })
    }

    /// Start removing the background of the current upload
    ///
    /// Returns `None` when the current upload already has a result or a job
    /// for it is already running. Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// - `InvalidState` when nothing has been uploaded
    pub fn start_processing(&self) -> Result<Option<ProcessingJob>> {
        match self.begin()? {
            ProcessingStart::Ticket(ticket) => Ok(Some(self.spawn_job(ticket))),
            ProcessingStart::AlreadyComplete | ProcessingStart::InFlight(_) => Ok(None),
        }
    }

    /// Process the current upload and wait for the outcome
    ///
    /// # Errors
    /// - `InvalidState` when nothing has been uploaded
    /// - `Processing` when the removal failed
    pub async fn process(&self) -> Result<ProcessOutcome> {
        match self.begin()? {
            ProcessingStart::Ticket(ticket) => self.spawn_job(ticket).wait().await,
            ProcessingStart::AlreadyComplete => Ok(ProcessOutcome::AlreadyComplete),
            ProcessingStart::InFlight(identity) => Ok(ProcessOutcome::InProgress { identity }),
        }
    }

    #[instrument(skip(self), fields(remover = %self.adapter.remover_name()))]
    fn begin(&self) -> Result<ProcessingStart> {
        let start = self.lock()?.begin_processing()?;
        match &start {
            ProcessingStart::AlreadyComplete => debug!("Current upload already processed"),
            ProcessingStart::InFlight(identity) => {
                debug!(identity = %identity.short(), "Current upload is already being processed");
            },
            ProcessingStart::Ticket(_) => {},
        }
        Ok(start)
    }

    fn spawn_job(&self, ticket: ProcessingTicket) -> ProcessingJob {
        let identity = ticket.identity().clone();
        let progress = ProgressHandle::new(
            identity.clone(),
            Arc::clone(&self.reporter),
            self.config.progress_mode,
        );
        progress.started();
        info!(identity = %identity.short(), "🎯 Starting background removal");

        let adapter = self.adapter.clone();
        let state = Arc::clone(&self.state);
        let job_progress = progress.clone();
        let span = info_span!("processing_job", identity = %identity.short());

        let handle = tokio::spawn(
            async move {
                let outcome = adapter
                    .remove_background(ticket.image(), job_progress.clone())
                    .await;
                let dimensions = outcome.as_ref().ok().map(ResultImage::dimensions);
                finish_job(&state, &ticket, outcome, dimensions, &job_progress)
            }
            .instrument(span),
        );

        ProcessingJob {
            identity,
            handle,
            state: Arc::clone(&self.state),
            progress,
        }
    }

    /// Current session phase
    ///
    /// # Errors
    /// - `InvalidState` if the session lock is poisoned
    pub fn phase(&self) -> Result<SessionPhase> {
        Ok(self.lock()?.phase())
    }

    /// Serializable view of the session
    ///
    /// # Errors
    /// - `InvalidState` if the session lock is poisoned
    pub fn snapshot(&self) -> Result<SessionSnapshot> {
        Ok(self.lock()?.snapshot())
    }

    /// Preview of the current upload, if any
    ///
    /// # Errors
    /// - `InvalidState` if the session lock is poisoned
    pub fn source_preview(&self) -> Result<Option<DisplayImage>> {
        let image = self.lock()?.source().map(|source| source.shared_image());
        image
            .map(|image| ImageResizer::fit_to_bounds(&image, self.config.effective_preview_bounds()))
            .transpose()
    }

    /// Preview of the processed result, once complete
    ///
    /// # Errors
    /// - `InvalidState` unless the session is complete
    pub fn result_preview(&self) -> Result<DisplayImage> {
        let result = self.completed_result()?;
        ImageResizer::fit_to_bounds(
            &DynamicImage::ImageRgba8(result.into_image()),
            self.config.effective_preview_bounds(),
        )
    }

    /// Export the result using the current local time in the file name
    ///
    /// # Errors
    /// - `InvalidState` unless the session is complete
    /// - `Encode` when encoding fails
    pub fn export(&self, format: ExportFormat) -> Result<ExportArtifact> {
        self.export_at(format, &chrono::Local::now().naive_local())
    }

    /// Export the result with an explicit file name timestamp
    ///
    /// # Errors
    /// - `InvalidState` unless the session is complete
    /// - `Encode` when encoding fails
    pub fn export_at(
        &self,
        format: ExportFormat,
        timestamp: &NaiveDateTime,
    ) -> Result<ExportArtifact> {
        let result = self.completed_result()?;
        let artifact = ExportEncoder::export(&result, format, &self.config, timestamp)?;
        debug!(
            format = %format,
            file_name = %artifact.file_name,
            bytes = artifact.bytes.len(),
            "Export encoded"
        );
        Ok(artifact)
    }

    /// Export both PNG and JPEG with a shared timestamp
    ///
    /// # Errors
    /// - `InvalidState` unless the session is complete
    /// - `Encode` when encoding fails
    pub fn export_all(&self) -> Result<Vec<ExportArtifact>> {
        let timestamp = chrono::Local::now().naive_local();
        [ExportFormat::Png, ExportFormat::Jpeg]
            .into_iter()
            .map(|format| self.export_at(format, &timestamp))
            .collect()
    }

    /// Drop the current upload and result
    ///
    /// # Errors
    /// - `InvalidState` if the session lock is poisoned
    pub fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    fn completed_result(&self) -> Result<ResultImage> {
        // Clone under the lock; encoding happens outside it
        self.lock()?.completed_result().cloned()
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionState>> {
        lock_state(&self.state)
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("layout", &self.config.layout)
            .field("adapter", &self.adapter)
            .finish_non_exhaustive()
    }
}

fn lock_state(state: &Mutex<SessionState>) -> Result<MutexGuard<'_, SessionState>> {
    state
        .lock()
        .map_err(|_| EraserError::invalid_state("Session state lock poisoned"))
}

fn finish_job(
    state: &Mutex<SessionState>,
    ticket: &ProcessingTicket,
    outcome: Result<ResultImage>,
    dimensions: Option<(u32, u32)>,
    progress: &ProgressHandle,
) -> Result<ProcessOutcome> {
    let commit = match lock_state(state) {
        Ok(mut guard) => guard.commit(ticket, outcome),
        Err(e) => CommitOutcome::Failed(e),
    };

    match commit {
        CommitOutcome::Completed => {
            progress.succeeded();
            info!(elapsed_ms = progress.elapsed_ms(), "✅ Background removed");
            Ok(ProcessOutcome::Completed {
                identity: ticket.identity().clone(),
                dimensions: dimensions.unwrap_or_default(),
                elapsed_ms: progress.elapsed_ms(),
            })
        },
        CommitOutcome::AlreadyComplete => {
            progress.succeeded();
            Ok(ProcessOutcome::AlreadyComplete)
        },
        CommitOutcome::Stale => {
            progress.discarded();
            info!("Discarding result for a replaced upload");
            Ok(ProcessOutcome::Discarded)
        },
        CommitOutcome::Failed(error) => {
            progress.failed(error.to_string());
            warn!(error = %error, "❌ Background removal failed");
            Err(error)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{FailingRemover, GatedRemover, MockRemover};
    use crate::services::{ChannelProgressReporter, ProgressEvent};
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32, shade: u8) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([shade, 80, 160])));
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn session(remover: Arc<dyn BackgroundRemover>) -> SessionContext {
        SessionContext::new(AppConfig::default(), remover).unwrap()
    }

    #[tokio::test]
    async fn test_upload_process_export() {
        let context = session(Arc::new(MockRemover::new()));
        let report = context.upload(&png_bytes(400, 100, 10), Some("wide.png")).unwrap();

        assert_eq!(report.outcome, UploadOutcome::New);
        assert_eq!(report.phase, SessionPhase::AwaitingProcessing);
        assert_eq!(report.preview.dimensions(), (200, 50));

        let outcome = context.process().await.unwrap();
        assert!(matches!(
            outcome,
            ProcessOutcome::Completed { dimensions: (400, 100), .. }
        ));
        assert_eq!(context.phase().unwrap(), SessionPhase::Complete);

        let artifacts = context.export_all().unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].mime_type, "image/png");
        assert_eq!(artifacts[1].mime_type, "image/jpeg");

        assert_eq!(context.result_preview().unwrap().dimensions(), (200, 50));
    }

    #[tokio::test]
    async fn test_same_upload_is_not_reprocessed() {
        let remover = Arc::new(MockRemover::new());
        let context = session(remover.clone());
        let bytes = png_bytes(20, 20, 1);

        context.upload(&bytes, None).unwrap();
        context.process().await.unwrap();
        let report = context.upload(&bytes, None).unwrap();

        assert_eq!(report.outcome, UploadOutcome::Unchanged);
        assert_eq!(report.phase, SessionPhase::Complete);
        assert_eq!(context.process().await.unwrap(), ProcessOutcome::AlreadyComplete);
        assert_eq!(context.adapter().invocations(), 1);
        assert_eq!(remover.call_count(), 1);
    }

    #[tokio::test]
    async fn test_processing_without_upload_is_invalid_state() {
        let context = session(Arc::new(MockRemover::new()));
        let err = context.process().await.unwrap_err();
        assert!(matches!(err, EraserError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_export_before_completion_is_invalid_state() {
        let context = session(Arc::new(MockRemover::new()));
        context.upload(&png_bytes(8, 8, 3), None).unwrap();
        let err = context.export(ExportFormat::Png).unwrap_err();
        assert!(matches!(err, EraserError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_failure_leaves_session_awaiting() {
        let context = session(Arc::new(FailingRemover::processing_error()));
        context.upload(&png_bytes(8, 8, 4), None).unwrap();

        let err = context.process().await.unwrap_err();
        assert!(matches!(err, EraserError::Processing(_)));
        assert_eq!(context.phase().unwrap(), SessionPhase::AwaitingProcessing);
    }

    #[tokio::test]
    async fn test_rejected_upload_keeps_previous_state() {
        let context = session(Arc::new(MockRemover::new()));
        context.upload(&png_bytes(8, 8, 5), None).unwrap();
        context.process().await.unwrap();

        let err = context.upload(b"GIF89a\x01\x00\x01\x00", None).unwrap_err();
        assert!(matches!(err, EraserError::UnsupportedFormat(_)));
        assert_eq!(context.phase().unwrap(), SessionPhase::Complete);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stale_job_is_discarded() {
        let remover = Arc::new(GatedRemover::new());
        let (reporter, mut events) = ChannelProgressReporter::channel();
        let context = session(remover.clone()).with_reporter(Arc::new(reporter));

        context.upload(&png_bytes(8, 8, 6), None).unwrap();
        let job = context.start_processing().unwrap().unwrap();
        let stale_identity = job.identity().clone();

        context.upload(&png_bytes(8, 8, 7), None).unwrap();
        remover.release();

        assert_eq!(job.wait().await.unwrap(), ProcessOutcome::Discarded);
        assert_eq!(context.phase().unwrap(), SessionPhase::AwaitingProcessing);

        let mut stale_events = Vec::new();
        while let Ok(update) = events.try_recv() {
            if update.identity == stale_identity {
                stale_events.push(update.event);
            }
        }
        assert_eq!(stale_events.first(), Some(&ProgressEvent::Started));
        assert_eq!(stale_events.last(), Some(&ProgressEvent::Discarded));

        // The newer upload still processes normally
        assert!(matches!(
            context.process().await.unwrap(),
            ProcessOutcome::Completed { .. }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_job_is_not_committed() {
        let remover = Arc::new(GatedRemover::new());
        let (reporter, mut events) = ChannelProgressReporter::channel();
        let context = session(remover.clone()).with_reporter(Arc::new(reporter));

        context.upload(&png_bytes(8, 8, 8), None).unwrap();
        let job = context.start_processing().unwrap().unwrap();
        job.cancel();
        remover.release();

        assert_eq!(job.wait().await.unwrap(), ProcessOutcome::Discarded);
        assert_eq!(context.phase().unwrap(), SessionPhase::AwaitingProcessing);

        let mut received = Vec::new();
        while let Ok(update) = events.try_recv() {
            received.push(update.event);
        }
        assert_eq!(received, vec![ProgressEvent::Started, ProgressEvent::Discarded]);

        // The slot is free again after cancelling
        assert!(matches!(
            context.process().await.unwrap(),
            ProcessOutcome::Completed { .. }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_start_while_running_does_not_rerun_model() {
        let remover = Arc::new(GatedRemover::new());
        let context = session(remover.clone());

        context.upload(&png_bytes(8, 8, 9), None).unwrap();
        let job = context.start_processing().unwrap().unwrap();

        assert!(context.start_processing().unwrap().is_none());
        assert_eq!(
            context.process().await.unwrap(),
            ProcessOutcome::InProgress {
                identity: job.identity().clone()
            }
        );
        assert!(context.snapshot().unwrap().in_flight);

        remover.release();
        assert!(matches!(
            job.wait().await.unwrap(),
            ProcessOutcome::Completed { .. }
        ));
        assert_eq!(context.process().await.unwrap(), ProcessOutcome::AlreadyComplete);
        assert_eq!(context.adapter().invocations(), 1);
        assert_eq!(remover.call_count(), 1);
        assert!(!context.snapshot().unwrap().in_flight);
    }
}
