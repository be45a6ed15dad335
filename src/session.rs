//! Session state machine
//!
//! Tracks the current upload, its processed result and whether processing is
//! complete. The phase is derived from the stored fields, so a `Complete`
//! session always holds a result computed for the current upload.
//!
//! ```text
//! Empty --upload--> AwaitingProcessing --commit(ok)--> Complete
//!                     ^     |  commit(err) keeps waiting   |
//!                     +-----+------- upload(new) ----------+
//! ```

use crate::{
    error::{EraserError, Result},
    types::{ImageIdentity, ResultImage, SourceImage},
};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No upload yet
    Empty,
    /// An upload is present without a result for it
    AwaitingProcessing,
    /// The result for the current upload is available
    Complete,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::AwaitingProcessing => write!(f, "awaiting processing"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// What an upload did to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// First upload of the session
    New,
    /// A different image replaced the previous one; any result was cleared
    Replaced { previous: ImageIdentity },
    /// Same content as the current upload; nothing changed
    Unchanged,
}

/// Permission to process one specific upload
#[derive(Debug, Clone)]
pub struct ProcessingTicket {
    identity: ImageIdentity,
    image: Arc<DynamicImage>,
}

impl ProcessingTicket {
    #[must_use]
    pub fn identity(&self) -> &ImageIdentity {
        &self.identity
    }

    /// Shared source bitmap to process
    #[must_use]
    pub fn image(&self) -> Arc<DynamicImage> {
        Arc::clone(&self.image)
    }
}

/// Result of asking to process the current upload
#[derive(Debug, Clone)]
pub enum ProcessingStart {
    /// Run the model for this ticket
    Ticket(ProcessingTicket),
    /// The current upload already has a result
    AlreadyComplete,
    /// A job for the current upload is already running
    InFlight(ImageIdentity),
}

/// What committing a processing outcome did to the session
#[derive(Debug)]
pub enum CommitOutcome {
    /// Result stored; the session is `Complete`
    Completed,
    /// Processing failed; the session stays `AwaitingProcessing`
    Failed(EraserError),
    /// The ticket belongs to an upload that has since been replaced
    Stale,
    /// A result for this upload was already stored
    AlreadyComplete,
}

/// Serializable view of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub identity: Option<ImageIdentity>,
    pub file_name: Option<String>,
    pub source_dimensions: Option<(u32, u32)>,
    pub result_dimensions: Option<(u32, u32)>,
    pub uploads: u64,
    /// Whether a job for the current upload is running
    #[serde(default)]
    pub in_flight: bool,
}

/// Per-session upload and result state
#[derive(Debug, Default)]
pub struct SessionState {
    source: Option<SourceImage>,
    result: Option<ResultImage>,
    uploads: u64,
    in_flight: Option<ImageIdentity>,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        match (&self.source, &self.result) {
            (None, _) => SessionPhase::Empty,
            (Some(source), Some(result)) if source.identity() == result.identity() => {
                SessionPhase::Complete
            },
            (Some(_), _) => SessionPhase::AwaitingProcessing,
        }
    }

    #[must_use]
    pub fn source(&self) -> Option<&SourceImage> {
        self.source.as_ref()
    }

    #[must_use]
    pub fn result(&self) -> Option<&ResultImage> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn current_identity(&self) -> Option<&ImageIdentity> {
        self.source.as_ref().map(SourceImage::identity)
    }

    /// Identity of the upload a job is currently running for
    #[must_use]
    pub fn in_flight(&self) -> Option<&ImageIdentity> {
        self.in_flight.as_ref()
    }

    /// Number of uploads received, including unchanged re-uploads
    #[must_use]
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    /// Record an upload
    ///
    /// Re-uploading the current content is a no-op. A different image clears
    /// the stored result.
    pub fn upload(&mut self, source: SourceImage) -> UploadOutcome {
        self.uploads += 1;

        let previous = match self.current_identity() {
            Some(current) if current == source.identity() => return UploadOutcome::Unchanged,
            Some(current) => Some(current.clone()),
            None => None,
        };

        self.result = None;
        self.in_flight = None;
        self.source = Some(source);

        match previous {
            Some(previous) => UploadOutcome::Replaced { previous },
            None => UploadOutcome::New,
        }
    }

    /// Take a ticket for processing the current upload
    ///
    /// At most one ticket is outstanding per upload. It is returned through
    /// [`commit`](Self::commit) or [`release`](Self::release).
    ///
    /// # Errors
    /// - `InvalidState` when nothing has been uploaded
    pub fn begin_processing(&mut self) -> Result<ProcessingStart> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| EraserError::invalid_state("No image has been uploaded"))?;

        if self.phase() == SessionPhase::Complete {
            return Ok(ProcessingStart::AlreadyComplete);
        }
        if let Some(identity) = &self.in_flight {
            return Ok(ProcessingStart::InFlight(identity.clone()));
        }

        let identity = source.identity().clone();
        self.in_flight = Some(identity.clone());
        Ok(ProcessingStart::Ticket(ProcessingTicket {
            identity,
            image: source.shared_image(),
        }))
    }

    /// Give back a ticket whose job ended without a commit
    ///
    /// Has no effect once the upload was replaced or another ticket was issued.
    pub fn release(&mut self, ticket_identity: &ImageIdentity) {
        if self.in_flight.as_ref() == Some(ticket_identity) {
            self.in_flight = None;
        }
    }

    /// Apply a processing outcome
    ///
    /// Outcomes for a replaced upload are dropped without touching the state.
    pub fn commit(
        &mut self,
        ticket: &ProcessingTicket,
        outcome: Result<ResultImage>,
    ) -> CommitOutcome {
        self.release(&ticket.identity);
        if self.current_identity() != Some(&ticket.identity) {
            return CommitOutcome::Stale;
        }
        if self.phase() == SessionPhase::Complete {
            return CommitOutcome::AlreadyComplete;
        }

        match outcome {
            Ok(result) if result.identity() == &ticket.identity => {
                self.result = Some(result);
                CommitOutcome::Completed
            },
            Ok(_) => CommitOutcome::Stale,
            Err(error) => CommitOutcome::Failed(error),
        }
    }

    /// Result of the current upload, if processing has completed
    ///
    /// # Errors
    /// - `InvalidState` unless the session is `Complete`
    pub fn completed_result(&self) -> Result<&ResultImage> {
        match (self.phase(), &self.result) {
            (SessionPhase::Complete, Some(result)) => Ok(result),
            (phase, _) => Err(EraserError::invalid_state(format!(
                "No processed result available (session is {phase})"
            ))),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase(),
            identity: self.current_identity().cloned(),
            file_name: self
                .source
                .as_ref()
                .and_then(|s| s.file_name().map(ToString::to_string)),
            source_dimensions: self.source.as_ref().map(SourceImage::dimensions),
            result_dimensions: self.result.as_ref().map(ResultImage::dimensions),
            uploads: self.uploads,
            in_flight: self.in_flight.is_some(),
        }
    }

    /// Drop the upload and result, returning to `Empty`
    pub fn clear(&mut self) {
        self.source = None;
        self.result = None;
        self.in_flight = None;
    }
}
