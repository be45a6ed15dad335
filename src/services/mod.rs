//! Services for upload handling, previews, export and progress reporting

pub mod format;
pub mod io;
pub mod progress;
pub mod resize;

pub use format::{ExportArtifact, ExportEncoder};
pub use io::{UploadService, SUPPORTED_EXTENSIONS};
pub use progress::{
    ChannelProgressReporter, ConsoleProgressReporter, NoOpProgressReporter, ProgressEvent,
    ProgressHandle, ProgressReporter, ProgressUpdate,
};
pub use resize::ImageResizer;
