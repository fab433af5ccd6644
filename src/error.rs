//! Typed failures for the per-image workflow.
//!
//! Infrastructure code returns `anyhow::Result`; [`ImageProcessor`]
//! narrows those into [`ProcessError`] so that bulk runs and the CLI can
//! report a stable error code per attachment.
//!
//! [`ImageProcessor`]: crate::processor::ImageProcessor

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    /// Missing attachment, or one whose MIME type is not `image/*`.
    #[error("invalid_attachment: {0} is not an image attachment")]
    InvalidAttachment(i64),

    /// The attachment has no file path, or nothing exists at it.
    #[error("file_not_found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Alt text is already present.
    #[error("already_processed: attachment {0} already has alt text")]
    AlreadyProcessed(i64),

    /// Fingerprinting or the AI provider failed.
    #[error(transparent)]
    Collaborator(anyhow::Error),

    #[error("storage_error: {0:#}")]
    Storage(anyhow::Error),
}

impl ProcessError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ProcessError::InvalidAttachment(_) => "invalid_attachment",
            ProcessError::FileNotFound(_) => "file_not_found",
            ProcessError::AlreadyProcessed(_) => "already_processed",
            ProcessError::Collaborator(_) => "collaborator_error",
            ProcessError::Storage(_) => "storage_error",
        }
    }
}
