//! Error types for hostguard-journal

use std::path::PathBuf;

/// Result type for journal operations
pub type Result<T> = std::result::Result<T, JournalError>;

/// Errors that can occur in journal operations
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// A privileged operation was attempted on a journal opened without
    /// elevation
    #[error("{operation} requires administrative privilege")]
    Privilege { operation: &'static str },

    /// An event id that does not follow the `RRRRSSS` format
    #[error("Malformed event id '{id}': {reason}")]
    MalformedId { id: String, reason: String },

    /// A policy id that is not a 1 to 4 digit number
    #[error("Malformed policy id '{id}'")]
    MalformedPolicy { id: String },

    /// The id is already recorded with a different payload
    #[error("Event {id} is already recorded")]
    DuplicateEvent { id: String },

    /// No sequence numbers left for the policy
    #[error("Event sequence exhausted for policy {policy}")]
    SequenceExhausted { policy: String },

    /// Blank or otherwise unusable caller input
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// No patch was recorded for the event
    #[error("No patch for event {id} at {path}")]
    PatchMissing { id: String, path: PathBuf },

    /// A patch did not match the file it was applied to
    #[error("Patch rejected for {path}: {reason}")]
    PatchRejected { path: PathBuf, reason: String },

    /// The file to revert does not exist
    #[error("Revert target does not exist: {path}")]
    TargetMissing { path: PathBuf },

    /// No archived copy exists for the path
    #[error("No archived copy of {path}")]
    ArchiveMissing { path: PathBuf },

    /// An external tool is missing or exited non-zero
    #[error("External tool {program} failed: {message}")]
    ExternalTool { program: String, message: String },

    /// The event store could not be encoded
    #[error("Event store error at {path}: {message}")]
    Store { path: PathBuf, message: String },

    // Transparent wrappers for underlying crate errors
    /// Filesystem error from hostguard-fs
    #[error(transparent)]
    Fs(#[from] hostguard_fs::Error),

    /// Command execution error from hostguard-exec
    #[error(transparent)]
    Exec(#[from] hostguard_exec::ExecError),
}

impl JournalError {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// True for errors caused by caller misuse.
    ///
    /// Misuse errors are returned to the caller; every other failure is
    /// logged by the journal and reported as `Ok(false)`.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::Privilege { .. }
                | Self::MalformedId { .. }
                | Self::MalformedPolicy { .. }
                | Self::DuplicateEvent { .. }
                | Self::SequenceExhausted { .. }
        )
    }
}
