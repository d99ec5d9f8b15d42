//! Error types for hostguard-editor

use std::path::PathBuf;

use crate::dialect::DialectKind;

/// Result type for editor operations
pub type Result<T> = std::result::Result<T, EditorError>;

/// Errors that can occur while reporting, fixing or committing
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    /// The desired data does not fit the dialect
    #[error("{dialect} dialect cannot use this data: {reason}")]
    UnsupportedData { dialect: DialectKind, reason: String },

    /// The artifact is not text
    #[error("{path} is not UTF-8 text")]
    NotText { path: PathBuf },

    /// `commit` was called without a successful `fix`
    #[error("Nothing to commit for {path}, fix has not run")]
    NotFixed { path: PathBuf },

    /// `commit` was called without a bound event id
    #[error("No event id bound for {path}")]
    NoEventId { path: PathBuf },

    /// The journal declined to record the change
    #[error("Change to {path} could not be recorded")]
    NotRecorded { path: PathBuf },

    /// An OS tool is missing or exited non-zero
    #[error("{program} failed: {message}")]
    Tool { program: String, message: String },

    /// A `defaults` expectation is not a valid regular expression
    #[error("Invalid pattern for {key}: {source}")]
    Pattern {
        key: String,
        #[source]
        source: regex::Error,
    },

    // Transparent wrappers for underlying crate errors
    #[error(transparent)]
    Fs(#[from] hostguard_fs::Error),

    #[error(transparent)]
    Journal(#[from] hostguard_journal::JournalError),

    #[error(transparent)]
    Exec(#[from] hostguard_exec::ExecError),
}
