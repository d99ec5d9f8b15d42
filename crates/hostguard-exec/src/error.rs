//! Error types for command execution

/// Errors that can occur while running external commands
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The command had no program to run
    #[error("Empty command")]
    EmptyCommand,

    /// The program could not be found on this host
    #[error("Program not found: {program}")]
    ProgramNotFound {
        /// Program that was requested
        program: String,
    },

    /// I/O error while spawning or waiting on the process
    #[error("I/O error running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Subprocess exited with non-zero status
    #[error("Command failed (exit code {code}): {stderr}")]
    CommandFailed {
        /// Exit code from the subprocess
        code: i32,
        /// Captured stderr output
        stderr: String,
    },
}

/// Result type alias for command execution
pub type Result<T> = std::result::Result<T, ExecError>;
