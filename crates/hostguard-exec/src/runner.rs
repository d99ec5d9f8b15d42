//! Process execution behind the [`CommandRunner`] seam

use std::io::ErrorKind;
use std::process::Command;

use crate::command::{CommandOutput, CommandSpec};
use crate::error::{ExecError, Result};

/// Runs commands and captures their output.
///
/// A non-zero exit is not an error at this level; callers inspect
/// [`CommandOutput::status`] or use [`CommandOutput::into_result`].
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &CommandSpec) -> Result<CommandOutput>;
}

/// Interpreter for [`CommandSpec::Shell`]
const SHELL: &str = "/bin/sh";

/// Runs commands as real subprocesses of the current process
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        if command.is_empty() {
            return Err(ExecError::EmptyCommand);
        }

        let (program, mut process) = match command {
            CommandSpec::Shell(script) => {
                let mut process = Command::new(SHELL);
                process.arg("-c").arg(script);
                (SHELL.to_string(), process)
            }
            CommandSpec::Argv(args) => {
                let mut process = Command::new(&args[0]);
                process.args(&args[1..]);
                (args[0].clone(), process)
            }
        };

        tracing::debug!(command = %command, "Running command");

        let output = process.output().map_err(|source| match source.kind() {
            ErrorKind::NotFound => ExecError::ProgramNotFound {
                program: program.clone(),
            },
            _ => ExecError::Io {
                program: program.clone(),
                source,
            },
        })?;

        let result = CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() {
            tracing::debug!(
                command = %command,
                status = result.status,
                stderr = %result.stderr.trim(),
                "Command exited non-zero"
            );
        }

        Ok(result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn runs_shell_command() {
        let output = SystemRunner::new()
            .run(&CommandSpec::shell("echo hello"))
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[test]
    fn runs_argv_command_without_shell_expansion() {
        let output = SystemRunner::new()
            .run(&CommandSpec::argv(["/bin/echo", "$HOME"]))
            .unwrap();
        assert_eq!(output.stdout.trim(), "$HOME");
    }

    #[test]
    fn captures_exit_code_and_stderr() {
        let output = SystemRunner::new()
            .run(&CommandSpec::shell("echo oops >&2; exit 3"))
            .unwrap();
        assert_eq!(output.status, 3);
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[test]
    fn missing_program_is_reported() {
        let err = SystemRunner::new()
            .run(&CommandSpec::argv(["/nonexistent/hostguard-program"]))
            .unwrap_err();
        assert!(matches!(err, ExecError::ProgramNotFound { .. }));
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = SystemRunner::new()
            .run(&CommandSpec::Argv(Vec::new()))
            .unwrap_err();
        assert!(matches!(err, ExecError::EmptyCommand));
    }
}
