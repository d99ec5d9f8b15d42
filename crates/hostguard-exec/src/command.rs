//! Command descriptions and captured process output

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ExecError, Result};

/// A command to run, either as a shell string or as an argument vector.
///
/// Serializes untagged so a recorded `command` field is either a plain
/// string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    /// Interpreted by `/bin/sh -c`
    Shell(String),
    /// Executed directly, first element is the program
    Argv(Vec<String>),
}

impl CommandSpec {
    /// Build an argument-vector command
    pub fn argv<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Argv(args.into_iter().map(Into::into).collect())
    }

    /// Build a shell command
    pub fn shell(command: impl Into<String>) -> Self {
        Self::Shell(command.into())
    }

    /// True when there is nothing to execute
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Shell(command) => command.trim().is_empty(),
            Self::Argv(args) => args.is_empty(),
        }
    }

    /// Render as a single string suitable for `/bin/sh -c`
    pub fn to_shell_string(&self) -> String {
        match self {
            Self::Shell(command) => command.clone(),
            Self::Argv(args) => args
                .iter()
                .map(|a| shell_quote(a))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Chain several commands into one shell string that stops at the first
    /// failure. A single command is returned unchanged.
    pub fn chain(mut commands: Vec<CommandSpec>) -> Option<CommandSpec> {
        match commands.len() {
            0 => None,
            1 => commands.pop(),
            _ => Some(Self::Shell(
                commands
                    .iter()
                    .map(CommandSpec::to_shell_string)
                    .collect::<Vec<_>>()
                    .join(" && "),
            )),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_shell_string())
    }
}

/// Quote a single word for POSIX shells
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Captured result of running a command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit code, `-1` when the process was killed by a signal
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Convert a non-zero exit into [`ExecError::CommandFailed`]
    pub fn into_result(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(ExecError::CommandFailed {
                code: self.status,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}
