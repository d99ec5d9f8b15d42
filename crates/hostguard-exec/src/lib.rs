//! Command execution and elevation collaborators for hostguard
//!
//! The journal and the command-backed editor dialects never spawn processes
//! or query the process identity directly. They go through the two seams
//! defined here:
//!
//! - [`CommandRunner`]: run a command, capture stdout/stderr/exit code
//! - [`Elevation`]: report whether the current process holds administrative
//!   privilege

pub mod command;
pub mod error;
pub mod privilege;
pub mod runner;

pub use command::{CommandOutput, CommandSpec};
pub use error::{ExecError, Result};
pub use privilege::{EffectiveUid, Elevation, StaticElevation};
pub use runner::{CommandRunner, SystemRunner};
