//! Shared test utilities for the hostguard workspace.
//!
//! This crate is a dev-dependency only and is never published.
//!
//! # Modules
//!
//! - [`host`]: [`TestHost`], a throwaway directory standing in for the host
//!   filesystem plus a private journal state directory
//! - [`runner`]: [`ScriptedRunner`], a [`hostguard_exec::CommandRunner`]
//!   that records invocations and replays canned output

pub mod host;
pub mod runner;

pub use host::TestHost;
pub use runner::ScriptedRunner;
