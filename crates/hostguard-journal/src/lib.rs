//! Change journal for hostguard
//!
//! Records every reversible host mutation so it can be undone later:
//!
//! - [`EventStore`]: versioned TOML log of [`ChangeEvent`]s keyed by
//!   [`EventId`]
//! - [`Archive`]: full pre-change copies of files, deduplicated by content
//! - patch tree: one unified diff per file change, applied on revert by a
//!   [`PatchApplier`]
//! - [`Reverter`]: undoes a policy's events newest-first
//!
//! [`ChangeJournal`] ties these together and is passed by reference to
//! whatever needs to record changes.

pub mod archive;
pub mod config;
pub mod error;
pub mod event;
pub mod journal;
pub mod logging;
pub mod patch;
pub mod revert;
pub mod store;

pub use archive::{Archive, ArchiveEntry, ArchiveOutcome};
pub use config::{JournalConfig, PatchBackend};
pub use error::{JournalError, Result};
pub use event::{
    ChangeEvent, EventId, EventIdAllocator, PermState, PkgState, PolicyId, PolicyRef,
    ServiceState,
};
pub use journal::ChangeJournal;
pub use patch::{ExternalPatchUtility, InProcessPatcher, PatchApplier, UnifiedPatch};
pub use revert::{PackageManager, Reverter, RevertReport, ServiceManager};
pub use store::{EventRecord, EventStore};
