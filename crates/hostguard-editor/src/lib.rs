//! Reversible configuration editing for hostguard
//!
//! A [`ConfigEditor`] compares one artifact against desired key/value data
//! and, when asked, corrects it:
//!
//! - text dialects (`openeq`, `closedeq`, `space`, `tagconf`) are parsed
//!   line by line and re-rendered with untouched lines kept byte-for-byte
//! - command-backed dialects (`defaults`, `plist`, `profiles`) query and
//!   change OS state through external tools
//!
//! Every committed change is recorded in a
//! [`ChangeJournal`](hostguard_journal::ChangeJournal) so it can be reverted.

pub mod data;
pub mod dialect;
pub mod dialects;
pub mod editor;
pub mod error;

pub use data::{
    Condition, DefaultsSetting, DesiredData, Intent, ProfileSetting, ProfileValueKind,
    Tolerance, Value,
};
pub use dialect::{DialectKind, Difference, Document, Line, TextDialect};
pub use dialects::{CommandBackedDialect, CommandPlan, PlanStep, Programs};
pub use editor::{ConfigEditor, EditorState};
pub use error::{EditorError, Result};
