//! Dialect implementations

pub mod command;
pub mod keyvalue;
pub mod tagconf;

pub use command::{CommandBackedDialect, CommandPlan, PlanStep, Programs};
pub use keyvalue::{KeyValueDialect, Separator};
pub use tagconf::TagConfDialect;

use crate::dialect::{DialectKind, TextDialect};

/// Text dialect for `kind`, or `None` for command-backed dialects
pub fn text_dialect(kind: DialectKind) -> Option<Box<dyn TextDialect>> {
    match kind {
        DialectKind::OpenEq => Some(Box::new(KeyValueDialect::new(Separator::OpenEq))),
        DialectKind::ClosedEq => Some(Box::new(KeyValueDialect::new(Separator::ClosedEq))),
        DialectKind::Space => Some(Box::new(KeyValueDialect::new(Separator::Space))),
        DialectKind::TagConf => Some(Box::new(TagConfDialect::default())),
        DialectKind::Defaults | DialectKind::Plist | DialectKind::Profiles => None,
    }
}
