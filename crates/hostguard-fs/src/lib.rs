//! Filesystem primitives for hostguard
//!
//! Provides path mirroring for the journal trees, atomic writes, content
//! checksums and settings-file loading.

pub mod checksum;
pub mod config;
pub mod error;
pub mod io;
pub mod path;

pub use checksum::Checksum;
pub use config::{ConfigFormat, load_config};
pub use error::{Error, Result};
pub use path::{append_suffix, mirror_path};
