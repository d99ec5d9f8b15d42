//! Journal configuration

use std::path::{Path, PathBuf};

use hostguard_fs::load_config;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default journal root on a managed host
pub const DEFAULT_ROOT: &str = "/var/db/hostguard";
/// Default patch program for the external backend
pub const DEFAULT_PATCH_PROGRAM: &str = "/usr/bin/patch";

/// How recorded patches are applied on revert
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum PatchBackend {
    #[default]
    InProcess,
    External {
        #[serde(default = "default_patch_program")]
        program: PathBuf,
    },
}

fn default_patch_program() -> PathBuf {
    PathBuf::from(DEFAULT_PATCH_PROGRAM)
}

/// Locations and behavior of a [`ChangeJournal`](crate::ChangeJournal).
///
/// Relative `store_file`, `archive_dir` and `diff_dir` are resolved against
/// `root`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub root: PathBuf,
    pub store_file: PathBuf,
    pub archive_dir: PathBuf,
    pub diff_dir: PathBuf,
    pub patch: PatchBackend,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self::rooted_at(DEFAULT_ROOT)
    }
}

impl JournalConfig {
    /// Default layout below `root`
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            store_file: PathBuf::from("eventlog.toml"),
            archive_dir: PathBuf::from("archive"),
            diff_dir: PathBuf::from("diffdir"),
            patch: PatchBackend::InProcess,
        }
    }

    /// Load from a TOML, JSON or YAML file, chosen by extension
    pub fn load(path: &Path) -> Result<Self> {
        Ok(load_config(path)?)
    }

    pub fn with_patch_backend(mut self, backend: PatchBackend) -> Self {
        self.patch = backend;
        self
    }

    pub fn store_path(&self) -> PathBuf {
        self.root.join(&self.store_file)
    }

    pub fn archive_root(&self) -> PathBuf {
        self.root.join(&self.archive_dir)
    }

    pub fn diff_root(&self) -> PathBuf {
        self.root.join(&self.diff_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn default_layout_is_under_var_db() {
        let config = JournalConfig::default();
        assert_eq!(config.store_path(), PathBuf::from("/var/db/hostguard/eventlog.toml"));
        assert_eq!(config.archive_root(), PathBuf::from("/var/db/hostguard/archive"));
        assert_eq!(config.diff_root(), PathBuf::from("/var/db/hostguard/diffdir"));
        assert_eq!(config.patch, PatchBackend::InProcess);
    }

    #[test]
    fn absolute_subpaths_override_root() {
        let mut config = JournalConfig::rooted_at("/srv/journal");
        config.archive_dir = PathBuf::from("/mnt/archive");
        assert_eq!(config.archive_root(), PathBuf::from("/mnt/archive"));
    }

    #[test]
    fn load_fills_missing_fields_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.toml");
        std::fs::write(
            &path,
            "root = \"/tmp/hg\"\n\n[patch]\nbackend = \"external\"\nprogram = \"/opt/bin/patch\"\n",
        )
        .unwrap();

        let config = JournalConfig::load(&path).unwrap();
        assert_eq!(config.root, PathBuf::from("/tmp/hg"));
        assert_eq!(config.store_file, PathBuf::from("eventlog.toml"));
        assert_eq!(
            config.patch,
            PatchBackend::External {
                program: PathBuf::from("/opt/bin/patch")
            }
        );
    }

    #[test]
    fn external_backend_defaults_to_system_patch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.json");
        std::fs::write(&path, r#"{"patch": {"backend": "external"}}"#).unwrap();

        let config = JournalConfig::load(&path).unwrap();
        assert_eq!(
            config.patch,
            PatchBackend::External {
                program: PathBuf::from(DEFAULT_PATCH_PROGRAM)
            }
        );
    }

    #[test]
    fn load_reads_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.yaml");
        std::fs::write(&path, "root: /tmp/hg-yaml\ndiff_dir: patches\n").unwrap();

        let config = JournalConfig::load(&path).unwrap();
        assert_eq!(config.diff_root(), PathBuf::from("/tmp/hg-yaml/patches"));
    }
}
