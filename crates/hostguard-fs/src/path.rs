//! Mirroring of host paths under the journal's storage roots

use crate::{Error, Result};
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Map `original` onto the tree rooted at `root`.
///
/// `/etc/ssh/sshd_config` under `/var/db/hostguard/archive` becomes
/// `/var/db/hostguard/archive/etc/ssh/sshd_config`. Relative paths are
/// mirrored the same way. Parent-directory components are rejected so a
/// mirrored path can never escape `root`.
pub fn mirror_path(root: &Path, original: &Path) -> Result<PathBuf> {
    let mut mirrored = root.to_path_buf();
    let mut pushed = false;

    for component in original.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::InvalidPath {
                    path: original.to_path_buf(),
                    reason: "parent directory components are not allowed".into(),
                });
            }
            Component::Normal(part) => {
                mirrored.push(part);
                pushed = true;
            }
        }
    }

    if !pushed {
        return Err(Error::InvalidPath {
            path: original.to_path_buf(),
            reason: "path has no file name".into(),
        });
    }

    Ok(mirrored)
}

/// Append `suffix` to the final component of `path` (`hosts` -> `hosts.ovf`).
pub fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_absolute_path() {
        let mirrored = mirror_path(Path::new("/var/db/archive"), Path::new("/etc/hosts")).unwrap();
        assert_eq!(mirrored, PathBuf::from("/var/db/archive/etc/hosts"));
    }

    #[test]
    fn mirror_skips_current_dir() {
        let mirrored = mirror_path(Path::new("/r"), Path::new("./etc/./hosts")).unwrap();
        assert_eq!(mirrored, PathBuf::from("/r/etc/hosts"));
    }

    #[test]
    fn mirror_rejects_root_only() {
        assert!(mirror_path(Path::new("/r"), Path::new("/")).is_err());
    }

    #[test]
    fn append_suffix_keeps_directory() {
        let path = append_suffix(Path::new("/r/etc/hosts"), ".patch-0001001");
        assert_eq!(path, PathBuf::from("/r/etc/hosts.patch-0001001"));
    }
}
