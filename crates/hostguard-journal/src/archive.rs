//! Content archive of pre-change file copies
//!
//! Archived copies mirror the original absolute path below the archive root.
//! The first copy of a file is stored as `<name>.ovf`; later copies whose
//! content differs from the newest archived one are stored as
//! `<name>.ovf<secs>.<micros>` and never overwrite an existing entry.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use hostguard_fs::{Checksum, io, mirror_path};
use tracing::debug;

use crate::error::{JournalError, Result};

const ARCHIVE_SUFFIX: &str = ".ovf";

/// What archiving a file did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// A new archive entry was written
    Created(PathBuf),
    /// The newest archived copy already has this content
    Unchanged(PathBuf),
    /// There was nothing to archive
    SourceMissing,
}

impl ArchiveOutcome {
    /// Path of the archive entry holding the file's current content
    pub fn entry(&self) -> Option<&Path> {
        match self {
            Self::Created(path) | Self::Unchanged(path) => Some(path),
            Self::SourceMissing => None,
        }
    }
}

/// Time component of a superseding archive entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveStamp {
    pub secs: i64,
    pub micros: u32,
}

impl ArchiveStamp {
    fn now() -> Self {
        let now = Utc::now();
        Self {
            secs: now.timestamp(),
            micros: now.timestamp_subsec_micros(),
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        let (secs, micros) = raw.split_once('.')?;
        Some(Self {
            secs: secs.parse().ok()?,
            micros: micros.parse().ok()?,
        })
    }

    fn bump(self) -> Self {
        if self.micros >= 999_999 {
            Self {
                secs: self.secs + 1,
                micros: 0,
            }
        } else {
            Self {
                secs: self.secs,
                micros: self.micros + 1,
            }
        }
    }

    fn render(&self) -> String {
        format!("{}.{:06}", self.secs, self.micros)
    }
}

impl PartialOrd for ArchiveStamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ArchiveStamp {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.secs, self.micros).cmp(&(other.secs, other.micros))
    }
}

/// One archived copy of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: PathBuf,
    /// `None` for the first `.ovf` copy
    pub stamp: Option<ArchiveStamp>,
}

/// Archive rooted at a private directory
#[derive(Debug, Clone)]
pub struct Archive {
    root: PathBuf,
}

impl Archive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the first archived copy of `original`
    pub fn base_entry(&self, original: &Path) -> Result<PathBuf> {
        let mirrored = mirror_path(&self.root, original)?;
        Ok(hostguard_fs::append_suffix(&mirrored, ARCHIVE_SUFFIX))
    }

    /// Every archived copy of `original`, oldest first
    pub fn entries(&self, original: &Path) -> Result<Vec<ArchiveEntry>> {
        let base = self.base_entry(original)?;
        let (Some(dir), Some(base_name)) = (base.parent(), base.file_name()) else {
            return Ok(Vec::new());
        };
        let base_name = base_name.to_string_lossy().into_owned();

        let listing = match fs::read_dir(dir) {
            Ok(listing) => listing,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(hostguard_fs::Error::io(dir, e).into()),
        };

        let mut entries = Vec::new();
        for item in listing {
            let item = item.map_err(|e| hostguard_fs::Error::io(dir, e))?;
            let name = item.file_name().to_string_lossy().into_owned();
            let Some(rest) = name.strip_prefix(&base_name) else {
                continue;
            };
            let stamp = if rest.is_empty() {
                None
            } else {
                match ArchiveStamp::parse(rest) {
                    Some(stamp) => Some(stamp),
                    None => continue,
                }
            };
            entries.push(ArchiveEntry {
                path: item.path(),
                stamp,
            });
        }

        entries.sort_by(|a, b| a.stamp.cmp(&b.stamp));
        Ok(entries)
    }

    /// The most recently archived copy of `original`
    pub fn latest(&self, original: &Path) -> Result<Option<ArchiveEntry>> {
        Ok(self.entries(original)?.pop())
    }

    /// Archive the current content of `original`.
    ///
    /// Content identical to the newest archived copy is not archived again.
    /// The entry carries the original's mode and ownership so a restore can
    /// put them back.
    pub fn archive(&self, original: &Path) -> Result<ArchiveOutcome> {
        let content = match fs::read(original) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %original.display(), "Source file does not exist, skipping archive");
                return Ok(ArchiveOutcome::SourceMissing);
            }
            Err(e) => return Err(hostguard_fs::Error::io(original, e).into()),
        };
        let metadata = fs::metadata(original).map_err(|e| hostguard_fs::Error::io(original, e))?;

        if let Some(latest) = self.latest(original)?
            && Checksum::of_file(&latest.path)? == Checksum::of(&content)
        {
            io::restore_metadata(&latest.path, &metadata)?;
            debug!(
                path = %original.display(),
                entry = %latest.path.display(),
                "Archived copy is current"
            );
            return Ok(ArchiveOutcome::Unchanged(latest.path));
        }

        let dest = self.next_entry_path(original)?;
        if let Some(parent) = dest.parent() {
            io::create_private_dir(parent)?;
        }
        io::write_atomic(&dest, &content)?;
        io::restore_metadata(&dest, &metadata)?;
        debug!(path = %original.display(), entry = %dest.display(), "Archived file");
        Ok(ArchiveOutcome::Created(dest))
    }

    /// Copy the newest archived version of `original` back into place,
    /// with the mode and ownership it had when archived
    pub fn restore_latest(&self, original: &Path) -> Result<PathBuf> {
        let latest = self
            .latest(original)?
            .ok_or_else(|| JournalError::ArchiveMissing {
                path: original.to_path_buf(),
            })?;
        let content =
            fs::read(&latest.path).map_err(|e| hostguard_fs::Error::io(&latest.path, e))?;
        let metadata =
            fs::metadata(&latest.path).map_err(|e| hostguard_fs::Error::io(&latest.path, e))?;
        io::write_atomic(original, &content)?;
        io::restore_metadata(original, &metadata)?;
        Ok(latest.path)
    }

    fn next_entry_path(&self, original: &Path) -> Result<PathBuf> {
        let base = self.base_entry(original)?;
        if !base.exists() {
            return Ok(base);
        }
        let mut stamp = ArchiveStamp::now();
        loop {
            let candidate = hostguard_fs::append_suffix(&base, &stamp.render());
            if !candidate.exists() {
                return Ok(candidate);
            }
            stamp = stamp.bump();
        }
    }
}
