//! Atomic I/O operations with file locking

use crate::{Error, Result};
use fs2::FileExt;
use std::fs::{self, DirBuilder, OpenOptions};
use std::io::Write;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

/// Mode used for every directory the journal creates.
pub const PRIVATE_DIR_MODE: u32 = 0o700;

/// Write content atomically to a file with locking.
///
/// Uses write-to-temp-then-rename strategy to prevent partial writes.
/// Acquires an advisory lock on the temp file while it is being filled.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    // Temp file lives next to the target so the rename stays on one filesystem
    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id()
    );
    let temp_path = path.with_file_name(&temp_name);

    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| Error::io(&temp_path, e))?;

    temp_file
        .lock_exclusive()
        .map_err(|_| Error::LockFailed {
            path: path.to_path_buf(),
        })?;

    temp_file
        .write_all(content)
        .map_err(|e| Error::io(&temp_path, e))?;

    temp_file.sync_all().map_err(|e| Error::io(&temp_path, e))?;

    temp_file.unlock().map_err(|_| Error::LockFailed {
        path: path.to_path_buf(),
    })?;

    fs::rename(&temp_path, path).map_err(|e| Error::io(path, e))?;
    tracing::trace!(path = %path.display(), bytes = content.len(), "Wrote file");

    Ok(())
}

/// Read text content from a file.
pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

/// Read a file's bytes, treating a missing file as empty content.
pub fn read_or_empty(path: &Path) -> Result<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Create a directory (and its parents) readable only by the owner.
pub fn create_private_dir(path: &Path) -> Result<()> {
    DirBuilder::new()
        .recursive(true)
        .mode(PRIVATE_DIR_MODE)
        .create(path)
        .map_err(|e| Error::io(path, e))
}

/// Reapply mode bits and ownership captured from `previous` to `path`.
///
/// Ownership is only changed when it differs, so unprivileged callers can
/// restore files they already own. Mode goes last since `chown` clears the
/// setuid and setgid bits.
pub fn restore_metadata(path: &Path, previous: &fs::Metadata) -> Result<()> {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    let current = fs::metadata(path).map_err(|e| Error::io(path, e))?;
    if current.uid() != previous.uid() || current.gid() != previous.gid() {
        std::os::unix::fs::chown(path, Some(previous.uid()), Some(previous.gid()))
            .map_err(|e| Error::io(path, e))?;
    }

    fs::set_permissions(path, fs::Permissions::from_mode(previous.mode() & 0o7777))
        .map_err(|e| Error::io(path, e))
}

/// [`write_atomic`] over an existing file, keeping its mode and ownership.
pub fn write_atomic_preserving(path: &Path, content: &[u8]) -> Result<()> {
    let previous = fs::metadata(path).ok();
    write_atomic(path, content)?;
    if let Some(previous) = previous {
        restore_metadata(path, &previous)?;
    }
    Ok(())
}
