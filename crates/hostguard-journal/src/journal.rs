//! The change journal
//!
//! [`ChangeJournal`] owns the event store, the content archive and the patch
//! tree. Public operations return `Result<bool>`: `Err` is reserved for
//! misuse (see [`JournalError::is_misuse`]), every other failure is logged
//! with its path and reported as `Ok(false)`.

use std::path::{Path, PathBuf};

use hostguard_exec::Elevation;
use hostguard_fs::{io, mirror_path};
use tracing::{debug, error, info, warn};

use crate::archive::{Archive, ArchiveOutcome};
use crate::config::JournalConfig;
use crate::error::{JournalError, Result};
use crate::event::{ChangeEvent, EventId, PolicyId, PolicyRef};
use crate::patch::{self, PatchApplier, UnifiedPatch};
use crate::store::EventStore;

/// Durable log of reversible changes
pub struct ChangeJournal {
    config: JournalConfig,
    /// `None` when opened without elevation or after close
    store: Option<EventStore>,
    archive: Archive,
    patcher: Box<dyn PatchApplier>,
}

impl std::fmt::Debug for ChangeJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeJournal")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl ChangeJournal {
    /// Open the journal described by `config`.
    ///
    /// Without elevation nothing is created on disk and every store or file
    /// operation fails with [`JournalError::Privilege`].
    pub fn open(config: &JournalConfig, elevation: &dyn Elevation) -> Result<Self> {
        let archive = Archive::new(config.archive_root());
        let patcher = patch::applier_for(&config.patch);

        if !elevation.is_elevated() {
            warn!(
                root = %config.root.display(),
                "Change journal opened without elevation, changes cannot be recorded"
            );
            return Ok(Self {
                config: config.clone(),
                store: None,
                archive,
                patcher,
            });
        }

        for dir in [config.root.clone(), config.archive_root(), config.diff_root()] {
            io::create_private_dir(&dir)?;
        }
        let store = EventStore::open(&config.store_path())?;
        info!(
            store = %config.store_path().display(),
            events = store.len(),
            "Change journal opened"
        );

        Ok(Self {
            config: config.clone(),
            store: Some(store),
            archive,
            patcher,
        })
    }

    /// Replace the configured patch backend
    pub fn with_patcher(mut self, patcher: Box<dyn PatchApplier>) -> Self {
        self.patcher = patcher;
        self
    }

    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    pub fn is_elevated(&self) -> bool {
        self.store.is_some()
    }

    /// Flush and release the store
    pub fn close(mut self) -> Result<()> {
        if let Some(mut store) = self.store.take() {
            store.flush()?;
            info!(store = %store.path().display(), "Change journal closed");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Event store
    // ------------------------------------------------------------------

    /// Record `event` under `id`.
    ///
    /// Re-recording the identical event is accepted; a different event
    /// under an existing id is [`JournalError::DuplicateEvent`].
    pub fn record_event(&mut self, id: impl AsRef<str>, event: ChangeEvent) -> Result<bool> {
        let id = id.as_ref();
        let outcome = self.try_record_event(id, event);
        settle("record_event", outcome)
    }

    fn try_record_event(&mut self, id: &str, event: ChangeEvent) -> Result<()> {
        let id = require_id(id)?;
        let kind = event.kind();
        let store = self.store_mut("record_event")?;
        if store.insert(id.clone(), event)? {
            info!(event = %id, kind, "Recorded change event");
        } else {
            debug!(event = %id, "Event already recorded");
        }
        Ok(())
    }

    pub fn get_event(&self, id: impl AsRef<str>) -> Result<Option<ChangeEvent>> {
        let store = self.store("get_event")?;
        Ok(store.get(id.as_ref()).map(|record| record.event.clone()))
    }

    /// Delete the event recorded under `id`; a missing id is success.
    pub fn delete_event(&mut self, id: impl AsRef<str>) -> Result<bool> {
        let id = id.as_ref();
        let outcome = self.try_delete_event(id);
        settle("delete_event", outcome)
    }

    fn try_delete_event(&mut self, id: &str) -> Result<()> {
        let store = self.store_mut("delete_event")?;
        if id.trim().is_empty() {
            return Err(JournalError::invalid_input("blank event id"));
        }
        if store.remove(id)?.is_some() {
            debug!(event = id, "Deleted change event");
        }
        Ok(())
    }

    /// Ids of every event recorded for `policy`, ascending
    pub fn find_events_for_rule(&self, policy: impl Into<PolicyRef>) -> Result<Vec<EventId>> {
        let store = self.store("find_events_for_rule")?;
        let policy = PolicyId::try_from(policy.into())?;
        let ids = store.ids_for_policy(policy);
        debug!(%policy, count = ids.len(), "Found events for policy");
        Ok(ids)
    }

    /// Delete every event of `policy` and return the removed ids.
    ///
    /// Used before a policy re-runs so that only the latest run's events
    /// remain revertible.
    pub fn purge_rule(&mut self, policy: impl Into<PolicyRef>) -> Result<Vec<EventId>> {
        let policy = PolicyId::try_from(policy.into())?;
        let store = self.store_mut("purge_rule")?;
        let ids = store.ids_for_policy(policy);
        for id in &ids {
            store.remove(id.as_str())?;
        }
        if !ids.is_empty() {
            info!(%policy, count = ids.len(), "Purged stale events");
        }
        Ok(ids)
    }

    // ------------------------------------------------------------------
    // File tracking
    // ------------------------------------------------------------------

    /// Archive `old_path` and store a patch that turns `new_path`'s content
    /// back into it, keyed by `id`.
    ///
    /// A missing `old_path` is an empty baseline. `new_path` is never moved
    /// over `old_path`; that is the caller's job once this succeeds.
    pub fn record_file_change(
        &mut self,
        old_path: &Path,
        new_path: &Path,
        id: impl AsRef<str>,
    ) -> Result<bool> {
        let id = id.as_ref();
        let outcome = self.try_record_file_change(old_path, new_path, id);
        settle("record_file_change", outcome)
    }

    fn try_record_file_change(&mut self, old_path: &Path, new_path: &Path, id: &str) -> Result<()> {
        self.store("record_file_change")?;
        require_path(old_path, "original file")?;
        require_path(new_path, "changed file")?;
        let id = require_id(id)?;

        debug!(path = %old_path.display(), event = %id, "Recording file change");
        self.archive.archive(old_path)?;

        let old = text_content(old_path, &io::read_or_empty(old_path)?)?;
        let new_bytes =
            std::fs::read(new_path).map_err(|e| hostguard_fs::Error::io(new_path, e))?;
        let new = text_content(new_path, &new_bytes)?;

        let diff = patch::unified_diff(
            &new,
            &old,
            &new_path.display().to_string(),
            &old_path.display().to_string(),
        );
        let dest = self.patch_path(old_path, &id)?;
        if let Some(parent) = dest.parent() {
            io::create_private_dir(parent)?;
        }
        io::write_atomic(&dest, diff.as_bytes())?;
        debug!(patch = %dest.display(), "Stored patch");
        Ok(())
    }

    /// Apply the patch recorded for `id` to `path`
    pub fn revert_file_change(&mut self, path: &Path, id: impl AsRef<str>) -> Result<bool> {
        let id = id.as_ref();
        let outcome = self.try_revert_file_change(path, id);
        settle("revert_file_change", outcome)
    }

    fn try_revert_file_change(&mut self, path: &Path, id: &str) -> Result<()> {
        self.store("revert_file_change")?;
        require_path(path, "file to revert")?;
        let id = require_id(id)?;

        let patch_file = self.patch_path(path, &id)?;
        if !patch_file.exists() {
            return Err(JournalError::PatchMissing {
                id: id.to_string(),
                path: patch_file,
            });
        }
        if !path.exists() {
            return Err(JournalError::TargetMissing {
                path: path.to_path_buf(),
            });
        }

        let patch_text = io::read_text(&patch_file)?;
        let is_empty = UnifiedPatch::parse(&patch_text)
            .map(|patch| patch.is_empty())
            .unwrap_or(false);
        if is_empty {
            debug!(path = %path.display(), event = %id, "Recorded patch is empty, nothing to revert");
            return Ok(());
        }

        self.patcher.apply(path, &patch_file)?;
        info!(path = %path.display(), event = %id, "Reverted file change");
        Ok(())
    }

    /// Archive `path` before it is deleted and record a deletion event.
    ///
    /// A file that does not exist needs no backup; that is success and no
    /// event is recorded.
    pub fn record_file_delete(&mut self, path: &Path, id: impl AsRef<str>) -> Result<bool> {
        let id = id.as_ref();
        let outcome = self.try_record_file_delete(path, id);
        settle("record_file_delete", outcome)
    }

    fn try_record_file_delete(&mut self, path: &Path, id: &str) -> Result<()> {
        self.store("record_file_delete")?;
        require_path(path, "file to delete")?;
        let id = require_id(id)?;

        debug!(path = %path.display(), event = %id, "Recording file deletion");
        if self.archive.archive(path)? == ArchiveOutcome::SourceMissing {
            return Ok(());
        }

        self.try_record_event(
            id.as_str(),
            ChangeEvent::Deletion {
                filepath: path.to_path_buf(),
            },
        )
    }

    /// Restore the newest archived copy of `path`
    pub fn revert_file_delete(&mut self, path: &Path) -> Result<bool> {
        let outcome = self.try_revert_file_delete(path);
        settle("revert_file_delete", outcome)
    }

    fn try_revert_file_delete(&mut self, path: &Path) -> Result<()> {
        self.store("revert_file_delete")?;
        require_path(path, "file to restore")?;

        let entry = self.archive.restore_latest(path)?;
        info!(path = %path.display(), entry = %entry.display(), "Restored deleted file");
        Ok(())
    }

    /// Archive the current content of `path` without recording a change
    pub fn archive_file(&mut self, path: &Path) -> Result<ArchiveOutcome> {
        self.store("archive_file")?;
        require_path(path, "file to archive")?;
        self.archive.archive(path)
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    /// Where the patch for `id` against `path` is stored
    pub fn patch_path(&self, path: &Path, id: &EventId) -> Result<PathBuf> {
        let mirrored = mirror_path(&self.config.diff_root(), path)?;
        Ok(hostguard_fs::append_suffix(
            &mirrored,
            &format!(".patch-{id}"),
        ))
    }

    fn store(&self, operation: &'static str) -> Result<&EventStore> {
        self.store
            .as_ref()
            .ok_or(JournalError::Privilege { operation })
    }

    fn store_mut(&mut self, operation: &'static str) -> Result<&mut EventStore> {
        self.store
            .as_mut()
            .ok_or(JournalError::Privilege { operation })
    }
}

impl Drop for ChangeJournal {
    fn drop(&mut self) {
        if let Some(mut store) = self.store.take() {
            warn!(
                store = %store.path().display(),
                "Change journal dropped without close, flushing"
            );
            if let Err(e) = store.flush() {
                error!(error = %e, "Failed to flush event store");
            }
        }
    }
}

/// Turn an internal outcome into the public `Result<bool>` convention
fn settle(operation: &'static str, outcome: Result<()>) -> Result<bool> {
    match outcome {
        Ok(()) => Ok(true),
        Err(e) if e.is_misuse() => Err(e),
        Err(e) => {
            error!(operation, error = %e, "Journal operation failed");
            Ok(false)
        }
    }
}

fn require_path(path: &Path, what: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(JournalError::invalid_input(format!("no {what} given")));
    }
    Ok(())
}

fn require_id(id: &str) -> Result<EventId> {
    if id.trim().is_empty() {
        return Err(JournalError::invalid_input("no event id given"));
    }
    EventId::parse(id)
}

fn text_content(path: &Path, bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| {
        JournalError::invalid_input(format!("{} is not UTF-8 text", path.display()))
    })
}
