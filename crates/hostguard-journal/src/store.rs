//! Persistent event store
//!
//! The store is a versioned TOML document with one `events` table keyed by
//! event id. It is rewritten atomically after every mutation so a crash
//! never leaves a half-written store behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use hostguard_fs::io;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{JournalError, Result};
use crate::event::{ChangeEvent, EventId, PolicyId};

const STORE_VERSION: &str = "1.0";

/// An event together with the time it was recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub recorded: DateTime<Utc>,
    pub event: ChangeEvent,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: String,
    #[serde(default)]
    events: BTreeMap<EventId, EventRecord>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            version: STORE_VERSION.to_string(),
            events: BTreeMap::new(),
        }
    }
}

/// Events keyed by id, in ascending id order
#[derive(Debug)]
pub struct EventStore {
    path: PathBuf,
    doc: StoreDocument,
}

impl EventStore {
    /// Open the store at `path`, starting empty if it does not exist.
    ///
    /// A store that cannot be parsed is moved aside to `<file>.old` and a
    /// fresh store is started in its place.
    pub fn open(path: &Path) -> Result<Self> {
        let doc = match io::read_text(path) {
            Ok(content) => match toml::from_str::<StoreDocument>(&content) {
                Ok(doc) => doc,
                Err(e) => {
                    let aside = hostguard_fs::append_suffix(path, ".old");
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Event store is unreadable, moving it to {}",
                        aside.display()
                    );
                    std::fs::rename(path, &aside)
                        .map_err(|e| hostguard_fs::Error::io(path, e))?;
                    StoreDocument::default()
                }
            },
            Err(e) if e.is_not_found() => StoreDocument::default(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), events = doc.events.len(), "Opened event store");

        Ok(Self {
            path: path.to_path_buf(),
            doc,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.doc.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.events.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&EventRecord> {
        self.doc.events.get(id)
    }

    /// Insert an event and persist the store.
    ///
    /// Returns `false` when the identical event is already stored under the
    /// id; a different event under an existing id is an error. The event is
    /// only kept in memory once it has been persisted.
    pub fn insert(&mut self, id: EventId, event: ChangeEvent) -> Result<bool> {
        if let Some(existing) = self.doc.events.get(id.as_str()) {
            if existing.event == event {
                return Ok(false);
            }
            return Err(JournalError::DuplicateEvent {
                id: id.to_string(),
            });
        }

        self.doc.events.insert(
            id.clone(),
            EventRecord {
                recorded: Utc::now(),
                event,
            },
        );
        if let Err(e) = self.flush() {
            self.doc.events.remove(id.as_str());
            return Err(e);
        }
        Ok(true)
    }

    /// Remove an event and persist the store if it was present.
    ///
    /// The event stays in memory when the store cannot be written.
    pub fn remove(&mut self, id: &str) -> Result<Option<EventRecord>> {
        let Some((key, record)) = self.doc.events.remove_entry(id) else {
            return Ok(None);
        };
        if let Err(e) = self.flush() {
            self.doc.events.insert(key, record);
            return Err(e);
        }
        Ok(Some(record))
    }

    /// Ids belonging to `policy`, ascending
    pub fn ids_for_policy(&self, policy: PolicyId) -> Vec<EventId> {
        self.doc
            .events
            .keys()
            .filter(|id| id.belongs_to(policy))
            .cloned()
            .collect()
    }

    /// Write the store to disk atomically
    pub fn flush(&mut self) -> Result<()> {
        let content = toml::to_string_pretty(&self.doc).map_err(|e| JournalError::Store {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        io::write_atomic(&self.path, content.as_bytes())?;
        Ok(())
    }
}
