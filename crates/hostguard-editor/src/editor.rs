//! [`ConfigEditor`]: report, fix and commit one configuration artifact

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hostguard_exec::{CommandRunner, SystemRunner};
use hostguard_fs::io;
use hostguard_journal::{ChangeEvent, ChangeJournal, EventId};
use tracing::{debug, error, info, warn};

use crate::data::{Condition, DesiredData, Intent};
use crate::dialect::{DialectKind, Difference, TextDialect};
use crate::dialects::{CommandBackedDialect, CommandPlan, text_dialect};
use crate::error::{EditorError, Result};

/// Where an editor is in its report/fix/commit cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    New,
    Reported { compliant: bool },
    /// Corrected content is staged (text) or a plan is ready (command)
    Fixed,
    Committed,
}

enum Engine {
    Text(Box<dyn TextDialect>),
    Command(CommandBackedDialect),
}

/// Brings one artifact in line with desired key/value data.
///
/// `report` may be called any number of times and never changes the
/// artifact. `fix` stages the corrected content in `tmp_path` (text
/// dialects) or plans OS tool invocations (command dialects), building on
/// whatever an earlier `fix` staged. `commit` makes the change real and
/// records it in a [`ChangeJournal`] under the bound event id.
///
/// For `defaults` and `plist`, `path` is the domain or plist path; for
/// `profiles` it is the profile to install.
pub struct ConfigEditor {
    kind: DialectKind,
    path: PathBuf,
    tmp_path: PathBuf,
    desired: DesiredData,
    intent: Intent,
    engine: Engine,
    event_id: Option<EventId>,
    state: EditorState,
    fixables: Vec<String>,
    removables: Vec<String>,
    conditions: Vec<Condition>,
    last_error: Option<EditorError>,
    plan: Option<CommandPlan>,
    staged: Option<String>,
}

impl std::fmt::Debug for ConfigEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigEditor")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("intent", &self.intent)
            .field("event_id", &self.event_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ConfigEditor {
    pub fn new(
        kind: DialectKind,
        path: impl Into<PathBuf>,
        tmp_path: impl Into<PathBuf>,
        desired: DesiredData,
        intent: Intent,
    ) -> Self {
        let path = path.into();
        let engine = match text_dialect(kind) {
            Some(dialect) => Engine::Text(dialect),
            None => Engine::Command(CommandBackedDialect::new(
                kind,
                path.display().to_string(),
                Arc::new(SystemRunner::new()),
            )),
        };
        Self {
            kind,
            path,
            tmp_path: tmp_path.into(),
            desired,
            intent,
            engine,
            event_id: None,
            state: EditorState::New,
            fixables: Vec::new(),
            removables: Vec::new(),
            conditions: Vec::new(),
            last_error: None,
            plan: None,
            staged: None,
        }
    }

    /// Route OS tool invocations through `runner`. No effect on text
    /// dialects.
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        if let Engine::Command(dialect) = &mut self.engine {
            dialect.set_runner(runner);
        }
        self
    }

    /// Whether `defaults` addresses the current host's domain
    pub fn with_current_host(mut self, current_host: bool) -> Self {
        self.engine = match self.engine {
            Engine::Command(dialect) => Engine::Command(dialect.with_current_host(current_host)),
            text => text,
        };
        self
    }

    pub fn kind(&self) -> DialectKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    pub fn set_event_id(&mut self, id: EventId) {
        self.event_id = Some(id);
    }

    pub fn event_id(&self) -> Option<&EventId> {
        self.event_id.as_ref()
    }

    /// Replace the desired data. Staged fixes are kept.
    pub fn update_data(&mut self, desired: DesiredData) {
        self.desired = desired;
    }

    pub fn set_intent(&mut self, intent: Intent) {
        self.intent = intent;
    }

    /// Keys that are missing or hold the wrong value, from the last report
    pub fn fixable_keys(&self) -> &[String] {
        &self.fixables
    }

    /// Keys that must go, from the last report
    pub fn removable_keys(&self) -> &[String] {
        &self.removables
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn last_error(&self) -> Option<&EditorError> {
        self.last_error.as_ref()
    }

    /// Compare the artifact (or the staged fix) with the desired data
    pub fn report(&mut self) -> bool {
        self.fixables.clear();
        self.removables.clear();
        self.conditions.clear();
        self.last_error = None;

        let compliant = match self.difference() {
            Ok(diff) => {
                let compliant = diff.is_compliant();
                self.fixables = diff.fixables;
                self.removables = diff.removables;
                self.conditions = diff.conditions;
                compliant
            }
            Err(e) => {
                self.failed("report", e);
                false
            }
        };

        debug!(
            path = %self.path.display(),
            dialect = %self.kind,
            compliant,
            fixables = ?self.fixables,
            removables = ?self.removables,
            "Reported"
        );
        if self.state != EditorState::Fixed {
            self.state = EditorState::Reported { compliant };
        }
        compliant
    }

    /// Stage a corrected artifact without touching the real one
    pub fn fix(&mut self) -> bool {
        self.last_error = None;
        match self.try_fix() {
            Ok(()) => {
                self.state = EditorState::Fixed;
                true
            }
            Err(e) => {
                self.failed("fix", e);
                false
            }
        }
    }

    /// Make the staged fix real and record it under the bound event id
    pub fn commit(&mut self, journal: &mut ChangeJournal) -> bool {
        self.last_error = None;
        let outcome = if matches!(self.engine, Engine::Text(_)) {
            self.commit_text(journal)
        } else {
            self.commit_command(journal)
        };
        match outcome {
            Ok(()) => {
                self.state = EditorState::Committed;
                true
            }
            Err(e) => {
                self.failed("commit", e);
                false
            }
        }
    }

    fn failed(&mut self, operation: &'static str, e: EditorError) {
        if let EditorError::UnsupportedData { reason, .. } = &e {
            self.conditions.push(Condition::UnsupportedData {
                reason: reason.clone(),
            });
        }
        error!(operation, path = %self.path.display(), error = %e, "Config editor operation failed");
        self.last_error = Some(e);
    }

    fn difference(&self) -> Result<Difference> {
        match &self.engine {
            Engine::Text(dialect) => {
                let content = self.current_text()?;
                let doc = dialect.parse(&content);
                dialect.diff(&doc, &self.desired, self.intent)
            }
            Engine::Command(dialect) => dialect.diff(&self.desired, self.intent),
        }
    }

    fn try_fix(&mut self) -> Result<()> {
        match &self.engine {
            Engine::Text(dialect) => {
                let content = self.current_text()?;
                let doc = dialect.parse(&content);
                let rendered = dialect.render(&doc, &self.desired, self.intent)?;
                io::write_atomic(&self.tmp_path, rendered.as_bytes())?;
                debug!(tmp = %self.tmp_path.display(), "Staged fixed content");
                self.staged = Some(rendered);
            }
            Engine::Command(dialect) => {
                let plan = dialect.plan(&self.desired, self.intent)?;
                debug!(steps = plan.steps.len(), "Planned setting commands");
                self.plan = Some(plan);
            }
        }
        Ok(())
    }

    /// Staged content after a fix, otherwise the artifact. A missing
    /// artifact reads as empty.
    fn current_text(&self) -> Result<String> {
        if let Some(staged) = &self.staged {
            return Ok(staged.clone());
        }
        let bytes = io::read_or_empty(&self.path)?;
        String::from_utf8(bytes).map_err(|_| EditorError::NotText {
            path: self.path.clone(),
        })
    }

    fn require_id(&self) -> Result<EventId> {
        self.event_id.clone().ok_or_else(|| EditorError::NoEventId {
            path: self.path.clone(),
        })
    }

    fn commit_text(&mut self, journal: &mut ChangeJournal) -> Result<()> {
        let Some(staged) = self.staged.as_ref().filter(|_| self.state == EditorState::Fixed) else {
            return Err(EditorError::NotFixed {
                path: self.path.clone(),
            });
        };
        let id = self.require_id()?;

        let previous = match fs::metadata(&self.path) {
            Ok(metadata) => Some(metadata),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(hostguard_fs::Error::io(&self.path, e).into()),
        };

        if previous.is_some() && io::read_or_empty(&self.path)? == staged.as_bytes() {
            debug!(path = %self.path.display(), "Staged content matches, nothing to commit");
            self.discard_tmp();
            self.staged = None;
            return Ok(());
        }

        let recorded = journal.record_file_change(&self.path, &self.tmp_path, id.as_str())?;
        if !recorded {
            return Err(EditorError::NotRecorded {
                path: self.path.clone(),
            });
        }

        fs::rename(&self.tmp_path, &self.path)
            .map_err(|e| hostguard_fs::Error::io(&self.path, e))?;
        if let Some(metadata) = &previous {
            io::restore_metadata(&self.path, metadata)?;
        }

        let filepath = self.path.clone();
        let event = match previous {
            Some(_) => ChangeEvent::Conf { filepath },
            None => ChangeEvent::Creation { filepath },
        };
        if !journal.record_event(id.as_str(), event)? {
            return Err(EditorError::NotRecorded {
                path: self.path.clone(),
            });
        }

        info!(path = %self.path.display(), event = %id, "Committed configuration change");
        self.staged = None;
        Ok(())
    }

    fn commit_command(&mut self, journal: &mut ChangeJournal) -> Result<()> {
        let Engine::Command(dialect) = &self.engine else {
            return Ok(());
        };
        let Some(plan) = self.plan.as_ref().filter(|_| self.state == EditorState::Fixed) else {
            return Err(EditorError::NotFixed {
                path: self.path.clone(),
            });
        };
        if plan.is_empty() {
            debug!(path = %self.path.display(), "No setting commands to run");
            return Ok(());
        }
        let id = self.require_id()?;

        let mut applied = 0;
        let mut failure = None;
        for step in &plan.steps {
            match dialect.execute(&step.forward) {
                Ok(()) => applied += 1,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if let Some(inverse) = plan.inverse(applied) {
            let recorded = journal.record_event(
                id.as_str(),
                ChangeEvent::Command { command: inverse },
            )?;
            if !recorded {
                warn!(path = %self.path.display(), event = %id, "Applied settings could not be recorded");
                return Err(EditorError::NotRecorded {
                    path: self.path.clone(),
                });
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }
        info!(path = %self.path.display(), event = %id, steps = applied, "Committed settings");
        self.plan = None;
        Ok(())
    }

    fn discard_tmp(&self) {
        if let Err(e) = fs::remove_file(&self.tmp_path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(tmp = %self.tmp_path.display(), error = %e, "Could not remove staged file");
        }
    }
}
