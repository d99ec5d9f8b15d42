//! Revert driver
//!
//! Walks a policy's events newest-first and undoes each one. Events that
//! were undone are removed from the store; failures keep their event so a
//! later attempt can retry.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use hostguard_exec::{CommandRunner, SystemRunner};
use tracing::{error, info};

use crate::error::Result;
use crate::event::{ChangeEvent, EventId, PkgState, PolicyRef, ServiceState};
use crate::journal::ChangeJournal;

/// Brings a package to a requested state
pub trait PackageManager {
    fn ensure(&self, pkgname: &str, state: PkgState) -> hostguard_exec::Result<()>;
}

/// Brings a service to a requested state
pub trait ServiceManager {
    fn ensure(&self, servicename: &str, state: ServiceState) -> hostguard_exec::Result<()>;
}

/// Outcome of reverting a set of events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevertReport {
    pub reverted: Vec<EventId>,
    /// Events that could not be undone, with the reason
    pub failed: Vec<(EventId, String)>,
}

impl RevertReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Undoes recorded events
pub struct Reverter<'a> {
    runner: Arc<dyn CommandRunner>,
    packages: Option<&'a dyn PackageManager>,
    services: Option<&'a dyn ServiceManager>,
}

impl Default for Reverter<'_> {
    fn default() -> Self {
        Self::new(Arc::new(SystemRunner::new()))
    }
}

impl<'a> Reverter<'a> {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            packages: None,
            services: None,
        }
    }

    pub fn with_package_manager(mut self, packages: &'a dyn PackageManager) -> Self {
        self.packages = Some(packages);
        self
    }

    pub fn with_service_manager(mut self, services: &'a dyn ServiceManager) -> Self {
        self.services = Some(services);
        self
    }

    /// Revert every event of `policy`, newest first
    pub fn revert_rule(
        &self,
        journal: &mut ChangeJournal,
        policy: impl Into<PolicyRef>,
    ) -> Result<RevertReport> {
        let mut ids = journal.find_events_for_rule(policy)?;
        ids.reverse();

        let mut report = RevertReport::default();
        for id in ids {
            match self.revert_one(journal, &id)? {
                Ok(()) => {
                    journal.delete_event(&id)?;
                    report.reverted.push(id);
                }
                Err(reason) => {
                    error!(event = %id, %reason, "Could not revert event");
                    report.failed.push((id, reason));
                }
            }
        }

        info!(
            reverted = report.reverted.len(),
            failed = report.failed.len(),
            "Revert finished"
        );
        Ok(report)
    }

    /// Revert a single event and delete it from the store on success
    pub fn revert_event(&self, journal: &mut ChangeJournal, id: &EventId) -> Result<bool> {
        match self.revert_one(journal, id)? {
            Ok(()) => journal.delete_event(id),
            Err(reason) => {
                error!(event = %id, %reason, "Could not revert event");
                Ok(false)
            }
        }
    }

    /// Outer `Err` is journal misuse, inner `Err` a failed undo
    fn revert_one(
        &self,
        journal: &mut ChangeJournal,
        id: &EventId,
    ) -> Result<std::result::Result<(), String>> {
        let Some(event) = journal.get_event(id)? else {
            return Ok(Err("event is not recorded".to_string()));
        };

        let outcome = match &event {
            ChangeEvent::Conf { filepath } => {
                if journal.revert_file_change(filepath, id)? {
                    Ok(())
                } else {
                    Err(format!("patch could not be applied to {}", filepath.display()))
                }
            }
            ChangeEvent::Creation { filepath } => remove_created(filepath),
            ChangeEvent::Deletion { filepath } => {
                if journal.revert_file_delete(filepath)? {
                    Ok(())
                } else {
                    Err(format!("no archived copy of {}", filepath.display()))
                }
            }
            ChangeEvent::Perm {
                filepath,
                startstate,
                ..
            } => restore_perm(filepath, startstate.uid(), startstate.gid(), startstate.mode()),
            ChangeEvent::Command { command } => match self.runner.run(command) {
                Ok(output) if output.success() => Ok(()),
                Ok(output) => Err(format!(
                    "undo command exited {}: {}",
                    output.status,
                    output.stderr.trim()
                )),
                Err(e) => Err(e.to_string()),
            },
            ChangeEvent::Pkg {
                pkgname,
                startstate,
                ..
            } => match self.packages {
                Some(packages) => packages
                    .ensure(pkgname, *startstate)
                    .map_err(|e| e.to_string()),
                None => Err("no package manager configured".to_string()),
            },
            ChangeEvent::Service {
                servicename,
                startstate,
                ..
            } => match self.services {
                Some(services) => services
                    .ensure(servicename, *startstate)
                    .map_err(|e| e.to_string()),
                None => Err("no service manager configured".to_string()),
            },
        };

        if outcome.is_ok() {
            info!(event = %id, kind = event.kind(), "Reverted event");
        }
        Ok(outcome)
    }
}

fn remove_created(path: &Path) -> std::result::Result<(), String> {
    let removed = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
    };
    removed.map_err(|e| format!("cannot remove {}: {e}", path.display()))
}

fn restore_perm(path: &Path, uid: u32, gid: u32, mode: u32) -> std::result::Result<(), String> {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    let current = fs::metadata(path).map_err(|e| format!("cannot stat {}: {e}", path.display()))?;
    if current.uid() != uid || current.gid() != gid {
        std::os::unix::fs::chown(path, Some(uid), Some(gid))
            .map_err(|e| format!("cannot change owner of {}: {e}", path.display()))?;
    }

    // after chown, which drops setuid and setgid
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
        .map_err(|e| format!("cannot set mode on {}: {e}", path.display()))
}
