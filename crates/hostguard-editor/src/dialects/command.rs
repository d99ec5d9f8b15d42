//! Dialects whose state lives behind OS tools: `defaults`, `plist` and
//! `profiles`. Nothing here touches a file directly; queries and changes
//! go through a [`CommandRunner`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hostguard_exec::{CommandRunner, CommandSpec};
use regex::Regex;
use tracing::debug;

use crate::data::{
    Condition, DefaultsSetting, DesiredData, Intent, ProfileSetting, ProfileValueKind, Tolerance,
};
use crate::dialect::{DialectKind, Difference};
use crate::error::{EditorError, Result};

pub const DEFAULTS_PROGRAM: &str = "/usr/bin/defaults";
pub const PROFILES_PROGRAM: &str = "/usr/bin/profiles";
pub const SYSTEM_PROFILER_PROGRAM: &str = "/usr/sbin/system_profiler";

/// Locations of the OS tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Programs {
    pub defaults: PathBuf,
    pub profiles: PathBuf,
    pub system_profiler: PathBuf,
}

impl Default for Programs {
    fn default() -> Self {
        Self {
            defaults: PathBuf::from(DEFAULTS_PROGRAM),
            profiles: PathBuf::from(PROFILES_PROGRAM),
            system_profiler: PathBuf::from(SYSTEM_PROFILER_PROGRAM),
        }
    }
}

/// A change and the command that undoes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub forward: CommandSpec,
    pub inverse: CommandSpec,
}

/// Ordered changes produced by `fix` for a command-backed dialect
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandPlan {
    pub steps: Vec<PlanStep>,
}

impl CommandPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Single command undoing the first `applied` steps, last one first
    pub fn inverse(&self, applied: usize) -> Option<CommandSpec> {
        CommandSpec::chain(
            self.steps
                .iter()
                .take(applied)
                .rev()
                .map(|step| step.inverse.clone())
                .collect(),
        )
    }
}

/// Outcome of reading one `defaults` key
#[derive(Debug, Clone, PartialEq, Eq)]
enum Probe {
    Value(String),
    Missing,
    Failed(String),
}

/// `defaults`, `plist` or `profiles`, bound to a domain, plist path or
/// profile path respectively
pub struct CommandBackedDialect {
    kind: DialectKind,
    target: String,
    current_host: bool,
    runner: Arc<dyn CommandRunner>,
    programs: Programs,
}

impl std::fmt::Debug for CommandBackedDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBackedDialect")
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("current_host", &self.current_host)
            .field("programs", &self.programs)
            .finish_non_exhaustive()
    }
}

impl CommandBackedDialect {
    /// `defaults` reads and writes the current host's domain unless told
    /// otherwise with [`with_current_host`](Self::with_current_host).
    pub fn new(kind: DialectKind, target: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            kind,
            target: target.into(),
            current_host: kind == DialectKind::Defaults,
            runner,
            programs: Programs::default(),
        }
    }

    /// Ignored for `plist`, which always addresses a file
    pub fn with_current_host(mut self, current_host: bool) -> Self {
        self.current_host = current_host && self.kind == DialectKind::Defaults;
        self
    }

    pub fn with_programs(mut self, programs: Programs) -> Self {
        self.programs = programs;
        self
    }

    pub fn kind(&self) -> DialectKind {
        self.kind
    }

    pub fn set_runner(&mut self, runner: Arc<dyn CommandRunner>) {
        self.runner = runner;
    }

    /// Query OS state and compare it against `desired`
    pub fn diff(&self, desired: &DesiredData, intent: Intent) -> Result<Difference> {
        match (self.kind, desired) {
            (DialectKind::Defaults | DialectKind::Plist, DesiredData::Settings(settings)) => {
                self.check_target()?;
                let mut diff = Difference::default();
                for (key, setting) in settings {
                    let probe = self.read(key);
                    match classify(key, setting, intent, &probe)? {
                        Need::Nothing => {}
                        Need::Write => diff.fixable(key.as_str()),
                        Need::Delete => diff.removable(key.as_str()),
                        Need::Unknown(message) => diff.conditions.push(Condition::ToolFailure {
                            program: self.programs.defaults.display().to_string(),
                            message,
                        }),
                    }
                }
                Ok(diff)
            }
            (DialectKind::Profiles, DesiredData::Profiles(profiles)) => {
                self.diff_profiles(profiles, intent)
            }
            (_, other) => Err(self.unsupported(format!("cannot use {} data", other.shape()))),
        }
    }

    /// Build the commands that bring OS state in line with `desired`
    pub fn plan(&self, desired: &DesiredData, intent: Intent) -> Result<CommandPlan> {
        match (self.kind, desired) {
            (DialectKind::Defaults | DialectKind::Plist, DesiredData::Settings(settings)) => {
                self.check_target()?;
                let mut plan = CommandPlan::default();
                for (key, setting) in settings {
                    let probe = self.read(key);
                    let old = match &probe {
                        Probe::Value(value) => Some(value.clone()),
                        _ => None,
                    };
                    match classify(key, setting, intent, &probe)? {
                        Need::Nothing => {}
                        Need::Write => {
                            let args = setting.write.clone().unwrap_or_default();
                            plan.steps.push(PlanStep {
                                forward: self.defaults(["write", self.target.as_str(), key.as_str()], &args),
                                inverse: self.restore(key, old),
                            });
                        }
                        Need::Delete => plan.steps.push(PlanStep {
                            forward: self.defaults(["delete", self.target.as_str(), key.as_str()], &[]),
                            inverse: self.restore(key, old),
                        }),
                        Need::Unknown(message) => {
                            return Err(EditorError::Tool {
                                program: self.programs.defaults.display().to_string(),
                                message,
                            });
                        }
                    }
                }
                Ok(plan)
            }
            (DialectKind::Profiles, DesiredData::Profiles(profiles)) => {
                let diff = self.diff_profiles(profiles, intent)?;
                if let Some(Condition::ToolFailure { program, message }) =
                    diff.conditions.into_iter().next()
                {
                    return Err(EditorError::Tool { program, message });
                }
                if diff.fixables.is_empty() && diff.removables.is_empty() {
                    return Ok(CommandPlan::default());
                }
                let install = self.profiles("-I");
                let remove = self.profiles("-R");
                let step = match intent {
                    Intent::Present => PlanStep {
                        forward: install,
                        inverse: remove,
                    },
                    Intent::NotPresent => PlanStep {
                        forward: remove,
                        inverse: install,
                    },
                };
                Ok(CommandPlan { steps: vec![step] })
            }
            (_, other) => Err(self.unsupported(format!("cannot use {} data", other.shape()))),
        }
    }

    /// Run a planned command, failing on a non-zero exit
    pub fn execute(&self, command: &CommandSpec) -> Result<()> {
        debug!(command = %command, "Applying setting");
        self.runner.run(command)?.into_result()?;
        Ok(())
    }

    fn unsupported(&self, reason: String) -> EditorError {
        EditorError::UnsupportedData {
            dialect: self.kind,
            reason,
        }
    }

    fn check_target(&self) -> Result<()> {
        if self.kind == DialectKind::Plist && !Path::new(&self.target).is_absolute() {
            return Err(self.unsupported(format!(
                "plist target must be an absolute path, got {}",
                self.target
            )));
        }
        Ok(())
    }

    fn defaults<'a>(&self, head: impl IntoIterator<Item = &'a str>, tail: &[String]) -> CommandSpec {
        let mut argv = vec![self.programs.defaults.display().to_string()];
        if self.current_host {
            argv.push("-currentHost".to_string());
        }
        argv.extend(head.into_iter().map(str::to_string));
        argv.extend(tail.iter().cloned());
        CommandSpec::Argv(argv)
    }

    fn restore(&self, key: &str, old: Option<String>) -> CommandSpec {
        match old {
            Some(value) => self.defaults(["write", self.target.as_str(), key, value.as_str()], &[]),
            None => self.defaults(["delete", self.target.as_str(), key], &[]),
        }
    }

    fn profiles(&self, flag: &str) -> CommandSpec {
        CommandSpec::argv([
            self.programs.profiles.display().to_string(),
            flag.to_string(),
            "-F".to_string(),
            self.target.clone(),
        ])
    }

    fn read(&self, key: &str) -> Probe {
        let command = self.defaults(["read", self.target.as_str(), key], &[]);
        match self.runner.run(&command) {
            Ok(output) if output.success() => Probe::Value(output.stdout.trim().to_string()),
            Ok(output) if output.stderr.contains("does not exist") => Probe::Missing,
            Ok(output) => Probe::Failed(format!(
                "exit code {}: {}",
                output.status,
                output.stderr.trim()
            )),
            Err(e) => Probe::Failed(e.to_string()),
        }
    }

    fn diff_profiles(
        &self,
        profiles: &BTreeMap<String, BTreeMap<String, ProfileSetting>>,
        intent: Intent,
    ) -> Result<Difference> {
        let mut diff = Difference::default();
        let command = CommandSpec::argv([
            self.programs.system_profiler.display().to_string(),
            "SPConfigurationProfileDataType".to_string(),
        ]);
        let listing = match self.runner.run(&command).and_then(|o| o.into_result()) {
            Ok(output) => output.stdout,
            Err(e) => {
                diff.conditions.push(Condition::ToolFailure {
                    program: self.programs.system_profiler.display().to_string(),
                    message: e.to_string(),
                });
                return Ok(diff);
            }
        };

        for (identifier, settings) in profiles {
            let payload = installed_payload(&listing, identifier);
            match (intent, payload) {
                (Intent::NotPresent, Some(_)) => diff.removable(identifier.as_str()),
                (Intent::NotPresent, None) => {}
                (Intent::Present, None) => diff.fixable(identifier.as_str()),
                (Intent::Present, Some(payload)) => {
                    for (key, setting) in settings {
                        let ok = payload
                            .get(key)
                            .is_some_and(|installed| satisfies(installed, setting));
                        if !ok {
                            diff.fixable(format!("{identifier}.{key}"));
                        }
                    }
                }
            }
        }
        Ok(diff)
    }
}

/// What a `defaults` key needs
#[derive(Debug, PartialEq, Eq)]
enum Need {
    Nothing,
    Write,
    Delete,
    Unknown(String),
}

fn classify(key: &str, setting: &DefaultsSetting, intent: Intent, probe: &Probe) -> Result<Need> {
    let wants_value = intent == Intent::Present && setting.write.is_some();
    let need = match probe {
        Probe::Failed(message) => Need::Unknown(message.clone()),
        Probe::Missing if wants_value => Need::Write,
        Probe::Missing => Need::Nothing,
        Probe::Value(_) if !wants_value => Need::Delete,
        Probe::Value(current) => {
            let pattern = Regex::new(&format!("^(?:{})", setting.expect)).map_err(|source| {
                EditorError::Pattern {
                    key: key.to_string(),
                    source,
                }
            })?;
            if pattern.is_match(current) {
                Need::Nothing
            } else {
                Need::Write
            }
        }
    };
    Ok(need)
}

/// Payload keys of an installed profile, or `None` when it is not listed.
///
/// Only lines indented below the identifier belong to its profile.
fn installed_payload(listing: &str, identifier: &str) -> Option<BTreeMap<String, String>> {
    let indent = |line: &str| line.len() - line.trim_start().len();
    let mut lines = listing.lines();
    let header = lines.by_ref().find(|line| {
        let trimmed = line.trim();
        trimmed.strip_suffix(':').map(str::trim) == Some(identifier)
    })?;
    let depth = indent(header);
    let block = lines.take_while(|line| line.trim().is_empty() || indent(line) > depth);

    let mut payload = BTreeMap::new();
    let mut in_payload = false;
    for line in block {
        let trimmed = line.trim();
        if !in_payload {
            in_payload = trimmed.starts_with("Payload Data:");
            continue;
        }
        if trimmed.contains(':') && !trimmed.contains('=') {
            break;
        }
        if let Some((key, value)) = trimmed.split_once('=') {
            let clean = |s: &str| s.trim().trim_end_matches(';').trim().trim_matches('"').to_string();
            payload.insert(clean(key), clean(value));
        }
    }
    Some(payload)
}

fn truthy(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

fn satisfies(installed: &str, setting: &ProfileSetting) -> bool {
    match setting.kind {
        ProfileValueKind::String => installed == setting.value,
        ProfileValueKind::Bool => match (truthy(installed), truthy(&setting.value)) {
            (Some(have), Some(want)) => have == want,
            _ => false,
        },
        ProfileValueKind::Int => {
            match (installed.parse::<i64>(), setting.value.trim().parse::<i64>()) {
                (Ok(have), Ok(want)) => match setting.tolerance {
                    Tolerance::Exact => have == want,
                    Tolerance::More => have >= want,
                    Tolerance::Less => have <= want,
                },
                _ => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use hostguard_test_utils::ScriptedRunner;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    const LISTING: &str = "\
Configuration Profiles:

    Computer Profiles:

      Screensaver:

        com.example.screensaver:
          Description: Screensaver policy
          Payload Data:
            askForPassword = 1;
            askForPasswordDelay = 5;
            moduleName = \"Flurry\";
        com.example.other:
          Payload Data:
            x = 1;
";

    fn runner() -> Arc<ScriptedRunner> {
        Arc::new(ScriptedRunner::new())
    }

    #[test]
    fn payload_is_scoped_to_its_identifier() {
        let payload = installed_payload(LISTING, "com.example.screensaver").unwrap();
        assert_eq!(payload.get("askForPasswordDelay").map(String::as_str), Some("5"));
        assert_eq!(payload.get("moduleName").map(String::as_str), Some("Flurry"));
        assert!(!payload.contains_key("x"));
        assert!(installed_payload(LISTING, "com.example.missing").is_none());
    }

    #[test]
    fn profile_without_payload_does_not_borrow_the_next_one() {
        let listing = "\
com.example.bare:
  Description: No payload installed
com.example.other:
  Payload Data:
    x = 1;
";
        assert_eq!(installed_payload(listing, "com.example.bare"), Some(BTreeMap::new()));
        assert_eq!(
            installed_payload(listing, "com.example.other")
                .unwrap()
                .get("x")
                .map(String::as_str),
            Some("1")
        );
    }

    #[rstest]
    #[case("5", Tolerance::Exact, true)]
    #[case("4", Tolerance::Exact, false)]
    #[case("4", Tolerance::More, true)]
    #[case("6", Tolerance::More, false)]
    #[case("6", Tolerance::Less, true)]
    fn int_tolerance(#[case] desired: &str, #[case] tolerance: Tolerance, #[case] ok: bool) {
        let setting = ProfileSetting::new(desired, ProfileValueKind::Int).with_tolerance(tolerance);
        assert_eq!(satisfies("5", &setting), ok);
    }

    #[test]
    fn bool_accepts_numeric_and_word_forms() {
        let setting = ProfileSetting::new("true", ProfileValueKind::Bool);
        assert!(satisfies("1", &setting));
        assert!(!satisfies("0", &setting));
    }

    #[test]
    fn defaults_probe_matches_expect_prefix() {
        let runner = runner();
        runner.respond("read com.apple.screensaver idleTime", "600\n");
        let dialect =
            CommandBackedDialect::new(DialectKind::Defaults, "com.apple.screensaver", runner.clone());
        let desired = DesiredData::settings([(
            "idleTime",
            DefaultsSetting::write("600", ["-int", "600"]),
        )]);
        assert!(dialect.diff(&desired, Intent::Present).unwrap().is_compliant());
        assert!(runner.call_strings()[0].contains("-currentHost"));
    }

    #[test]
    fn missing_key_is_compliant_only_without_write() {
        let runner = runner();
        runner.fail("read", 1, "The domain/default pair of (x, k) does not exist");
        let dialect = CommandBackedDialect::new(DialectKind::Defaults, "x", runner);
        let absent = DesiredData::settings([("k", DefaultsSetting::absent())]);
        assert!(dialect.diff(&absent, Intent::Present).unwrap().is_compliant());
        let wanted = DesiredData::settings([("k", DefaultsSetting::write("1", ["-bool", "yes"]))]);
        let diff = dialect.diff(&wanted, Intent::Present).unwrap();
        assert_eq!(diff.fixables, vec!["k".to_string()]);
    }

    #[test]
    fn plan_inverts_writes_with_old_value_or_delete() {
        let runner = runner();
        runner.respond("read dom a", "0\n");
        runner.fail("read dom b", 1, "does not exist");
        let dialect =
            CommandBackedDialect::new(DialectKind::Defaults, "dom", runner).with_current_host(false);
        let desired = DesiredData::settings([
            ("a", DefaultsSetting::write("1", ["-int", "1"])),
            ("b", DefaultsSetting::write("yes", ["-bool", "yes"])),
        ]);
        let plan = dialect.plan(&desired, Intent::Present).unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(
            plan.steps[0].forward.to_shell_string(),
            "/usr/bin/defaults write dom a -int 1"
        );
        assert_eq!(
            plan.inverse(2).unwrap().to_shell_string(),
            "/usr/bin/defaults delete dom b && /usr/bin/defaults write dom a 0"
        );
        assert_eq!(
            plan.inverse(1).unwrap().to_shell_string(),
            "/usr/bin/defaults write dom a 0"
        );
    }

    #[test]
    fn plist_never_uses_current_host_and_needs_absolute_path() {
        let runner = runner();
        let dialect = CommandBackedDialect::new(DialectKind::Plist, "/Library/Prefs/x.plist", runner.clone())
            .with_current_host(true);
        let desired = DesiredData::settings([("k", DefaultsSetting::absent())]);
        dialect.diff(&desired, Intent::Present).unwrap();
        assert!(!runner.call_strings()[0].contains("-currentHost"));

        let relative = CommandBackedDialect::new(DialectKind::Plist, "x.plist", runner);
        assert!(matches!(
            relative.diff(&desired, Intent::Present),
            Err(EditorError::UnsupportedData { .. })
        ));
    }

    #[test]
    fn probe_failure_is_a_condition() {
        let runner = runner();
        runner.fail("read", 2, "permission denied");
        let dialect = CommandBackedDialect::new(DialectKind::Defaults, "dom", runner);
        let desired = DesiredData::settings([("k", DefaultsSetting::write("1", ["1"]))]);
        let diff = dialect.diff(&desired, Intent::Present).unwrap();
        assert!(matches!(diff.conditions[0], Condition::ToolFailure { .. }));
        assert!(dialect.plan(&desired, Intent::Present).is_err());
    }

    #[test]
    fn profiles_plan_installs_and_inverse_removes() {
        let runner = runner();
        runner.respond("SPConfigurationProfileDataType", LISTING);
        let dialect = CommandBackedDialect::new(DialectKind::Profiles, "/tmp/screensaver.mobileconfig", runner);
        let mut settings = BTreeMap::new();
        settings.insert(
            "askForPasswordDelay".to_string(),
            ProfileSetting::new("3", ProfileValueKind::Int),
        );
        let mut profiles = BTreeMap::new();
        profiles.insert("com.example.screensaver".to_string(), settings);
        let desired = DesiredData::Profiles(profiles);

        let diff = dialect.diff(&desired, Intent::Present).unwrap();
        assert_eq!(
            diff.fixables,
            vec!["com.example.screensaver.askForPasswordDelay".to_string()]
        );
        let plan = dialect.plan(&desired, Intent::Present).unwrap();
        assert_eq!(
            plan.steps[0].forward.to_shell_string(),
            "/usr/bin/profiles -I -F /tmp/screensaver.mobileconfig"
        );
        assert_eq!(
            plan.inverse(1).unwrap().to_shell_string(),
            "/usr/bin/profiles -R -F /tmp/screensaver.mobileconfig"
        );
    }

    #[test]
    fn tool_locations_can_be_overridden() {
        let runner = runner();
        let dialect = CommandBackedDialect::new(DialectKind::Defaults, "dom", runner.clone())
            .with_programs(Programs {
                defaults: PathBuf::from("/opt/local/bin/defaults"),
                ..Programs::default()
            });
        let desired = DesiredData::settings([("k", DefaultsSetting::absent())]);
        dialect.diff(&desired, Intent::Present).unwrap();
        assert!(runner.call_strings()[0].starts_with("/opt/local/bin/defaults -currentHost read"));
    }

    #[test]
    fn wrong_shape_is_unsupported() {
        let dialect = CommandBackedDialect::new(DialectKind::Profiles, "/p", runner());
        let desired = DesiredData::entries([("a", "b")]);
        assert!(matches!(
            dialect.diff(&desired, Intent::Present),
            Err(EditorError::UnsupportedData { .. })
        ));
    }
}
