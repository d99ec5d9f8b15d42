//! [`ScriptedRunner`] command runner double.

use std::sync::Mutex;

use hostguard_exec::{CommandOutput, CommandRunner, CommandSpec, Result};

/// Replays canned output for commands whose shell rendering contains a
/// registered fragment. Unmatched commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<(String, CommandOutput)>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands containing `fragment` with `stdout` and exit 0.
    /// Later rules take precedence over earlier ones.
    pub fn respond(&self, fragment: &str, stdout: &str) -> &Self {
        self.respond_with(
            fragment,
            CommandOutput {
                status: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        )
    }

    /// Answer commands containing `fragment` with a failing exit status.
    pub fn fail(&self, fragment: &str, status: i32, stderr: &str) -> &Self {
        self.respond_with(
            fragment,
            CommandOutput {
                status,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        )
    }

    pub fn respond_with(&self, fragment: &str, output: CommandOutput) -> &Self {
        self.rules
            .lock()
            .unwrap()
            .push((fragment.to_string(), output));
        self
    }

    /// Every command run so far, in order
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Shell renderings of every command run so far
    pub fn call_strings(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(CommandSpec::to_shell_string)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(command.clone());
        let rendered = command.to_shell_string();
        let rules = self.rules.lock().unwrap();
        let output = rules
            .iter()
            .rev()
            .find(|(fragment, _)| rendered.contains(fragment.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default();
        Ok(output)
    }
}
