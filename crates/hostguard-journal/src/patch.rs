//! Unified diffs and their application
//!
//! [`unified_diff`] produces the patch stored for each file change; the
//! [`PatchApplier`] implementations apply it on revert. Lines are split on
//! `\n` only, keeping the terminator, so a diff/apply cycle is byte-exact.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hostguard_exec::{CommandRunner, CommandSpec, ExecError, SystemRunner};
use hostguard_fs::io;
use similar::{ChangeTag, TextDiff};
use tracing::debug;

use crate::config::PatchBackend;
use crate::error::{JournalError, Result};

const CONTEXT_LINES: usize = 3;
const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

/// Errors in the patch text or in matching it against a file
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("malformed patch at line {line}: {reason}")]
    Malformed { line: usize, reason: &'static str },

    #[error("hunk {hunk} does not match the file at line {line}")]
    Mismatch { hunk: usize, line: usize },

    #[error("hunk {hunk} is out of order or beyond the end of the file")]
    OutOfRange { hunk: usize },
}

/// Render a unified diff turning `from` into `to`.
///
/// Identical inputs produce an empty string.
pub fn unified_diff(from: &str, to: &str, from_label: &str, to_label: &str) -> String {
    if from == to {
        return String::new();
    }

    let old_lines: Vec<&str> = from.split_inclusive('\n').collect();
    let new_lines: Vec<&str> = to.split_inclusive('\n').collect();
    let diff = TextDiff::configure().diff_slices(&old_lines, &new_lines);

    let mut out = format!("--- {from_label}\n+++ {to_label}\n");
    for group in diff.grouped_ops(CONTEXT_LINES) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        out.push_str(&format!(
            "@@ -{} +{} @@\n",
            format_range(first.old_range().start, last.old_range().end),
            format_range(first.new_range().start, last.new_range().end),
        ));
        for op in &group {
            for change in diff.iter_changes(op) {
                out.push(match change.tag() {
                    ChangeTag::Equal => ' ',
                    ChangeTag::Delete => '-',
                    ChangeTag::Insert => '+',
                });
                let value = change.value();
                out.push_str(value);
                if !value.ends_with('\n') {
                    out.push('\n');
                    out.push_str(NO_NEWLINE_MARKER);
                    out.push('\n');
                }
            }
        }
    }
    out
}

fn format_range(start: usize, end: usize) -> String {
    match end - start {
        0 => format!("{start},0"),
        1 => format!("{}", start + 1),
        len => format!("{},{len}", start + 1),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

impl HunkLine {
    fn text_mut(&mut self) -> &mut String {
        match self {
            Self::Context(text) | Self::Remove(text) | Self::Add(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Hunk {
    old_start: usize,
    old_len: usize,
    lines: Vec<HunkLine>,
}

/// A parsed unified diff
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnifiedPatch {
    hunks: Vec<Hunk>,
}

impl UnifiedPatch {
    /// Parse unified diff text. `---`/`+++` headers and anything outside
    /// hunks are ignored.
    pub fn parse(text: &str) -> std::result::Result<Self, PatchError> {
        let mut hunks = Vec::new();
        let mut lines = text.split_inclusive('\n').enumerate().peekable();

        while let Some((number, line)) = lines.next() {
            if !line.starts_with("@@") {
                continue;
            }
            let (old_start, old_len, new_len) =
                parse_hunk_header(line).ok_or(PatchError::Malformed {
                    line: number + 1,
                    reason: "bad hunk header",
                })?;

            let mut body: Vec<HunkLine> = Vec::new();
            let (mut old_left, mut new_left) = (old_len, new_len);
            while old_left > 0 || new_left > 0 {
                let Some((number, line)) = lines.next() else {
                    return Err(PatchError::Malformed {
                        line: text.lines().count(),
                        reason: "hunk ends early",
                    });
                };
                let malformed = |reason| PatchError::Malformed {
                    line: number + 1,
                    reason,
                };
                let (tag, rest) = match line.chars().next() {
                    Some('\n') => (' ', line),
                    Some(tag) => (tag, &line[tag.len_utf8()..]),
                    None => return Err(malformed("empty line")),
                };
                match tag {
                    ' ' if old_left > 0 && new_left > 0 => {
                        old_left -= 1;
                        new_left -= 1;
                        body.push(HunkLine::Context(rest.to_string()));
                    }
                    '-' if old_left > 0 => {
                        old_left -= 1;
                        body.push(HunkLine::Remove(rest.to_string()));
                    }
                    '+' if new_left > 0 => {
                        new_left -= 1;
                        body.push(HunkLine::Add(rest.to_string()));
                    }
                    '\\' => strip_newline(&mut body).map_err(|_| malformed("marker without line"))?,
                    _ => return Err(malformed("line does not fit the hunk")),
                }
            }

            if let Some((_, next)) = lines.peek()
                && next.starts_with('\\')
            {
                lines.next();
                strip_newline(&mut body).map_err(|_| PatchError::Malformed {
                    line: number + 1,
                    reason: "marker without line",
                })?;
            }

            hunks.push(Hunk {
                old_start,
                old_len,
                lines: body,
            });
        }

        Ok(Self { hunks })
    }

    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    /// Apply to `original`, verifying every context and removed line
    pub fn apply(&self, original: &str) -> std::result::Result<String, PatchError> {
        let lines: Vec<&str> = original.split_inclusive('\n').collect();
        let mut out = String::with_capacity(original.len());
        let mut cursor = 0;

        for (index, hunk) in self.hunks.iter().enumerate() {
            let number = index + 1;
            let start = if hunk.old_len == 0 {
                hunk.old_start
            } else {
                hunk.old_start.saturating_sub(1)
            };
            if start < cursor || start > lines.len() {
                return Err(PatchError::OutOfRange { hunk: number });
            }
            lines[cursor..start].iter().for_each(|l| out.push_str(l));

            let mut pos = start;
            for line in &hunk.lines {
                match line {
                    HunkLine::Context(text) | HunkLine::Remove(text) => {
                        if lines.get(pos) != Some(&text.as_str()) {
                            return Err(PatchError::Mismatch {
                                hunk: number,
                                line: pos + 1,
                            });
                        }
                        if matches!(line, HunkLine::Context(_)) {
                            out.push_str(text);
                        }
                        pos += 1;
                    }
                    HunkLine::Add(text) => out.push_str(text),
                }
            }
            cursor = pos;
        }

        lines[cursor..].iter().for_each(|l| out.push_str(l));
        Ok(out)
    }
}

fn parse_hunk_header(line: &str) -> Option<(usize, usize, usize)> {
    let inner = line.strip_prefix("@@ -")?;
    let (ranges, _) = inner.split_once(" @@")?;
    let (old, new) = ranges.split_once(" +")?;
    let (old_start, old_len) = parse_range(old)?;
    let (_, new_len) = parse_range(new)?;
    Some((old_start, old_len, new_len))
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    match range.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

fn strip_newline(body: &mut [HunkLine]) -> std::result::Result<(), ()> {
    let text = body.last_mut().ok_or(())?.text_mut();
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(())
}

/// Applies a stored patch file to a target in place
pub trait PatchApplier: Send + Sync {
    fn apply(&self, target: &Path, patch_file: &Path) -> Result<()>;
}

/// Build the applier selected by configuration
pub fn applier_for(backend: &PatchBackend) -> Box<dyn PatchApplier> {
    match backend {
        PatchBackend::InProcess => Box::new(InProcessPatcher),
        PatchBackend::External { program } => Box::new(ExternalPatchUtility::new(
            program.clone(),
            Arc::new(SystemRunner::new()),
        )),
    }
}

/// Applies patches without spawning a process.
///
/// Every hunk is verified before the target is rewritten; a rejected patch
/// leaves the target untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessPatcher;

impl PatchApplier for InProcessPatcher {
    fn apply(&self, target: &Path, patch_file: &Path) -> Result<()> {
        let rejected = |reason: String| JournalError::PatchRejected {
            path: target.to_path_buf(),
            reason,
        };

        let patch_text = io::read_text(patch_file)?;
        let patch = UnifiedPatch::parse(&patch_text).map_err(|e| rejected(e.to_string()))?;

        let original = fs::read(target).map_err(|e| hostguard_fs::Error::io(target, e))?;
        let original =
            String::from_utf8(original).map_err(|_| rejected("target is not UTF-8 text".into()))?;

        let patched = patch.apply(&original).map_err(|e| rejected(e.to_string()))?;
        io::write_atomic_preserving(target, patched.as_bytes())?;
        debug!(target = %target.display(), patch = %patch_file.display(), "Applied patch");
        Ok(())
    }
}

/// Applies patches with `patch -p0 -u -f <target> <patchfile>`
pub struct ExternalPatchUtility {
    program: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl ExternalPatchUtility {
    pub fn new(program: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    fn failure(&self, message: impl Into<String>) -> JournalError {
        JournalError::ExternalTool {
            program: self.program.display().to_string(),
            message: message.into(),
        }
    }
}

impl PatchApplier for ExternalPatchUtility {
    fn apply(&self, target: &Path, patch_file: &Path) -> Result<()> {
        if !self.program.exists() {
            return Err(self.failure("program not found"));
        }

        let command = CommandSpec::argv([
            self.program.display().to_string(),
            "-p0".to_string(),
            "-u".to_string(),
            "-f".to_string(),
            target.display().to_string(),
            patch_file.display().to_string(),
        ]);

        match self.runner.run(&command) {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(self.failure(format!(
                "exit code {}: {}",
                output.status,
                output.stderr.trim()
            ))),
            Err(ExecError::ProgramNotFound { .. }) => Err(self.failure("program not found")),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostguard_test_utils::ScriptedRunner;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::tempdir;

    fn round_trip(from: &str, to: &str) -> String {
        let diff = unified_diff(from, to, "a", "b");
        UnifiedPatch::parse(&diff).unwrap().apply(from).unwrap()
    }

    #[test]
    fn diff_has_headers_and_hunk() {
        let diff = unified_diff("foo = bar\n", "foo = baz\n", "/tmp/new", "/etc/conf");
        assert_eq!(
            diff,
            "--- /tmp/new\n+++ /etc/conf\n@@ -1 +1 @@\n-foo = bar\n+foo = baz\n"
        );
    }

    #[test]
    fn identical_inputs_produce_empty_patch() {
        assert_eq!(unified_diff("same\n", "same\n", "a", "b"), "");
        assert!(UnifiedPatch::parse("").unwrap().is_empty());
    }

    #[rstest]
    #[case("", "line\n")]
    #[case("line\n", "")]
    #[case("a\nb\nc\n", "a\nB\nc\n")]
    #[case("no newline", "no newline\n")]
    #[case("x\n", "x")]
    #[case("1\n2\n3\n4\n5\n6\n7\n8\n9\n10\n", "1\n2\nthree\n4\n5\n6\n7\n8\nnine\n10\n")]
    #[case("carriage\r\nreturn\r\n", "carriage\nreturn\r\n")]
    fn apply_reproduces_target(#[case] from: &str, #[case] to: &str) {
        assert_eq!(round_trip(from, to), to);
    }

    #[test]
    fn no_newline_marker_is_emitted() {
        let diff = unified_diff("a\n", "a\nb", "x", "y");
        assert!(diff.contains("+b\n\\ No newline at end of file\n"));
    }

    #[test]
    fn hunk_header_without_count_means_one_line() {
        let patch = UnifiedPatch::parse("@@ -2 +2 @@\n-b\n+B\n").unwrap();
        assert_eq!(patch.apply("a\nb\nc\n").unwrap(), "a\nB\nc\n");
    }

    #[test]
    fn mismatching_context_is_rejected() {
        let diff = unified_diff("a\nb\nc\n", "a\nX\nc\n", "x", "y");
        let patch = UnifiedPatch::parse(&diff).unwrap();
        assert!(matches!(
            patch.apply("a\nchanged\nc\n"),
            Err(PatchError::Mismatch { hunk: 1, .. })
        ));
    }

    #[test]
    fn truncated_hunk_is_malformed() {
        assert!(matches!(
            UnifiedPatch::parse("@@ -1,2 +1,2 @@\n a\n"),
            Err(PatchError::Malformed { .. })
        ));
    }

    #[test]
    fn in_process_patcher_leaves_file_untouched_on_rejection() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("conf");
        let patch_file = dir.path().join("conf.patch");
        std::fs::write(&target, "unrelated\n").unwrap();
        std::fs::write(&patch_file, unified_diff("a\n", "b\n", "x", "y")).unwrap();

        let err = InProcessPatcher.apply(&target, &patch_file).unwrap_err();
        assert!(matches!(err, JournalError::PatchRejected { .. }));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "unrelated\n");
    }

    #[test]
    fn external_utility_runs_patch_with_target_and_file() {
        let dir = tempdir().unwrap();
        let program = dir.path().join("patch");
        std::fs::write(&program, "").unwrap();

        let runner = Arc::new(ScriptedRunner::new());
        let utility = ExternalPatchUtility::new(&program, runner.clone());
        utility
            .apply(Path::new("/etc/hosts"), Path::new("/var/db/hosts.patch-0001001"))
            .unwrap();

        assert_eq!(
            runner.call_strings(),
            vec![format!(
                "{} -p0 -u -f /etc/hosts /var/db/hosts.patch-0001001",
                program.display()
            )]
        );
    }

    #[test]
    fn external_utility_reports_missing_program_and_failure() {
        let dir = tempdir().unwrap();
        let missing = ExternalPatchUtility::new(
            dir.path().join("absent"),
            Arc::new(ScriptedRunner::new()),
        );
        assert!(matches!(
            missing.apply(Path::new("/t"), Path::new("/p")),
            Err(JournalError::ExternalTool { .. })
        ));

        let program = dir.path().join("patch");
        std::fs::write(&program, "").unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail("-p0", 1, "Hunk #1 FAILED");
        let failing = ExternalPatchUtility::new(&program, runner);
        match failing.apply(Path::new("/t"), Path::new("/p")) {
            Err(JournalError::ExternalTool { message, .. }) => {
                assert!(message.contains("Hunk #1 FAILED"))
            }
            other => panic!("expected ExternalTool, got {other:?}"),
        }
    }
}
