//! Flat key/value dialects: `openeq`, `closedeq` and `space`

use std::collections::BTreeMap;

use crate::data::{Condition, DesiredData, Intent, Value};
use crate::dialect::{
    DialectKind, Difference, Document, Line, TextDialect, body, is_ignorable, physical_lines,
};
use crate::error::{EditorError, Result};

/// How a key is separated from its value on one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    /// `=` with any surrounding whitespace
    OpenEq,
    /// `=` with no space or exactly one on each side
    ClosedEq,
    /// Runs of whitespace
    Space,
}

impl Separator {
    /// Whether a key holds exactly one value
    pub fn is_pair(&self) -> bool {
        !matches!(self, Self::Space)
    }

    pub(crate) fn parse(&self, raw: &str, section: Option<&str>) -> Line {
        if is_ignorable(raw) {
            return Line::Other(raw.to_string());
        }
        let text = body(raw);
        let section = section.map(str::to_string);

        if let Self::Space = self {
            let mut tokens = text.split_whitespace();
            let key = tokens.next().unwrap_or_default().to_string();
            let value = tokens.collect::<Vec<_>>().join(" ");
            return Line::Entry {
                section,
                key,
                value,
                raw: raw.to_string(),
            };
        }

        let Some((left, right)) = text.split_once('=') else {
            return Line::Other(raw.to_string());
        };
        let key = left.trim();
        if key.is_empty() {
            return Line::Malformed {
                section,
                key: None,
                reason: "missing key before '='".to_string(),
                raw: raw.to_string(),
            };
        }

        if let Self::ClosedEq = self {
            let before = &left[left.trim_end().len()..];
            let after = &right[..right.len() - right.trim_start().len()];
            if !matches!((before, after), ("", "") | (" ", " ")) {
                return Line::Malformed {
                    section,
                    key: Some(key.to_string()),
                    reason: "expected no space or exactly one space around '='".to_string(),
                    raw: raw.to_string(),
                };
            }
        }

        Line::Entry {
            section,
            key: key.to_string(),
            value: right.trim().to_string(),
            raw: raw.to_string(),
        }
    }

    /// Canonical line text without terminator
    pub(crate) fn format(&self, key: &str, value: &str) -> String {
        match self {
            Self::OpenEq => format!("{key} = {value}"),
            Self::ClosedEq => format!("{key}={value}"),
            Self::Space if value.is_empty() => key.to_string(),
            Self::Space => format!("{key} {value}"),
        }
    }

    /// Desired values in the form they are compared against parsed ones
    fn normalized(&self, key: &str, value: &Value) -> Result<Vec<String>> {
        let values = value.values();
        if self.is_pair() && values.len() != 1 {
            return Err(EditorError::UnsupportedData {
                dialect: self.kind(),
                reason: format!("{key} must have exactly one value"),
            });
        }
        Ok(values
            .into_iter()
            .map(|v| match self {
                Self::Space => v.split_whitespace().collect::<Vec<_>>().join(" "),
                _ => v.trim().to_string(),
            })
            .collect())
    }

    /// Whether `value` replaces whatever the key holds. A list under the
    /// space dialect only asks for each listed line to exist, and removal
    /// there only drops the exact lines.
    fn single_valued(&self, intent: Intent, value: &Value) -> bool {
        match intent {
            Intent::Present => self.is_pair() || matches!(value, Value::One(_)),
            Intent::NotPresent => self.is_pair(),
        }
    }

    fn kind(&self) -> DialectKind {
        match self {
            Self::OpenEq => DialectKind::OpenEq,
            Self::ClosedEq => DialectKind::ClosedEq,
            Self::Space => DialectKind::Space,
        }
    }

    /// Record whether `key` in `section` is out of line with `value`.
    /// Sectioned keys are reported as `section.key`. Unparseable lines only
    /// count against compliance when they carry this key, since those are
    /// the lines a fix rewrites.
    pub(crate) fn check(
        &self,
        doc: &Document,
        section: Option<&str>,
        key: &str,
        value: &Value,
        intent: Intent,
        diff: &mut Difference,
    ) -> Result<()> {
        let label = match section {
            Some(name) => format!("{name}.{key}"),
            None => key.to_string(),
        };
        let label = label.as_str();
        let wanted = self.normalized(key, value)?;
        for (index, line) in doc.lines.iter().enumerate() {
            if let Line::Malformed { reason, .. } = line
                && line.key_in(section) == Some(key)
            {
                diff.conditions.push(Condition::InvalidFormat {
                    line: index + 1,
                    reason: reason.clone(),
                });
            }
        }
        let occurrences: Vec<&Line> = doc
            .lines
            .iter()
            .filter(|line| line.key_in(section) == Some(key))
            .collect();

        match (intent, self.single_valued(intent, value)) {
            (Intent::Present, true) => {
                let satisfied = !occurrences.is_empty()
                    && occurrences.iter().all(|line| {
                        matches!(line, Line::Entry { value, .. } if *value == wanted[0])
                    });
                if !satisfied {
                    diff.fixable(label);
                }
            }
            (Intent::NotPresent, true) => {
                if !occurrences.is_empty() {
                    diff.removable(label);
                }
            }
            (Intent::Present, false) => {
                let missing = wanted
                    .iter()
                    .any(|want| !occurrences.iter().any(|line| holds(line, want)));
                if missing {
                    diff.fixable(label);
                }
            }
            (Intent::NotPresent, false) => {
                let found = wanted
                    .iter()
                    .any(|want| occurrences.iter().any(|line| holds(line, want)));
                if found {
                    diff.removable(label);
                }
            }
        }
        Ok(())
    }

    /// Bring `key` in `section` in line with `value`, editing `doc` in place
    pub(crate) fn apply(
        &self,
        doc: &mut Document,
        section: Option<&str>,
        key: &str,
        value: &Value,
        intent: Intent,
    ) -> Result<()> {
        let wanted = self.normalized(key, value)?;
        let positions: Vec<usize> = doc
            .lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.key_in(section) == Some(key))
            .map(|(index, _)| index)
            .collect();

        match (intent, self.single_valued(intent, value)) {
            (Intent::Present, true) => {
                let want = &wanted[0];
                let satisfied = !positions.is_empty()
                    && positions.iter().all(|&index| {
                        matches!(&doc.lines[index], Line::Entry { value, .. } if value == want)
                    });
                if satisfied {
                    return Ok(());
                }
                match positions.split_first() {
                    Some((&first, rest)) => {
                        let raw = format!("{}{}", self.format(key, want), doc.lines[first].ending());
                        doc.lines[first] = self.entry(section, key, want, raw);
                        for &index in rest.iter().rev() {
                            doc.lines.remove(index);
                        }
                    }
                    None => {
                        let raw = format!("{}\n", self.format(key, want));
                        place(doc, section, self.entry(section, key, want, raw));
                    }
                }
            }
            (Intent::NotPresent, true) => {
                for &index in positions.iter().rev() {
                    doc.lines.remove(index);
                }
            }
            (Intent::Present, false) => {
                for want in &wanted {
                    let present = positions.iter().any(|&index| holds(&doc.lines[index], want));
                    if !present {
                        let raw = format!("{}\n", self.format(key, want));
                        place(doc, section, self.entry(section, key, want, raw));
                    }
                }
            }
            (Intent::NotPresent, false) => {
                for &index in positions.iter().rev() {
                    if wanted.iter().any(|want| holds(&doc.lines[index], want)) {
                        doc.lines.remove(index);
                    }
                }
            }
        }
        Ok(())
    }

    fn entry(&self, section: Option<&str>, key: &str, value: &str, raw: String) -> Line {
        Line::Entry {
            section: section.map(str::to_string),
            key: key.to_string(),
            value: value.to_string(),
            raw,
        }
    }
}

fn holds(line: &Line, want: &str) -> bool {
    matches!(line, Line::Entry { value, .. } if value == want)
}

/// Put a new line at the end of its section, or of the document
fn place(doc: &mut Document, section: Option<&str>, line: Line) {
    let last = section.and_then(|name| {
        doc.lines
            .iter()
            .rposition(|existing| existing.section() == Some(name))
    });
    match last {
        Some(index) => doc.insert_after(index, line),
        None => doc.append(line),
    }
}

/// The flat dialects. Keys live at top level; there are no sections.
#[derive(Debug, Clone, Copy)]
pub struct KeyValueDialect {
    separator: Separator,
}

impl KeyValueDialect {
    pub fn new(separator: Separator) -> Self {
        Self { separator }
    }

    fn entries<'a>(&self, desired: &'a DesiredData) -> Result<&'a BTreeMap<String, Value>> {
        match desired {
            DesiredData::Entries(entries) => Ok(entries),
            other => Err(EditorError::UnsupportedData {
                dialect: self.kind(),
                reason: format!("expected entries, got {}", other.shape()),
            }),
        }
    }
}

impl TextDialect for KeyValueDialect {
    fn kind(&self) -> DialectKind {
        self.separator.kind()
    }

    fn parse(&self, content: &str) -> Document {
        Document {
            lines: physical_lines(content)
                .map(|raw| self.separator.parse(raw, None))
                .collect(),
        }
    }

    fn diff(&self, doc: &Document, desired: &DesiredData, intent: Intent) -> Result<Difference> {
        let mut diff = Difference::default();
        for (key, value) in self.entries(desired)? {
            self.separator
                .check(doc, None, key, value, intent, &mut diff)?;
        }
        Ok(diff)
    }

    fn render(&self, doc: &Document, desired: &DesiredData, intent: Intent) -> Result<String> {
        let mut doc = doc.clone();
        for (key, value) in self.entries(desired)? {
            self.separator.apply(&mut doc, None, key, value, intent)?;
        }
        Ok(doc.render())
    }
}
