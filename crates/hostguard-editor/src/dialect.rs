//! Dialect selection and the text-dialect interface

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::{Condition, DesiredData, Intent};
use crate::error::Result;

/// Supported configuration dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    /// `key = value` with any whitespace around `=`
    OpenEq,
    /// `key=value` or `key = value`
    ClosedEq,
    /// `key value`
    Space,
    /// `[section]` headers over `key = value` lines
    TagConf,
    /// `defaults read/write` against a domain
    Defaults,
    /// `defaults read/write` against a plist file
    Plist,
    /// Installed configuration profiles
    Profiles,
}

impl DialectKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenEq => "openeq",
            Self::ClosedEq => "closedeq",
            Self::Space => "space",
            Self::TagConf => "tagconf",
            Self::Defaults => "defaults",
            Self::Plist => "plist",
            Self::Profiles => "profiles",
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DialectKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openeq" => Ok(Self::OpenEq),
            "closedeq" => Ok(Self::ClosedEq),
            "space" => Ok(Self::Space),
            "tagconf" => Ok(Self::TagConf),
            "defaults" => Ok(Self::Defaults),
            "plist" => Ok(Self::Plist),
            "profiles" => Ok(Self::Profiles),
            other => Err(format!("unknown dialect: {other}")),
        }
    }
}

/// One physical line of a parsed artifact. `raw` keeps the original text
/// including its line ending so untouched lines render byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Blank lines, comments and anything the dialect does not address
    Other(String),
    Section {
        name: String,
        raw: String,
    },
    Entry {
        section: Option<String>,
        key: String,
        value: String,
        raw: String,
    },
    /// A line the dialect cannot parse. `key` is set when one could still
    /// be recognized, so fixes can replace the line.
    Malformed {
        section: Option<String>,
        key: Option<String>,
        reason: String,
        raw: String,
    },
}

impl Line {
    pub fn raw(&self) -> &str {
        match self {
            Self::Other(raw)
            | Self::Section { raw, .. }
            | Self::Entry { raw, .. }
            | Self::Malformed { raw, .. } => raw,
        }
    }

    fn raw_mut(&mut self) -> &mut String {
        match self {
            Self::Other(raw)
            | Self::Section { raw, .. }
            | Self::Entry { raw, .. }
            | Self::Malformed { raw, .. } => raw,
        }
    }

    /// Key carried by the line within `section`, if any
    pub fn key_in(&self, section: Option<&str>) -> Option<&str> {
        match self {
            Self::Entry {
                section: s, key, ..
            } if s.as_deref() == section => Some(key.as_str()),
            Self::Malformed {
                section: s,
                key: Some(key),
                ..
            } if s.as_deref() == section => Some(key.as_str()),
            _ => None,
        }
    }

    pub fn section(&self) -> Option<&str> {
        match self {
            Self::Section { name, .. } => Some(name.as_str()),
            Self::Entry { section, .. } | Self::Malformed { section, .. } => section.as_deref(),
            Self::Other(_) => None,
        }
    }

    /// Line terminator of the raw text
    pub fn ending(&self) -> &str {
        let raw = self.raw();
        if raw.ends_with("\r\n") {
            "\r\n"
        } else if raw.ends_with('\n') {
            "\n"
        } else {
            ""
        }
    }
}

/// A parsed artifact
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub lines: Vec<Line>,
}

impl Document {
    pub fn render(&self) -> String {
        self.lines.iter().map(Line::raw).collect()
    }

    /// Make sure the line at `index` ends with a newline before something
    /// is placed after it
    pub(crate) fn terminate(&mut self, index: usize) {
        if let Some(line) = self.lines.get_mut(index)
            && line.ending().is_empty()
        {
            line.raw_mut().push('\n');
        }
    }

    /// Append `line` at the end, terminating the current last line first
    pub(crate) fn append(&mut self, line: Line) {
        if let Some(last) = self.lines.len().checked_sub(1) {
            self.terminate(last);
        }
        self.lines.push(line);
    }

    /// Insert `line` after `index`
    pub(crate) fn insert_after(&mut self, index: usize, line: Line) {
        self.terminate(index);
        self.lines.insert(index + 1, line);
    }
}

/// Keys that are not in the desired state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Difference {
    /// Keys missing or holding the wrong value
    pub fixables: Vec<String>,
    /// Keys present that must be absent
    pub removables: Vec<String>,
    pub conditions: Vec<Condition>,
}

impl Difference {
    pub fn is_compliant(&self) -> bool {
        self.fixables.is_empty() && self.removables.is_empty() && self.conditions.is_empty()
    }

    pub(crate) fn fixable(&mut self, key: impl Into<String>) {
        let key = key.into();
        if !self.fixables.contains(&key) {
            self.fixables.push(key);
        }
    }

    pub(crate) fn removable(&mut self, key: impl Into<String>) {
        let key = key.into();
        if !self.removables.contains(&key) {
            self.removables.push(key);
        }
    }
}

/// A text configuration dialect
pub trait TextDialect: Send + Sync {
    fn kind(&self) -> DialectKind;

    /// Parse artifact content. Unparseable lines become [`Line::Malformed`].
    fn parse(&self, content: &str) -> Document;

    /// Compare a parsed artifact against the desired state
    fn diff(&self, doc: &Document, desired: &DesiredData, intent: Intent) -> Result<Difference>;

    /// Produce corrected content, leaving unrelated lines untouched
    fn render(&self, doc: &Document, desired: &DesiredData, intent: Intent) -> Result<String>;
}

/// Split `content` into lines, keeping each terminator
pub(crate) fn physical_lines(content: &str) -> impl Iterator<Item = &str> {
    content.split_inclusive('\n')
}

/// Line text without its terminator
pub(crate) fn body(raw: &str) -> &str {
    raw.trim_end_matches(['\n', '\r'])
}

/// Blank or `#` comment
pub(crate) fn is_ignorable(raw: &str) -> bool {
    let trimmed = body(raw).trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}
