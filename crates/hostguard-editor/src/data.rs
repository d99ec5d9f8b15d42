//! Desired state handed to a [`ConfigEditor`](crate::ConfigEditor)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Whether desired entries must be present or absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    #[default]
    Present,
    NotPresent,
}

/// A desired value. `Many` is only accepted by the space dialect, where
/// every listed value is its own `key value` line (blacklist-style files).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    One(String),
    Many(Vec<String>),
}

impl Value {
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::One(value) => vec![value.as_str()],
            Self::Many(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::One(value)
    }
}

impl<S: Into<String>> From<Vec<S>> for Value {
    fn from(values: Vec<S>) -> Self {
        Self::Many(values.into_iter().map(Into::into).collect())
    }
}

/// One `defaults`/`plist` key.
///
/// `expect` is a regular expression matched at the start of the current
/// value. With `write` set to `None` the key must not exist at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultsSetting {
    pub expect: String,
    pub write: Option<Vec<String>>,
}

impl DefaultsSetting {
    /// Expect a value matching `expect`, writing `args` when it does not
    pub fn write<I, S>(expect: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            expect: expect.into(),
            write: Some(args.into_iter().map(Into::into).collect()),
        }
    }

    /// The key must not exist
    pub fn absent() -> Self {
        Self {
            expect: String::new(),
            write: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileValueKind {
    Bool,
    Int,
    String,
}

/// How an installed integer may deviate from the desired one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tolerance {
    #[default]
    Exact,
    /// Larger values are also compliant
    More,
    /// Smaller values are also compliant
    Less,
}

/// One payload key of a configuration profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSetting {
    pub value: String,
    pub kind: ProfileValueKind,
    #[serde(default)]
    pub tolerance: Tolerance,
}

impl ProfileSetting {
    pub fn new(value: impl Into<String>, kind: ProfileValueKind) -> Self {
        Self {
            value: value.into(),
            kind,
            tolerance: Tolerance::Exact,
        }
    }

    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Desired state, shaped per dialect family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredData {
    /// key → value, for `openeq`, `closedeq` and `space`
    Entries(BTreeMap<String, Value>),
    /// section → key → value, for `tagconf`
    Sections(BTreeMap<String, BTreeMap<String, Value>>),
    /// key → setting, for `defaults` and `plist`
    Settings(BTreeMap<String, DefaultsSetting>),
    /// payload identifier → key → setting, for `profiles`
    Profiles(BTreeMap<String, BTreeMap<String, ProfileSetting>>),
}

impl DesiredData {
    pub fn entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Entries(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn sections<I, S, E, K, V>(sections: I) -> Self
    where
        I: IntoIterator<Item = (S, E)>,
        S: Into<String>,
        E: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Sections(
            sections
                .into_iter()
                .map(|(s, entries)| {
                    (
                        s.into(),
                        entries
                            .into_iter()
                            .map(|(k, v)| (k.into(), v.into()))
                            .collect(),
                    )
                })
                .collect(),
        )
    }

    pub fn settings<I, K>(settings: I) -> Self
    where
        I: IntoIterator<Item = (K, DefaultsSetting)>,
        K: Into<String>,
    {
        Self::Settings(settings.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn shape(&self) -> &'static str {
        match self {
            Self::Entries(_) => "entries",
            Self::Sections(_) => "sections",
            Self::Settings(_) => "settings",
            Self::Profiles(_) => "profiles",
        }
    }
}

/// Something `report` noticed beyond plain (non)compliance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// A line could not be parsed in the dialect
    InvalidFormat { line: usize, reason: String },
    /// The desired data cannot be expressed in the dialect
    UnsupportedData { reason: String },
    /// The state-query tool failed
    ToolFailure { program: String, message: String },
}
