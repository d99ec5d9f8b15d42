//! Change events and their identifiers
//!
//! Every reversible mutation is recorded under an [`EventId`] of the form
//! `RRRRSSS`: a zero-padded four digit policy id followed by a zero-padded
//! three digit sequence number.

use std::borrow::Borrow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use hostguard_exec::CommandSpec;
use serde::{Deserialize, Serialize};

use crate::error::{JournalError, Result};

const POLICY_DIGITS: usize = 4;
const SEQUENCE_DIGITS: usize = 3;
const MAX_POLICY: u16 = 9999;
const MAX_SEQUENCE: u16 = 999;

/// Numeric policy identifier, rendered zero-padded to four digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PolicyId(u16);

impl PolicyId {
    pub fn new(id: u16) -> Result<Self> {
        if id > MAX_POLICY {
            return Err(JournalError::MalformedPolicy { id: id.to_string() });
        }
        Ok(Self(id))
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

/// A policy id as handed in by a caller, either numeric or pre-formatted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyRef {
    Number(i64),
    Text(String),
}

impl From<i32> for PolicyRef {
    fn from(id: i32) -> Self {
        Self::Number(i64::from(id))
    }
}

impl From<i64> for PolicyRef {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

impl From<u32> for PolicyRef {
    fn from(id: u32) -> Self {
        Self::Number(i64::from(id))
    }
}

impl From<u16> for PolicyRef {
    fn from(id: u16) -> Self {
        Self::Number(i64::from(id))
    }
}

impl From<&str> for PolicyRef {
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

impl From<&String> for PolicyRef {
    fn from(id: &String) -> Self {
        Self::Text(id.clone())
    }
}

impl From<String> for PolicyRef {
    fn from(id: String) -> Self {
        Self::Text(id)
    }
}

impl From<PolicyId> for PolicyRef {
    fn from(id: PolicyId) -> Self {
        Self::Number(i64::from(id.0))
    }
}

impl TryFrom<PolicyRef> for PolicyId {
    type Error = JournalError;

    fn try_from(value: PolicyRef) -> Result<Self> {
        match value {
            PolicyRef::Number(n) => u16::try_from(n)
                .ok()
                .filter(|n| *n <= MAX_POLICY)
                .map(PolicyId)
                .ok_or(JournalError::MalformedPolicy { id: n.to_string() }),
            PolicyRef::Text(text) => {
                let trimmed = text.trim();
                let valid = !trimmed.is_empty()
                    && trimmed.len() <= POLICY_DIGITS
                    && trimmed.bytes().all(|b| b.is_ascii_digit());
                if !valid {
                    return Err(JournalError::MalformedPolicy { id: text });
                }
                trimmed
                    .parse::<u16>()
                    .map(PolicyId)
                    .map_err(|_| JournalError::MalformedPolicy { id: text.clone() })
            }
        }
    }
}

/// Identifier of one recorded change, `RRRRSSS`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventId(String);

impl EventId {
    /// Build an id from a policy and a sequence number in `1..=999`
    pub fn new(policy: PolicyId, sequence: u16) -> Result<Self> {
        if sequence == 0 {
            return Err(JournalError::MalformedId {
                id: format!("{policy}000"),
                reason: "sequence numbers start at 1".to_string(),
            });
        }
        if sequence > MAX_SEQUENCE {
            return Err(JournalError::SequenceExhausted {
                policy: policy.to_string(),
            });
        }
        Ok(Self(format!("{policy}{sequence:03}")))
    }

    /// Parse exactly seven ASCII digits
    pub fn parse(id: &str) -> Result<Self> {
        if id.len() != POLICY_DIGITS + SEQUENCE_DIGITS {
            return Err(JournalError::MalformedId {
                id: id.to_string(),
                reason: format!("expected {} digits", POLICY_DIGITS + SEQUENCE_DIGITS),
            });
        }
        if !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(JournalError::MalformedId {
                id: id.to_string(),
                reason: "only ASCII digits are allowed".to_string(),
            });
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn policy(&self) -> PolicyId {
        // Digits were validated on construction
        PolicyId(self.0[..POLICY_DIGITS].parse().unwrap_or_default())
    }

    pub fn sequence(&self) -> u16 {
        self.0[POLICY_DIGITS..].parse().unwrap_or_default()
    }

    pub fn belongs_to(&self, policy: PolicyId) -> bool {
        self.policy() == policy
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EventId {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EventId {
    type Error = JournalError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<EventId> for String {
    fn from(id: EventId) -> Self {
        id.0
    }
}

impl AsRef<str> for EventId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for EventId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Issues ascending event ids for one policy run
#[derive(Debug, Clone)]
pub struct EventIdAllocator {
    policy: PolicyId,
    next: u16,
}

impl EventIdAllocator {
    pub fn new(policy: impl Into<PolicyRef>) -> Result<Self> {
        Ok(Self {
            policy: PolicyId::try_from(policy.into())?,
            next: 1,
        })
    }

    pub fn policy(&self) -> PolicyId {
        self.policy
    }

    /// Next id in sequence, failing once `999` has been issued
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<EventId> {
        let id = EventId::new(self.policy, self.next)?;
        self.next += 1;
        Ok(id)
    }
}

/// `[uid, gid, mode]` of a filesystem object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermState(pub u32, pub u32, pub u32);

impl PermState {
    pub fn uid(&self) -> u32 {
        self.0
    }

    pub fn gid(&self) -> u32 {
        self.1
    }

    pub fn mode(&self) -> u32 {
        self.2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PkgState {
    Installed,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Enabled,
    Disabled,
}

/// One reversible mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// Content of an existing file was changed; reverted through its patch
    Conf { filepath: PathBuf },
    /// A file that did not exist was created
    Creation { filepath: PathBuf },
    /// A file was deleted after being archived
    Deletion { filepath: PathBuf },
    /// Ownership or mode bits changed
    Perm {
        filepath: PathBuf,
        startstate: PermState,
        endstate: PermState,
    },
    /// A state-setting command ran; `command` undoes it
    Command { command: CommandSpec },
    Pkg {
        pkgname: String,
        startstate: PkgState,
        endstate: PkgState,
    },
    Service {
        servicename: String,
        startstate: ServiceState,
        endstate: ServiceState,
    },
}

impl ChangeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Conf { .. } => "conf",
            Self::Creation { .. } => "creation",
            Self::Deletion { .. } => "deletion",
            Self::Perm { .. } => "perm",
            Self::Command { .. } => "command",
            Self::Pkg { .. } => "pkg",
            Self::Service { .. } => "service",
        }
    }

    /// File the event refers to, if any
    pub fn filepath(&self) -> Option<&Path> {
        match self {
            Self::Conf { filepath }
            | Self::Creation { filepath }
            | Self::Deletion { filepath }
            | Self::Perm { filepath, .. } => Some(filepath),
            Self::Command { .. } | Self::Pkg { .. } | Self::Service { .. } => None,
        }
    }
}
