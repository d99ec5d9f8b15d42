//! `tagconf`: `[section]` headers over key/value lines

use std::collections::BTreeMap;

use crate::data::{Condition, DesiredData, Intent, Value};
use crate::dialect::{
    DialectKind, Difference, Document, Line, TextDialect, body, physical_lines,
};
use crate::dialects::keyvalue::Separator;
use crate::error::{EditorError, Result};

/// Sectioned configuration. Lines before the first header belong to no
/// section and are never addressed.
#[derive(Debug, Clone, Copy)]
pub struct TagConfDialect {
    separator: Separator,
}

impl Default for TagConfDialect {
    fn default() -> Self {
        Self::new(Separator::OpenEq)
    }
}

impl TagConfDialect {
    pub fn new(separator: Separator) -> Self {
        Self { separator }
    }

    fn sections<'a>(
        &self,
        desired: &'a DesiredData,
    ) -> Result<&'a BTreeMap<String, BTreeMap<String, Value>>> {
        match desired {
            DesiredData::Sections(sections) => Ok(sections),
            other => Err(EditorError::UnsupportedData {
                dialect: DialectKind::TagConf,
                reason: format!("expected sections, got {}", other.shape()),
            }),
        }
    }
}

fn is_header(raw: &str) -> bool {
    body(raw).trim_start().starts_with('[')
}

/// Unterminated headers change how every following line is scoped, so they
/// count against compliance whatever keys are desired
fn header_conditions(doc: &Document) -> Vec<Condition> {
    doc.lines
        .iter()
        .enumerate()
        .filter_map(|(index, line)| match line {
            Line::Malformed {
                key: None, reason, raw, ..
            } if is_header(raw) => Some(Condition::InvalidFormat {
                line: index + 1,
                reason: reason.clone(),
            }),
            _ => None,
        })
        .collect()
}

/// Close unterminated headers so the lines below them land in their section
fn repair_headers(doc: &Document) -> String {
    doc.lines
        .iter()
        .map(|line| match line {
            Line::Malformed { key: None, raw, .. } if is_header(raw) => {
                format!("{}]{}", body(raw).trim_end(), line.ending())
            }
            other => other.raw().to_string(),
        })
        .collect()
}

fn has_section(doc: &Document, name: &str) -> bool {
    doc.lines
        .iter()
        .any(|line| matches!(line, Line::Section { name: n, .. } if n == name))
}

impl TextDialect for TagConfDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::TagConf
    }

    fn parse(&self, content: &str) -> Document {
        let mut current: Option<String> = None;
        let mut lines = Vec::new();
        for raw in physical_lines(content) {
            let text = body(raw).trim();
            if let Some(header) = text.strip_prefix('[') {
                match header.strip_suffix(']') {
                    Some(name) => {
                        let name = name.trim().to_string();
                        current = Some(name.clone());
                        lines.push(Line::Section {
                            name,
                            raw: raw.to_string(),
                        });
                    }
                    None => lines.push(Line::Malformed {
                        section: current.clone(),
                        key: None,
                        reason: "unterminated section header".to_string(),
                        raw: raw.to_string(),
                    }),
                }
                continue;
            }
            lines.push(self.separator.parse(raw, current.as_deref()));
        }
        Document { lines }
    }

    fn diff(&self, doc: &Document, desired: &DesiredData, intent: Intent) -> Result<Difference> {
        let mut diff = Difference {
            conditions: header_conditions(doc),
            ..Difference::default()
        };
        for (section, entries) in self.sections(desired)? {
            for (key, value) in entries {
                self.separator
                    .check(doc, Some(section), key, value, intent, &mut diff)?;
            }
        }
        Ok(diff)
    }

    fn render(&self, doc: &Document, desired: &DesiredData, intent: Intent) -> Result<String> {
        let mut doc = self.parse(&repair_headers(doc));
        for (section, entries) in self.sections(desired)? {
            if !has_section(&doc, section) {
                if intent == Intent::NotPresent || entries.is_empty() {
                    continue;
                }
                if doc
                    .lines
                    .last()
                    .is_some_and(|last| !body(last.raw()).trim().is_empty())
                {
                    doc.append(Line::Other("\n".to_string()));
                }
                doc.append(Line::Section {
                    name: section.clone(),
                    raw: format!("[{section}]\n"),
                });
            }
            for (key, value) in entries {
                self.separator
                    .apply(&mut doc, Some(section), key, value, intent)?;
            }
        }
        Ok(doc.render())
    }
}
