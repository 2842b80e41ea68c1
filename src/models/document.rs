//! The persisted rule document (`karabiner.json`).
//!
//! The document is kept as a generic JSON tree. Only the selected rule list is
//! converted to typed [`Manipulator`]s; everything else is carried through
//! untouched.

use crate::models::manipulator::Manipulator;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Selects a profile or a rule either by position or by its name/description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selector {
    /// Zero-based position
    Index(usize),
    /// Profile `name` or rule `description`
    Name(String),
}

impl Default for Selector {
    fn default() -> Self {
        Self::Index(0)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(idx) => write!(f, "#{idx}"),
            Self::Name(name) => write!(f, "\"{name}\""),
        }
    }
}

impl std::str::FromStr for Selector {
    type Err = std::convert::Infallible;

    /// All-digit input selects by position, anything else by name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.parse::<usize>()
            .map_or_else(|_| Self::Name(s.to_string()), Self::Index))
    }
}

/// Location of the rule list inside the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTarget {
    /// Profile selector (matched against `name`)
    #[serde(default)]
    pub profile: Selector,
    /// Complex-modification rule selector (matched against `description`)
    #[serde(default)]
    pub rule: Selector,
}

/// Missing structure inside the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetNotFound {
    /// Human-readable description of what is missing
    pub message: String,
}

impl fmt::Display for TargetNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TargetNotFound {}

/// Indentation Karabiner-Elements itself writes.
const DEFAULT_INDENT: usize = 4;

/// A loaded `karabiner.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct KarabinerDocument {
    root: Value,
    indent: usize,
}

impl KarabinerDocument {
    /// Parses a document from JSON text.
    pub fn parse(text: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(text).context("Document is not valid JSON")?;
        if !root.is_object() {
            anyhow::bail!("Document root must be a JSON object");
        }
        Ok(Self {
            root,
            indent: detect_indent(text),
        })
    }

    /// Wraps an existing JSON tree.
    pub fn from_value(root: Value) -> Result<Self> {
        if !root.is_object() {
            anyhow::bail!("Document root must be a JSON object");
        }
        Ok(Self {
            root,
            indent: DEFAULT_INDENT,
        })
    }

    /// Returns the underlying JSON tree.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.root
    }

    /// Reads the selected rule list as typed manipulators.
    pub fn manipulators(&self, target: &RuleTarget) -> Result<Vec<Manipulator>> {
        let list = self.locate(target)?;
        serde_json::from_value(list.clone()).with_context(|| {
            format!(
                "Manipulators of profile {} rule {} are malformed",
                target.profile, target.rule
            )
        })
    }

    /// Replaces the selected rule list.
    ///
    /// Object keys are written in alphabetical order, the order Karabiner-Elements
    /// saves them in, so unmodelled keys land where Karabiner would put them.
    pub fn set_manipulators(
        &mut self,
        target: &RuleTarget,
        manipulators: &[Manipulator],
    ) -> Result<()> {
        let value =
            serde_json::to_value(manipulators).context("Failed to serialize manipulators")?;
        *self.locate_mut(target)? = sort_keys(value);
        Ok(())
    }

    /// Renders the document as pretty JSON with a trailing newline, using the
    /// indentation of the loaded text.
    pub fn to_pretty_string(&self) -> Result<String> {
        let indent = " ".repeat(self.indent);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
        let mut buf = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.root
            .serialize(&mut serializer)
            .context("Failed to serialize document")?;
        let mut text = String::from_utf8(buf).context("Serialized document is not UTF-8")?;
        text.push('\n');
        Ok(text)
    }

    fn locate(&self, target: &RuleTarget) -> Result<&Value, TargetNotFound> {
        let profiles = self
            .root
            .get("profiles")
            .and_then(Value::as_array)
            .ok_or_else(|| not_found("Document has no \"profiles\" array"))?;
        let profile = select(profiles, &target.profile, "name")
            .ok_or_else(|| not_found(format!("Profile {} not found", target.profile)))?;
        let rules = profile
            .get("complex_modifications")
            .and_then(|cm| cm.get("rules"))
            .and_then(Value::as_array)
            .ok_or_else(|| {
                not_found(format!(
                    "Profile {} has no complex_modifications.rules",
                    target.profile
                ))
            })?;
        let rule = select(rules, &target.rule, "description")
            .ok_or_else(|| not_found(format!("Rule {} not found", target.rule)))?;
        rule.get("manipulators")
            .filter(|m| m.is_array())
            .ok_or_else(|| not_found(format!("Rule {} has no manipulators array", target.rule)))
    }

    fn locate_mut(&mut self, target: &RuleTarget) -> Result<&mut Value, TargetNotFound> {
        let profiles = self
            .root
            .get_mut("profiles")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| not_found("Document has no \"profiles\" array"))?;
        let profile = select_mut(profiles, &target.profile, "name")
            .ok_or_else(|| not_found(format!("Profile {} not found", target.profile)))?;
        let rules = profile
            .get_mut("complex_modifications")
            .and_then(|cm| cm.get_mut("rules"))
            .and_then(Value::as_array_mut)
            .ok_or_else(|| {
                not_found(format!(
                    "Profile {} has no complex_modifications.rules",
                    target.profile
                ))
            })?;
        let rule = select_mut(rules, &target.rule, "description")
            .ok_or_else(|| not_found(format!("Rule {} not found", target.rule)))?;
        rule.get_mut("manipulators")
            .filter(|m| m.is_array())
            .ok_or_else(|| not_found(format!("Rule {} has no manipulators array", target.rule)))
    }
}

/// Width of the first indented line, or the default for flat documents.
fn detect_indent(text: &str) -> usize {
    text.lines()
        .map(|line| line.len() - line.trim_start_matches(' ').len())
        .find(|&width| width > 0)
        .unwrap_or(DEFAULT_INDENT)
}

fn not_found(message: impl Into<String>) -> TargetNotFound {
    TargetNotFound {
        message: message.into(),
    }
}

fn select<'a>(items: &'a [Value], selector: &Selector, field: &str) -> Option<&'a Value> {
    match selector {
        Selector::Index(idx) => items.get(*idx),
        Selector::Name(name) => items
            .iter()
            .find(|item| item.get(field).and_then(Value::as_str) == Some(name.as_str())),
    }
}

fn select_mut<'a>(
    items: &'a mut [Value],
    selector: &Selector,
    field: &str,
) -> Option<&'a mut Value> {
    match selector {
        Selector::Index(idx) => items.get_mut(*idx),
        Selector::Name(name) => items
            .iter_mut()
            .find(|item| item.get(field).and_then(Value::as_str) == Some(name.as_str())),
    }
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sort_keys(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
