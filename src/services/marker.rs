//! Generation markers.
//!
//! Every synthesized rule carries `lazykarabiner/v<N> layer=<name> kind=<category>`
//! in its `description`, a field the engine ignores. The marker is the rule's
//! identity on later runs.

use crate::constants::{GENERATION_VERSION, MARKER_PREFIX};
use crate::services::error::{SpliceError, SpliceResult};
use regex::Regex;
use std::sync::LazyLock;

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^lazykarabiner/v(\d+) layer=(\S+) kind=([a-z]+)$").expect("valid marker regex")
});

/// Category of a generated rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleCategory {
    /// Sets a layer or mode variable while its key is held
    Setter,
    /// Performs an operation under one exact mode combination
    Action,
    /// Absorbs a key into a no-op while a layer is held
    Guard,
}

impl RuleCategory {
    /// Every category in emission order.
    pub const ALL: [Self; 3] = [Self::Setter, Self::Action, Self::Guard];

    /// Marker spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Setter => "setter",
            Self::Action => "action",
            Self::Guard => "guard",
        }
    }

    /// Parses the marker spelling.
    #[must_use]
    pub fn from_marker(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl std::fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed generation marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationMarker {
    /// Format version that produced the rule
    pub version: u32,
    /// Owning layer
    pub layer: String,
    /// Rule category
    pub category: RuleCategory,
}

impl GenerationMarker {
    /// Marker for a rule produced by this version.
    pub fn current(layer: impl Into<String>, category: RuleCategory) -> Self {
        Self {
            version: GENERATION_VERSION,
            layer: layer.into(),
            category,
        }
    }

    /// Renders the marker text.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "{MARKER_PREFIX}/v{} layer={} kind={}",
            self.version, self.layer, self.category
        )
    }

    /// Parses a rule description.
    ///
    /// Returns `Ok(None)` for descriptions that are not markers at all. A
    /// description that claims to be a marker but cannot be read, or that
    /// was written by a newer generation version, is an error: guessing would
    /// risk deleting or duplicating rules.
    pub fn parse(description: &str) -> SpliceResult<Option<Self>> {
        if !description.starts_with(&format!("{MARKER_PREFIX}/")) {
            return Ok(None);
        }

        let caps = MARKER_RE.captures(description).ok_or_else(|| {
            SpliceError::ambiguous(format!("Malformed generation marker '{description}'"))
                .with_suggestion("Remove or fix the description of this rule by hand")
        })?;

        let version: u32 = caps[1].parse().map_err(|_| {
            SpliceError::ambiguous(format!("Unreadable marker version in '{description}'"))
        })?;
        if version > GENERATION_VERSION {
            return Err(SpliceError::ambiguous(format!(
                "Rule marked '{description}' was generated by a newer version (v{version} > v{GENERATION_VERSION})"
            ))
            .with_suggestion("Upgrade lazykarabiner before applying this spec"));
        }

        let category = RuleCategory::from_marker(&caps[3]).ok_or_else(|| {
            SpliceError::ambiguous(format!("Unknown rule category in marker '{description}'"))
        })?;

        Ok(Some(Self {
            version,
            layer: caps[2].to_string(),
            category,
        }))
    }
}
