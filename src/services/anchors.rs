//! Structural anchor lookup.
//!
//! Anchors place generated batches relative to hand-authored rules. They are
//! matched by structure (trigger, exact guard set, variable set, release
//! presence), never by position.

use crate::models::layer_spec::{AnchorPattern, AnchorSpec};
use crate::models::manipulator::{Manipulator, ToEvent};
use crate::services::detector::Classification;
use crate::services::error::{SpliceError, SpliceResult};
use std::collections::BTreeMap;

/// Whether a rule matches an anchor pattern.
#[must_use]
pub fn matches(pattern: &AnchorPattern, manipulator: &Manipulator) -> bool {
    if manipulator.trigger_key() != Some(pattern.key.as_str()) {
        return false;
    }
    let Some(guards) = manipulator.variable_guards() else {
        return false;
    };
    let guards: BTreeMap<String, i64> = guards
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
    if guards.len() != manipulator.conditions.len() || guards != pattern.guards {
        return false;
    }
    if let Some(sets) = &pattern.sets {
        let sets_it = manipulator
            .to
            .first()
            .and_then(ToEvent::assigned_variable)
            .is_some_and(|(name, value)| name == sets && value == 1);
        if !sets_it {
            return false;
        }
    }
    if let Some(release) = pattern.release {
        if manipulator.has_release() != release {
            return false;
        }
    }
    true
}

/// Resolves anchors to insertion indices in one rule list.
pub struct AnchorResolver<'a> {
    rules: &'a [Manipulator],
    classes: &'a [Classification],
}

impl<'a> AnchorResolver<'a> {
    /// Creates a resolver over a classified rule list.
    ///
    /// `classes[i]` classifies `rules[i]`; only foreign rules are candidates.
    #[must_use]
    pub const fn new(rules: &'a [Manipulator], classes: &'a [Classification]) -> Self {
        Self { rules, classes }
    }

    /// Index of the single foreign rule matching `pattern`.
    pub fn find(&self, pattern: &AnchorPattern) -> SpliceResult<usize> {
        let found: Vec<usize> = self
            .rules
            .iter()
            .zip(self.classes)
            .enumerate()
            .filter(|(_, (rule, class))| class.is_foreign() && matches(pattern, rule))
            .map(|(idx, _)| idx)
            .collect();

        match found.as_slice() {
            [idx] => Ok(*idx),
            [] => Err(SpliceError::not_found(format!(
                "No rule matches anchor [{pattern}]"
            ))
            .with_suggestion("Check the placement anchors of this layer against the document")),
            many => Err(SpliceError::ambiguous(format!(
                "{} rules match anchor [{pattern}] (positions {})",
                many.len(),
                many.iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
            .with_suggestion("Add guards or 'sets' to the anchor so it matches one rule")),
        }
    }

    /// Insertion index for an anchor spec.
    pub fn insertion_index(&self, anchor: &AnchorSpec) -> SpliceResult<usize> {
        match anchor {
            AnchorSpec::Start => Ok(0),
            AnchorSpec::End => Ok(self.rules.len()),
            AnchorSpec::Before(pattern) => self.find(pattern),
            AnchorSpec::After(pattern) => self.find(pattern).map(|idx| idx + 1),
        }
    }
}
