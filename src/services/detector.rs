//! Classification of document rules.
//!
//! A rule carrying a generation marker is generated; its layer and category
//! come from the marker. Unmarked rules are matched against the structural
//! signatures of the current synthesis so that lists written before markers
//! existed can be adopted.

use crate::models::manipulator::{EffectShape, Manipulator};
use crate::services::error::{SpliceError, SpliceResult};
use crate::services::marker::{GenerationMarker, RuleCategory};
use crate::services::synthesizer::Synthesis;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Structural fingerprint of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Trigger key
    pub key: Option<String>,
    /// Presence of release effects
    pub release: bool,
    /// Shape of the first primary effect
    pub shape: EffectShape,
    /// Exact guard set
    pub guards: BTreeSet<(String, i64)>,
}

impl Signature {
    /// Fingerprints a rule; `None` when a condition is not an integer `variable_if`.
    #[must_use]
    pub fn of(manipulator: &Manipulator) -> Option<Self> {
        let guards = manipulator
            .variable_guards()?
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        Some(Self {
            key: manipulator.trigger_key().map(str::to_string),
            release: manipulator.has_release(),
            shape: manipulator.primary_shape(),
            guards,
        })
    }
}

/// How a rule was recognized as generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Marker for a layer of the current spec
    Marker,
    /// Unmarked rule matching a synthesized signature
    Legacy,
    /// Marker for a layer the layer spec no longer declares
    Orphan,
}

/// Result of classifying one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Hand-authored rule, never removed or reordered
    Foreign,
    /// Rule produced by a generation run
    Generated {
        /// Owning layer
        layer: String,
        /// Rule category
        category: RuleCategory,
        /// How it was recognized
        origin: Origin,
    },
}

impl Classification {
    /// Whether the rule is foreign.
    #[must_use]
    pub const fn is_foreign(&self) -> bool {
        matches!(self, Self::Foreign)
    }
}

/// Detection switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectOptions {
    /// Match unmarked rules against synthesized signatures
    pub detect_unmarked: bool,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            detect_unmarked: true,
        }
    }
}

/// Classifies rules against one synthesis.
#[derive(Debug)]
pub struct Detector {
    layers: HashSet<String>,
    index: HashMap<Signature, (String, RuleCategory)>,
    options: DetectOptions,
}

impl Detector {
    /// Builds the signature index.
    ///
    /// Fails when two synthesized rules of different layer or category share
    /// a signature, since their predicates would not be mutually exclusive.
    pub fn new(synthesis: &Synthesis, options: DetectOptions) -> SpliceResult<Self> {
        let mut index: HashMap<Signature, (String, RuleCategory)> = HashMap::new();
        for rule in synthesis.rules() {
            let Some(signature) = Signature::of(&rule.manipulator) else {
                continue;
            };
            let owner = (rule.layer.clone(), rule.category);
            if let Some(existing) = index.get(&signature) {
                if *existing != owner {
                    return Err(SpliceError::ambiguous(format!(
                        "Rules '{}/{}' and '{}/{}' share the signature of key '{}'",
                        existing.0,
                        existing.1,
                        owner.0,
                        owner.1,
                        signature.key.as_deref().unwrap_or("?")
                    ))
                    .with_layer(&rule.layer));
                }
                continue;
            }
            index.insert(signature, owner);
        }

        Ok(Self {
            layers: synthesis.layers.iter().map(|b| b.layer.clone()).collect(),
            index,
            options,
        })
    }

    /// Classifies one rule.
    pub fn classify(&self, manipulator: &Manipulator) -> SpliceResult<Classification> {
        if let Some(description) = manipulator.description.as_deref() {
            if let Some(marker) = GenerationMarker::parse(description)? {
                let origin = if self.layers.contains(&marker.layer) {
                    Origin::Marker
                } else {
                    Origin::Orphan
                };
                return Ok(Classification::Generated {
                    layer: marker.layer,
                    category: marker.category,
                    origin,
                });
            }
        }

        if self.options.detect_unmarked {
            if let Some((layer, category)) =
                Signature::of(manipulator).and_then(|s| self.index.get(&s))
            {
                return Ok(Classification::Generated {
                    layer: layer.clone(),
                    category: *category,
                    origin: Origin::Legacy,
                });
            }
        }

        Ok(Classification::Foreign)
    }

    /// Classifies a whole rule list, in order.
    pub fn classify_all(&self, rules: &[Manipulator]) -> SpliceResult<Vec<Classification>> {
        rules
            .iter()
            .enumerate()
            .map(|(idx, rule)| {
                let classification = self.classify(rule)?;
                if let Classification::Generated {
                    layer,
                    category,
                    origin,
                } = &classification
                {
                    debug!("Rule #{idx} ({layer}/{category}) recognized via {origin:?}");
                }
                Ok(classification)
            })
            .collect()
    }
}
