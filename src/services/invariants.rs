//! Rule-list invariants.
//!
//! Checks run on synthesized rules (mutual exclusivity, coverage) and on a
//! spliced rule list (ordering, shared writers). Findings are collected into
//! an [`InvariantReport`] rather than failing on the first one.

// Allow format! appended to String - more readable for building messages
#![allow(clippy::format_push_string)]

use crate::models::layer_spec::{LayerDef, LayerSpec};
use crate::models::manipulator::Manipulator;
use crate::models::variables::VariableRegistry;
use crate::services::detector::Classification;
use crate::services::marker::RuleCategory;
use crate::services::synthesizer::{GeneratedRule, Synthesis};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Largest mode count whose combinations are enumerated for coverage.
const MAX_COVERAGE_MODES: usize = 16;

/// Kind of invariant finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Two action rules can fire under the same state
    Exclusivity,
    /// A key has no generated rule under a reachable mode state
    Coverage,
    /// A rule is shadowed by an earlier rule with a subset guard set
    Ordering,
    /// A foreign rule writes a variable owned by a generated setter
    SharedWriter,
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exclusivity => write!(f, "Exclusivity"),
            Self::Coverage => write!(f, "Coverage"),
            Self::Ordering => write!(f, "Ordering"),
            Self::SharedWriter => write!(f, "Shared Writer"),
        }
    }
}

/// One finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvariantIssue {
    /// Type of finding
    pub kind: IssueKind,
    /// Layer involved, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    /// Trigger key involved, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Human-readable message
    pub message: String,
}

impl InvariantIssue {
    /// Creates a new finding.
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            layer: None,
            key: None,
            message: message.into(),
        }
    }

    /// Sets the layer context.
    #[must_use]
    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    /// Sets the key context.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

impl std::fmt::Display for InvariantIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.layer, &self.key) {
            (Some(layer), Some(key)) => {
                write!(f, "[Layer {layer}, key {key}] {}: {}", self.kind, self.message)
            }
            (Some(layer), None) => write!(f, "[Layer {layer}] {}: {}", self.kind, self.message),
            (None, Some(key)) => write!(f, "[Key {key}] {}: {}", self.kind, self.message),
            (None, None) => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// Collected findings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvariantReport {
    /// Findings that abort a splice
    pub errors: Vec<InvariantIssue>,
    /// Findings that are only logged
    pub warnings: Vec<InvariantIssue>,
}

impl InvariantReport {
    /// Creates an empty report.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Returns true if there are no errors (warnings are allowed).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error.
    pub fn add_error(&mut self, issue: InvariantIssue) {
        self.errors.push(issue);
    }

    /// Adds a warning.
    pub fn add_warning(&mut self, issue: InvariantIssue) {
        self.warnings.push(issue);
    }

    /// Appends another report.
    pub fn merge(&mut self, other: Self) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Formats the report for humans.
    #[must_use]
    pub fn format_message(&self) -> String {
        let mut message = String::new();

        if !self.errors.is_empty() {
            message.push_str(&format!("❌ {} invariant errors:\n", self.errors.len()));
            for (idx, error) in self.errors.iter().enumerate() {
                message.push_str(&format!("  {}. {}\n", idx + 1, error));
            }
        }

        if !self.warnings.is_empty() {
            message.push_str(&format!("\n⚠️  {} warnings:\n", self.warnings.len()));
            for (idx, warning) in self.warnings.iter().enumerate() {
                message.push_str(&format!("  {}. {}\n", idx + 1, warning));
            }
        }

        message
    }
}

type GuardSet = BTreeSet<(String, i64)>;

fn guard_set(manipulator: &Manipulator) -> Option<GuardSet> {
    manipulator.variable_guards().map(|guards| {
        guards
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    })
}

/// Whether a rule's guards hold under an assignment (absent variables are 0).
fn satisfied(manipulator: &Manipulator, state: &HashMap<String, i64>) -> bool {
    manipulator.variable_guards().is_some_and(|guards| {
        guards
            .iter()
            .all(|(name, value)| state.get(*name).copied().unwrap_or(0) == *value)
    })
}

/// Whether two guard sets can never hold at the same time.
fn disjoint(a: &GuardSet, b: &GuardSet) -> bool {
    let values: BTreeMap<&str, i64> = a.iter().map(|(name, v)| (name.as_str(), *v)).collect();
    b.iter()
        .any(|(name, v)| values.get(name.as_str()).is_some_and(|other| other != v))
}

/// Distinct action rules on one key must have unsatisfiable conjunctions.
#[must_use]
pub fn check_exclusivity(synthesis: &Synthesis) -> InvariantReport {
    let mut report = InvariantReport::new();
    let actions: Vec<&GeneratedRule> = synthesis
        .rules()
        .filter(|r| r.category == RuleCategory::Action)
        .collect();

    for (i, a) in actions.iter().enumerate() {
        for b in &actions[i + 1..] {
            let key = a.manipulator.trigger_key();
            if key != b.manipulator.trigger_key() {
                continue;
            }
            let (Some(ga), Some(gb)) = (guard_set(&a.manipulator), guard_set(&b.manipulator))
            else {
                continue;
            };
            if !disjoint(&ga, &gb) {
                report.add_error(
                    InvariantIssue::new(
                        IssueKind::Exclusivity,
                        format!(
                            "Actions of layers {} and {} can fire together",
                            a.layer, b.layer
                        ),
                    )
                    .with_layer(&a.layer)
                    .with_key(key.unwrap_or_default()),
                );
            }
        }
    }
    report
}

/// Every key of a layer's key space must resolve to one generated rule under
/// every reachable mode state.
#[must_use]
pub fn check_coverage(spec: &LayerSpec, synthesis: &Synthesis) -> InvariantReport {
    let mut report = InvariantReport::new();
    for layer in &spec.layers {
        let Some(batches) = synthesis.layer(&layer.name) else {
            continue;
        };
        if layer.modes.len() > MAX_COVERAGE_MODES {
            report.add_warning(
                InvariantIssue::new(
                    IssueKind::Coverage,
                    format!("{} modes; coverage not enumerated", layer.modes.len()),
                )
                .with_layer(&layer.name),
            );
            continue;
        }
        let rules: Vec<&GeneratedRule> = batches.rules().collect();
        for held in reachable_states(layer) {
            check_state(spec, layer, &rules, &held, &mut report);
        }
    }
    report
}

/// Mode name sets closed under the parent relation.
fn reachable_states(layer: &LayerDef) -> Vec<BTreeSet<&str>> {
    let modes = &layer.modes;
    (0u32..(1 << modes.len()))
        .map(|mask| {
            modes
                .iter()
                .enumerate()
                .filter(|(idx, _)| mask & (1 << idx) != 0)
                .map(|(_, m)| m.name.as_str())
                .collect::<BTreeSet<&str>>()
        })
        .filter(|held| {
            modes.iter().all(|m| {
                !held.contains(m.name.as_str())
                    || m.parent.as_deref().map_or(true, |p| held.contains(p))
            })
        })
        .collect()
}

fn check_state(
    spec: &LayerSpec,
    layer: &LayerDef,
    rules: &[&GeneratedRule],
    held: &BTreeSet<&str>,
    report: &mut InvariantReport,
) {
    let mut state: HashMap<String, i64> = HashMap::new();
    for ancestor in spec.ancestors_of(layer) {
        state.insert(ancestor, 1);
    }
    state.insert(layer.variable(), 1);
    for mode in &layer.modes {
        if held.contains(mode.name.as_str()) {
            state.insert(mode.variable(), 1);
        }
    }

    let mut candidates: Vec<&str> = layer
        .keys
        .iter()
        .map(|k| k.key_code())
        .chain(layer.guards.iter().map(String::as_str))
        .collect();
    for mode in &layer.modes {
        if held.contains(mode.name.as_str()) {
            candidates.extend(mode.guards.iter().map(String::as_str));
        }
        let parent_held = mode.parent.as_deref().map_or(true, |p| held.contains(p));
        if parent_held {
            candidates.push(mode.key.as_str());
        }
    }
    let mut keys: Vec<&str> = Vec::new();
    for key in candidates {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    let held_label = held.iter().copied().collect::<Vec<_>>().join(", ");
    for key in keys {
        let matching: Vec<&&GeneratedRule> = rules
            .iter()
            .filter(|r| r.manipulator.trigger_key() == Some(key))
            .filter(|r| satisfied(&r.manipulator, &state))
            .collect();
        if matching.is_empty() {
            report.add_error(
                InvariantIssue::new(
                    IssueKind::Coverage,
                    format!("no generated rule fires with modes [{held_label}] held"),
                )
                .with_layer(&layer.name)
                .with_key(key),
            );
            continue;
        }
        let actions = matching
            .iter()
            .filter(|r| r.category == RuleCategory::Action)
            .count();
        if actions > 1 {
            report.add_error(
                InvariantIssue::new(
                    IssueKind::Exclusivity,
                    format!("{actions} actions fire with modes [{held_label}] held"),
                )
                .with_layer(&layer.name)
                .with_key(key),
            );
        }
    }
}

/// A rule whose guard set is a subset of a later rule's guard set on the same
/// key shadows it. Equal guard sets count: the later rule never fires.
///
/// Pairs involving a generated rule are errors when `strict` is set; pairs of
/// foreign rules are always warnings.
#[must_use]
pub fn check_ordering(
    rules: &[Manipulator],
    classes: &[Classification],
    strict: bool,
) -> InvariantReport {
    let mut report = InvariantReport::new();
    let mut by_key: BTreeMap<&str, Vec<(usize, GuardSet)>> = BTreeMap::new();
    for (idx, rule) in rules.iter().enumerate() {
        if let (Some(key), Some(guards)) = (rule.trigger_key(), guard_set(rule)) {
            by_key.entry(key).or_default().push((idx, guards));
        }
    }

    for (key, entries) in by_key {
        for (pos, (earlier, earlier_guards)) in entries.iter().enumerate() {
            for (later, later_guards) in &entries[pos + 1..] {
                if !earlier_guards.is_subset(later_guards) {
                    continue;
                }
                let generated = [*earlier, *later]
                    .iter()
                    .filter_map(|idx| match classes.get(*idx) {
                        Some(Classification::Generated { layer, .. }) => Some(layer.clone()),
                        _ => None,
                    })
                    .next();
                let message = if earlier_guards.len() == later_guards.len() {
                    format!("rule #{later} is shadowed by rule #{earlier} with the same guards")
                } else {
                    format!("rule #{later} is shadowed by the less specific rule #{earlier}")
                };
                let issue = InvariantIssue::new(IssueKind::Ordering, message).with_key(key);
                match generated {
                    Some(layer) if strict => report.add_error(issue.with_layer(layer)),
                    Some(layer) => report.add_warning(issue.with_layer(layer)),
                    None => report.add_warning(issue),
                }
            }
        }
    }
    report
}

/// Foreign rules must not write variables owned by generated setters.
#[must_use]
pub fn check_writers(
    rules: &[Manipulator],
    classes: &[Classification],
    registry: &VariableRegistry,
) -> InvariantReport {
    let mut report = InvariantReport::new();
    for (idx, (rule, class)) in rules.iter().zip(classes).enumerate() {
        if !class.is_foreign() {
            continue;
        }
        let effects = rule
            .to
            .iter()
            .chain(rule.to_after_key_up.iter().flatten());
        let mut written: Vec<&str> = effects
            .filter_map(|e| e.assigned_variable().map(|(name, _)| name))
            .filter(|name| registry.is_generated(name))
            .collect();
        written.dedup();
        for name in written {
            report.add_warning(InvariantIssue::new(
                IssueKind::SharedWriter,
                format!("foreign rule #{idx} also writes '{name}'"),
            ));
        }
    }
    report
}
