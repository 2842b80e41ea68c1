//! Idempotent splicing of generated batches into a rule list.
//!
//! The splicer never mutates its input: it builds a new list, checks it, and
//! hands it back. Callers persist the result only when every step succeeded.

use crate::models::layer_spec::{AnchorSpec, LayerSpec};
use crate::models::manipulator::{Condition, Manipulator};
use crate::services::anchors::AnchorResolver;
use crate::services::detector::{Classification, DetectOptions, Detector, Origin};
use crate::services::error::{SpliceError, SpliceResult};
use crate::services::invariants::{self, InvariantReport};
use crate::services::marker::RuleCategory;
use crate::services::synthesizer::{GeneratedRule, Synthesis};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Splice switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpliceOptions {
    /// Adopt unmarked rules matching a synthesized signature
    pub detect_unmarked: bool,
    /// Remove marked rules of layers absent from the layer spec
    pub prune_orphans: bool,
    /// Ordering violations involving generated rules abort the splice
    pub strict_ordering: bool,
    /// Append new mode guards to foreign rules in a layer's key space
    pub patch_foreign: bool,
}

impl Default for SpliceOptions {
    fn default() -> Self {
        Self {
            detect_unmarked: true,
            prune_orphans: true,
            strict_ordering: true,
            patch_foreign: true,
        }
    }
}

/// Per-category counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    /// Setter rules
    pub setters: usize,
    /// Action rules
    pub actions: usize,
    /// Guard rules
    pub guards: usize,
}

impl CategoryCounts {
    /// Increments one category.
    pub fn add(&mut self, category: RuleCategory, n: usize) {
        match category {
            RuleCategory::Setter => self.setters += n,
            RuleCategory::Action => self.actions += n,
            RuleCategory::Guard => self.guards += n,
        }
    }

    /// Sum over categories.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.setters + self.actions + self.guards
    }
}

impl std::fmt::Display for CategoryCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} setters, {} actions, {} guards",
            self.setters, self.actions, self.guards
        )
    }
}

/// What a splice did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpliceReport {
    /// Generated rules deleted
    pub removed: CategoryCounts,
    /// Generated rules inserted
    pub inserted: CategoryCounts,
    /// Unmarked rules adopted through their signature
    pub legacy: usize,
    /// Marked rules of unknown layers deleted
    pub orphans: usize,
    /// Foreign rules that gained mode guards
    pub patched: usize,
    /// Invariant findings on the result
    pub invariants: InvariantReport,
}

impl SpliceReport {
    /// One-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "removed {} ({}), inserted {} ({}), patched {}, legacy {}, orphans {}",
            self.removed.total(),
            self.removed,
            self.inserted.total(),
            self.inserted,
            self.patched,
            self.legacy,
            self.orphans
        )
    }
}

/// Splices a synthesis into rule lists.
pub struct Splicer<'a> {
    spec: &'a LayerSpec,
    synthesis: &'a Synthesis,
    options: SpliceOptions,
}

impl<'a> Splicer<'a> {
    /// Creates a splicer.
    #[must_use]
    pub const fn new(spec: &'a LayerSpec, synthesis: &'a Synthesis, options: SpliceOptions) -> Self {
        Self {
            spec,
            synthesis,
            options,
        }
    }

    fn detector(&self) -> SpliceResult<Detector> {
        Detector::new(
            self.synthesis,
            DetectOptions {
                detect_unmarked: self.options.detect_unmarked,
            },
        )
    }

    /// Replaces every generated rule of the layer spec's layers with fresh batches.
    pub fn splice(
        &self,
        rules: &[Manipulator],
    ) -> SpliceResult<(Vec<Manipulator>, SpliceReport)> {
        let detector = self.detector()?;
        let mut classes = detector.classify_all(rules)?;
        self.adopt_patched(&detector, rules, &mut classes)?;
        let mut report = SpliceReport::default();

        let prune = self.options.prune_orphans;
        let (mut list, mut kept) = strip(rules, classes, &mut report, |_, origin| {
            origin != Origin::Orphan || prune
        });

        // Every anchor must resolve before anything is inserted.
        {
            let resolver = AnchorResolver::new(&list, &kept);
            for layer in &self.spec.layers {
                resolver
                    .insertion_index(&layer.placement.setters)
                    .map_err(|e| e.with_layer(&layer.name))?;
                if let Some(body) = &layer.placement.body {
                    resolver
                        .insertion_index(body)
                        .map_err(|e| e.with_layer(&layer.name))?;
                }
            }
        }

        for layer in &self.spec.layers {
            let Some(batches) = self.synthesis.layer(&layer.name) else {
                continue;
            };
            let setters = sorted(&batches.setters);
            let body = sorted_body(batches.actions.iter().chain(&batches.guards));

            let at = locate(&list, &kept, &layer.placement.setters, &layer.name)?;
            insert(&mut list, &mut kept, at, &setters, &mut report);
            let body_at = match &layer.placement.body {
                Some(anchor) => locate(&list, &kept, anchor, &layer.name)?,
                None => at + setters.len(),
            };
            if !setters.is_empty() && body_at < at + setters.len() {
                return Err(SpliceError::invariant(format!(
                    "body anchor resolves to #{body_at}, before the setters at #{at}"
                ))
                .with_layer(&layer.name)
                .with_suggestion("Anchor the body after the layer's setters"));
            }
            insert(&mut list, &mut kept, body_at, &body, &mut report);
            debug!(
                "Inserted layer {} setters at {at}, body at {body_at}",
                layer.name
            );
        }

        report.patched = self.patch_foreign(&mut list, &kept);

        let mut findings = invariants::check_exclusivity(self.synthesis);
        findings.merge(invariants::check_ordering(
            &list,
            &kept,
            self.options.strict_ordering,
        ));
        findings.merge(invariants::check_writers(
            &list,
            &kept,
            &self.synthesis.registry,
        ));
        for warning in &findings.warnings {
            warn!("{warning}");
        }
        if let Some(first) = findings.errors.first() {
            let mut err = SpliceError::invariant(format!(
                "{} invariant violations, first: {first}",
                findings.errors.len()
            ))
            .with_suggestion("Adjust the placement anchors so more specific rules come first");
            if let Some(layer) = &first.layer {
                err = err.with_layer(layer);
            }
            return Err(err);
        }
        report.invariants = findings;

        info!("Removed {}", report.removed);
        info!("Inserted {}", report.inserted);
        info!(
            "Patched {} foreign rules, adopted {} legacy rules, pruned {} orphans",
            report.patched, report.legacy, report.orphans
        );
        Ok((list, report))
    }

    /// Deletes generated rules of the named layers (every layer when empty).
    ///
    /// Names may refer to spec layers or to orphan markers in the list.
    pub fn remove(
        &self,
        rules: &[Manipulator],
        layers: &[String],
    ) -> SpliceResult<(Vec<Manipulator>, SpliceReport)> {
        let detector = self.detector()?;
        let classes = detector.classify_all(rules)?;

        let known: HashSet<&str> = self
            .spec
            .layers
            .iter()
            .map(|l| l.name.as_str())
            .chain(classes.iter().filter_map(|c| match c {
                Classification::Generated { layer, .. } => Some(layer.as_str()),
                Classification::Foreign => None,
            }))
            .collect();
        for name in layers {
            if !known.contains(name.as_str()) {
                return Err(SpliceError::not_found(format!(
                    "Layer '{name}' is neither in the layer spec nor in the document"
                )));
            }
        }

        let mut report = SpliceReport::default();
        let (list, _) = strip(rules, classes, &mut report, |layer, _| {
            layers.is_empty() || layers.iter().any(|l| l == layer)
        });

        info!("Removed {}", report.removed);
        Ok((list, report))
    }

    /// Mode variables a foreign rule lacks while it would keep firing with a
    /// generated mode held.
    fn missing_mode_guards(&self, rule: &Manipulator) -> Vec<String> {
        let mut missing: Vec<String> = Vec::new();
        if !self.options.patch_foreign || rule.has_release() {
            return missing;
        }
        for layer in &self.spec.layers {
            if !layer.patch_foreign || layer.modes.is_empty() {
                continue;
            }
            let in_space = rule
                .trigger_key()
                .is_some_and(|k| layer.key_space().contains(&k));
            if !in_space || rule.guard_value(&layer.variable()) != Some(1) {
                continue;
            }
            for mode in &layer.modes {
                let var = mode.variable();
                if !rule.references(&var) && !missing.contains(&var) {
                    missing.push(var);
                }
            }
        }
        missing
    }

    /// Adopts foreign rules whose patched form matches a synthesized
    /// signature, so a patch never turns into a legacy match on the next run.
    fn adopt_patched(
        &self,
        detector: &Detector,
        rules: &[Manipulator],
        classes: &mut [Classification],
    ) -> SpliceResult<()> {
        for (idx, (rule, class)) in rules.iter().zip(classes.iter_mut()).enumerate() {
            if !class.is_foreign() {
                continue;
            }
            let missing = self.missing_mode_guards(rule);
            if missing.is_empty() {
                continue;
            }
            let mut patched = rule.clone();
            for var in &missing {
                patched.conditions.push(Condition::variable_if(var, 0));
            }
            let adopted = detector.classify(&patched)?;
            if let Classification::Generated {
                layer,
                origin: Origin::Legacy,
                ..
            } = &adopted
            {
                debug!("Foreign rule #{idx} matches layer {layer} once patched; adopting");
                *class = adopted;
            }
        }
        Ok(())
    }

    /// Appends `(mode, 0)` to foreign rules that would otherwise keep firing
    /// while a generated mode is held.
    fn patch_foreign(&self, list: &mut [Manipulator], classes: &[Classification]) -> usize {
        let mut patched = 0;
        for (idx, (rule, class)) in list.iter_mut().zip(classes).enumerate() {
            if !class.is_foreign() {
                continue;
            }
            let missing = self.missing_mode_guards(rule);
            if missing.is_empty() {
                continue;
            }
            for var in missing {
                debug!("Patched foreign rule #{idx} with {var}=0");
                rule.conditions.push(Condition::variable_if(var, 0));
            }
            patched += 1;
        }
        patched
    }
}

/// Drops generated rules selected by `remove_if(layer, origin)`.
fn strip(
    rules: &[Manipulator],
    classes: Vec<Classification>,
    report: &mut SpliceReport,
    remove_if: impl Fn(&str, Origin) -> bool,
) -> (Vec<Manipulator>, Vec<Classification>) {
    let mut list = Vec::with_capacity(rules.len());
    let mut kept = Vec::with_capacity(rules.len());
    for (rule, class) in rules.iter().zip(classes) {
        if let Classification::Generated {
            layer,
            category,
            origin,
        } = &class
        {
            if remove_if(layer, *origin) {
                report.removed.add(*category, 1);
                match origin {
                    Origin::Legacy => report.legacy += 1,
                    Origin::Orphan => report.orphans += 1,
                    Origin::Marker => {}
                }
                continue;
            }
        }
        list.push(rule.clone());
        kept.push(class);
    }
    (list, kept)
}

fn locate(
    list: &[Manipulator],
    classes: &[Classification],
    anchor: &AnchorSpec,
    layer: &str,
) -> SpliceResult<usize> {
    AnchorResolver::new(list, classes)
        .insertion_index(anchor)
        .map_err(|e| e.with_layer(layer))
}

fn insert(
    list: &mut Vec<Manipulator>,
    classes: &mut Vec<Classification>,
    at: usize,
    batch: &[&GeneratedRule],
    report: &mut SpliceReport,
) {
    for (offset, rule) in batch.iter().enumerate() {
        list.insert(at + offset, rule.manipulator.clone());
        classes.insert(
            at + offset,
            Classification::Generated {
                layer: rule.layer.clone(),
                category: rule.category,
                origin: Origin::Marker,
            },
        );
        report.inserted.add(rule.category, 1);
    }
}

fn sorted(rules: &[GeneratedRule]) -> Vec<&GeneratedRule> {
    sorted_body(rules.iter())
}

fn sorted_body<'r>(rules: impl Iterator<Item = &'r GeneratedRule>) -> Vec<&'r GeneratedRule> {
    let mut batch: Vec<&GeneratedRule> = rules.collect();
    batch.sort_by_key(|r| r.rank);
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::manipulator::ToEvent;
    use crate::services::error::SpliceErrorKind;
    use crate::services::synthesizer::RuleSynthesizer;

    const T_AFTER_G: &str = r#"
        root = "caps_lock_is_held"

        [[layers]]
        name = "T"
        key = "t"
        command = "ws.sh {op} {arg}"
        keys = ["6"]
        guards = ["quote"]

        [layers.placement.setters.after]
        key = "g"
        guards = { caps_lock_is_held = 1 }
        sets = "g_is_held"

        [[layers.operations]]
        name = "move"
    "#;

    fn foreign(key: &str, guards: &[(&str, i64)]) -> Manipulator {
        let mut m = Manipulator::basic(key);
        for (name, value) in guards {
            m.conditions.push(Condition::variable_if(*name, *value));
        }
        m.to.push(ToEvent::keystroke(key, vec![]));
        m
    }

    fn g_setter() -> Manipulator {
        let mut m = Manipulator::basic("g");
        m.conditions.push(Condition::variable_if("caps_lock_is_held", 1));
        m.to.push(ToEvent::set_variable("g_is_held", 1));
        m.to_after_key_up = Some(vec![ToEvent::set_variable("g_is_held", 0)]);
        m
    }

    fn document() -> Vec<Manipulator> {
        vec![
            foreign("h", &[("caps_lock_is_held", 1)]),
            g_setter(),
            foreign("j", &[("caps_lock_is_held", 1)]),
        ]
    }

    fn splice(src: &str, rules: &[Manipulator]) -> SpliceResult<(Vec<Manipulator>, SpliceReport)> {
        let spec: LayerSpec = toml::from_str(src).unwrap();
        let synthesis = RuleSynthesizer::new(&spec).synthesize().unwrap();
        Splicer::new(&spec, &synthesis, SpliceOptions::default()).splice(rules)
    }

    fn triggers(rules: &[Manipulator]) -> Vec<&str> {
        rules.iter().filter_map(Manipulator::trigger_key).collect()
    }

    #[test]
    fn test_inserts_after_anchor() {
        let (list, report) = splice(T_AFTER_G, &document()).unwrap();
        assert_eq!(triggers(&list), vec!["h", "g", "t", "6", "quote", "j"]);
        assert_eq!(report.inserted.total(), 3);
        assert_eq!(report.removed.total(), 0);
    }

    #[test]
    fn test_splice_is_idempotent() {
        let (first, _) = splice(T_AFTER_G, &document()).unwrap();
        let (second, report) = splice(T_AFTER_G, &first).unwrap();
        assert_eq!(first, second);
        assert_eq!(report.removed, report.inserted);
    }

    #[test]
    fn test_missing_anchor_fails() {
        let rules = vec![foreign("h", &[("caps_lock_is_held", 1)])];
        let err = splice(T_AFTER_G, &rules).unwrap_err();
        assert_eq!(err.kind, SpliceErrorKind::StructuralNotFound);
        assert_eq!(err.layer.as_deref(), Some("T"));
    }

    #[test]
    fn test_body_anchor() {
        let src = T_AFTER_G.replace(
            "[[layers.operations]]",
            "[layers.placement.body]\nbefore = { key = \"j\", guards = { caps_lock_is_held = 1 } }\n\n[[layers.operations]]",
        );
        let mut rules = document();
        rules.insert(2, foreign("k", &[]));
        let (list, _) = splice(&src, &rules).unwrap();
        assert_eq!(triggers(&list), vec!["h", "g", "t", "k", "6", "quote", "j"]);
    }

    #[test]
    fn test_orphans_pruned() {
        let mut orphan = foreign("y", &[("caps_lock_is_held", 1), ("y_is_held", 1)]);
        orphan.description = Some("lazykarabiner/v1 layer=Y kind=action".to_string());
        let mut rules = document();
        rules.push(orphan);

        let (list, report) = splice(T_AFTER_G, &rules).unwrap();
        assert_eq!(report.orphans, 1);
        assert_eq!(report.removed.actions, 1);
        assert!(!triggers(&list).contains(&"y"));
    }

    const R_WITH_MODE: &str = r#"
        root = "caps_lock_is_held"

        [[layers]]
        name = "R"
        key = "r"
        command = "ws.sh {op} {arg}"
        keys = ["1"]
        placement = { setters = "end" }

        [[layers.modes]]
        name = "E"
        key = "e"

        [[layers.operations]]
        name = "focus"

        [[layers.operations]]
        name = "move"
        modes = ["E"]
    "#;

    #[test]
    fn test_foreign_rules_in_key_space_are_patched() {
        let hand_written = foreign(
            "1",
            &[("caps_lock_is_held", 1), ("r_is_held", 1), ("x_is_held", 1)],
        );
        let outside = foreign("9", &[("caps_lock_is_held", 1), ("r_is_held", 1)]);
        let (list, report) = splice(R_WITH_MODE, &[hand_written, outside]).unwrap();

        assert_eq!(report.patched, 1);
        assert_eq!(list[0].guard_value("e_is_held"), Some(0));
        assert_eq!(list[1].guard_value("e_is_held"), None);

        let (again, report) = splice(R_WITH_MODE, &list).unwrap();
        assert_eq!(report.patched, 0);
        assert_eq!(again, list);
    }

    #[test]
    fn test_rule_matching_once_patched_is_adopted() {
        // An unmarked copy of the old `focus 1` action, written before `E` existed.
        let mut stale = Manipulator::basic("1");
        stale
            .conditions
            .push(Condition::variable_if("caps_lock_is_held", 1));
        stale.conditions.push(Condition::variable_if("r_is_held", 1));
        stale.to.push(ToEvent::shell("ws.sh focus 1"));

        let (first, report) = splice(R_WITH_MODE, &[stale]).unwrap();
        assert_eq!(report.legacy, 1);
        assert_eq!(report.patched, 0);
        assert_eq!(triggers(&first).iter().filter(|k| **k == "1").count(), 2);

        let (second, report) = splice(R_WITH_MODE, &first).unwrap();
        assert_eq!(second, first);
        assert_eq!(report.legacy, 0);
        assert_eq!(report.removed, report.inserted);
    }

    #[test]
    fn test_patched_rule_with_same_guards_as_action_aborts() {
        // Once patched, the keystroke rule has the guards of the `focus 1`
        // action and fires in its place.
        let hand_written = foreign("1", &[("caps_lock_is_held", 1), ("r_is_held", 1)]);
        let err = splice(R_WITH_MODE, &[hand_written]).unwrap_err();
        assert_eq!(err.kind, SpliceErrorKind::InvariantViolation);
        assert_eq!(err.layer.as_deref(), Some("R"));
    }

    #[test]
    fn test_body_before_setters_is_rejected() {
        let src = r#"
            root = "caps_lock_is_held"

            [[layers]]
            name = "T"
            key = "t"
            command = "ws.sh {op} {arg}"
            keys = ["6"]
            placement = { setters = "end", body = "start" }

            [[layers.operations]]
            name = "move"
        "#;
        let err = splice(src, &document()).unwrap_err();
        assert_eq!(err.kind, SpliceErrorKind::InvariantViolation);
        assert_eq!(err.layer.as_deref(), Some("T"));
    }

    #[test]
    fn test_ordering_violation_aborts() {
        // A more specific foreign rule on the layer key ends up after the setter.
        let mut rules = document();
        rules.push(foreign("t", &[("caps_lock_is_held", 1), ("r_is_held", 1)]));
        let err = splice(T_AFTER_G, &rules).unwrap_err();
        assert_eq!(err.kind, SpliceErrorKind::InvariantViolation);
    }

    #[test]
    fn test_remove_selected_layers() {
        let (list, _) = splice(T_AFTER_G, &document()).unwrap();
        let spec: LayerSpec = toml::from_str(T_AFTER_G).unwrap();
        let synthesis = RuleSynthesizer::new(&spec).synthesize().unwrap();
        let splicer = Splicer::new(&spec, &synthesis, SpliceOptions::default());

        let (removed, report) = splicer.remove(&list, &["T".to_string()]).unwrap();
        assert_eq!(removed, document());
        assert_eq!(report.removed.total(), 3);

        let err = splicer.remove(&list, &["Q".to_string()]).unwrap_err();
        assert_eq!(err.kind, SpliceErrorKind::StructuralNotFound);
    }
}
