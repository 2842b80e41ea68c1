//! Rule synthesis from a layer specification.
//!
//! Produces, per layer, three batches (setters, actions, guards). Every rule
//! carries its owning layer, its category, a generation marker and an explicit
//! rank; batches are emitted in rank order.

use crate::models::layer_spec::{
    ActionKey, LayerDef, LayerSpec, ModeDef, Notify, OperationDef, OperationEffect,
};
use crate::models::manipulator::{Condition, Manipulator, ToEvent};
use crate::models::variables::VariableRegistry;
use crate::services::error::{SpliceError, SpliceResult};
use crate::services::marker::{GenerationMarker, RuleCategory};
use serde_json::{Map, Value};
use tracing::debug;

/// A synthesized rule with its identity and priority.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedRule {
    /// Owning layer
    pub layer: String,
    /// Rule category
    pub category: RuleCategory,
    /// Priority within the layer, lower first
    pub rank: u32,
    /// The rule itself, marker included
    pub manipulator: Manipulator,
}

/// The three ordered batches of one layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayerBatches {
    /// Layer name
    pub layer: String,
    /// Mode setters (deepest first) then the layer setter
    pub setters: Vec<GeneratedRule>,
    /// Action rules, most specific first
    pub actions: Vec<GeneratedRule>,
    /// No-op guard rules, mode guards first
    pub guards: Vec<GeneratedRule>,
}

impl LayerBatches {
    /// Actions followed by guards.
    pub fn body(&self) -> impl Iterator<Item = &GeneratedRule> {
        self.actions.iter().chain(&self.guards)
    }

    /// Every rule of the layer in rank order.
    pub fn rules(&self) -> impl Iterator<Item = &GeneratedRule> {
        self.setters.iter().chain(self.body())
    }

    /// Number of rules in a category.
    #[must_use]
    pub fn count(&self, category: RuleCategory) -> usize {
        match category {
            RuleCategory::Setter => self.setters.len(),
            RuleCategory::Action => self.actions.len(),
            RuleCategory::Guard => self.guards.len(),
        }
    }
}

/// Output of a synthesis run.
#[derive(Debug, Clone, Default)]
pub struct Synthesis {
    /// Per-layer batches in spec order
    pub layers: Vec<LayerBatches>,
    /// Variable ownership, with readers recorded
    pub registry: VariableRegistry,
}

impl Synthesis {
    /// Batches for one layer.
    #[must_use]
    pub fn layer(&self, name: &str) -> Option<&LayerBatches> {
        self.layers.iter().find(|b| b.layer == name)
    }

    /// Every generated rule, layer by layer.
    pub fn rules(&self) -> impl Iterator<Item = &GeneratedRule> {
        self.layers.iter().flat_map(LayerBatches::rules)
    }

    /// JSON preview grouped by layer and category.
    pub fn preview(&self) -> SpliceResult<Value> {
        let mut root = Map::new();
        for batches in &self.layers {
            let mut layer = Map::new();
            for (label, rules) in [
                ("setters", &batches.setters),
                ("actions", &batches.actions),
                ("guards", &batches.guards),
            ] {
                let manipulators: Vec<&Manipulator> =
                    rules.iter().map(|r| &r.manipulator).collect();
                let value = serde_json::to_value(manipulators).map_err(|e| {
                    SpliceError::invalid_spec(format!("Failed to serialize rules: {e}"))
                        .with_layer(&batches.layer)
                })?;
                layer.insert(label.to_string(), value);
            }
            root.insert(batches.layer.clone(), Value::Object(layer));
        }
        Ok(Value::Object(root))
    }
}

/// Builds generated rules from a [`LayerSpec`].
pub struct RuleSynthesizer<'a> {
    spec: &'a LayerSpec,
}

impl<'a> RuleSynthesizer<'a> {
    /// Creates a synthesizer for the given spec.
    #[must_use]
    pub const fn new(spec: &'a LayerSpec) -> Self {
        Self { spec }
    }

    /// Validates the layer spec and synthesizes every layer.
    pub fn synthesize(&self) -> SpliceResult<Synthesis> {
        self.spec
            .validate()
            .map_err(|e| SpliceError::invalid_spec(e.to_string()))?;

        let mut registry = VariableRegistry::from_spec(self.spec)
            .map_err(SpliceError::invalid_spec)?;

        let mut layers = Vec::with_capacity(self.spec.layers.len());
        for layer in &self.spec.layers {
            let batches = self.synthesize_layer(layer);
            for rule in batches.rules() {
                let reader = format!("{}/{}", rule.layer, rule.category);
                for (name, _) in rule.manipulator.variable_guards().unwrap_or_default() {
                    registry
                        .record_reader(name, &reader)
                        .map_err(|e| SpliceError::invalid_spec(e).with_layer(&layer.name))?;
                }
            }
            debug!(
                "Synthesized layer {}: {} setters, {} actions, {} guards",
                layer.name,
                batches.setters.len(),
                batches.actions.len(),
                batches.guards.len()
            );
            layers.push(batches);
        }

        Ok(Synthesis { layers, registry })
    }

    fn synthesize_layer(&self, layer: &LayerDef) -> LayerBatches {
        let mut rank = 0u32;
        let mut next_rank = || {
            let current = rank;
            rank += 1;
            current
        };

        let mut setters = Vec::new();
        for mode in modes_deepest_first(layer) {
            let manipulator = self.mode_setter(layer, mode);
            setters.push(generated(layer, RuleCategory::Setter, next_rank(), manipulator));
        }
        if !layer.external_setter {
            let manipulator = self.layer_setter(layer);
            setters.push(generated(layer, RuleCategory::Setter, next_rank(), manipulator));
        }

        let mut actions = Vec::new();
        let mut bindings: Vec<(usize, &OperationDef, usize, &ActionKey)> = Vec::new();
        for (op_idx, op) in layer.operations.iter().enumerate() {
            for key in layer.operation_keys(op) {
                let key_idx = layer
                    .keys
                    .iter()
                    .position(|k| k.key_code() == key.key_code())
                    .unwrap_or_default();
                bindings.push((op_idx, op, key_idx, key));
            }
        }
        bindings.sort_by_key(|(op_idx, op, key_idx, _)| {
            (std::cmp::Reverse(layer.held_modes(op).len()), *op_idx, *key_idx)
        });
        for (_, op, _, key) in bindings {
            let manipulator = self.action(layer, op, key);
            actions.push(generated(layer, RuleCategory::Action, next_rank(), manipulator));
        }

        let mut guards = Vec::new();
        for mode in modes_deepest_first(layer) {
            let chain = layer.mode_chain(&mode.name).unwrap_or_default();
            for key in &mode.guards {
                let manipulator = self.guard(layer, &chain, key);
                guards.push(generated(layer, RuleCategory::Guard, next_rank(), manipulator));
            }
        }
        for key in &layer.guards {
            let manipulator = self.guard(layer, &[], key);
            guards.push(generated(layer, RuleCategory::Guard, next_rank(), manipulator));
        }

        LayerBatches {
            layer: layer.name.clone(),
            setters,
            actions,
            guards,
        }
    }

    fn layer_setter(&self, layer: &LayerDef) -> Manipulator {
        let var = layer.variable();
        let mut m = Manipulator::basic(&layer.key);
        if let Some(parent) = self.spec.parent_of(layer) {
            m.conditions.push(Condition::variable_if(parent, 1));
        }
        set_held(&mut m, &var, layer.notify.as_ref());
        m
    }

    fn mode_setter(&self, layer: &LayerDef, mode: &ModeDef) -> Manipulator {
        let mut m = Manipulator::basic(&mode.key);
        if let Some(parent) = self.spec.parent_of(layer) {
            m.conditions.push(Condition::variable_if(parent, 1));
        }
        m.conditions
            .push(Condition::variable_if(layer.variable(), 1));
        for ancestor in layer.mode_chain(&mode.name).unwrap_or_default() {
            if ancestor.name != mode.name {
                m.conditions
                    .push(Condition::variable_if(ancestor.variable(), 1));
            }
        }
        set_held(&mut m, &mode.variable(), mode.notify.as_ref());
        m
    }

    fn action(&self, layer: &LayerDef, op: &OperationDef, key: &ActionKey) -> Manipulator {
        let var = layer.variable();
        let mut m = Manipulator::basic(key.key_code());
        for ancestor in self.spec.ancestors_of(layer) {
            m.conditions.push(Condition::variable_if(ancestor, 1));
        }
        m.conditions.push(Condition::variable_if(&var, 1));

        let held: Vec<String> = layer
            .held_modes(op)
            .iter()
            .map(|mode| mode.variable())
            .collect();
        for member in self.spec.family_of(layer) {
            if member == var {
                continue;
            }
            let value = i64::from(held.contains(&member));
            m.conditions.push(Condition::variable_if(member, value));
        }

        let render = |template: &str| {
            template
                .replace("{op}", &op.name)
                .replace("{arg}", key.arg())
                .replace("{key}", key.key_code())
                .replace("{layer}", &layer.name)
                .replace("{var}", &var)
        };
        match layer.operation_effect(op) {
            Some(OperationEffect::Command(template)) => {
                m.to.push(ToEvent::shell(render(template)));
            }
            Some(OperationEffect::Keystroke(keystroke)) => {
                m.to.push(ToEvent::keystroke(
                    render(&keystroke.key_code),
                    keystroke.modifiers.clone(),
                ));
            }
            // Rejected by validation
            None => {}
        }
        m
    }

    fn guard(&self, layer: &LayerDef, chain: &[&ModeDef], key: &str) -> Manipulator {
        let mut m = Manipulator::basic(key);
        for ancestor in self.spec.ancestors_of(layer) {
            m.conditions.push(Condition::variable_if(ancestor, 1));
        }
        m.conditions
            .push(Condition::variable_if(layer.variable(), 1));
        for mode in chain {
            m.conditions.push(Condition::variable_if(mode.variable(), 1));
        }
        for exclude in &layer.guard_excludes {
            m.conditions.push(Condition::variable_if(exclude, 0));
        }
        m.to
            .push(ToEvent::set_variable(&self.spec.noop_variable, 0));
        m
    }
}

fn generated(
    layer: &LayerDef,
    category: RuleCategory,
    rank: u32,
    mut manipulator: Manipulator,
) -> GeneratedRule {
    manipulator.description = Some(GenerationMarker::current(&layer.name, category).render());
    GeneratedRule {
        layer: layer.name.clone(),
        category,
        rank,
        manipulator,
    }
}

fn set_held(m: &mut Manipulator, var: &str, notify: Option<&Notify>) {
    m.to.push(ToEvent::set_variable(var, 1));
    let mut release = vec![ToEvent::set_variable(var, 0)];
    if let Some(notify) = notify {
        m.to.push(ToEvent::shell(&notify.down));
        release.push(ToEvent::shell(&notify.up));
    }
    m.to_after_key_up = Some(release);
}

/// Modes sorted by nesting depth, deepest first, declaration order otherwise.
fn modes_deepest_first(layer: &LayerDef) -> Vec<&ModeDef> {
    let mut modes: Vec<&ModeDef> = layer.modes.iter().collect();
    modes.sort_by_key(|m| std::cmp::Reverse(layer.mode_depth(&m.name)));
    modes
}
