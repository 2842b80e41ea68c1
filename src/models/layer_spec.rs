//! Declarative layer specification.
//!
//! A [`LayerSpec`] is the single canonical description of every generated
//! layer: its activation key, sub-modes, operations, action keys, guard keys
//! and where its rules go in the document.

use crate::constants::{DEFAULT_NOOP_VARIABLE, VARIABLE_SUFFIX};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Root of the layer specification file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Global prerequisite variable (e.g., "`caps_lock_is_held`")
    #[serde(default)]
    pub root: Option<String>,
    /// Scratch variable written by guard rules
    #[serde(default = "default_noop_variable")]
    pub noop_variable: String,
    /// Externally owned variables that belong to every layer's family
    #[serde(default)]
    pub siblings: Vec<String>,
    /// Layers in generation order
    #[serde(default)]
    pub layers: Vec<LayerDef>,
}

fn default_noop_variable() -> String {
    DEFAULT_NOOP_VARIABLE.to_string()
}

const fn default_true() -> bool {
    true
}

/// A modal layer activated by holding `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDef {
    /// Unique layer name (used in generation markers)
    pub name: String,
    /// Activation key
    pub key: String,
    /// Layer variable; defaults to `<key>_is_held`
    #[serde(default)]
    pub variable: Option<String>,
    /// Variable that must be true for the layer to activate; defaults to `root`
    #[serde(default)]
    pub parent: Option<String>,
    /// The layer setter is hand-authored and must not be generated
    #[serde(default)]
    pub external_setter: bool,
    /// Optional side effects run by the layer setter
    #[serde(default)]
    pub notify: Option<Notify>,
    /// Default command template for operations
    #[serde(default)]
    pub command: Option<String>,
    /// Keys that carry operations
    #[serde(default)]
    pub keys: Vec<ActionKey>,
    /// Keys absorbed into a no-op while the layer is held
    #[serde(default)]
    pub guards: Vec<String>,
    /// Family variables guard rules assert false
    #[serde(default)]
    pub guard_excludes: Vec<String>,
    /// Sub-modes activated while the layer is held
    #[serde(default)]
    pub modes: Vec<ModeDef>,
    /// Operations bound to the action keys
    #[serde(default)]
    pub operations: Vec<OperationDef>,
    /// Where the generated batches go
    pub placement: Placement,
    /// Append new mode guards to foreign rules in this layer's key space
    #[serde(default = "default_true")]
    pub patch_foreign: bool,
}

/// A sub-mode of a layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeDef {
    /// Mode name, unique within the layer
    pub name: String,
    /// Activation key
    pub key: String,
    /// Mode variable; defaults to `<key>_is_held`
    #[serde(default)]
    pub variable: Option<String>,
    /// Parent mode name; defaults to the layer itself
    #[serde(default)]
    pub parent: Option<String>,
    /// Optional side effects run by the mode setter
    #[serde(default)]
    pub notify: Option<Notify>,
    /// Keys absorbed while this mode is held
    #[serde(default)]
    pub guards: Vec<String>,
}

/// Commands run alongside a setter's variable assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notify {
    /// Run on key-down
    pub down: String,
    /// Run on key-up
    pub up: String,
}

/// An action key, optionally with an argument differing from its key code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionKey {
    /// `"6"`: key code doubles as the argument
    Plain(String),
    /// `{ key_code = "semicolon", arg = "\";\"" }`
    Detailed {
        /// Physical key
        key_code: String,
        /// Argument substituted for `{arg}`
        #[serde(default)]
        arg: Option<String>,
    },
}

impl ActionKey {
    /// Physical key code.
    #[must_use]
    pub fn key_code(&self) -> &str {
        match self {
            Self::Plain(key) | Self::Detailed { key_code: key, .. } => key,
        }
    }

    /// Argument passed to the operation.
    #[must_use]
    pub fn arg(&self) -> &str {
        match self {
            Self::Plain(key) => key,
            Self::Detailed { key_code, arg } => arg.as_deref().unwrap_or(key_code),
        }
    }
}

/// Emitted-key effect of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystrokeDef {
    /// Key template; defaults to `{arg}`
    #[serde(default = "default_arg_template")]
    pub key_code: String,
    /// Modifiers held while emitting the key
    #[serde(default)]
    pub modifiers: Vec<String>,
}

fn default_arg_template() -> String {
    "{arg}".to_string()
}

/// An operation bound to a unique combination of held modes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDef {
    /// Operation identifier, substituted for `{op}`
    pub name: String,
    /// Modes that must be held; every other family variable must be false
    #[serde(default)]
    pub modes: Vec<String>,
    /// Command template overriding the layer's
    #[serde(default)]
    pub command: Option<String>,
    /// Emit a key instead of running a command
    #[serde(default)]
    pub keystroke: Option<KeystrokeDef>,
    /// Restrict the operation to a subset of the layer's action keys
    #[serde(default)]
    pub keys: Option<Vec<String>>,
}

/// Resolved effect of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationEffect<'a> {
    /// Run a command rendered from this template
    Command(&'a str),
    /// Emit a key
    Keystroke(&'a KeystrokeDef),
}

/// Placement of a layer's batches relative to foreign rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Anchor for the setter batch
    pub setters: AnchorSpec,
    /// Anchor for the action + guard batch; defaults to right after the setters
    #[serde(default)]
    pub body: Option<AnchorSpec>,
}

/// Insertion point relative to an anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorSpec {
    /// Before the rule matching the pattern
    Before(AnchorPattern),
    /// After the rule matching the pattern
    After(AnchorPattern),
    /// Top of the rule list
    Start,
    /// Bottom of the rule list
    End,
}

/// Structural identity of a foreign rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorPattern {
    /// Trigger key
    pub key: String,
    /// Exact guard set (every condition must be a `variable_if` listed here)
    #[serde(default)]
    pub guards: BTreeMap<String, i64>,
    /// Variable set to 1 by the first primary effect
    #[serde(default)]
    pub sets: Option<String>,
    /// Whether the rule carries release effects
    #[serde(default)]
    pub release: Option<bool>,
}

impl std::fmt::Display for AnchorPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "key={}", self.key)?;
        if !self.guards.is_empty() {
            let guards: Vec<String> = self
                .guards
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            write!(f, " guards={{{}}}", guards.join(", "))?;
        }
        if let Some(sets) = &self.sets {
            write!(f, " sets={sets}")?;
        }
        if let Some(release) = self.release {
            write!(f, " release={release}")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for AnchorSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Before(pattern) => write!(f, "before [{pattern}]"),
            Self::After(pattern) => write!(f, "after [{pattern}]"),
            Self::Start => f.write_str("start"),
            Self::End => f.write_str("end"),
        }
    }
}

/// Builds `<key>_is_held`.
#[must_use]
pub fn default_variable(key: &str) -> String {
    format!("{key}{VARIABLE_SUFFIX}")
}

impl LayerDef {
    /// The layer variable.
    #[must_use]
    pub fn variable(&self) -> String {
        self.variable
            .clone()
            .unwrap_or_else(|| default_variable(&self.key))
    }

    /// Finds a mode by name.
    #[must_use]
    pub fn mode(&self, name: &str) -> Option<&ModeDef> {
        self.modes.iter().find(|m| m.name == name)
    }

    /// Ancestor chain of a mode, outermost first, ending with the mode itself.
    ///
    /// Returns `None` when a parent reference is dangling or cyclic.
    #[must_use]
    pub fn mode_chain(&self, name: &str) -> Option<Vec<&ModeDef>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.mode(name)?;
        loop {
            if !seen.insert(current.name.as_str()) {
                return None;
            }
            chain.push(current);
            match &current.parent {
                Some(parent) => current = self.mode(parent)?,
                None => break,
            }
        }
        chain.reverse();
        Some(chain)
    }

    /// Nesting depth of a mode (1 for direct children of the layer).
    #[must_use]
    pub fn mode_depth(&self, name: &str) -> usize {
        self.mode_chain(name).map_or(0, |chain| chain.len())
    }

    /// Modes held while an operation fires: its listed modes plus their
    /// ancestors, in declaration order.
    #[must_use]
    pub fn held_modes(&self, operation: &OperationDef) -> Vec<&ModeDef> {
        let mut names: HashSet<&str> = HashSet::new();
        for mode in &operation.modes {
            if let Some(chain) = self.mode_chain(mode) {
                names.extend(chain.iter().map(|m| m.name.as_str()));
            }
        }
        self.modes
            .iter()
            .filter(|m| names.contains(m.name.as_str()))
            .collect()
    }

    /// Action keys an operation applies to, in layer order.
    #[must_use]
    pub fn operation_keys<'a>(&'a self, operation: &OperationDef) -> Vec<&'a ActionKey> {
        match &operation.keys {
            Some(subset) => self
                .keys
                .iter()
                .filter(|k| subset.iter().any(|s| s == k.key_code()))
                .collect(),
            None => self.keys.iter().collect(),
        }
    }

    /// Effect an operation produces.
    #[must_use]
    pub fn operation_effect<'a>(
        &'a self,
        operation: &'a OperationDef,
    ) -> Option<OperationEffect<'a>> {
        if let Some(keystroke) = &operation.keystroke {
            return Some(OperationEffect::Keystroke(keystroke));
        }
        operation
            .command
            .as_deref()
            .or(self.command.as_deref())
            .map(OperationEffect::Command)
    }

    /// Every key this layer claims: action keys, layer guards and mode guards.
    #[must_use]
    pub fn key_space(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        let candidates = self
            .keys
            .iter()
            .map(ActionKey::key_code)
            .chain(self.guards.iter().map(String::as_str))
            .chain(
                self.modes
                    .iter()
                    .flat_map(|m| m.guards.iter().map(String::as_str)),
            );
        for key in candidates {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }
}

impl ModeDef {
    /// The mode variable.
    #[must_use]
    pub fn variable(&self) -> String {
        self.variable
            .clone()
            .unwrap_or_else(|| default_variable(&self.key))
    }
}

impl LayerSpec {
    /// Finds a layer by name.
    #[must_use]
    pub fn layer(&self, name: &str) -> Option<&LayerDef> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Parent variable of a layer (explicit parent, else the root).
    #[must_use]
    pub fn parent_of(&self, layer: &LayerDef) -> Option<String> {
        layer.parent.clone().or_else(|| self.root.clone())
    }

    /// Variables that must be true before a layer can activate, outermost
    /// first: the root, then the parent chain through other layers.
    #[must_use]
    pub fn ancestors_of(&self, layer: &LayerDef) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut parent = self.parent_of(layer);
        while let Some(var) = parent {
            if !seen.insert(var.clone()) {
                break;
            }
            chain.push(var.clone());
            parent = self
                .layers
                .iter()
                .find(|l| l.variable() == var)
                .and_then(|l| self.parent_of(l));
        }
        if let Some(root) = &self.root {
            if !chain.contains(root) {
                chain.push(root.clone());
            }
        }
        chain.reverse();
        chain
    }

    /// Family of a layer: variables an action rule pins to an exact value.
    ///
    /// Siblings, every layer variable and this layer's mode variables, minus
    /// the layer's ancestors and the root.
    #[must_use]
    pub fn family_of(&self, layer: &LayerDef) -> Vec<String> {
        let ancestors = self.ancestors_of(layer);
        let mut family: Vec<String> = Vec::new();
        let candidates = self
            .siblings
            .iter()
            .cloned()
            .chain(self.layers.iter().map(LayerDef::variable))
            .chain(layer.modes.iter().map(ModeDef::variable));
        for var in candidates {
            if ancestors.contains(&var) || family.contains(&var) {
                continue;
            }
            family.push(var);
        }
        family
    }

    /// Checks the specification for internal consistency.
    ///
    /// Every problem found is reported, one per line.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.layers.is_empty() {
            problems.push("Layer spec declares no layers".to_string());
        }

        let mut layer_names = HashSet::new();
        for layer in &self.layers {
            if layer.name.trim().is_empty() {
                problems.push("Layer name cannot be empty".to_string());
            }
            if layer.name.chars().any(char::is_whitespace) {
                problems.push(format!("Layer name '{}' must not contain whitespace", layer.name));
            }
            if !layer_names.insert(layer.name.as_str()) {
                problems.push(format!("Duplicate layer name '{}'", layer.name));
            }
            validate_layer(self, layer, &mut problems);
        }

        if problems.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("Invalid layer spec:\n  - {}", problems.join("\n  - "))
        }
    }
}

fn validate_layer(spec: &LayerSpec, layer: &LayerDef, problems: &mut Vec<String>) {
    let name = &layer.name;

    let mut mode_names = HashSet::new();
    for mode in &layer.modes {
        if !mode_names.insert(mode.name.as_str()) {
            problems.push(format!("Layer '{name}': duplicate mode '{}'", mode.name));
        }
        match &mode.parent {
            Some(parent) if layer.mode(parent).is_none() => {
                problems.push(format!(
                    "Layer '{name}': mode '{}' has unknown parent '{parent}'",
                    mode.name
                ));
            }
            _ if layer.mode_chain(&mode.name).is_none() => {
                problems.push(format!(
                    "Layer '{name}': mode '{}' has a cyclic parent chain",
                    mode.name
                ));
            }
            _ => {}
        }
        if mode.key == layer.key {
            problems.push(format!(
                "Layer '{name}': mode '{}' reuses the layer key '{}'",
                mode.name, mode.key
            ));
        }
    }

    let mut action_keys = HashSet::new();
    for key in &layer.keys {
        if !action_keys.insert(key.key_code()) {
            problems.push(format!("Layer '{name}': duplicate action key '{}'", key.key_code()));
        }
    }
    for mode in &layer.modes {
        if action_keys.contains(mode.key.as_str()) || layer.guards.contains(&mode.key) {
            problems.push(format!(
                "Layer '{name}': mode key '{}' is also an action or guard key",
                mode.key
            ));
        }
    }
    for guard in &layer.guards {
        if action_keys.contains(guard.as_str()) {
            problems.push(format!(
                "Layer '{name}': key '{guard}' is both an action key and a guard key"
            ));
        }
        if guard == &layer.key {
            problems.push(format!("Layer '{name}': the layer key '{guard}' cannot be guarded"));
        }
    }

    if !layer.keys.is_empty() && layer.operations.is_empty() {
        problems.push(format!("Layer '{name}': action keys declared without operations"));
    }

    // Each operation must own a unique mode combination on every key it shares.
    let mut owners: HashMap<(Vec<&str>, &str), &str> = HashMap::new();
    for op in &layer.operations {
        for mode in &op.modes {
            if layer.mode(mode).is_none() {
                problems.push(format!(
                    "Layer '{name}': operation '{}' requires unknown mode '{mode}'",
                    op.name
                ));
            }
        }
        if let Some(subset) = &op.keys {
            for key in subset {
                if !action_keys.contains(key.as_str()) {
                    problems.push(format!(
                        "Layer '{name}': operation '{}' references undeclared key '{key}'",
                        op.name
                    ));
                }
            }
        }
        if op.keystroke.is_some() && op.command.is_some() {
            problems.push(format!(
                "Layer '{name}': operation '{}' declares both a command and a keystroke",
                op.name
            ));
        }
        if layer.operation_effect(op).is_none() {
            problems.push(format!(
                "Layer '{name}': operation '{}' has no command, keystroke or layer command",
                op.name
            ));
        }

        let combination: Vec<&str> = layer
            .held_modes(op)
            .into_iter()
            .map(|m| m.name.as_str())
            .collect();
        for key in layer.operation_keys(op) {
            if let Some(other) = owners.insert((combination.clone(), key.key_code()), &op.name) {
                problems.push(format!(
                    "Layer '{name}': operations '{other}' and '{}' both fire on '{}' for modes [{}]",
                    op.name,
                    key.key_code(),
                    combination.join(", ")
                ));
            }
        }
    }

    let family = spec.family_of(layer);
    for exclude in &layer.guard_excludes {
        if !family.contains(exclude) {
            problems.push(format!(
                "Layer '{name}': guard exclude '{exclude}' is not a family variable"
            ));
        }
        if *exclude == layer.variable() {
            problems.push(format!(
                "Layer '{name}': guard exclude cannot be the layer variable"
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_from(toml_src: &str) -> LayerSpec {
        toml::from_str(toml_src).unwrap()
    }

    const R_LAYER: &str = r#"
        root = "caps_lock_is_held"
        siblings = ["a_is_held", "s_is_held"]

        [[layers]]
        name = "R"
        key = "r"
        command = "ws.sh {op} {arg}"
        keys = ["6", { key_code = "semicolon", arg = '";"' }]
        guards = ["quote"]
        placement = { setters = "start" }

        [[layers.modes]]
        name = "E"
        key = "e"

        [[layers.modes]]
        name = "W"
        key = "w"
        parent = "E"

        [[layers.operations]]
        name = "focus-2"
        modes = ["E"]

        [[layers.operations]]
        name = "focus-1"
    "#;

    #[test]
    fn test_defaults_and_lookups() {
        let spec = spec_from(R_LAYER);
        spec.validate().unwrap();

        let layer = spec.layer("R").unwrap();
        assert_eq!(layer.variable(), "r_is_held");
        assert_eq!(spec.noop_variable, "guard_noop");
        assert_eq!(layer.keys[1].key_code(), "semicolon");
        assert_eq!(layer.keys[1].arg(), "\";\"");
        assert_eq!(layer.keys[0].arg(), "6");
        assert_eq!(layer.mode_depth("W"), 2);
        assert_eq!(layer.mode_depth("E"), 1);
        assert!(layer.patch_foreign);
    }

    #[test]
    fn test_family_excludes_ancestors() {
        let spec = spec_from(R_LAYER);
        let layer = spec.layer("R").unwrap();
        assert_eq!(spec.ancestors_of(layer), vec!["caps_lock_is_held"]);
        assert_eq!(
            spec.family_of(layer),
            vec!["a_is_held", "s_is_held", "r_is_held", "e_is_held", "w_is_held"]
        );
    }

    #[test]
    fn test_nested_layer_ancestors() {
        let spec = spec_from(
            r#"
            root = "caps_lock_is_held"

            [[layers]]
            name = "T"
            key = "t"
            placement = { setters = "start" }

            [[layers]]
            name = "X"
            key = "x"
            parent = "t_is_held"
            placement = { setters = "end" }
            "#,
        );
        let x = spec.layer("X").unwrap();
        assert_eq!(
            spec.ancestors_of(x),
            vec!["caps_lock_is_held", "t_is_held"]
        );
        assert_eq!(spec.family_of(x), vec!["x_is_held"]);
    }

    #[test]
    fn test_duplicate_combination_rejected() {
        let spec = spec_from(
            r#"
            [[layers]]
            name = "T"
            key = "t"
            command = "ws.sh {op} {arg}"
            keys = ["6"]
            placement = { setters = "start" }

            [[layers.operations]]
            name = "move"

            [[layers.operations]]
            name = "focus"
            "#,
        );
        let err = spec.validate().unwrap_err().to_string();
        assert!(err.contains("both fire on '6'"), "{err}");
    }

    #[test]
    fn test_unknown_mode_and_missing_effect_rejected() {
        let spec = spec_from(
            r#"
            [[layers]]
            name = "T"
            key = "t"
            keys = ["6"]
            guards = ["6"]
            placement = { setters = "start" }

            [[layers.operations]]
            name = "move"
            modes = ["Z"]
            "#,
        );
        let err = spec.validate().unwrap_err().to_string();
        assert!(err.contains("unknown mode 'Z'"), "{err}");
        assert!(err.contains("no command"), "{err}");
        assert!(err.contains("both an action key and a guard key"), "{err}");
    }

    #[test]
    fn test_cyclic_modes_rejected() {
        let spec = spec_from(
            r#"
            [[layers]]
            name = "T"
            key = "t"
            placement = { setters = "start" }

            [[layers.modes]]
            name = "A"
            key = "a"
            parent = "B"

            [[layers.modes]]
            name = "B"
            key = "b"
            parent = "A"
            "#,
        );
        let err = spec.validate().unwrap_err().to_string();
        assert!(err.contains("cyclic"), "{err}");
    }

    #[test]
    fn test_anchor_spec_forms() {
        let spec = spec_from(
            r#"
            [[layers]]
            name = "T"
            key = "t"

            [layers.placement.setters.after]
            key = "g"
            guards = { caps_lock_is_held = 1 }
            sets = "g_is_held"
            "#,
        );
        let layer = spec.layer("T").unwrap();
        match &layer.placement.setters {
            AnchorSpec::After(pattern) => {
                assert_eq!(pattern.key, "g");
                assert_eq!(pattern.guards.get("caps_lock_is_held"), Some(&1));
                assert_eq!(pattern.sets.as_deref(), Some("g_is_held"));
            }
            other => panic!("unexpected anchor {other:?}"),
        }
        assert_eq!(
            layer.placement.setters.to_string(),
            "after [key=g guards={caps_lock_is_held=1} sets=g_is_held]"
        );
    }

    #[test]
    fn test_held_modes_include_parents() {
        let mut spec = spec_from(R_LAYER);
        spec.layers[0].operations[0].modes = vec!["W".to_string()];
        let layer = spec.layer("R").unwrap();
        let held: Vec<&str> = layer
            .held_modes(&layer.operations[0])
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(held, vec!["E", "W"]);
        assert!(layer.held_modes(&layer.operations[1]).is_empty());
    }

    #[test]
    fn test_mode_key_collision_rejected() {
        let mut spec = spec_from(R_LAYER);
        spec.layers[0].modes[0].key = "quote".to_string();
        let err = spec.validate().unwrap_err().to_string();
        assert!(err.contains("mode key 'quote'"), "{err}");
    }

    #[test]
    fn test_key_space_deduplicates() {
        let spec = spec_from(R_LAYER);
        let mut layer = spec.layer("R").unwrap().clone();
        layer.modes[0].guards = vec!["quote".to_string(), "w".to_string()];
        assert_eq!(layer.key_space(), vec!["6", "semicolon", "quote", "w"]);
    }
}
