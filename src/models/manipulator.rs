//! Rule (manipulator) data structures as stored in `karabiner.json`.
//!
//! Every struct keeps the keys it does not know about in a flattened `extra`
//! map so that hand-authored rules survive a load/save round trip.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Condition type used for layer variable predicates.
pub const VARIABLE_IF: &str = "variable_if";

/// Negated variable predicate.
pub const VARIABLE_UNLESS: &str = "variable_unless";

/// Manipulator type emitted for every generated rule.
pub const BASIC: &str = "basic";

/// A single guard predicate of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Variable name for `variable_if`/`variable_unless` conditions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Condition type (e.g., "`variable_if`", "`frontmost_application_if`")
    #[serde(rename = "type")]
    pub kind: String,
    /// Compared value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Keys this crate does not model (bundle identifiers, descriptions, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Condition {
    /// Creates a `variable_if` condition.
    pub fn variable_if(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: Some(name.into()),
            kind: VARIABLE_IF.to_string(),
            value: Some(Value::from(value)),
            extra: Map::new(),
        }
    }

    /// Returns `(name, value)` when this is a `variable_if` with an integer value.
    #[must_use]
    pub fn as_variable_if(&self) -> Option<(&str, i64)> {
        if self.kind != VARIABLE_IF || !self.extra.is_empty() {
            return None;
        }
        let name = self.name.as_deref()?;
        let value = self.value.as_ref().and_then(value_as_i64)?;
        Some((name, value))
    }

    /// Returns true if this condition reads the given variable (either polarity).
    #[must_use]
    pub fn references(&self, variable: &str) -> bool {
        (self.kind == VARIABLE_IF || self.kind == VARIABLE_UNLESS)
            && self.name.as_deref() == Some(variable)
    }
}

/// Key modifiers on the trigger side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FromModifiers {
    /// Modifiers that must be held
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mandatory: Option<Vec<String>>,
    /// Modifiers that may be held
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<Vec<String>>,
    /// Unmodelled keys
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FromModifiers {
    /// Accept any modifier combination.
    #[must_use]
    pub fn any() -> Self {
        Self {
            mandatory: None,
            optional: Some(vec!["any".to_string()]),
            extra: Map::new(),
        }
    }
}

/// Trigger of a rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FromEvent {
    /// Physical key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_code: Option<String>,
    /// Modifier-match policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<FromModifiers>,
    /// Unmodelled keys (`pointing_button`, `simultaneous`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Output modifiers: Karabiner accepts either a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModifierList {
    /// `"modifiers": "command"`
    One(String),
    /// `"modifiers": ["command", "shift"]`
    Many(Vec<String>),
}

/// Variable assignment effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetVariable {
    /// Variable name
    pub name: String,
    /// Assigned value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Unmodelled keys (`key_up_value`, `type`)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single output effect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToEvent {
    /// Emitted key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_code: Option<String>,
    /// Modifiers held while emitting `key_code`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<ModifierList>,
    /// Variable assignment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_variable: Option<SetVariable>,
    /// External command, treated as an opaque payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_command: Option<String>,
    /// Unmodelled keys
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Coarse shape of an effect, used for structural classification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EffectShape {
    /// Sets the named variable
    SetVariable(String),
    /// Runs an external command
    Command,
    /// Emits a key
    Keystroke,
    /// Anything else
    Other,
}

impl ToEvent {
    /// Sets a variable to an integer value.
    pub fn set_variable(name: impl Into<String>, value: i64) -> Self {
        Self {
            set_variable: Some(SetVariable {
                name: name.into(),
                value: Some(Value::from(value)),
                extra: Map::new(),
            }),
            ..Self::default()
        }
    }

    /// Runs a shell command.
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            shell_command: Some(command.into()),
            ..Self::default()
        }
    }

    /// Emits a key with optional modifiers.
    pub fn keystroke(key_code: impl Into<String>, modifiers: Vec<String>) -> Self {
        Self {
            key_code: Some(key_code.into()),
            modifiers: if modifiers.is_empty() {
                None
            } else {
                Some(ModifierList::Many(modifiers))
            },
            ..Self::default()
        }
    }

    /// Returns the coarse shape of this effect.
    #[must_use]
    pub fn shape(&self) -> EffectShape {
        if let Some(sv) = &self.set_variable {
            EffectShape::SetVariable(sv.name.clone())
        } else if self.shell_command.is_some() {
            EffectShape::Command
        } else if self.key_code.is_some() {
            EffectShape::Keystroke
        } else {
            EffectShape::Other
        }
    }

    /// Returns `(name, value)` if this effect sets a variable to an integer.
    #[must_use]
    pub fn assigned_variable(&self) -> Option<(&str, i64)> {
        let sv = self.set_variable.as_ref()?;
        let value = sv.value.as_ref().and_then(value_as_i64)?;
        Some((sv.name.as_str(), value))
    }
}

/// Tap-versus-hold branches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DelayedAction {
    /// Effects when another key interrupts the hold
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to_if_canceled: Vec<ToEvent>,
    /// Effects when the hold completes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to_if_invoked: Vec<ToEvent>,
    /// Unmodelled keys
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of the ordered rule list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manipulator {
    /// Guard predicates, implicitly AND-ed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Free text ignored by the engine; carries the generation marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Trigger
    #[serde(default)]
    pub from: FromEvent,
    /// Primary effects
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<ToEvent>,
    /// Release effects; `None` means the rule has no held semantics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_after_key_up: Option<Vec<ToEvent>>,
    /// Optional tap/hold branch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_delayed_action: Option<DelayedAction>,
    /// Manipulator type (always "basic" for generated rules)
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    /// Unmodelled keys (`parameters`, `to_if_alone`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_kind() -> String {
    BASIC.to_string()
}

impl Manipulator {
    /// Creates a basic manipulator triggered by `key_code` with any modifiers.
    pub fn basic(key_code: impl Into<String>) -> Self {
        Self {
            conditions: Vec::new(),
            description: None,
            from: FromEvent {
                key_code: Some(key_code.into()),
                modifiers: Some(FromModifiers::any()),
                extra: Map::new(),
            },
            to: Vec::new(),
            to_after_key_up: None,
            to_delayed_action: None,
            kind: default_kind(),
            extra: Map::new(),
        }
    }

    /// Trigger key, if the rule is triggered by a key code.
    #[must_use]
    pub fn trigger_key(&self) -> Option<&str> {
        self.from.key_code.as_deref()
    }

    /// Whether the rule carries release effects.
    #[must_use]
    pub const fn has_release(&self) -> bool {
        self.to_after_key_up.is_some()
    }

    /// Shape of the first primary effect.
    #[must_use]
    pub fn primary_shape(&self) -> EffectShape {
        self.to.first().map_or(EffectShape::Other, ToEvent::shape)
    }

    /// Value required for `variable` by a `variable_if` guard, if any.
    #[must_use]
    pub fn guard_value(&self, variable: &str) -> Option<i64> {
        self.conditions
            .iter()
            .filter_map(Condition::as_variable_if)
            .find(|(name, _)| *name == variable)
            .map(|(_, value)| value)
    }

    /// Whether any guard reads `variable`.
    #[must_use]
    pub fn references(&self, variable: &str) -> bool {
        self.conditions.iter().any(|c| c.references(variable))
    }

    /// Returns the guard list as `(name, value)` pairs when every condition is
    /// an integer `variable_if`; `None` otherwise.
    #[must_use]
    pub fn variable_guards(&self) -> Option<Vec<(&str, i64)>> {
        self.conditions
            .iter()
            .map(Condition::as_variable_if)
            .collect()
    }
}

/// Reads integer-like JSON values (`1`, `true`).
fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}
