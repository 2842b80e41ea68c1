//! Shared test fixtures for E2E CLI tests.
#![allow(dead_code)] // Not every test file uses every fixture

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Path to the lazykarabiner binary
pub fn lazykarabiner_bin() -> &'static str {
    env!("CARGO_BIN_EXE_lazykarabiner")
}

/// Single layer `T`: key `t`, action `6 -> move`, guard `quote`, setters
/// placed after the hand-written `g` setter.
pub const T_LAYER_SPEC: &str = r#"
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

/// Layer `R` with one sub-mode `E`, placed at the end of the list.
pub const R_LAYER_SPEC: &str = r#"
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

/// Two operations bound to the same mode combination.
pub const INVALID_SPEC: &str = r#"
[[layers]]
name = "T"
key = "t"
command = "ws.sh {op} {arg}"
keys = ["6"]
placement = { setters = "start" }

[[layers.operations]]
name = "move"

[[layers.operations]]
name = "swap"
"#;

/// A hand-written rule with only `variable_if` guards.
pub fn foreign_rule(key: &str, guards: &[(&str, i64)]) -> Value {
    let conditions: Vec<Value> = guards
        .iter()
        .map(|(name, value)| json!({"name": name, "type": "variable_if", "value": value}))
        .collect();
    json!({
        "conditions": conditions,
        "from": {"key_code": key, "modifiers": {"optional": ["any"]}},
        "to": [{"key_code": key}],
        "type": "basic"
    })
}

/// Hand-written layer setter for `g`, used as the placement anchor.
pub fn g_setter() -> Value {
    json!({
        "conditions": [{"name": "caps_lock_is_held", "type": "variable_if", "value": 1}],
        "from": {"key_code": "g", "modifiers": {"optional": ["any"]}},
        "to": [{"set_variable": {"name": "g_is_held", "value": 1}}],
        "to_after_key_up": [{"set_variable": {"name": "g_is_held", "value": 0}}],
        "type": "basic"
    })
}

/// A document with the default `h`, `g` setter, `j` rule list.
pub fn default_rules() -> Vec<Value> {
    vec![
        foreign_rule("h", &[("caps_lock_is_held", 1)]),
        g_setter(),
        foreign_rule("j", &[("caps_lock_is_held", 1)]),
    ]
}

/// Wraps a rule list into a minimal `karabiner.json`.
pub fn karabiner_document(manipulators: Vec<Value>) -> Value {
    json!({
        "global": {"show_in_menu_bar": false},
        "profiles": [{
            "name": "Default profile",
            "selected": true,
            "complex_modifications": {
                "parameters": {"basic.to_if_alone_timeout_milliseconds": 250},
                "rules": [{
                    "description": "Layers",
                    "manipulators": manipulators
                }]
            },
            "virtual_hid_keyboard": {"keyboard_type_v2": "ansi"}
        }]
    })
}

/// A temp workspace holding a config, a layer spec and a document.
pub struct Workspace {
    pub dir: TempDir,
    pub config: PathBuf,
    pub spec: PathBuf,
    pub document: PathBuf,
}

impl Workspace {
    /// Writes `spec` and a document containing `manipulators`, and a config
    /// pointing at both.
    pub fn new(spec: &str, manipulators: Vec<Value>) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let spec_path = dir.path().join("layers.toml");
        let document = dir.path().join("karabiner.json");
        let config = dir.path().join("config.toml");

        fs::write(&spec_path, spec).expect("Failed to write spec");
        write_document(&document, &karabiner_document(manipulators));
        fs::write(
            &config,
            format!(
                "[paths]\ndocument = {:?}\nlayer_spec = {:?}\n",
                document.display().to_string(),
                spec_path.display().to_string()
            ),
        )
        .expect("Failed to write config");

        Self {
            dir,
            config,
            spec: spec_path,
            document,
        }
    }

    /// Runs the binary with `--config` pointing at this workspace.
    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(lazykarabiner_bin())
            .args(args)
            .arg("--config")
            .arg(&self.config)
            .env_remove("LAZYKARABINER_CONFIG")
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to execute command")
    }

    /// Current document text.
    pub fn document_text(&self) -> String {
        fs::read_to_string(&self.document).expect("Failed to read document")
    }

    /// Current rule list.
    pub fn manipulators(&self) -> Vec<Value> {
        let doc: Value = serde_json::from_str(&self.document_text()).expect("Invalid JSON");
        doc["profiles"][0]["complex_modifications"]["rules"][0]["manipulators"]
            .as_array()
            .cloned()
            .unwrap_or_default()
    }
}

/// Writes a document with Karabiner's own 4-space indentation.
pub fn write_document(path: &Path, document: &Value) {
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    serde::Serialize::serialize(document, &mut serializer).expect("Failed to serialize");
    buf.push(b'\n');
    fs::write(path, buf).expect("Failed to write document");
}

/// Trigger keys of a rule list, in order.
pub fn triggers(manipulators: &[Value]) -> Vec<String> {
    manipulators
        .iter()
        .filter_map(|m| m["from"]["key_code"].as_str().map(str::to_string))
        .collect()
}

/// Generation marker of a rule, if any.
pub fn marker(manipulator: &Value) -> Option<&str> {
    manipulator["description"].as_str()
}
