//! End-to-end tests for `lazykarabiner apply` (the default command).

mod fixtures;
use fixtures::*;

use serde_json::{json, Value};

fn assert_code(output: &std::process::Output, code: i32) {
    assert_eq!(
        output.status.code(),
        Some(code),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn variable_guards(manipulator: &Value) -> Vec<(String, i64)> {
    manipulator["conditions"]
        .as_array()
        .map(|conditions| {
            conditions
                .iter()
                .map(|c| {
                    (
                        c["name"].as_str().unwrap_or_default().to_string(),
                        c["value"].as_i64().unwrap_or_default(),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn test_apply_single_layer() {
    let ws = Workspace::new(T_LAYER_SPEC, default_rules());

    let output = ws.run(&["apply"]);
    assert_code(&output, 0);
    assert!(String::from_utf8_lossy(&output.stdout).contains("Updated"));

    let rules = ws.manipulators();
    assert_eq!(triggers(&rules), vec!["h", "g", "t", "6", "quote", "j"]);

    let setter = &rules[2];
    assert_eq!(marker(setter), Some("lazykarabiner/v1 layer=T kind=setter"));
    assert_eq!(setter["to"][0]["set_variable"]["name"], "t_is_held");
    assert_eq!(setter["to"][0]["set_variable"]["value"], 1);
    assert_eq!(setter["to_after_key_up"][0]["set_variable"]["value"], 0);

    let action = &rules[3];
    assert_eq!(marker(action), Some("lazykarabiner/v1 layer=T kind=action"));
    assert_eq!(action["to"][0]["shell_command"], "ws.sh move 6");
    assert_eq!(
        variable_guards(action),
        vec![
            ("caps_lock_is_held".to_string(), 1),
            ("t_is_held".to_string(), 1)
        ]
    );
    assert!(action.get("to_after_key_up").is_none());

    let guard = &rules[4];
    assert_eq!(marker(guard), Some("lazykarabiner/v1 layer=T kind=guard"));
    assert_eq!(guard["to"][0]["set_variable"]["name"], "guard_noop");
}

#[test]
fn test_no_subcommand_runs_apply() {
    let ws = Workspace::new(T_LAYER_SPEC, default_rules());

    let output = ws.run(&[]);
    assert_code(&output, 0);
    assert_eq!(ws.manipulators().len(), 6);
}

#[test]
fn test_apply_is_idempotent() {
    let ws = Workspace::new(T_LAYER_SPEC, default_rules());

    assert_code(&ws.run(&["apply"]), 0);
    let first = ws.document_text();

    let output = ws.run(&["apply"]);
    assert_code(&output, 0);
    assert!(String::from_utf8_lossy(&output.stdout).contains("up to date"));
    assert_eq!(ws.document_text(), first);
}

#[test]
fn test_apply_preserves_unrelated_document_content() {
    let ws = Workspace::new(T_LAYER_SPEC, default_rules());
    assert_code(&ws.run(&["apply"]), 0);

    let doc: Value = serde_json::from_str(&ws.document_text()).unwrap();
    assert_eq!(doc["global"], json!({"show_in_menu_bar": false}));
    assert_eq!(
        doc["profiles"][0]["complex_modifications"]["parameters"],
        json!({"basic.to_if_alone_timeout_milliseconds": 250})
    );
    assert!(ws.document_text().starts_with("{\n    \"global\""));
}

#[test]
fn test_missing_anchor_leaves_document_untouched() {
    let ws = Workspace::new(
        T_LAYER_SPEC,
        vec![foreign_rule("h", &[("caps_lock_is_held", 1)])],
    );
    let before = ws.document_text();

    let output = ws.run(&["apply"]);
    assert_code(&output, 1);
    assert!(String::from_utf8_lossy(&output.stderr).contains("Structural Not Found"));
    assert_eq!(ws.document_text(), before);
}

#[test]
fn test_dry_run_does_not_write() {
    let ws = Workspace::new(T_LAYER_SPEC, default_rules());
    let before = ws.document_text();

    let output = ws.run(&["apply", "--dry-run"]);
    assert_code(&output, 0);
    assert!(String::from_utf8_lossy(&output.stdout).contains("Dry run"));
    assert_eq!(ws.document_text(), before);
}

#[test]
fn test_apply_adopts_unmarked_rules() {
    let mut rules = default_rules();
    let mut legacy = foreign_rule("6", &[("caps_lock_is_held", 1), ("t_is_held", 1)]);
    legacy["to"] = json!([{"shell_command": "old-ws.sh move 6"}]);
    rules.push(legacy);
    let ws = Workspace::new(T_LAYER_SPEC, rules);

    let output = ws.run(&["apply", "--json"]);
    assert_code(&output, 0);
    let result: Value = serde_json::from_slice(&output.stdout).expect("Should parse JSON output");
    assert_eq!(result["report"]["legacy"], 1);
    assert_eq!(result["report"]["removed"]["actions"], 1);
    assert_eq!(result["written"], true);

    let rules = ws.manipulators();
    let sixes: Vec<&Value> = rules.iter().filter(|m| m["from"]["key_code"] == "6").collect();
    assert_eq!(sixes.len(), 1);
    assert_eq!(sixes[0]["to"][0]["shell_command"], "ws.sh move 6");
}

#[test]
fn test_foreign_rules_gain_mode_guards() {
    let hand_written = foreign_rule(
        "1",
        &[
            ("caps_lock_is_held", 1),
            ("r_is_held", 1),
            ("x_is_held", 1),
        ],
    );
    let ws = Workspace::new(R_LAYER_SPEC, vec![hand_written]);

    let output = ws.run(&["apply", "--json"]);
    assert_code(&output, 0);
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["report"]["patched"], 1);

    let rules = ws.manipulators();
    assert!(marker(&rules[0]).is_none());
    assert!(variable_guards(&rules[0]).contains(&("e_is_held".to_string(), 0)));

    let output = ws.run(&["apply", "--json"]);
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["report"]["patched"], 0);
    assert_eq!(result["written"], false);
}

#[test]
fn test_invalid_spec_exits_with_2() {
    let ws = Workspace::new(INVALID_SPEC, default_rules());
    let before = ws.document_text();

    let output = ws.run(&["apply"]);
    assert_code(&output, 2);
    assert_eq!(ws.document_text(), before);
}

#[test]
fn test_missing_document_exits_with_3() {
    let ws = Workspace::new(T_LAYER_SPEC, default_rules());
    std::fs::remove_file(&ws.document).unwrap();

    let output = ws.run(&["apply"]);
    assert_code(&output, 3);
    assert!(String::from_utf8_lossy(&output.stderr).contains("Document not found"));
}

#[test]
fn test_unknown_rule_selector_fails() {
    let ws = Workspace::new(T_LAYER_SPEC, default_rules());

    let output = ws.run(&["apply", "--rule", "Nope"]);
    assert_code(&output, 1);
}

#[test]
fn test_rule_selected_by_description() {
    let ws = Workspace::new(T_LAYER_SPEC, default_rules());

    let output = ws.run(&["apply", "--profile", "Default profile", "--rule", "Layers"]);
    assert_code(&output, 0);
    assert_eq!(ws.manipulators().len(), 6);
}

#[test]
fn test_rule_matching_once_patched_is_adopted_not_patched() {
    let mut stale = foreign_rule("1", &[("caps_lock_is_held", 1), ("r_is_held", 1)]);
    stale["to"] = json!([{"shell_command": "ws.sh focus 1"}]);
    let ws = Workspace::new(R_LAYER_SPEC, vec![stale]);

    let output = ws.run(&["apply", "--json"]);
    assert_code(&output, 0);
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["report"]["legacy"], 1);
    assert_eq!(result["report"]["patched"], 0);
    let first = ws.document_text();

    let output = ws.run(&["apply", "--json"]);
    assert_code(&output, 0);
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["report"]["legacy"], 0);
    assert_eq!(result["written"], false);
    assert_eq!(ws.document_text(), first);
}

#[test]
fn test_body_anchored_before_setters_fails() {
    let spec = T_LAYER_SPEC.replace(
        "[layers.placement.setters.after]",
        "[layers.placement]\nbody = \"start\"\n\n[layers.placement.setters.after]",
    );
    let ws = Workspace::new(&spec, default_rules());
    let before = ws.document_text();

    let output = ws.run(&["apply"]);
    assert_code(&output, 1);
    assert!(String::from_utf8_lossy(&output.stderr).contains("before the setters"));
    assert_eq!(ws.document_text(), before);
}

#[test]
fn test_hand_written_key_order_survives_apply() {
    let mut rules = default_rules();
    rules.push(json!({
        "from": {"key_code": "left_control", "modifiers": {"optional": ["any"]}},
        "parameters": {"basic.to_if_alone_timeout_milliseconds": 200},
        "to": [{"key_code": "left_control"}],
        "to_if_alone": [{"key_code": "escape"}],
        "type": "basic"
    }));
    let ws = Workspace::new(T_LAYER_SPEC, rules);

    assert_code(&ws.run(&["apply"]), 0);
    let rules = ws.manipulators();
    let keys: Vec<&str> = rules[6]
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(keys, vec!["from", "parameters", "to", "to_if_alone", "type"]);
}
