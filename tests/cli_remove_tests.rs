//! End-to-end tests for `lazykarabiner remove`.

mod fixtures;
use fixtures::*;

use serde_json::Value;

#[test]
fn test_remove_all_generated_rules() {
    let ws = Workspace::new(T_LAYER_SPEC, default_rules());
    assert_eq!(ws.run(&["apply"]).status.code(), Some(0));
    assert_eq!(ws.manipulators().len(), 6);

    let output = ws.run(&["remove"]);
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("Removed 3"));
    assert_eq!(triggers(&ws.manipulators()), vec!["h", "g", "j"]);
}

#[test]
fn test_remove_named_layer_json() {
    let ws = Workspace::new(T_LAYER_SPEC, default_rules());
    assert_eq!(ws.run(&["apply"]).status.code(), Some(0));

    let output = ws.run(&["remove", "T", "--json"]);
    assert_eq!(output.status.code(), Some(0));
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["removed"], 3);
    assert_eq!(result["setters"], 1);
    assert_eq!(result["written"], true);
}

#[test]
fn test_remove_unknown_layer_fails() {
    let ws = Workspace::new(T_LAYER_SPEC, default_rules());
    let before = ws.document_text();

    let output = ws.run(&["remove", "Z"]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(ws.document_text(), before);
}

#[test]
fn test_remove_dry_run() {
    let ws = Workspace::new(T_LAYER_SPEC, default_rules());
    assert_eq!(ws.run(&["apply"]).status.code(), Some(0));
    let applied = ws.document_text();

    let output = ws.run(&["remove", "--dry-run"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(ws.document_text(), applied);
}
