//! Configuration tests
//!
//! Tests for loading, saving and applying the syntax config.

mod common;

use common::buffer_with_config;
use strata::{Error, Scope, SyntaxConfig};

// ========================================================================
// Load / Save
// ========================================================================

#[test]
fn test_save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("syntax.yaml");

    let config = SyntaxConfig {
        tab_length: 8,
        max_injection_depth: 1,
        recognized_scopes: vec!["keyword".into(), "comment".into()],
        background_parsing: false,
    };
    config.save(&path).unwrap();

    assert!(path.exists());
    assert_eq!(SyntaxConfig::load(&path), config);
}

#[test]
fn test_load_missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = SyntaxConfig::load(&dir.path().join("absent.yaml"));
    assert_eq!(config, SyntaxConfig::default());
}

#[test]
fn test_load_invalid_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    std::fs::write(&path, "tab_length: [not, a, number]\n").unwrap();

    assert_eq!(SyntaxConfig::load(&path), SyntaxConfig::default());
}

#[test]
fn test_from_yaml_reports_errors() {
    let result = SyntaxConfig::from_yaml("max_injection_depth: -1\n");
    assert!(matches!(result, Err(Error::Config(_))));
}

// ========================================================================
// Applying the config
// ========================================================================

#[test]
fn test_max_injection_depth_zero_disables_injections() {
    let config = SyntaxConfig::from_yaml("max_injection_depth: 0\nbackground_parsing: false\n").unwrap();
    let buffer = buffer_with_config("<script>let a;</script>", "html", config);

    assert_eq!(buffer.layers().unwrap().layer_count(), 1);
    let tokens = buffer.highlight_tokens(8..11);
    assert_eq!(tokens[0].scope, Scope::String);
}

#[test]
fn test_tab_length_drives_indent_levels() {
    let config = SyntaxConfig::from_yaml("tab_length: 2\nbackground_parsing: false\n").unwrap();
    let buffer = buffer_with_config("[\n    1\n]", "json", config);
    assert_eq!(buffer.indent_level_of_line(1), 2);
}

#[test]
fn test_unknown_scope_names_are_ignored() {
    let config = SyntaxConfig {
        recognized_scopes: vec!["keyword".into(), "no.such.scope".into()],
        ..SyntaxConfig::default()
    };
    let table = config.scope_table();
    assert!(table.recognizes(Scope::Keyword));
    assert_eq!(table.resolve("keyword.control"), Some(Scope::Keyword));
    assert_eq!(table.resolve("string"), None);
}
