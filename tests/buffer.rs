//! Buffer tests - background reparsing, revisions and snapshots

mod common;

use std::thread;
use std::time::Duration;

use common::{buffer, buffer_with_config, byte_of, sync_config};
use strata::{Scope, SyntaxConfig};

const TIMEOUT: Duration = Duration::from_secs(10);

fn background() -> SyntaxConfig {
    SyntaxConfig {
        background_parsing: true,
        ..SyntaxConfig::default()
    }
}

// ========================================================================
// Background parsing
// ========================================================================

#[test]
fn test_background_reparse_is_installed() {
    let mut buffer = buffer_with_config("<p>a</p>", "html", background());
    let end = buffer.len_utf16();
    buffer.replace(end..end, "<script>let z;</script>");

    let update = buffer.wait_for_syntax(TIMEOUT).expect("reparse finishes");
    assert_eq!(update.revision, buffer.revision());
    assert!(!update.changed_rows.is_empty());
    assert_eq!(buffer.layers().unwrap().layer_count(), 2);
    assert_eq!(buffer.snapshot().unwrap().revision, 1);
}

#[test]
fn test_stale_results_are_discarded() {
    let mut buffer = buffer_with_config("[1]", "json", background());
    buffer.replace(2..2, ", 2");
    buffer.replace(5..5, ", 3");
    buffer.replace(8..8, ", 4");

    let update = buffer.wait_for_syntax(TIMEOUT).expect("newest reparse finishes");
    assert_eq!(update.revision, 3);
    assert_eq!(buffer.text().to_string(), "[1, 2, 3, 4]");

    let layers = buffer.layers().unwrap();
    let tree = layers.root().tree().unwrap();
    assert!(!tree.root_node().has_error());
    assert_eq!(tree.root_node().end_byte(), 12);

    // Nothing left to install
    assert!(buffer.poll_syntax().is_none());
}

#[test]
fn test_highlights_use_edited_layers_before_install() {
    let code = "let a;";
    let mut buffer = buffer_with_config(code, "javascript", background());
    buffer.replace(0..0, "  ");

    // Edited but possibly not reparsed yet: positions are already shifted
    let tokens = buffer.highlight_tokens(2..5);
    assert_eq!(tokens.first().map(|t| t.scope), Some(Scope::Keyword));
    assert_eq!(tokens[0].local_range, 0..3);

    buffer.wait_for_syntax(TIMEOUT);
    assert_eq!(buffer.highlight_tokens(2..5)[0].scope, Scope::Keyword);
}

#[test]
fn test_poll_without_edits_returns_nothing() {
    let mut buffer = buffer_with_config("{}", "json", background());
    assert!(buffer.poll_syntax().is_none());
    assert!(buffer.wait_for_syntax(Duration::from_millis(20)).is_none());
}

// ========================================================================
// Synchronous parsing
// ========================================================================

#[test]
fn test_inline_reparse_reports_changed_rows() {
    let mut buffer = buffer("{\n  \"a\": 1\n}\n[2]", "json");
    // Add a member on row 1
    buffer.replace(10..10, ",\n  \"b\": 2");

    let update = buffer.poll_syntax().expect("inline reparse");
    assert_eq!(update.revision, 1);
    assert!(update.changed_rows.iter().any(|rows| rows.contains(&1)));
    assert!(update.changed_rows.iter().all(|rows| rows.end <= buffer.line_count()));
    assert!(buffer.poll_syntax().is_none());
}

#[test]
fn test_noop_edit_does_not_reparse() {
    let mut buffer = buffer("[1]", "json");
    buffer.replace(1..1, "");
    assert_eq!(buffer.revision(), 0);
    assert!(buffer.poll_syntax().is_none());
}

// ========================================================================
// Snapshots
// ========================================================================

#[test]
fn test_snapshot_is_readable_from_another_thread() {
    let code = "<script>let a = 1;</script>";
    let mut buffer = buffer(code, "html");
    let handle = buffer.syntax_handle().unwrap();
    let keyword = byte_of(code, "let");

    let reader = thread::spawn(move || {
        let snapshot = handle.load();
        let tokens = snapshot.highlight_tokens(keyword..keyword + 3);
        (snapshot.revision, tokens[0].scope)
    });
    assert_eq!(reader.join().unwrap(), (0, Scope::Keyword));

    buffer.replace(0..0, "<p></p>");
    let snapshot = buffer.syntax_handle().unwrap().load();
    assert_eq!(snapshot.revision, 1);
    assert_eq!(snapshot.text.len_bytes(), code.len() + 7);
}

#[test]
fn test_old_snapshot_stays_valid_after_edit() {
    let mut buffer = buffer("[1, 2]", "json");
    let before = buffer.snapshot().unwrap();

    buffer.replace(0..6, "{}");

    assert_eq!(before.text.to_string(), "[1, 2]");
    let node = before.syntax_node_at(1).unwrap();
    assert_eq!(node.kind, "number");

    let after = buffer.snapshot().unwrap();
    assert_eq!(after.syntax_node_at(0).unwrap().kind, "{");
}

#[test]
fn test_syntax_node_at_prefers_injected_layer() {
    let code = "<script>let a = 1;</script>";
    let buffer = buffer(code, "html");

    let node = buffer.syntax_node_at(byte_of(code, "a =")).unwrap();
    assert_eq!(node.kind, "identifier");
    assert_eq!(node.language, "javascript");

    let node = buffer.syntax_node_at(2).unwrap();
    assert_eq!(node.kind, "tag_name");
    assert_eq!(node.language, "html");
}

#[test]
fn test_sync_config_is_kept() {
    let buffer = buffer("[]", "json");
    assert_eq!(buffer.config(), &sync_config());
    assert_eq!(buffer.language(), Some("json"));
}
