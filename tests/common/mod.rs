//! Shared test helpers for integration tests
//!
//! Note: Functions may appear unused because each test file compiles separately.

#![allow(dead_code)]

use std::sync::Arc;

use strata::syntax::{LanguageConfig, LanguageRegistry};
use strata::{Buffer, SyntaxConfig};

/// HTML with script and style injections
pub const HTML_HIGHLIGHTS: &str = r#"
(tag_name) @tag
(raw_text) @string
"#;

pub const HTML_INJECTIONS: &str = r#"
((script_element (raw_text) @injection.content)
 (#set! injection.language "javascript"))
((style_element (raw_text) @injection.content)
 (#set! injection.language "css"))
"#;

pub const JAVASCRIPT_HIGHLIGHTS: &str = r#"
"const" @keyword.storage.modifier
"let" @keyword
((identifier) @constant (#lua-match? @constant "^%u+$"))
(identifier) @variable
(string) @string
"#;

pub const CSS_HIGHLIGHTS: &str = r#"
(property_name) @property
(tag_name) @tag
"#;

pub const JSON_INDENTS: &str = r#"
[(object) (array)] @indent
["}" "]"] @outdent
"#;

/// A small registry with inline queries, independent of the bundled ones
pub fn test_registry() -> Arc<LanguageRegistry> {
    let mut registry = LanguageRegistry::new();
    let configs = [
        LanguageConfig::new(
            "html",
            tree_sitter_html::LANGUAGE.into(),
            HTML_HIGHLIGHTS,
            HTML_INJECTIONS,
            "",
        ),
        LanguageConfig::new(
            "javascript",
            tree_sitter_javascript::LANGUAGE.into(),
            JAVASCRIPT_HIGHLIGHTS,
            "",
            "",
        ),
        LanguageConfig::new("css", tree_sitter_css::LANGUAGE.into(), CSS_HIGHLIGHTS, "", ""),
        LanguageConfig::new(
            "json",
            tree_sitter_json::LANGUAGE.into(),
            "(string) @string (number) @number",
            "",
            JSON_INDENTS,
        ),
    ];
    for config in configs {
        registry.register(config.expect("test queries should compile"));
    }
    registry.add_alias("js", "javascript");
    Arc::new(registry)
}

/// Config that reparses inline after every edit
pub fn sync_config() -> SyntaxConfig {
    SyntaxConfig {
        background_parsing: false,
        ..SyntaxConfig::default()
    }
}

/// A buffer parsed synchronously with the test registry
pub fn buffer(text: &str, language: &str) -> Buffer {
    buffer_with_config(text, language, sync_config())
}

pub fn buffer_with_config(text: &str, language: &str, config: SyntaxConfig) -> Buffer {
    let registry = test_registry();
    let language = registry.require(language).expect("language is registered");
    Buffer::with_language(text, language, registry, config).expect("buffer should open")
}

/// Buffer contents as a String
pub fn buffer_to_string(buffer: &Buffer) -> String {
    buffer.text().to_string()
}

/// Byte offset of the first occurrence of `needle`
pub fn byte_of(text: &str, needle: &str) -> usize {
    text.find(needle)
        .unwrap_or_else(|| panic!("{needle:?} not found in {text:?}"))
}
