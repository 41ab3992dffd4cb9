//! Injection detection
//!
//! Runs a layer's injection query and turns each match into a target
//! language plus a byte range. The content node comes from
//! `@injection.content` (or `@content`). The language comes from the text of
//! `@injection.language` (or `@language`), or from
//! `#set! injection.language "..."` on the pattern.

use std::borrow::Cow;
use std::ops::Range;
use std::sync::Arc;

use ropey::Rope;
use streaming_iterator::StreamingIterator;
use tree_sitter::{QueryCursor, Tree};

use super::languages::{LanguageConfig, LanguageRegistry};
use super::RopeProvider;

/// An embedded-language region found inside a parent layer
#[derive(Debug, Clone)]
pub struct Injection {
    pub config: Arc<LanguageConfig>,
    pub byte_range: Range<usize>,
}

/// Find the injections of `config` in `tree`, clipped to `within`.
///
/// Unknown languages and empty ranges are skipped. When two injections
/// overlap, the one starting first wins. The result is sorted by start.
pub fn find_injections(
    config: &LanguageConfig,
    tree: &Tree,
    text: &Rope,
    within: Range<usize>,
    registry: &LanguageRegistry,
) -> Vec<Injection> {
    let Some(query) = config.injections() else {
        return Vec::new();
    };
    let Some(content_index) = query
        .capture_index("injection.content")
        .or_else(|| query.capture_index("content"))
    else {
        return Vec::new();
    };
    let language_index = query
        .capture_index("injection.language")
        .or_else(|| query.capture_index("language"));

    let mut cursor = QueryCursor::new();
    cursor.set_byte_range(within.clone());
    let mut matches = cursor.matches(query.query(), tree.root_node(), RopeProvider(text.slice(..)));

    let mut found = Vec::new();
    while let Some(m) = matches.next() {
        if !query.satisfies(m.pattern_index, m.captures, text) {
            continue;
        }
        let Some(content) = m.captures.iter().find(|c| c.index == content_index) else {
            continue;
        };

        let name: Option<Cow<'_, str>> = language_index
            .and_then(|index| m.captures.iter().find(|c| c.index == index))
            .map(|c| text.byte_slice(c.node.byte_range()).into())
            .or_else(|| {
                query
                    .property(m.pattern_index, "injection.language")
                    .map(Cow::Borrowed)
            });
        let Some(name) = name else {
            continue;
        };

        let node_range = content.node.byte_range();
        let byte_range = node_range.start.max(within.start)..node_range.end.min(within.end);
        if byte_range.start >= byte_range.end {
            continue;
        }

        match registry.get(&name) {
            Some(target) => found.push(Injection {
                config: target,
                byte_range,
            }),
            None => tracing::trace!(
                "Skipping injection of unknown language `{}` in {}",
                name,
                config.id()
            ),
        }
    }

    found.sort_by_key(|i| i.byte_range.start);
    let mut end = within.start;
    found.retain(|injection| {
        if injection.byte_range.start < end {
            return false;
        }
        end = injection.byte_range.end;
        true
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn registry() -> LanguageRegistry {
        let mut registry = LanguageRegistry::new();
        registry.register(
            LanguageConfig::new(
                "html",
                tree_sitter_html::LANGUAGE.into(),
                "(tag_name) @tag",
                r#"((script_element (raw_text) @injection.content)
                    (#set! injection.language "javascript"))
                   ((style_element (raw_text) @injection.content)
                    (#set! injection.language "css"))
                   ((comment) @injection.content
                    (#set! injection.language "comment"))"#,
                "",
            )
            .unwrap(),
        );
        registry.register(
            LanguageConfig::new(
                "javascript",
                tree_sitter_javascript::LANGUAGE.into(),
                "(identifier) @variable",
                "",
                "",
            )
            .unwrap(),
        );
        registry
    }

    fn injections(code: &str, within: Range<usize>) -> Vec<(String, Range<usize>)> {
        let registry = registry();
        let html = registry.get("html").unwrap();
        let mut parser = Parser::new();
        parser.set_language(html.language()).unwrap();
        let tree = parser.parse(code, None).unwrap();
        find_injections(&html, &tree, &Rope::from_str(code), within, &registry)
            .into_iter()
            .map(|i| (i.config.id().to_string(), i.byte_range))
            .collect()
    }

    #[test]
    fn test_script_injection_found() {
        let code = "<p>hi</p><script>let a = 1;</script>";
        let start = code.find("let").unwrap();
        let end = code.find("</script>").unwrap();
        assert_eq!(
            injections(code, 0..code.len()),
            vec![("javascript".to_string(), start..end)]
        );
    }

    #[test]
    fn test_unknown_languages_are_skipped() {
        // css and comment are not registered
        let code = "<!-- note --><style>a { color: red; }</style>";
        assert!(injections(code, 0..code.len()).is_empty());
    }

    #[test]
    fn test_injection_clipped_to_parent_range() {
        let code = "<script>let abc = 1;</script>";
        let start = code.find("let").unwrap();
        let clipped = injections(code, 0..start + 3);
        assert_eq!(clipped, vec![("javascript".to_string(), start..start + 3)]);
    }
}
