//! Parse layers
//!
//! The root layer parses the whole document. Injected layers parse a byte
//! range of their parent with `set_included_ranges` and may themselves
//! inject further layers, up to a maximum depth.
//!
//! Edits are applied in two steps:
//! 1. [`LayerTree::edit`] maps every layer's range through the edit and
//!    patches the trees. It is cheap and runs on the editing thread.
//! 2. [`LayerTree::reparse`] reparses invalidated layers top-down on a
//!    clone, re-runs injections and diffs children. It can run on a worker;
//!    cancellation is checked between layers and polled by the parser.
//!
//! Trees are shared through `Arc`, so published snapshots never see a tree
//! being edited; `Arc::make_mut` copies a tree only while a snapshot still
//! holds it.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ropey::Rope;
use tree_sitter::{ParseOptions, ParseState, Parser, Tree};

use super::injection::find_injections;
use super::languages::{LanguageConfig, LanguageRegistry};
use crate::buffer::edit::{point_at_byte, ByteEdit};

/// Parse state of one layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    /// Never parsed, or the last parse failed
    Unparsed,
    /// Parsed from scratch
    Parsed,
    /// An edit touched the layer since its last parse
    EditApplied,
    /// Incrementally reparsed after an edit
    Reparsed,
}

/// One parse tree covering a byte range
#[derive(Debug, Clone)]
pub struct Layer {
    config: Arc<LanguageConfig>,
    byte_range: Range<usize>,
    tree: Option<Arc<Tree>>,
    state: LayerState,
    depth: usize,
    children: Vec<Layer>,
}

impl Layer {
    fn new(config: Arc<LanguageConfig>, byte_range: Range<usize>, depth: usize) -> Self {
        Self {
            config,
            byte_range,
            tree: None,
            state: LayerState::Unparsed,
            depth,
            children: Vec::new(),
        }
    }

    pub fn config(&self) -> &Arc<LanguageConfig> {
        &self.config
    }

    pub fn language_id(&self) -> &str {
        self.config.id()
    }

    pub fn byte_range(&self) -> Range<usize> {
        self.byte_range.clone()
    }

    pub fn tree(&self) -> Option<&Arc<Tree>> {
        self.tree.as_ref()
    }

    pub fn state(&self) -> LayerState {
        self.state
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn children(&self) -> &[Layer] {
        &self.children
    }

    /// This layer and its descendants whose range intersects `range`, in
    /// pre-order. An empty request matches layers containing its position.
    pub fn layers_in(&self, range: Range<usize>) -> Vec<&Layer> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(layer) = stack.pop() {
            let r = &layer.byte_range;
            let hit = if range.is_empty() {
                r.start <= range.start && range.start <= r.end
            } else {
                r.start < range.end && range.start < r.end
            };
            if hit {
                out.push(layer);
                stack.extend(layer.children.iter().rev());
            }
        }
        out
    }

    fn edit(&mut self, edit: &ByteEdit) {
        if self.byte_range.end < edit.start_byte {
            return;
        }

        let touched = edit.touches(&self.byte_range);
        self.byte_range = edit.map_start(self.byte_range.start)..edit.map_end(self.byte_range.end);
        if let Some(tree) = &mut self.tree {
            Arc::make_mut(tree).edit(&edit.to_input_edit());
        }
        if touched && self.state != LayerState::Unparsed {
            self.state = LayerState::EditApplied;
        }

        for child in &mut self.children {
            child.edit(edit);
        }
    }

    fn mark_failed(&mut self, changed: &mut Vec<Range<usize>>) {
        self.tree = None;
        self.state = LayerState::Unparsed;
        for child in self.children.drain(..) {
            changed.push(child.byte_range);
        }
        changed.push(self.byte_range.clone());
    }
}

/// Cooperative cancellation for a reparse
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Parsers per language, reused across reparses (parsers are !Sync)
#[derive(Default)]
pub struct ParserPool {
    parsers: HashMap<String, Parser>,
}

impl ParserPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn parser_for(&mut self, config: &LanguageConfig) -> Option<&mut Parser> {
        if !self.parsers.contains_key(config.id()) {
            let mut parser = Parser::new();
            if let Err(e) = parser.set_language(config.language()) {
                tracing::error!("Failed to set language for {}: {}", config.id(), e);
                return None;
            }
            self.parsers.insert(config.id().to_string(), parser);
        }
        self.parsers.get_mut(config.id())
    }
}

/// Result of a completed reparse
#[derive(Debug, Clone)]
pub struct ReparseOutcome {
    pub layers: LayerTree,
    /// Byte ranges whose syntax changed, unsorted and possibly overlapping
    pub changed_ranges: Vec<Range<usize>>,
}

/// The root layer and everything injected under it
#[derive(Debug, Clone)]
pub struct LayerTree {
    root: Layer,
    registry: Arc<LanguageRegistry>,
    max_depth: usize,
}

impl LayerTree {
    /// An unparsed tree covering `len_bytes` of text
    pub fn new(
        config: Arc<LanguageConfig>,
        registry: Arc<LanguageRegistry>,
        max_depth: usize,
        len_bytes: usize,
    ) -> Self {
        Self {
            root: Layer::new(config, 0..len_bytes, 0),
            registry,
            max_depth,
        }
    }

    pub fn root(&self) -> &Layer {
        &self.root
    }

    pub fn registry(&self) -> &Arc<LanguageRegistry> {
        &self.registry
    }

    /// Every layer in pre-order (parents before children, children in
    /// document order)
    pub fn layers(&self) -> Vec<&Layer> {
        let mut out = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(layer) = stack.pop() {
            out.push(layer);
            stack.extend(layer.children.iter().rev());
        }
        out
    }

    /// Layers whose range intersects `range`, in pre-order. An empty
    /// request matches layers containing its position.
    pub fn layers_in(&self, range: Range<usize>) -> Vec<&Layer> {
        self.root.layers_in(range)
    }

    pub fn layer_count(&self) -> usize {
        self.layers().len()
    }

    /// Map ranges and patch trees for an edit already applied to the text
    pub fn edit(&mut self, edit: &ByteEdit) {
        if edit.is_noop() {
            return;
        }
        self.root.edit(edit);
    }

    /// Reparse invalidated layers against `text`.
    ///
    /// Works on a copy and returns `None` if cancelled, leaving `self`
    /// untouched either way.
    pub fn reparse(
        &self,
        text: &Rope,
        pool: &mut ParserPool,
        cancel: &CancelFlag,
    ) -> Option<ReparseOutcome> {
        let mut root = self.root.clone();
        let mut pass = Reparse {
            source: text.to_string(),
            text,
            pool,
            cancel,
            registry: &self.registry,
            max_depth: self.max_depth,
            changed: Vec::new(),
        };
        if !pass.visit(&mut root) {
            tracing::debug!("Reparse cancelled");
            return None;
        }

        let changed_ranges = pass.changed;
        Some(ReparseOutcome {
            layers: LayerTree {
                root,
                registry: Arc::clone(&self.registry),
                max_depth: self.max_depth,
            },
            changed_ranges,
        })
    }

    /// Edit, then reparse synchronously
    pub fn apply_edit(&mut self, edit: &ByteEdit, text: &Rope, pool: &mut ParserPool) {
        self.edit(edit);
        if let Some(outcome) = self.reparse(text, pool, &CancelFlag::new()) {
            *self = outcome.layers;
        }
    }
}

/// How parsing one layer ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LayerParse {
    Done,
    Failed,
    Cancelled,
}

struct Reparse<'a> {
    source: String,
    text: &'a Rope,
    pool: &'a mut ParserPool,
    cancel: &'a CancelFlag,
    registry: &'a LanguageRegistry,
    max_depth: usize,
    changed: Vec<Range<usize>>,
}

impl Reparse<'_> {
    /// Returns false when cancelled
    fn visit(&mut self, layer: &mut Layer) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        if matches!(layer.state, LayerState::Unparsed | LayerState::EditApplied) {
            match self.parse(layer) {
                LayerParse::Done => self.update_children(layer),
                LayerParse::Failed => layer.mark_failed(&mut self.changed),
                LayerParse::Cancelled => return false,
            }
        }

        layer.children.iter_mut().all(|child| self.visit(child))
    }

    fn parse(&mut self, layer: &mut Layer) -> LayerParse {
        let Some(parser) = self.pool.parser_for(&layer.config) else {
            return LayerParse::Failed;
        };

        let included = if layer.depth == 0 {
            Vec::new()
        } else {
            let Range { start, end } = layer.byte_range.clone();
            vec![tree_sitter::Range {
                start_byte: start,
                end_byte: end,
                start_point: point_at_byte(self.text, start),
                end_point: point_at_byte(self.text, end),
            }]
        };
        if let Err(e) = parser.set_included_ranges(&included) {
            tracing::warn!(
                "Invalid range {:?} for {} layer: {:?}",
                layer.byte_range,
                layer.config.id(),
                e
            );
            return LayerParse::Failed;
        }

        let old_tree = layer.tree.as_deref();
        let bytes = self.source.as_bytes();
        let cancel = self.cancel;
        let mut progress = |_: &ParseState| cancel.is_cancelled();
        let parsed = parser.parse_with_options(
            &mut |offset, _| bytes.get(offset..).unwrap_or_default(),
            old_tree,
            Some(ParseOptions::new().progress_callback(&mut progress)),
        );
        let Some(tree) = parsed else {
            if cancel.is_cancelled() {
                // A halted parse would otherwise resume on the next call
                parser.reset();
                return LayerParse::Cancelled;
            }
            tracing::warn!(
                "Parse failed for {} layer at {:?}",
                layer.config.id(),
                layer.byte_range
            );
            return LayerParse::Failed;
        };

        match old_tree {
            Some(old) => {
                self.changed
                    .extend(old.changed_ranges(&tree).map(|r| r.start_byte..r.end_byte));
                layer.state = LayerState::Reparsed;
            }
            None => {
                self.changed.push(layer.byte_range.clone());
                layer.state = LayerState::Parsed;
            }
        }
        tracing::trace!(
            "Parsed {} layer {:?} ({:?})",
            layer.config.id(),
            layer.byte_range,
            layer.state
        );

        layer.tree = Some(Arc::new(tree));
        LayerParse::Done
    }

    /// Re-run injections and diff them against the current children
    fn update_children(&mut self, layer: &mut Layer) {
        let injections = match (&layer.tree, layer.depth < self.max_depth) {
            (Some(tree), true) => find_injections(
                &layer.config,
                tree,
                self.text,
                layer.byte_range.clone(),
                self.registry,
            ),
            _ => Vec::new(),
        };

        let mut old = std::mem::take(&mut layer.children);
        for injection in injections {
            let reused = old.iter().position(|child| {
                child.byte_range == injection.byte_range
                    && child.config.id() == injection.config.id()
            });
            match reused {
                Some(index) => layer.children.push(old.remove(index)),
                None => {
                    tracing::debug!(
                        "Created {} layer at {:?} under {}",
                        injection.config.id(),
                        injection.byte_range,
                        layer.config.id()
                    );
                    self.changed.push(injection.byte_range.clone());
                    layer.children.push(Layer::new(
                        injection.config,
                        injection.byte_range,
                        layer.depth + 1,
                    ));
                }
            }
        }

        for removed in old {
            tracing::debug!(
                "Removed {} layer at {:?}",
                removed.config.id(),
                removed.byte_range
            );
            self.changed.push(removed.byte_range);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<LanguageRegistry> {
        let mut registry = LanguageRegistry::new();
        registry.register(
            LanguageConfig::new(
                "html",
                tree_sitter_html::LANGUAGE.into(),
                "(tag_name) @tag",
                r#"((script_element (raw_text) @injection.content)
                    (#set! injection.language "javascript"))"#,
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
        Arc::new(registry)
    }

    fn parsed(code: &str) -> LayerTree {
        let registry = registry();
        let html = registry.get("html").unwrap();
        let layers = LayerTree::new(html, registry, 4, code.len());
        layers
            .reparse(&Rope::from_str(code), &mut ParserPool::new(), &CancelFlag::new())
            .unwrap()
            .layers
    }

    #[test]
    fn test_initial_parse_creates_children() {
        let code = "<script>a</script><p></p><script>b</script>";
        let layers = parsed(code);
        assert_eq!(layers.root().state(), LayerState::Parsed);
        let children = layers.root().children();
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.state() == LayerState::Parsed));
        assert!(children.iter().all(|c| c.depth() == 1));
        assert_eq!(children[0].byte_range(), 8..9);
    }

    #[test]
    fn test_cancelled_reparse_has_no_effect() {
        let registry = registry();
        let html = registry.get("html").unwrap();
        let layers = LayerTree::new(html, registry, 4, 3);
        let cancel = CancelFlag::new();
        cancel.cancel();
        assert!(layers
            .reparse(&Rope::from_str("<p>"), &mut ParserPool::new(), &cancel)
            .is_none());
        assert_eq!(layers.root().state(), LayerState::Unparsed);
    }

    #[test]
    fn test_cancel_interrupts_a_running_parse() {
        let registry = registry();
        let code = "<p>text</p>\n".repeat(2000);
        let text = Rope::from_str(&code);
        let mut pool = ParserPool::new();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let mut layer = Layer::new(registry.get("html").unwrap(), 0..code.len(), 0);
        let mut pass = Reparse {
            source: code.clone(),
            text: &text,
            pool: &mut pool,
            cancel: &cancel,
            registry: &registry,
            max_depth: 4,
            changed: Vec::new(),
        };
        assert_eq!(pass.parse(&mut layer), LayerParse::Cancelled);
        assert!(layer.tree().is_none());
        assert_eq!(layer.state(), LayerState::Unparsed);

        // The pooled parser starts over rather than resuming the halted parse
        let html = registry.get("html").unwrap();
        let layers = LayerTree::new(html, Arc::clone(&registry), 4, code.len());
        let outcome = layers.reparse(&text, &mut pool, &CancelFlag::new()).unwrap();
        let root = outcome.layers.root().tree().unwrap().root_node();
        assert!(!root.has_error());
        assert_eq!(root.end_byte(), code.len());
    }

    #[test]
    fn test_failed_child_is_isolated() {
        let code = "<script>a</script><script>b</script>";
        let mut layers = parsed(code);
        // Corrupt the first child's range so its parse is rejected
        layers.root.children[0].byte_range = 9..8;
        layers.root.children[0].state = LayerState::EditApplied;

        let outcome = layers
            .reparse(&Rope::from_str(code), &mut ParserPool::new(), &CancelFlag::new())
            .unwrap();
        let children = outcome.layers.root().children();
        assert_eq!(children[0].state(), LayerState::Unparsed);
        assert!(children[0].tree().is_none());
        assert_eq!(children[1].state(), LayerState::Parsed);
        assert_eq!(outcome.layers.root().state(), LayerState::Parsed);
    }

    #[test]
    fn test_layers_in_range() {
        let code = "<script>a</script><p></p><script>b</script>";
        let layers = parsed(code);
        assert_eq!(layers.layer_count(), 3);
        assert_eq!(layers.layers_in(0..5).len(), 1);
        assert_eq!(layers.layers_in(8..9).len(), 2);
        let all: Vec<_> = layers.layers_in(0..code.len()).iter().map(|l| l.depth()).collect();
        assert_eq!(all, vec![0, 1, 1]);
    }

    #[test]
    fn test_max_depth_stops_injection() {
        let registry = registry();
        let html = registry.get("html").unwrap();
        let code = "<script>a</script>";
        let layers = LayerTree::new(html, registry, 0, code.len())
            .reparse(&Rope::from_str(code), &mut ParserPool::new(), &CancelFlag::new())
            .unwrap()
            .layers;
        assert!(layers.root().children().is_empty());
    }
}
