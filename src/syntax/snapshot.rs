//! Immutable syntax snapshots
//!
//! A snapshot pairs a text revision with the layer tree parsed from it.
//! The buffer publishes a new snapshot after every edit and every
//! installed reparse; readers on any thread load the latest one through a
//! [`SyntaxHandle`] without locking.

use std::ops::Range;
use std::sync::Arc;

use arc_swap::ArcSwap;
use ropey::Rope;
use tree_sitter::Point;

use super::captures::{highlight_captures, highlight_tokens, Captures, HighlightToken};
use super::layer::LayerTree;
use super::scope::ScopeTable;

/// A node returned by [`SyntaxSnapshot::syntax_node_at`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    pub kind: &'static str,
    pub byte_range: Range<usize>,
    pub start: Point,
    pub end: Point,
    pub language: String,
}

#[derive(Debug, Clone)]
pub struct SyntaxSnapshot {
    pub revision: u64,
    pub text: Rope,
    pub layers: Arc<LayerTree>,
    pub scopes: Arc<ScopeTable>,
}

impl SyntaxSnapshot {
    pub fn highlight_captures(&self, range: Range<usize>) -> Captures<'_> {
        highlight_captures(&self.layers, &self.text, range, &self.scopes)
    }

    pub fn highlight_tokens(&self, range: Range<usize>) -> Vec<HighlightToken> {
        highlight_tokens(&self.layers, &self.text, range, &self.scopes)
    }

    pub fn syntax_node_at(&self, byte: usize) -> Option<SyntaxNode> {
        syntax_node_at(&self.layers, byte)
    }
}

/// Smallest node containing `byte`, searching the deepest layer first
pub fn syntax_node_at(layers: &LayerTree, byte: usize) -> Option<SyntaxNode> {
    let mut candidates = layers.layers_in(byte..byte);
    candidates.sort_by_key(|layer| std::cmp::Reverse(layer.depth()));

    candidates.into_iter().find_map(|layer| {
        let node = layer
            .tree()?
            .root_node()
            .descendant_for_byte_range(byte, byte)?;
        Some(SyntaxNode {
            kind: node.kind(),
            byte_range: node.byte_range(),
            start: node.start_position(),
            end: node.end_position(),
            language: layer.language_id().to_string(),
        })
    })
}

/// Shared, lock-free access to the latest snapshot
#[derive(Debug, Clone)]
pub struct SyntaxHandle(Arc<ArcSwap<SyntaxSnapshot>>);

impl SyntaxHandle {
    pub(crate) fn new(snapshot: SyntaxSnapshot) -> Self {
        Self(Arc::new(ArcSwap::from_pointee(snapshot)))
    }

    pub fn load(&self) -> Arc<SyntaxSnapshot> {
        self.0.load_full()
    }

    pub(crate) fn store(&self, snapshot: SyntaxSnapshot) {
        self.0.store(Arc::new(snapshot));
    }
}
