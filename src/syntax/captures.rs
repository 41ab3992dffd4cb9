//! Highlight captures and tokens
//!
//! [`highlight_captures`] runs the highlights query of every layer that
//! intersects a byte range ([`layer_captures`] does the same below one
//! layer), drops matches whose text predicates fail, clips
//! captures to the request and resolves their names to [`Scope`]s.
//!
//! [`highlight_tokens`] flattens those captures into non-overlapping
//! tokens. For each byte the winning capture is chosen by:
//! 1. deeper layer (an injected child beats its parent)
//! 2. narrower node
//! 3. for the same node, the earlier pattern, unless a later pattern is
//!    marked `#set! override`
//!
//! Captures without a resolved scope never paint.

use std::cmp::Reverse;
use std::ops::Range;

use ropey::Rope;
use streaming_iterator::StreamingIterator;
use tree_sitter::QueryCursor;

use super::layer::{Layer, LayerTree};
use super::scope::{Scope, ScopeTable};
use super::RopeProvider;

/// One named match of a highlight pattern against a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture<'a> {
    /// Node range clipped to the requested range
    pub byte_range: Range<usize>,
    /// Unclipped node range
    pub node_range: Range<usize>,
    /// Raw capture name as written in the query
    pub name: &'a str,
    /// Most specific recognized scope for `name`, if any
    pub scope: Option<Scope>,
    pub layer_depth: usize,
    pub language: &'a str,
    pub pattern_index: usize,
    pub is_override: bool,
}

impl Capture<'_> {
    fn name_components(&self) -> usize {
        self.name.split('.').count()
    }

    /// Whether `self` should paint over `other` where both cover a byte
    fn beats(&self, other: &Capture<'_>) -> bool {
        if self.layer_depth != other.layer_depth {
            return self.layer_depth > other.layer_depth;
        }
        let (len, other_len) = (self.node_range.len(), other.node_range.len());
        if len != other_len {
            return len < other_len;
        }
        if self.node_range == other.node_range && self.pattern_index != other.pattern_index {
            return if self.pattern_index > other.pattern_index {
                self.is_override
            } else {
                !other.is_override
            };
        }
        false
    }
}

/// Ordered captures for one request.
///
/// Sorted by start, then longer first (outer to inner), then shallower
/// layer, then fewer name components, then pattern index.
pub struct Captures<'a> {
    inner: std::vec::IntoIter<Capture<'a>>,
}

impl<'a> Iterator for Captures<'a> {
    type Item = Capture<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Captures<'_> {}

/// Highlight captures of every layer intersecting `range`
pub fn highlight_captures<'a>(
    layers: &'a LayerTree,
    text: &Rope,
    range: Range<usize>,
    scopes: &ScopeTable,
) -> Captures<'a> {
    layer_captures(layers.root(), text, range, scopes)
}

/// Highlight captures of `layer` and its descendants intersecting `range`.
///
/// Layers without a tree contribute nothing.
pub fn layer_captures<'a>(
    layer: &'a Layer,
    text: &Rope,
    range: Range<usize>,
    scopes: &ScopeTable,
) -> Captures<'a> {
    assert!(
        range.start <= range.end && range.end <= text.len_bytes(),
        "highlight range {:?} out of bounds (length {})",
        range,
        text.len_bytes()
    );

    let mut captures = Vec::new();
    let mut cursor = QueryCursor::new();

    for layer in layer.layers_in(range.clone()) {
        let Some(tree) = layer.tree() else {
            continue;
        };
        let layer_range = layer.byte_range();
        let query_range = range.start.max(layer_range.start)..range.end.min(layer_range.end);
        if query_range.start >= query_range.end {
            continue;
        }

        let config = layer.config();
        let highlights = config.highlights();
        cursor.set_byte_range(query_range.clone());
        let mut matches = cursor.matches(
            highlights.query(),
            tree.root_node(),
            RopeProvider(text.slice(..)),
        );

        while let Some(m) = matches.next() {
            if !highlights.satisfies(m.pattern_index, m.captures, text) {
                continue;
            }
            let is_override = highlights.is_override(m.pattern_index);

            for capture in m.captures {
                let name = highlights.capture_name(capture.index);
                if name.starts_with('_') {
                    continue;
                }
                let node_range = capture.node.byte_range();
                let byte_range =
                    node_range.start.max(query_range.start)..node_range.end.min(query_range.end);
                if byte_range.start >= byte_range.end {
                    continue;
                }
                captures.push(Capture {
                    byte_range,
                    node_range,
                    name,
                    scope: scopes.resolve(name),
                    layer_depth: layer.depth(),
                    language: config.id(),
                    pattern_index: m.pattern_index,
                    is_override,
                });
            }
        }
    }

    captures.sort_by_key(|c| {
        (
            c.byte_range.start,
            Reverse(c.byte_range.len()),
            c.layer_depth,
            c.name_components(),
            c.pattern_index,
        )
    });

    Captures {
        inner: captures.into_iter(),
    }
}

/// A resolved, styleable span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightToken {
    /// Byte range relative to the start of the request
    pub local_range: Range<usize>,
    pub scope: Scope,
}

impl HighlightToken {
    pub fn len(&self) -> usize {
        self.local_range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local_range.is_empty()
    }
}

/// Non-overlapping tokens for `range`, sorted by position
pub fn highlight_tokens(
    layers: &LayerTree,
    text: &Rope,
    range: Range<usize>,
    scopes: &ScopeTable,
) -> Vec<HighlightToken> {
    let base = range.start;
    let captures: Vec<Capture<'_>> = highlight_captures(layers, text, range.clone(), scopes)
        .filter(|c| c.scope.is_some())
        .collect();

    let mut winners: Vec<Option<usize>> = vec![None; range.len()];
    for (index, capture) in captures.iter().enumerate() {
        for slot in &mut winners[capture.byte_range.start - base..capture.byte_range.end - base] {
            match *slot {
                Some(current) if !capture.beats(&captures[current]) => {}
                _ => *slot = Some(index),
            }
        }
    }

    let mut tokens: Vec<HighlightToken> = Vec::new();
    let mut run: Option<(usize, usize)> = None;
    for (offset, winner) in winners.iter().copied().chain(std::iter::once(None)).enumerate() {
        match (run, winner) {
            (Some((_, current)), Some(next)) if current == next => {}
            _ => {
                if let Some((start, current)) = run.take() {
                    if let Some(scope) = captures[current].scope {
                        tokens.push(HighlightToken {
                            local_range: start..offset,
                            scope,
                        });
                    }
                }
                run = winner.map(|w| (offset, w));
            }
        }
    }
    tokens
}

/// Scope painted at `offset` (relative to the request start), if any
pub fn scope_at(tokens: &[HighlightToken], offset: usize) -> Option<Scope> {
    for token in tokens {
        if token.local_range.contains(&offset) {
            return Some(token.scope);
        }
        if token.local_range.start > offset {
            break; // tokens are sorted, no need to continue
        }
    }
    None
}
