//! Incremental, multi-layer syntax
//!
//! Provides tree-sitter based syntax support with:
//! - Nested language layers found by injection queries
//! - Incremental reparsing on a worker thread
//! - Highlight captures resolved to theme scopes
//! - Indentation hints from indent queries
//!
//! ## Architecture
//!
//! ```text
//! Buffer::replace → ByteEdit → LayerTree::edit (ranges + trees patched)
//!                 → publish snapshot → ParseWorker::submit
//!                 → (worker thread) LayerTree::reparse → ParseResult
//!                 → Buffer::poll_syntax (revision check) → publish snapshot
//! ```
//!
//! Readers query a [`SyntaxSnapshot`], never the layers being reparsed.

mod captures;
mod indent;
mod injection;
mod languages;
mod layer;
mod predicates;
mod scope;
mod snapshot;
mod worker;

use ropey::RopeSlice;
use tree_sitter::{Node, TextProvider};

pub use captures::{
    highlight_captures, highlight_tokens, layer_captures, scope_at, Capture, Captures,
    HighlightToken,
};
pub use indent::{
    detect_indent_strategy, indent_for_line_break, indent_level_of_line, IndentStrategy,
    LineBreakIndent,
};
pub use injection::{find_injections, Injection};
pub use languages::{LanguageConfig, LanguageRegistry};
pub use layer::{CancelFlag, Layer, LayerState, LayerTree, ParserPool, ReparseOutcome};
pub use predicates::{CompiledQuery, TextPredicate};
pub use scope::{Scope, ScopeTable};
pub use snapshot::{syntax_node_at, SyntaxHandle, SyntaxNode, SyntaxSnapshot};
pub use worker::{ParseJob, ParseResult, ParseWorker};

/// Byte chunks of a rope slice
pub(crate) struct ChunksBytes<'a> {
    chunks: ropey::iter::Chunks<'a>,
}

impl<'a> Iterator for ChunksBytes<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        self.chunks.next().map(str::as_bytes)
    }
}

/// Lets query predicates read node text straight from the rope
pub(crate) struct RopeProvider<'a>(pub RopeSlice<'a>);

impl<'a> TextProvider<&'a [u8]> for RopeProvider<'a> {
    type I = ChunksBytes<'a>;

    fn text(&mut self, node: Node) -> Self::I {
        let fragment = self.0.byte_slice(node.start_byte()..node.end_byte());
        ChunksBytes {
            chunks: fragment.chunks(),
        }
    }
}
