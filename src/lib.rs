//! strata - editable text buffer with incremental syntax
//!
//! This crate provides a line index over mutable text, the translation of
//! text edits into parser edits, and a multi-layer tree-sitter syntax tree
//! that answers highlight and indentation queries.

pub mod buffer;
pub mod config;
pub mod error;
pub mod line_tree;
pub mod syntax;
pub mod tracing;

// Re-export commonly used types
pub use buffer::{Buffer, EditDescriptor, LineGeometry, SyntaxUpdate};
pub use config::SyntaxConfig;
pub use error::{Error, Result};
pub use line_tree::{LineId, LineTree};
pub use syntax::{HighlightToken, LanguageRegistry, Scope};
