//! Indentation from the indents query
//!
//! The query marks nodes with `@indent`, `@indent.inherit` or `@outdent`.
//! Rows and columns of tree-sitter points are compared with each other
//! only; indent levels are measured on line tree rows.

use std::collections::HashSet;
use std::ops::Range;

use ropey::Rope;
use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Point, QueryCursor, Tree};

use super::layer::LayerTree;
use super::predicates::CompiledQuery;
use super::RopeProvider;
use crate::buffer::edit::point_at_byte;
use crate::line_tree::LineTree;

/// How to indent the line created by a line break
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineBreakIndent {
    pub indent_level: usize,
    /// Caret sits between an opening and a closing construct (`{|}`); a
    /// second line break keeps the closing part on its own line
    pub insert_extra_line_break: bool,
}

/// Indentation style used by a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndentStrategy {
    Tab,
    Space(usize),
    Unknown,
}

#[derive(Default)]
struct IndentNodes {
    indent: HashSet<usize>,
    outdent: HashSet<usize>,
}

impl IndentNodes {
    fn collect(query: &CompiledQuery, tree: &Tree, text: &Rope, range: Range<usize>) -> Self {
        let indent = query.capture_index("indent");
        let inherit = query.capture_index("indent.inherit");
        let outdent = query.capture_index("outdent");

        let mut nodes = Self::default();
        let mut cursor = QueryCursor::new();
        cursor.set_byte_range(range);
        let mut matches = cursor.matches(query.query(), tree.root_node(), RopeProvider(text.slice(..)));
        while let Some(m) = matches.next() {
            if !query.satisfies(m.pattern_index, m.captures, text) {
                continue;
            }
            for capture in m.captures {
                let index = Some(capture.index);
                if index == indent || index == inherit {
                    nodes.indent.insert(capture.node.id());
                } else if index == outdent {
                    nodes.outdent.insert(capture.node.id());
                }
            }
        }
        nodes
    }

    /// Innermost indenting node on the caret row that starts before the
    /// caret and is still open at it
    fn increasing<'t>(&self, from: Node<'t>, caret: Point, caret_byte: usize) -> Option<Node<'t>> {
        let mut current = Some(from);
        while let Some(node) = current.filter(|n| n.start_position().row == caret.row) {
            if self.indent.contains(&node.id())
                && node.start_position().column < caret.column
                && node.end_byte() > caret_byte
            {
                return Some(node);
            }
            current = node.parent();
        }
        None
    }

    /// Innermost outdenting node on the caret row at or after the caret
    fn decreasing<'t>(&self, from: Node<'t>, caret: Point) -> Option<Node<'t>> {
        let mut current = Some(from);
        while let Some(node) = current.filter(|n| n.start_position().row == caret.row) {
            if self.outdent.contains(&node.id()) && node.start_position().column >= caret.column {
                return Some(node);
            }
            current = node.parent();
        }
        None
    }
}

/// Indent level of a line from its leading tabs and spaces
pub fn indent_level_of_line(text: &Rope, lines: &LineTree, row: usize, tab_length: usize) -> usize {
    let tab_length = tab_length.max(1);
    let line = lines.line_at(row);
    let start = text.byte_to_char(line.byte_location);

    let mut width = 0;
    for c in text.chars_at(start).take(line.len()) {
        match c {
            '\t' => width += tab_length - width % tab_length,
            ' ' => width += 1,
            _ => break,
        }
    }
    width / tab_length
}

/// Indentation for a line break replacing `start_byte..end_byte`
pub fn indent_for_line_break(
    layers: &LayerTree,
    text: &Rope,
    lines: &LineTree,
    start_byte: usize,
    end_byte: usize,
    tab_length: usize,
) -> LineBreakIndent {
    assert!(
        start_byte <= end_byte && end_byte <= text.len_bytes(),
        "caret range {}..{} out of bounds (length {})",
        start_byte,
        end_byte,
        text.len_bytes()
    );

    let level_at = |byte: usize| {
        indent_level_of_line(text, lines, lines.line_containing_byte(byte).row, tab_length)
    };
    let keep = LineBreakIndent {
        indent_level: level_at(start_byte),
        insert_extra_line_break: false,
    };

    let mut candidates = layers.layers_in(start_byte..start_byte);
    candidates.sort_by_key(|layer| std::cmp::Reverse(layer.depth()));
    let Some((tree, query)) = candidates.into_iter().find_map(|layer| {
        Some((layer.tree()?, layer.config().indents()?))
    }) else {
        return keep;
    };

    let start = point_at_byte(text, start_byte);
    let end = point_at_byte(text, end_byte);
    let rows = text.line_to_byte(start.row)..text.line_to_byte((end.row + 1).min(text.len_lines()));
    let nodes = IndentNodes::collect(query, tree, text, rows);

    let root = tree.root_node();
    let indenting = root
        .descendant_for_byte_range(start_byte, start_byte)
        .and_then(|node| nodes.increasing(node, start, start_byte));
    let outdenting = root
        .descendant_for_byte_range(end_byte, end_byte)
        .and_then(|node| nodes.decreasing(node, end));

    match (indenting, outdenting) {
        (Some(node), outdent) => LineBreakIndent {
            indent_level: level_at(node.start_byte()) + 1,
            insert_extra_line_break: outdent.is_some(),
        },
        (None, Some(node)) => {
            // Back to the line where the closed construct starts
            let mut starting = node;
            while starting.start_position().row == node.start_position().row {
                match starting.parent() {
                    Some(parent) => starting = parent,
                    None => break,
                }
            }
            LineBreakIndent {
                indent_level: level_at(starting.start_byte()),
                insert_extra_line_break: false,
            }
        }
        (None, None) => keep,
    }
}

/// Guess tabs or spaces from the first lines of the document
pub fn detect_indent_strategy(layers: &LayerTree, text: &Rope, lines: &LineTree) -> IndentStrategy {
    let Some(tree) = layers.root().tree() else {
        return IndentStrategy::Unknown;
    };
    let root = tree.root_node();
    let line_count = lines.line_count();

    let mut scanned = 0;
    let mut scanned_with_content = 0;
    let mut tab_lines = 0;
    let mut space_lines = 0;
    let mut lowest_space_count = usize::MAX;

    for line in lines.iter() {
        scanned += 1;
        let is_comment = root
            .descendant_for_byte_range(line.byte_location, line.byte_location)
            .is_some_and(|node| node.kind().ends_with("comment"));
        if is_comment || line.is_empty() {
            continue;
        }
        scanned_with_content += 1;

        let mut chars = text.chars_at(text.byte_to_char(line.byte_location));
        match chars.next() {
            Some('\t') => tab_lines += 1,
            Some(' ') => {
                let spaces = 1 + chars
                    .take(line.len() - 1)
                    .take_while(|c| *c == ' ')
                    .count();
                if spaces > 1 {
                    lowest_space_count = lowest_space_count.min(spaces);
                    space_lines += 1;
                }
            }
            _ => {}
        }

        let scanned_enough =
            scanned >= line_count.min(100) || scanned_with_content >= line_count.min(20);
        if scanned_enough && (tab_lines > 0 || space_lines > 0) {
            return if tab_lines > space_lines {
                IndentStrategy::Tab
            } else {
                IndentStrategy::Space(lowest_space_count)
            };
        }
    }
    IndentStrategy::Unknown
}
