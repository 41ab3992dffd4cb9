//! Edit translation
//!
//! Turns "replace UTF-16 range R with S" into a rope mutation, line tree
//! mutations and a byte-level [`ByteEdit`] for the parser.
//!
//! Instead of patching lines character by character, the lines touched by
//! the edit are re-scanned from the new text and reconciled with the old
//! nodes: reused nodes are resized, surplus nodes removed, missing ones
//! inserted. The touched region starts one line early when the edit begins
//! at a line start, so a new LF can join a preceding CR. It ends after the
//! terminator of the line holding the edit end, so a dangling CR or LF left
//! by a deletion is re-paired with its neighbour.

use std::ops::Range;

use ropey::Rope;
use tree_sitter::{InputEdit, Point};

use crate::line_tree::{scan_lines, LineId, LineTree};

/// Row and UTF-16 column in line tree coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct TextPosition {
    pub row: usize,
    pub column: usize,
}

/// Byte-indexed description of an edit, in the parse engine's terms.
///
/// Rows in the points count LF only, matching tree-sitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteEdit {
    pub start_byte: usize,
    pub old_end_byte: usize,
    pub new_end_byte: usize,
    pub start_point: Point,
    pub old_end_point: Point,
    pub new_end_point: Point,
}

impl ByteEdit {
    pub fn to_input_edit(&self) -> InputEdit {
        InputEdit {
            start_byte: self.start_byte,
            old_end_byte: self.old_end_byte,
            new_end_byte: self.new_end_byte,
            start_position: self.start_point,
            old_end_position: self.old_end_point,
            new_end_position: self.new_end_point,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.start_byte == self.old_end_byte && self.start_byte == self.new_end_byte
    }

    /// Map the start of a range through the edit. Text inserted at the
    /// boundary stays inside the range.
    pub fn map_start(&self, pos: usize) -> usize {
        if pos <= self.start_byte {
            pos
        } else if pos >= self.old_end_byte {
            pos - self.old_end_byte + self.new_end_byte
        } else {
            self.start_byte
        }
    }

    /// Map the end of a range through the edit. Text inserted at the
    /// boundary stays inside the range.
    pub fn map_end(&self, pos: usize) -> usize {
        if pos < self.start_byte {
            pos
        } else if pos >= self.old_end_byte {
            pos - self.old_end_byte + self.new_end_byte
        } else {
            self.new_end_byte
        }
    }

    /// True when the edit touches `range`, including its boundaries
    pub fn touches(&self, range: &Range<usize>) -> bool {
        self.start_byte <= range.end && self.old_end_byte >= range.start
    }
}

/// Result of one replace operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditDescriptor {
    /// Replaced range in old UTF-16 offsets
    pub range: Range<usize>,
    /// UTF-16 length of the inserted text
    pub inserted_len: usize,
    pub start: TextPosition,
    pub old_end: TextPosition,
    pub new_end: TextPosition,
    /// Lines created by the edit, in document order
    pub inserted_lines: Vec<LineId>,
    /// Lines destroyed by the edit
    pub removed_lines: Vec<LineId>,
    /// Surviving lines whose content or terminator changed
    pub edited_lines: Vec<LineId>,
    pub byte_edit: ByteEdit,
}

impl EditDescriptor {
    pub fn line_count_delta(&self) -> isize {
        self.inserted_lines.len() as isize - self.removed_lines.len() as isize
    }
}

/// Tree-sitter point of `byte` in `text`
pub fn point_at_byte(text: &Rope, byte: usize) -> Point {
    let row = text.byte_to_line(byte);
    Point::new(row, byte - text.line_to_byte(row))
}

fn position_of(lines: &LineTree, offset: usize) -> TextPosition {
    let line = lines.line_containing(offset);
    TextPosition {
        row: line.row,
        column: offset - line.location,
    }
}

/// Replace `range` (UTF-16) of `text` with `insert`, keeping `lines` in sync.
///
/// # Panics
///
/// If the range is inverted, extends past the end of the text, or has an
/// endpoint inside a surrogate pair.
pub fn apply_replace(
    text: &mut Rope,
    lines: &mut LineTree,
    range: Range<usize>,
    insert: &str,
) -> EditDescriptor {
    let total = lines.total_len();
    assert!(
        range.start <= range.end && range.end <= total,
        "replace range {:?} out of bounds (length {})",
        range,
        total
    );
    debug_assert_eq!(total, text.len_utf16_cu());

    let start = position_of(lines, range.start);
    let old_end = position_of(lines, range.end);

    let start_char = text.utf16_cu_to_char(range.start);
    let end_char = text.utf16_cu_to_char(range.end);
    assert!(
        text.char_to_utf16_cu(start_char) == range.start
            && text.char_to_utf16_cu(end_char) == range.end,
        "replace range {:?} out of bounds: splits a surrogate pair",
        range
    );
    let start_byte = text.char_to_byte(start_char);
    let old_end_byte = text.char_to_byte(end_char);
    let start_point = point_at_byte(text, start_byte);
    let old_end_point = point_at_byte(text, old_end_byte);

    // Touched region of old lines
    let start_line = lines.line_containing(range.start);
    let first = if range.start == start_line.location && start_line.row > 0 {
        lines.line_at(start_line.row - 1)
    } else {
        start_line
    };
    let last = lines.line_containing(range.end);
    let reaches_end = last.id == lines.last_line();
    let mut old_ids = vec![first.id];
    let mut cursor = first.id;
    while cursor != last.id {
        match lines.next_line(cursor) {
            Some(next) => {
                old_ids.push(next);
                cursor = next;
            }
            None => break,
        }
    }

    text.remove(start_char..end_char);
    text.insert(start_char, insert);

    let inserted_len: usize = insert.chars().map(char::len_utf16).sum();
    let region_end = last.end() - (range.end - range.start) + inserted_len;
    let region_chars = text.utf16_cu_to_char(first.location)..text.utf16_cu_to_char(region_end);
    let mut spans = scan_lines(text.slice(region_chars).chars());
    if !reaches_end {
        // The region ends right after a terminator
        let tail = spans.pop();
        debug_assert_eq!(tail.map(|s| s.raw_len), Some(0));
    }

    let changes_text = !range.is_empty() || !insert.is_empty();
    let edited_range = range.start..range.start + inserted_len;
    let mut edited_lines = Vec::new();
    let mut inserted_lines = Vec::new();
    let mut removed_lines = Vec::new();
    let mut location = first.location;
    let mut previous = first.id;

    for (i, span) in spans.iter().enumerate() {
        match old_ids.get(i) {
            Some(&id) => {
                let old = lines.span(id);
                let line_range = location..location + span.raw_len;
                let touched = changes_text
                    && edited_range.start <= line_range.end
                    && edited_range.end >= line_range.start
                    && !(i == 0 && first.id != start_line.id);
                if old != *span || touched {
                    lines.set_line(id, *span);
                    edited_lines.push(id);
                }
                previous = id;
            }
            None => {
                previous = lines.insert_line_after(previous, *span);
                inserted_lines.push(previous);
            }
        }
        location += span.raw_len;
    }
    for &id in old_ids.iter().skip(spans.len()) {
        lines.remove_line(id);
        removed_lines.push(id);
    }

    let new_end_byte = start_byte + insert.len();
    let new_end_point = point_at_byte(text, new_end_byte);
    let new_end = position_of(lines, range.start + inserted_len);

    tracing::trace!(
        "replace {:?} with {} units: +{} -{} ~{} lines",
        range,
        inserted_len,
        inserted_lines.len(),
        removed_lines.len(),
        edited_lines.len()
    );

    EditDescriptor {
        range,
        inserted_len,
        start,
        old_end,
        new_end,
        inserted_lines,
        removed_lines,
        edited_lines,
        byte_edit: ByteEdit {
            start_byte,
            old_end_byte,
            new_end_byte,
            start_point,
            old_end_point,
            new_end_point,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(text: &str) -> (Rope, LineTree) {
        (Rope::from_str(text), LineTree::from_text(text))
    }

    fn widths(lines: &LineTree) -> Vec<u8> {
        lines.iter().map(|l| l.terminator).collect()
    }

    #[test]
    fn test_insert_crlf_inside_line() {
        let (mut text, mut lines) = setup("ab\ncd");
        let edit = apply_replace(&mut text, &mut lines, 2..2, "\r\n");

        assert_eq!(text.to_string(), "ab\r\n\ncd");
        assert_eq!(lines.line_count(), 3);
        assert_eq!(widths(&lines), vec![2, 1, 0]);
        assert_eq!(edit.inserted_lines.len(), 1);
        assert!(edit.removed_lines.is_empty());
        assert_eq!(edit.new_end, TextPosition { row: 1, column: 0 });
        lines.check_invariants().unwrap();
    }

    #[test]
    fn test_byte_edit_for_multibyte_insert() {
        let (mut text, mut lines) = setup("é\nx");
        let edit = apply_replace(&mut text, &mut lines, 2..2, "ü");

        assert_eq!(edit.byte_edit.start_byte, 3);
        assert_eq!(edit.byte_edit.old_end_byte, 3);
        assert_eq!(edit.byte_edit.new_end_byte, 5);
        assert_eq!(edit.byte_edit.start_point, Point::new(1, 0));
        assert_eq!(edit.byte_edit.new_end_point, Point::new(1, 2));
    }

    #[test]
    fn test_byte_edit_points_count_lf_rows_only() {
        let (mut text, mut lines) = setup("a\rb\nc");
        let edit = apply_replace(&mut text, &mut lines, 5..5, "d");
        // Line tree sees three rows, the parser sees two
        assert_eq!(edit.start, TextPosition { row: 2, column: 1 });
        assert_eq!(edit.byte_edit.start_point, Point::new(1, 1));
    }

    #[test]
    fn test_map_range_through_insert() {
        let edit = ByteEdit {
            start_byte: 10,
            old_end_byte: 10,
            new_end_byte: 13,
            start_point: Point::new(0, 10),
            old_end_point: Point::new(0, 10),
            new_end_point: Point::new(0, 13),
        };
        assert_eq!(edit.map_start(5), 5);
        assert_eq!(edit.map_start(10), 10);
        assert_eq!(edit.map_end(10), 13);
        assert_eq!(edit.map_start(20), 23);
        assert!(edit.touches(&(4..10)));
        assert!(!edit.touches(&(11..20)));
    }

    #[test]
    fn test_map_range_through_delete() {
        let edit = ByteEdit {
            start_byte: 10,
            old_end_byte: 20,
            new_end_byte: 10,
            start_point: Point::new(0, 10),
            old_end_point: Point::new(0, 20),
            new_end_point: Point::new(0, 10),
        };
        assert_eq!(edit.map_start(15), 10);
        assert_eq!(edit.map_end(15), 10);
        assert_eq!(edit.map_end(25), 15);
    }

    #[test]
    fn test_noop_replace() {
        let (mut text, mut lines) = setup("abc");
        let edit = apply_replace(&mut text, &mut lines, 1..1, "");
        assert!(edit.byte_edit.is_noop());
        assert!(edit.inserted_lines.is_empty());
        assert!(edit.removed_lines.is_empty());
        assert!(edit.edited_lines.is_empty());
    }
}
