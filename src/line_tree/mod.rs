//! Line index over the buffer text
//!
//! A red-black tree ordered by document position. Every node is one
//! physical line and carries subtree aggregates (UTF-16 length, UTF-8
//! length and line count), so offset, byte and row lookups are all
//! O(log n). Nodes live in a [`SlotMap`] arena and link to each other by
//! [`LineId`], which stays valid until the line itself is removed.
//!
//! ## Invariants
//!
//! - Aggregates equal the recomputed sums after every public operation.
//! - The tree always holds at least one line; only the last line has a
//!   terminator width of 0.

mod scan;

pub use scan::{scan_lines, LineSpan};

use slotmap::{new_key_type, SlotMap};

new_key_type! { pub struct LineId; }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

#[derive(Debug, Clone)]
struct LineNode {
    span: LineSpan,
    color: Color,
    parent: Option<LineId>,
    left: Option<LineId>,
    right: Option<LineId>,
    subtree_len: usize,
    subtree_bytes: usize,
    subtree_count: usize,
}

impl LineNode {
    fn new(span: LineSpan, parent: Option<LineId>) -> Self {
        Self {
            span,
            color: Color::Red,
            parent,
            left: None,
            right: None,
            subtree_len: span.raw_len,
            subtree_bytes: span.byte_len,
            subtree_count: 1,
        }
    }
}

/// Resolved position and size of one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInfo {
    pub id: LineId,
    pub row: usize,
    /// UTF-16 offset of the first code unit
    pub location: usize,
    /// UTF-8 offset of the first byte
    pub byte_location: usize,
    pub raw_len: usize,
    pub terminator: u8,
    pub byte_len: usize,
}

impl LineInfo {
    /// Length without the terminator
    pub fn len(&self) -> usize {
        self.raw_len - self.terminator as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// UTF-16 offset one past the terminator
    pub fn end(&self) -> usize {
        self.location + self.raw_len
    }

    pub fn byte_end(&self) -> usize {
        self.byte_location + self.byte_len
    }
}

#[derive(Debug, Clone, Copy)]
enum Metric {
    Utf16,
    Bytes,
}

impl Metric {
    fn own(self, node: &LineNode) -> usize {
        match self {
            Metric::Utf16 => node.span.raw_len,
            Metric::Bytes => node.span.byte_len,
        }
    }

    fn subtree(self, node: &LineNode) -> usize {
        match self {
            Metric::Utf16 => node.subtree_len,
            Metric::Bytes => node.subtree_bytes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LineTree {
    nodes: SlotMap<LineId, LineNode>,
    root: LineId,
}

impl Default for LineTree {
    fn default() -> Self {
        Self::new()
    }
}

impl LineTree {
    /// A tree holding a single empty line
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(LineNode {
            color: Color::Black,
            ..LineNode::new(LineSpan::default(), None)
        });
        Self { nodes, root }
    }

    /// Build the index for `text`
    pub fn from_text(text: &str) -> Self {
        let mut spans = scan_lines(text.chars()).into_iter();
        let mut tree = Self::new();
        let mut last = tree.root;
        if let Some(first) = spans.next() {
            tree.set_line(last, first);
        }
        for span in spans {
            last = tree.insert_line_after(last, span);
        }
        tree
    }

    pub fn total_len(&self) -> usize {
        self.nodes[self.root].subtree_len
    }

    pub fn total_bytes(&self) -> usize {
        self.nodes[self.root].subtree_bytes
    }

    pub fn line_count(&self) -> usize {
        self.nodes[self.root].subtree_count
    }

    pub fn contains(&self, id: LineId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Line whose range holds `offset` (UTF-16).
    ///
    /// `offset == total_len()` is valid and yields the last line.
    ///
    /// # Panics
    ///
    /// If `offset > total_len()`.
    pub fn line_containing(&self, offset: usize) -> LineInfo {
        self.info(self.find_by(offset, Metric::Utf16))
    }

    /// Line whose range holds the UTF-8 offset `byte`.
    ///
    /// # Panics
    ///
    /// If `byte > total_bytes()`.
    pub fn line_containing_byte(&self, byte: usize) -> LineInfo {
        self.info(self.find_by(byte, Metric::Bytes))
    }

    /// # Panics
    ///
    /// If `row >= line_count()`.
    pub fn line_at(&self, row: usize) -> LineInfo {
        assert!(
            row < self.line_count(),
            "row {} out of bounds (line count {})",
            row,
            self.line_count()
        );

        let mut id = self.root;
        let mut remaining = row;
        loop {
            let node = &self.nodes[id];
            let left_count = node.left.map_or(0, |l| self.nodes[l].subtree_count);
            if remaining < left_count {
                id = node.left.unwrap_or(id);
            } else if remaining == left_count {
                return self.info(id);
            } else {
                remaining -= left_count + 1;
                let Some(right) = node.right else {
                    unreachable!("line count aggregate out of sync at row {}", row);
                };
                id = right;
            }
        }
    }

    pub fn first_line(&self) -> LineId {
        self.leftmost(self.root)
    }

    pub fn last_line(&self) -> LineId {
        self.rightmost(self.root)
    }

    /// Position and size of `id`. O(log n).
    ///
    /// # Panics
    ///
    /// If `id` was removed.
    pub fn info(&self, id: LineId) -> LineInfo {
        let node = &self.nodes[id];
        let (location, byte_location, row) = self.prefix(id);
        LineInfo {
            id,
            row,
            location,
            byte_location,
            raw_len: node.span.raw_len,
            terminator: node.span.terminator,
            byte_len: node.span.byte_len,
        }
    }

    pub fn span(&self, id: LineId) -> LineSpan {
        self.nodes[id].span
    }

    pub fn location(&self, id: LineId) -> usize {
        self.prefix(id).0
    }

    pub fn byte_location(&self, id: LineId) -> usize {
        self.prefix(id).1
    }

    pub fn row(&self, id: LineId) -> usize {
        self.prefix(id).2
    }

    pub fn next_line(&self, id: LineId) -> Option<LineId> {
        if let Some(right) = self.nodes[id].right {
            return Some(self.leftmost(right));
        }
        let mut child = id;
        let mut parent = self.nodes[id].parent;
        while let Some(p) = parent {
            if self.nodes[p].left == Some(child) {
                return Some(p);
            }
            child = p;
            parent = self.nodes[p].parent;
        }
        None
    }

    pub fn prev_line(&self, id: LineId) -> Option<LineId> {
        if let Some(left) = self.nodes[id].left {
            return Some(self.rightmost(left));
        }
        let mut child = id;
        let mut parent = self.nodes[id].parent;
        while let Some(p) = parent {
            if self.nodes[p].right == Some(child) {
                return Some(p);
            }
            child = p;
            parent = self.nodes[p].parent;
        }
        None
    }

    /// Lines in document order
    pub fn iter(&self) -> Lines<'_> {
        Lines {
            tree: self,
            next: Some(self.first_line()),
            location: 0,
            byte_location: 0,
            row: 0,
        }
    }

    /// Replace the measurements of an existing line
    pub fn set_line(&mut self, id: LineId, span: LineSpan) {
        assert!(
            span.terminator as usize <= span.raw_len && span.terminator <= 2,
            "invalid terminator width {} for line of length {}",
            span.terminator,
            span.raw_len
        );
        self.nodes[id].span = span;
        self.update_to_root(id);
    }

    /// Insert a new line directly after `after`
    pub fn insert_line_after(&mut self, after: LineId, span: LineSpan) -> LineId {
        let id = match self.nodes[after].right {
            None => {
                let id = self.nodes.insert(LineNode::new(span, Some(after)));
                self.nodes[after].right = Some(id);
                id
            }
            Some(right) => {
                let parent = self.leftmost(right);
                let id = self.nodes.insert(LineNode::new(span, Some(parent)));
                self.nodes[parent].left = Some(id);
                id
            }
        };
        self.attach(id);
        id
    }

    /// Insert a new line directly before `before`
    pub fn insert_line_before(&mut self, before: LineId, span: LineSpan) -> LineId {
        let id = match self.nodes[before].left {
            None => {
                let id = self.nodes.insert(LineNode::new(span, Some(before)));
                self.nodes[before].left = Some(id);
                id
            }
            Some(left) => {
                let parent = self.rightmost(left);
                let id = self.nodes.insert(LineNode::new(span, Some(parent)));
                self.nodes[parent].right = Some(id);
                id
            }
        };
        self.attach(id);
        id
    }

    /// Remove a line. Its [`LineId`] becomes invalid.
    ///
    /// # Panics
    ///
    /// If `id` is the only line in the tree.
    pub fn remove_line(&mut self, id: LineId) {
        assert!(self.line_count() > 1, "cannot remove the only line");

        let (left, right, parent) = {
            let n = &self.nodes[id];
            (n.left, n.right, n.parent)
        };
        let mut removed_color = self.nodes[id].color;
        let child;
        let child_parent;

        match (left, right) {
            (None, _) => {
                child = right;
                child_parent = parent;
                self.transplant(id, right);
            }
            (Some(_), None) => {
                child = left;
                child_parent = parent;
                self.transplant(id, left);
            }
            (Some(left), Some(right)) => {
                let successor = self.leftmost(right);
                removed_color = self.nodes[successor].color;
                child = self.nodes[successor].right;
                if self.nodes[successor].parent == Some(id) {
                    child_parent = Some(successor);
                } else {
                    child_parent = self.nodes[successor].parent;
                    self.transplant(successor, child);
                    self.nodes[successor].right = Some(right);
                    self.nodes[right].parent = Some(successor);
                }
                self.transplant(id, Some(successor));
                self.nodes[successor].left = Some(left);
                self.nodes[left].parent = Some(successor);
                self.nodes[successor].color = self.nodes[id].color;
            }
        }

        self.nodes.remove(id);
        if let Some(p) = child_parent {
            self.update_to_root(p);
        }
        if removed_color == Color::Black {
            self.fix_after_remove(child, child_parent);
        }
    }

    /// Verify aggregates, links and red-black balance.
    ///
    /// Intended for tests; walks the whole tree.
    pub fn check_invariants(&self) -> Result<(), String> {
        let root = &self.nodes[self.root];
        if root.parent.is_some() {
            return Err("root has a parent".into());
        }
        if root.color != Color::Black {
            return Err("root is red".into());
        }
        self.check_subtree(self.root)?;

        let last = self.last_line();
        for line in self.iter() {
            if line.id == last {
                if line.terminator != 0 {
                    return Err(format!("last line {} has a terminator", line.row));
                }
            } else if line.terminator == 0 {
                return Err(format!("line {} has no terminator", line.row));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn find_by(&self, value: usize, metric: Metric) -> LineId {
        let total = metric.subtree(&self.nodes[self.root]);
        assert!(
            value <= total,
            "offset {} out of bounds (length {})",
            value,
            total
        );
        if value == total {
            return self.last_line();
        }

        let mut id = self.root;
        let mut remaining = value;
        loop {
            let node = &self.nodes[id];
            let left = node.left.map_or(0, |l| metric.subtree(&self.nodes[l]));
            if remaining < left {
                id = node.left.unwrap_or(id);
                continue;
            }
            remaining -= left;
            let own = metric.own(node);
            if remaining < own {
                return id;
            }
            remaining -= own;
            let Some(right) = node.right else {
                unreachable!("length aggregate out of sync at offset {}", value);
            };
            id = right;
        }
    }

    /// (utf16 offset, byte offset, row) of the start of `id`
    fn prefix(&self, id: LineId) -> (usize, usize, usize) {
        let node = &self.nodes[id];
        let (mut len, mut bytes, mut count) = node.left.map_or((0, 0, 0), |l| {
            let l = &self.nodes[l];
            (l.subtree_len, l.subtree_bytes, l.subtree_count)
        });

        let mut child = id;
        let mut parent = node.parent;
        while let Some(p) = parent {
            let pn = &self.nodes[p];
            if pn.right == Some(child) {
                if let Some(l) = pn.left {
                    let l = &self.nodes[l];
                    len += l.subtree_len;
                    bytes += l.subtree_bytes;
                    count += l.subtree_count;
                }
                len += pn.span.raw_len;
                bytes += pn.span.byte_len;
                count += 1;
            }
            child = p;
            parent = pn.parent;
        }
        (len, bytes, count)
    }

    fn leftmost(&self, mut id: LineId) -> LineId {
        while let Some(left) = self.nodes[id].left {
            id = left;
        }
        id
    }

    fn rightmost(&self, mut id: LineId) -> LineId {
        while let Some(right) = self.nodes[id].right {
            id = right;
        }
        id
    }

    fn color_of(&self, id: Option<LineId>) -> Color {
        id.map_or(Color::Black, |id| self.nodes[id].color)
    }

    fn set_color(&mut self, id: Option<LineId>, color: Color) {
        if let Some(id) = id {
            self.nodes[id].color = color;
        }
    }

    fn update_aggregates(&mut self, id: LineId) {
        let node = &self.nodes[id];
        let mut len = node.span.raw_len;
        let mut bytes = node.span.byte_len;
        let mut count = 1;
        for child in [node.left, node.right].into_iter().flatten() {
            let c = &self.nodes[child];
            len += c.subtree_len;
            bytes += c.subtree_bytes;
            count += c.subtree_count;
        }
        let node = &mut self.nodes[id];
        node.subtree_len = len;
        node.subtree_bytes = bytes;
        node.subtree_count = count;
    }

    /// Recompute every ancestor. Rebalancing may have reshaped the path,
    /// so there is no early exit.
    fn update_to_root(&mut self, id: LineId) {
        let mut current = Some(id);
        while let Some(id) = current {
            self.update_aggregates(id);
            current = self.nodes[id].parent;
        }
    }

    fn attach(&mut self, id: LineId) {
        if let Some(parent) = self.nodes[id].parent {
            self.update_to_root(parent);
        }
        self.fix_after_insert(id);
    }

    fn replace_child(&mut self, parent: Option<LineId>, old: LineId, new: Option<LineId>) {
        match parent {
            None => {
                if let Some(new) = new {
                    self.root = new;
                }
            }
            Some(p) => {
                if self.nodes[p].left == Some(old) {
                    self.nodes[p].left = new;
                } else {
                    self.nodes[p].right = new;
                }
            }
        }
    }

    fn transplant(&mut self, old: LineId, new: Option<LineId>) {
        let parent = self.nodes[old].parent;
        self.replace_child(parent, old, new);
        if let Some(new) = new {
            self.nodes[new].parent = parent;
        }
    }

    fn rotate_left(&mut self, x: LineId) {
        let Some(y) = self.nodes[x].right else {
            return;
        };
        let y_left = self.nodes[y].left;
        self.nodes[x].right = y_left;
        if let Some(yl) = y_left {
            self.nodes[yl].parent = Some(x);
        }
        let parent = self.nodes[x].parent;
        self.nodes[y].parent = parent;
        self.replace_child(parent, x, Some(y));
        self.nodes[y].left = Some(x);
        self.nodes[x].parent = Some(y);
        self.update_aggregates(x);
        self.update_aggregates(y);
    }

    fn rotate_right(&mut self, x: LineId) {
        let Some(y) = self.nodes[x].left else {
            return;
        };
        let y_right = self.nodes[y].right;
        self.nodes[x].left = y_right;
        if let Some(yr) = y_right {
            self.nodes[yr].parent = Some(x);
        }
        let parent = self.nodes[x].parent;
        self.nodes[y].parent = parent;
        self.replace_child(parent, x, Some(y));
        self.nodes[y].right = Some(x);
        self.nodes[x].parent = Some(y);
        self.update_aggregates(x);
        self.update_aggregates(y);
    }

    fn fix_after_insert(&mut self, mut node: LineId) {
        while let Some(parent) = self.nodes[node].parent {
            if self.nodes[parent].color == Color::Black {
                break;
            }
            // A red parent is never the root, so the grandparent exists.
            let Some(grand) = self.nodes[parent].parent else {
                break;
            };

            if self.nodes[grand].left == Some(parent) {
                let uncle = self.nodes[grand].right;
                if self.color_of(uncle) == Color::Red {
                    self.set_color(Some(parent), Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(Some(grand), Color::Red);
                    node = grand;
                    continue;
                }
                let mut parent = parent;
                if self.nodes[parent].right == Some(node) {
                    self.rotate_left(parent);
                    node = parent;
                    parent = self.nodes[node].parent.unwrap_or(grand);
                }
                self.set_color(Some(parent), Color::Black);
                self.set_color(Some(grand), Color::Red);
                self.rotate_right(grand);
            } else {
                let uncle = self.nodes[grand].left;
                if self.color_of(uncle) == Color::Red {
                    self.set_color(Some(parent), Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(Some(grand), Color::Red);
                    node = grand;
                    continue;
                }
                let mut parent = parent;
                if self.nodes[parent].left == Some(node) {
                    self.rotate_right(parent);
                    node = parent;
                    parent = self.nodes[node].parent.unwrap_or(grand);
                }
                self.set_color(Some(parent), Color::Black);
                self.set_color(Some(grand), Color::Red);
                self.rotate_left(grand);
            }
        }
        let root = self.root;
        self.nodes[root].color = Color::Black;
    }

    fn fix_after_remove(&mut self, mut node: Option<LineId>, mut parent: Option<LineId>) {
        while node != Some(self.root) && self.color_of(node) == Color::Black {
            let Some(p) = parent else {
                break;
            };

            if self.nodes[p].left == node {
                let Some(mut sibling) = self.nodes[p].right else {
                    break;
                };
                if self.nodes[sibling].color == Color::Red {
                    self.nodes[sibling].color = Color::Black;
                    self.nodes[p].color = Color::Red;
                    self.rotate_left(p);
                    let Some(s) = self.nodes[p].right else {
                        break;
                    };
                    sibling = s;
                }
                let (near, far) = (self.nodes[sibling].left, self.nodes[sibling].right);
                if self.color_of(near) == Color::Black && self.color_of(far) == Color::Black {
                    self.nodes[sibling].color = Color::Red;
                    node = Some(p);
                    parent = self.nodes[p].parent;
                } else {
                    if self.color_of(far) == Color::Black {
                        self.set_color(near, Color::Black);
                        self.nodes[sibling].color = Color::Red;
                        self.rotate_right(sibling);
                        let Some(s) = self.nodes[p].right else {
                            break;
                        };
                        sibling = s;
                    }
                    self.nodes[sibling].color = self.nodes[p].color;
                    self.nodes[p].color = Color::Black;
                    let far = self.nodes[sibling].right;
                    self.set_color(far, Color::Black);
                    self.rotate_left(p);
                    node = Some(self.root);
                    parent = None;
                }
            } else {
                let Some(mut sibling) = self.nodes[p].left else {
                    break;
                };
                if self.nodes[sibling].color == Color::Red {
                    self.nodes[sibling].color = Color::Black;
                    self.nodes[p].color = Color::Red;
                    self.rotate_right(p);
                    let Some(s) = self.nodes[p].left else {
                        break;
                    };
                    sibling = s;
                }
                let (near, far) = (self.nodes[sibling].right, self.nodes[sibling].left);
                if self.color_of(near) == Color::Black && self.color_of(far) == Color::Black {
                    self.nodes[sibling].color = Color::Red;
                    node = Some(p);
                    parent = self.nodes[p].parent;
                } else {
                    if self.color_of(far) == Color::Black {
                        self.set_color(near, Color::Black);
                        self.nodes[sibling].color = Color::Red;
                        self.rotate_left(sibling);
                        let Some(s) = self.nodes[p].left else {
                            break;
                        };
                        sibling = s;
                    }
                    self.nodes[sibling].color = self.nodes[p].color;
                    self.nodes[p].color = Color::Black;
                    let far = self.nodes[sibling].left;
                    self.set_color(far, Color::Black);
                    self.rotate_right(p);
                    node = Some(self.root);
                    parent = None;
                }
            }
        }
        self.set_color(node, Color::Black);
    }

    /// Returns the black height of the subtree
    fn check_subtree(&self, id: LineId) -> Result<usize, String> {
        let node = &self.nodes[id];
        let mut len = node.span.raw_len;
        let mut bytes = node.span.byte_len;
        let mut count = 1;
        let mut heights = [1usize; 2];

        for (i, child) in [node.left, node.right].into_iter().enumerate() {
            let Some(child) = child else {
                continue;
            };
            let c = &self.nodes[child];
            if c.parent != Some(id) {
                return Err("broken parent link".into());
            }
            if node.color == Color::Red && c.color == Color::Red {
                return Err("red node with red child".into());
            }
            heights[i] = self.check_subtree(child)?;
            len += c.subtree_len;
            bytes += c.subtree_bytes;
            count += c.subtree_count;
        }

        if heights[0] != heights[1] {
            return Err(format!(
                "black height mismatch: {} vs {}",
                heights[0], heights[1]
            ));
        }
        if (len, bytes, count) != (node.subtree_len, node.subtree_bytes, node.subtree_count) {
            return Err(format!(
                "stale aggregates: stored ({}, {}, {}), actual ({}, {}, {})",
                node.subtree_len, node.subtree_bytes, node.subtree_count, len, bytes, count
            ));
        }
        if node.span.terminator > 2 || node.span.terminator as usize > node.span.raw_len {
            return Err(format!("invalid terminator {}", node.span.terminator));
        }

        Ok(heights[0] + usize::from(node.color == Color::Black))
    }
}

/// In-order iterator returned by [`LineTree::iter`]
pub struct Lines<'a> {
    tree: &'a LineTree,
    next: Option<LineId>,
    location: usize,
    byte_location: usize,
    row: usize,
}

impl Iterator for Lines<'_> {
    type Item = LineInfo;

    fn next(&mut self) -> Option<LineInfo> {
        let id = self.next?;
        let span = self.tree.nodes[id].span;
        let info = LineInfo {
            id,
            row: self.row,
            location: self.location,
            byte_location: self.byte_location,
            raw_len: span.raw_len,
            terminator: span.terminator,
            byte_len: span.byte_len,
        };
        self.row += 1;
        self.location += span.raw_len;
        self.byte_location += span.byte_len;
        self.next = self.tree.next_line(id);
        Some(info)
    }
}
