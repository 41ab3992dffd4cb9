//! The editable buffer
//!
//! Owns the text, the line tree and (for buffers with a language) the
//! layer tree. All mutation goes through [`Buffer::replace`] on the owning
//! thread. Reparsing happens on a [`ParseWorker`] unless background parsing
//! is turned off, and results are installed by [`Buffer::poll_syntax`].

pub mod edit;

use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ropey::Rope;

use crate::config::SyntaxConfig;
use crate::error::Result;
use crate::line_tree::LineTree;
use crate::syntax::{
    self, CancelFlag, Captures, HighlightToken, IndentStrategy, LanguageConfig,
    LanguageRegistry, LayerTree, LineBreakIndent, ParseResult, ParseWorker, ParserPool,
    ScopeTable, SyntaxHandle, SyntaxNode, SyntaxSnapshot,
};

pub use edit::{apply_replace, ByteEdit, EditDescriptor, TextPosition};

/// Where a line sits in the text, in UTF-16 code units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineGeometry {
    pub offset: usize,
    pub raw_len: usize,
    pub terminator: u8,
}

/// Reported when a reparse is installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxUpdate {
    pub revision: u64,
    /// Line tree rows to repaint, sorted and merged
    pub changed_rows: Vec<Range<usize>>,
}

struct SyntaxState {
    /// Layers for the current text. Between an edit and the installed
    /// reparse they are edited but not reparsed.
    layers: Arc<LayerTree>,
    scopes: Arc<ScopeTable>,
    handle: SyntaxHandle,
    worker: Option<ParseWorker>,
    /// Parsers for the synchronous path
    pool: ParserPool,
    /// Byte ranges edited since the last installed reparse
    edited: Vec<Range<usize>>,
    /// Update produced by a synchronous reparse, not yet polled
    pending: Option<SyntaxUpdate>,
}

pub struct Buffer {
    text: Rope,
    lines: LineTree,
    revision: u64,
    config: SyntaxConfig,
    syntax: Option<SyntaxState>,
}

impl Buffer {
    /// A plain-text buffer
    pub fn new(text: &str) -> Self {
        Self {
            text: Rope::from_str(text),
            lines: LineTree::from_text(text),
            revision: 0,
            config: SyntaxConfig::default(),
            syntax: None,
        }
    }

    /// A buffer parsed as `language`. The initial parse runs before this
    /// returns.
    pub fn with_language(
        text: &str,
        language: Arc<LanguageConfig>,
        registry: Arc<LanguageRegistry>,
        config: SyntaxConfig,
    ) -> Result<Self> {
        let mut buffer = Self::new(text);
        let mut pool = ParserPool::new();
        let layers = LayerTree::new(
            language,
            registry,
            config.max_injection_depth,
            buffer.text.len_bytes(),
        );
        let layers = match layers.reparse(&buffer.text, &mut pool, &CancelFlag::new()) {
            Some(outcome) => outcome.layers,
            None => layers,
        };
        let layers = Arc::new(layers);
        let scopes = Arc::new(config.scope_table());

        let worker = if config.background_parsing {
            Some(ParseWorker::spawn()?)
        } else {
            None
        };
        let handle = SyntaxHandle::new(SyntaxSnapshot {
            revision: 0,
            text: buffer.text.clone(),
            layers: Arc::clone(&layers),
            scopes: Arc::clone(&scopes),
        });

        tracing::debug!(
            "Opened {} buffer: {} lines, {} layers",
            layers.root().language_id(),
            buffer.lines.line_count(),
            layers.layer_count()
        );

        buffer.config = config;
        buffer.syntax = Some(SyntaxState {
            layers,
            scopes,
            handle,
            worker,
            pool,
            edited: Vec::new(),
            pending: None,
        });
        Ok(buffer)
    }

    /// Replace the UTF-16 range `range` with `insert`.
    ///
    /// # Panics
    ///
    /// If the range is inverted, extends past the end of the text, or has an
    /// endpoint inside a surrogate pair.
    pub fn replace(&mut self, range: Range<usize>, insert: &str) -> EditDescriptor {
        let edit = apply_replace(&mut self.text, &mut self.lines, range, insert);
        let byte_edit = edit.byte_edit;
        if byte_edit.is_noop() {
            return edit;
        }
        self.revision += 1;

        let Some(syntax) = &mut self.syntax else {
            return edit;
        };

        for range in &mut syntax.edited {
            *range = byte_edit.map_start(range.start)..byte_edit.map_end(range.end);
        }
        syntax.edited.push(byte_edit.start_byte..byte_edit.new_end_byte);
        Arc::make_mut(&mut syntax.layers).edit(&byte_edit);

        match &mut syntax.worker {
            Some(worker) => {
                worker.submit(self.revision, self.text.clone(), Arc::clone(&syntax.layers));
            }
            None => {
                if let Some(outcome) =
                    syntax
                        .layers
                        .reparse(&self.text, &mut syntax.pool, &CancelFlag::new())
                {
                    syntax.layers = Arc::new(outcome.layers);
                    let rows = changed_rows(
                        &self.lines,
                        &self.text,
                        outcome.changed_ranges.into_iter().chain(syntax.edited.drain(..)),
                    );
                    syntax.pending = Some(SyntaxUpdate {
                        revision: self.revision,
                        changed_rows: rows,
                    });
                }
            }
        }

        syntax.handle.store(SyntaxSnapshot {
            revision: self.revision,
            text: self.text.clone(),
            layers: Arc::clone(&syntax.layers),
            scopes: Arc::clone(&syntax.scopes),
        });
        edit
    }

    /// Install a finished reparse if it matches the current revision
    /// (non-blocking)
    pub fn poll_syntax(&mut self) -> Option<SyntaxUpdate> {
        let syntax = self.syntax.as_mut()?;
        match &syntax.worker {
            Some(worker) => {
                let result = worker.try_recv()?;
                self.install(result)
            }
            None => syntax.pending.take(),
        }
    }

    /// Block until the reparse for the current revision is installed, or
    /// `timeout` passes
    pub fn wait_for_syntax(&mut self, timeout: Duration) -> Option<SyntaxUpdate> {
        let deadline = Instant::now() + timeout;
        loop {
            let syntax = self.syntax.as_mut()?;
            let Some(worker) = &syntax.worker else {
                return syntax.pending.take();
            };
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let result = worker.recv_timeout(remaining)?;
            if let Some(update) = self.install(result) {
                return Some(update);
            }
        }
    }

    fn install(&mut self, result: ParseResult) -> Option<SyntaxUpdate> {
        let syntax = self.syntax.as_mut()?;
        if result.revision != self.revision {
            tracing::debug!(
                "Discarding parse result for revision {} (current {})",
                result.revision,
                self.revision
            );
            return None;
        }

        syntax.layers = Arc::new(result.outcome.layers);
        syntax.handle.store(SyntaxSnapshot {
            revision: self.revision,
            text: self.text.clone(),
            layers: Arc::clone(&syntax.layers),
            scopes: Arc::clone(&syntax.scopes),
        });

        let changed = result
            .outcome
            .changed_ranges
            .into_iter()
            .chain(syntax.edited.drain(..));
        let changed_rows = changed_rows(&self.lines, &self.text, changed);
        tracing::trace!(
            "Installed reparse for revision {} ({} row ranges changed)",
            self.revision,
            changed_rows.len()
        );
        Some(SyntaxUpdate {
            revision: self.revision,
            changed_rows,
        })
    }

    pub fn text(&self) -> &Rope {
        &self.text
    }

    pub fn lines(&self) -> &LineTree {
        &self.lines
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn config(&self) -> &SyntaxConfig {
        &self.config
    }

    pub fn line_count(&self) -> usize {
        self.lines.line_count()
    }

    /// Length in UTF-16 code units
    pub fn len_utf16(&self) -> usize {
        self.lines.total_len()
    }

    pub fn len_bytes(&self) -> usize {
        self.text.len_bytes()
    }

    /// # Panics
    ///
    /// If `row >= line_count()`.
    pub fn line_geometry(&self, row: usize) -> LineGeometry {
        let line = self.lines.line_at(row);
        LineGeometry {
            offset: line.location,
            raw_len: line.raw_len,
            terminator: line.terminator,
        }
    }

    /// Language id of the root layer
    pub fn language(&self) -> Option<&str> {
        self.syntax
            .as_ref()
            .map(|syntax| syntax.layers.root().language_id())
    }

    pub fn layers(&self) -> Option<&LayerTree> {
        self.syntax.as_ref().map(|syntax| &*syntax.layers)
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Option<Arc<SyntaxSnapshot>> {
        self.syntax.as_ref().map(|syntax| syntax.handle.load())
    }

    /// Handle for loading snapshots from other threads
    pub fn syntax_handle(&self) -> Option<SyntaxHandle> {
        self.syntax.as_ref().map(|syntax| syntax.handle.clone())
    }

    /// Captures over a byte range of the current text. Empty for plain
    /// text buffers.
    pub fn highlight_captures(&self, range: Range<usize>) -> Option<Captures<'_>> {
        let syntax = self.syntax.as_ref()?;
        Some(syntax::highlight_captures(
            &syntax.layers,
            &self.text,
            range,
            &syntax.scopes,
        ))
    }

    /// Highlight tokens over a byte range, relative to its start
    pub fn highlight_tokens(&self, range: Range<usize>) -> Vec<HighlightToken> {
        match &self.syntax {
            Some(syntax) => {
                syntax::highlight_tokens(&syntax.layers, &self.text, range, &syntax.scopes)
            }
            None => Vec::new(),
        }
    }

    pub fn syntax_node_at(&self, byte: usize) -> Option<SyntaxNode> {
        let syntax = self.syntax.as_ref()?;
        syntax::syntax_node_at(&syntax.layers, byte)
    }

    /// Indentation for a line break replacing the byte range
    /// `start_byte..end_byte`
    pub fn indent_for_line_break(&self, start_byte: usize, end_byte: usize) -> LineBreakIndent {
        match &self.syntax {
            Some(syntax) => syntax::indent_for_line_break(
                &syntax.layers,
                &self.text,
                &self.lines,
                start_byte,
                end_byte,
                self.config.tab_length,
            ),
            None => LineBreakIndent {
                indent_level: self.indent_level_of_line(
                    self.lines.line_containing_byte(start_byte).row,
                ),
                insert_extra_line_break: false,
            },
        }
    }

    pub fn indent_level_of_line(&self, row: usize) -> usize {
        syntax::indent_level_of_line(&self.text, &self.lines, row, self.config.tab_length)
    }

    pub fn detect_indent_strategy(&self) -> IndentStrategy {
        match &self.syntax {
            Some(syntax) => syntax::detect_indent_strategy(&syntax.layers, &self.text, &self.lines),
            None => IndentStrategy::Unknown,
        }
    }
}

/// Map changed byte ranges to sorted, merged line tree rows
fn changed_rows(
    lines: &LineTree,
    text: &Rope,
    ranges: impl IntoIterator<Item = Range<usize>>,
) -> Vec<Range<usize>> {
    let total = text.len_bytes();
    let mut rows: Vec<Range<usize>> = ranges
        .into_iter()
        .map(|range| {
            let start = range.start.min(total);
            let end = range.end.clamp(start, total);
            let first = lines.line_containing_byte(start).row;
            let last = lines.line_containing_byte(end.saturating_sub(1).max(start)).row;
            first..last + 1
        })
        .collect();
    rows.sort_by_key(|r| r.start);

    let mut merged: Vec<Range<usize>> = Vec::with_capacity(rows.len());
    for range in rows {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}
