//! Heritage-aware source spans.
//!
//! A [`Span`] never carries its own copy of source text: it's a
//! `{buffer_id, range}` pair into a [`SourceMap`] that every pass shares by
//! reference. Slicing a rule, an expression, or a sub-rule never allocates;
//! rendering "the offending snippet" in a diagnostic is a lookup through the
//! map, done lazily at error-report time.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// One parsed input file (or REPL buffer): an immutable text plus the name
/// used to report it.
#[derive(Debug, Clone)]
pub struct Buffer {
    pub name: String,
    pub text: Rc<str>,
}

/// Owns every buffer a compilation touches (the main file plus anything
/// pulled in by `import`). Buffers are append-only: a [`Span`]'s `buffer_id`
/// stays valid for the lifetime of the map.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    buffers: Vec<Buffer>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, text: impl Into<Rc<str>>) -> u32 {
        let id = self.buffers.len() as u32;
        self.buffers.push(Buffer {
            name: name.into(),
            text: text.into(),
        });
        id
    }

    pub fn buffer(&self, id: u32) -> &Buffer {
        &self.buffers[id as usize]
    }

    pub fn text(&self, span: Span) -> &str {
        &self.buffer(span.buffer_id).text[span.start as usize..span.stop as usize]
    }

    pub fn file_name(&self, span: Span) -> &str {
        &self.buffer(span.buffer_id).name
    }

    /// 0-based (line, column) for the start of `span`.
    pub fn line_col(&self, buffer_id: u32, offset: u32) -> (usize, usize) {
        let text = &self.buffer(buffer_id).text;
        let mut line = 0;
        let mut col = 0;
        for (i, c) in text.char_indices() {
            if i as u32 >= offset {
                break;
            }
            if c == '\n' {
                line += 1;
                col = 0;
            } else {
                col += 1;
            }
        }
        (line, col)
    }
}

/// `[start, stop)` range into buffer `buffer_id` of a [`SourceMap`].
///
/// Invariant: `0 <= start <= stop <= len(buffer)`. Construction outside this
/// module always goes through [`Span::new`], which enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub buffer_id: u32,
    pub start: u32,
    pub stop: u32,
}

impl Span {
    pub fn new(buffer_id: u32, start: u32, stop: u32) -> Self {
        assert!(start <= stop, "span with start > stop: {start} > {stop}");
        Span {
            buffer_id,
            start,
            stop,
        }
    }

    /// A zero-width span, used for synthesized nodes that have no source
    /// counterpart (e.g. the aggregator rule of a multi-body aggregation).
    pub fn synthetic(buffer_id: u32) -> Self {
        Span {
            buffer_id,
            start: 0,
            stop: 0,
        }
    }

    pub fn merge(self, other: Span) -> Span {
        debug_assert_eq!(self.buffer_id, other.buffer_id);
        Span {
            buffer_id: self.buffer_id,
            start: self.start.min(other.start),
            stop: self.stop.max(other.stop),
        }
    }

    pub fn len(self) -> u32 {
        self.stop - self.start
    }

    pub fn is_empty(self) -> bool {
        self.start == self.stop
    }
}
