//! Byte-offset splicing.
//!
//! These are the pure transforms behind every pattern-anchored edit. They
//! never inspect the content beyond slicing it: bytes outside the spliced
//! boundary are carried over verbatim.

use std::fmt;

/// Half-open byte range `[start, end)` into a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start {start} after end {end}");
        Self { start, end }
    }

    /// Zero-width span at `offset`.
    pub fn empty(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True if the span lies inside `content` on character boundaries.
    pub fn fits(&self, content: &str) -> bool {
        self.start <= self.end
            && self.end <= content.len()
            && content.is_char_boundary(self.start)
            && content.is_char_boundary(self.end)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// `content[..span.end] + payload + content[span.end..]`
///
/// # Panics
///
/// Panics if `span` does not fit `content` (see [`Span::fits`]). Spans from
/// [`crate::locator::find_anchor`] on the same content always fit.
pub fn insert_after(content: &str, span: Span, payload: &str) -> String {
    replace_span(content, Span::empty(span.end), payload)
}

/// `content[..span.start] + payload + content[span.start..]`
pub fn insert_before(content: &str, span: Span, payload: &str) -> String {
    replace_span(content, Span::empty(span.start), payload)
}

/// `content[..span.start] + payload + content[span.end..]`
pub fn replace_span(content: &str, span: Span, payload: &str) -> String {
    let mut out = String::with_capacity(content.len() - span.len() + payload.len());
    out.push_str(&content[..span.start]);
    out.push_str(payload);
    out.push_str(&content[span.end..]);
    out
}
