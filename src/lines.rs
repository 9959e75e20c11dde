//! Line-sequence edits.
//!
//! Files are split into lines with their terminators kept, so joining the
//! sequence back together reproduces the original bytes exactly (CRLF and a
//! missing final newline included). Line numbers are 0-based and refer to
//! this enumeration.

use std::ops::Range;
use thiserror::Error;

/// Out-of-bounds or inverted line indices. Always reported before slicing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("line range start {start} is after end {end}")]
    StartAfterEnd { start: usize, end: usize },

    #[error("line range [{start}, {end}) exceeds {len} lines")]
    OutOfBounds { start: usize, end: usize, len: usize },

    #[error("line index {index} exceeds {len} lines")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// A run of lines addressed by 0-based numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
    /// Whether `end` itself belongs to the range.
    pub end_inclusive: bool,
}

impl LineRange {
    pub fn inclusive(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            end_inclusive: true,
        }
    }

    pub fn exclusive(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            end_inclusive: false,
        }
    }

    /// Resolve to a half-open index range valid for `len` lines.
    ///
    /// An inclusive range needs `start <= end < len`. An exclusive range
    /// needs `start <= end <= len` and may be empty.
    pub fn bounds(&self, len: usize) -> Result<Range<usize>, RangeError> {
        if self.start > self.end {
            return Err(RangeError::StartAfterEnd {
                start: self.start,
                end: self.end,
            });
        }
        let stop = if self.end_inclusive {
            self.end + 1
        } else {
            self.end
        };
        if stop > len {
            return Err(RangeError::OutOfBounds {
                start: self.start,
                end: stop,
                len,
            });
        }
        Ok(self.start..stop)
    }
}

/// Split `content` into lines, each keeping its `\n` (or `\r\n`).
pub fn split_lines(content: &str) -> Vec<&str> {
    content.split_inclusive('\n').collect()
}

/// `lines[..start] + replacement + lines[end_inclusive + 1..]`
///
/// Requires `start <= end_inclusive < lines.len()`.
pub fn replace_range<T: Clone>(
    lines: &[T],
    start: usize,
    end_inclusive: usize,
    replacement: &[T],
) -> Result<Vec<T>, RangeError> {
    replace_lines(lines, LineRange::inclusive(start, end_inclusive), replacement)
}

/// Replace the lines covered by `range` with `replacement`.
pub fn replace_lines<T: Clone>(
    lines: &[T],
    range: LineRange,
    replacement: &[T],
) -> Result<Vec<T>, RangeError> {
    let bounds = range.bounds(lines.len())?;
    let mut out = Vec::with_capacity(lines.len() - bounds.len() + replacement.len());
    out.extend_from_slice(&lines[..bounds.start]);
    out.extend_from_slice(replacement);
    out.extend_from_slice(&lines[bounds.end..]);
    Ok(out)
}

/// `lines[..index] + [block] + lines[index..]`
///
/// `index == lines.len()` appends. Indices are taken as given; callers that
/// chain edits must account for lines added by earlier ones.
pub fn insert_at_line_index<T: Clone>(
    lines: &[T],
    index: usize,
    block: T,
) -> Result<Vec<T>, RangeError> {
    if index > lines.len() {
        return Err(RangeError::IndexOutOfBounds {
            index,
            len: lines.len(),
        });
    }
    let mut out = Vec::with_capacity(lines.len() + 1);
    out.extend_from_slice(&lines[..index]);
    out.push(block);
    out.extend_from_slice(&lines[index..]);
    Ok(out)
}
