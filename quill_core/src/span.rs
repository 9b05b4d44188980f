//! Byte-offset source spans.

use std::fmt;

/// A half-open byte range into the original source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Start offset (inclusive).
    pub start: u32,
    /// End offset (exclusive).
    pub end: u32,
}

impl Span {
    /// Create a new span.
    #[inline]
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// A zero-length span at a single offset.
    #[inline]
    #[must_use]
    pub const fn at(offset: u32) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    /// The smallest span covering both `self` and `other`.
    #[inline]
    #[must_use]
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Length in bytes.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Whether the span covers no bytes.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Convert a byte offset into a zero-based `(line, column)` pair.
#[must_use]
pub fn line_column(source: &str, offset: u32) -> (usize, usize) {
    let mut remaining = offset as usize;
    for (line, text) in source.split('\n').enumerate() {
        if remaining <= text.len() {
            return (line, remaining);
        }
        remaining -= text.len() + 1;
    }
    let last = source.split('\n').count().saturating_sub(1);
    (last, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge() {
        let a = Span::new(2, 5);
        let b = Span::new(4, 9);
        assert_eq!(a.merge(b), Span::new(2, 9));
        assert_eq!(b.merge(a), Span::new(2, 9));
    }

    #[test]
    fn test_span_len_empty() {
        assert_eq!(Span::new(3, 7).len(), 4);
        assert!(Span::at(3).is_empty());
        assert!(!Span::new(3, 7).is_empty());
    }

    #[test]
    fn test_line_column() {
        let src = "ab\ncdef\ng";
        assert_eq!(line_column(src, 0), (0, 0));
        assert_eq!(line_column(src, 2), (0, 2));
        assert_eq!(line_column(src, 3), (1, 0));
        assert_eq!(line_column(src, 6), (1, 3));
        assert_eq!(line_column(src, 8), (2, 0));
    }
}
