//! Source-mapped diagnostics.
//!
//! Structural errors (lex/parse/compile) carry a span and are rendered
//! with the offending line and a caret underline. Runtime errors carry no
//! span of their own; they are rendered with the trace of open call
//! sites plus the offset of the last executed debug record.

use quill_core::{QuillError, Span};

/// Pre-computed line table for offset-to-position lookup.
#[derive(Debug)]
pub struct SourceMap {
    line_starts: Vec<usize>,
    source: String,
    filename: String,
}

impl SourceMap {
    #[must_use]
    pub fn new(source: &str, filename: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            line_starts,
            source: source.to_string(),
            filename: filename.to_string(),
        }
    }

    /// Resolve a byte offset to a 1-indexed line and column.
    #[must_use]
    pub fn position(&self, offset: u32) -> (usize, usize) {
        let offset = offset as usize;
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert) => insert.saturating_sub(1),
        };
        (line + 1, offset - self.line_starts[line] + 1)
    }

    /// The text of a 1-indexed line, without its newline.
    #[must_use]
    pub fn line_text(&self, line: usize) -> Option<&str> {
        if line == 0 || line > self.line_starts.len() {
            return None;
        }
        let start = self.line_starts[line - 1];
        let end = self
            .line_starts
            .get(line)
            .copied()
            .unwrap_or(self.source.len());
        Some(self.source[start..end].trim_end_matches(['\n', '\r']))
    }
}

/// Render a structural error with its source line and a caret underline.
#[must_use]
pub fn render_structural(map: &SourceMap, span: Span, error: &QuillError) -> String {
    let (line, column) = map.position(span.start);
    let mut out = format!("  File \"{}\", line {line}, column {column}\n", map.filename);
    if let Some(text) = map.line_text(line) {
        out.push_str(&format!("    {text}\n"));
        let width = (span.len() as usize).clamp(1, text.len().saturating_sub(column - 1).max(1));
        out.push_str(&format!("    {}{}\n", " ".repeat(column - 1), "^".repeat(width)));
    }
    out.push_str(&error.to_string());
    out
}

/// Render a runtime failure: the open call sites outermost-first, the
/// faulting location, then the error itself.
#[must_use]
pub fn render_runtime(
    map: &SourceMap,
    call_sites: &[u32],
    fault_offset: u32,
    error: &QuillError,
) -> String {
    let mut out = String::from("Traceback:\n");
    for &site in call_sites {
        let (line, column) = map.position(site);
        out.push_str(&format!(
            "  File \"{}\", line {line}, column {column}\n",
            map.filename
        ));
    }
    let (line, column) = map.position(fault_offset);
    out.push_str(&format!(
        "  File \"{}\", line {line}, column {column}\n",
        map.filename
    ));
    if let Some(text) = map.line_text(line) {
        out.push_str(&format!("    {text}\n"));
    }
    out.push_str(&error.to_string());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_lookup() {
        let map = SourceMap::new("ab\ncdef\ng", "t.ql");
        assert_eq!(map.position(0), (1, 1));
        assert_eq!(map.position(2), (1, 3));
        assert_eq!(map.position(3), (2, 1));
        assert_eq!(map.position(8), (3, 1));
    }

    #[test]
    fn test_line_text() {
        let map = SourceMap::new("ab\ncdef\n", "t.ql");
        assert_eq!(map.line_text(1), Some("ab"));
        assert_eq!(map.line_text(2), Some("cdef"));
        assert_eq!(map.line_text(9), None);
    }

    #[test]
    fn test_structural_render_has_caret() {
        let map = SourceMap::new("x := 1 +\n", "t.ql");
        let err = QuillError::syntax("unparseable expression", Span::new(7, 8));
        let rendered = render_structural(&map, Span::new(7, 8), &err);
        assert!(rendered.contains("line 1, column 8"));
        assert!(rendered.contains('^'));
        assert!(rendered.contains("SyntaxError"));
    }

    #[test]
    fn test_runtime_render_lists_call_sites() {
        let map = SourceMap::new("f()\ng()\nboom\n", "t.ql");
        let err = QuillError::name("boom");
        let rendered = render_runtime(&map, &[0, 4], 8, &err);
        assert!(rendered.starts_with("Traceback:"));
        assert!(rendered.contains("line 1"));
        assert!(rendered.contains("line 2"));
        assert!(rendered.contains("line 3"));
        assert!(rendered.contains("NameError"));
    }
}
