//! Token grouping.
//!
//! Partitions a flat token stream into "units": either a single
//! non-bracket token, or a complete bracket-balanced run including its
//! delimiters. Matchers never see a split bracket. An unmatched closing
//! bracket ends the stream early instead of raising, because recursive
//! callers intentionally hand us partial windows; a *mismatched* closing
//! bracket kind is always fatal.

use crate::token::Token;
use quill_core::{QuillError, Span};

/// One gathered unit: a single token or a whole bracketed run.
pub type TokenGroup = Vec<Token>;

/// Closing counterpart of an opening bracket.
fn closing_for(open: &str) -> &'static str {
    match open {
        "(" => ")",
        "[" => "]",
        _ => "}",
    }
}

/// Length of the unit starting at `start`, or `None` when the stream is
/// exhausted or `start` sits on an unmatched closing bracket.
pub fn next_unit(tokens: &[Token], start: usize) -> Result<Option<usize>, QuillError> {
    let Some(first) = tokens.get(start) else {
        return Ok(None);
    };
    if first.is_close_bracket() {
        return Ok(None);
    }
    if !first.is_open_bracket() {
        return Ok(Some(1));
    }

    // Bracketed run: walk to the matching close, tracking nesting with an
    // explicit stack so a mismatched kind can be reported precisely.
    let mut expected: Vec<&'static str> = vec![closing_for(&first.text)];
    let mut pos = start + 1;
    while let Some(tok) = tokens.get(pos) {
        if tok.is_open_bracket() {
            expected.push(closing_for(&tok.text));
        } else if tok.is_close_bracket() {
            let want = expected.pop().unwrap_or(")");
            if tok.text != want {
                return Err(QuillError::syntax(
                    format!("mismatched bracket: expected '{want}', found '{}'", tok.text),
                    tok.span,
                ));
            }
            if expected.is_empty() {
                return Ok(Some(pos - start + 1));
            }
        }
        pos += 1;
    }
    Err(QuillError::syntax(
        format!("unclosed '{}'", first.text),
        first.span,
    ))
}

/// Gather `tokens` into a sequence of units.
pub fn gather(tokens: &[Token]) -> Result<Vec<TokenGroup>, QuillError> {
    let mut groups = Vec::new();
    let mut pos = 0;
    while let Some(len) = next_unit(tokens, pos)? {
        groups.push(tokens[pos..pos + len].to_vec());
        pos += len;
    }
    Ok(groups)
}

/// Span covering a unit.
#[must_use]
pub fn group_span(group: &[Token]) -> Span {
    match (group.first(), group.last()) {
        (Some(first), Some(last)) => first.span.merge(last.span),
        _ => Span::at(0),
    }
}

/// Span covering a window of units.
#[must_use]
pub fn window_span(groups: &[TokenGroup]) -> Span {
    match (groups.first(), groups.last()) {
        (Some(first), Some(last)) => group_span(first).merge(group_span(last)),
        _ => Span::at(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn units(source: &str) -> Vec<Vec<String>> {
        gather(&tokenize(source).unwrap())
            .unwrap()
            .into_iter()
            .map(|g| g.into_iter().map(|t| t.text).collect())
            .collect()
    }

    #[test]
    fn test_flat_stream() {
        assert_eq!(
            units("a + b"),
            vec![vec!["a".to_string()], vec!["+".into()], vec!["b".into()]]
        );
    }

    #[test]
    fn test_bracketed_unit() {
        let got = units("f(a, b) + 1");
        assert_eq!(got.len(), 4);
        assert_eq!(got[0], vec!["f".to_string()]);
        assert_eq!(got[1], vec!["(", "a", ",", "b", ")"]);
        assert_eq!(got[2], vec!["+".to_string()]);
    }

    #[test]
    fn test_nested_brackets_stay_whole() {
        let got = units("{ a[(1)] }");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].first().unwrap(), "{");
        assert_eq!(got[0].last().unwrap(), "}");
    }

    #[test]
    fn test_unmatched_close_ends_early() {
        // Recursive callers pass windows that stop at a parent's closer.
        assert_eq!(units("a b ) c"), vec![vec!["a".to_string()], vec!["b".into()]]);
    }

    #[test]
    fn test_mismatched_kind_is_fatal() {
        let err = gather(&tokenize("( a ]").unwrap()).unwrap_err();
        assert!(err.to_string().contains("mismatched bracket"));
    }

    #[test]
    fn test_unclosed_is_fatal() {
        assert!(gather(&tokenize("( a").unwrap()).is_err());
    }
}
