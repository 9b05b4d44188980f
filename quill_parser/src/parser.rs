//! Top-level parse entry point.

use crate::ast::AstNode;
use crate::group;
use crate::lexer;
use crate::matcher;
use quill_core::QuillError;

/// Parse source text into a single AST node.
///
/// An empty (or comment-only) source parses to a `null` literal so every
/// program has a value.
pub fn parse(source: &str) -> Result<AstNode, QuillError> {
    let tokens = lexer::tokenize(source)?;
    let groups = group::gather(&tokens)?;
    if groups.is_empty() {
        return Ok(AstNode::null(quill_core::Span::at(0)));
    }
    matcher::parse_window(&groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;

    #[test]
    fn test_empty_source() {
        assert_eq!(parse("").unwrap().kind, NodeKind::Null);
        assert_eq!(parse("// just a comment").unwrap().kind, NodeKind::Null);
    }

    #[test]
    fn test_program_parses() {
        let node = parse("x := 1; y := x + 2; y").unwrap();
        let NodeKind::Sequence(stmts) = node.kind else {
            panic!("expected sequence");
        };
        assert_eq!(stmts.len(), 3);
    }

    #[test]
    fn test_lex_error_propagates() {
        assert!(parse("\"open").is_err());
    }
}
