//! Token definitions for the Quill lexer.

use quill_core::Span;
use std::fmt;

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Verbatim text (with escapes already resolved for strings).
    pub text: String,
    /// The lexical category.
    pub kind: TokenKind,
    /// Source span.
    pub span: Span,
}

impl Token {
    /// Create a new token.
    #[inline]
    #[must_use]
    pub const fn new(text: String, kind: TokenKind, span: Span) -> Self {
        Self { text, kind, span }
    }

    /// Whether this token is the given symbol.
    #[inline]
    #[must_use]
    pub fn is_symbol(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == symbol
    }

    /// Whether this token is the given identifier.
    #[inline]
    #[must_use]
    pub fn is_identifier(&self, name: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text == name
    }

    /// Whether this token opens a bracket group.
    #[inline]
    #[must_use]
    pub fn is_open_bracket(&self) -> bool {
        self.kind == TokenKind::Symbol && matches!(self.text.as_str(), "(" | "[" | "{")
    }

    /// Whether this token closes a bracket group.
    #[inline]
    #[must_use]
    pub fn is_close_bracket(&self) -> bool {
        self.kind == TokenKind::Symbol && matches!(self.text.as_str(), ")" | "]" | "}")
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::String => write!(f, "\"{}\"", self.text),
            _ => f.write_str(&self.text),
        }
    }
}

/// Lexical categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Identifier or keyword.
    Identifier,
    /// Numeric literal (possibly negative after folding).
    Number,
    /// String literal with escapes resolved.
    String,
    /// Operator or bracket.
    Symbol,
    /// Comment text; removed before parsing.
    Comment,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_checks() {
        let tok = Token::new(":=".into(), TokenKind::Symbol, Span::new(0, 2));
        assert!(tok.is_symbol(":="));
        assert!(!tok.is_symbol("="));
        assert!(!tok.is_identifier(":="));
    }

    #[test]
    fn test_bracket_checks() {
        let open = Token::new("(".into(), TokenKind::Symbol, Span::new(0, 1));
        let close = Token::new("]".into(), TokenKind::Symbol, Span::new(1, 2));
        let ident = Token::new("x".into(), TokenKind::Identifier, Span::new(2, 3));
        assert!(open.is_open_bracket());
        assert!(close.is_close_bracket());
        assert!(!ident.is_open_bracket());
    }

    #[test]
    fn test_display_quotes_strings() {
        let s = Token::new("hi".into(), TokenKind::String, Span::new(0, 4));
        assert_eq!(s.to_string(), "\"hi\"");
    }
}
