//! Character-level lexer.
//!
//! Produces the flat `{text, kind, span}` stream the grouper and matcher
//! registry operate on. String escapes are resolved here; comments are
//! lexed and then rejected; a trailing pass folds `-` into a following
//! number literal when the minus cannot be a binary operator.

use crate::token::{Token, TokenKind};
use quill_core::{QuillError, Span};

/// Operator table, longest first. Order within a length does not matter;
/// the scanner always tries three characters, then two, then one.
const OPERATORS_3: &[&str] = &["\"\"\"", "'''"];
const OPERATORS_2: &[&str] = &[
    ":=", "->", "=>", "==", "!=", "<=", ">=", "&&", "||", "::", "<<", ">>", "|>", "<|", "++",
    "--", "/*", "*/", "//",
];
const OPERATORS_1: &[&str] = &[
    "+", "-", "*", "/", "%", "&", "|", "!", "^", "~", "=", ">", "<", "?", "#", ",", ".", ":",
    ";", "(", ")", "[", "]", "{", "}",
];

/// Tokenize `source`, dropping comments and folding negative numbers.
pub fn tokenize(source: &str) -> Result<Vec<Token>, QuillError> {
    let raw = Lexer::new(source).run()?;
    let no_comments = raw
        .into_iter()
        .filter(|t| t.kind != TokenKind::Comment)
        .collect();
    Ok(fold_negative_numbers(no_comments))
}

/// Merge a `-` symbol into a following number literal when the minus has
/// no left operand (start of stream, or preceded by a symbol).
fn fold_negative_numbers(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();
    while let Some(tok) = iter.next() {
        let unary_position = out
            .last()
            .map_or(true, |prev: &Token| prev.kind == TokenKind::Symbol && !prev.is_close_bracket());
        if tok.is_symbol("-") && unary_position {
            if let Some(next) = iter.peek() {
                if next.kind == TokenKind::Number {
                    let number = iter.next().expect("peeked");
                    out.push(Token::new(
                        format!("-{}", number.text),
                        TokenKind::Number,
                        tok.span.merge(number.span),
                    ));
                    continue;
                }
            }
        }
        out.push(tok);
    }
    out
}

struct Lexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    pos: usize,
}

impl<'src> Lexer<'src> {
    fn new(source: &'src str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        }
    }

    fn run(mut self) -> Result<Vec<Token>, QuillError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            if self.pos >= self.bytes.len() {
                break;
            }
            let start = self.pos;
            let token = if let Some(text) = self.read_comment() {
                Token::new(text, TokenKind::Comment, self.span_from(start))
            } else if let Some(text) = self.read_number() {
                Token::new(text, TokenKind::Number, self.span_from(start))
            } else if let Some(text) = self.read_string()? {
                Token::new(text, TokenKind::String, self.span_from(start))
            } else if let Some(text) = self.read_operator() {
                Token::new(text, TokenKind::Symbol, self.span_from(start))
            } else {
                let text = self.read_word();
                if text.is_empty() {
                    return Err(QuillError::lex(
                        format!("unexpected character {:?}", self.source[self.pos..].chars().next().unwrap_or('\0')),
                        Span::at(self.pos as u32),
                    ));
                }
                Token::new(text, TokenKind::Identifier, self.span_from(start))
            };
            tokens.push(token);
        }
        Ok(tokens)
    }

    #[inline]
    fn span_from(&self, start: usize) -> Span {
        Span::new(start as u32, self.pos as u32)
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn starts_with(&self, pat: &str) -> bool {
        self.source[self.pos..].starts_with(pat)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn read_comment(&mut self) -> Option<String> {
        if self.starts_with("//") {
            self.pos += 2;
            let start = self.pos;
            while !matches!(self.peek(), None | Some(b'\n' | b'\r')) {
                self.pos += 1;
            }
            return Some(self.source[start..self.pos].to_string());
        }
        if self.starts_with("/*") {
            self.pos += 2;
            let start = self.pos;
            while self.pos < self.bytes.len() && !self.starts_with("*/") {
                self.pos += 1;
            }
            let text = self.source[start..self.pos].to_string();
            if self.pos < self.bytes.len() {
                self.pos += 2;
            }
            return Some(text);
        }
        None
    }

    /// `\d*\.?\d+([eE][-+]?\d+)?`
    fn read_number(&mut self) -> Option<String> {
        let start = self.pos;
        let mut p = self.pos;
        while matches!(self.bytes.get(p), Some(b'0'..=b'9')) {
            p += 1;
        }
        let int_digits = p - self.pos;
        let mut frac_digits = 0;
        if self.bytes.get(p) == Some(&b'.') {
            let mut q = p + 1;
            while matches!(self.bytes.get(q), Some(b'0'..=b'9')) {
                q += 1;
            }
            frac_digits = q - p - 1;
            if frac_digits > 0 {
                p = q;
            }
        }
        if int_digits == 0 && frac_digits == 0 {
            return None;
        }
        if matches!(self.bytes.get(p), Some(b'e' | b'E')) {
            let mut q = p + 1;
            if matches!(self.bytes.get(q), Some(b'+' | b'-')) {
                q += 1;
            }
            let exp_start = q;
            while matches!(self.bytes.get(q), Some(b'0'..=b'9')) {
                q += 1;
            }
            if q > exp_start {
                p = q;
            }
        }
        self.pos = p;
        Some(self.source[start..p].to_string())
    }

    fn read_string(&mut self) -> Result<Option<String>, QuillError> {
        if self.starts_with("R\"") {
            return self.read_raw_string().map(Some);
        }
        if self.starts_with("\"\"\"") {
            return self.read_delimited("\"\"\"").map(Some);
        }
        if self.starts_with("'''") {
            return self.read_delimited("'''").map(Some);
        }
        match self.peek() {
            Some(b'"') => self.read_delimited("\"").map(Some),
            Some(b'\'') => self.read_delimited("'").map(Some),
            _ => Ok(None),
        }
    }

    /// `R"delim( ... )delim"` — escapes still apply inside the body.
    fn read_raw_string(&mut self) -> Result<String, QuillError> {
        let start = self.pos;
        self.pos += 2;
        let divider_start = self.pos;
        while self.pos < self.bytes.len() && self.peek() != Some(b'(') {
            self.pos += 1;
        }
        if self.pos >= self.bytes.len() {
            return Err(QuillError::lex("unterminated raw string", Span::at(start as u32)));
        }
        let divider = self.source[divider_start..self.pos].to_string();
        self.pos += 1; // '('
        let closer = format!("){divider}\"");
        let mut text = String::new();
        while self.pos < self.bytes.len() && !self.starts_with(&closer) {
            if self.peek() == Some(b'\\') {
                text.push_str(&self.read_escape(start)?);
            } else {
                let ch = self.source[self.pos..].chars().next().expect("in bounds");
                text.push(ch);
                self.pos += ch.len_utf8();
            }
        }
        if self.pos >= self.bytes.len() {
            return Err(QuillError::lex("unterminated raw string", Span::at(start as u32)));
        }
        self.pos += closer.len();
        Ok(text)
    }

    fn read_delimited(&mut self, delim: &str) -> Result<String, QuillError> {
        let start = self.pos;
        self.pos += delim.len();
        let mut text = String::new();
        while self.pos < self.bytes.len() {
            if self.starts_with(delim) {
                self.pos += delim.len();
                return Ok(text);
            }
            if self.peek() == Some(b'\\') {
                text.push_str(&self.read_escape(start)?);
            } else {
                let ch = self.source[self.pos..].chars().next().expect("in bounds");
                text.push(ch);
                self.pos += ch.len_utf8();
            }
        }
        Err(QuillError::lex("unterminated string", Span::at(start as u32)))
    }

    /// Resolve one `\x` escape; unrecognized escapes are kept verbatim.
    fn read_escape(&mut self, string_start: usize) -> Result<String, QuillError> {
        self.pos += 1;
        let Some(escape) = self.peek() else {
            return Err(QuillError::lex(
                "unexpected end of string after '\\'",
                Span::at(string_start as u32),
            ));
        };
        self.pos += 1;
        Ok(match escape {
            b'n' => "\n".to_string(),
            b't' => "\t".to_string(),
            b'"' => "\"".to_string(),
            b'\'' => "'".to_string(),
            b'\\' => "\\".to_string(),
            b'u' => {
                if self.pos + 4 > self.bytes.len() {
                    return Err(QuillError::lex(
                        "truncated \\u escape",
                        Span::at(string_start as u32),
                    ));
                }
                let hex = &self.source[self.pos..self.pos + 4];
                let code = u32::from_str_radix(hex, 16).map_err(|_| {
                    QuillError::lex(format!("invalid \\u escape '{hex}'"), Span::at(string_start as u32))
                })?;
                self.pos += 4;
                char::from_u32(code)
                    .ok_or_else(|| {
                        QuillError::lex(
                            format!("\\u{hex} is not a valid character"),
                            Span::at(string_start as u32),
                        )
                    })?
                    .to_string()
            }
            other => format!("\\{}", other as char),
        })
    }

    fn read_operator(&mut self) -> Option<String> {
        for table in [OPERATORS_3, OPERATORS_2, OPERATORS_1] {
            for op in table {
                if self.starts_with(op) {
                    self.pos += op.len();
                    return Some((*op).to_string());
                }
            }
        }
        None
    }

    /// An identifier runs until whitespace, a quote, or any operator.
    fn read_word(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'"' | b'\'') || self.at_operator() {
                break;
            }
            let ch = self.source[self.pos..].chars().next().expect("in bounds");
            self.pos += ch.len_utf8();
        }
        self.source[start..self.pos].to_string()
    }

    fn at_operator(&self) -> bool {
        for table in [OPERATORS_3, OPERATORS_2, OPERATORS_1] {
            for op in table {
                if self.starts_with(op) {
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(source: &str) -> Vec<(String, TokenKind)> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| (t.text, t.kind))
            .collect()
    }

    #[test]
    fn test_basic_expression() {
        let toks = texts("x := 1 + 2;");
        assert_eq!(
            toks,
            vec![
                ("x".into(), TokenKind::Identifier),
                (":=".into(), TokenKind::Symbol),
                ("1".into(), TokenKind::Number),
                ("+".into(), TokenKind::Symbol),
                ("2".into(), TokenKind::Number),
                (";".into(), TokenKind::Symbol),
            ]
        );
    }

    #[test]
    fn test_comments_rejected() {
        let toks = texts("1 // line\n /* block\n still */ 2");
        assert_eq!(
            toks,
            vec![("1".into(), TokenKind::Number), ("2".into(), TokenKind::Number)]
        );
    }

    #[test]
    fn test_number_forms() {
        let toks = texts("12 3.5 .25 1e3 2.5e-2");
        let nums: Vec<&str> = toks.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(nums, vec!["12", "3.5", ".25", "1e3", "2.5e-2"]);
    }

    #[test]
    fn test_string_escapes() {
        let toks = texts(r#""a\nb\tcA""#);
        assert_eq!(toks, vec![("a\nb\tc\u{41}".into(), TokenKind::String)]);
    }

    #[test]
    fn test_triple_quoted() {
        let toks = texts("\"\"\"line1\nline2\"\"\"");
        assert_eq!(toks, vec![("line1\nline2".into(), TokenKind::String)]);
    }

    #[test]
    fn test_raw_string() {
        let toks = texts("R\"sep(keep \"quotes\")sep\"");
        assert_eq!(toks, vec![("keep \"quotes\"".into(), TokenKind::String)]);
    }

    #[test]
    fn test_unterminated_string() {
        assert!(tokenize("\"abc").is_err());
    }

    #[test]
    fn test_negative_number_folding() {
        // Leading minus folds; binary minus does not.
        let toks = texts("-1 + 2");
        assert_eq!(toks[0].0, "-1");
        let toks = texts("a - 1");
        assert_eq!(
            toks,
            vec![
                ("a".into(), TokenKind::Identifier),
                ("-".into(), TokenKind::Symbol),
                ("1".into(), TokenKind::Number),
            ]
        );
        // After an operator the minus is unary again.
        let toks = texts("2 * -3");
        assert_eq!(toks[2].0, "-3");
        // After a closing bracket it is binary.
        let toks = texts("(a) - 3");
        assert!(toks.iter().any(|(t, k)| t == "-" && *k == TokenKind::Symbol));
    }

    #[test]
    fn test_longest_operator_wins() {
        let toks = texts("a:=b=>c->d");
        let syms: Vec<&str> = toks
            .iter()
            .filter(|(_, k)| *k == TokenKind::Symbol)
            .map(|(t, _)| t.as_str())
            .collect();
        assert_eq!(syms, vec![":=", "=>", "->"]);
    }

    #[test]
    fn test_spans_cover_source() {
        let toks = tokenize("ab + cd").unwrap();
        assert_eq!(toks[0].span, Span::new(0, 2));
        assert_eq!(toks[1].span, Span::new(3, 4));
        assert_eq!(toks[2].span, Span::new(5, 7));
    }
}
