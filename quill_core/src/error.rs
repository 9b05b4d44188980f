//! The common error taxonomy.
//!
//! Three families, mirroring the phases of a request: structural errors
//! raised while lexing/parsing/compiling, runtime errors raised while the
//! VM executes, and cooperative cancellation. Constructor helpers keep the
//! call sites short.

use crate::span::Span;
use std::fmt;

/// Kinds of runtime failure, used to pick a diagnostic prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// Operation applied to an unsupported value variant.
    TypeError,
    /// A name lookup failed everywhere on the frame stack.
    NameError,
    /// Tuple or string index out of range.
    IndexError,
    /// Attribute/key lookup failed on a structural value.
    KeyError,
    /// `assert` saw a non-bool or a false value.
    AssertionError,
    /// Module loading or deserialization failed.
    ImportError,
    /// A value was malformed for the requested operation.
    ValueError,
}

impl RuntimeErrorKind {
    /// Diagnostic prefix for this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TypeError => "TypeError",
            Self::NameError => "NameError",
            Self::IndexError => "IndexError",
            Self::KeyError => "KeyError",
            Self::AssertionError => "AssertionError",
            Self::ImportError => "ImportError",
            Self::ValueError => "ValueError",
        }
    }
}

/// Any error a Quill request can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum QuillError {
    /// Lexical error with the offending span.
    LexError { message: String, span: Span },
    /// Structural parse error.
    SyntaxError { message: String, span: Span },
    /// Tree-to-bytecode lowering error.
    CompileError { message: String, span: Option<Span> },
    /// Error raised by an executing instruction.
    RuntimeError {
        kind: RuntimeErrorKind,
        message: String,
    },
    /// The host's should-stop predicate fired.
    Cancelled,
    /// Invariant violation inside the implementation itself.
    InternalError { message: String },
}

impl QuillError {
    /// Lexical error at `span`.
    pub fn lex(message: impl Into<String>, span: Span) -> Self {
        Self::LexError {
            message: message.into(),
            span,
        }
    }

    /// Structural parse error at `span`.
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self::SyntaxError {
            message: message.into(),
            span,
        }
    }

    /// Compile-time lowering error.
    pub fn compile(message: impl Into<String>, span: Option<Span>) -> Self {
        Self::CompileError {
            message: message.into(),
            span,
        }
    }

    /// Runtime error of the given kind.
    pub fn runtime(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        Self::RuntimeError {
            kind,
            message: message.into(),
        }
    }

    /// Type error shorthand.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::runtime(RuntimeErrorKind::TypeError, message)
    }

    /// Unbound-name error shorthand.
    pub fn name(name: &str) -> Self {
        Self::runtime(RuntimeErrorKind::NameError, format!("'{name}' is not bound"))
    }

    /// Index-out-of-range shorthand.
    pub fn index(index: i64, len: usize) -> Self {
        Self::runtime(
            RuntimeErrorKind::IndexError,
            format!("index {index} out of range for length {len}"),
        )
    }

    /// Missing-key shorthand.
    pub fn key(key: &str) -> Self {
        Self::runtime(RuntimeErrorKind::KeyError, format!("'{key}' not found"))
    }

    /// Internal invariant violation.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Whether this error is a cooperative cancellation.
    #[inline]
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for QuillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LexError { message, span } => write!(f, "LexError at {span}: {message}"),
            Self::SyntaxError { message, span } => write!(f, "SyntaxError at {span}: {message}"),
            Self::CompileError { message, span } => match span {
                Some(span) => write!(f, "CompileError at {span}: {message}"),
                None => write!(f, "CompileError: {message}"),
            },
            Self::RuntimeError { kind, message } => write!(f, "{}: {message}", kind.as_str()),
            Self::Cancelled => write!(f, "Cancelled: execution stopped by host"),
            Self::InternalError { message } => write!(f, "InternalError: {message}"),
        }
    }
}

impl std::error::Error for QuillError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_syntax() {
        let err = QuillError::syntax("unmatched bracket", Span::new(3, 4));
        assert_eq!(err.to_string(), "SyntaxError at 3..4: unmatched bracket");
    }

    #[test]
    fn test_display_runtime() {
        let err = QuillError::name("x");
        assert_eq!(err.to_string(), "NameError: 'x' is not bound");
    }

    #[test]
    fn test_cancelled() {
        assert!(QuillError::Cancelled.is_cancelled());
        assert!(!QuillError::name("x").is_cancelled());
    }

    #[test]
    fn test_compile_without_span() {
        let err = QuillError::compile("'break' outside loop", None);
        assert_eq!(err.to_string(), "CompileError: 'break' outside loop");
    }
}
