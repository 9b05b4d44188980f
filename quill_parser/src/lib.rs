//! Lexer, token grouper and grammar matcher for the Quill language.
//!
//! The pipeline is deliberately unusual: the lexer produces a flat token
//! stream, the grouper partitions it into bracket-balanced runs, and
//! parsing is a registry of pattern matchers tried in priority order over
//! those runs. Operator precedence and construct precedence fall out of
//! the same mechanism.

pub mod ast;
pub mod group;
pub mod lexer;
pub mod matcher;
pub mod parser;
pub mod token;

pub use ast::{AstNode, BinaryOp, Modifier, NodeKind, UnaryOp};
pub use parser::parse;
pub use token::{Token, TokenKind};
