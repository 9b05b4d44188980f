//! Bytecode compiler for the Quill language.
//!
//! Lowers the matcher's AST into flat per-function instruction blocks,
//! collected in a [`FunctionTable`] keyed by hierarchical signature.
//! Control flow is emitted symbolically and resolved to relative offsets
//! in a second pass.

pub mod codegen;
pub mod instruction;
pub mod table;

pub use codegen::CodeGen;
pub use instruction::Instruction;
pub use table::{FunctionTable, ModuleCode};

use quill_core::QuillError;

/// Compile source text into a function table with a `__main__` entry.
pub fn compile(source: &str) -> Result<FunctionTable, QuillError> {
    let ast = quill_parser::parse(source)?;
    CodeGen::new("__main__").generate(&ast)
}
