//! The stack-based virtual machine.
//!
//! Values are reference-counted mutable cells ([`value::ValueRef`]);
//! cloning a value is shallow, so tuples and wraps share member storage
//! and mutation through one handle is visible through all of them. The
//! [`executor::Executor`] drives one request over a linked
//! [`quill_compiler::ModuleCode`], with host interaction (printing,
//! input, cancellation) routed through [`builtins::HostHooks`].

pub mod builtins;
pub mod context;
pub mod executor;
pub mod ops;
pub mod slot;
pub mod value;

pub use builtins::HostHooks;
pub use executor::{ExecOutcome, Executor};
pub use value::{Value, ValueRef};

use quill_compiler::FunctionTable;
use quill_core::QuillError;
use std::rc::Rc;

/// Compile `source` and run it end to end.
pub fn execute_source(
    source: &str,
    hooks: HostHooks,
    bindings: Vec<(String, Value)>,
) -> Result<ExecOutcome, QuillError> {
    let table = quill_compiler::compile(source)?;
    execute_table(&table, hooks, bindings)
}

/// Link a compiled table and run its `__main__`.
pub fn execute_table(
    table: &FunctionTable,
    hooks: HostHooks,
    bindings: Vec<(String, Value)>,
) -> Result<ExecOutcome, QuillError> {
    Executor::new(hooks).execute(Rc::new(table.link()), bindings)
}
