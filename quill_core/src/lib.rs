//! Shared leaf crate for the Quill language implementation.
//!
//! Everything here is consumed by the parser, the compiler, the virtual
//! machine and the CLI: source spans and the common error taxonomy.

pub mod error;
pub mod span;

pub use error::{QuillError, RuntimeErrorKind};
pub use span::Span;

/// Crate version, re-exported for the CLI banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
