//! The parse tree and its reduction into IR nodes.
//!
//! The parser emits [`SyntaxNode`] trees with no knowledge of what encloses
//! them; [`build`] reduces each tree bottom up, so a declaration means a
//! member inside an aggregate and a global at file scope without the parser
//! caring which.

use super::CompilerError;

mod build;
mod error;
mod facts;
mod node;

pub use build::build;
pub use error::AstError;
pub use node::{NodeKind, SyntaxNode};

pub type AstResult<T> = Result<T, CompilerError<AstError>>;
