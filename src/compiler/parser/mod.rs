//! Parses the token stream into a tree of [`SyntaxNode`](crate::compiler::ast::SyntaxNode)s
//! for the tree builder to reduce.

use super::CompilerError;

mod error;
mod expression;

pub(crate) mod parser;
pub(crate) mod tokenstream;

pub use error::ParserError;
pub use parser::parse;

/// The result of a parser production.  `Ok(None)` means the production did
/// not match the next tokens, which only becomes an error when the caller
/// decides nothing else can match either.
pub type ParserResult<T> = Result<Option<T>, CompilerError<ParserError>>;
