//! Dependency ordered C code emission.
//!
//! Once the resolver has linked every reference and the layout engine has
//! written sizes, offsets, and values back into the graph, [`generate`]
//! renders the whole thing as one C translation unit: forward declarations
//! first, then definition bodies in dependency order, then result wrapper
//! declarations for every emitted type.

use super::ir::Category;
use super::{CompilerDisplay, CompilerDisplayError, CompilerError, SourceMap};
use crate::StringTable;

mod code;
mod order;
mod tests;

pub use code::generate;
pub use order::emission_order;

pub type EmitResult<T> = Result<T, CompilerError<EmitError>>;

#[derive(Debug, Clone, PartialEq)]
pub enum EmitError {
    /// A qualifier with no C rendering on this kind of definition.
    InvalidQualifier {
        qual: &'static str,
        category: Category,
    },

    /// A restrict qualifier on something other than a pointer.
    RestrictNonPointer,

    /// A definition the layout engine never visited.  Emission runs after
    /// layout, so hitting this is a compiler bug surfaced politely.
    MissingLayout { name: String },

    /// A named reference the resolver never linked.
    Unresolved { name: String },

    /// An expression with no computed value where a number must be printed.
    Unevaluated,

    UnknownPrimitive { name: String },
    Internal(&'static str),
    StringNotFound,
}

impl CompilerDisplay for EmitError {
    fn fmt(&self, _: &SourceMap, _: &StringTable) -> Result<String, CompilerDisplayError> {
        Ok(match self {
            EmitError::InvalidQualifier { qual, category } => {
                format!("invalid {} qualifier for {}", qual, category)
            }
            EmitError::RestrictNonPointer => "restrict qualifier on a non pointer type".into(),
            EmitError::MissingLayout { name } => format!("no layout computed for {}", name),
            EmitError::Unresolved { name } => format!("unresolved reference to {}", name),
            EmitError::Unevaluated => "expression has no computed value".into(),
            EmitError::UnknownPrimitive { name } => format!("unknown primitive type {}", name),
            EmitError::Internal(what) => format!("internal: {}", what),
            EmitError::StringNotFound => "StringId not found".into(),
        })
    }
}
