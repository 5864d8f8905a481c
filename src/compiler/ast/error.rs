use crate::compiler::{CompilerDisplay, CompilerDisplayError, SourceMap};
use crate::StringTable;

/// Errors raised while reducing the parse tree into IR nodes.
#[derive(Clone, Debug, PartialEq)]
pub enum AstError {
    /// `delete` appeared in a bitfield definition instead of an extension.
    DeleteOutsideExtension,

    /// An object type used as the value of a bitfield field.
    ObjectInBitField,

    /// An object embedded directly in a union.
    ObjectInUnion,

    /// A fixed member offset on a file scope declaration.
    OffsetAtFileScope,

    /// An alternative definition whose name does not end in `_t`.
    AlternativeName(String),

    /// A [`StringId`](crate::StringId) with no string behind it.
    StringNotFound,

    /// A parse tree shape the reducer has no rule for.
    Internal(&'static str),
}

impl CompilerDisplay for AstError {
    fn fmt(&self, _: &SourceMap, _: &StringTable) -> Result<String, CompilerDisplayError> {
        Ok(match self {
            AstError::DeleteOutsideExtension => {
                "delete is only valid in a bitfield extension".into()
            }
            AstError::ObjectInBitField => "an object cannot be a bitfield member".into(),
            AstError::ObjectInUnion => "an object cannot be embedded in a union".into(),
            AstError::OffsetAtFileScope => {
                "a fixed offset is only valid inside an aggregate".into()
            }
            AstError::AlternativeName(name) => {
                format!("alternative name {} must end in _t", name)
            }
            AstError::StringNotFound => "StringId not found".into(),
            AstError::Internal(what) => format!("internal: malformed parse tree ({})", what),
        })
    }
}
