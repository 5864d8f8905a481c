use serde::{Deserialize, Serialize};

use super::{DefId, ExprId, Rebase, TypeId};
use crate::compiler::{CompilerDisplay, CompilerDisplayError, SourceMap, Span};
use crate::{StringId, StringTable};

/// The kind of definition a named type reference points at.  References only
/// resolve to a definition of the same category, so `structure foo` and
/// `bitfield foo` never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Structure,
    Object,
    Union,
    Enumeration,
    BitField,
    Alternative,
    Constant,
    Global,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::Structure => "structure",
            Category::Object => "object",
            Category::Union => "union",
            Category::Enumeration => "enumeration",
            Category::BitField => "bitfield",
            Category::Alternative => "alternative",
            Category::Constant => "constant",
            Category::Global => "global",
        };
        f.write_str(s)
    }
}

/// A single node in the type arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Type {
    pub kind: TypeKind,
    pub quals: Vec<Qualifier>,
    pub span: Span,
}

impl Type {
    pub fn new(kind: TypeKind, span: Span) -> Type {
        Type {
            kind,
            quals: Vec::new(),
            span,
        }
    }

    pub fn primitive(name: StringId, span: Span) -> Type {
        Type::new(TypeKind::Primitive(name), span)
    }

    pub fn named(category: Category, name: StringId, span: Span) -> Type {
        Type::new(
            TypeKind::Named {
                category,
                name,
                def: None,
            },
            span,
        )
    }

    pub fn is_const(&self) -> bool {
        self.quals.iter().any(|q| matches!(q, Qualifier::Const))
    }

    pub fn is_atomic(&self) -> bool {
        self.quals.iter().any(|q| matches!(q, Qualifier::Atomic))
    }

    pub fn is_packed(&self) -> bool {
        self.quals.iter().any(|q| matches!(q, Qualifier::Packed))
    }

    pub fn is_writeonly(&self) -> bool {
        self.quals.iter().any(|q| matches!(q, Qualifier::Writeonly))
    }

    pub fn is_contained(&self) -> bool {
        self.quals.iter().any(|q| matches!(q, Qualifier::Contained))
    }

    pub(crate) fn rebase(&mut self, rb: Rebase) {
        match &mut self.kind {
            TypeKind::Primitive(_) => {}
            TypeKind::Named { def, .. } => {
                if let Some(d) = def {
                    rb.def(d);
                }
            }
            TypeKind::Array { base, length } => {
                rb.ty(base);
                rb.expr(length);
            }
            TypeKind::Pointer { pointee } => {
                rb.ty(pointee);
            }
        }
        for q in &mut self.quals {
            q.rebase(rb);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TypeKind {
    /// A built in scalar, named by its DSL spelling (`uint32`, `sregister`).
    Primitive(StringId),

    /// A reference to a user defined type.  `def` is filled in by the
    /// resolver.
    Named {
        category: Category,
        name: StringId,
        def: Option<DefId>,
    },

    /// A fixed length array of a base type.
    Array { base: TypeId, length: ExprId },

    /// A pointer.  Pointees do not count as layout dependencies since C can
    /// forward declare them, unless the pointee is atomic qualified.
    Pointer { pointee: TypeId },
}

impl CompilerDisplay for TypeKind {
    fn fmt(&self, _: &SourceMap, st: &StringTable) -> Result<String, CompilerDisplayError> {
        match self {
            TypeKind::Primitive(name) => Ok(st.get(*name)?),
            TypeKind::Named { category, name, .. } => {
                Ok(format!("{} {}", category, st.get(*name)?))
            }
            TypeKind::Array { .. } => Ok("array".into()),
            TypeKind::Pointer { .. } => Ok("pointer".into()),
        }
    }
}

/// Every primitive type name the language accepts.  The lexer recognizes
/// these as [`TypeKind::Primitive`] spellings and the emitter declares a
/// result wrapper for each.
pub const PRIMITIVE_NAMES: &[&str] = &[
    "bool",
    "uint8",
    "uint16",
    "uint32",
    "uint64",
    "uintptr",
    "sint8",
    "sint16",
    "sint32",
    "sint64",
    "sintptr",
    "char",
    "size",
    "uregister",
    "sregister",
];

/// Maps a DSL primitive type name to the C type it is emitted as.  The two
/// register width names map to an ABI alias which
/// [`Abi::map_type_name`](crate::compiler::abi::Abi::map_type_name) turns
/// into a concrete fixed width type.
pub fn primitive_c_name(name: &str) -> Option<&'static str> {
    let c = match name {
        "bool" => "bool",
        "uint8" => "uint8_t",
        "uint16" => "uint16_t",
        "uint32" => "uint32_t",
        "uint64" => "uint64_t",
        "uintptr" => "uintptr_t",
        "sint8" => "int8_t",
        "sint16" => "int16_t",
        "sint32" => "int32_t",
        "sint64" => "int64_t",
        "sintptr" => "intptr_t",
        "char" => "char",
        "size" => "size_t",
        "uregister" => "uregister_t",
        "sregister" => "sregister_t",
        _ => return None,
    };
    Some(c)
}

/// A modifier attached to a type or a definition.
///
/// Aggregate level qualifiers (packed, aligned, optimized, lockable) change
/// the layout algorithm; member level qualifiers (const, atomic, writeonly,
/// contained) change accessor and code generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Qualifier {
    Const,
    Writeonly,
    Restrict,
    Atomic,
    Packed,
    Contained,
    Optimized,
    Aligned(ExprId),
    Group(StringId),
    Lockable(StringId),
}

impl Qualifier {
    pub fn name(&self) -> &'static str {
        match self {
            Qualifier::Const => "const",
            Qualifier::Writeonly => "writeonly",
            Qualifier::Restrict => "restrict",
            Qualifier::Atomic => "atomic",
            Qualifier::Packed => "packed",
            Qualifier::Contained => "contained",
            Qualifier::Optimized => "optimized",
            Qualifier::Aligned(_) => "aligned",
            Qualifier::Group(_) => "group",
            Qualifier::Lockable(_) => "lockable",
        }
    }

    pub(crate) fn rebase(&mut self, rb: Rebase) {
        if let Qualifier::Aligned(e) = self {
            rb.expr(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualifier_queries() {
        let st = StringTable::new();
        let mut t = Type::primitive(st.insert("uint8".into()), Span::zero());
        assert!(!t.is_const());

        t.quals.push(Qualifier::Const);
        t.quals.push(Qualifier::Atomic);
        assert!(t.is_const());
        assert!(t.is_atomic());
        assert!(!t.is_packed());
    }

    #[test]
    fn category_names_match_dsl_keywords() {
        assert_eq!(Category::BitField.to_string(), "bitfield");
        assert_eq!(Category::Enumeration.to_string(), "enumeration");
    }
}
