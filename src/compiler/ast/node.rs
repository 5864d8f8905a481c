use crate::compiler::ir::{BinaryOp, BitRange, Category, TypeProp, UnaryOp};
use crate::compiler::Span;
use crate::StringId;

/// A node of the parse tree.  The parser builds these without consulting any
/// context; the tree builder reduces them into IR nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    pub span: Span,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn new(kind: NodeKind, span: Span) -> SyntaxNode {
        SyntaxNode {
            kind,
            span,
            children: Vec::new(),
        }
    }

    pub fn with_children(kind: NodeKind, span: Span, children: Vec<SyntaxNode>) -> SyntaxNode {
        SyntaxNode {
            kind,
            span,
            children,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    // items
    Define(StringId),
    Extend(StringId),
    Declaration(StringId),

    // item modifiers
    Public,
    Explicit,
    NoPrefix,
    ConstMembers,
    ModuleName(StringId),

    // definition bodies
    StructureBody,
    UnionBody,
    ObjectBody,
    EnumBody,

    /// The bit length is `None` for extension bodies, which reuse the base
    /// definition's length.
    BitFieldBody(Option<u64>),

    AlternativeBody,
    ConstantBody,
    GlobalBody,

    // member pieces
    Offset,
    Enumerator(StringId),
    Field(StringId),
    Reserved,
    Delete(StringId),

    // bitfield field specifiers
    Ranges { shift: u64 },
    Range(BitRange),
    Auto { width: Option<u64> },
    Others,

    // types
    Primitive(StringId),
    Named { category: Category, name: StringId },
    Object(StringId),
    Array,
    Pointer,

    // qualifiers
    Const,
    Atomic,
    Packed,
    Writeonly,
    Restrict,
    Contained,
    Optimized,
    Aligned,
    Group(StringId),
    Lockable(StringId),

    // expressions
    Literal(u64),
    Name(StringId),
    Unary(UnaryOp),
    Binary(BinaryOp),
    Conditional,
    TypeProp(TypeProp),
}
