use crate::compiler::ir::{
    BitFieldField, BitRange, DefKind, Definition, Enumerator, ExprId, Extension, FieldSpecifier,
    Member, Qualifier, TypeId,
};
use crate::compiler::Span;
use crate::StringId;

/// One result produced by reducing a parse tree node.  Each node reduction
/// drains the facts it knows from its children's bus and pushes its own;
/// facts it does not know pass through to its parent untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Fact {
    Definition(Definition),
    Extension(Extension),
    Def(DefKind),
    Member(Member),
    Enumerator(Enumerator),
    Field(BitFieldField),
    Delete { name: StringId, span: Span },
    Range(BitRange),
    Specifier(FieldSpecifier),
    Qualifier(Qualifier),
    Type(TypeId),
    Expr(ExprId),
    Offset(ExprId),

    /// The type below is directly an object reference.  Raised by the object
    /// type node and consumed by whoever decides embedding: a declaration
    /// embeds it, a pointer hides it, a union or bitfield rejects it.
    HasObject { noprefix: bool },

    Public,
    Explicit,
    Noprefix,
    ConstMembers,
    Module(StringId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactKind {
    Definition,
    Extension,
    Def,
    Member,
    Enumerator,
    Field,
    Delete,
    Range,
    Specifier,
    Qualifier,
    Type,
    Expr,
    Offset,
    HasObject,
    Public,
    Explicit,
    Noprefix,
    ConstMembers,
    Module,
}

impl Fact {
    pub fn kind(&self) -> FactKind {
        match self {
            Fact::Definition(_) => FactKind::Definition,
            Fact::Extension(_) => FactKind::Extension,
            Fact::Def(_) => FactKind::Def,
            Fact::Member(_) => FactKind::Member,
            Fact::Enumerator(_) => FactKind::Enumerator,
            Fact::Field(_) => FactKind::Field,
            Fact::Delete { .. } => FactKind::Delete,
            Fact::Range(_) => FactKind::Range,
            Fact::Specifier(_) => FactKind::Specifier,
            Fact::Qualifier(_) => FactKind::Qualifier,
            Fact::Type(_) => FactKind::Type,
            Fact::Expr(_) => FactKind::Expr,
            Fact::Offset(_) => FactKind::Offset,
            Fact::HasObject { .. } => FactKind::HasObject,
            Fact::Public => FactKind::Public,
            Fact::Explicit => FactKind::Explicit,
            Fact::Noprefix => FactKind::Noprefix,
            Fact::ConstMembers => FactKind::ConstMembers,
            Fact::Module(_) => FactKind::Module,
        }
    }
}

/// An ordered collection of facts.  Order is the order the facts were pushed,
/// which for sibling nodes is source order; the binary and conditional
/// expression reductions rely on it to tell their operands apart.
#[derive(Debug, Default)]
pub struct FactBus {
    facts: Vec<Fact>,
}

impl FactBus {
    pub fn new() -> FactBus {
        FactBus::default()
    }

    pub fn push(&mut self, fact: Fact) {
        self.facts.push(fact);
    }

    /// Appends every fact of `other`, keeping order.
    pub fn absorb(&mut self, other: FactBus) {
        self.facts.extend(other.facts);
    }

    /// Removes and returns every fact of the given kind, keeping order.
    pub fn take_all(&mut self, kind: FactKind) -> Vec<Fact> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < self.facts.len() {
            if self.facts[i].kind() == kind {
                out.push(self.facts.remove(i));
            } else {
                i += 1;
            }
        }
        out
    }

    /// Removes and returns the first fact of the given kind.
    pub fn take_one(&mut self, kind: FactKind) -> Option<Fact> {
        let i = self.facts.iter().position(|f| f.kind() == kind)?;
        Some(self.facts.remove(i))
    }

    /// Removes every fact of a payload free kind, returning whether any were
    /// present.
    pub fn take_flag(&mut self, kind: FactKind) -> bool {
        !self.take_all(kind).is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }
}
