//! The intermediate representation of the DSL.  A [`TopLevel`] owns arenas of
//! type nodes, constant expression nodes, and definitions, all linked by
//! integer handles rather than references.  The graph is built incrementally
//! by the tree builder, linked by the resolver, and laid out in place, so
//! handles let every pass mutate nodes without fighting over ownership.

use serde::{Deserialize, Serialize};

mod defs;
mod expr;
mod types;

pub use defs::{
    AlternativeDef, BitFieldDef, BitFieldField, BitFieldLayout, BitRange, ConstantDef, DefKind,
    Definition, EnumDef, EnumLayout, Enumerator, Extension, ExtensionKind, FieldMap, FieldMapping,
    FieldSpecifier, GlobalDef, LayoutEntry, LayoutMember, Member, StructDef, StructLayout,
    UnionDef, UnionLayout,
};
pub use expr::{BinaryOp, Expr, ExprKind, TypeProp, UnaryOp};
pub use types::{primitive_c_name, Category, Qualifier, Type, TypeKind, PRIMITIVE_NAMES};

macro_rules! handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(u32);

        impl $name {
            pub fn new(idx: usize) -> $name {
                $name(idx as u32)
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }

            fn rebase(&mut self, base: u32) {
                self.0 += base;
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_fmt(format_args!("{}", self.0))
            }
        }
    };
}

handle! {
    /// Handle to a [`Type`] node in a [`TopLevel`] arena.
    TypeId
}
handle! {
    /// Handle to an [`Expr`] node in a [`TopLevel`] arena.
    ExprId
}
handle! {
    /// Handle to a [`Definition`] in a [`TopLevel`] arena.
    DefId
}

/// Offsets applied to the handles of a graph when it is appended onto the
/// end of another graph's arenas.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Rebase {
    pub types: u32,
    pub exprs: u32,
    pub defs: u32,
}

impl Rebase {
    pub fn ty(self, id: &mut TypeId) {
        id.rebase(self.types);
    }

    pub fn expr(self, id: &mut ExprId) {
        id.rebase(self.exprs);
    }

    pub fn def(self, id: &mut DefId) {
        id.rebase(self.defs);
    }
}

/// The root of the IR.  Owns every type, expression, definition, and pending
/// extension produced from the input modules.
///
/// One [`TopLevel`] is built per input file; the driver merges them all into
/// a single graph before resolution.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TopLevel {
    types: Vec<Type>,
    exprs: Vec<Expr>,
    defs: Vec<Definition>,
    extensions: Vec<Extension>,
}

impl TopLevel {
    pub fn new() -> TopLevel {
        TopLevel::default()
    }

    pub fn add_type(&mut self, ty: Type) -> TypeId {
        let id = TypeId::new(self.types.len());
        self.types.push(ty);
        id
    }

    pub fn add_expr(&mut self, expr: Expr) -> ExprId {
        let id = ExprId::new(self.exprs.len());
        self.exprs.push(expr);
        id
    }

    pub fn add_def(&mut self, def: Definition) -> DefId {
        let id = DefId::new(self.defs.len());
        self.defs.push(def);
        id
    }

    pub fn add_extension(&mut self, ext: Extension) {
        self.extensions.push(ext);
    }

    pub fn ty(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    pub fn ty_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.types[id.index()]
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.index()]
    }

    pub fn def(&self, id: DefId) -> &Definition {
        &self.defs[id.index()]
    }

    pub fn def_mut(&mut self, id: DefId) -> &mut Definition {
        &mut self.defs[id.index()]
    }

    pub fn def_ids(&self) -> impl Iterator<Item = DefId> {
        (0..self.defs.len()).map(DefId::new)
    }

    pub fn defs(&self) -> impl Iterator<Item = (DefId, &Definition)> {
        self.defs.iter().enumerate().map(|(i, d)| (DefId::new(i), d))
    }

    pub fn type_ids(&self) -> impl Iterator<Item = TypeId> {
        (0..self.types.len()).map(TypeId::new)
    }

    pub fn expr_ids(&self) -> impl Iterator<Item = ExprId> {
        (0..self.exprs.len()).map(ExprId::new)
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    /// Removes the pending extensions for the resolver to apply to their
    /// target definitions.
    pub fn take_extensions(&mut self) -> Vec<Extension> {
        std::mem::take(&mut self.extensions)
    }

    /// Appends every node of `other` onto this graph, shifting the handles
    /// inside the appended nodes so they keep pointing at the right nodes.
    pub fn merge(&mut self, other: TopLevel) {
        let rb = Rebase {
            types: self.types.len() as u32,
            exprs: self.exprs.len() as u32,
            defs: self.defs.len() as u32,
        };

        for mut t in other.types {
            t.rebase(rb);
            self.types.push(t);
        }
        for mut e in other.exprs {
            e.rebase(rb);
            self.exprs.push(e);
        }
        for mut d in other.defs {
            d.rebase(rb);
            self.defs.push(d);
        }
        for mut x in other.extensions {
            x.rebase(rb);
            self.extensions.push(x);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Span;
    use crate::StringTable;

    #[test]
    fn arena_returns_stable_handles() {
        let mut top = TopLevel::new();
        let st = StringTable::new();
        let name = st.insert("uint32".into());

        let a = top.add_type(Type::primitive(name, Span::zero()));
        let b = top.add_expr(Expr::literal(7, Span::zero()));

        assert_eq!(top.ty(a).kind, TypeKind::Primitive(name));
        assert_eq!(top.expr(b).kind, ExprKind::Literal(7));
    }

    #[test]
    fn merge_rebases_handles() {
        let st = StringTable::new();
        let u32_name = st.insert("uint32".into());
        let u8_name = st.insert("uint8".into());

        let mut first = TopLevel::new();
        first.add_type(Type::primitive(u32_name, Span::zero()));

        let mut second = TopLevel::new();
        let base = second.add_type(Type::primitive(u8_name, Span::zero()));
        let len = second.add_expr(Expr::literal(4, Span::zero()));
        let arr = second.add_type(Type::new(
            TypeKind::Array { base, length: len },
            Span::zero(),
        ));
        assert_eq!(arr.index(), 1);

        first.merge(second);

        // the array node moved to index 2 and its handles moved with it
        match first.ty(TypeId::new(2)).kind {
            TypeKind::Array { base, length } => {
                assert_eq!(first.ty(base).kind, TypeKind::Primitive(u8_name));
                assert_eq!(first.expr(length).kind, ExprKind::Literal(4));
            }
            ref k => panic!("expected array, got {:?}", k),
        }
    }
}
