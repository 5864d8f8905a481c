use log::warn;

use super::facts::{Fact, FactBus, FactKind};
use super::node::{NodeKind, SyntaxNode};
use super::{AstError, AstResult};
use crate::compiler::ir::{
    AlternativeDef, BitFieldDef, BitFieldField, BitRange, Category, ConstantDef, DefKind,
    Definition, EnumDef, Enumerator, Expr, ExprId, ExprKind, Extension, ExtensionKind,
    FieldSpecifier, GlobalDef, Member, Qualifier, StructDef, TopLevel, Type, TypeId, TypeKind,
    UnionDef,
};
use crate::compiler::{CompilerError, Span};
use crate::err;
use crate::{StringId, StringTable};

/// Reduces a file's parse trees into IR nodes in `top`.
///
/// Reduction is bottom up: each node drains the facts it understands from its
/// reduced children and pushes its own result.  Facts no ancestor claims fall
/// out at file scope, where definitions and extensions are registered and
/// anything else is dropped with a warning.
pub fn build(nodes: Vec<SyntaxNode>, top: &mut TopLevel, strings: &StringTable) -> AstResult<()> {
    let mut builder = Builder { top, strings };
    let mut bus = FactBus::new();
    for node in nodes {
        builder.reduce(node, &mut bus)?;
    }
    builder.finish(bus)
}

struct Builder<'a> {
    top: &'a mut TopLevel,
    strings: &'a StringTable,
}

impl<'a> Builder<'a> {
    fn reduce(&mut self, node: SyntaxNode, bus: &mut FactBus) -> AstResult<()> {
        let SyntaxNode {
            kind,
            span,
            children,
        } = node;

        let mut kids = FactBus::new();
        for c in children {
            self.reduce(c, &mut kids)?;
        }

        match kind {
            NodeKind::Define(name) => {
                if let Some((_, del_span)) = deletes(&mut kids).into_iter().next() {
                    return err!(del_span, AstError::DeleteOutsideExtension);
                }
                let def_kind = one_def(&mut kids, span)?;
                if let DefKind::Alternative(_) = def_kind {
                    let n = self.string(name, span)?;
                    if !n.ends_with("_t") {
                        return err!(span, AstError::AlternativeName(n));
                    }
                }
                let mut def = Definition::new(name, span, def_kind);
                def.public = kids.take_flag(FactKind::Public);
                def.quals = quals(&mut kids);
                bus.push(Fact::Definition(def));
            }

            NodeKind::Extend(target) => {
                let module = module(&mut kids);
                let dels: Vec<StringId> =
                    deletes(&mut kids).into_iter().map(|(n, _)| n).collect();
                let kind = match one_def(&mut kids, span)? {
                    DefKind::Structure(s) => ExtensionKind::Structure { members: s.members },
                    DefKind::Object { def, .. } => ExtensionKind::Object {
                        members: def.members,
                    },
                    DefKind::Union(u) => ExtensionKind::Union { members: u.members },
                    DefKind::Enumeration(e) => ExtensionKind::Enumeration {
                        enumerators: e.enumerators,
                    },
                    DefKind::BitField(b) => ExtensionKind::BitField {
                        fields: b.fields,
                        deletes: dels,
                    },
                    _ => return Err(missing(span, "extension body")),
                };
                bus.push(Fact::Extension(Extension {
                    target,
                    module,
                    span,
                    kind,
                }));
            }

            NodeKind::Declaration(name) => {
                let ty = one_type(&mut kids, span)?;
                let mut m = Member::new(name, ty, span);
                m.offset = offset(&mut kids);
                if let Some(noprefix) = has_object(&mut kids) {
                    m.embed = true;
                    m.noprefix = noprefix;
                }
                bus.push(Fact::Member(m));
            }

            NodeKind::Public => bus.push(Fact::Public),
            NodeKind::Explicit => bus.push(Fact::Explicit),
            NodeKind::NoPrefix => bus.push(Fact::Noprefix),
            NodeKind::ConstMembers => bus.push(Fact::ConstMembers),
            NodeKind::ModuleName(m) => bus.push(Fact::Module(m)),

            NodeKind::StructureBody => {
                let members = members(&mut kids);
                bus.push(Fact::Def(DefKind::Structure(StructDef {
                    members,
                    layout: None,
                })));
            }

            NodeKind::ObjectBody => {
                let members = members(&mut kids);
                bus.push(Fact::Def(DefKind::Object {
                    def: StructDef {
                        members,
                        layout: None,
                    },
                    need_export: true,
                }));
            }

            NodeKind::UnionBody => {
                let members = members(&mut kids);
                if let Some(m) = members.iter().find(|m| m.embed) {
                    return err!(m.span, AstError::ObjectInUnion);
                }
                bus.push(Fact::Def(DefKind::Union(UnionDef {
                    members,
                    layout: None,
                })));
            }

            NodeKind::EnumBody => {
                let explicit = kids.take_flag(FactKind::Explicit);
                let enumerators = enumerators(&mut kids);
                bus.push(Fact::Def(DefKind::Enumeration(EnumDef {
                    enumerators,
                    explicit,
                    layout: None,
                })));
            }

            NodeKind::BitFieldBody(length) => {
                let mut def = BitFieldDef::new(length.unwrap_or(0));
                def.const_members = kids.take_flag(FactKind::ConstMembers);
                def.fields = fields(&mut kids);
                bus.push(Fact::Def(DefKind::BitField(def)));
            }

            NodeKind::AlternativeBody => {
                let ty = one_type(&mut kids, span)?;
                bus.push(Fact::Def(DefKind::Alternative(AlternativeDef { ty })));
            }

            NodeKind::ConstantBody => {
                let value = one_expr(&mut kids, span)?;
                let ty = opt_type(&mut kids);
                bus.push(Fact::Def(DefKind::Constant(ConstantDef {
                    ty,
                    value,
                    resolved: None,
                })));
            }

            NodeKind::GlobalBody => {
                let ty = one_type(&mut kids, span)?;
                bus.push(Fact::Def(DefKind::Global(GlobalDef { ty })));
            }

            NodeKind::Offset => {
                let value = one_expr(&mut kids, span)?;
                bus.push(Fact::Offset(value));
            }

            NodeKind::Enumerator(name) => {
                let noprefix = kids.take_flag(FactKind::Noprefix);
                let value = opt_expr(&mut kids);
                let mut e = Enumerator::new(name, value, span);
                e.noprefix = noprefix;
                bus.push(Fact::Enumerator(e));
            }

            NodeKind::Field(name) => {
                if has_object(&mut kids).is_some() {
                    return err!(span, AstError::ObjectInBitField);
                }
                let specifier = one_specifier(&mut kids, span)?;
                let ty = one_type(&mut kids, span)?;
                let default = opt_expr(&mut kids);
                bus.push(Fact::Field(BitFieldField {
                    name,
                    prefix: None,
                    ty: Some(ty),
                    specifier,
                    default,
                    is_ignore: false,
                    span,
                    mapping: None,
                }));
            }

            NodeKind::Reserved => {
                let specifier = one_specifier(&mut kids, span)?;
                let default = opt_expr(&mut kids);
                let name = self.strings.insert("unknown".into());
                bus.push(Fact::Field(BitFieldField {
                    name,
                    prefix: None,
                    ty: None,
                    specifier,
                    default,
                    is_ignore: true,
                    span,
                    mapping: None,
                }));
            }

            NodeKind::Delete(name) => bus.push(Fact::Delete { name, span }),

            NodeKind::Ranges { shift } => {
                let ranges = ranges(&mut kids);
                bus.push(Fact::Specifier(FieldSpecifier::Ranges { ranges, shift }));
            }
            NodeKind::Range(r) => bus.push(Fact::Range(r)),
            NodeKind::Auto { width } => {
                bus.push(Fact::Specifier(FieldSpecifier::Auto { width }))
            }
            NodeKind::Others => bus.push(Fact::Specifier(FieldSpecifier::Others)),

            NodeKind::Primitive(name) => {
                let mut ty = Type::primitive(name, span);
                ty.quals = quals(&mut kids);
                bus.push(Fact::Type(self.top.add_type(ty)));
            }

            NodeKind::Named { category, name } => {
                let mut ty = Type::named(category, name, span);
                ty.quals = quals(&mut kids);
                bus.push(Fact::Type(self.top.add_type(ty)));
            }

            NodeKind::Object(name) => {
                let noprefix = kids.take_flag(FactKind::Noprefix);
                let mut ty = Type::named(Category::Object, name, span);
                ty.quals = quals(&mut kids);
                bus.push(Fact::Type(self.top.add_type(ty)));
                bus.push(Fact::HasObject { noprefix });
            }

            NodeKind::Array => {
                let length = one_expr(&mut kids, span)?;
                let base = one_type(&mut kids, span)?;
                // an array of objects stores the exported type, the element
                // is not embedded
                has_object(&mut kids);
                let mut ty = Type::new(TypeKind::Array { base, length }, span);
                ty.quals = quals(&mut kids);
                bus.push(Fact::Type(self.top.add_type(ty)));
            }

            NodeKind::Pointer => {
                let pointee = one_type(&mut kids, span)?;
                // a pointed-to object is not embedded
                has_object(&mut kids);
                let mut ty = Type::new(TypeKind::Pointer { pointee }, span);
                ty.quals = quals(&mut kids);
                bus.push(Fact::Type(self.top.add_type(ty)));
            }

            NodeKind::Const => bus.push(Fact::Qualifier(Qualifier::Const)),
            NodeKind::Atomic => bus.push(Fact::Qualifier(Qualifier::Atomic)),
            NodeKind::Packed => bus.push(Fact::Qualifier(Qualifier::Packed)),
            NodeKind::Writeonly => bus.push(Fact::Qualifier(Qualifier::Writeonly)),
            NodeKind::Restrict => bus.push(Fact::Qualifier(Qualifier::Restrict)),
            NodeKind::Contained => bus.push(Fact::Qualifier(Qualifier::Contained)),
            NodeKind::Optimized => bus.push(Fact::Qualifier(Qualifier::Optimized)),
            NodeKind::Aligned => {
                let value = one_expr(&mut kids, span)?;
                bus.push(Fact::Qualifier(Qualifier::Aligned(value)));
            }
            NodeKind::Group(name) => bus.push(Fact::Qualifier(Qualifier::Group(name))),
            NodeKind::Lockable(name) => bus.push(Fact::Qualifier(Qualifier::Lockable(name))),

            NodeKind::Literal(v) => {
                bus.push(Fact::Expr(self.top.add_expr(Expr::literal(v, span))));
            }
            NodeKind::Name(name) => {
                let e = Expr::new(ExprKind::ConstRef { name, def: None }, span);
                bus.push(Fact::Expr(self.top.add_expr(e)));
            }
            NodeKind::Unary(op) => {
                let arg = one_expr(&mut kids, span)?;
                let e = Expr::new(ExprKind::Unary { op, arg }, span);
                bus.push(Fact::Expr(self.top.add_expr(e)));
            }
            NodeKind::Binary(op) => {
                let lhs = one_expr(&mut kids, span)?;
                let rhs = one_expr(&mut kids, span)?;
                let e = Expr::new(ExprKind::Binary { op, lhs, rhs }, span);
                bus.push(Fact::Expr(self.top.add_expr(e)));
            }
            NodeKind::Conditional => {
                let cond = one_expr(&mut kids, span)?;
                let then_expr = one_expr(&mut kids, span)?;
                let else_expr = one_expr(&mut kids, span)?;
                let e = Expr::new(
                    ExprKind::Conditional {
                        cond,
                        then_expr,
                        else_expr,
                    },
                    span,
                );
                bus.push(Fact::Expr(self.top.add_expr(e)));
            }
            NodeKind::TypeProp(prop) => {
                let ty = one_type(&mut kids, span)?;
                // a measured object is not embedded
                has_object(&mut kids);
                let e = Expr::new(ExprKind::TypeProp { prop, ty }, span);
                bus.push(Fact::Expr(self.top.add_expr(e)));
            }
        }

        bus.absorb(kids);
        Ok(())
    }

    /// Registers the file scope facts: definitions, extensions, and global
    /// declarations.
    fn finish(&mut self, mut bus: FactBus) -> AstResult<()> {
        for f in bus.take_all(FactKind::Definition) {
            if let Fact::Definition(d) = f {
                self.top.add_def(d);
            }
        }
        for f in bus.take_all(FactKind::Extension) {
            if let Fact::Extension(x) = f {
                self.top.add_extension(x);
            }
        }
        for m in members(&mut bus) {
            if m.offset.is_some() {
                return err!(m.span, AstError::OffsetAtFileScope);
            }
            let def = Definition::new(m.name, m.span, DefKind::Global(GlobalDef { ty: m.ty }));
            self.top.add_def(def);
        }

        let mut warned = Vec::new();
        for f in bus.facts() {
            let kind = f.kind();
            if !warned.contains(&kind) {
                warned.push(kind);
                warn!("dropping {:?} with no enclosing definition", kind);
            }
        }
        Ok(())
    }

    fn string(&self, id: StringId, span: Span) -> AstResult<String> {
        match self.strings.get(id) {
            Ok(s) => Ok(s),
            Err(_) => err!(span, AstError::StringNotFound),
        }
    }
}

fn missing(span: Span, what: &'static str) -> CompilerError<AstError> {
    CompilerError::new(span, AstError::Internal(what))
}

fn one_def(bus: &mut FactBus, span: Span) -> AstResult<DefKind> {
    match bus.take_one(FactKind::Def) {
        Some(Fact::Def(k)) => Ok(k),
        _ => Err(missing(span, "definition body")),
    }
}

fn opt_type(bus: &mut FactBus) -> Option<TypeId> {
    match bus.take_one(FactKind::Type) {
        Some(Fact::Type(t)) => Some(t),
        _ => None,
    }
}

fn one_type(bus: &mut FactBus, span: Span) -> AstResult<TypeId> {
    opt_type(bus).ok_or_else(|| missing(span, "type"))
}

fn opt_expr(bus: &mut FactBus) -> Option<ExprId> {
    match bus.take_one(FactKind::Expr) {
        Some(Fact::Expr(e)) => Some(e),
        _ => None,
    }
}

fn one_expr(bus: &mut FactBus, span: Span) -> AstResult<ExprId> {
    opt_expr(bus).ok_or_else(|| missing(span, "expression"))
}

fn one_specifier(bus: &mut FactBus, span: Span) -> AstResult<FieldSpecifier> {
    match bus.take_one(FactKind::Specifier) {
        Some(Fact::Specifier(s)) => Ok(s),
        _ => Err(missing(span, "field specifier")),
    }
}

fn offset(bus: &mut FactBus) -> Option<ExprId> {
    match bus.take_one(FactKind::Offset) {
        Some(Fact::Offset(e)) => Some(e),
        _ => None,
    }
}

fn module(bus: &mut FactBus) -> Option<StringId> {
    match bus.take_one(FactKind::Module) {
        Some(Fact::Module(m)) => Some(m),
        _ => None,
    }
}

fn has_object(bus: &mut FactBus) -> Option<bool> {
    match bus.take_one(FactKind::HasObject) {
        Some(Fact::HasObject { noprefix }) => Some(noprefix),
        _ => None,
    }
}

fn quals(bus: &mut FactBus) -> Vec<Qualifier> {
    bus.take_all(FactKind::Qualifier)
        .into_iter()
        .filter_map(|f| match f {
            Fact::Qualifier(q) => Some(q),
            _ => None,
        })
        .collect()
}

fn members(bus: &mut FactBus) -> Vec<Member> {
    bus.take_all(FactKind::Member)
        .into_iter()
        .filter_map(|f| match f {
            Fact::Member(m) => Some(m),
            _ => None,
        })
        .collect()
}

fn enumerators(bus: &mut FactBus) -> Vec<Enumerator> {
    bus.take_all(FactKind::Enumerator)
        .into_iter()
        .filter_map(|f| match f {
            Fact::Enumerator(e) => Some(e),
            _ => None,
        })
        .collect()
}

fn fields(bus: &mut FactBus) -> Vec<BitFieldField> {
    bus.take_all(FactKind::Field)
        .into_iter()
        .filter_map(|f| match f {
            Fact::Field(x) => Some(x),
            _ => None,
        })
        .collect()
}

fn deletes(bus: &mut FactBus) -> Vec<(StringId, Span)> {
    bus.take_all(FactKind::Delete)
        .into_iter()
        .filter_map(|f| match f {
            Fact::Delete { name, span } => Some((name, span)),
            _ => None,
        })
        .collect()
}

fn ranges(bus: &mut FactBus) -> Vec<BitRange> {
    bus.take_all(FactKind::Range)
        .into_iter()
        .filter_map(|f| match f {
            Fact::Range(r) => Some(r),
            _ => None,
        })
        .collect()
}
