//! Reference resolution.  Folds pending extensions into their target
//! definitions, links every named type and constant reference to the
//! definition of the matching category, and marks which objects need a
//! standalone C type.  Runs once, after all input modules are merged into a
//! single graph and before layout.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::compiler::ir::{
    BitFieldDef, Category, DefId, DefKind, ExprKind, Extension, ExtensionKind, Member, TopLevel,
    TypeId, TypeKind,
};
use crate::compiler::{CompilerDisplay, CompilerDisplayError, CompilerError, SourceMap, Span};
use crate::err;
use crate::{StringId, StringTable};

pub type ResolveResult<T> = Result<T, CompilerError<ResolveError>>;

/// Errors raised while linking references and folding extensions.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolveError {
    /// Two definitions with the same name and category.
    DuplicateDefinition { name: String, category: Category },

    /// A reference or extension target with no matching definition.
    /// References only match definitions of the same category.
    UnknownReference { name: String, category: Category },

    /// A bitfield extension deleting a member the base does not declare.
    UnknownDeleteMember { name: String },

    /// A [`StringId`] with no string behind it.
    StringNotFound,
}

impl CompilerDisplay for ResolveError {
    fn fmt(&self, _: &SourceMap, _: &StringTable) -> Result<String, CompilerDisplayError> {
        Ok(match self {
            ResolveError::DuplicateDefinition { name, category } => {
                format!("duplicate definition of {} {}", category, name)
            }
            ResolveError::UnknownReference { name, category } => {
                format!("failed to find a definition for {} {}", category, name)
            }
            ResolveError::UnknownDeleteMember { name } => {
                format!("cannot delete unknown member {}", name)
            }
            ResolveError::StringNotFound => "StringId not found".into(),
        })
    }
}

/// Resolves the merged graph in place: extensions are folded into their
/// targets, every `Named` type and `ConstRef` expression gets its `DefId`,
/// and object definitions learn whether they are ever used in a complex way.
pub fn resolve(top: &mut TopLevel, strings: &StringTable) -> ResolveResult<()> {
    let defs = index_definitions(top, strings)?;
    debug!("indexed {} definitions", defs.len());

    fold_extensions(top, &defs, strings)?;
    link_references(top, &defs, strings)?;
    mark_objects(top);
    Ok(())
}

/// Builds the `(name, category) → DefId` lookup table.  Categories keep
/// identically named definitions apart, so `structure foo` and `bitfield foo`
/// coexist; a second definition in the same category is an error.
fn index_definitions(
    top: &TopLevel,
    strings: &StringTable,
) -> ResolveResult<HashMap<(StringId, Category), DefId>> {
    let mut defs = HashMap::new();
    for (id, def) in top.defs() {
        let category = def.category();
        if defs.insert((def.name, category), id).is_some() {
            let name = string(strings, def.name, def.span)?;
            return err!(def.span, ResolveError::DuplicateDefinition { name, category });
        }
    }
    Ok(defs)
}

/// Folds every pending extension into its target definition, in registration
/// order.
fn fold_extensions(
    top: &mut TopLevel,
    defs: &HashMap<(StringId, Category), DefId>,
    strings: &StringTable,
) -> ResolveResult<()> {
    for ext in top.take_extensions() {
        let category = ext.category();
        let id = match defs.get(&(ext.target, category)) {
            Some(id) => *id,
            None => {
                let name = string(strings, ext.target, ext.span)?;
                return err!(ext.span, ResolveError::UnknownReference { name, category });
            }
        };
        apply(top, id, ext, strings)?;
    }
    Ok(())
}

fn apply(top: &mut TopLevel, id: DefId, ext: Extension, strings: &StringTable) -> ResolveResult<()> {
    let category = ext.category();
    let Extension {
        target,
        module,
        span,
        kind,
    } = ext;

    match (kind, &mut top.def_mut(id).kind) {
        (ExtensionKind::Structure { members }, DefKind::Structure(s)) => {
            append_members(&mut s.members, members, module)
        }
        (ExtensionKind::Object { members }, DefKind::Object { def, .. }) => {
            append_members(&mut def.members, members, module)
        }
        (ExtensionKind::Union { members }, DefKind::Union(u)) => {
            append_members(&mut u.members, members, module)
        }
        (ExtensionKind::Enumeration { enumerators }, DefKind::Enumeration(e)) => {
            e.enumerators.extend(enumerators)
        }
        (ExtensionKind::BitField { fields, deletes }, DefKind::BitField(b)) => {
            for name in deletes {
                delete_field(b, name, span, strings)?;
            }
            for mut f in fields {
                f.prefix = module;
                b.fields.push(f);
            }
        }
        // The index key includes the category, so a kind mismatch cannot
        // come out of the lookup.
        (_, _) => {
            let name = string(strings, target, span)?;
            return err!(span, ResolveError::UnknownReference { name, category });
        }
    }
    Ok(())
}

fn append_members(dst: &mut Vec<Member>, members: Vec<Member>, module: Option<StringId>) {
    for mut m in members {
        m.prefix = module;
        dst.push(m);
    }
}

/// Deletes a base field by name.  Fields that arrived through another
/// extension carry a module prefix and are not candidates.
fn delete_field(
    b: &mut BitFieldDef,
    name: StringId,
    span: Span,
    strings: &StringTable,
) -> ResolveResult<()> {
    match b
        .fields
        .iter()
        .position(|f| f.prefix.is_none() && f.name == name)
    {
        Some(i) => {
            b.fields.remove(i);
            Ok(())
        }
        None => {
            let name = string(strings, name, span)?;
            err!(span, ResolveError::UnknownDeleteMember { name })
        }
    }
}

/// Links every `Named` type node and `ConstRef` expression node to its
/// definition.
fn link_references(
    top: &mut TopLevel,
    defs: &HashMap<(StringId, Category), DefId>,
    strings: &StringTable,
) -> ResolveResult<()> {
    for id in top.type_ids() {
        let t = top.ty_mut(id);
        let span = t.span;
        if let TypeKind::Named { category, name, def } = &mut t.kind {
            match defs.get(&(*name, *category)) {
                Some(d) => *def = Some(*d),
                None => {
                    let category = *category;
                    let name = string(strings, *name, span)?;
                    return err!(span, ResolveError::UnknownReference { name, category });
                }
            }
        }
    }

    for id in top.expr_ids() {
        let e = top.expr_mut(id);
        let span = e.span;
        if let ExprKind::ConstRef { name, def } = &mut e.kind {
            match defs.get(&(*name, Category::Constant)) {
                Some(d) => *def = Some(*d),
                None => {
                    let name = string(strings, *name, span)?;
                    return err!(
                        span,
                        ResolveError::UnknownReference {
                            name,
                            category: Category::Constant,
                        }
                    );
                }
            }
        }
    }

    Ok(())
}

/// Marks object usage on the linked graph.
///
/// A member whose type is directly an object flattens into its aggregate
/// (`embed`).  An object referenced behind a pointer or array is stored as
/// real data there, so its C type must be emitted (`need_export`); an object
/// that is only ever flattened needs none, and one nobody references at all
/// stands alone and keeps its type.
fn mark_objects(top: &mut TopLevel) {
    let mut wrapped: HashSet<TypeId> = HashSet::new();
    for id in top.type_ids() {
        match top.ty(id).kind {
            TypeKind::Array { base, .. } => {
                wrapped.insert(base);
            }
            TypeKind::Pointer { pointee } => {
                wrapped.insert(pointee);
            }
            _ => {}
        }
    }

    let mut object_types = HashSet::new();
    let mut links: HashMap<DefId, bool> = HashMap::new();
    for id in top.type_ids() {
        if let TypeKind::Named {
            category: Category::Object,
            def: Some(d),
            ..
        } = top.ty(id).kind
        {
            object_types.insert(id);
            let complex = links.entry(d).or_insert(false);
            *complex |= wrapped.contains(&id);
        }
    }

    for id in top.def_ids() {
        if let DefKind::Object { need_export, .. } = &mut top.def_mut(id).kind {
            *need_export = match links.get(&id) {
                Some(complex) => *complex,
                None => true,
            };
        }
    }

    for id in top.def_ids() {
        let members = match &mut top.def_mut(id).kind {
            DefKind::Structure(s) => &mut s.members,
            DefKind::Object { def, .. } => &mut def.members,
            DefKind::Union(u) => &mut u.members,
            _ => continue,
        };
        for m in members {
            if object_types.contains(&m.ty) {
                m.embed = true;
            }
        }
    }
}

fn string(strings: &StringTable, id: StringId, span: Span) -> ResolveResult<String> {
    match strings.get(id) {
        Ok(s) => Ok(s),
        Err(_) => err!(span, ResolveError::StringNotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::{
        BitFieldField, EnumDef, Enumerator, FieldSpecifier, StructDef, Type, UnionDef,
    };
    use crate::compiler::layout::testutil::Builder;

    fn named(b: &mut Builder, category: Category, name: &str) -> TypeId {
        let n = b.name(name);
        b.top.add_type(Type::named(category, n, Span::zero()))
    }

    fn member(b: &mut Builder, name: &str, ty: TypeId) -> Member {
        Member::new(b.name(name), ty, Span::zero())
    }

    fn structure(b: &mut Builder, name: &str, members: Vec<Member>) -> DefId {
        b.def(
            name,
            DefKind::Structure(StructDef {
                members,
                layout: None,
            }),
        )
    }

    fn object(b: &mut Builder, name: &str, members: Vec<Member>) -> DefId {
        b.def(
            name,
            DefKind::Object {
                def: StructDef {
                    members,
                    layout: None,
                },
                need_export: true,
            },
        )
    }

    fn field(b: &mut Builder, name: &str, width: u64) -> BitFieldField {
        let ty = b.prim("uint8");
        BitFieldField {
            name: b.name(name),
            prefix: None,
            ty: Some(ty),
            specifier: FieldSpecifier::Auto { width: Some(width) },
            default: None,
            is_ignore: false,
            span: Span::zero(),
            mapping: None,
        }
    }

    fn extension(b: &mut Builder, target: &str, module: Option<&str>, kind: ExtensionKind) {
        let target = b.name(target);
        let module = module.map(|m| b.name(m));
        b.top.add_extension(Extension {
            target,
            module,
            span: Span::zero(),
            kind,
        });
    }

    #[test]
    fn named_references_link_to_their_definitions() {
        let mut b = Builder::new();
        let point = structure(&mut b, "point", vec![]);
        let ty = named(&mut b, Category::Structure, "point");

        let width = b.lit(4);
        let c = b.constant("width", width);
        let r = b.expr(ExprKind::ConstRef {
            name: b.name("width"),
            def: None,
        });

        resolve(&mut b.top, &b.strings).unwrap();

        match b.top.ty(ty).kind {
            TypeKind::Named { def, .. } => assert_eq!(def, Some(point)),
            ref k => panic!("expected named type, got {:?}", k),
        }
        match b.top.expr(r).kind {
            ExprKind::ConstRef { def, .. } => assert_eq!(def, Some(c)),
            ref k => panic!("expected constant reference, got {:?}", k),
        }
    }

    #[test]
    fn reference_category_must_match() {
        let mut b = Builder::new();
        structure(&mut b, "point", vec![]);
        named(&mut b, Category::Union, "point");

        let err = resolve(&mut b.top, &b.strings).unwrap_err();
        assert_eq!(
            *err.inner(),
            ResolveError::UnknownReference {
                name: "point".into(),
                category: Category::Union,
            }
        );
    }

    #[test]
    fn unknown_constant_reference_is_an_error() {
        let mut b = Builder::new();
        b.expr(ExprKind::ConstRef {
            name: b.name("missing"),
            def: None,
        });

        let err = resolve(&mut b.top, &b.strings).unwrap_err();
        assert_eq!(
            *err.inner(),
            ResolveError::UnknownReference {
                name: "missing".into(),
                category: Category::Constant,
            }
        );
    }

    #[test]
    fn duplicate_definitions_are_rejected() {
        let mut b = Builder::new();
        structure(&mut b, "point", vec![]);
        structure(&mut b, "point", vec![]);

        let err = resolve(&mut b.top, &b.strings).unwrap_err();
        assert_eq!(
            *err.inner(),
            ResolveError::DuplicateDefinition {
                name: "point".into(),
                category: Category::Structure,
            }
        );
    }

    #[test]
    fn same_name_in_another_category_is_allowed() {
        let mut b = Builder::new();
        let s = structure(&mut b, "point", vec![]);
        b.def(
            "point",
            DefKind::Union(UnionDef {
                members: vec![],
                layout: None,
            }),
        );
        let ty = named(&mut b, Category::Structure, "point");

        resolve(&mut b.top, &b.strings).unwrap();

        match b.top.ty(ty).kind {
            TypeKind::Named { def, .. } => assert_eq!(def, Some(s)),
            ref k => panic!("expected named type, got {:?}", k),
        }
    }

    #[test]
    fn structure_extensions_append_prefixed_members() {
        let mut b = Builder::new();
        let u8_a = b.prim("uint8");
        let u8_b = b.prim("uint8");
        let base = member(&mut b, "x", u8_a);
        let id = structure(&mut b, "point", vec![base]);

        let added = member(&mut b, "y", u8_b);
        extension(
            &mut b,
            "point",
            Some("net"),
            ExtensionKind::Structure {
                members: vec![added],
            },
        );

        resolve(&mut b.top, &b.strings).unwrap();

        match &b.top.def(id).kind {
            DefKind::Structure(s) => {
                assert_eq!(s.members.len(), 2);
                assert_eq!(s.members[0].prefix, None);
                assert_eq!(s.members[1].prefix, Some(b.name("net")));
            }
            k => panic!("expected structure, got {:?}", k),
        }
    }

    #[test]
    fn enumeration_extensions_append_enumerators() {
        let mut b = Builder::new();
        let first = Enumerator::new(b.name("ok"), None, Span::zero());
        let id = b.def(
            "status",
            DefKind::Enumeration(EnumDef {
                enumerators: vec![first],
                explicit: false,
                layout: None,
            }),
        );

        let added = Enumerator::new(b.name("busy"), None, Span::zero());
        extension(
            &mut b,
            "status",
            None,
            ExtensionKind::Enumeration {
                enumerators: vec![added],
            },
        );

        resolve(&mut b.top, &b.strings).unwrap();

        match &b.top.def(id).kind {
            DefKind::Enumeration(e) => {
                assert_eq!(e.enumerators.len(), 2);
                assert_eq!(b.strings.get(e.enumerators[1].name).unwrap(), "busy");
            }
            k => panic!("expected enumeration, got {:?}", k),
        }
    }

    #[test]
    fn bitfield_extension_deletes_and_adds_fields() {
        let mut b = Builder::new();
        let f_a = field(&mut b, "a", 4);
        let f_b = field(&mut b, "b", 4);
        let mut def = BitFieldDef::new(16);
        def.fields = vec![f_a, f_b];
        let id = b.def("flags", DefKind::BitField(def));

        let f_c = field(&mut b, "c", 4);
        let del = b.name("a");
        extension(
            &mut b,
            "flags",
            Some("virt"),
            ExtensionKind::BitField {
                fields: vec![f_c],
                deletes: vec![del],
            },
        );

        resolve(&mut b.top, &b.strings).unwrap();

        match &b.top.def(id).kind {
            DefKind::BitField(bf) => {
                assert_eq!(bf.fields.len(), 2);
                assert_eq!(b.strings.get(bf.fields[0].name).unwrap(), "b");
                assert_eq!(b.strings.get(bf.fields[1].name).unwrap(), "c");
                assert_eq!(bf.fields[1].prefix, Some(b.name("virt")));
            }
            k => panic!("expected bitfield, got {:?}", k),
        }
    }

    #[test]
    fn deleting_an_unknown_bitfield_member_is_an_error() {
        let mut b = Builder::new();
        b.def("flags", DefKind::BitField(BitFieldDef::new(16)));
        let del = b.name("ghost");
        extension(
            &mut b,
            "flags",
            None,
            ExtensionKind::BitField {
                fields: vec![],
                deletes: vec![del],
            },
        );

        let err = resolve(&mut b.top, &b.strings).unwrap_err();
        assert_eq!(
            *err.inner(),
            ResolveError::UnknownDeleteMember {
                name: "ghost".into()
            }
        );
    }

    #[test]
    fn deletes_only_reach_base_fields() {
        // a field added by one extension is not deletable by another
        let mut b = Builder::new();
        b.def("flags", DefKind::BitField(BitFieldDef::new(16)));

        let f = field(&mut b, "added", 4);
        extension(
            &mut b,
            "flags",
            Some("virt"),
            ExtensionKind::BitField {
                fields: vec![f],
                deletes: vec![],
            },
        );
        let del = b.name("added");
        extension(
            &mut b,
            "flags",
            None,
            ExtensionKind::BitField {
                fields: vec![],
                deletes: vec![del],
            },
        );

        let err = resolve(&mut b.top, &b.strings).unwrap_err();
        assert_eq!(
            *err.inner(),
            ResolveError::UnknownDeleteMember {
                name: "added".into()
            }
        );
    }

    #[test]
    fn extension_with_no_target_is_an_error() {
        let mut b = Builder::new();
        extension(
            &mut b,
            "missing",
            None,
            ExtensionKind::Structure { members: vec![] },
        );

        let err = resolve(&mut b.top, &b.strings).unwrap_err();
        assert_eq!(
            *err.inner(),
            ResolveError::UnknownReference {
                name: "missing".into(),
                category: Category::Structure,
            }
        );
    }

    #[test]
    fn embedded_objects_suppress_export() {
        let mut b = Builder::new();
        let u8_ty = b.prim("uint8");
        let m = member(&mut b, "count", u8_ty);
        let obj = object(&mut b, "regs", vec![m]);

        let obj_ty = named(&mut b, Category::Object, "regs");
        let dev_m = member(&mut b, "r", obj_ty);
        let dev = structure(&mut b, "dev", vec![dev_m]);

        resolve(&mut b.top, &b.strings).unwrap();

        match b.top.def(obj).kind {
            DefKind::Object { need_export, .. } => assert!(!need_export),
            ref k => panic!("expected object, got {:?}", k),
        }
        match &b.top.def(dev).kind {
            DefKind::Structure(s) => assert!(s.members[0].embed),
            k => panic!("expected structure, got {:?}", k),
        }
    }

    #[test]
    fn pointer_use_forces_export() {
        let mut b = Builder::new();
        let obj = object(&mut b, "regs", vec![]);

        let obj_ty = named(&mut b, Category::Object, "regs");
        let ptr = b.pointer(obj_ty);
        let dev_m = member(&mut b, "r", ptr);
        let dev = structure(&mut b, "dev", vec![dev_m]);

        resolve(&mut b.top, &b.strings).unwrap();

        match b.top.def(obj).kind {
            DefKind::Object { need_export, .. } => assert!(need_export),
            ref k => panic!("expected object, got {:?}", k),
        }
        match &b.top.def(dev).kind {
            DefKind::Structure(s) => assert!(!s.members[0].embed),
            k => panic!("expected structure, got {:?}", k),
        }
    }

    #[test]
    fn array_use_forces_export_even_when_also_embedded() {
        let mut b = Builder::new();
        let obj = object(&mut b, "regs", vec![]);

        let embed_ty = named(&mut b, Category::Object, "regs");
        let arr_base = named(&mut b, Category::Object, "regs");
        let arr = b.array(arr_base, 4);
        let m1 = member(&mut b, "one", embed_ty);
        let m2 = member(&mut b, "many", arr);
        structure(&mut b, "dev", vec![m1, m2]);

        resolve(&mut b.top, &b.strings).unwrap();

        match b.top.def(obj).kind {
            DefKind::Object { need_export, .. } => assert!(need_export),
            ref k => panic!("expected object, got {:?}", k),
        }
    }

    #[test]
    fn unreferenced_objects_keep_their_export() {
        let mut b = Builder::new();
        let obj = object(&mut b, "regs", vec![]);

        resolve(&mut b.top, &b.strings).unwrap();

        match b.top.def(obj).kind {
            DefKind::Object { need_export, .. } => assert!(need_export),
            ref k => panic!("expected object, got {:?}", k),
        }
    }
}
