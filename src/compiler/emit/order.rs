//! The order definitions appear in the generated C.
//!
//! C requires a type to be complete wherever it is contained by value, so
//! the emitter sorts definitions by name for stable output and then visits
//! each one's by-value dependencies depth first.  Pointers and the types
//! behind them stay out of the dependency set since a forward declaration
//! satisfies the compiler.

use std::collections::HashSet;

use crate::compiler::ir::{DefId, DefKind, TopLevel, TypeId, TypeKind};
use crate::err;
use crate::StringTable;

use super::{EmitError, EmitResult};

/// Collects every definition `ty` contains by value.  Atomic pointees are
/// the one pointer exception: clang requires them to be complete even
/// behind a pointer.
fn type_deps(top: &TopLevel, ty: TypeId, out: &mut Vec<DefId>) {
    match top.ty(ty).kind {
        TypeKind::Primitive(_) => {}
        TypeKind::Named { def, .. } => out.extend(def),
        TypeKind::Array { base, .. } => type_deps(top, base, out),
        TypeKind::Pointer { pointee } => {
            if top.ty(pointee).is_atomic() {
                type_deps(top, pointee, out);
            }
        }
    }
}

/// The definitions which must be emitted before `id`.
pub(super) fn dependencies(top: &TopLevel, id: DefId) -> Vec<DefId> {
    let mut out = Vec::new();
    match &top.def(id).kind {
        DefKind::Structure(s) | DefKind::Object { def: s, .. } => {
            for m in &s.members {
                type_deps(top, m.ty, &mut out);
            }
        }
        DefKind::Union(u) => {
            for m in &u.members {
                type_deps(top, m.ty, &mut out);
            }
        }
        DefKind::Enumeration(_) => {}
        DefKind::BitField(b) => {
            for f in &b.fields {
                if let Some(ty) = f.ty {
                    type_deps(top, ty, &mut out);
                }
            }
        }
        DefKind::Alternative(a) => type_deps(top, a.ty, &mut out),
        DefKind::Constant(c) => {
            if let Some(ty) = c.ty {
                type_deps(top, ty, &mut out);
            }
        }
        DefKind::Global(g) => type_deps(top, g.ty, &mut out),
    }
    out
}

/// Orders every definition so that each is preceded by everything it
/// contains by value.  The outer walk runs over definitions sorted by name,
/// which pins the order of independent definitions across runs.
pub fn emission_order(top: &TopLevel, strings: &StringTable) -> EmitResult<Vec<DefId>> {
    let mut named = Vec::new();
    for (id, def) in top.defs() {
        match strings.get(def.name) {
            Ok(name) => named.push((name, id)),
            Err(_) => return err!(def.span, EmitError::StringNotFound),
        }
    }
    named.sort();

    let mut seen = HashSet::new();
    let mut order = Vec::new();
    for (_, id) in named {
        visit(top, id, &mut seen, &mut order);
    }
    Ok(order)
}

fn visit(top: &TopLevel, id: DefId, seen: &mut HashSet<DefId>, order: &mut Vec<DefId>) {
    if !seen.insert(id) {
        return;
    }
    for dep in dependencies(top, id) {
        visit(top, dep, seen, order);
    }
    order.push(id);
}
