//! Structure, object, and union layout.  Object members are flattened into
//! their enclosing aggregate before placement, so the layout loop only ever
//! sees a flat list of leaf members.

use std::cmp::Reverse;

use super::{Engine, LayoutError, LayoutResult};
use crate::compiler::ir::{
    Category, DefId, DefKind, ExprId, LayoutEntry, LayoutMember, Member, Qualifier, StructLayout,
    TopLevel, TypeId, TypeKind, UnionLayout,
};
use crate::compiler::Span;
use crate::err;

/// A leaf member after flattening: the fully prefixed name, the declared
/// type, and the fixed offset if one was written.
pub(super) struct FlatMember {
    pub name: String,
    pub ty: TypeId,
    pub offset: Option<ExprId>,
    pub span: Span,
}

fn members_of(top: &TopLevel, id: DefId) -> &[Member] {
    match &top.def(id).kind {
        DefKind::Structure(s) | DefKind::Object { def: s, .. } => &s.members,
        DefKind::Union(u) => &u.members,
        _ => &[],
    }
}

/// Flattens one declared member, expanding embedded objects recursively.
///
/// `chain` is the accumulated name prefix, without a trailing separator.
/// `nested` is true once inside an embedded object, where fixed offsets
/// are meaningless and rejected.
fn flatten_member(
    eng: &mut Engine,
    top: &TopLevel,
    m: &Member,
    chain: Option<&str>,
    nested: bool,
    stack: &mut Vec<DefId>,
    out: &mut Vec<FlatMember>,
) -> LayoutResult<()> {
    let base = eng.str(m.name, m.span)?;
    let with_module = match m.prefix {
        Some(p) => format!("{}_{}", eng.str(p, m.span)?, base),
        None => base,
    };
    let full = match chain {
        Some(c) => format!("{}_{}", c, with_module),
        None => with_module,
    };

    if !m.embed {
        if nested && m.offset.is_some() {
            return err!(m.span, LayoutError::FlattenedMemberOffset { name: full });
        }
        out.push(FlatMember {
            name: full,
            ty: m.ty,
            offset: m.offset,
            span: m.span,
        });
        return Ok(());
    }

    if m.offset.is_some() {
        return err!(m.span, LayoutError::ObjectMemberOffset { name: full });
    }

    let object = match top.ty(m.ty).kind {
        TypeKind::Named {
            def: Some(d),
            ..
        } => d,
        TypeKind::Named {
            def: None,
            name,
            category,
        } => {
            let name = eng.str(name, m.span)?;
            return err!(m.span, LayoutError::Unresolved { name, category });
        }
        _ => return err!(m.span, LayoutError::NotAType { name: full }),
    };

    if stack.contains(&object) {
        return err!(m.span, LayoutError::Circular { name: full });
    }

    let inner_chain = if m.noprefix {
        chain.map(str::to_string)
    } else {
        Some(full)
    };

    stack.push(object);
    for inner in members_of(top, object) {
        flatten_member(eng, top, inner, inner_chain.as_deref(), true, stack, out)?;
    }
    stack.pop();
    Ok(())
}

/// Flattens every member of the aggregate `id` into leaf members.
pub(super) fn flatten(eng: &mut Engine, top: &TopLevel, id: DefId) -> LayoutResult<Vec<FlatMember>> {
    let mut out = Vec::new();
    let mut stack = vec![id];
    for m in members_of(top, id) {
        flatten_member(eng, top, m, None, false, &mut stack, &mut out)?;
    }
    Ok(out)
}

fn group_of(eng: &Engine, top: &TopLevel, ty: TypeId, span: Span) -> LayoutResult<String> {
    for q in &top.ty(ty).quals {
        if let Qualifier::Group(g) = q {
            return eng.str(*g, span);
        }
    }
    Ok(String::new())
}

pub(super) fn layout_struct(
    eng: &mut Engine,
    top: &TopLevel,
    id: DefId,
) -> LayoutResult<StructLayout> {
    let def = top.def(id);
    let span = def.span;
    let packed = def.is_packed();
    let optimized = def.is_optimized();
    let def_quals = def.quals.clone();

    let flat = flatten(eng, top, id)?;

    // Pair each member with its size and alignment up front; the optimized
    // ordering needs the alignments before placement starts.
    let mut members = Vec::with_capacity(flat.len());
    for fm in flat {
        let size = eng.type_size(top, fm.ty)?;
        let align = eng.type_align(top, fm.ty)?;
        let group = group_of(eng, top, fm.ty, fm.span)?;
        members.push((fm, size, align, group));
    }

    if optimized {
        // Keep members of one ownership group together, largest alignment
        // first within the group.  The sort is stable, so declaration order
        // breaks ties.
        members.sort_by(|a, b| (&a.3, Reverse(a.2)).cmp(&(&b.3, Reverse(b.2))));
    }

    let mut entries = Vec::new();
    let mut offset = 0u64;
    let mut max_align = 1u64;

    for (fm, size, align, _) in members {
        let mut fixed = false;
        if let Some(e) = fm.offset {
            let pos = eng.eval(top, e)?;
            if pos < offset as i128 {
                return err!(
                    fm.span,
                    LayoutError::FixedOffsetBackwards {
                        name: fm.name,
                        offset: pos,
                        cursor: offset,
                    }
                );
            }
            let pos = pos as u64;
            if pos > offset {
                entries.push(LayoutMember {
                    name: format!("pad_to_{}_", fm.name),
                    entry: LayoutEntry::Padding(pos - offset),
                    offset,
                });
                offset = pos;
            }
            fixed = true;
        }

        if !packed {
            let placed = eng
                .abi()
                .layout_struct_member(offset, max_align, Some(size), align);
            if placed > offset {
                if fixed {
                    return err!(
                        fm.span,
                        LayoutError::PaddingAfterFixedOffset {
                            name: fm.name,
                            bytes: placed - offset,
                        }
                    );
                }
                entries.push(LayoutMember {
                    name: format!("pad_to_{}_", fm.name),
                    entry: LayoutEntry::Padding(placed - offset),
                    offset,
                });
                offset = placed;
            }
        }

        entries.push(LayoutMember {
            name: fm.name,
            entry: LayoutEntry::Field(fm.ty),
            offset,
        });
        offset += size;
        max_align = max_align.max(align);
    }

    let quals_align = eng.aligned_quals(top, &def_quals, span)?;

    if offset == 0 {
        // An aggregate whose members all flattened away produces no
        // storage.
        return Ok(StructLayout {
            entries,
            size: 0,
            align: quals_align.unwrap_or(1),
        });
    }

    if !packed {
        let end_align = max_align.max(quals_align.unwrap_or(1));
        let end = eng.abi().layout_struct_member(offset, end_align, None, 0);
        if end > offset {
            entries.push(LayoutMember {
                name: "pad_end_".into(),
                entry: LayoutEntry::Padding(end - offset),
                offset,
            });
            offset = end;
        }
    }

    // The alignment seen by enclosing aggregates: an aligned qualifier on
    // the definition wins outright, a packed definition packs down to one.
    let align = match quals_align {
        Some(a) => a,
        None if packed => 1,
        None => max_align,
    };

    Ok(StructLayout {
        entries,
        size: offset,
        align,
    })
}

pub(super) fn layout_union(
    eng: &mut Engine,
    top: &TopLevel,
    id: DefId,
) -> LayoutResult<UnionLayout> {
    let def = top.def(id);
    let span = def.span;
    let def_quals = def.quals.clone();
    let name = eng.str(def.name, span)?;

    let declared = match &def.kind {
        DefKind::Union(u) => &u.members[..],
        _ => &[],
    };

    let mut entries = Vec::new();
    let mut size = 0u64;
    let mut member_align = 1u64;

    for m in declared {
        let mut out = Vec::new();
        let mut stack = vec![id];
        flatten_member(eng, top, m, None, false, &mut stack, &mut out)?;

        if out.len() > 1 {
            let name = eng.str(m.name, m.span)?;
            return err!(m.span, LayoutError::UnionFlattenedObject { name });
        }

        for fm in out {
            if let Some(e) = fm.offset {
                if eng.eval(top, e)? != 0 {
                    return err!(fm.span, LayoutError::UnionMemberOffset { name: fm.name });
                }
            }
            size = size.max(eng.type_size(top, fm.ty)?);
            member_align = member_align.max(eng.type_align(top, fm.ty)?);
            entries.push(LayoutMember {
                name: fm.name,
                entry: LayoutEntry::Field(fm.ty),
                offset: 0,
            });
        }
    }

    if entries.is_empty() {
        return err!(
            span,
            LayoutError::Empty {
                name,
                category: Category::Union,
            }
        );
    }

    let align = member_align.max(eng.aligned_quals(top, &def_quals, span)?.unwrap_or(1));

    Ok(UnionLayout {
        entries,
        size,
        align,
    })
}
