//! Rendering the laid out graph as C source text.

use crate::compiler::abi::Abi;
use crate::compiler::ir::{
    primitive_c_name, BitFieldDef, ConstantDef, DefId, DefKind, Definition, EnumDef, Enumerator,
    ExprId, LayoutEntry, LayoutMember, Qualifier, TopLevel, TypeId, TypeKind,
};
use crate::compiler::Span;
use crate::err;
use crate::{StringId, StringTable};

use super::order::emission_order;
use super::{EmitError, EmitResult};

const HEADER: &str = "\
// Automatically generated. Do not modify.

#include <stddef.h>
#include <stdint.h>
#include <stdbool.h>
#include <stdalign.h>
#include <stdatomic.h>

#include <typegen-result.h>
";

/// Renders the resolved, laid out graph as one C translation unit.
///
/// The output has four parts: a fixed header, forward declarations for
/// every aggregate, definition bodies in dependency order, and result
/// wrapper declarations.  `public_only` restricts everything but the
/// header to definitions marked public.
pub fn generate(
    top: &TopLevel,
    abi: &dyn Abi,
    strings: &StringTable,
    public_only: bool,
) -> EmitResult<String> {
    let order = emission_order(top, strings)?;
    let gen = CodeGen {
        top,
        abi,
        strings,
        public_only,
    };

    let mut out = String::from(HEADER);
    out.push('\n');

    for &id in &order {
        gen.forward_decl(&mut out, id)?;
    }
    out.push('\n');

    for &id in &order {
        gen.body(&mut out, id)?;
    }

    out.push_str("#pragma clang diagnostic push\n");
    out.push_str("#pragma clang diagnostic ignored \"-Wpadded\"\n\n");
    gen.primitive_results(&mut out);
    for &id in &order {
        gen.result_decls(&mut out, id)?;
    }
    out.push_str("\n#pragma clang diagnostic pop\n");

    Ok(out)
}

struct CodeGen<'a> {
    top: &'a TopLevel,
    abi: &'a dyn Abi,
    strings: &'a StringTable,
    public_only: bool,
}

impl<'a> CodeGen<'a> {
    fn skipped(&self, def: &Definition) -> bool {
        self.public_only && !def.public
    }

    /// Typedefs the C tag name of every aggregate up front, so pointer
    /// members can reference types whose bodies come later.
    fn forward_decl(&self, out: &mut String, id: DefId) -> EmitResult<()> {
        let def = self.top.def(id);
        if self.skipped(def) {
            return Ok(());
        }
        let tag = match &def.kind {
            DefKind::Structure(_) | DefKind::Object { .. } => "struct",
            DefKind::Union(_) => "union",
            _ => return Ok(()),
        };

        let mut quals = String::new();
        for q in &def.quals {
            match *q {
                Qualifier::Atomic => quals.push_str("_Atomic "),
                Qualifier::Const => quals.push_str("const "),
                Qualifier::Packed if tag == "struct" => {}
                Qualifier::Aligned(_)
                | Qualifier::Optimized
                | Qualifier::Group(_)
                | Qualifier::Lockable(_) => {}
                q => return self.invalid(def, q),
            }
        }

        let name = self.str(def.name, def.span)?;
        out.push_str(&format!("typedef {}{} {} {}_t;\n", quals, tag, name, name));
        Ok(())
    }

    fn body(&self, out: &mut String, id: DefId) -> EmitResult<()> {
        let def = self.top.def(id);
        if self.skipped(def) {
            return Ok(());
        }
        match &def.kind {
            DefKind::Structure(s) => {
                let layout = self.layout(def, s.layout.as_ref().map(|l| &l.entries))?;
                self.aggregate(out, def, "struct", layout)
            }
            DefKind::Object { def: s, need_export } => {
                if !*need_export {
                    return Ok(());
                }
                let layout = self.layout(def, s.layout.as_ref().map(|l| &l.entries))?;
                self.aggregate(out, def, "struct", layout)
            }
            DefKind::Union(u) => {
                let layout = self.layout(def, u.layout.as_ref().map(|l| &l.entries))?;
                self.aggregate(out, def, "union", layout)
            }
            DefKind::Enumeration(e) => self.enumeration(out, def, e),
            DefKind::BitField(b) => self.bitfield(out, def, b),
            DefKind::Alternative(a) => {
                let name = self.str(def.name, def.span)?;
                let (l, r) = self.type_expr(a.ty)?;
                out.push_str(&format!("typedef {};\n\n", declaration(&l, &name, &r)));
                Ok(())
            }
            DefKind::Constant(c) => self.constant(out, def, c),
            DefKind::Global(g) => {
                let name = self.str(def.name, def.span)?;
                let (l, r) = self.type_expr(g.ty)?;
                out.push_str(&format!("extern {};\n\n", declaration(&l, &name, &r)));
                Ok(())
            }
        }
    }

    fn layout<'b>(
        &self,
        def: &Definition,
        entries: Option<&'b Vec<LayoutMember>>,
    ) -> EmitResult<&'b [LayoutMember]> {
        match entries {
            Some(e) => Ok(e),
            None => {
                let name = self.str(def.name, def.span)?;
                err!(def.span, EmitError::MissingLayout { name })
            }
        }
    }

    fn aggregate(
        &self,
        out: &mut String,
        def: &Definition,
        tag: &str,
        entries: &[LayoutMember],
    ) -> EmitResult<()> {
        // zero members after flattening means the type owns no storage
        if entries.is_empty() {
            return Ok(());
        }

        let mut packed = "";
        let mut align = None;
        for q in &def.quals {
            match *q {
                Qualifier::Packed if tag == "struct" => packed = "__attribute__((packed)) ",
                Qualifier::Aligned(e) => align = Some(self.value(e, def.span)?),
                Qualifier::Atomic
                | Qualifier::Const
                | Qualifier::Optimized
                | Qualifier::Group(_)
                | Qualifier::Lockable(_) => {}
                q => return self.invalid(def, q),
            }
        }

        let name = self.str(def.name, def.span)?;
        out.push_str(&format!("{} {}{} {{\n", tag, packed, name));
        for (i, m) in entries.iter().enumerate() {
            out.push('\t');
            if i == 0 {
                if let Some(n) = align {
                    out.push_str(&format!("alignas({}) ", n));
                }
            }
            match m.entry {
                LayoutEntry::Field(ty) => {
                    let (l, r) = self.type_expr(ty)?;
                    out.push_str(&declaration(&l, &m.name, &r));
                }
                LayoutEntry::Padding(bytes) => {
                    out.push_str(&format!("uint8_t {}[{}]", m.name, bytes));
                }
            }
            out.push_str(";\n");
        }
        out.push_str("};\n\n");
        Ok(())
    }

    fn enumeration(&self, out: &mut String, def: &Definition, e: &EnumDef) -> EmitResult<()> {
        let name = self.str(def.name, def.span)?;
        let layout = match &e.layout {
            Some(l) => l,
            None => return err!(def.span, EmitError::MissingLayout { name }),
        };

        let mut sorted: Vec<&Enumerator> = e.enumerators.iter().collect();
        sorted.sort_by_key(|en| en.resolved);

        let mut lines = Vec::new();
        for en in sorted {
            let v = match en.resolved {
                Some(v) => v,
                None => return err!(en.span, EmitError::Unevaluated),
            };
            lines.push(format!("\t{} = {}", self.enumerator_name(&name, en)?, v));
        }
        out.push_str(&format!(
            "typedef enum {} {{\n{}\n}} {}_t;\n\n",
            name,
            lines.join(",\n"),
            name
        ));

        let upper = name.to_uppercase();
        let max = self.extreme(&name, e, layout.max_name, def.span)?;
        let min = self.extreme(&name, e, layout.min_name, def.span)?;
        out.push_str(&format!("#define {}__MAX ({})\n", upper, max));
        out.push_str(&format!("#define {}__MIN ({})\n\n", upper, min));
        Ok(())
    }

    /// The C spelling of an enumerator: prefixed by the enumeration's name
    /// and upper cased, unless the enumerator opted out of the prefix.
    fn enumerator_name(&self, enum_name: &str, e: &Enumerator) -> EmitResult<String> {
        let n = self.str(e.name, e.span)?;
        Ok(if e.noprefix {
            n.to_uppercase()
        } else {
            format!("{}_{}", enum_name, n).to_uppercase()
        })
    }

    fn extreme(
        &self,
        enum_name: &str,
        e: &EnumDef,
        which: StringId,
        span: Span,
    ) -> EmitResult<String> {
        match e.enumerators.iter().find(|en| en.name == which) {
            Some(en) => self.enumerator_name(enum_name, en),
            None => err!(
                span,
                EmitError::Internal("enum extreme names a missing enumerator")
            ),
        }
    }

    fn bitfield(&self, out: &mut String, def: &Definition, b: &BitFieldDef) -> EmitResult<()> {
        let name = self.str(def.name, def.span)?;
        let layout = match &b.layout {
            Some(l) => l,
            None => return err!(def.span, EmitError::MissingLayout { name }),
        };

        out.push_str(&format!(
            "typedef struct {} {{\n\t{} bf[{}];\n}} {}_t;\n\n",
            name,
            layout.unit_type(),
            layout.unit_count,
            name
        ));
        out.push_str(&format!(
            "#define {}_default() ({}_t){{ .bf = {{ {} }} }}\n",
            name,
            name,
            hex_units(&layout.init_values)
        ));
        out.push_str(&format!(
            "#define {}_compare_mask() ({}_t){{ .bf = {{ {} }} }}\n\n",
            name,
            name,
            hex_units(&layout.compare_masks)
        ));
        Ok(())
    }

    fn constant(&self, out: &mut String, def: &Definition, c: &ConstantDef) -> EmitResult<()> {
        let name = self.str(def.name, def.span)?;
        let mut value = match c.resolved {
            Some(v) => v,
            None => return err!(def.span, EmitError::Unevaluated),
        };

        let (cast, suffix) = match c.ty {
            Some(ty) => {
                let (l, _) = self.type_expr(ty)?;
                let signed = self.type_signed(ty)?;
                if value < 0 && !signed {
                    let bits = self.type_size(ty)? * 8;
                    value &= (1i128 << bits) - 1;
                }
                (format!("({})", l), if signed { "" } else { "U" })
            }
            None => (String::new(), ""),
        };
        out.push_str(&format!("#define {} {}{}{}\n\n", name, cast, value, suffix));
        Ok(())
    }

    /// The C rendering of a type as the (left, right) halves around a
    /// declared name: `uint32_t (*` and `)[4]` for a pointer to an array.
    fn type_expr(&self, id: TypeId) -> EmitResult<(String, String)> {
        let ty = self.top.ty(id);
        match ty.kind {
            TypeKind::Primitive(name) => {
                let c = self.primitive(name, ty.span)?;
                let l = self.qualify(c.to_string(), &ty.quals, false, ty.span)?;
                Ok((l, String::new()))
            }
            TypeKind::Named { name, .. } => {
                let n = self.str(name, ty.span)?;
                let l = self.qualify(format!("{}_t", n), &ty.quals, false, ty.span)?;
                Ok((l, String::new()))
            }
            TypeKind::Array { base, length } => {
                let (l, r) = self.type_expr(base)?;
                let n = self.value(length, ty.span)?;
                Ok((l, format!("[{}]{}", n, r)))
            }
            TypeKind::Pointer { pointee } => {
                let (l, r) = self.type_expr(pointee)?;
                let star = self.qualify("*".to_string(), &ty.quals, true, ty.span)?;
                // pointers to arrays bind the name inside parentheses
                if matches!(self.top.ty(pointee).kind, TypeKind::Array { .. }) {
                    Ok((format!("{} ({}", l, star), format!("){}", r)))
                } else {
                    Ok((format!("{} {}", l, star), r))
                }
            }
        }
    }

    /// Appends the C spelling of member level qualifiers to a rendered type.
    fn qualify(
        &self,
        base: String,
        quals: &[Qualifier],
        pointer: bool,
        span: Span,
    ) -> EmitResult<String> {
        let mut s = base;
        for q in quals {
            match *q {
                Qualifier::Const => s.push_str(" const"),
                Qualifier::Atomic => s.push_str(" _Atomic"),
                Qualifier::Restrict if pointer => s.push_str(" restrict"),
                Qualifier::Restrict => return err!(span, EmitError::RestrictNonPointer),
                Qualifier::Aligned(e) => {
                    let v = self.value(e, span)?;
                    s.push_str(&format!(" alignas({})", v));
                }
                Qualifier::Writeonly
                | Qualifier::Contained
                | Qualifier::Packed
                | Qualifier::Optimized
                | Qualifier::Group(_)
                | Qualifier::Lockable(_) => {}
            }
        }
        Ok(s)
    }

    /// The emitted C name of a primitive, with ABI alias names mapped to
    /// their concrete fixed width types.
    fn primitive(&self, name: StringId, span: Span) -> EmitResult<&'static str> {
        let dsl = self.str(name, span)?;
        let c = match primitive_c_name(&dsl) {
            Some(c) => c,
            None => return err!(span, EmitError::UnknownPrimitive { name: dsl }),
        };
        Ok(self.abi.map_type_name(c).unwrap_or(c))
    }

    fn type_signed(&self, id: TypeId) -> EmitResult<bool> {
        let ty = self.top.ty(id);
        match ty.kind {
            TypeKind::Primitive(name) => Ok(self.primitive_ctype(name, ty.span)?.signed),
            TypeKind::Named { def, name, .. } => {
                let d = self.resolved_def(def, name, ty.span)?;
                match &d.kind {
                    DefKind::Enumeration(e) => match &e.layout {
                        Some(l) => Ok(l.signed),
                        None => {
                            let n = self.str(d.name, d.span)?;
                            err!(ty.span, EmitError::MissingLayout { name: n })
                        }
                    },
                    DefKind::Alternative(a) => self.type_signed(a.ty),
                    _ => Ok(false),
                }
            }
            TypeKind::Array { .. } | TypeKind::Pointer { .. } => Ok(false),
        }
    }

    fn type_size(&self, id: TypeId) -> EmitResult<u64> {
        let ty = self.top.ty(id);
        match ty.kind {
            TypeKind::Primitive(name) => Ok(self.primitive_ctype(name, ty.span)?.size),
            TypeKind::Named { def, name, .. } => {
                let d = self.resolved_def(def, name, ty.span)?;
                let size = match &d.kind {
                    DefKind::Structure(s) => s.layout.as_ref().map(|l| l.size),
                    DefKind::Object { def: s, .. } => s.layout.as_ref().map(|l| l.size),
                    DefKind::Union(u) => u.layout.as_ref().map(|l| l.size),
                    DefKind::Enumeration(e) => e.layout.as_ref().map(|l| l.size),
                    DefKind::BitField(b) => {
                        b.layout.as_ref().map(|l| l.unit_size / 8 * l.unit_count)
                    }
                    DefKind::Alternative(a) => return self.type_size(a.ty),
                    DefKind::Constant(_) | DefKind::Global(_) => {
                        return err!(ty.span, EmitError::Internal("value used as a type"));
                    }
                };
                match size {
                    Some(s) => Ok(s),
                    None => {
                        let n = self.str(d.name, d.span)?;
                        err!(ty.span, EmitError::MissingLayout { name: n })
                    }
                }
            }
            TypeKind::Array { base, length } => {
                let n = self.value(length, ty.span)?;
                Ok(self.type_size(base)? * n as u64)
            }
            TypeKind::Pointer { .. } => Ok(self.abi.pointer_size()),
        }
    }

    fn primitive_ctype(
        &self,
        name: StringId,
        span: Span,
    ) -> EmitResult<crate::compiler::abi::CType> {
        let dsl = self.str(name, span)?;
        let c = match primitive_c_name(&dsl) {
            Some(c) => c,
            None => return err!(span, EmitError::UnknownPrimitive { name: dsl }),
        };
        match self.abi.c_type(c) {
            Ok(t) => Ok(*t),
            Err(_) => err!(span, EmitError::UnknownPrimitive { name: dsl }),
        }
    }

    fn resolved_def(
        &self,
        def: Option<DefId>,
        name: StringId,
        span: Span,
    ) -> EmitResult<&Definition> {
        match def {
            Some(d) => Ok(self.top.def(d)),
            None => {
                let n = self.str(name, span)?;
                err!(span, EmitError::Unresolved { name: n })
            }
        }
    }

    /// Result wrapper declarations for every primitive scalar, emitted once
    /// regardless of which primitives the source mentions.
    fn primitive_results(&self, out: &mut String) {
        for &name in crate::compiler::ir::PRIMITIVE_NAMES {
            let c = primitive_c_name(name).unwrap_or(name);
            let c = self.abi.map_type_name(c).unwrap_or(c);
            out.push_str(&format!("TYPEGEN_DECLARE_RESULT_({}, {})\n", name, c));
            out.push_str(&format!("TYPEGEN_DECLARE_RESULT_PTR_({}, {})\n", name, c));
        }
        out.push_str("TYPEGEN_DECLARE_RESULT_PTR_(void, void)\n");
    }

    fn result_decls(&self, out: &mut String, id: DefId) -> EmitResult<()> {
        let def = self.top.def(id);
        if self.skipped(def) {
            return Ok(());
        }
        let name = self.str(def.name, def.span)?;
        match &def.kind {
            DefKind::Structure(_)
            | DefKind::Union(_)
            | DefKind::Enumeration(_)
            | DefKind::BitField(_) => {
                out.push_str(&format!("TYPEGEN_DECLARE_RESULT({})\n", name));
                out.push_str(&format!("TYPEGEN_DECLARE_RESULT_PTR({})\n", name));
            }
            DefKind::Object { need_export, .. } => {
                if *need_export {
                    out.push_str(&format!("TYPEGEN_DECLARE_RESULT({})\n", name));
                    out.push_str(&format!("TYPEGEN_DECLARE_RESULT_PTR({})\n", name));
                }
            }
            DefKind::Alternative(a) => {
                let base = name.strip_suffix("_t").unwrap_or(&name);
                if !matches!(self.top.ty(a.ty).kind, TypeKind::Array { .. }) {
                    out.push_str(&format!("TYPEGEN_DECLARE_RESULT({})\n", base));
                }
                out.push_str(&format!("TYPEGEN_DECLARE_RESULT_PTR({})\n", base));
            }
            DefKind::Constant(_) | DefKind::Global(_) => {}
        }
        Ok(())
    }

    fn value(&self, id: ExprId, span: Span) -> EmitResult<i128> {
        match self.top.expr(id).resolved {
            Some(v) => Ok(v),
            None => err!(span, EmitError::Unevaluated),
        }
    }

    fn invalid(&self, def: &Definition, q: Qualifier) -> EmitResult<()> {
        err!(
            def.span,
            EmitError::InvalidQualifier {
                qual: q.name(),
                category: def.category(),
            }
        )
    }

    fn str(&self, id: StringId, span: Span) -> EmitResult<String> {
        match self.strings.get(id) {
            Ok(s) => Ok(s),
            Err(_) => err!(span, EmitError::StringNotFound),
        }
    }
}

/// Joins the halves of a rendered type around a declared name.
fn declaration(left: &str, name: &str, right: &str) -> String {
    let sep = if left.ends_with('*') { "" } else { " " };
    format!("{}{}{}{}", left, sep, name, right)
}

fn hex_units(units: &[u64]) -> String {
    units
        .iter()
        .map(|u| format!("0x{:x}U", u))
        .collect::<Vec<_>>()
        .join(", ")
}
