//! ABI driven layout.  Walks the resolved IR graph, evaluates every constant
//! expression, and computes the size, alignment, offsets, and bit mappings of
//! every definition.  Results are collected in an [`Engine`] keyed by handle
//! and written back into the graph at the end, so a failed layout never
//! leaves the IR half updated.

use std::collections::{HashMap, HashSet};

use crate::compiler::abi::{Abi, AbiError, CType};
use crate::compiler::ir::{
    BinaryOp, BitFieldLayout, Category, DefId, DefKind, EnumLayout, ExprId, ExprKind, FieldMapping,
    Qualifier, StructLayout, TopLevel, TypeId, TypeKind, TypeProp, UnaryOp, UnionLayout,
};
use crate::compiler::{CompilerDisplay, CompilerDisplayError, CompilerError, SourceMap, Span};
use crate::err;
use crate::{StringId, StringTable};

mod bitfield;
mod enumeration;
mod ranges;
mod structure;

pub use ranges::RangeCollector;

pub type LayoutResult<T> = Result<T, CompilerError<LayoutError>>;

/// Errors raised while evaluating constant expressions or computing layouts.
/// Member names are stored fully flattened, as the user will see them in the
/// generated code.
#[derive(Clone, Debug, PartialEq)]
pub enum LayoutError {
    /// A named reference the resolver never linked to a definition.
    Unresolved { name: String, category: Category },

    /// A definition whose layout depends on its own layout.
    Circular { name: String },

    /// A constant whose value depends on its own value.
    SelfReferentialConstant { name: String },

    /// A constant or global was used where a type is required.
    NotAType { name: String },

    /// A scalar query (signedness, value range) on an aggregate type.
    NonScalar,

    /// A primitive type name with no C equivalent.  The parser only admits
    /// known primitives, so hitting this is a compiler bug surfaced politely.
    UnknownPrimitive { name: String },

    DivisionByZero,
    Overflow,
    ShiftOutOfRange { by: i128 },
    NegativeArrayLength { length: i128 },
    BadAlignment { value: i128 },

    /// A fixed member offset behind the current layout cursor.
    FixedOffsetBackwards { name: String, offset: i128, cursor: u64 },

    /// A member placed at a fixed offset would need padding inserted after
    /// it to satisfy the next member's alignment.
    PaddingAfterFixedOffset { name: String, bytes: u64 },

    ObjectMemberOffset { name: String },
    FlattenedMemberOffset { name: String },
    UnionMemberOffset { name: String },
    UnionFlattenedObject { name: String },

    /// An empty union or enumeration.  Structures may be empty; they simply
    /// produce no storage.
    Empty { name: String, category: Category },

    AutoEnumeratorInExplicit { name: String },
    DuplicateEnumeratorName { name: String },
    DuplicateEnumeratorValue { name: String, value: i128 },

    /// A bitfield member with an array or aggregate type.
    ComplexBitfieldMember { name: String },

    ConstWriteonly { name: String },
    NonzeroOthersDefault { name: String },

    /// A reserved member whose default contradicts its `res0`/`res1` name.
    ReservedDefault { name: String },

    /// A [`StringId`] with no string behind it.
    StringNotFound,

    Abi(AbiError),
    Range(RangeError),
}

/// Numeric and bit allocation range violations.  Kept as a distinct type so
/// callers can tell "your value does not fit" apart from structural errors.
#[derive(Clone, Debug, PartialEq)]
pub enum RangeError {
    /// An explicit bit range overlaps an earlier member or lies outside the
    /// bitfield.
    Conflict { name: String, free: String },

    /// Automatic allocation found no free run wide enough.
    OutOfBits { name: String, width: u64, free: String },

    /// A member claims more bits than the bitfield holds.
    TooManyBits { name: String, bits: u64, max: u64 },

    /// A member claims fewer bits than its type needs.
    NotEnoughBits { name: String, bits: u64, need: u64 },

    /// A default value outside the member's bit range.
    DefaultTooWide { name: String },

    /// A pointer member whose claimed width does not match the pointer's
    /// significant bits.
    PointerWidth { name: String, width: u64, need: u64 },
}

impl CompilerDisplay for RangeError {
    fn fmt(&self, _: &SourceMap, _: &StringTable) -> Result<String, CompilerDisplayError> {
        Ok(match self {
            RangeError::Conflict { name, free } => {
                format!("bit range for {} conflicts with an earlier member ({})", name, free)
            }
            RangeError::OutOfBits { name, width, free } => {
                format!("no room for {} bits for {} ({})", width, name, free)
            }
            RangeError::TooManyBits { name, bits, max } => {
                format!("too many bits for {}: {} claimed, {} available", name, bits, max)
            }
            RangeError::NotEnoughBits { name, bits, need } => {
                format!("not enough bits for {}: {} claimed, type needs {}", name, bits, need)
            }
            RangeError::DefaultTooWide { name } => {
                format!("default value for {} does not fit its bit range", name)
            }
            RangeError::PointerWidth { name, width, need } => {
                format!("pointer member {} must claim exactly {} bits, got {}", name, need, width)
            }
        })
    }
}

impl CompilerDisplay for LayoutError {
    fn fmt(&self, sm: &SourceMap, st: &StringTable) -> Result<String, CompilerDisplayError> {
        Ok(match self {
            LayoutError::Unresolved { name, category } => {
                format!("unresolved reference to {} {}", category, name)
            }
            LayoutError::Circular { name } => {
                format!("circular dependency while laying out {}", name)
            }
            LayoutError::SelfReferentialConstant { name } => {
                format!("constant {} refers to itself", name)
            }
            LayoutError::NotAType { name } => format!("{} is not a type", name),
            LayoutError::NonScalar => "not a scalar type".into(),
            LayoutError::UnknownPrimitive { name } => {
                format!("unknown primitive type {}", name)
            }
            LayoutError::DivisionByZero => "division by zero in constant expression".into(),
            LayoutError::Overflow => "constant expression overflows".into(),
            LayoutError::ShiftOutOfRange { by } => format!("shift amount {} out of range", by),
            LayoutError::NegativeArrayLength { length } => {
                format!("array length is negative ({})", length)
            }
            LayoutError::BadAlignment { value } => {
                format!("alignment must be a positive power of two, got {}", value)
            }
            LayoutError::FixedOffsetBackwards { name, offset, cursor } => format!(
                "fixed offset of member {} (@{}) is before the end of the previous member (@{})",
                name, offset, cursor
            ),
            LayoutError::PaddingAfterFixedOffset { name, bytes } => format!(
                "padding needed after fixed offset member {} ({} bytes)",
                name, bytes
            ),
            LayoutError::ObjectMemberOffset { name } => {
                format!("object member {} cannot have a fixed offset", name)
            }
            LayoutError::FlattenedMemberOffset { name } => {
                format!("flattened member {} cannot have a fixed offset", name)
            }
            LayoutError::UnionMemberOffset { name } => {
                format!("union member {} must be at offset 0", name)
            }
            LayoutError::UnionFlattenedObject { name } => format!(
                "object member {} flattens to more than one member in a union",
                name
            ),
            LayoutError::Empty { name, category } => {
                format!("{} {} has no members", category, name)
            }
            LayoutError::AutoEnumeratorInExplicit { name } => {
                format!("explicit enumeration requires a value for enumerator {}", name)
            }
            LayoutError::DuplicateEnumeratorName { name } => {
                format!("duplicate enumerator {}", name)
            }
            LayoutError::DuplicateEnumeratorValue { name, value } => {
                format!("duplicate enumerator value {} for {}", value, name)
            }
            LayoutError::ComplexBitfieldMember { name } => {
                format!("bitfield member {} has a non-scalar type", name)
            }
            LayoutError::ConstWriteonly { name } => {
                format!("bitfield member {} cannot be both const and writeonly", name)
            }
            LayoutError::NonzeroOthersDefault { name } => {
                format!("others member {} must have a zero default", name)
            }
            LayoutError::ReservedDefault { name } => {
                format!("invalid default for reserved member {}", name)
            }
            LayoutError::StringNotFound => "StringId not found".into(),
            LayoutError::Abi(e) => e.to_string(),
            LayoutError::Range(e) => e.fmt(sm, st)?,
        })
    }
}

/// The computed layout of one definition, held by the [`Engine`] until the
/// whole graph has laid out cleanly.
#[derive(Debug)]
enum DefLayout {
    Struct(StructLayout),
    Union(UnionLayout),
    Enum(EnumLayout, Vec<i128>),
    BitField(BitFieldLayout, Vec<Option<FieldMapping>>),

    /// An alternative: layout queries forward to the aliased type.
    Alias(TypeId),

    /// A definition with no layout of its own (constants and globals).
    Opaque,
}

/// Computes layouts and constant values for every definition in `top` and
/// writes the results back into the graph.
pub fn update(top: &mut TopLevel, abi: &dyn Abi, strings: &StringTable) -> LayoutResult<()> {
    let mut engine = Engine::new(abi, strings);

    for id in top.def_ids() {
        engine.ensure_layout(top, id)?;
    }

    // Force every expression in the graph to a value, including ones no
    // layout needed (array lengths behind pointers, say), so later stages
    // can read `resolved` without carrying an evaluator.
    for id in top.expr_ids() {
        engine.eval(top, id)?;
    }

    engine.commit(top);
    Ok(())
}

/// Holds the layout state for one pass over a [`TopLevel`].  All computed
/// data lives in side tables keyed by handle; the graph itself stays
/// immutable until [`Engine::commit`].
pub struct Engine<'a> {
    abi: &'a dyn Abi,
    strings: &'a StringTable,

    layouts: HashMap<DefId, DefLayout>,

    /// Definitions currently being laid out, for cycle detection.
    visiting: HashSet<DefId>,

    consts: HashMap<DefId, i128>,
    const_stack: HashSet<DefId>,

    evals: HashMap<ExprId, i128>,
}

impl<'a> Engine<'a> {
    pub fn new(abi: &'a dyn Abi, strings: &'a StringTable) -> Engine<'a> {
        Engine {
            abi,
            strings,
            layouts: HashMap::new(),
            visiting: HashSet::new(),
            consts: HashMap::new(),
            const_stack: HashSet::new(),
            evals: HashMap::new(),
        }
    }

    pub(super) fn abi(&self) -> &dyn Abi {
        self.abi
    }

    fn str(&self, id: StringId, span: Span) -> LayoutResult<String> {
        match self.strings.get(id) {
            Ok(s) => Ok(s),
            Err(_) => err!(span, LayoutError::StringNotFound),
        }
    }

    /// Lays out the definition `id` if it has not been laid out yet.
    fn ensure_layout(&mut self, top: &TopLevel, id: DefId) -> LayoutResult<()> {
        if self.layouts.contains_key(&id) {
            return Ok(());
        }

        let def = top.def(id);
        if !self.visiting.insert(id) {
            let name = self.str(def.name, def.span)?;
            return err!(def.span, LayoutError::Circular { name });
        }

        let result = match &def.kind {
            DefKind::Structure(_) | DefKind::Object { .. } => {
                structure::layout_struct(self, top, id).map(DefLayout::Struct)
            }
            DefKind::Union(_) => structure::layout_union(self, top, id).map(DefLayout::Union),
            DefKind::Enumeration(_) => {
                enumeration::layout_enum(self, top, id).map(|(l, v)| DefLayout::Enum(l, v))
            }
            DefKind::BitField(_) => {
                bitfield::layout_bitfield(self, top, id).map(|(l, m)| DefLayout::BitField(l, m))
            }
            DefKind::Alternative(a) => {
                // Force the aliased type while the cycle guard is held, so
                // an alternative of itself is caught here.
                let ty = a.ty;
                self.type_size(top, ty)
                    .and_then(|_| self.type_align(top, ty))
                    .map(|_| DefLayout::Alias(ty))
            }
            DefKind::Constant(_) => self.const_value(top, id).map(|_| DefLayout::Opaque),
            DefKind::Global(_) => Ok(DefLayout::Opaque),
        };

        self.visiting.remove(&id);
        self.layouts.insert(id, result?);
        Ok(())
    }

    /// The evaluated value of a constant definition.
    fn const_value(&mut self, top: &TopLevel, id: DefId) -> LayoutResult<i128> {
        if let Some(v) = self.consts.get(&id) {
            return Ok(*v);
        }

        let def = top.def(id);
        let value = match &def.kind {
            DefKind::Constant(c) => c.value,
            _ => {
                let name = self.str(def.name, def.span)?;
                return err!(def.span, LayoutError::NotAType { name });
            }
        };

        if !self.const_stack.insert(id) {
            let name = self.str(def.name, def.span)?;
            return err!(def.span, LayoutError::SelfReferentialConstant { name });
        }
        let result = self.eval(top, value);
        self.const_stack.remove(&id);

        let v = result?;
        self.consts.insert(id, v);
        Ok(v)
    }

    /// Evaluates a constant expression to an integer.  Every subexpression
    /// is evaluated eagerly and memoized.
    pub(super) fn eval(&mut self, top: &TopLevel, id: ExprId) -> LayoutResult<i128> {
        if let Some(v) = self.evals.get(&id) {
            return Ok(*v);
        }

        let expr = top.expr(id);
        let span = expr.span;
        let v = match expr.kind {
            ExprKind::Literal(v) => v as i128,
            ExprKind::ConstRef { name, def } => match def {
                Some(d) => self.const_value(top, d)?,
                None => {
                    let name = self.str(name, span)?;
                    return err!(
                        span,
                        LayoutError::Unresolved {
                            name,
                            category: Category::Constant,
                        }
                    );
                }
            },
            ExprKind::Unary { op, arg } => {
                let v = self.eval(top, arg)?;
                match op {
                    UnaryOp::Plus => v,
                    UnaryOp::Minus => match v.checked_neg() {
                        Some(v) => v,
                        None => return err!(span, LayoutError::Overflow),
                    },
                    UnaryOp::BitNot => !v,
                    UnaryOp::Not => (v == 0) as i128,
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let l = self.eval(top, lhs)?;
                let r = self.eval(top, rhs)?;
                self.eval_binary(op, l, r, span)?
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                let c = self.eval(top, cond)?;
                let t = self.eval(top, then_expr)?;
                let e = self.eval(top, else_expr)?;
                if c != 0 {
                    t
                } else {
                    e
                }
            }
            ExprKind::TypeProp { prop, ty } => match prop {
                TypeProp::Sizeof => self.type_size(top, ty)? as i128,
                TypeProp::Alignof => self.type_align(top, ty)? as i128,
                TypeProp::Minof => self.type_minof(top, ty)?,
                TypeProp::Maxof => self.type_maxof(top, ty)?,
            },
        };

        self.evals.insert(id, v);
        Ok(v)
    }

    fn eval_binary(&self, op: BinaryOp, l: i128, r: i128, span: Span) -> LayoutResult<i128> {
        let v = match op {
            BinaryOp::Add => l.checked_add(r),
            BinaryOp::Sub => l.checked_sub(r),
            BinaryOp::Mul => l.checked_mul(r),
            BinaryOp::Div => {
                if r == 0 {
                    return err!(span, LayoutError::DivisionByZero);
                }
                Some(floor_div(l, r))
            }
            BinaryOp::Mod => {
                if r == 0 {
                    return err!(span, LayoutError::DivisionByZero);
                }
                Some(floor_mod(l, r))
            }
            BinaryOp::Shl => {
                if !(0..128).contains(&r) {
                    return err!(span, LayoutError::ShiftOutOfRange { by: r });
                }
                // checked_shl only rejects the shift amount, so undo the
                // shift to catch dropped high bits.
                let shifted = l << r as u32;
                if shifted >> r as u32 == l {
                    Some(shifted)
                } else {
                    None
                }
            }
            BinaryOp::Shr => {
                if r < 0 {
                    return err!(span, LayoutError::ShiftOutOfRange { by: r });
                }
                // An arithmetic shift past the width saturates to the sign.
                Some(l >> r.min(127) as u32)
            }
            BinaryOp::Lt => Some((l < r) as i128),
            BinaryOp::Gt => Some((l > r) as i128),
            BinaryOp::Le => Some((l <= r) as i128),
            BinaryOp::Ge => Some((l >= r) as i128),
            BinaryOp::Eq => Some((l == r) as i128),
            BinaryOp::Ne => Some((l != r) as i128),
            BinaryOp::BitAnd => Some(l & r),
            BinaryOp::BitXor => Some(l ^ r),
            BinaryOp::BitOr => Some(l | r),
            BinaryOp::LogAnd => Some((l != 0 && r != 0) as i128),
            BinaryOp::LogOr => Some((l != 0 || r != 0) as i128),
        };
        match v {
            Some(v) => Ok(v),
            None => err!(span, LayoutError::Overflow),
        }
    }

    /// The C type backing a primitive, by its DSL name.
    pub(super) fn primitive(&self, name: StringId, span: Span) -> LayoutResult<CType> {
        let dsl = self.str(name, span)?;
        let c_name = match crate::compiler::ir::primitive_c_name(&dsl) {
            Some(c) => c,
            None => return err!(span, LayoutError::UnknownPrimitive { name: dsl }),
        };
        match self.abi.c_type(c_name) {
            Ok(t) => Ok(*t),
            Err(e) => err!(span, LayoutError::Abi(e)),
        }
    }

    /// The size in bytes of the type node `ty`.
    pub(super) fn type_size(&mut self, top: &TopLevel, ty: TypeId) -> LayoutResult<u64> {
        let t = top.ty(ty);
        let span = t.span;
        match t.kind {
            TypeKind::Primitive(name) => Ok(self.primitive(name, span)?.size),
            TypeKind::Named { name, category, def } => match def {
                Some(d) => self.def_size(top, d, span),
                None => {
                    let name = self.str(name, span)?;
                    err!(span, LayoutError::Unresolved { name, category })
                }
            },
            TypeKind::Array { base, length } => {
                let len = self.eval(top, length)?;
                if len < 0 {
                    return err!(span, LayoutError::NegativeArrayLength { length: len });
                }
                let base_size = self.type_size(top, base)?;
                match base_size.checked_mul(len as u64) {
                    Some(s) => Ok(s),
                    None => err!(span, LayoutError::Overflow),
                }
            }
            TypeKind::Pointer { .. } => Ok(self.abi.pointer_size()),
        }
    }

    /// The alignment in bytes of the type node `ty`, after its qualifiers.
    pub(super) fn type_align(&mut self, top: &TopLevel, ty: TypeId) -> LayoutResult<u64> {
        let t = top.ty(ty);
        let span = t.span;
        let natural = match t.kind {
            TypeKind::Primitive(name) => self.primitive(name, span)?.align,
            TypeKind::Named { name, category, def } => match def {
                Some(d) => self.def_align(top, d, span)?,
                None => {
                    let name = self.str(name, span)?;
                    return err!(span, LayoutError::Unresolved { name, category });
                }
            },
            TypeKind::Array { base, .. } => self.type_align(top, base)?,
            TypeKind::Pointer { .. } => self.abi.pointer_align(),
        };

        let quals = top.ty(ty).quals.clone();
        let packed = top.ty(ty).is_packed();
        match self.aligned_quals(top, &quals, span)? {
            Some(align) => Ok(align),
            None if packed => Ok(1),
            None => Ok(natural),
        }
    }

    /// The largest `aligned(N)` qualifier in `quals`, if any.  An aligned
    /// qualifier replaces the natural alignment outright, so it can lower
    /// it as well as raise it.
    pub(super) fn aligned_quals(
        &mut self,
        top: &TopLevel,
        quals: &[Qualifier],
        span: Span,
    ) -> LayoutResult<Option<u64>> {
        let mut align = None;
        for q in quals {
            if let Qualifier::Aligned(e) = q {
                let v = self.eval(top, *e)?;
                if v <= 0 || !(v as u64).is_power_of_two() {
                    return err!(span, LayoutError::BadAlignment { value: v });
                }
                align = Some(align.unwrap_or(0).max(v as u64));
            }
        }
        Ok(align)
    }

    /// The number of value bits in `ty`, when narrower than its storage.
    pub(super) fn type_bitsize(&mut self, top: &TopLevel, ty: TypeId) -> LayoutResult<Option<u64>> {
        let t = top.ty(ty);
        let span = t.span;
        match t.kind {
            TypeKind::Primitive(name) => Ok(self.primitive(name, span)?.bitsize),
            TypeKind::Named { name, category, def } => match def {
                Some(d) => self.def_bitsize(top, d, span),
                None => {
                    let name = self.str(name, span)?;
                    err!(span, LayoutError::Unresolved { name, category })
                }
            },
            TypeKind::Array { .. } => err!(span, LayoutError::NonScalar),
            TypeKind::Pointer { pointee } => {
                // The low bits of an aligned pointer are always zero, so a
                // pointer only carries its high bits.
                let align = self.type_align(top, pointee)?;
                Ok(Some(self.abi.pointer_size() * 8 - align.trailing_zeros() as u64))
            }
        }
    }

    /// Whether values of `ty` are signed.
    pub(super) fn type_signed(&mut self, top: &TopLevel, ty: TypeId) -> LayoutResult<bool> {
        let t = top.ty(ty);
        let span = t.span;
        match t.kind {
            TypeKind::Primitive(name) => Ok(self.primitive(name, span)?.signed),
            TypeKind::Named { name, category, def } => match def {
                Some(d) => self.def_signed(top, d, span),
                None => {
                    let name = self.str(name, span)?;
                    err!(span, LayoutError::Unresolved { name, category })
                }
            },
            TypeKind::Array { .. } => err!(span, LayoutError::NonScalar),
            TypeKind::Pointer { .. } => Ok(false),
        }
    }

    /// The smallest value representable in `ty`.
    pub(super) fn type_minof(&mut self, top: &TopLevel, ty: TypeId) -> LayoutResult<i128> {
        if let Some(v) = self.enum_extreme(top, ty, false)? {
            return Ok(v);
        }
        let signed = self.type_signed(top, ty)?;
        if signed {
            let bits = self.value_bits(top, ty)?;
            Ok(-(1i128 << (bits - 1)))
        } else {
            Ok(0)
        }
    }

    /// The largest value representable in `ty`.
    pub(super) fn type_maxof(&mut self, top: &TopLevel, ty: TypeId) -> LayoutResult<i128> {
        if let Some(v) = self.enum_extreme(top, ty, true)? {
            return Ok(v);
        }
        let signed = self.type_signed(top, ty)?;
        let bits = self.value_bits(top, ty)?;
        Ok((1i128 << (bits - signed as u64)) - 1)
    }

    /// For an enumeration type the value range is the actual enumerator
    /// range, not the range of the backing integer.
    fn enum_extreme(&mut self, top: &TopLevel, ty: TypeId, max: bool) -> LayoutResult<Option<i128>> {
        if let TypeKind::Named { def: Some(d), .. } = top.ty(ty).kind {
            self.ensure_layout(top, d)?;
            match self.layouts.get(&d) {
                Some(DefLayout::Enum(l, _)) => {
                    return Ok(Some(if max { l.max } else { l.min }));
                }
                Some(DefLayout::Alias(t)) => {
                    let t = *t;
                    return self.enum_extreme(top, t, max);
                }
                _ => {}
            }
        }
        Ok(None)
    }

    fn value_bits(&mut self, top: &TopLevel, ty: TypeId) -> LayoutResult<u64> {
        match self.type_bitsize(top, ty)? {
            Some(b) => Ok(b),
            None => Ok(self.type_size(top, ty)? * 8),
        }
    }

    fn def_size(&mut self, top: &TopLevel, id: DefId, span: Span) -> LayoutResult<u64> {
        self.ensure_layout(top, id)?;
        let alias = match self.layouts.get(&id) {
            Some(DefLayout::Struct(l)) => return Ok(l.size),
            Some(DefLayout::Union(l)) => return Ok(l.size),
            Some(DefLayout::Enum(l, _)) => return Ok(l.size),
            Some(DefLayout::BitField(l, _)) => return Ok(l.unit_size / 8 * l.unit_count),
            Some(DefLayout::Alias(t)) => *t,
            _ => {
                let name = self.str(top.def(id).name, span)?;
                return err!(span, LayoutError::NotAType { name });
            }
        };
        self.type_size(top, alias)
    }

    fn def_align(&mut self, top: &TopLevel, id: DefId, span: Span) -> LayoutResult<u64> {
        self.ensure_layout(top, id)?;
        let alias = match self.layouts.get(&id) {
            Some(DefLayout::Struct(l)) => return Ok(l.align),
            Some(DefLayout::Union(l)) => return Ok(l.align),
            Some(DefLayout::Enum(l, _)) => return Ok(l.align),
            Some(DefLayout::BitField(l, _)) => return Ok(l.unit_size / 8),
            Some(DefLayout::Alias(t)) => *t,
            _ => {
                let name = self.str(top.def(id).name, span)?;
                return err!(span, LayoutError::NotAType { name });
            }
        };
        self.type_align(top, alias)
    }

    fn def_bitsize(&mut self, top: &TopLevel, id: DefId, span: Span) -> LayoutResult<Option<u64>> {
        self.ensure_layout(top, id)?;
        let alias = match self.layouts.get(&id) {
            Some(DefLayout::Enum(l, _)) => return Ok(Some(l.bitsize)),
            Some(DefLayout::BitField(l, _)) => return Ok(Some(l.bitsize)),
            Some(DefLayout::Alias(t)) => *t,
            _ => return err!(span, LayoutError::NonScalar),
        };
        self.type_bitsize(top, alias)
    }

    fn def_signed(&mut self, top: &TopLevel, id: DefId, span: Span) -> LayoutResult<bool> {
        self.ensure_layout(top, id)?;
        let alias = match self.layouts.get(&id) {
            Some(DefLayout::Enum(l, _)) => return Ok(l.signed),
            Some(DefLayout::BitField(_, _)) => return Ok(false),
            Some(DefLayout::Alias(t)) => *t,
            _ => return err!(span, LayoutError::NonScalar),
        };
        self.type_signed(top, alias)
    }

    /// Writes every computed layout and value back into the graph.
    fn commit(self, top: &mut TopLevel) {
        for (id, layout) in self.layouts {
            match (layout, &mut top.def_mut(id).kind) {
                (DefLayout::Struct(l), DefKind::Structure(s))
                | (DefLayout::Struct(l), DefKind::Object { def: s, .. }) => {
                    s.layout = Some(l);
                }
                (DefLayout::Union(l), DefKind::Union(u)) => {
                    u.layout = Some(l);
                }
                (DefLayout::Enum(l, values), DefKind::Enumeration(e)) => {
                    e.layout = Some(l);
                    for (en, v) in e.enumerators.iter_mut().zip(values) {
                        en.resolved = Some(v);
                    }
                }
                (DefLayout::BitField(l, mappings), DefKind::BitField(b)) => {
                    b.layout = Some(l);
                    for (f, m) in b.fields.iter_mut().zip(mappings) {
                        f.mapping = m;
                    }
                }
                (DefLayout::Opaque, DefKind::Constant(c)) => {
                    c.resolved = self.consts.get(&id).copied();
                }
                _ => {}
            }
        }

        for (id, v) in self.evals {
            top.expr_mut(id).resolved = Some(v);
        }
    }
}

/// Division rounding toward negative infinity, the way the DSL's constant
/// expressions define `/`.
fn floor_div(lhs: i128, rhs: i128) -> i128 {
    let q = lhs / rhs;
    if lhs % rhs != 0 && (lhs < 0) != (rhs < 0) {
        q - 1
    } else {
        q
    }
}

/// Remainder matching [`floor_div`]: the result takes the sign of the
/// divisor.
fn floor_mod(lhs: i128, rhs: i128) -> i128 {
    let r = lhs % rhs;
    if r != 0 && (r < 0) != (rhs < 0) {
        r + rhs
    } else {
        r
    }
}

#[cfg(test)]
pub(super) mod testutil {
    use super::*;
    use crate::compiler::ir::{ConstantDef, Definition, Expr, Type};

    /// Test helper which owns a graph and a string table and offers short
    /// constructors for the nodes the layout tests need.
    pub struct Builder {
        pub top: TopLevel,
        pub strings: StringTable,
    }

    impl Builder {
        pub fn new() -> Builder {
            Builder {
                top: TopLevel::new(),
                strings: StringTable::new(),
            }
        }

        pub fn name(&self, s: &str) -> StringId {
            self.strings.insert(s.into())
        }

        pub fn prim(&mut self, name: &str) -> TypeId {
            let n = self.name(name);
            self.top.add_type(Type::primitive(n, Span::zero()))
        }

        pub fn lit(&mut self, v: u64) -> ExprId {
            self.top.add_expr(Expr::literal(v, Span::zero()))
        }

        pub fn expr(&mut self, kind: ExprKind) -> ExprId {
            self.top.add_expr(Expr::new(kind, Span::zero()))
        }

        pub fn array(&mut self, base: TypeId, length: u64) -> TypeId {
            let length = self.lit(length);
            self.top
                .add_type(Type::new(TypeKind::Array { base, length }, Span::zero()))
        }

        pub fn pointer(&mut self, pointee: TypeId) -> TypeId {
            self.top
                .add_type(Type::new(TypeKind::Pointer { pointee }, Span::zero()))
        }

        pub fn constant(&mut self, name: &str, value: ExprId) -> DefId {
            let n = self.name(name);
            self.top.add_def(Definition::new(
                n,
                Span::zero(),
                DefKind::Constant(ConstantDef {
                    ty: None,
                    value,
                    resolved: None,
                }),
            ))
        }

        pub fn def(&mut self, name: &str, kind: DefKind) -> DefId {
            let n = self.name(name);
            self.top.add_def(Definition::new(n, Span::zero(), kind))
        }

        /// A `Named` type node linked straight to `def`, as the resolver
        /// would leave it.
        pub fn named(&mut self, category: Category, def: DefId) -> TypeId {
            let name = self.top.def(def).name;
            self.top.add_type(Type::new(
                TypeKind::Named {
                    category,
                    name,
                    def: Some(def),
                },
                Span::zero(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::Builder;
    use super::*;
    use crate::compiler::abi::AArch64Abi;
    use crate::compiler::ir::{AlternativeDef, Expr};

    fn eval_one(b: &mut Builder, id: ExprId) -> LayoutResult<i128> {
        let abi = AArch64Abi::new();
        let mut eng = Engine::new(&abi, &b.strings);
        eng.eval(&b.top, id)
    }

    #[test]
    fn arithmetic_follows_floor_semantics() {
        assert_eq!(floor_div(7, 2), 3);
        assert_eq!(floor_div(-7, 2), -4);
        assert_eq!(floor_div(7, -2), -4);
        assert_eq!(floor_div(-7, -2), 3);

        assert_eq!(floor_mod(7, 2), 1);
        assert_eq!(floor_mod(-7, 2), 1);
        assert_eq!(floor_mod(7, -2), -1);
        assert_eq!(floor_mod(-7, -2), -1);
    }

    #[test]
    fn binary_and_unary_expressions_evaluate() {
        let mut b = Builder::new();
        let two = b.lit(2);
        let three = b.lit(3);
        let sum = b.expr(ExprKind::Binary {
            op: BinaryOp::Add,
            lhs: two,
            rhs: three,
        });
        let neg = b.expr(ExprKind::Unary {
            op: UnaryOp::Minus,
            arg: sum,
        });
        let not = b.expr(ExprKind::Unary {
            op: UnaryOp::BitNot,
            arg: neg,
        });

        assert_eq!(eval_one(&mut b, not).unwrap(), 4);
    }

    #[test]
    fn logical_operators_produce_zero_or_one() {
        let mut b = Builder::new();
        let seven = b.lit(7);
        let zero = b.lit(0);
        let and = b.expr(ExprKind::Binary {
            op: BinaryOp::LogAnd,
            lhs: seven,
            rhs: zero,
        });
        let or = b.expr(ExprKind::Binary {
            op: BinaryOp::LogOr,
            lhs: seven,
            rhs: zero,
        });

        assert_eq!(eval_one(&mut b, and).unwrap(), 0);
        assert_eq!(eval_one(&mut b, or).unwrap(), 1);
    }

    #[test]
    fn conditional_selects_by_condition() {
        let mut b = Builder::new();
        let cond = b.lit(1);
        let t = b.lit(10);
        let e = b.lit(20);
        let sel = b.expr(ExprKind::Conditional {
            cond,
            then_expr: t,
            else_expr: e,
        });

        assert_eq!(eval_one(&mut b, sel).unwrap(), 10);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let mut b = Builder::new();
        let one = b.lit(1);
        let zero = b.lit(0);
        let div = b.expr(ExprKind::Binary {
            op: BinaryOp::Div,
            lhs: one,
            rhs: zero,
        });

        let err = eval_one(&mut b, div).unwrap_err();
        assert_eq!(*err.inner(), LayoutError::DivisionByZero);
    }

    #[test]
    fn sizeof_and_alignof_query_the_abi() {
        let mut b = Builder::new();
        let u64t = b.prim("uint64");
        let size = b.expr(ExprKind::TypeProp {
            prop: TypeProp::Sizeof,
            ty: u64t,
        });
        let arr = b.array(u64t, 3);
        let arr_size = b.expr(ExprKind::TypeProp {
            prop: TypeProp::Sizeof,
            ty: arr,
        });

        assert_eq!(eval_one(&mut b, size).unwrap(), 8);
        assert_eq!(eval_one(&mut b, arr_size).unwrap(), 24);
    }

    #[test]
    fn minof_and_maxof_follow_signedness() {
        let mut b = Builder::new();
        let s8 = b.prim("sint8");
        let min = b.expr(ExprKind::TypeProp {
            prop: TypeProp::Minof,
            ty: s8,
        });
        let max = b.expr(ExprKind::TypeProp {
            prop: TypeProp::Maxof,
            ty: s8,
        });

        assert_eq!(eval_one(&mut b, min).unwrap(), -128);
        assert_eq!(eval_one(&mut b, max).unwrap(), 127);
    }

    #[test]
    fn bool_range_uses_its_bitsize() {
        let mut b = Builder::new();
        let boolean = b.prim("bool");
        let max = b.expr(ExprKind::TypeProp {
            prop: TypeProp::Maxof,
            ty: boolean,
        });

        assert_eq!(eval_one(&mut b, max).unwrap(), 1);
    }

    #[test]
    fn constant_references_resolve_through_definitions() {
        let mut b = Builder::new();
        let value = b.lit(40);
        let def = b.constant("answer", value);
        let name = b.top.def(def).name;
        let r = b.expr(ExprKind::ConstRef {
            name,
            def: Some(def),
        });
        let two = b.lit(2);
        let sum = b.expr(ExprKind::Binary {
            op: BinaryOp::Add,
            lhs: r,
            rhs: two,
        });

        assert_eq!(eval_one(&mut b, sum).unwrap(), 42);
    }

    #[test]
    fn self_referential_constant_is_an_error() {
        let mut b = Builder::new();
        let name = b.name("loop");
        let r = b.top.add_expr(Expr::new(
            ExprKind::ConstRef { name, def: None },
            Span::zero(),
        ));
        let def = b.constant("loop", r);
        if let ExprKind::ConstRef { def: d, .. } = &mut b.top.expr_mut(r).kind {
            *d = Some(def);
        }

        let abi = AArch64Abi::new();
        let mut eng = Engine::new(&abi, &b.strings);
        let err = eng.const_value(&b.top, def).unwrap_err();
        assert_eq!(
            *err.inner(),
            LayoutError::SelfReferentialConstant {
                name: "loop".into()
            }
        );
    }

    #[test]
    fn pointer_bitsize_drops_alignment_bits() {
        let mut b = Builder::new();
        let u64t = b.prim("uint64");
        let p = b.pointer(u64t);
        let u8t = b.prim("uint8");
        let p8 = b.pointer(u8t);

        let abi = AArch64Abi::new();
        let mut eng = Engine::new(&abi, &b.strings);
        assert_eq!(eng.type_bitsize(&b.top, p).unwrap(), Some(61));
        assert_eq!(eng.type_bitsize(&b.top, p8).unwrap(), Some(64));
        assert!(!eng.type_signed(&b.top, p).unwrap());
    }

    #[test]
    fn alternative_forwards_layout_queries() {
        let mut b = Builder::new();
        let u32t = b.prim("uint32");
        let alt = b.def("word", DefKind::Alternative(AlternativeDef { ty: u32t }));
        let named = b.named(Category::Alternative, alt);

        let abi = AArch64Abi::new();
        let mut eng = Engine::new(&abi, &b.strings);
        assert_eq!(eng.type_size(&b.top, named).unwrap(), 4);
        assert_eq!(eng.type_align(&b.top, named).unwrap(), 4);
        assert_eq!(eng.type_bitsize(&b.top, named).unwrap(), None);
    }

    #[test]
    fn update_writes_resolved_values_back() {
        let mut b = Builder::new();
        let value = b.lit(9);
        let def = b.constant("nine", value);

        let abi = AArch64Abi::new();
        update(&mut b.top, &abi, &b.strings).unwrap();

        assert_eq!(b.top.expr(value).resolved, Some(9));
        match &b.top.def(def).kind {
            DefKind::Constant(c) => assert_eq!(c.resolved, Some(9)),
            k => panic!("expected constant, got {:?}", k),
        }
    }

    #[test]
    fn aligned_qualifier_overrides_alignment() {
        let mut b = Builder::new();
        let u8t = b.prim("uint8");
        let e = b.lit(16);
        b.top.ty_mut(u8t).quals.push(Qualifier::Aligned(e));

        // aligned() replaces the natural alignment in both directions
        let u64t = b.prim("uint64");
        let two = b.lit(2);
        b.top.ty_mut(u64t).quals.push(Qualifier::Aligned(two));

        let abi = AArch64Abi::new();
        let mut eng = Engine::new(&abi, &b.strings);
        assert_eq!(eng.type_align(&b.top, u8t).unwrap(), 16);
        assert_eq!(eng.type_align(&b.top, u64t).unwrap(), 2);
    }

    #[test]
    fn packed_type_aligns_to_one() {
        let mut b = Builder::new();
        let u32t = b.prim("uint32");
        b.top.ty_mut(u32t).quals.push(Qualifier::Packed);

        let abi = AArch64Abi::new();
        let mut eng = Engine::new(&abi, &b.strings);
        assert_eq!(eng.type_align(&b.top, u32t).unwrap(), 1);
    }

    #[test]
    fn bad_alignment_is_rejected() {
        let mut b = Builder::new();
        let u8t = b.prim("uint8");
        let e = b.lit(3);
        b.top.ty_mut(u8t).quals.push(Qualifier::Aligned(e));

        let abi = AArch64Abi::new();
        let mut eng = Engine::new(&abi, &b.strings);
        let err = eng.type_align(&b.top, u8t).unwrap_err();
        assert_eq!(*err.inner(), LayoutError::BadAlignment { value: 3 });
    }
}
