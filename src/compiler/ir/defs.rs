use serde::{Deserialize, Serialize};

use super::{Category, ExprId, Qualifier, Rebase, TypeId};
use crate::compiler::Span;
use crate::StringId;

/// A named top level definition: a user defined type, constant, or global.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub name: StringId,
    pub public: bool,
    pub quals: Vec<Qualifier>,
    pub span: Span,
    pub kind: DefKind,
}

impl Definition {
    pub fn new(name: StringId, span: Span, kind: DefKind) -> Definition {
        Definition {
            name,
            public: false,
            quals: Vec::new(),
            span,
            kind,
        }
    }

    pub fn category(&self) -> Category {
        match self.kind {
            DefKind::Structure(_) => Category::Structure,
            DefKind::Object { .. } => Category::Object,
            DefKind::Union(_) => Category::Union,
            DefKind::Enumeration(_) => Category::Enumeration,
            DefKind::BitField(_) => Category::BitField,
            DefKind::Alternative(_) => Category::Alternative,
            DefKind::Constant(_) => Category::Constant,
            DefKind::Global(_) => Category::Global,
        }
    }

    pub fn is_packed(&self) -> bool {
        self.quals.iter().any(|q| matches!(q, Qualifier::Packed))
    }

    pub fn is_optimized(&self) -> bool {
        self.quals.iter().any(|q| matches!(q, Qualifier::Optimized))
    }

    pub fn is_atomic(&self) -> bool {
        self.quals.iter().any(|q| matches!(q, Qualifier::Atomic))
    }

    pub fn is_const(&self) -> bool {
        self.quals.iter().any(|q| matches!(q, Qualifier::Const))
    }

    pub(crate) fn rebase(&mut self, rb: Rebase) {
        for q in &mut self.quals {
            q.rebase(rb);
        }
        match &mut self.kind {
            DefKind::Structure(s) => s.rebase(rb),
            DefKind::Object { def, .. } => def.rebase(rb),
            DefKind::Union(u) => u.rebase(rb),
            DefKind::Enumeration(e) => e.rebase(rb),
            DefKind::BitField(b) => b.rebase(rb),
            DefKind::Alternative(a) => rb.ty(&mut a.ty),
            DefKind::Constant(c) => {
                if let Some(t) = &mut c.ty {
                    rb.ty(t);
                }
                rb.expr(&mut c.value);
            }
            DefKind::Global(g) => rb.ty(&mut g.ty),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefKind {
    Structure(StructDef),

    /// An object is a structure which is flattened into every aggregate that
    /// embeds it.  A standalone C type is only emitted when the object is
    /// used in a "complex" way (behind a pointer or in an array), tracked by
    /// `need_export` during reference linking.
    Object { def: StructDef, need_export: bool },

    Union(UnionDef),
    Enumeration(EnumDef),
    BitField(BitFieldDef),
    Alternative(AlternativeDef),
    Constant(ConstantDef),
    Global(GlobalDef),
}

/// A member of a structure, object, or union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub name: StringId,

    /// Module prefix applied to the member name on flattening.  Set for
    /// members that arrived through an extension.
    pub prefix: Option<StringId>,

    pub ty: TypeId,

    /// Fixed byte offset within the aggregate, if one was declared.
    pub offset: Option<ExprId>,

    /// True for object typed members which are flattened into the aggregate
    /// rather than stored as a single field.
    pub embed: bool,

    /// Suppresses the member name prefix when flattening an embedded object.
    pub noprefix: bool,

    pub span: Span,
}

impl Member {
    pub fn new(name: StringId, ty: TypeId, span: Span) -> Member {
        Member {
            name,
            prefix: None,
            ty,
            offset: None,
            embed: false,
            noprefix: false,
            span,
        }
    }

    fn rebase(&mut self, rb: Rebase) {
        rb.ty(&mut self.ty);
        if let Some(o) = &mut self.offset {
            rb.expr(o);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructDef {
    pub members: Vec<Member>,

    #[serde(skip)]
    pub layout: Option<StructLayout>,
}

impl StructDef {
    fn rebase(&mut self, rb: Rebase) {
        for m in &mut self.members {
            m.rebase(rb);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UnionDef {
    pub members: Vec<Member>,

    #[serde(skip)]
    pub layout: Option<UnionLayout>,
}

impl UnionDef {
    fn rebase(&mut self, rb: Rebase) {
        for m in &mut self.members {
            m.rebase(rb);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnumDef {
    pub enumerators: Vec<Enumerator>,

    /// Explicit enumerations forbid auto allocated values.
    pub explicit: bool,

    #[serde(skip)]
    pub layout: Option<EnumLayout>,
}

impl EnumDef {
    fn rebase(&mut self, rb: Rebase) {
        for e in &mut self.enumerators {
            if let Some(v) = &mut e.value {
                rb.expr(v);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enumerator {
    pub name: StringId,
    pub value: Option<ExprId>,

    /// Emit the enumerator name without the enumeration's prefix.
    pub noprefix: bool,

    pub span: Span,

    /// Final value, filled in during layout.
    #[serde(skip)]
    pub resolved: Option<i128>,
}

impl Enumerator {
    pub fn new(name: StringId, value: Option<ExprId>, span: Span) -> Enumerator {
        Enumerator {
            name,
            value,
            noprefix: false,
            span,
            resolved: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitFieldDef {
    /// Total width of the bitfield in bits.
    pub length: u64,

    pub fields: Vec<BitFieldField>,

    /// A const bitfield marks every field const.
    pub const_members: bool,

    #[serde(skip)]
    pub layout: Option<BitFieldLayout>,
}

impl BitFieldDef {
    pub fn new(length: u64) -> BitFieldDef {
        BitFieldDef {
            length,
            fields: Vec::new(),
            const_members: false,
            layout: None,
        }
    }

    fn rebase(&mut self, rb: Rebase) {
        for f in &mut self.fields {
            f.rebase(rb);
        }
    }
}

/// A field of a bitfield definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitFieldField {
    pub name: StringId,

    /// Module prefix for fields added by an extension.
    pub prefix: Option<StringId>,

    /// Reserved ranges have no declared value type.
    pub ty: Option<TypeId>,

    pub specifier: FieldSpecifier,

    pub default: Option<ExprId>,

    /// A reserved field: claims its bits but never emits an accessor.
    pub is_ignore: bool,

    pub span: Span,

    /// Physical bit mapping, filled in during layout.
    #[serde(skip)]
    pub mapping: Option<FieldMapping>,
}

impl BitFieldField {
    fn rebase(&mut self, rb: Rebase) {
        if let Some(t) = &mut self.ty {
            rb.ty(t);
        }
        if let Some(d) = &mut self.default {
            rb.expr(d);
        }
    }
}

/// How a bitfield field claims its bits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldSpecifier {
    /// Explicit bit ranges, most significant first as written in the source.
    /// `shift` offsets the logical field bits, used to left align pointer
    /// values whose low bits are implied zero.
    Ranges { ranges: Vec<BitRange>, shift: u64 },

    /// Allocate `width` bits anywhere free, lowest first.  Without a width
    /// the field's natural bit width is used.
    Auto { width: Option<u64> },

    /// Claim all bits still free after every other field is placed.
    Others,
}

/// An inclusive-start physical bit range of `width` bits starting at `bit`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BitRange {
    pub bit: u64,
    pub width: u64,
}

/// The logical-to-physical bit mapping of one bitfield field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldMapping {
    pub shift: u64,
    pub signed: bool,

    /// Total logical bits, including the shift.
    pub length: u64,

    pub maps: Vec<FieldMap>,
}

impl FieldMapping {
    pub fn new(shift: u64) -> FieldMapping {
        FieldMapping {
            shift,
            signed: false,
            length: 0,
            maps: Vec::new(),
        }
    }

    pub fn add(&mut self, field_bit: u64, mapped_bit: u64, length: u64) {
        self.maps.push(FieldMap {
            field_bit,
            mapped_bit,
            length,
        });
    }

    /// Merges adjacent map entries which are contiguous in both the logical
    /// and physical bit spaces.
    pub fn compact(&mut self) {
        let mut i = 0;
        while i + 1 < self.maps.len() {
            let a = self.maps[i];
            let b = self.maps[i + 1];
            debug_assert_eq!(a.field_bit + a.length, b.field_bit);
            if a.mapped_bit + a.length == b.mapped_bit {
                self.maps[i].length += b.length;
                self.maps.remove(i + 1);
            } else {
                i += 1;
            }
        }
    }
}

/// One contiguous run of `length` bits, mapping logical field bits starting
/// at `field_bit` onto physical bitfield bits starting at `mapped_bit`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldMap {
    pub field_bit: u64,
    pub mapped_bit: u64,
    pub length: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeDef {
    pub ty: TypeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantDef {
    pub ty: Option<TypeId>,
    pub value: ExprId,

    /// Evaluated value, filled in during layout.
    #[serde(skip)]
    pub resolved: Option<i128>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalDef {
    pub ty: TypeId,
}

/// Computed layout of a structure or object, including padding entries.
#[derive(Debug, Clone, PartialEq)]
pub struct StructLayout {
    pub entries: Vec<LayoutMember>,
    pub size: u64,
    pub align: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutMember {
    /// Fully flattened member name, prefixes applied.
    pub name: String,
    pub entry: LayoutEntry,
    pub offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayoutEntry {
    Field(TypeId),

    /// Padding of the given number of bytes.
    Padding(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionLayout {
    pub entries: Vec<LayoutMember>,
    pub size: u64,
    pub align: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnumLayout {
    pub size: u64,
    pub align: u64,
    pub signed: bool,
    pub bitsize: u64,
    pub min: i128,
    pub max: i128,

    /// The enumerators holding the extreme values, for the `__MIN`/`__MAX`
    /// macros.
    pub min_name: StringId,
    pub max_name: StringId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BitFieldLayout {
    pub unit_size: u64,
    pub unit_count: u64,

    /// Highest allocated bit plus one.
    pub bitsize: u64,

    /// Initial value of each storage unit, from field defaults.
    pub init_values: Vec<u64>,

    /// Per unit mask of the bits covered by readable fields.
    pub compare_masks: Vec<u64>,
}

impl BitFieldLayout {
    /// The C type used for the bitfield's storage units.
    pub fn unit_type(&self) -> &'static str {
        match self.unit_size {
            8 => "uint8_t",
            16 => "uint16_t",
            32 => "uint32_t",
            _ => "uint64_t",
        }
    }
}

/// A cross module addition to a definition named elsewhere.  Extensions are
/// collected during parsing and folded into their targets by the resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extension {
    pub target: StringId,
    pub module: Option<StringId>,
    pub span: Span,
    pub kind: ExtensionKind,
}

impl Extension {
    pub fn category(&self) -> Category {
        match self.kind {
            ExtensionKind::Structure { .. } => Category::Structure,
            ExtensionKind::Object { .. } => Category::Object,
            ExtensionKind::Union { .. } => Category::Union,
            ExtensionKind::Enumeration { .. } => Category::Enumeration,
            ExtensionKind::BitField { .. } => Category::BitField,
        }
    }

    pub(crate) fn rebase(&mut self, rb: Rebase) {
        match &mut self.kind {
            ExtensionKind::Structure { members }
            | ExtensionKind::Object { members }
            | ExtensionKind::Union { members } => {
                for m in members {
                    m.rebase(rb);
                }
            }
            ExtensionKind::Enumeration { enumerators } => {
                for e in enumerators {
                    if let Some(v) = &mut e.value {
                        rb.expr(v);
                    }
                }
            }
            ExtensionKind::BitField { fields, .. } => {
                for f in fields {
                    f.rebase(rb);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExtensionKind {
    Structure {
        members: Vec<Member>,
    },
    Object {
        members: Vec<Member>,
    },
    Union {
        members: Vec<Member>,
    },
    Enumeration {
        enumerators: Vec<Enumerator>,
    },
    BitField {
        fields: Vec<BitFieldField>,
        deletes: Vec<StringId>,
    },
}
