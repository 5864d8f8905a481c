//! Bitfield layout: bit allocation over the free list, logical-to-physical
//! mappings, and the per-unit initial values and comparison masks.
//!
//! Members claim bits in declaration order, explicit ranges and automatic
//! allocations alike, so a later explicit range can collide with an earlier
//! automatic one.  `others` members wait until every other member has
//! landed and then take whatever is left.

use super::{Engine, LayoutError, LayoutResult, RangeCollector, RangeError};
use crate::compiler::abi::bit_length;
use crate::compiler::ir::{
    BitFieldField, BitFieldLayout, Category, DefId, DefKind, FieldMap, FieldMapping,
    FieldSpecifier, TopLevel, TypeId, TypeKind,
};
use crate::compiler::Span;
use crate::err;

pub(super) fn layout_bitfield(
    eng: &mut Engine,
    top: &TopLevel,
    id: DefId,
) -> LayoutResult<(BitFieldLayout, Vec<Option<FieldMapping>>)> {
    let def = top.def(id);
    let (length, fields, const_members): (u64, &[BitFieldField], bool) = match &def.kind {
        DefKind::BitField(b) => (b.length, &b.fields, b.const_members),
        _ => (0, &[], false),
    };

    let unit_size = unit_size_for(length);
    let unit_count = (length + unit_size - 1) / unit_size;

    let mut free = RangeCollector::new(length);
    let mut mappings: Vec<Option<FieldMapping>> = vec![None; fields.len()];

    for (i, f) in fields.iter().enumerate() {
        mappings[i] = place(eng, top, f, const_members, unit_size, &mut free)?;
    }

    // `others` members split the leftover free runs between them in
    // declaration order; in practice the first one takes everything.
    for (i, f) in fields.iter().enumerate() {
        if let FieldSpecifier::Others = f.specifier {
            let mut m = FieldMapping::new(0);
            let mut field_bit = 0;
            for (start, width) in free.take_free() {
                m.add(field_bit, start, width);
                field_bit += width;
            }
            m.length = field_bit;
            if let Some(ty) = f.ty {
                m.signed = eng.type_signed(top, ty)?;
            }
            split_units(&mut m, unit_size);
            mappings[i] = Some(m);
        }
    }

    let bitsize = mappings
        .iter()
        .flatten()
        .flat_map(|m| m.maps.iter())
        .map(|fm| fm.mapped_bit + fm.length)
        .max()
        .unwrap_or(0);

    let mut init_values = vec![0u64; unit_count as usize];
    for (f, m) in fields.iter().zip(&mappings) {
        let dflt = match f.default {
            Some(d) => d,
            None => continue,
        };
        let v = eng.eval(top, dflt)?;

        if let FieldSpecifier::Others = f.specifier {
            if v != 0 {
                let name = field_name(eng, f)?;
                return err!(f.span, LayoutError::NonzeroOthersDefault { name });
            }
            continue;
        }

        let m = match m {
            Some(m) => m,
            None => continue,
        };

        if f.is_ignore {
            // Reserved members only validate the naming convention: a
            // `res0` suffix pins the default to zero, `res1` to all ones
            // over the claimed bits.
            let name = field_name(eng, f)?;
            let all_ones = if m.length >= 128 {
                v == -1
            } else {
                v as u128 == u128::MAX >> (128 - m.length) as u32
            };
            if (name.ends_with("res0") && v != 0) || (name.ends_with("res1") && !all_ones) {
                return err!(f.span, LayoutError::ReservedDefault { name });
            }
        } else if v != 0 && bit_length(v) as u64 > m.length {
            let name = field_name(eng, f)?;
            return err!(f.span, LayoutError::Range(RangeError::DefaultTooWide { name }));
        }

        if v != 0 {
            apply_default(&mut init_values, m, v, unit_size);
        }
    }

    let mut compare_masks = vec![0u64; unit_count as usize];
    for (f, m) in fields.iter().zip(&mappings) {
        let ty = match f.ty {
            Some(t) => t,
            None => continue,
        };
        if top.ty(ty).is_writeonly() {
            continue;
        }
        if let Some(m) = m {
            for fm in &m.maps {
                let unit = (fm.mapped_bit / unit_size) as usize;
                compare_masks[unit] |= run_mask(fm.length) << (fm.mapped_bit % unit_size);
            }
        }
    }

    let layout = BitFieldLayout {
        unit_size,
        unit_count,
        bitsize,
        init_values,
        compare_masks,
    };

    Ok((layout, mappings))
}

/// Claims the bits of one explicit or automatic member and builds its
/// mapping.  `others` members return `None` here and are placed later.
fn place(
    eng: &mut Engine,
    top: &TopLevel,
    f: &BitFieldField,
    const_members: bool,
    unit_size: u64,
    free: &mut RangeCollector,
) -> LayoutResult<Option<FieldMapping>> {
    let span = f.span;
    let name = field_name(eng, f)?;

    let pointer = match f.ty {
        Some(ty) => {
            scalar_check(top, ty, &name, span)?;
            pointer_shift(eng, top, ty)?
        }
        None => None,
    };

    let (mut mapping, bit_length) = match &f.specifier {
        FieldSpecifier::Others => return Ok(None),

        FieldSpecifier::Ranges { ranges, shift } => {
            // A pointer carries its low bits implicitly, so its mapping is
            // shifted up by the pointee's alignment bits.
            let shift = pointer.unwrap_or(*shift);
            let mut m = FieldMapping::new(shift);
            let mut field_bit = shift;

            // Ranges are written most significant first; the lowest range
            // holds the lowest field bits.
            for r in ranges.iter().rev() {
                if !free.claim(r.bit, r.width) {
                    return err!(
                        span,
                        LayoutError::Range(RangeError::Conflict {
                            name,
                            free: free.to_string(),
                        })
                    );
                }
                m.add(field_bit, r.bit, r.width);
                field_bit += r.width;
            }
            m.compact();

            if pointer.is_some() {
                let claimed = field_bit - shift;
                let need = eng.abi().pointer_size() * 8 - shift;
                if claimed != need {
                    return err!(
                        span,
                        LayoutError::Range(RangeError::PointerWidth {
                            name,
                            width: claimed,
                            need,
                        })
                    );
                }
            }
            (m, field_bit)
        }

        FieldSpecifier::Auto { width } => {
            let shift = pointer.unwrap_or(0);
            let width = match (*width, pointer) {
                (Some(w), Some(_)) => {
                    let need = eng.abi().pointer_size() * 8 - shift;
                    if w != need {
                        return err!(
                            span,
                            LayoutError::Range(RangeError::PointerWidth {
                                name,
                                width: w,
                                need,
                            })
                        );
                    }
                    w
                }
                (Some(w), None) => w,
                (None, Some(_)) => eng.abi().pointer_size() * 8 - shift,
                (None, None) => match f.ty {
                    Some(ty) => match eng.type_bitsize(top, ty)? {
                        Some(b) => b,
                        None => eng.type_size(top, ty)? * 8,
                    },
                    None => return err!(span, LayoutError::NonScalar),
                },
            };

            let start = match free.alloc(width) {
                Some(s) => s,
                None => {
                    return err!(
                        span,
                        LayoutError::Range(RangeError::OutOfBits {
                            name,
                            width,
                            free: free.to_string(),
                        })
                    )
                }
            };
            let mut m = FieldMapping::new(shift);
            m.add(shift, start, width);
            (m, shift + width)
        }
    };

    if let Some(ty) = f.ty {
        mapping.signed = eng.type_signed(top, ty)?;

        let t = top.ty(ty);
        if (t.is_const() || const_members) && t.is_writeonly() {
            return err!(span, LayoutError::ConstWriteonly { name });
        }

        let type_bits = eng.type_size(top, ty)? * 8;
        if type_bits < bit_length {
            return err!(
                span,
                LayoutError::Range(RangeError::TooManyBits {
                    name,
                    bits: bit_length,
                    max: type_bits,
                })
            );
        }
        if let Some(need) = eng.type_bitsize(top, ty)? {
            if need > bit_length {
                return err!(
                    span,
                    LayoutError::Range(RangeError::NotEnoughBits {
                        name,
                        bits: bit_length,
                        need,
                    })
                );
            }
        }
    }

    mapping.length = bit_length;
    split_units(&mut mapping, unit_size);
    Ok(Some(mapping))
}

fn field_name(eng: &Engine, f: &BitFieldField) -> LayoutResult<String> {
    let name = eng.str(f.name, f.span)?;
    match f.prefix {
        Some(p) => Ok(format!("{}_{}", eng.str(p, f.span)?, name)),
        None => Ok(name),
    }
}

/// Rejects member types with no scalar value representation.
fn scalar_check(top: &TopLevel, ty: TypeId, name: &str, span: Span) -> LayoutResult<()> {
    let complex = match top.ty(ty).kind {
        TypeKind::Array { .. } => true,
        TypeKind::Named { category, .. } => match category {
            Category::Structure | Category::Object | Category::Union => true,
            _ => false,
        },
        _ => false,
    };
    if complex {
        return err!(span, LayoutError::ComplexBitfieldMember { name: name.into() });
    }
    Ok(())
}

/// For a pointer member (directly or through an alternative), the number of
/// low bits implied zero by the pointee's alignment.
fn pointer_shift(eng: &mut Engine, top: &TopLevel, ty: TypeId) -> LayoutResult<Option<u64>> {
    match top.ty(ty).kind {
        TypeKind::Pointer { pointee } => {
            let align = eng.type_align(top, pointee)?;
            Ok(Some(align.trailing_zeros() as u64))
        }
        TypeKind::Named { def: Some(def), .. } => match &top.def(def).kind {
            DefKind::Alternative(a) => pointer_shift(eng, top, a.ty),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

fn unit_size_for(length: u64) -> u64 {
    match length {
        0..=8 => 8,
        9..=16 => 16,
        17..=32 => 32,
        _ => 64,
    }
}

/// Splits every physical run at storage unit boundaries.  Accessors operate
/// one unit at a time, so no recorded run may straddle two units.
fn split_units(m: &mut FieldMapping, unit_size: u64) {
    let mut split = Vec::with_capacity(m.maps.len());
    for fm in &m.maps {
        let mut field_bit = fm.field_bit;
        let mut mapped_bit = fm.mapped_bit;
        let mut rest = fm.length;
        loop {
            let room = unit_size - mapped_bit % unit_size;
            if rest <= room {
                split.push(FieldMap {
                    field_bit,
                    mapped_bit,
                    length: rest,
                });
                break;
            }
            split.push(FieldMap {
                field_bit,
                mapped_bit,
                length: room,
            });
            field_bit += room;
            mapped_bit += room;
            rest -= room;
        }
    }
    m.maps = split;
}

fn run_mask(length: u64) -> u64 {
    if length >= 64 {
        u64::MAX
    } else {
        (1u64 << length) - 1
    }
}

/// Writes a member's default value into the per-unit initial values,
/// clearing the member's bits first so a member added over a deleted or
/// reserved range replaces the old default.
fn apply_default(init: &mut [u64], m: &FieldMapping, value: i128, unit_size: u64) {
    for fm in &m.maps {
        let mask = run_mask(fm.length);
        let unit = (fm.mapped_bit / unit_size) as usize;
        let shift = fm.mapped_bit % unit_size;
        let bits = (value >> fm.field_bit.min(127)) as u64 & mask;
        init[unit] &= !(mask << shift);
        init[unit] |= bits << shift;
    }
}
