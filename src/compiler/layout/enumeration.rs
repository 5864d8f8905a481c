//! Enumeration layout: value allocation, uniqueness checks, and selection
//! of the backing C integer type.

use std::collections::HashSet;

use super::{Engine, LayoutError, LayoutResult};
use crate::compiler::abi::bit_length;
use crate::compiler::ir::{Category, DefId, DefKind, EnumLayout, Enumerator, TopLevel};
use crate::err;

pub(super) fn layout_enum(
    eng: &mut Engine,
    top: &TopLevel,
    id: DefId,
) -> LayoutResult<(EnumLayout, Vec<i128>)> {
    let def = top.def(id);
    let span = def.span;
    let name = eng.str(def.name, span)?;

    let (enumerators, explicit): (&[Enumerator], bool) = match &def.kind {
        DefKind::Enumeration(e) => (&e.enumerators, e.explicit),
        _ => (&[], false),
    };

    if enumerators.is_empty() {
        return err!(
            span,
            LayoutError::Empty {
                name,
                category: Category::Enumeration,
            }
        );
    }

    let mut seen = HashSet::new();
    for e in enumerators {
        let n = eng.str(e.name, e.span)?;
        if !seen.insert(n.clone()) {
            return err!(e.span, LayoutError::DuplicateEnumeratorName { name: n });
        }
    }

    let mut values: Vec<Option<i128>> = vec![None; enumerators.len()];
    let mut used = HashSet::new();

    // Explicit values first, in declaration order.  A first enumerator with
    // no written value counts as an explicit zero.
    for (i, e) in enumerators.iter().enumerate() {
        let v = match e.value {
            Some(expr) => eng.eval(top, expr)?,
            None if i == 0 => {
                if explicit {
                    let n = eng.str(e.name, e.span)?;
                    return err!(e.span, LayoutError::AutoEnumeratorInExplicit { name: n });
                }
                0
            }
            None => continue,
        };
        if !used.insert(v) {
            let n = eng.str(e.name, e.span)?;
            return err!(
                e.span,
                LayoutError::DuplicateEnumeratorValue { name: n, value: v }
            );
        }
        values[i] = Some(v);
    }

    // Auto allocation continues from the previous enumerator's value,
    // whichever way it was assigned.
    let mut last = 0i128;
    for (i, e) in enumerators.iter().enumerate() {
        match values[i] {
            Some(v) => last = v,
            None => {
                if explicit {
                    let n = eng.str(e.name, e.span)?;
                    return err!(e.span, LayoutError::AutoEnumeratorInExplicit { name: n });
                }
                let v = match last.checked_add(1) {
                    Some(v) => v,
                    None => return err!(e.span, LayoutError::Overflow),
                };
                if !used.insert(v) {
                    let n = eng.str(e.name, e.span)?;
                    return err!(
                        e.span,
                        LayoutError::DuplicateEnumeratorValue { name: n, value: v }
                    );
                }
                values[i] = Some(v);
                last = v;
            }
        }
    }

    let values: Vec<i128> = values.into_iter().flatten().collect();
    let min = values.iter().copied().min().unwrap_or(0);
    let max = values.iter().copied().max().unwrap_or(0);

    let props = match eng.abi().enum_properties(min, max) {
        Ok(p) => p,
        Err(e) => return err!(span, LayoutError::Abi(e)),
    };

    let extreme_name = |target: i128| {
        enumerators
            .iter()
            .zip(&values)
            .find(|(_, v)| **v == target)
            .map(|(e, _)| e.name)
    };
    let min_name = match extreme_name(min) {
        Some(n) => n,
        None => return err!(span, LayoutError::StringNotFound),
    };
    let max_name = match extreme_name(max) {
        Some(n) => n,
        None => return err!(span, LayoutError::StringNotFound),
    };

    let layout = EnumLayout {
        size: props.size,
        align: props.align,
        signed: props.signed,
        bitsize: bit_length(min).max(bit_length(max)) as u64,
        min,
        max,
        min_name,
        max_name,
    };

    Ok((layout, values))
}

#[cfg(test)]
mod tests {
    use super::super::testutil::Builder;
    use super::super::{update, Engine};
    use super::*;
    use crate::compiler::abi::AArch64Abi;
    use crate::compiler::ir::{EnumDef, ExprId};
    use crate::compiler::Span;

    fn enumerator(b: &mut Builder, name: &str, value: Option<ExprId>) -> Enumerator {
        Enumerator::new(b.name(name), value, Span::zero())
    }

    fn enum_of(b: &mut Builder, name: &str, enumerators: Vec<Enumerator>, explicit: bool) -> DefId {
        b.def(
            name,
            DefKind::Enumeration(EnumDef {
                enumerators,
                explicit,
                layout: None,
            }),
        )
    }

    fn layout_of(b: &mut Builder, id: DefId) -> LayoutResult<(EnumLayout, Vec<i128>)> {
        let abi = AArch64Abi::new();
        let mut eng = Engine::new(&abi, &b.strings);
        layout_enum(&mut eng, &b.top, id)
    }

    #[test]
    fn values_allocate_from_zero() {
        let mut b = Builder::new();
        let e1 = enumerator(&mut b, "red", None);
        let e2 = enumerator(&mut b, "green", None);
        let ten = b.lit(10);
        let e3 = enumerator(&mut b, "blue", Some(ten));
        let e4 = enumerator(&mut b, "cyan", None);
        let id = enum_of(&mut b, "color", vec![e1, e2, e3, e4], false);

        let (l, values) = layout_of(&mut b, id).unwrap();
        assert_eq!(values, vec![0, 1, 10, 11]);
        assert_eq!((l.min, l.max), (0, 11));
        assert_eq!((l.size, l.align, l.signed), (4, 4, false));
        assert_eq!(l.bitsize, 4);
    }

    #[test]
    fn auto_value_may_collide_with_a_later_explicit() {
        // the explicit 1 is taken first, so the auto after 0 collides
        let mut b = Builder::new();
        let e1 = enumerator(&mut b, "zero", None);
        let e2 = enumerator(&mut b, "auto", None);
        let one = b.lit(1);
        let e3 = enumerator(&mut b, "one", Some(one));
        let id = enum_of(&mut b, "clash", vec![e1, e2, e3], false);

        let err = layout_of(&mut b, id).unwrap_err();
        assert_eq!(
            *err.inner(),
            LayoutError::DuplicateEnumeratorValue {
                name: "auto".into(),
                value: 1,
            }
        );
    }

    #[test]
    fn duplicate_explicit_values_are_rejected() {
        let mut b = Builder::new();
        let five_a = b.lit(5);
        let five_b = b.lit(5);
        let e1 = enumerator(&mut b, "first", Some(five_a));
        let e2 = enumerator(&mut b, "second", Some(five_b));
        let id = enum_of(&mut b, "dup", vec![e1, e2], false);

        let err = layout_of(&mut b, id).unwrap_err();
        assert_eq!(
            *err.inner(),
            LayoutError::DuplicateEnumeratorValue {
                name: "second".into(),
                value: 5,
            }
        );
    }

    #[test]
    fn explicit_enumeration_requires_values() {
        let mut b = Builder::new();
        let one = b.lit(1);
        let e1 = enumerator(&mut b, "first", Some(one));
        let e2 = enumerator(&mut b, "second", None);
        let id = enum_of(&mut b, "strict", vec![e1, e2], true);

        let err = layout_of(&mut b, id).unwrap_err();
        assert_eq!(
            *err.inner(),
            LayoutError::AutoEnumeratorInExplicit {
                name: "second".into()
            }
        );
    }

    #[test]
    fn negative_values_select_a_signed_type() {
        let mut b = Builder::new();
        let one = b.lit(1);
        let neg = b.expr(crate::compiler::ir::ExprKind::Unary {
            op: crate::compiler::ir::UnaryOp::Minus,
            arg: one,
        });
        let e1 = enumerator(&mut b, "minus", Some(neg));
        let e2 = enumerator(&mut b, "plus", None);
        let id = enum_of(&mut b, "signed", vec![e1, e2], false);

        let (l, values) = layout_of(&mut b, id).unwrap();
        assert_eq!(values, vec![-1, 0]);
        assert!(l.signed);
        assert_eq!((l.size, l.align), (4, 4));
    }

    #[test]
    fn extreme_names_track_min_and_max() {
        let mut b = Builder::new();
        let seven = b.lit(7);
        let two = b.lit(2);
        let e1 = enumerator(&mut b, "top", Some(seven));
        let e2 = enumerator(&mut b, "bottom", Some(two));
        let id = enum_of(&mut b, "range", vec![e1, e2], false);

        let (l, _) = layout_of(&mut b, id).unwrap();
        assert_eq!(b.strings.get(l.min_name).unwrap(), "bottom");
        assert_eq!(b.strings.get(l.max_name).unwrap(), "top");
    }

    #[test]
    fn duplicate_enumerator_names_are_rejected() {
        let mut b = Builder::new();
        let e1 = enumerator(&mut b, "same", None);
        let e2 = enumerator(&mut b, "same", None);
        let id = enum_of(&mut b, "dup", vec![e1, e2], false);

        let err = layout_of(&mut b, id).unwrap_err();
        assert_eq!(
            *err.inner(),
            LayoutError::DuplicateEnumeratorName {
                name: "same".into()
            }
        );
    }

    #[test]
    fn empty_enumeration_is_an_error() {
        let mut b = Builder::new();
        let id = enum_of(&mut b, "none", vec![], false);

        let err = layout_of(&mut b, id).unwrap_err();
        assert_eq!(
            *err.inner(),
            LayoutError::Empty {
                name: "none".into(),
                category: Category::Enumeration,
            }
        );
    }

    #[test]
    fn wide_ranges_widen_the_backing_type() {
        let mut b = Builder::new();
        let big = b.lit(1 << 40);
        let e1 = enumerator(&mut b, "huge", Some(big));
        let id = enum_of(&mut b, "wide", vec![e1], false);

        let (l, _) = layout_of(&mut b, id).unwrap();
        assert_eq!((l.size, l.align, l.signed), (8, 8, false));
        assert_eq!(l.bitsize, 41);
    }

    #[test]
    fn update_resolves_enumerator_values() {
        let mut b = Builder::new();
        let e1 = enumerator(&mut b, "a", None);
        let e2 = enumerator(&mut b, "b", None);
        let id = enum_of(&mut b, "pair", vec![e1, e2], false);

        let abi = AArch64Abi::new();
        update(&mut b.top, &abi, &b.strings).unwrap();

        match &b.top.def(id).kind {
            DefKind::Enumeration(e) => {
                assert_eq!(e.enumerators[0].resolved, Some(0));
                assert_eq!(e.enumerators[1].resolved, Some(1));
                assert!(e.layout.is_some());
            }
            k => panic!("expected enumeration, got {:?}", k),
        }
    }
}
