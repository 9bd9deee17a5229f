use sable_types::{CanPass, ConversionKind};
use serde::{Deserialize, Serialize};

use crate::candidate::{Binding, CallShape, FormalActualMap};
use crate::sig::{SigId, SignatureKind, SignatureStore, TypedSignature};

/// Canonical key of a call site's shape against one callee: actual order,
/// defaulted formals and per-formal coercions. Wrapper synthesis is a pure
/// function of `(callee, shape)`, so equal shapes intern to the same
/// wrapper signatures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShapeKey {
    pub actual_order: Vec<u8>,
    pub defaulted: Vec<u8>,
    pub coerced: Vec<(u8, ConversionKind)>,
}

impl ShapeKey {
    pub fn of(map: &FormalActualMap, conversions: &[CanPass]) -> Self {
        let mut actual_order = Vec::new();
        let mut defaulted = Vec::new();
        for (formal, binding) in map.bindings.iter().enumerate() {
            match binding {
                Binding::Actual(index) => {
                    let _ = index;
                    actual_order.push(formal as u8);
                }
                Binding::Default => defaulted.push(formal as u8),
                Binding::Receiver => {}
            }
        }

        let coerced = conversions
            .iter()
            .enumerate()
            .filter(|(_, conversion)| conversion.is_coercion())
            .map(|(formal, conversion)| (formal as u8, conversion.conversion))
            .collect();

        Self {
            actual_order,
            defaulted,
            coerced,
        }
    }

    pub fn needs_order_wrapper(&self, map: &FormalActualMap) -> bool {
        map.out_of_order
    }
}

/// Synthesizes the wrappers a call site needs around `callee`: a default
/// wrapper when formals fall back to defaults, an order wrapper when
/// actuals arrive out of formal order, and a coercion wrapper when actuals
/// convert on the way in. Signatures are hash-consed, so one wrapper per
/// `(callee, shape)` exists per compilation.
pub fn synthesize_wrappers(
    store: &mut SignatureStore,
    callee: SigId,
    map: &FormalActualMap,
    conversions: &[CanPass],
    shape: &CallShape,
) -> Vec<SigId> {
    let mut wrappers = Vec::new();
    let original = store.get(callee).clone();

    if map.uses_defaults {
        // formals in declaration order minus the defaulted ones; the body
        // constructs each default locally and forwards
        let formals = original
            .formals
            .iter()
            .zip(&map.bindings)
            .filter(|(_, binding)| !matches!(binding, Binding::Default))
            .map(|(formal, _)| *formal)
            .collect();
        wrappers.push(store.intern(TypedSignature {
            kind: SignatureKind::DefaultWrapper,
            formals,
            needs_instantiation: false,
            ..original.clone()
        }));
    }

    if map.out_of_order {
        // formals re-ordered to the call site's actual order; the body
        // forwards in formal order
        let mut order: Vec<(usize, usize)> = map
            .bindings
            .iter()
            .enumerate()
            .filter_map(|(formal, binding)| match binding {
                Binding::Actual(actual) => Some((*actual, formal)),
                _ => None,
            })
            .collect();
        order.sort_unstable();
        let formals = order
            .iter()
            .map(|&(_, formal)| original.formals[formal])
            .collect();
        wrappers.push(store.intern(TypedSignature {
            kind: SignatureKind::OrderWrapper,
            formals,
            needs_instantiation: false,
            ..original.clone()
        }));
    }

    let coerces = conversions.iter().any(|conversion| conversion.is_coercion());
    if coerces {
        // formals take the pre-coercion actual types; the body introduces a
        // typed temporary per coerced actual and forwards it
        let formals = original
            .formals
            .iter()
            .zip(&map.bindings)
            .map(|(formal, binding)| match binding {
                Binding::Actual(actual) => {
                    let mut formal = *formal;
                    formal.qt = sable_types::QualifiedType {
                        kind: formal.qt.kind,
                        ty: shape.actuals[*actual].ty,
                        param: shape.actuals[*actual].param,
                    };
                    formal
                }
                _ => *formal,
            })
            .collect();
        wrappers.push(store.intern(TypedSignature {
            kind: SignatureKind::CoercionWrapper,
            formals,
            needs_instantiation: false,
            ..original
        }));
    }

    wrappers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::map_actuals;
    use sable_tree::node::Intent;
    use sable_tree::AstId;
    use sable_types::{FormalDetail, QualifiedType, TypeInterner, WhereResult};
    use sable_utils::interner::StrInterner;

    #[test]
    fn wrappers_are_minimal_per_shape() {
        let mut strings = StrInterner::new();
        let mut types = TypeInterner::new();
        let mut store = SignatureStore::new();
        let int = types.int_default();

        let sig = TypedSignature {
            untyped: AstId::symbol_root(strings.intern("M.f")),
            name: strings.intern("f"),
            kind: SignatureKind::User,
            is_method: false,
            parenless: false,
            formals: vec![
                FormalDetail {
                    name: strings.intern("a"),
                    intent: Intent::ConstIn,
                    qt: QualifiedType::const_in(int),
                    has_default: false,
                },
                FormalDetail {
                    name: strings.intern("b"),
                    intent: Intent::ConstIn,
                    qt: QualifiedType::const_in(int),
                    has_default: false,
                },
            ],
            return_type: QualifiedType::var(int),
            where_result: WhereResult::None,
            needs_instantiation: false,
            instantiation: None,
        };
        let callee = store.intern(sig.clone());

        let shape = CallShape {
            actuals: vec![QualifiedType::var(int), QualifiedType::var(int)],
            names: vec![
                Some(strings.intern("b")),
                Some(strings.intern("a")),
            ],
            receiver: None,
        };
        let map = map_actuals(&sig, &shape).unwrap();
        let conversions = vec![CanPass::pass(ConversionKind::Identity); 2];

        let first = synthesize_wrappers(&mut store, callee, &map, &conversions, &shape);
        let second = synthesize_wrappers(&mut store, callee, &map, &conversions, &shape);

        assert_eq!(first.len(), 1);
        assert_eq!(first, second, "equal shapes share one wrapper");
        assert!(store.get(first[0]).kind.is_wrapper());
    }
}
