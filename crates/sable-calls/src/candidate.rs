use sable_types::{CanPass, QtKind, QualifiedType, TypeData, TypeInterner};
use sable_utils::interner::StrKey;
use serde::{Deserialize, Serialize};

use crate::sig::{SigId, SignatureStore, TypedSignature};

/// The actual shape of one call site, with every actual already resolved to
/// a qualified type.
#[derive(Debug, Clone, Default)]
pub struct CallShape {
    pub actuals: Vec<QualifiedType>,
    pub names: Vec<Option<StrKey>>,
    pub receiver: Option<QualifiedType>,
}

/// How one formal receives its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Binding {
    Receiver,
    Actual(usize),
    Default,
}

/// Formal-to-actual mapping of one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormalActualMap {
    /// Per formal, in declaration order.
    pub bindings: Vec<Binding>,
    pub out_of_order: bool,
    pub uses_defaults: bool,
}

/// Builds the formal-to-actual mapping, or rejects the candidate.
///
/// Positional actuals bind formals in declaration order; named actuals
/// match formal names, rejecting duplicates and unknowns; unbound formals
/// need a declared default; the receiver occupies formal 0 of methods.
pub fn map_actuals(sig: &TypedSignature, shape: &CallShape) -> Option<FormalActualMap> {
    let mut bindings: Vec<Option<Binding>> = vec![None; sig.formals.len()];
    let mut first_positional = 0;

    if sig.is_method {
        shape.receiver?;
        if sig.formals.is_empty() {
            return None;
        }
        bindings[0] = Some(Binding::Receiver);
        first_positional = 1;
    } else if shape.receiver.is_some() {
        return None;
    }

    let mut next_formal = first_positional;
    for (index, name) in shape.names.iter().enumerate() {
        match name {
            None => {
                // next unbound formal in declaration order
                while next_formal < bindings.len() && bindings[next_formal].is_some() {
                    next_formal += 1;
                }
                if next_formal == bindings.len() {
                    return None;
                }
                bindings[next_formal] = Some(Binding::Actual(index));
            }
            Some(name) => {
                let position = sig.formals.iter().position(|formal| formal.name == *name)?;
                if position < first_positional || bindings[position].is_some() {
                    return None;
                }
                bindings[position] = Some(Binding::Actual(index));
            }
        }
    }

    let mut uses_defaults = false;
    let bindings: Vec<Binding> = bindings
        .into_iter()
        .enumerate()
        .map(|(formal, binding)| match binding {
            Some(binding) => Some(binding),
            None if sig.formals[formal].has_default => {
                uses_defaults = true;
                Some(Binding::Default)
            }
            None => None,
        })
        .collect::<Option<_>>()?;

    // out of order when a later actual lands on an earlier formal
    let mut last_actual: Option<usize> = None;
    let mut out_of_order = false;
    for binding in &bindings {
        if let Binding::Actual(index) = binding {
            if let Some(last) = last_actual {
                if *index < last {
                    out_of_order = true;
                }
            }
            last_actual = Some(*index);
        }
    }

    Some(FormalActualMap {
        bindings,
        out_of_order,
        uses_defaults,
    })
}

/// One admissible candidate after mapping and passability checks.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub sig: SigId,
    pub map: FormalActualMap,
    /// Per formal, in declaration order; defaults count as identity.
    pub conversions: Vec<CanPass>,
    /// Came out of the generic instantiator.
    pub was_generic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disambiguation {
    Best(usize),
    Ambiguous(Vec<usize>),
    Empty,
}

/// Selects the most specific candidate by the ordered rules: concrete over
/// instantiated, narrower numeric formals, fewer coercions, value over
/// reference, user over compiler-generated; surviving ties are ambiguous.
pub fn most_specific(
    store: &SignatureStore,
    types: &TypeInterner,
    candidates: &[Candidate],
) -> Disambiguation {
    if candidates.is_empty() {
        return Disambiguation::Empty;
    }
    if candidates.len() == 1 {
        return Disambiguation::Best(0);
    }

    let scores: Vec<Score> = candidates
        .iter()
        .map(|candidate| score(store, types, candidate))
        .collect();
    let best = scores.iter().min().expect("non-empty scores");
    let tied: Vec<usize> = scores
        .iter()
        .enumerate()
        .filter(|(_, score)| *score == best)
        .map(|(index, _)| index)
        .collect();

    if tied.len() == 1 {
        Disambiguation::Best(tied[0])
    } else {
        Disambiguation::Ambiguous(tied)
    }
}

/// Lexicographic specificity key; lower is more specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Score {
    instantiated: bool,
    numeric_width: u32,
    coercions: u32,
    ref_formals: u32,
    compiler_generated: bool,
}

fn score(store: &SignatureStore, types: &TypeInterner, candidate: &Candidate) -> Score {
    let sig = store.get(candidate.sig);

    let numeric_width: u32 = sig
        .formals
        .iter()
        .map(|formal| match types.get(formal.qt.ty) {
            TypeData::Int(w) | TypeData::Uint(w) | TypeData::Real(w) => *w as u32,
            TypeData::AnyNumeric => 128,
            _ => 0,
        })
        .sum();

    let coercions = candidate
        .conversions
        .iter()
        .filter(|conversion| conversion.is_coercion())
        .count() as u32;

    let ref_formals = sig
        .formals
        .iter()
        .filter(|formal| matches!(formal.qt.kind, QtKind::Ref | QtKind::ConstRef))
        .count() as u32;

    Score {
        instantiated: candidate.was_generic,
        numeric_width,
        coercions,
        ref_formals,
        compiler_generated: sig.is_compiler_generated(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sig::SignatureKind;
    use sable_tree::node::Intent;
    use sable_tree::AstId;
    use sable_types::{ConversionKind, FormalDetail, WhereResult};
    use sable_utils::interner::StrInterner;

    fn signature(
        strings: &mut StrInterner,
        types: &mut TypeInterner,
        formals: &[(&str, bool)],
    ) -> TypedSignature {
        let int = types.int_default();
        TypedSignature {
            untyped: AstId::symbol_root(strings.intern("M.f")),
            name: strings.intern("f"),
            kind: SignatureKind::User,
            is_method: false,
            parenless: false,
            formals: formals
                .iter()
                .map(|(name, has_default)| FormalDetail {
                    name: strings.intern(name),
                    intent: Intent::ConstIn,
                    qt: QualifiedType::const_in(int),
                    has_default: *has_default,
                })
                .collect(),
            return_type: QualifiedType::var(int),
            where_result: WhereResult::None,
            needs_instantiation: false,
            instantiation: None,
        }
    }

    fn shape(types: &mut TypeInterner, names: &[Option<&str>], strings: &mut StrInterner) -> CallShape {
        let int = types.int_default();
        CallShape {
            actuals: vec![QualifiedType::var(int); names.len()],
            names: names
                .iter()
                .map(|name| name.map(|n| strings.intern(n)))
                .collect(),
            receiver: None,
        }
    }

    #[test]
    fn positional_actuals_bind_in_order() {
        let mut strings = StrInterner::new();
        let mut types = TypeInterner::new();
        let sig = signature(&mut strings, &mut types, &[("a", false), ("b", false)]);
        let shape = shape(&mut types, &[None, None], &mut strings);

        let map = map_actuals(&sig, &shape).unwrap();
        assert_eq!(map.bindings, vec![Binding::Actual(0), Binding::Actual(1)]);
        assert!(!map.out_of_order);
        assert!(!map.uses_defaults);
    }

    #[test]
    fn named_actuals_may_come_out_of_order() {
        let mut strings = StrInterner::new();
        let mut types = TypeInterner::new();
        let sig = signature(&mut strings, &mut types, &[("a", false), ("b", false)]);
        let shape = shape(&mut types, &[Some("b"), Some("a")], &mut strings);

        let map = map_actuals(&sig, &shape).unwrap();
        assert_eq!(map.bindings, vec![Binding::Actual(1), Binding::Actual(0)]);
        assert!(map.out_of_order);
    }

    #[test]
    fn duplicates_unknowns_and_missing_reject() {
        let mut strings = StrInterner::new();
        let mut types = TypeInterner::new();
        let sig = signature(&mut strings, &mut types, &[("a", false), ("b", false)]);

        let duplicate = shape(&mut types, &[Some("a"), Some("a")], &mut strings);
        assert!(map_actuals(&sig, &duplicate).is_none());

        let unknown = shape(&mut types, &[Some("zz")], &mut strings);
        assert!(map_actuals(&sig, &unknown).is_none());

        let missing = shape(&mut types, &[None], &mut strings);
        assert!(map_actuals(&sig, &missing).is_none());
    }

    #[test]
    fn unbound_formals_fall_back_to_defaults() {
        let mut strings = StrInterner::new();
        let mut types = TypeInterner::new();
        let sig = signature(&mut strings, &mut types, &[("a", false), ("b", true)]);
        let shape = shape(&mut types, &[None], &mut strings);

        let map = map_actuals(&sig, &shape).unwrap();
        assert_eq!(map.bindings, vec![Binding::Actual(0), Binding::Default]);
        assert!(map.uses_defaults);
    }

    #[test]
    fn disambiguation_is_total() {
        let mut strings = StrInterner::new();
        let mut types = TypeInterner::new();
        let mut store = SignatureStore::new();

        let sig = signature(&mut strings, &mut types, &[("a", false)]);
        let id = store.intern(sig);
        let identity = CanPass::pass(ConversionKind::Identity);
        let widened = CanPass::pass(ConversionKind::NumericWidening);

        let exact = Candidate {
            sig: id,
            map: FormalActualMap {
                bindings: vec![Binding::Actual(0)],
                out_of_order: false,
                uses_defaults: false,
            },
            conversions: vec![identity],
            was_generic: false,
        };
        let mut coerced = exact.clone();
        coerced.conversions = vec![widened];

        assert_eq!(
            most_specific(&store, &types, &[coerced.clone(), exact.clone()]),
            Disambiguation::Best(1)
        );
        assert_eq!(
            most_specific(&store, &types, &[exact.clone(), exact]),
            Disambiguation::Ambiguous(vec![0, 1])
        );
        assert_eq!(most_specific(&store, &types, &[]), Disambiguation::Empty);
    }
}
