use sable_tree::AstId;
use serde::{Deserialize, Serialize};

use crate::data::{CompositeType, FormalDetail, FunctionType, TupleType, TypeData};
use crate::interner::{TypeId, TypeInterner};
use crate::kind::QualifiedType;

/// An ordered generic-substitution map: the declaration id of a `type` or
/// `param` variable to the qualified type (or param value) filling it.
///
/// Kept sorted by declaration id so equal substitutions compare and hash
/// equal regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Substitution(Vec<(AstId, QualifiedType)>);

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, decl: AstId, qt: QualifiedType) {
        match self.0.binary_search_by_key(&decl, |&(id, _)| id) {
            Ok(index) => self.0[index].1 = qt,
            Err(index) => self.0.insert(index, (decl, qt)),
        }
    }

    pub fn get(&self, decl: AstId) -> Option<QualifiedType> {
        self.0
            .binary_search_by_key(&decl, |&(id, _)| id)
            .ok()
            .map(|index| self.0[index].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(AstId, QualifiedType)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(AstId, QualifiedType)> for Substitution {
    fn from_iter<I: IntoIterator<Item = (AstId, QualifiedType)>>(iter: I) -> Self {
        let mut subs = Self::new();
        for (decl, qt) in iter {
            subs.insert(decl, qt);
        }
        subs
    }
}

/// Rewrites every type-variable occurrence in `ty` through `subs`,
/// interning rebuilt composites. Unbound variables stay in place.
pub fn substitute(types: &mut TypeInterner, ty: TypeId, subs: &Substitution) -> TypeId {
    let data = types.get(ty).clone();

    match data {
        TypeData::TypeVar(var) => subs.get(var.decl).map(|qt| qt.ty).unwrap_or(ty),
        TypeData::Class { basic, decorator } => {
            let new_basic = substitute(types, basic, subs);
            if new_basic == basic {
                ty
            } else {
                types.intern(TypeData::Class {
                    basic: new_basic,
                    decorator,
                })
            }
        }
        TypeData::Tuple(tuple) => {
            let elems: Vec<QualifiedType> = tuple
                .elems
                .iter()
                .map(|qt| QualifiedType {
                    ty: substitute(types, qt.ty, subs),
                    ..*qt
                })
                .collect();
            if elems == tuple.elems {
                ty
            } else {
                types.intern(TypeData::Tuple(TupleType { elems }))
            }
        }
        TypeData::Array { elem, domain } => {
            let new_elem = substitute(types, elem, subs);
            let new_domain = substitute(types, domain, subs);
            if new_elem == elem && new_domain == domain {
                ty
            } else {
                types.intern(TypeData::Array {
                    elem: new_elem,
                    domain: new_domain,
                })
            }
        }
        TypeData::Function(func) => {
            let formals: Vec<FormalDetail> = func
                .formals
                .iter()
                .map(|detail| FormalDetail {
                    qt: QualifiedType {
                        ty: substitute(types, detail.qt.ty, subs),
                        ..detail.qt
                    },
                    ..*detail
                })
                .collect();
            let return_type = QualifiedType {
                ty: substitute(types, func.return_type.ty, subs),
                ..func.return_type
            };
            if formals == func.formals && return_type == func.return_type {
                ty
            } else {
                types.intern(TypeData::Function(FunctionType {
                    formals,
                    return_type,
                    where_result: func.where_result,
                }))
            }
        }
        TypeData::Record(c) => {
            let rebuilt = substitute_composite(types, &c, subs);
            if rebuilt == c {
                ty
            } else {
                types.intern(TypeData::Record(rebuilt))
            }
        }
        TypeData::Union(c) => {
            let rebuilt = substitute_composite(types, &c, subs);
            if rebuilt == c {
                ty
            } else {
                types.intern(TypeData::Union(rebuilt))
            }
        }
        TypeData::BasicClass(c) => {
            let rebuilt = substitute_composite(types, &c, subs);
            if rebuilt == c {
                ty
            } else {
                types.intern(TypeData::BasicClass(rebuilt))
            }
        }
        _ => ty,
    }
}

fn substitute_composite(
    types: &mut TypeInterner,
    composite: &CompositeType,
    subs: &Substitution,
) -> CompositeType {
    let mut substitution = Substitution::new();
    for &(decl, qt) in composite.substitution.iter() {
        substitution.insert(
            decl,
            QualifiedType {
                ty: substitute(types, qt.ty, subs),
                ..qt
            },
        );
    }
    CompositeType {
        substitution,
        ..composite.clone()
    }
}

/// Structural match of `formal` against `actual` under accumulated
/// assumptions: type variables bind on first contact and must agree on
/// every later one.
pub fn match_types(
    types: &TypeInterner,
    formal: TypeId,
    actual: TypeId,
    assumptions: &mut Substitution,
) -> bool {
    if formal == actual {
        return true;
    }

    match (types.get(formal), types.get(actual)) {
        (TypeData::TypeVar(var), _) => match assumptions.get(var.decl) {
            Some(bound) => bound.ty == actual,
            None => {
                assumptions.insert(var.decl, QualifiedType::type_of(actual));
                true
            }
        },
        (TypeData::AnyType, _) => true,
        (TypeData::AnyNumeric, data) => data.is_numeric(),
        (
            TypeData::Class {
                basic: fb,
                decorator: fd,
            },
            TypeData::Class {
                basic: ab,
                decorator: ad,
            },
        ) => fd == ad && match_types(types, *fb, *ab, assumptions),
        (TypeData::Tuple(f), TypeData::Tuple(a)) => {
            f.elems.len() == a.elems.len()
                && f.elems
                    .iter()
                    .zip(&a.elems)
                    .all(|(f, a)| match_types(types, f.ty, a.ty, assumptions))
        }
        (
            TypeData::Array {
                elem: fe,
                domain: fd,
            },
            TypeData::Array {
                elem: ae,
                domain: ad,
            },
        ) => {
            match_types(types, *fe, *ae, assumptions) && match_types(types, *fd, *ad, assumptions)
        }
        (TypeData::Record(f), TypeData::Record(a))
        | (TypeData::Union(f), TypeData::Union(a))
        | (TypeData::BasicClass(f), TypeData::BasicClass(a)) => {
            // a generic root matches any instantiation of itself
            f.decl == a.decl
                || types.generic_root(actual) == formal
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TypeVarType;
    use sable_utils::interner::StrInterner;

    #[test]
    fn substitution_is_order_independent() {
        let mut strings = StrInterner::new();
        let a = AstId::symbol_root(strings.intern("M.R.t"));
        let b = AstId::symbol_root(strings.intern("M.R.u"));

        let mut types = TypeInterner::new();
        let int = types.int_default();
        let boolean = types.bool_();

        let mut first = Substitution::new();
        first.insert(a, QualifiedType::type_of(int));
        first.insert(b, QualifiedType::type_of(boolean));

        let mut second = Substitution::new();
        second.insert(b, QualifiedType::type_of(boolean));
        second.insert(a, QualifiedType::type_of(int));

        assert_eq!(first, second);
    }

    #[test]
    fn substitute_rewrites_type_vars() {
        let mut strings = StrInterner::new();
        let decl = AstId::symbol_root(strings.intern("M.R.t"));
        let name = strings.intern("t");

        let mut types = TypeInterner::new();
        let var = types.intern(TypeData::TypeVar(TypeVarType { decl, name }));
        let int = types.int_default();
        let tuple = types.intern(TypeData::Tuple(TupleType {
            elems: vec![QualifiedType::var(var), QualifiedType::var(int)],
        }));

        let mut subs = Substitution::new();
        subs.insert(decl, QualifiedType::type_of(int));

        let rewritten = substitute(&mut types, tuple, &subs);
        let expected = types.intern(TypeData::Tuple(TupleType {
            elems: vec![QualifiedType::var(int), QualifiedType::var(int)],
        }));
        assert_eq!(rewritten, expected);
    }

    #[test]
    fn match_binds_then_checks() {
        let mut strings = StrInterner::new();
        let decl = AstId::symbol_root(strings.intern("M.f.t"));
        let name = strings.intern("t");

        let mut types = TypeInterner::new();
        let var = types.intern(TypeData::TypeVar(TypeVarType { decl, name }));
        let int = types.int_default();
        let boolean = types.bool_();

        let mut assumptions = Substitution::new();
        assert!(match_types(&types, var, int, &mut assumptions));
        assert!(match_types(&types, var, int, &mut assumptions));
        assert!(!match_types(&types, var, boolean, &mut assumptions));
    }
}
