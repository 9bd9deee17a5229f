use derive_more::Display;
use sable_tree::node::Management;
use serde::{Deserialize, Serialize};

use crate::data::{Decorator, Nilability, TypeData};
use crate::interner::{TypeId, TypeInterner};
use crate::kind::{QtKind, QualifiedType};

/// The closed set of ways an actual reaches a formal.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ConversionKind {
    Identity,
    Subtype,
    NumericWidening,
    NumericNarrowing,
    ParamNarrowing,
    Borrowing,
    ToNilable,
    Instantiation,
    /// Record copy-conversion through `init=`; produced by assignment
    /// lowering rather than by implicit passing.
    InitEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanPass {
    pub passes: bool,
    pub conversion: ConversionKind,
}

impl CanPass {
    pub fn fail() -> Self {
        Self {
            passes: false,
            conversion: ConversionKind::Identity,
        }
    }

    pub fn pass(conversion: ConversionKind) -> Self {
        Self {
            passes: true,
            conversion,
        }
    }

    /// A passing conversion that changes representation, i.e. anything the
    /// backend realizes through a temporary.
    pub fn is_coercion(&self) -> bool {
        self.passes && self.conversion != ConversionKind::Identity
    }

    pub fn instantiates(&self) -> bool {
        self.passes && self.conversion == ConversionKind::Instantiation
    }
}

/// Classifies whether a value of `actual` can be bound to a formal of
/// `formal` implicitly, and through which conversion.
///
/// The `const ref` no-temporary rule is *not* enforced here; the call
/// resolver applies it after disambiguation so the diagnostic names the
/// chosen candidate. Use [`const_ref_violation`] for that check.
pub fn can_pass(types: &TypeInterner, actual: &QualifiedType, formal: &QualifiedType) -> CanPass {
    // poisoned expressions pass silently so one failure reports once
    if types.get(actual.ty).is_erroneous() || types.get(formal.ty).is_erroneous() {
        return CanPass::pass(ConversionKind::Identity);
    }

    // kind gates: type and param formals only take type and param actuals
    if formal.is_type() != actual.is_type() {
        return CanPass::fail();
    }
    if formal.kind == QtKind::Param && !actual.is_param() {
        return CanPass::fail();
    }
    // mutable refs demand an identical, assignable actual
    if formal.kind == QtKind::Ref
        && (actual.ty != formal.ty || actual.kind.is_const() || actual.is_param())
    {
        return CanPass::fail();
    }

    if actual.ty == formal.ty {
        return CanPass::pass(ConversionKind::Identity);
    }

    match (types.get(actual.ty), types.get(formal.ty)) {
        (_, TypeData::AnyType) => CanPass::pass(ConversionKind::Instantiation),
        (_, TypeData::TypeVar(_)) => CanPass::pass(ConversionKind::Instantiation),
        (data, TypeData::AnyNumeric) if data.is_numeric() => {
            CanPass::pass(ConversionKind::Instantiation)
        }
        (TypeData::Int(aw), TypeData::Int(fw)) => int_to_int(actual, *aw, *fw),
        (TypeData::Uint(aw), TypeData::Uint(fw)) => uint_to_uint(actual, *aw, *fw),
        (TypeData::Uint(aw), TypeData::Int(fw)) if fw > aw => {
            CanPass::pass(ConversionKind::NumericWidening)
        }
        (TypeData::Int(_), TypeData::Uint(fw)) => match actual.param {
            Some(value) if value.fits_uint(*fw) => CanPass::pass(ConversionKind::ParamNarrowing),
            _ => CanPass::fail(),
        },
        (TypeData::Int(aw), TypeData::Real(fw)) | (TypeData::Uint(aw), TypeData::Real(fw)) => {
            if *fw == 64 || *aw < *fw {
                CanPass::pass(ConversionKind::NumericWidening)
            } else {
                CanPass::fail()
            }
        }
        (TypeData::Real(aw), TypeData::Real(fw)) if fw > aw => {
            CanPass::pass(ConversionKind::NumericWidening)
        }
        (TypeData::Real(aw), TypeData::Complex(fw)) | (TypeData::Imag(aw), TypeData::Complex(fw))
            if *fw >= 2 * *aw =>
        {
            CanPass::pass(ConversionKind::NumericWidening)
        }
        (
            TypeData::Class {
                basic: ab,
                decorator: ad,
            },
            TypeData::Class {
                basic: fb,
                decorator: fd,
            },
        ) => class_to_class(types, *ab, *ad, *fb, *fd),
        (TypeData::BasicClass(_), TypeData::BasicClass(_)) => {
            if is_subclass(types, actual.ty, formal.ty) {
                CanPass::pass(ConversionKind::Subtype)
            } else {
                instantiation_of(types, actual.ty, formal.ty)
            }
        }
        // a bare class-type formal is management-erased: any decorated
        // value of the class (or a subclass) binds to it
        (TypeData::Class { basic, .. }, TypeData::BasicClass(_)) => {
            if *basic == formal.ty {
                CanPass::pass(ConversionKind::Identity)
            } else if is_subclass(types, *basic, formal.ty) {
                CanPass::pass(ConversionKind::Subtype)
            } else {
                instantiation_of(types, *basic, formal.ty)
            }
        }
        (TypeData::Record(_), TypeData::Record(_))
        | (TypeData::Union(_), TypeData::Union(_))
        | (TypeData::Enum(_), TypeData::Enum(_)) => instantiation_of(types, actual.ty, formal.ty),
        _ => CanPass::fail(),
    }
}

/// The post-disambiguation `const ref` rule: a `const ref` formal rejects
/// any binding that needs a temporary, i.e. any non-identity conversion.
pub fn const_ref_violation(formal: &QualifiedType, result: &CanPass) -> bool {
    formal.kind == QtKind::ConstRef && result.is_coercion()
}

/// Explicit-cast classification; covers the conversions `can_pass` refuses
/// to make implicit.
pub fn can_cast(types: &TypeInterner, actual: &QualifiedType, target: &QualifiedType) -> CanPass {
    let implicit = can_pass(types, actual, target);
    if implicit.passes {
        return implicit;
    }

    match (types.get(actual.ty), types.get(target.ty)) {
        (TypeData::Int(_), TypeData::Int(_))
        | (TypeData::Uint(_), TypeData::Uint(_))
        | (TypeData::Int(_), TypeData::Uint(_))
        | (TypeData::Uint(_), TypeData::Int(_))
        | (TypeData::Real(_), TypeData::Real(_))
        | (TypeData::Real(_), TypeData::Int(_))
        | (TypeData::Int(_), TypeData::Real(_)) => CanPass::pass(ConversionKind::NumericNarrowing),
        (
            TypeData::Class {
                basic: ab,
                decorator: ad,
            },
            TypeData::Class {
                basic: fb,
                decorator: fd,
            },
        ) if ad.nilability == Nilability::Nilable && fd.nilability == Nilability::NonNilable => {
            // the postfix-! style cast strips nilability; the rest of the
            // decorator must still pass
            let stripped = Decorator::new(ad.management, Nilability::NonNilable);
            class_to_class(types, *ab, stripped, *fb, *fd)
        }
        _ => CanPass::fail(),
    }
}

fn int_to_int(actual: &QualifiedType, aw: u16, fw: u16) -> CanPass {
    if fw > aw {
        return CanPass::pass(ConversionKind::NumericWidening);
    }
    match actual.param {
        Some(value) if value.fits_int(fw) => CanPass::pass(ConversionKind::ParamNarrowing),
        _ => CanPass::fail(),
    }
}

fn uint_to_uint(actual: &QualifiedType, aw: u16, fw: u16) -> CanPass {
    if fw > aw {
        return CanPass::pass(ConversionKind::NumericWidening);
    }
    match actual.param {
        Some(value) if value.fits_uint(fw) => CanPass::pass(ConversionKind::ParamNarrowing),
        _ => CanPass::fail(),
    }
}

fn class_to_class(
    types: &TypeInterner,
    actual_basic: TypeId,
    actual_dec: Decorator,
    formal_basic: TypeId,
    formal_dec: Decorator,
) -> CanPass {
    let exact_basic = actual_basic == formal_basic;
    if !exact_basic && !is_subclass(types, actual_basic, formal_basic) {
        return instantiation_of(types, actual_basic, formal_basic);
    }

    // borrow conversions never cross ownership: owned stays owned under
    // identity, and only the borrow decorator accepts foreign management
    let borrowing = match (actual_dec.management, formal_dec.management) {
        (a, f) if a == f => false,
        (
            Management::Owned | Management::Shared | Management::Unmanaged,
            Management::Borrowed,
        ) => true,
        _ => return CanPass::fail(),
    };

    let to_nilable = match (actual_dec.nilability, formal_dec.nilability) {
        (a, f) if a == f => false,
        (Nilability::NonNilable, Nilability::Nilable) => true,
        // nilable to non-nilable needs an explicit cast
        (Nilability::Nilable, Nilability::NonNilable) => return CanPass::fail(),
        _ => unreachable!(),
    };

    let conversion = if !exact_basic {
        ConversionKind::Subtype
    } else if borrowing {
        ConversionKind::Borrowing
    } else if to_nilable {
        ConversionKind::ToNilable
    } else {
        ConversionKind::Identity
    };
    CanPass::pass(conversion)
}

/// Walks the superclass chain of `child` looking for `parent`; compares
/// generic roots so instantiations inherit their root's parents.
fn is_subclass(types: &TypeInterner, child: TypeId, parent: TypeId) -> bool {
    let parent_root = types.generic_root(parent);
    let mut current = Some(child);
    while let Some(ty) = current {
        if types.generic_root(ty) == parent_root && ty != child {
            return true;
        }
        current = types.get(ty).as_composite().and_then(|c| c.parent_class);
        if current == Some(ty) {
            break;
        }
    }
    false
}

/// Passing a concrete instantiation to its own generic root formal.
fn instantiation_of(types: &TypeInterner, actual: TypeId, formal: TypeId) -> CanPass {
    let generic_formal = types
        .get(formal)
        .as_composite()
        .map(|c| c.is_generic())
        .unwrap_or(false);
    if generic_formal && types.generic_root(actual) == formal {
        CanPass::pass(ConversionKind::Instantiation)
    } else {
        CanPass::fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CompositeType, Decorator, Genericity};
    use crate::kind::ParamValue;
    use sable_tree::AstId;
    use sable_utils::interner::StrInterner;

    struct Classes {
        types: TypeInterner,
        owned_child: QualifiedType,
        borrowed_parent: QualifiedType,
        owned_parent: QualifiedType,
        nilable_parent: QualifiedType,
    }

    fn classes() -> Classes {
        let mut strings = StrInterner::new();
        let mut types = TypeInterner::new();

        let parent = types.intern(TypeData::BasicClass(CompositeType::root(
            AstId::symbol_root(strings.intern("M.Parent")),
            strings.intern("Parent"),
            Genericity::Concrete,
        )));
        let child = types.intern(TypeData::BasicClass(CompositeType {
            parent_class: Some(parent),
            ..CompositeType::root(
                AstId::symbol_root(strings.intern("M.Child")),
                strings.intern("Child"),
                Genericity::Concrete,
            )
        }));

        let owned_child = types.intern(TypeData::Class {
            basic: child,
            decorator: Decorator::owned(),
        });
        let borrowed_parent = types.intern(TypeData::Class {
            basic: parent,
            decorator: Decorator::borrowed(),
        });
        let owned_parent = types.intern(TypeData::Class {
            basic: parent,
            decorator: Decorator::owned(),
        });
        let nilable_parent = types.intern(TypeData::Class {
            basic: parent,
            decorator: Decorator::new(Management::Owned, Nilability::Nilable),
        });

        Classes {
            types,
            owned_child: QualifiedType::var(owned_child),
            borrowed_parent: QualifiedType::var(borrowed_parent),
            owned_parent: QualifiedType::var(owned_parent),
            nilable_parent: QualifiedType::var(nilable_parent),
        }
    }

    #[test]
    fn subclass_passes_as_subtype() {
        let c = classes();
        let result = can_pass(
            &c.types,
            &c.owned_child,
            &c.owned_parent.with_kind(QtKind::In),
        );
        assert!(result.passes);
        assert_eq!(result.conversion, ConversionKind::Subtype);
    }

    #[test]
    fn borrowing_never_crosses_ownership() {
        let c = classes();
        // owned Parent -> borrowed Parent borrows
        let borrow = can_pass(&c.types, &c.owned_parent, &c.borrowed_parent);
        assert!(borrow.passes);
        assert_eq!(borrow.conversion, ConversionKind::Borrowing);

        // borrowed Parent -> owned Parent never passes
        let steal = can_pass(&c.types, &c.borrowed_parent, &c.owned_parent);
        assert!(!steal.passes);
    }

    #[test]
    fn nilability_is_one_way() {
        let c = classes();
        let widen = can_pass(&c.types, &c.owned_parent, &c.nilable_parent);
        assert!(widen.passes);
        assert_eq!(widen.conversion, ConversionKind::ToNilable);

        let narrow = can_pass(&c.types, &c.nilable_parent, &c.owned_parent);
        assert!(!narrow.passes);
        // but an explicit cast strips nilability
        assert!(can_cast(&c.types, &c.nilable_parent, &c.owned_parent).passes);
    }

    #[test]
    fn const_ref_rejects_temporaries() {
        let c = classes();
        let formal = c.owned_parent.with_kind(QtKind::ConstRef);
        let result = can_pass(&c.types, &c.owned_child, &formal);
        assert!(result.passes);
        assert!(const_ref_violation(&formal, &result));

        let exact = can_pass(&c.types, &c.owned_parent, &formal);
        assert!(!const_ref_violation(&formal, &exact));
    }

    #[test]
    fn param_narrowing_requires_a_fitting_value() {
        let mut types = TypeInterner::new();
        let int64 = types.int_default();
        let int8 = types.int(8);

        let small = QualifiedType::param_of(int64, ParamValue::Int(7));
        let big = QualifiedType::param_of(int64, ParamValue::Int(4000));
        let formal = QualifiedType::const_in(int8);

        let fits = can_pass(&types, &small, &formal);
        assert_eq!(fits.conversion, ConversionKind::ParamNarrowing);
        assert!(fits.passes);
        assert!(!can_pass(&types, &big, &formal).passes);

        // non-param 64-bit actuals never narrow implicitly
        let value = QualifiedType::var(int64);
        assert!(!can_pass(&types, &value, &formal).passes);
    }

    #[test]
    fn widening_within_a_family() {
        let mut types = TypeInterner::new();
        let int8 = types.int(8);
        let int64 = types.int_default();

        let result = can_pass(
            &types,
            &QualifiedType::var(int8),
            &QualifiedType::const_in(int64),
        );
        assert!(result.passes);
        assert_eq!(result.conversion, ConversionKind::NumericWidening);
    }
}
