use derive_more::Display;
use sable_tree::node::{Intent, Management};
use sable_tree::AstId;
use sable_utils::interner::StrKey;
use serde::{Deserialize, Serialize};

use crate::interner::TypeId;
use crate::kind::QualifiedType;
use crate::subst::Substitution;

/// Nilability half of a class decorator.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Nilability {
    NonNilable,
    Nilable,
}

/// Management plus nilability of a managed class type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Decorator {
    pub management: Management,
    pub nilability: Nilability,
}

impl Decorator {
    pub fn new(management: Management, nilability: Nilability) -> Self {
        Self {
            management,
            nilability,
        }
    }

    pub fn owned() -> Self {
        Self::new(Management::Owned, Nilability::NonNilable)
    }

    pub fn borrowed() -> Self {
        Self::new(Management::Borrowed, Nilability::NonNilable)
    }

    pub fn is_nilable(self) -> bool {
        self.nilability == Nilability::Nilable
    }
}

/// How far a composite is from being fully concrete.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Genericity {
    Concrete,
    Generic,
    GenericWithDefaults,
}

/// Outcome of evaluating a candidate's where clause.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum WhereResult {
    True,
    False,
    /// No where clause present.
    None,
}

/// Shared payload of record, union and basic-class types.
///
/// `instantiated_from` chains terminate at the fully generic root; equal
/// substitutions of the same root intern to the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositeType {
    pub decl: AstId,
    pub name: StrKey,
    /// Superclass, basic classes only.
    pub parent_class: Option<TypeId>,
    pub instantiated_from: Option<TypeId>,
    pub substitution: Substitution,
    pub genericity: Genericity,
}

impl CompositeType {
    pub fn root(decl: AstId, name: StrKey, genericity: Genericity) -> Self {
        Self {
            decl,
            name,
            parent_class: None,
            instantiated_from: None,
            substitution: Substitution::new(),
            genericity,
        }
    }

    pub fn is_generic(&self) -> bool {
        !matches!(self.genericity, Genericity::Concrete)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleType {
    /// Element types with their kinds, in order.
    pub elems: Vec<QualifiedType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumType {
    pub decl: AstId,
    pub name: StrKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeVarType {
    /// The `type` field or formal this variable stands for.
    pub decl: AstId,
    pub name: StrKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormalDetail {
    pub name: StrKey,
    pub intent: Intent,
    pub qt: QualifiedType,
    pub has_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionType {
    pub formals: Vec<FormalDetail>,
    pub return_type: QualifiedType,
    pub where_result: WhereResult,
}

/// The closed sum of type variants. Interned; compare [`TypeId`]s.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeData {
    // primitives
    Int(u16),
    Uint(u16),
    Real(u16),
    Imag(u16),
    Complex(u16),
    Bool,
    Str,
    Nothing,
    Void,
    Unknown,
    Erroneous,
    // generic builtins
    AnyType,
    AnyNumeric,
    TypeVar(TypeVarType),
    // composites
    Record(CompositeType),
    Union(CompositeType),
    BasicClass(CompositeType),
    Class {
        basic: TypeId,
        decorator: Decorator,
    },
    Tuple(TupleType),
    Domain {
        rank: u8,
    },
    Array {
        elem: TypeId,
        domain: TypeId,
    },
    Enum(EnumType),
    Function(FunctionType),
}

impl TypeData {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            TypeData::Int(_)
                | TypeData::Uint(_)
                | TypeData::Real(_)
                | TypeData::Imag(_)
                | TypeData::Complex(_)
        )
    }

    pub fn is_erroneous(&self) -> bool {
        matches!(self, TypeData::Erroneous)
    }

    /// Composite payload of records, unions and basic classes.
    pub fn as_composite(&self) -> Option<&CompositeType> {
        match self {
            TypeData::Record(c) | TypeData::Union(c) | TypeData::BasicClass(c) => Some(c),
            _ => None,
        }
    }

    /// Whether the type still has unbound generic parts. Composites answer
    /// from their recorded genericity; the interner resolves nested ids.
    pub fn is_generic_shallow(&self) -> bool {
        match self {
            TypeData::AnyType | TypeData::AnyNumeric | TypeData::TypeVar(_) => true,
            TypeData::Record(c) | TypeData::Union(c) | TypeData::BasicClass(c) => c.is_generic(),
            _ => false,
        }
    }

    /// Type ids referenced by this variant, for transitive GC marking.
    pub fn referenced_types(&self) -> Vec<TypeId> {
        match self {
            TypeData::Record(c) | TypeData::Union(c) | TypeData::BasicClass(c) => {
                let mut out = Vec::new();
                out.extend(c.parent_class);
                out.extend(c.instantiated_from);
                out.extend(c.substitution.iter().map(|(_, qt)| qt.ty));
                out
            }
            TypeData::Class { basic, .. } => vec![*basic],
            TypeData::Tuple(t) => t.elems.iter().map(|qt| qt.ty).collect(),
            TypeData::Array { elem, domain } => vec![*elem, *domain],
            TypeData::Function(f) => {
                let mut out: Vec<TypeId> = f.formals.iter().map(|d| d.qt.ty).collect();
                out.push(f.return_type.ty);
                out
            }
            _ => Vec::new(),
        }
    }

    /// String keys referenced by this variant, for interner marking.
    pub fn referenced_strings(&self) -> Vec<StrKey> {
        match self {
            TypeData::Record(c) | TypeData::Union(c) | TypeData::BasicClass(c) => {
                let mut out = vec![c.name, c.decl.path];
                out.extend(c.substitution.iter().map(|(id, _)| id.path));
                out
            }
            TypeData::Enum(e) => vec![e.name, e.decl.path],
            TypeData::TypeVar(v) => vec![v.name, v.decl.path],
            TypeData::Function(f) => f.formals.iter().map(|d| d.name).collect(),
            _ => Vec::new(),
        }
    }
}
