//! The type lattice.
//!
//! Types are hash-consed per context: two semantically equal types intern to
//! the same [`TypeId`], so equality everywhere downstream is an integer
//! compare. The managed-class decorator pairs a basic class with management
//! and nilability; passability between qualified types is classified by
//! [`can_pass`].

mod can_pass;
mod data;
mod interner;
mod kind;
mod subst;

pub use can_pass::{can_cast, can_pass, const_ref_violation, CanPass, ConversionKind};
pub use data::{
    CompositeType, Decorator, EnumType, FormalDetail, FunctionType, Genericity, Nilability,
    TupleType, TypeData, TypeVarType, WhereResult,
};
pub use interner::{TypeId, TypeInterner};
pub use kind::{ParamValue, QtKind, QualifiedType};
pub use subst::{match_types, substitute, Substitution};

// re-exported so downstream crates name one management enum
pub use sable_tree::node::Management;
