use derive_more::Display;
use sable_tree::node::RealBits;
use sable_utils::interner::StrKey;
use serde::{Deserialize, Serialize};

use crate::interner::TypeId;

/// Storage/passing kind of a qualified type.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum QtKind {
    Var,
    Const,
    Ref,
    ConstRef,
    Param,
    Type,
    In,
    ConstIn,
    Out,
    Inout,
}

impl QtKind {
    pub fn is_const(self) -> bool {
        matches!(self, QtKind::Const | QtKind::ConstRef | QtKind::ConstIn | QtKind::Param)
    }

    pub fn is_ref(self) -> bool {
        matches!(self, QtKind::Ref | QtKind::ConstRef)
    }
}

/// A compile-time value carried by `param` qualified types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Real(RealBits),
    Str(StrKey),
}

impl ParamValue {
    /// Whether the value is representable in a signed integer of `width`
    /// bits. Drives param-narrowing passability.
    pub fn fits_int(self, width: u16) -> bool {
        let (min, max) = match width {
            8 => (i8::MIN as i64, i8::MAX as i64),
            16 => (i16::MIN as i64, i16::MAX as i64),
            32 => (i32::MIN as i64, i32::MAX as i64),
            _ => (i64::MIN, i64::MAX),
        };
        match self {
            ParamValue::Int(v) => v >= min && v <= max,
            ParamValue::Uint(v) => i64::try_from(v).map_or(false, |v| v >= min && v <= max),
            _ => false,
        }
    }

    pub fn fits_uint(self, width: u16) -> bool {
        let max = match width {
            8 => u8::MAX as u64,
            16 => u16::MAX as u64,
            32 => u32::MAX as u64,
            _ => u64::MAX,
        };
        match self {
            ParamValue::Uint(v) => v <= max,
            ParamValue::Int(v) => u64::try_from(v).map_or(false, |v| v <= max),
            _ => false,
        }
    }
}

/// The central currency of the resolver: a type together with how a value of
/// it is stored or passed, plus the compile-time value for `param` kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedType {
    pub kind: QtKind,
    pub ty: TypeId,
    pub param: Option<ParamValue>,
}

impl QualifiedType {
    pub fn new(kind: QtKind, ty: TypeId) -> Self {
        Self {
            kind,
            ty,
            param: None,
        }
    }

    pub fn var(ty: TypeId) -> Self {
        Self::new(QtKind::Var, ty)
    }

    pub fn const_var(ty: TypeId) -> Self {
        Self::new(QtKind::Const, ty)
    }

    pub fn const_in(ty: TypeId) -> Self {
        Self::new(QtKind::ConstIn, ty)
    }

    pub fn const_ref(ty: TypeId) -> Self {
        Self::new(QtKind::ConstRef, ty)
    }

    pub fn reference(ty: TypeId) -> Self {
        Self::new(QtKind::Ref, ty)
    }

    pub fn type_of(ty: TypeId) -> Self {
        Self::new(QtKind::Type, ty)
    }

    pub fn param_of(ty: TypeId, value: ParamValue) -> Self {
        Self {
            kind: QtKind::Param,
            ty,
            param: Some(value),
        }
    }

    pub fn is_type(&self) -> bool {
        self.kind == QtKind::Type
    }

    pub fn is_param(&self) -> bool {
        self.kind == QtKind::Param
    }

    /// Same type, different kind; params lose their value when they stop
    /// being params.
    pub fn with_kind(mut self, kind: QtKind) -> Self {
        self.kind = kind;
        if kind != QtKind::Param {
            self.param = None;
        }
        self
    }
}
