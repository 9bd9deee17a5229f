use derive_more::{Display, From};
use sable_utils::interner::StrKey;
use serde::{Deserialize, Serialize};

use crate::id::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    pub name: StrKey,
}

/// A named or positional call: `foo(1, b = 2)`.
///
/// `actual_names` runs parallel to `actuals`; `None` marks a positional
/// actual.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallExpr {
    pub callee: NodeId,
    pub actuals: Vec<NodeId>,
    pub actual_names: Vec<Option<StrKey>>,
}

impl CallExpr {
    pub fn positional(callee: NodeId, actuals: Vec<NodeId>) -> Self {
        let actual_names = vec![None; actuals.len()];
        Self {
            callee,
            actuals,
            actual_names,
        }
    }
}

/// Operator application, including `=` and user-defined operators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpCallExpr {
    pub op: StrKey,
    pub operands: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DotExpr {
    pub receiver: NodeId,
    pub field: StrKey,
}

/// Management requested by a `new` expression.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Management {
    Owned,
    Shared,
    Borrowed,
    Unmanaged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NewExpr {
    pub type_expr: NodeId,
    pub management: Option<Management>,
}

/// `f64` payload stored as raw bits so literals stay `Eq` and hashable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RealBits(u64);

impl RealBits {
    pub fn from_f64(value: f64) -> Self {
        Self(value.to_bits())
    }

    pub fn value(self) -> f64 {
        f64::from_bits(self.0)
    }
}

#[derive(Debug, From, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Real(RealBits),
    Str(StrKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleExpr {
    pub elements: Vec<NodeId>,
}

/// Anonymous domain literal, `{1..n, 1..m}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainExpr {
    pub dims: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeExpr {
    pub low: Option<NodeId>,
    pub high: Option<NodeId>,
}
