use derive_more::Display;
use sable_utils::interner::StrKey;
use serde::{Deserialize, Serialize};

use crate::id::NodeId;

/// Storage class of a variable-like declaration.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum StorageClass {
    Var,
    Const,
    Param,
    Ref,
    Config,
    State,
    /// A `type` field or variable; the declaration names a type, not a
    /// value, and makes its aggregate generic.
    Type,
}

/// Passing intent of a formal.
#[derive(
    Debug, Display, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
pub enum Intent {
    #[default]
    Blank,
    In,
    ConstIn,
    Out,
    Inout,
    Const,
    ConstRef,
    Ref,
    Param,
    Type,
}

/// How a function participates in method dispatch.
#[derive(
    Debug, Display, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
pub enum MethodKind {
    #[default]
    None,
    Method,
    TypeConstructor,
    Initializer,
    Operator,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleDecl {
    pub name: StrKey,
    pub body: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: StrKey,
    pub method_kind: MethodKind,
    /// Receiver formal; occupies formal slot 0 during call resolution.
    pub receiver: Option<NodeId>,
    pub formals: Vec<NodeId>,
    pub return_type: Option<NodeId>,
    pub where_clause: Option<NodeId>,
    pub body: Option<NodeId>,
    /// A parenless function is called without an argument list.
    pub parenless: bool,
}

impl FunctionDecl {
    pub fn is_method(&self) -> bool {
        self.receiver.is_some()
            || matches!(self.method_kind, MethodKind::Method | MethodKind::Initializer)
    }

    /// Receiver first, then declared formals.
    pub fn all_formals(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.receiver.into_iter().chain(self.formals.iter().copied())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: StrKey,
    pub storage: StorageClass,
    pub type_expr: Option<NodeId>,
    pub init: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormalDecl {
    pub name: StrKey,
    pub intent: Intent,
    pub type_expr: Option<NodeId>,
    pub default: Option<NodeId>,
}

/// Shared payload of record, class and union declarations; the node tag
/// distinguishes them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateDecl {
    pub name: StrKey,
    /// Superclass identifier, classes only.
    pub parent_class: Option<NodeId>,
    pub body: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: StrKey,
    pub elements: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumElementDecl {
    pub name: StrKey,
    pub init: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UseDecl {
    /// Identifier or dotted paths naming the used scopes, in source order.
    pub targets: Vec<NodeId>,
}

/// `var a, b, c: int;` - expands to component variables at scope build time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MultiDecl {
    pub decls: Vec<NodeId>,
}

/// `var (a, b) = expr;`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleDecl {
    pub elements: Vec<NodeId>,
    pub type_expr: Option<NodeId>,
    pub init: Option<NodeId>,
}
