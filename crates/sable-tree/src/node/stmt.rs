use sable_utils::interner::StrKey;
use serde::{Deserialize, Serialize};

use crate::id::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReturnStmt {
    pub value: Option<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Conditional {
    pub condition: NodeId,
    pub then_block: NodeId,
    pub else_block: Option<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WhileLoop {
    pub condition: NodeId,
    pub body: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForLoop {
    /// Index variable declaration; lives in its own scope.
    pub index: Option<NodeId>,
    pub iterand: NodeId,
    pub body: NodeId,
    /// Forall loops introduce an index scope with parallel semantics.
    pub is_forall: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeferStmt {
    pub body: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelStmt {
    pub name: StrKey,
    pub target: NodeId,
}

/// Marks the point where an initializer finishes initializing `this`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InitThis;
