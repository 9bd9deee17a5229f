//! The closed node sum.
//!
//! Every algorithm in the frontend dispatches on [`NodeKind`] through
//! exhaustive matches; adding a node kind fails every match that forgot it.

mod decl;
mod expr;
mod stmt;

pub use decl::*;
pub use expr::*;
pub use stmt::*;

use derive_more::{Display, From};
use sable_utils::{as_variant, interner::StrKey};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

use crate::id::NodeId;

#[derive(Debug, From, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Node {
    // declarations
    Module(ModuleDecl),
    Function(FunctionDecl),
    Variable(VariableDecl),
    Formal(FormalDecl),
    Record(AggregateDecl),
    #[from(skip)]
    Class(AggregateDecl),
    #[from(skip)]
    Union(AggregateDecl),
    Enum(EnumDecl),
    EnumElement(EnumElementDecl),
    Use(UseDecl),
    MultiDecl(MultiDecl),
    TupleDecl(TupleDecl),
    // expressions
    Identifier(Identifier),
    Call(CallExpr),
    OpCall(OpCallExpr),
    Dot(DotExpr),
    New(NewExpr),
    Literal(Literal),
    TupleExpr(TupleExpr),
    Domain(DomainExpr),
    Range(RangeExpr),
    // statements
    Block(Block),
    Return(ReturnStmt),
    Conditional(Conditional),
    While(WhileLoop),
    For(ForLoop),
    Defer(DeferStmt),
    Label(LabelStmt),
    InitThis(InitThis),
}

#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum NodeKind {
    Module,
    Function,
    Variable,
    Formal,
    Record,
    Class,
    Union,
    Enum,
    EnumElement,
    Use,
    MultiDecl,
    TupleDecl,
    Identifier,
    Call,
    OpCall,
    Dot,
    New,
    Literal,
    TupleExpr,
    Domain,
    Range,
    Block,
    Return,
    Conditional,
    While,
    For,
    Defer,
    Label,
    InitThis,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Module(_) => NodeKind::Module,
            Node::Function(_) => NodeKind::Function,
            Node::Variable(_) => NodeKind::Variable,
            Node::Formal(_) => NodeKind::Formal,
            Node::Record(_) => NodeKind::Record,
            Node::Class(_) => NodeKind::Class,
            Node::Union(_) => NodeKind::Union,
            Node::Enum(_) => NodeKind::Enum,
            Node::EnumElement(_) => NodeKind::EnumElement,
            Node::Use(_) => NodeKind::Use,
            Node::MultiDecl(_) => NodeKind::MultiDecl,
            Node::TupleDecl(_) => NodeKind::TupleDecl,
            Node::Identifier(_) => NodeKind::Identifier,
            Node::Call(_) => NodeKind::Call,
            Node::OpCall(_) => NodeKind::OpCall,
            Node::Dot(_) => NodeKind::Dot,
            Node::New(_) => NodeKind::New,
            Node::Literal(_) => NodeKind::Literal,
            Node::TupleExpr(_) => NodeKind::TupleExpr,
            Node::Domain(_) => NodeKind::Domain,
            Node::Range(_) => NodeKind::Range,
            Node::Block(_) => NodeKind::Block,
            Node::Return(_) => NodeKind::Return,
            Node::Conditional(_) => NodeKind::Conditional,
            Node::While(_) => NodeKind::While,
            Node::For(_) => NodeKind::For,
            Node::Defer(_) => NodeKind::Defer,
            Node::Label(_) => NodeKind::Label,
            Node::InitThis(_) => NodeKind::InitThis,
        }
    }

    /// Symbol declarations own an id path of their own.
    pub fn is_symbol_decl(&self) -> bool {
        matches!(
            self,
            Node::Module(_)
                | Node::Function(_)
                | Node::Record(_)
                | Node::Class(_)
                | Node::Union(_)
                | Node::Enum(_)
        )
    }

    /// The declared name, for nodes that introduce one.
    pub fn decl_name(&self) -> Option<StrKey> {
        match self {
            Node::Module(d) => Some(d.name),
            Node::Function(d) => Some(d.name),
            Node::Variable(d) => Some(d.name),
            Node::Formal(d) => Some(d.name),
            Node::Record(d) | Node::Class(d) | Node::Union(d) => Some(d.name),
            Node::Enum(d) => Some(d.name),
            Node::EnumElement(d) => Some(d.name),
            _ => None,
        }
    }

    /// Rebuilds the node with every child id passed through `f`, preserving
    /// source order. [`children_of`] and subtree cloning both derive from
    /// this single exhaustive match.
    pub fn map_children(&self, f: &mut impl FnMut(NodeId) -> NodeId) -> Node {
        let map_opt = |f: &mut dyn FnMut(NodeId) -> NodeId, id: Option<NodeId>| id.map(|id| f(id));

        match self {
            Node::Module(d) => Node::Module(ModuleDecl {
                name: d.name,
                body: d.body.iter().map(|&id| f(id)).collect(),
            }),
            Node::Function(d) => Node::Function(FunctionDecl {
                name: d.name,
                method_kind: d.method_kind,
                receiver: map_opt(f, d.receiver),
                formals: d.formals.iter().map(|&id| f(id)).collect(),
                return_type: map_opt(f, d.return_type),
                where_clause: map_opt(f, d.where_clause),
                body: map_opt(f, d.body),
                parenless: d.parenless,
            }),
            Node::Variable(d) => Node::Variable(VariableDecl {
                name: d.name,
                storage: d.storage,
                type_expr: map_opt(f, d.type_expr),
                init: map_opt(f, d.init),
            }),
            Node::Formal(d) => Node::Formal(FormalDecl {
                name: d.name,
                intent: d.intent,
                type_expr: map_opt(f, d.type_expr),
                default: map_opt(f, d.default),
            }),
            Node::Record(d) => Node::Record(map_aggregate(d, f)),
            Node::Class(d) => Node::Class(map_aggregate(d, f)),
            Node::Union(d) => Node::Union(map_aggregate(d, f)),
            Node::Enum(d) => Node::Enum(EnumDecl {
                name: d.name,
                elements: d.elements.iter().map(|&id| f(id)).collect(),
            }),
            Node::EnumElement(d) => Node::EnumElement(EnumElementDecl {
                name: d.name,
                init: map_opt(f, d.init),
            }),
            Node::Use(d) => Node::Use(UseDecl {
                targets: d.targets.iter().map(|&id| f(id)).collect(),
            }),
            Node::MultiDecl(d) => Node::MultiDecl(MultiDecl {
                decls: d.decls.iter().map(|&id| f(id)).collect(),
            }),
            Node::TupleDecl(d) => Node::TupleDecl(TupleDecl {
                elements: d.elements.iter().map(|&id| f(id)).collect(),
                type_expr: map_opt(f, d.type_expr),
                init: map_opt(f, d.init),
            }),
            Node::Identifier(e) => Node::Identifier(*e),
            Node::Call(e) => Node::Call(CallExpr {
                callee: f(e.callee),
                actuals: e.actuals.iter().map(|&id| f(id)).collect(),
                actual_names: e.actual_names.clone(),
            }),
            Node::OpCall(e) => Node::OpCall(OpCallExpr {
                op: e.op,
                operands: e.operands.iter().map(|&id| f(id)).collect(),
            }),
            Node::Dot(e) => Node::Dot(DotExpr {
                receiver: f(e.receiver),
                field: e.field,
            }),
            Node::New(e) => Node::New(NewExpr {
                type_expr: f(e.type_expr),
                management: e.management,
            }),
            Node::Literal(e) => Node::Literal(*e),
            Node::TupleExpr(e) => Node::TupleExpr(TupleExpr {
                elements: e.elements.iter().map(|&id| f(id)).collect(),
            }),
            Node::Domain(e) => Node::Domain(DomainExpr {
                dims: e.dims.iter().map(|&id| f(id)).collect(),
            }),
            Node::Range(e) => Node::Range(RangeExpr {
                low: map_opt(f, e.low),
                high: map_opt(f, e.high),
            }),
            Node::Block(s) => Node::Block(Block {
                stmts: s.stmts.iter().map(|&id| f(id)).collect(),
            }),
            Node::Return(s) => Node::Return(ReturnStmt {
                value: map_opt(f, s.value),
            }),
            Node::Conditional(s) => Node::Conditional(Conditional {
                condition: f(s.condition),
                then_block: f(s.then_block),
                else_block: map_opt(f, s.else_block),
            }),
            Node::While(s) => Node::While(WhileLoop {
                condition: f(s.condition),
                body: f(s.body),
            }),
            Node::For(s) => Node::For(ForLoop {
                index: map_opt(f, s.index),
                iterand: f(s.iterand),
                body: f(s.body),
                is_forall: s.is_forall,
            }),
            Node::Defer(s) => Node::Defer(DeferStmt { body: f(s.body) }),
            Node::Label(s) => Node::Label(LabelStmt {
                name: s.name,
                target: f(s.target),
            }),
            Node::InitThis(s) => Node::InitThis(*s),
        }
    }

    /// Child ids in source order.
    pub fn children(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.map_children(&mut |id| {
            out.push(id);
            id
        });
        out
    }

    /// Compares everything except child identities: tag plus scalar payload
    /// fields plus the arity and presence pattern of children. Child ids are
    /// normalized to their positions before comparing.
    pub fn same_payload(&self, other: &Node) -> bool {
        let renumber = |node: &Node| {
            let mut next = 0u32;
            node.map_children(&mut |_| {
                let id = NodeId::new(next);
                next += 1;
                id
            })
        };
        self.kind() == other.kind() && renumber(self) == renumber(other)
    }

    /// Hashes the tag and scalar payload, child-blind: every child id hashes
    /// as its position. Structural hashing folds this over the subtree.
    pub fn hash_local<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        let mut position = 0u32;
        let renumbered = self.map_children(&mut |_| {
            let id = NodeId::new(position);
            position += 1;
            id
        });
        renumbered.hash(state);
    }

    pub fn as_module(&self) -> Option<&ModuleDecl> {
        as_variant!(self, Node::Module)
    }

    pub fn as_function(&self) -> Option<&FunctionDecl> {
        as_variant!(self, Node::Function)
    }

    pub fn as_variable(&self) -> Option<&VariableDecl> {
        as_variant!(self, Node::Variable)
    }

    pub fn as_formal(&self) -> Option<&FormalDecl> {
        as_variant!(self, Node::Formal)
    }

    /// Record, class or union payload.
    pub fn as_aggregate(&self) -> Option<&AggregateDecl> {
        match self {
            Node::Record(d) | Node::Class(d) | Node::Union(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumDecl> {
        as_variant!(self, Node::Enum)
    }

    pub fn as_identifier(&self) -> Option<&Identifier> {
        as_variant!(self, Node::Identifier)
    }

    pub fn as_call(&self) -> Option<&CallExpr> {
        as_variant!(self, Node::Call)
    }

    pub fn as_op_call(&self) -> Option<&OpCallExpr> {
        as_variant!(self, Node::OpCall)
    }

    pub fn as_dot(&self) -> Option<&DotExpr> {
        as_variant!(self, Node::Dot)
    }

    pub fn as_new(&self) -> Option<&NewExpr> {
        as_variant!(self, Node::New)
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        as_variant!(self, Node::Literal)
    }

    pub fn as_block(&self) -> Option<&Block> {
        as_variant!(self, Node::Block)
    }

    pub fn as_use(&self) -> Option<&UseDecl> {
        as_variant!(self, Node::Use)
    }
}

fn map_aggregate(d: &AggregateDecl, f: &mut impl FnMut(NodeId) -> NodeId) -> AggregateDecl {
    AggregateDecl {
        name: d.name,
        parent_class: d.parent_class.map(|id| f(id)),
        body: d.body.iter().map(|&id| f(id)).collect(),
    }
}
