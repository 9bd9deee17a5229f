//! The persistent AST of the sable frontend.
//!
//! Nodes live in a flat per-module table and are immutable once the builder
//! finishes. Stable [`AstId`]s combine the owning symbol's dotted path with
//! a dense postorder index, so ids survive re-parses of unrelated symbols.
//! Parent links are derived, never stored.

mod builder;
mod id;
pub mod node;
mod visit;

pub use builder::{clone_subtree, Ast, AstBuilder};
pub use id::{AstId, NodeId};
pub use visit::{postorder, traverse, Visitor};
