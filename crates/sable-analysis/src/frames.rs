use std::collections::HashSet;

use sable_tree::{AstId, NodeId};
use serde::{Deserialize, Serialize};

/// End-of-scope work item kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// copy-initialization for `in` intents
    CopyInit,
    /// write-back for `out` and `inout`
    WriteBack,
    Deinit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub id: AstId,
}

impl Action {
    pub fn new(kind: ActionKind, id: AstId) -> Self {
        Self { kind, id }
    }
}

/// Per-block bookkeeping for blocks and things that behave like blocks.
#[derive(Debug, Clone)]
pub struct ScopeFrame {
    pub scope_node: NodeId,
    /// Locals and defers share one stack so cleanup order interleaves the
    /// way the program wrote them.
    pub locals_and_defers: Vec<NodeId>,
    /// Variables declared in this scope.
    pub declared: HashSet<AstId>,
    /// Variables initialized in this scope, possibly including outer ones.
    pub inited: HashSet<AstId>,
    /// Outer variables first initialized here, in initialization order.
    pub inited_outer: Vec<AstId>,
    /// Variables deinitialized early in this scope.
    pub deinited: HashSet<AstId>,
    /// What runs when the scope ends.
    pub end_of_scope: Vec<Action>,
}

impl ScopeFrame {
    pub fn new(scope_node: NodeId) -> Self {
        Self {
            scope_node,
            locals_and_defers: Vec::new(),
            declared: HashSet::new(),
            inited: HashSet::new(),
            inited_outer: Vec::new(),
            deinited: HashSet::new(),
            end_of_scope: Vec::new(),
        }
    }

    /// Drains pending actions in reverse declaration order; operating on an
    /// empty frame yields the empty list.
    pub fn drain(&mut self) -> Vec<Action> {
        let mut actions = std::mem::take(&mut self.end_of_scope);
        actions.reverse();
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_utils::interner::StrInterner;

    #[test]
    fn drain_reverses_and_empties() {
        let mut strings = StrInterner::new();
        let a = AstId::new(strings.intern("M"), 0);
        let b = AstId::new(strings.intern("M"), 1);

        let mut frame = ScopeFrame::new(NodeId::new(0));
        frame.end_of_scope.push(Action::new(ActionKind::Deinit, a));
        frame.end_of_scope.push(Action::new(ActionKind::Deinit, b));

        let drained = frame.drain();
        assert_eq!(drained, vec![
            Action::new(ActionKind::Deinit, b),
            Action::new(ActionKind::Deinit, a),
        ]);
        assert!(frame.drain().is_empty());
    }
}
