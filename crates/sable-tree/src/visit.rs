use crate::{Ast, NodeId};

/// Enter/exit traversal over an [`Ast`].
///
/// Visitors carry their own mutable state (resolution tables, frames) but
/// never mutate the tree. Returning `false` from [`Visitor::enter`] skips
/// the node's children; `exit` still runs.
pub trait Visitor {
    fn enter(&mut self, ast: &Ast, id: NodeId) -> bool {
        let _ = (ast, id);
        true
    }

    fn exit(&mut self, ast: &Ast, id: NodeId) {
        let _ = (ast, id);
    }
}

pub fn traverse(ast: &Ast, root: NodeId, visitor: &mut impl Visitor) {
    if visitor.enter(ast, root) {
        for child in ast.children(root) {
            traverse(ast, child, visitor);
        }
    }
    visitor.exit(ast, root);
}

/// Node ids of the subtree under `root` in postorder.
pub fn postorder(ast: &Ast, root: NodeId) -> Vec<NodeId> {
    struct Collect(Vec<NodeId>);

    impl Visitor for Collect {
        fn exit(&mut self, _ast: &Ast, id: NodeId) {
            self.0.push(id);
        }
    }

    let mut collect = Collect(Vec::new());
    traverse(ast, root, &mut collect);
    collect.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::*;
    use crate::AstBuilder;
    use sable_span::{Loc, SourceId, Span};
    use sable_utils::interner::StrInterner;

    #[test]
    fn postorder_visits_children_first() {
        let loc = Loc::new(SourceId::new(0), Span::new(0, 0));
        let mut interner = StrInterner::new();
        let mut builder = AstBuilder::new();

        let lit = builder.push(Literal::Int(1), loc);
        let ret = builder.push(ReturnStmt { value: Some(lit) }, loc);
        let block = builder.push(Block { stmts: vec![ret] }, loc);
        let module = builder.push(
            ModuleDecl {
                name: interner.intern("M"),
                body: vec![block],
            },
            loc,
        );
        let ast = builder.finish(module, &mut interner);

        assert_eq!(postorder(&ast, ast.root()), vec![lit, ret, block, module]);
    }
}
