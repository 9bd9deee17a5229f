use std::collections::HashMap;

use sable_span::Report;
use sable_tree::node::Node;
use sable_tree::{Ast, NodeId};
use sable_tree::AstId;
use sable_utils::interner::StrInterner;
use serde::{Deserialize, Serialize};

use crate::build::Program;
use crate::error::ResolveError;
use crate::scope::{LookupConfig, ScopeId};

/// What an identifier use resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NameTarget {
    /// A single non-function declaration.
    Decl(AstId),
    /// One or more function declarations; the call resolver picks at the
    /// enclosing call, or treats the identifier as a parenless call.
    Candidates(Vec<AstId>),
    /// Lookup failed; the expression is poisoned.
    Erroneous,
}

/// Identifier bindings of one module, addressed by node id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameBindings {
    map: HashMap<NodeId, NameTarget>,
}

impl NameBindings {
    pub fn get(&self, node: NodeId) -> Option<&NameTarget> {
        self.map.get(&node)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &NameTarget)> {
        self.map.iter().map(|(&node, target)| (node, target))
    }
}

/// Binds every identifier use in one module subtree. `root` is usually the
/// module node; passing a function node re-binds just that symbol, which is
/// what instantiation does with cloned trees.
pub fn bind_symbol(
    program: &Program,
    ast: &Ast,
    root: NodeId,
    scope: ScopeId,
    strings: &StrInterner,
    report: &mut Report,
) -> NameBindings {
    let mut binder = Binder {
        program,
        strings,
        report,
        bindings: NameBindings::default(),
    };
    binder.bind(ast, root, scope);
    binder.bindings
}

struct Binder<'c> {
    program: &'c Program,
    strings: &'c StrInterner,
    report: &'c mut Report,
    bindings: NameBindings,
}

impl Binder<'_> {
    fn bind(&mut self, ast: &Ast, node: NodeId, scope: ScopeId) {
        // entering a scope-creating node narrows the lookup scope for its
        // children; the node itself resolves in the enclosing scope
        let inner = self
            .program
            .scopes
            .scope_for(ast.ast_id(node))
            .unwrap_or(scope);

        match ast.node(node) {
            Node::Identifier(identifier) => {
                let name = identifier.name;
                let found = self.program.scopes.lookup(
                    scope,
                    name,
                    LookupConfig::DECLS_PARENTS_IMPORTS,
                    &self.program.symbols,
                );

                let target = if found.is_empty() {
                    self.report.add(
                        ResolveError::UndeclaredIdentifier {
                            name: self.strings[name].to_owned(),
                            loc: ast.locate(node),
                        }
                        .into(),
                    );
                    NameTarget::Erroneous
                } else {
                    let any_function = found.iter().any(|decl| {
                        self.program
                            .symbols
                            .get(*decl)
                            .map(|symbol| symbol.kind.is_function())
                            .unwrap_or(false)
                    });
                    if any_function {
                        NameTarget::Candidates(found)
                    } else {
                        NameTarget::Decl(found[0])
                    }
                };
                self.bindings.map.insert(node, target);
            }
            // use targets were linked during scope construction
            Node::Use(_) => {}
            _ => {
                for child in ast.children(node) {
                    self.bind(ast, child, inner);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::build_scopes;
    use sable_span::{Loc, SourceId, Span};
    use sable_tree::node::*;
    use sable_tree::AstBuilder;
    use sable_utils::interner::StrInterner;

    fn loc() -> Loc {
        Loc::new(SourceId::new(0), Span::new(0, 0))
    }

    #[test]
    fn use_binds_to_its_declaration() {
        let mut strings = StrInterner::new();
        let mut builder = AstBuilder::new();
        let x = strings.intern("x");

        let decl = builder.push(
            VariableDecl {
                name: x,
                storage: StorageClass::Var,
                type_expr: None,
                init: None,
            },
            loc(),
        );
        let mention = builder.push(Identifier { name: x }, loc());
        let module = builder.push(
            ModuleDecl {
                name: strings.intern("M"),
                body: vec![decl, mention],
            },
            loc(),
        );
        let ast = builder.finish(module, &mut strings);

        let mut report = Report::new();
        let program = build_scopes(vec![ast.clone()], &mut strings, &mut report);
        let parts = &program.modules[0];
        let bindings = bind_symbol(
            &program,
            &program.asts[0],
            parts.root,
            parts.scope,
            &strings,
            &mut report,
        );

        assert!(report.is_empty());
        assert_eq!(
            bindings.get(mention),
            Some(&NameTarget::Decl(ast.ast_id(decl)))
        );
    }

    #[test]
    fn missing_names_poison_and_report() {
        let mut strings = StrInterner::new();
        let mut builder = AstBuilder::new();

        let mention = builder.push(
            Identifier {
                name: strings.intern("ghost"),
            },
            loc(),
        );
        let module = builder.push(
            ModuleDecl {
                name: strings.intern("M"),
                body: vec![mention],
            },
            loc(),
        );
        let ast = builder.finish(module, &mut strings);

        let mut report = Report::new();
        let program = build_scopes(vec![ast], &mut strings, &mut report);
        let parts = &program.modules[0];
        let bindings = bind_symbol(
            &program,
            &program.asts[0],
            parts.root,
            parts.scope,
            &strings,
            &mut report,
        );

        assert!(report.has_errors());
        assert_eq!(bindings.get(mention), Some(&NameTarget::Erroneous));
    }

    #[test]
    fn function_names_defer_to_the_call_resolver() {
        let mut strings = StrInterner::new();
        let mut builder = AstBuilder::new();
        let f = strings.intern("f");

        let function = builder.push(
            FunctionDecl {
                name: f,
                method_kind: MethodKind::None,
                receiver: None,
                formals: vec![],
                return_type: None,
                where_clause: None,
                body: None,
                parenless: true,
            },
            loc(),
        );
        let mention = builder.push(Identifier { name: f }, loc());
        let module = builder.push(
            ModuleDecl {
                name: strings.intern("M"),
                body: vec![function, mention],
            },
            loc(),
        );
        let ast = builder.finish(module, &mut strings);

        let mut report = Report::new();
        let program = build_scopes(vec![ast.clone()], &mut strings, &mut report);
        let parts = &program.modules[0];
        let bindings = bind_symbol(
            &program,
            &program.asts[0],
            parts.root,
            parts.scope,
            &strings,
            &mut report,
        );

        assert_eq!(
            bindings.get(mention),
            Some(&NameTarget::Candidates(vec![ast.ast_id(function)]))
        );
    }
}
