use std::collections::HashMap;

use sable_span::Report;
use sable_tree::node::{MethodKind, Node, StorageClass};
use sable_tree::{Ast, AstId, NodeId};
use sable_utils::interner::{StrInterner, StrKey};

use crate::error::ResolveError;
use crate::prelude::Prelude;
use crate::scope::{ScopeGraph, ScopeId, ScopeKind};
use crate::symbol::{Symbol, SymbolKind, SymbolTable, TypeCategory};

/// The module-init partition of one module: declarations and use-imports
/// stay at module scope, the remaining top-level statements make up the
/// body of a synthetic `__init_<module>` function returning `void`.
#[derive(Debug, Clone)]
pub struct ModuleParts {
    pub module: AstId,
    pub root: NodeId,
    pub scope: ScopeId,
    /// Synthetic init-function symbol; has no AST node of its own.
    pub init_symbol: AstId,
    pub init_scope: ScopeId,
    pub globals: Vec<NodeId>,
    pub init_stmts: Vec<NodeId>,
}

/// Everything the later passes read: module trees, the program-wide scope
/// graph, symbol records and the prelude.
#[derive(Debug, Clone)]
pub struct Program {
    pub asts: Vec<Ast>,
    pub scopes: ScopeGraph,
    pub symbols: SymbolTable,
    pub prelude: Prelude,
    pub modules: Vec<ModuleParts>,
}

impl Program {
    /// Index of the module a declaration id belongs to, by path prefix.
    pub fn module_of(&self, strings: &StrInterner, id: AstId) -> Option<usize> {
        let path = &strings[id.path];
        self.modules.iter().position(|parts| {
            let module_path = &strings[parts.module.path];
            path == module_path || path.starts_with(&format!("{module_path}."))
        })
    }

    pub fn ast_for(&self, strings: &StrInterner, id: AstId) -> Option<(&Ast, NodeId)> {
        self.module_of(strings, id).and_then(|index| {
            let ast = &self.asts[index];
            ast.find(id).map(|node| (ast, node))
        })
    }
}

/// Runs the declaration pass over every module, producing the scope graph
/// and symbol table for this revision.
pub fn build_scopes(
    asts: Vec<Ast>,
    strings: &mut StrInterner,
    report: &mut Report,
) -> Program {
    let mut scopes = ScopeGraph::new();
    let mut symbols = SymbolTable::new();
    let prelude = Prelude::install(&mut scopes, &mut symbols, strings);

    // program root holds the top-level module names
    let root_id = AstId::symbol_root(strings.intern("<root>"));
    let root_scope = scopes.push(ScopeKind::Module, Some(prelude.scope), root_id);

    let mut builder = ScopeBuilder {
        scopes: &mut scopes,
        symbols: &mut symbols,
        strings,
        report,
        pending_uses: Vec::new(),
        module_scopes: HashMap::new(),
    };

    let mut modules = Vec::new();
    for ast in &asts {
        if let Some(parts) = builder.build_module(ast, ast.root(), root_scope) {
            modules.push(parts);
        }
    }
    builder.link_uses();

    log::debug!(
        "built {} scopes and {} symbols over {} modules",
        scopes.len(),
        symbols.len(),
        modules.len()
    );

    Program {
        asts,
        scopes,
        symbols,
        prelude,
        modules,
    }
}

struct ScopeBuilder<'c> {
    scopes: &'c mut ScopeGraph,
    symbols: &'c mut SymbolTable,
    strings: &'c mut StrInterner,
    report: &'c mut Report,
    /// use-imports collected during the walk, linked after every module's
    /// scope exists
    pending_uses: Vec<(Ast, ScopeId, NodeId)>,
    module_scopes: HashMap<StrKey, (AstId, ScopeId)>,
}

impl ScopeBuilder<'_> {
    fn build_module(&mut self, ast: &Ast, root: NodeId, parent: ScopeId) -> Option<ModuleParts> {
        let module = ast.node(root).as_module()?.clone();
        let module_id = ast.ast_id(root);

        self.declare(
            ast,
            parent,
            module.name,
            root,
            SymbolKind::Module,
        );
        let scope = self.scopes.push(ScopeKind::Module, Some(parent), module_id);
        self.module_scopes.insert(module.name, (module_id, scope));

        // partition top-level statements
        let mut globals = Vec::new();
        let mut init_stmts = Vec::new();
        for &child in &module.body {
            if is_global_decl(ast.node(child)) {
                globals.push(child);
            } else {
                init_stmts.push(child);
            }
        }

        // synthesize __init_<module>, returning void
        let module_path = self.strings[module_id.path].to_owned();
        let init_name_text = format!("__init_{}", &self.strings[module.name]);
        let init_name = self.strings.intern(&init_name_text);
        let init_path = self
            .strings
            .intern(&format!("{module_path}.{init_name_text}"));
        let init_symbol = AstId::symbol_root(init_path);
        self.symbols.insert(Symbol {
            ast: init_symbol,
            name: init_name,
            kind: SymbolKind::Function {
                method_kind: MethodKind::None,
                parenless: false,
            },
        });
        self.scopes.declare(scope, init_name, init_symbol);

        let init_scope = self
            .scopes
            .push(ScopeKind::Function, Some(scope), init_symbol);
        self.scopes.get_mut(init_scope).hoist_variables = true;

        for &child in &globals {
            self.visit(ast, child, scope);
        }
        for &child in &init_stmts {
            self.visit(ast, child, init_scope);
        }

        Some(ModuleParts {
            module: module_id,
            root,
            scope,
            init_symbol,
            init_scope,
            globals,
            init_stmts,
        })
    }

    /// Declaration-pass dispatch over one node in `scope`.
    fn visit(&mut self, ast: &Ast, id: NodeId, scope: ScopeId) {
        match ast.node(id) {
            Node::Module(_) => {
                self.build_module(ast, id, scope);
            }
            Node::Variable(decl) => {
                let decl = decl.clone();
                self.declare_variable(ast, id, scope, decl.name, decl.storage);
            }
            Node::Formal(decl) => {
                let (name, intent) = (decl.name, decl.intent);
                self.declare(ast, scope, name, id, SymbolKind::Formal { intent });
            }
            Node::Function(decl) => {
                let decl = decl.clone();
                self.declare(
                    ast,
                    scope,
                    decl.name,
                    id,
                    SymbolKind::Function {
                        method_kind: decl.method_kind,
                        parenless: decl.parenless,
                    },
                );
                let fn_scope =
                    self.scopes
                        .push(ScopeKind::Function, Some(scope), ast.ast_id(id));
                for formal in decl.all_formals() {
                    self.visit(ast, formal, fn_scope);
                }
                if let Some(body) = decl.body {
                    self.visit(ast, body, fn_scope);
                }
            }
            Node::Record(_) | Node::Class(_) | Node::Union(_) => {
                let category = match ast.node(id) {
                    Node::Record(_) => TypeCategory::Record,
                    Node::Class(_) => TypeCategory::Class,
                    _ => TypeCategory::Union,
                };
                let decl = ast.node(id).as_aggregate().cloned().expect("aggregate");
                self.declare(ast, scope, decl.name, id, SymbolKind::Type { category });
                let body_scope =
                    self.scopes
                        .push(ScopeKind::Aggregate, Some(scope), ast.ast_id(id));
                for &child in &decl.body {
                    self.visit(ast, child, body_scope);
                }
            }
            Node::Enum(decl) => {
                let decl = decl.clone();
                self.declare(
                    ast,
                    scope,
                    decl.name,
                    id,
                    SymbolKind::Type {
                        category: TypeCategory::Enum,
                    },
                );
                let body_scope =
                    self.scopes
                        .push(ScopeKind::Aggregate, Some(scope), ast.ast_id(id));
                for &element in &decl.elements {
                    if let Node::EnumElement(elem) = ast.node(element) {
                        let name = elem.name;
                        self.declare(ast, body_scope, name, element, SymbolKind::EnumConstant);
                    }
                }
            }
            Node::Use(_) => {
                self.pending_uses.push((ast.clone(), scope, id));
            }
            Node::MultiDecl(decl) => {
                for &child in &decl.decls.clone() {
                    self.visit(ast, child, scope);
                }
            }
            Node::TupleDecl(decl) => {
                for &element in &decl.elements.clone() {
                    self.visit(ast, element, scope);
                }
            }
            Node::Block(block) => {
                let block_scope =
                    self.scopes
                        .push(ScopeKind::Block, Some(scope), ast.ast_id(id));
                for &stmt in &block.stmts.clone() {
                    self.visit(ast, stmt, block_scope);
                }
            }
            Node::Conditional(stmt) => {
                let stmt = *stmt;
                self.visit(ast, stmt.then_block, scope);
                if let Some(else_block) = stmt.else_block {
                    self.visit(ast, else_block, scope);
                }
            }
            Node::While(stmt) => {
                let body = stmt.body;
                self.visit(ast, body, scope);
            }
            Node::For(stmt) => {
                let stmt = *stmt;
                let kind = if stmt.is_forall {
                    ScopeKind::ForallIndex
                } else {
                    ScopeKind::Loop
                };
                let loop_scope = self.scopes.push(kind, Some(scope), ast.ast_id(id));
                if let Some(index) = stmt.index {
                    self.visit(ast, index, loop_scope);
                }
                self.visit(ast, stmt.body, loop_scope);
            }
            Node::Defer(stmt) => {
                let body = stmt.body;
                self.visit(ast, body, scope);
            }
            Node::Label(stmt) => {
                let stmt = *stmt;
                self.declare(ast, scope, stmt.name, id, SymbolKind::Label);
                self.visit(ast, stmt.target, scope);
            }
            // expressions introduce no scopes or symbols
            _ => {}
        }
    }

    fn declare_variable(
        &mut self,
        ast: &Ast,
        id: NodeId,
        scope: ScopeId,
        name: StrKey,
        storage: StorageClass,
    ) {
        // variables elaborated inside a module's init function logically
        // belong to the module; re-target them at symbol creation
        let target = if self.scopes.get(scope).hoist_variables {
            self.scopes.get(scope).parent.unwrap_or(scope)
        } else {
            scope
        };
        self.declare(ast, target, name, id, SymbolKind::Variable { storage });
    }

    fn declare(
        &mut self,
        ast: &Ast,
        scope: ScopeId,
        name: StrKey,
        node: NodeId,
        kind: SymbolKind,
    ) {
        let decl = ast.ast_id(node);
        let bucket = self.scopes.get(scope).bucket(name);

        if let Some(&previous) = bucket.first() {
            let overloads = kind.is_overloadable()
                && bucket.iter().all(|existing| {
                    self.symbols
                        .get(*existing)
                        .map(|symbol| symbol.kind.is_overloadable())
                        .unwrap_or(false)
                });
            if !overloads {
                let previous_loc = self
                    .symbols
                    .get(previous)
                    .and_then(|symbol| {
                        ast.find(symbol.ast).map(|node| ast.locate(node))
                    })
                    .unwrap_or_else(|| ast.locate(node));
                self.report.add(
                    ResolveError::DuplicateDefinition {
                        name: self.strings[name].to_owned(),
                        loc: ast.locate(node),
                        previous: previous_loc,
                    }
                    .into(),
                );
                return;
            }
        }

        self.scopes.declare(scope, name, decl);
        self.symbols.insert(Symbol {
            ast: decl,
            name,
            kind,
        });
    }

    /// Second phase: resolve use targets against the top-level module map
    /// and record the import edges.
    fn link_uses(&mut self) {
        let pending = std::mem::take(&mut self.pending_uses);
        for (ast, scope, node) in pending {
            let ast = &ast;
            let Some(use_decl) = ast.node(node).as_use().cloned() else {
                continue;
            };

            for target in use_decl.targets {
                let Some(identifier) = ast.node(target).as_identifier() else {
                    self.report.add(
                        ResolveError::UnresolvedUse {
                            name: "<expression>".to_owned(),
                            loc: ast.locate(target),
                        }
                        .into(),
                    );
                    continue;
                };

                match self.module_scopes.get(&identifier.name).copied() {
                    Some((module_decl, module_scope)) => {
                        self.scopes.add_import(scope, module_scope);
                        // the used module's own name becomes visible as an
                        // alias in the using scope
                        let alias = Symbol {
                            ast: ast.ast_id(target),
                            name: identifier.name,
                            kind: SymbolKind::ForwardingAlias {
                                target: module_decl,
                            },
                        };
                        self.symbols.insert(alias);
                    }
                    None => {
                        let name = self.strings[identifier.name].to_owned();
                        self.symbols.insert(Symbol {
                            ast: ast.ast_id(target),
                            name: identifier.name,
                            kind: SymbolKind::UnresolvedForward,
                        });
                        self.report.add(
                            ResolveError::UnresolvedUse {
                                name,
                                loc: ast.locate(target),
                            }
                            .into(),
                        );
                    }
                }
            }
        }
    }
}

/// Module top-levels that stay at module scope rather than moving into the
/// synthetic init function.
fn is_global_decl(node: &Node) -> bool {
    matches!(
        node,
        Node::Module(_)
            | Node::Function(_)
            | Node::Variable(_)
            | Node::Record(_)
            | Node::Class(_)
            | Node::Union(_)
            | Node::Enum(_)
            | Node::Use(_)
            | Node::MultiDecl(_)
            | Node::TupleDecl(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::LookupConfig;
    use sable_span::{Loc, SourceId, Span};
    use sable_tree::node::*;
    use sable_tree::AstBuilder;

    fn loc() -> Loc {
        Loc::new(SourceId::new(0), Span::new(0, 0))
    }

    fn module_with_var(strings: &mut StrInterner) -> Ast {
        let mut builder = AstBuilder::new();
        let decl = builder.push(
            VariableDecl {
                name: strings.intern("x"),
                storage: StorageClass::Var,
                type_expr: None,
                init: None,
            },
            loc(),
        );
        let module = builder.push(
            ModuleDecl {
                name: strings.intern("M"),
                body: vec![decl],
            },
            loc(),
        );
        builder.finish(module, strings)
    }

    #[test]
    fn module_variables_land_in_module_scope() {
        let mut strings = StrInterner::new();
        let mut report = Report::new();
        let ast = module_with_var(&mut strings);

        let program = build_scopes(vec![ast], &mut strings, &mut report);
        assert!(report.is_empty());

        let parts = &program.modules[0];
        let x = strings.lookup("x").unwrap();
        let found = program.scopes.lookup(
            parts.scope,
            x,
            LookupConfig::DECLS,
            &program.symbols,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(program.symbols.expect(found[0]).name, x);
    }

    #[test]
    fn init_statements_partition_away_from_globals() {
        let mut strings = StrInterner::new();
        let mut builder = AstBuilder::new();

        let decl = builder.push(
            VariableDecl {
                name: strings.intern("x"),
                storage: StorageClass::Var,
                type_expr: None,
                init: None,
            },
            loc(),
        );
        let mention = builder.push(
            Identifier {
                name: strings.intern("x"),
            },
            loc(),
        );
        let module = builder.push(
            ModuleDecl {
                name: strings.intern("M"),
                body: vec![decl, mention],
            },
            loc(),
        );
        let ast = builder.finish(module, &mut strings);

        let mut report = Report::new();
        let program = build_scopes(vec![ast], &mut strings, &mut report);
        let parts = &program.modules[0];

        assert_eq!(parts.globals, vec![decl]);
        assert_eq!(parts.init_stmts, vec![mention]);
        assert_eq!(
            &strings[program.symbols.expect(parts.init_symbol).name],
            "__init_M"
        );
    }

    #[test]
    fn duplicate_non_overloadable_names_report() {
        let mut strings = StrInterner::new();
        let mut builder = AstBuilder::new();
        let x = strings.intern("x");

        let first = builder.push(
            VariableDecl {
                name: x,
                storage: StorageClass::Var,
                type_expr: None,
                init: None,
            },
            loc(),
        );
        let second = builder.push(
            VariableDecl {
                name: x,
                storage: StorageClass::Const,
                type_expr: None,
                init: None,
            },
            loc(),
        );
        let module = builder.push(
            ModuleDecl {
                name: strings.intern("M"),
                body: vec![first, second],
            },
            loc(),
        );
        let ast = builder.finish(module, &mut strings);

        let mut report = Report::new();
        build_scopes(vec![ast], &mut strings, &mut report);
        assert!(report.has_errors());
    }

    #[test]
    fn use_links_an_import_edge() {
        let mut strings = StrInterner::new();

        let lib = module_with_var(&mut strings);

        let mut builder = AstBuilder::new();
        let target = builder.push(
            Identifier {
                name: strings.intern("M"),
            },
            loc(),
        );
        let use_decl = builder.push(
            UseDecl {
                targets: vec![target],
            },
            loc(),
        );
        let module = builder.push(
            ModuleDecl {
                name: strings.intern("Main"),
                body: vec![use_decl],
            },
            loc(),
        );
        let main = builder.finish(module, &mut strings);

        let mut report = Report::new();
        let program = build_scopes(vec![lib, main], &mut strings, &mut report);
        assert!(report.is_empty());

        let main_parts = &program.modules[1];
        let x = strings.lookup("x").unwrap();
        let found = program.scopes.lookup(
            main_parts.scope,
            x,
            LookupConfig::DECLS_PARENTS_IMPORTS,
            &program.symbols,
        );
        assert_eq!(found.len(), 1);
    }
}
