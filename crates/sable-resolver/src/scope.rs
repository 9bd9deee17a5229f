use indexmap::IndexMap;
use sable_tree::AstId;
use sable_utils::{define_id, interner::StrKey};
use serde::{Deserialize, Serialize};

use crate::symbol::SymbolTable;

define_id!(ScopeId);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ScopeKind {
    Prelude,
    Module,
    Function,
    Formals,
    Block,
    Aggregate,
    Loop,
    ForallIndex,
}

/// One lexical scope: declaration buckets plus use-import edges.
///
/// Buckets keep declaration order; a name may map to several declarations
/// only when every one of them is overloadable.
#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub created_by: AstId,
    /// Variables declared here are hoisted into the parent scope; set on
    /// the synthetic module-init function scope.
    pub hoist_variables: bool,
    declared: IndexMap<StrKey, Vec<AstId>>,
    imports: Vec<ScopeId>,
}

impl Scope {
    fn new(kind: ScopeKind, parent: Option<ScopeId>, created_by: AstId) -> Self {
        Self {
            kind,
            parent,
            created_by,
            hoist_variables: false,
            declared: IndexMap::new(),
            imports: Vec::new(),
        }
    }

    pub fn declarations(&self) -> impl Iterator<Item = (StrKey, &[AstId])> {
        self.declared
            .iter()
            .map(|(&name, bucket)| (name, bucket.as_slice()))
    }

    pub fn bucket(&self, name: StrKey) -> &[AstId] {
        self.declared.get(&name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn imports(&self) -> &[ScopeId] {
        &self.imports
    }
}

/// Lookup behavior flags; mirrors the closed flag set of the scope queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LookupConfig {
    pub decls: bool,
    pub parents: bool,
    pub imports: bool,
    pub only_methods: bool,
    pub stop_at_module: bool,
}

impl LookupConfig {
    pub const DECLS: Self = Self {
        decls: true,
        parents: false,
        imports: false,
        only_methods: false,
        stop_at_module: false,
    };

    pub const DECLS_PARENTS: Self = Self {
        parents: true,
        ..Self::DECLS
    };

    pub const DECLS_PARENTS_IMPORTS: Self = Self {
        imports: true,
        ..Self::DECLS_PARENTS
    };

    pub fn with_only_methods(mut self) -> Self {
        self.only_methods = true;
        self
    }

    pub fn with_stop_at_module(mut self) -> Self {
        self.stop_at_module = true;
        self
    }
}

/// The program-wide scope graph. Built once per revision by the declaration
/// pass and immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct ScopeGraph {
    scopes: Vec<Scope>,
    by_creator: IndexMap<AstId, ScopeId>,
}

impl ScopeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: ScopeKind, parent: Option<ScopeId>, created_by: AstId) -> ScopeId {
        let id = ScopeId::from_usize(self.scopes.len());
        self.scopes.push(Scope::new(kind, parent, created_by));
        self.by_creator.insert(created_by, id);
        id
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.as_usize()]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.as_usize()]
    }

    /// The scope created by the given declaration, if any.
    pub fn scope_for(&self, created_by: AstId) -> Option<ScopeId> {
        self.by_creator.get(&created_by).copied()
    }

    /// The innermost scope created by or containing `node`: the node's own
    /// scope when it creates one, else the nearest scope-creating ancestor.
    pub fn innermost_containing(
        &self,
        ast: &sable_tree::Ast,
        node: sable_tree::NodeId,
    ) -> Option<ScopeId> {
        let mut current = Some(node);
        while let Some(id) = current {
            if let Some(scope) = self.scope_for(ast.ast_id(id)) {
                return Some(scope);
            }
            current = ast.parent(id);
        }
        None
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScopeId, &Scope)> {
        self.scopes
            .iter()
            .enumerate()
            .map(|(index, scope)| (ScopeId::from_usize(index), scope))
    }

    /// Appends a declaration; legal only during construction. Overload
    /// rules are checked by the caller so it can report a located
    /// diagnostic.
    pub fn declare(&mut self, scope: ScopeId, name: StrKey, decl: AstId) {
        self.get_mut(scope)
            .declared
            .entry(name)
            .or_default()
            .push(decl);
    }

    pub fn add_import(&mut self, scope: ScopeId, imported: ScopeId) {
        self.get_mut(scope).imports.push(imported);
    }

    /// Name lookup from `scope` outwards.
    ///
    /// Shadowing distance per scope level: own declarations first, then
    /// imported scopes' declarations, then the parent level. The nearest
    /// level with any hit wins; when every hit there is a function and
    /// parents are allowed, function overloads from further levels are
    /// unioned in (shadowed non-functions are not).
    pub fn lookup(
        &self,
        scope: ScopeId,
        name: StrKey,
        config: LookupConfig,
        symbols: &SymbolTable,
    ) -> Vec<AstId> {
        let mut results: Vec<AstId> = Vec::new();
        let mut functions_only = true;
        let mut current = Some(scope);

        while let Some(id) = current {
            let scope = self.get(id);
            let mut level: Vec<AstId> = Vec::new();

            if config.decls {
                level.extend_from_slice(scope.bucket(name));
            }
            if config.imports {
                for &import in scope.imports() {
                    level.extend_from_slice(self.get(import).bucket(name));
                }
            }

            if config.only_methods {
                level.retain(|decl| {
                    symbols
                        .get(*decl)
                        .map(|symbol| symbol.kind.is_method())
                        .unwrap_or(false)
                });
            }

            if !level.is_empty() {
                let level_is_functions = level.iter().all(|decl| {
                    symbols
                        .get(*decl)
                        .map(|symbol| symbol.kind.is_function())
                        .unwrap_or(false)
                });

                if results.is_empty() {
                    results = level;
                    functions_only = level_is_functions;
                } else if functions_only && level_is_functions {
                    // union visible overloads from outer levels
                    for decl in level {
                        if !results.contains(&decl) {
                            results.push(decl);
                        }
                    }
                }

                if !functions_only {
                    break;
                }
            }

            if !config.parents {
                break;
            }
            if config.stop_at_module && scope.kind == ScopeKind::Module {
                break;
            }
            current = scope.parent;
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{Symbol, SymbolKind};
    use sable_tree::node::{MethodKind, StorageClass};
    use sable_utils::interner::StrInterner;

    fn decl(strings: &mut StrInterner, path: &str) -> AstId {
        AstId::symbol_root(strings.intern(path))
    }

    #[test]
    fn locals_shadow_imports_which_shadow_parents() {
        let mut strings = StrInterner::new();
        let mut symbols = SymbolTable::new();
        let mut graph = ScopeGraph::new();

        let name = strings.intern("x");
        let outer_decl = decl(&mut strings, "Out.x");
        let imported_decl = decl(&mut strings, "Lib.x");
        let local_decl = decl(&mut strings, "In.x");
        for &ast in [outer_decl, imported_decl, local_decl].iter() {
            symbols.insert(Symbol {
                ast,
                name,
                kind: SymbolKind::Variable {
                    storage: StorageClass::Var,
                },
            });
        }

        let outer = graph.push(ScopeKind::Module, None, decl(&mut strings, "Out"));
        let lib = graph.push(ScopeKind::Module, None, decl(&mut strings, "Lib"));
        let inner = graph.push(ScopeKind::Block, Some(outer), decl(&mut strings, "In"));

        graph.declare(outer, name, outer_decl);
        graph.declare(lib, name, imported_decl);
        graph.add_import(inner, lib);

        let config = LookupConfig::DECLS_PARENTS_IMPORTS;

        // import shadows the enclosing module
        assert_eq!(graph.lookup(inner, name, config, &symbols), vec![imported_decl]);

        // a local declaration shadows the import
        graph.declare(inner, name, local_decl);
        assert_eq!(graph.lookup(inner, name, config, &symbols), vec![local_decl]);
    }

    #[test]
    fn function_overloads_union_across_levels() {
        let mut strings = StrInterner::new();
        let mut symbols = SymbolTable::new();
        let mut graph = ScopeGraph::new();

        let name = strings.intern("f");
        let inner_fn = decl(&mut strings, "M.inner.f");
        let outer_fn = decl(&mut strings, "M.f");
        for &ast in [inner_fn, outer_fn].iter() {
            symbols.insert(Symbol {
                ast,
                name,
                kind: SymbolKind::Function {
                    method_kind: MethodKind::None,
                    parenless: false,
                },
            });
        }

        let module = graph.push(ScopeKind::Module, None, decl(&mut strings, "M"));
        let block = graph.push(ScopeKind::Block, Some(module), decl(&mut strings, "M.inner"));
        graph.declare(module, name, outer_fn);
        graph.declare(block, name, inner_fn);

        let found = graph.lookup(block, name, LookupConfig::DECLS_PARENTS_IMPORTS, &symbols);
        assert_eq!(found, vec![inner_fn, outer_fn]);
    }
}
