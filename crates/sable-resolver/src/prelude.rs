use std::collections::HashMap;

use sable_tree::AstId;
use sable_utils::interner::StrInterner;
use serde::{Deserialize, Serialize};

use crate::scope::{ScopeGraph, ScopeId, ScopeKind};
use crate::symbol::{Symbol, SymbolKind, SymbolTable, TypeCategory};

/// Builtin type families visible in every program. Width selection
/// (`int(8)`) is a type call resolved downstream; the prelude only binds
/// the family names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinType {
    Int,
    Uint,
    Real,
    Imag,
    Complex,
    Bool,
    Str,
    /// The generic `numeric` constraint type.
    Numeric,
    Void,
    Nothing,
}

impl BuiltinType {
    const ALL: [(&'static str, BuiltinType); 10] = [
        ("int", BuiltinType::Int),
        ("uint", BuiltinType::Uint),
        ("real", BuiltinType::Real),
        ("imag", BuiltinType::Imag),
        ("complex", BuiltinType::Complex),
        ("bool", BuiltinType::Bool),
        ("string", BuiltinType::Str),
        ("numeric", BuiltinType::Numeric),
        ("void", BuiltinType::Void),
        ("nothing", BuiltinType::Nothing),
    ];
}

/// The outermost scope: builtin type names, each with a synthetic
/// declaration id under the `<prelude>` path.
#[derive(Debug, Clone)]
pub struct Prelude {
    pub scope: ScopeId,
    builtins: HashMap<AstId, BuiltinType>,
}

impl Prelude {
    pub fn install(
        graph: &mut ScopeGraph,
        symbols: &mut SymbolTable,
        strings: &mut StrInterner,
    ) -> Self {
        let root = AstId::symbol_root(strings.intern("<prelude>"));
        let scope = graph.push(ScopeKind::Prelude, None, root);

        let mut builtins = HashMap::new();
        for (text, builtin) in BuiltinType::ALL {
            let name = strings.intern(text);
            let path = strings.intern(&format!("<prelude>.{text}"));
            let decl = AstId::symbol_root(path);

            graph.declare(scope, name, decl);
            symbols.insert(Symbol {
                ast: decl,
                name,
                kind: SymbolKind::Type {
                    category: TypeCategory::Primitive,
                },
            });
            builtins.insert(decl, builtin);
        }

        Self { scope, builtins }
    }

    /// The builtin behind a prelude declaration id, if it is one.
    pub fn builtin_for(&self, decl: AstId) -> Option<BuiltinType> {
        self.builtins.get(&decl).copied()
    }
}
