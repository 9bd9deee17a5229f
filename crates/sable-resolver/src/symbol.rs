use std::collections::HashMap;

use derive_more::Display;
use sable_tree::node::{Intent, MethodKind, StorageClass};
use sable_tree::AstId;
use sable_utils::interner::StrKey;
use serde::{Deserialize, Serialize};

/// What kind of type a type symbol declares.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum TypeCategory {
    Record,
    Class,
    Union,
    Enum,
    /// Builtin types from the prelude scope.
    Primitive,
}

/// Declaration record variants; everything cross-references by id only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Module,
    Variable {
        storage: StorageClass,
    },
    Formal {
        intent: Intent,
    },
    Function {
        method_kind: MethodKind,
        parenless: bool,
    },
    Type {
        category: TypeCategory,
    },
    EnumConstant,
    Label,
    /// Named but not yet resolvable, e.g. a use of a module that is not in
    /// the program.
    UnresolvedForward,
    /// A name that stands for a scope elsewhere, introduced by use-imports.
    ForwardingAlias {
        target: AstId,
    },
}

impl SymbolKind {
    /// Only functions may share a name bucket.
    pub fn is_overloadable(&self) -> bool {
        matches!(self, SymbolKind::Function { .. })
    }

    pub fn is_function(&self) -> bool {
        matches!(self, SymbolKind::Function { .. })
    }

    pub fn is_method(&self) -> bool {
        matches!(
            self,
            SymbolKind::Function {
                method_kind: MethodKind::Method | MethodKind::Initializer,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub ast: AstId,
    pub name: StrKey,
    pub kind: SymbolKind,
}

/// All declaration records of the program, addressed by declaration id.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: HashMap<AstId, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: Symbol) {
        self.symbols.insert(symbol.ast, symbol);
    }

    pub fn get(&self, id: AstId) -> Option<&Symbol> {
        self.symbols.get(&id)
    }

    pub fn expect(&self, id: AstId) -> &Symbol {
        self.symbols
            .get(&id)
            .expect("declaration id without symbol record")
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }
}
