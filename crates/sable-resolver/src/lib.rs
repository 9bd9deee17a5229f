//! Scopes, symbols and name binding.
//!
//! The scope graph spans the whole program: one [`ScopeGraph`] holds the
//! scopes of every module plus the prelude, so use-import edges are plain
//! scope ids. Construction happens once per revision in a declaration pass;
//! after that the graph is read-only and the binder attaches a
//! [`NameTarget`] to every identifier use.

mod bind;
mod build;
mod error;
mod prelude;
mod scope;
mod symbol;

pub use bind::{bind_symbol, NameBindings, NameTarget};
pub use build::{build_scopes, ModuleParts, Program};
pub use error::ResolveError;
pub use prelude::{BuiltinType, Prelude};
pub use scope::{LookupConfig, Scope, ScopeGraph, ScopeId, ScopeKind};
pub use symbol::{Symbol, SymbolKind, SymbolTable, TypeCategory};
