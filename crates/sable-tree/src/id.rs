use std::fmt;

use sable_utils::{define_id, interner::StrKey};
use serde::{Deserialize, Serialize};

define_id!(
    /// Index of a node inside its module's node table.
    NodeId
);

/// Postorder index of a symbol declaration within its own path.
pub const SYMBOL_POST: i32 = -1;

/// Stable identity of an AST node.
///
/// `path` names the innermost enclosing symbol as an interned dotted string
/// (`"M.foo"`); `post` is the node's postorder index among the non-symbol
/// nodes of that path. Symbol declarations carry their own path and
/// [`SYMBOL_POST`], which makes every child id a path extension of its
/// parent's.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AstId {
    pub path: StrKey,
    pub post: i32,
}

impl AstId {
    #[inline]
    pub fn new(path: StrKey, post: i32) -> Self {
        Self { path, post }
    }

    /// The id of the symbol declaration owning `path` itself.
    #[inline]
    pub fn symbol_root(path: StrKey) -> Self {
        Self {
            path,
            post: SYMBOL_POST,
        }
    }

    #[inline]
    pub fn is_symbol(self) -> bool {
        self.post == SYMBOL_POST
    }
}

impl fmt::Debug for AstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path, self.post)
    }
}

impl fmt::Display for AstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path, self.post)
    }
}
