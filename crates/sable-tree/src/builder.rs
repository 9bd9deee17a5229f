use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::Hasher;
use std::rc::Rc;

use sable_span::Loc;
use sable_utils::interner::{StrInterner, StrKey};

use crate::id::{AstId, NodeId};
use crate::node::Node;

/// Accumulates nodes for one module; children are pushed before the nodes
/// that reference them.
#[derive(Debug, Default)]
pub struct AstBuilder {
    nodes: Vec<Node>,
    locs: Vec<Loc>,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: impl Into<Node>, loc: Loc) -> NodeId {
        let id = NodeId::from_usize(self.nodes.len());
        self.nodes.push(node.into());
        self.locs.push(loc);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.as_usize()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Seals the table, numbers every node and derives the parent map. The
    /// interner provides the dotted symbol-path strings.
    pub fn finish(self, root: NodeId, interner: &mut StrInterner) -> Ast {
        let Self { nodes, locs } = self;

        let empty = interner.intern("");
        let mut numberer = Numberer {
            interner,
            ids: vec![AstId::new(empty, i32::MIN); nodes.len()],
            counters: HashMap::new(),
            occurrences: HashMap::new(),
        };
        numberer.assign(&nodes, root, empty);

        let mut parents = vec![None; nodes.len()];
        for (index, node) in nodes.iter().enumerate() {
            for child in node.children() {
                parents[child.as_usize()] = Some(NodeId::from_usize(index));
            }
        }

        let by_id = numberer
            .ids
            .iter()
            .enumerate()
            .map(|(index, &id)| (id, NodeId::from_usize(index)))
            .collect();

        Ast {
            nodes: Rc::new(nodes),
            locs: Rc::new(locs),
            root,
            ids: Rc::new(numberer.ids),
            by_id: Rc::new(by_id),
            parents: Rc::new(parents),
        }
    }
}

struct Numberer<'i> {
    interner: &'i mut StrInterner,
    ids: Vec<AstId>,
    /// next postorder index per symbol path
    counters: HashMap<StrKey, i32>,
    /// repetition count per (parent path, name), for overload sets
    occurrences: HashMap<(StrKey, StrKey), u32>,
}

impl Numberer<'_> {
    fn assign(&mut self, nodes: &[Node], id: NodeId, path: StrKey) {
        let node = &nodes[id.as_usize()];

        if node.is_symbol_decl() {
            let name = node
                .decl_name()
                .expect("symbol declarations carry a name");
            let child_path = self.symbol_path(path, name);
            for child in node.children() {
                self.assign(nodes, child, child_path);
            }
            self.ids[id.as_usize()] = AstId::symbol_root(child_path);
        } else {
            for child in node.children() {
                self.assign(nodes, child, path);
            }
            let counter = self.counters.entry(path).or_insert(0);
            self.ids[id.as_usize()] = AstId::new(path, *counter);
            *counter += 1;
        }
    }

    /// `parent.name`, with a `#n` suffix from the second overload on so
    /// overloaded symbols keep distinct paths.
    fn symbol_path(&mut self, parent: StrKey, name: StrKey) -> StrKey {
        let occurrence = {
            let slot = self.occurrences.entry((parent, name)).or_insert(0);
            let current = *slot;
            *slot += 1;
            current
        };

        let parent_text = self.interner[parent].to_owned();
        let name_text = self.interner[name].to_owned();

        let mut text = if parent_text.is_empty() {
            name_text
        } else {
            format!("{parent_text}.{name_text}")
        };
        if occurrence > 0 {
            text.push_str(&format!("#{occurrence}"));
        }

        self.interner.intern(&text)
    }
}

/// An immutable, numbered module tree.
#[derive(Debug, Clone)]
pub struct Ast {
    nodes: Rc<Vec<Node>>,
    locs: Rc<Vec<Loc>>,
    root: NodeId,
    ids: Rc<Vec<AstId>>,
    by_id: Rc<HashMap<AstId, NodeId>>,
    parents: Rc<Vec<Option<NodeId>>>,
}

impl Ast {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.as_usize()]
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).children()
    }

    /// Derived parent relation; the root has none.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents[id.as_usize()]
    }

    pub fn ast_id(&self, id: NodeId) -> AstId {
        self.ids[id.as_usize()]
    }

    pub fn find(&self, id: AstId) -> Option<NodeId> {
        self.by_id.get(&id).copied()
    }

    pub fn locate(&self, id: NodeId) -> Loc {
        self.locs[id.as_usize()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (NodeId::from_usize(index), node))
    }

    /// Structural equality: tag, payload and children, recursively.
    pub fn contents_match(&self, id: NodeId, other: &Ast, other_id: NodeId) -> bool {
        let a = self.node(id);
        let b = other.node(other_id);
        if !a.same_payload(b) {
            return false;
        }

        let lhs = a.children();
        let rhs = b.children();
        lhs.len() == rhs.len()
            && lhs
                .into_iter()
                .zip(rhs)
                .all(|(l, r)| self.contents_match(l, other, r))
    }

    /// Structural hash over the subtree rooted at `id`; agrees with
    /// [`Ast::contents_match`].
    pub fn structural_hash(&self, id: NodeId) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash_subtree(id, &mut hasher);
        hasher.finish()
    }

    fn hash_subtree<H: Hasher>(&self, id: NodeId, state: &mut H) {
        let node = self.node(id);
        node.hash_local(state);
        let children = node.children();
        state.write_usize(children.len());
        for child in children {
            self.hash_subtree(child, state);
        }
    }
}

/// Copies the subtree under `root` into `dst`, preserving source order and
/// locations. Returns the new root and the old-to-new id map used by the
/// instantiator to re-target references.
pub fn clone_subtree(
    src: &Ast,
    root: NodeId,
    dst: &mut AstBuilder,
) -> (NodeId, HashMap<NodeId, NodeId>) {
    let mut map = HashMap::new();
    let new_root = clone_into(src, root, dst, &mut map);
    (new_root, map)
}

fn clone_into(
    src: &Ast,
    id: NodeId,
    dst: &mut AstBuilder,
    map: &mut HashMap<NodeId, NodeId>,
) -> NodeId {
    for child in src.children(id) {
        clone_into(src, child, dst, map);
    }

    let node = src.node(id).map_children(&mut |child| map[&child]);
    let new_id = dst.push(node, src.locate(id));
    map.insert(id, new_id);
    new_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::*;
    use sable_span::{SourceId, Span};

    fn loc() -> Loc {
        Loc::new(SourceId::new(0), Span::new(0, 0))
    }

    fn sample(interner: &mut StrInterner) -> Ast {
        // module M { var x: int; x; }
        let mut builder = AstBuilder::new();
        let m = interner.intern("M");
        let x = interner.intern("x");
        let int = interner.intern("int");

        let type_expr = builder.push(Identifier { name: int }, loc());
        let decl = builder.push(
            VariableDecl {
                name: x,
                storage: StorageClass::Var,
                type_expr: Some(type_expr),
                init: None,
            },
            loc(),
        );
        let mention = builder.push(Identifier { name: x }, loc());
        let module = builder.push(
            ModuleDecl {
                name: m,
                body: vec![decl, mention],
            },
            loc(),
        );
        builder.finish(module, interner)
    }

    #[test]
    fn numbering_is_postorder_dense() {
        let mut interner = StrInterner::new();
        let ast = sample(&mut interner);

        let path = interner.lookup("M").unwrap();
        let posts: Vec<i32> = ast
            .iter()
            .filter(|(_, node)| !node.is_symbol_decl())
            .map(|(id, _)| {
                assert_eq!(ast.ast_id(id).path, path);
                ast.ast_id(id).post
            })
            .collect();

        let mut sorted = posts.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..posts.len() as i32).collect::<Vec<_>>());
        assert!(ast.ast_id(ast.root()).is_symbol());
    }

    #[test]
    fn child_paths_extend_parent_paths() {
        let mut interner = StrInterner::new();
        let ast = sample(&mut interner);

        for (id, _) in ast.iter() {
            let Some(parent) = ast.parent(id) else {
                continue;
            };
            let child_path = interner[ast.ast_id(id).path].to_owned();
            let parent_path = interner[ast.ast_id(parent).path].to_owned();
            assert!(
                child_path.starts_with(parent_path.as_str()),
                "{child_path} does not extend {parent_path}"
            );
        }
    }

    #[test]
    fn equal_structures_match_and_hash_alike() {
        let mut interner = StrInterner::new();
        let a = sample(&mut interner);
        let b = sample(&mut interner);

        assert!(a.contents_match(a.root(), &b, b.root()));
        assert_eq!(a.structural_hash(a.root()), b.structural_hash(b.root()));
    }

    #[test]
    fn overloaded_symbols_get_distinct_paths() {
        let mut interner = StrInterner::new();
        let mut builder = AstBuilder::new();
        let m = interner.intern("M");
        let f = interner.intern("f");

        let first = builder.push(
            FunctionDecl {
                name: f,
                method_kind: MethodKind::None,
                receiver: None,
                formals: vec![],
                return_type: None,
                where_clause: None,
                body: None,
                parenless: false,
            },
            loc(),
        );
        let second = builder.push(
            FunctionDecl {
                name: f,
                method_kind: MethodKind::None,
                receiver: None,
                formals: vec![],
                return_type: None,
                where_clause: None,
                body: None,
                parenless: false,
            },
            loc(),
        );
        let module = builder.push(
            ModuleDecl {
                name: m,
                body: vec![first, second],
            },
            loc(),
        );
        let ast = builder.finish(module, &mut interner);

        assert_ne!(ast.ast_id(first), ast.ast_id(second));
        assert_eq!(&interner[ast.ast_id(first).path], "M.f");
        assert_eq!(&interner[ast.ast_id(second).path], "M.f#1");
    }

    #[test]
    fn cloned_subtrees_match_structurally() {
        let mut interner = StrInterner::new();
        let ast = sample(&mut interner);

        let mut builder = AstBuilder::new();
        let (new_root, map) = clone_subtree(&ast, ast.root(), &mut builder);
        assert_eq!(map.len(), ast.len());

        let clone = builder.finish(new_root, &mut interner);
        assert!(ast.contents_match(ast.root(), &clone, clone.root()));
    }
}
