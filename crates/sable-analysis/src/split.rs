use std::collections::{HashMap, HashSet};

use sable_calls::ResolutionResult;
use sable_span::{Diagnostic, ErrorKind, Report};
use sable_tree::node::Node;
use sable_tree::{Ast, AstId, NodeId};
use sable_types::{Nilability, TypeData, TypeInterner};
use sable_utils::interner::{StrInterner, StrKey};

/// Per-variable state along one control-flow path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitState {
    /// `=` assignments seen before the first read.
    pub assigns: u32,
    pub read: bool,
}

/// Outcome of the split-init dataflow over one region.
#[derive(Debug, Clone, Default)]
pub struct SplitOutcome {
    pub split_inited: HashSet<AstId>,
    /// The `=` node that performs each split initialization.
    pub init_points: HashMap<AstId, NodeId>,
}

/// Forward dataflow over the region's statements: a variable declared
/// without an initializer is split-initialized when every path from the
/// declaration to its first use assigns it exactly once with `=` and never
/// reads it before that. The merge at control-flow joins is intersection.
pub fn split_inits(
    ast: &Ast,
    region: StrKey,
    roots: &[NodeId],
    resolution: &ResolutionResult,
    types: &TypeInterner,
    strings: &StrInterner,
    report: &mut Report,
) -> SplitOutcome {
    let mut flow = Flow {
        ast,
        region,
        resolution,
        types,
        report,
        assign_op: strings.lookup("="),
        candidates: HashSet::new(),
        disqualified: HashSet::new(),
        failed: HashSet::new(),
        init_points: HashMap::new(),
    };

    let mut state: HashMap<AstId, SplitState> = HashMap::new();
    for &root in roots {
        flow.walk(root, &mut state);
    }

    let split_inited = flow
        .candidates
        .iter()
        .copied()
        .filter(|decl| {
            !flow.disqualified.contains(decl)
                && !flow.failed.contains(decl)
                && state.get(decl).map(|s| s.assigns) == Some(1)
        })
        .collect();

    SplitOutcome {
        split_inited,
        init_points: flow.init_points,
    }
}

struct Flow<'a> {
    ast: &'a Ast,
    region: StrKey,
    resolution: &'a ResolutionResult,
    types: &'a TypeInterner,
    report: &'a mut Report,
    assign_op: Option<StrKey>,
    /// variables declared without an initializer
    candidates: HashSet<AstId>,
    disqualified: HashSet<AstId>,
    failed: HashSet<AstId>,
    init_points: HashMap<AstId, NodeId>,
}

impl Flow<'_> {
    fn is_assign(&self, op: StrKey) -> bool {
        self.assign_op == Some(op)
    }

    /// Non-nilable class values have no default; everything else does.
    fn default_initializable(&self, node: NodeId) -> bool {
        let id = self.ast.ast_id(node);
        let Some(re) = self.resolution.get(id.post) else {
            return true;
        };
        match self.types.try_get(re.qt.ty) {
            Some(TypeData::Class { decorator, .. }) => {
                decorator.nilability == Nilability::Nilable
            }
            Some(TypeData::BasicClass(_)) => false,
            _ => true,
        }
    }

    fn target_of(&self, node: NodeId) -> Option<AstId> {
        let id = self.ast.ast_id(node);
        if id.path != self.region {
            return None;
        }
        self.resolution.get(id.post).and_then(|re| re.to_id)
    }

    fn walk(&mut self, node: NodeId, state: &mut HashMap<AstId, SplitState>) {
        match self.ast.node(node) {
            Node::Variable(variable) => {
                let decl = self.ast.ast_id(node);
                if variable.init.is_none() && variable.type_expr.is_some() {
                    self.candidates.insert(decl);
                    state.insert(decl, SplitState::default());
                } else if let Some(init) = variable.init {
                    self.walk(init, state);
                }
            }
            // only `=` writes; other operators read their operands
            Node::OpCall(op) if op.operands.len() == 2 && self.is_assign(op.op) => {
                let lhs = op.operands[0];
                let rhs = op.operands[1];
                self.walk(rhs, state);
                match self.target_of(lhs) {
                    Some(decl) if self.candidates.contains(&decl) => {
                        let entry = state.entry(decl).or_default();
                        if !entry.read {
                            entry.assigns += 1;
                            if entry.assigns == 1 {
                                self.init_points.insert(decl, node);
                            }
                        }
                    }
                    _ => self.walk(lhs, state),
                }
            }
            Node::Identifier(_) => {
                if let Some(decl) = self.target_of(node) {
                    if self.candidates.contains(&decl) {
                        let entry = state.entry(decl).or_default();
                        // default-initializable types read their default
                        // value; only types without one fail here
                        if entry.assigns == 0
                            && !self.failed.contains(&decl)
                            && !self.default_initializable(node)
                        {
                            self.failed.insert(decl);
                            self.report.add(Diagnostic::error(
                                ErrorKind::SplitInitFailure,
                                self.ast.locate(node),
                                "variable is read before it is initialized on this path",
                            ));
                        }
                        entry.read = true;
                    }
                }
            }
            Node::Conditional(cond) => {
                let cond = *cond;
                self.walk(cond.condition, state);

                let mut then_state = state.clone();
                self.walk(cond.then_block, &mut then_state);

                let mut else_state = state.clone();
                if let Some(else_block) = cond.else_block {
                    self.walk(else_block, &mut else_state);
                }

                // merge = intersection over paths: uneven assignment counts
                // disqualify the variable from split-init
                for &decl in &self.candidates.clone() {
                    let a = then_state.get(&decl).copied().unwrap_or_default();
                    let b = else_state.get(&decl).copied().unwrap_or_default();
                    if a.assigns != b.assigns {
                        self.disqualified.insert(decl);
                    }
                    state.insert(
                        decl,
                        SplitState {
                            assigns: a.assigns.max(b.assigns),
                            read: a.read || b.read,
                        },
                    );
                }
            }
            Node::While(stmt) => {
                let stmt = *stmt;
                self.walk(stmt.condition, state);
                self.loop_body(stmt.body, state);
            }
            Node::For(stmt) => {
                let stmt = *stmt;
                self.walk(stmt.iterand, state);
                self.loop_body(stmt.body, state);
            }
            _ => {
                for child in self.ast.children(node) {
                    self.walk(child, state);
                }
            }
        }
    }

    /// A loop body runs zero or more times; any assignment to a candidate
    /// inside it disqualifies split-init.
    fn loop_body(&mut self, body: NodeId, state: &mut HashMap<AstId, SplitState>) {
        let before = state.clone();
        self.walk(body, state);
        for &decl in &self.candidates.clone() {
            let entry = state.entry(decl).or_default();
            let previous = before.get(&decl).copied().unwrap_or_default();
            if entry.assigns != previous.assigns {
                self.disqualified.insert(decl);
            }
        }
    }
}

/// Postorder position of the last read of each declaration in the region,
/// together with whether any read sits inside a loop (which blocks
/// elision).
pub fn last_reads(
    ast: &Ast,
    region: StrKey,
    roots: &[NodeId],
    resolution: &ResolutionResult,
) -> HashMap<AstId, (i32, bool)> {
    let mut reads: HashMap<AstId, (i32, bool)> = HashMap::new();
    for &root in roots {
        collect_reads(ast, region, root, resolution, false, &mut reads);
    }
    reads
}

fn collect_reads(
    ast: &Ast,
    region: StrKey,
    node: NodeId,
    resolution: &ResolutionResult,
    in_loop: bool,
    reads: &mut HashMap<AstId, (i32, bool)>,
) {
    let in_loop = in_loop || matches!(ast.node(node), Node::While(_) | Node::For(_));

    if let Node::Identifier(_) = ast.node(node) {
        let id = ast.ast_id(node);
        if id.path == region {
            if let Some(decl) = resolution.get(id.post).and_then(|re| re.to_id) {
                let entry = reads.entry(decl).or_insert((id.post, in_loop));
                if id.post >= entry.0 {
                    entry.0 = id.post;
                }
                entry.1 |= in_loop;
            }
        }
    }

    for child in ast.children(node) {
        collect_reads(ast, region, child, resolution, in_loop, reads);
    }
}
