use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use sable_calls::{ResolutionResult, SignatureStore};
use sable_span::Report;
use sable_tree::node::{Intent, Node};
use sable_tree::{Ast, AstId, NodeId};
use sable_types::{Management, QtKind, TypeData, TypeInterner};
use sable_utils::interner::{StrInterner, StrKey};
use serde::{Deserialize, Serialize};

use crate::frames::{Action, ActionKind, ScopeFrame};
use crate::split::{last_reads, split_inits, SplitOutcome};

/// How one `=` statement lowers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignLowering {
    /// type/param assignment: a compile-time move, no call
    Move,
    /// split-init target taking an elided source
    MoveInit,
    /// record assignment through `init=`
    InitEqCall,
    /// the `=` operator call
    AssignCall,
}

/// Everything the analyzer learned about one region.
#[derive(Debug, Clone, Default)]
pub struct InitDeinitResult {
    pub split_inited: HashSet<AstId>,
    /// rhs expression ids whose copy was reclassified as a move
    pub elided_copies: HashSet<AstId>,
    /// source variables consumed by an elided copy; they get no deinit
    pub moved_from: HashSet<AstId>,
    pub lowering: HashMap<AstId, AssignLowering>,
    /// drained end-of-scope actions per block, in execution order
    pub actions_at: IndexMap<AstId, Vec<Action>>,
}

/// Runs init/deinit analysis over one resolved region. `region_root` is
/// the node owning the outermost frame (the function body block, or the
/// module node for init statements).
pub fn analyze_region(
    ast: &Ast,
    region: StrKey,
    region_root: NodeId,
    roots: &[NodeId],
    resolution: &ResolutionResult,
    sigs: &SignatureStore,
    types: &TypeInterner,
    strings: &StrInterner,
    report: &mut Report,
) -> InitDeinitResult {
    let split = split_inits(ast, region, roots, resolution, types, strings, report);
    let reads = last_reads(ast, region, roots, resolution);

    let mut analyzer = Analyzer {
        ast,
        region,
        resolution,
        sigs,
        types,
        assign_op: strings.lookup("="),
        split,
        reads,
        frames: vec![ScopeFrame::new(region_root)],
        out: InitDeinitResult::default(),
    };

    for &root in roots {
        analyzer.walk(root);
    }

    let outer = analyzer.frames.pop().expect("outer frame");
    analyzer.exit_frame(outer);

    let mut out = analyzer.out;
    out.split_inited = analyzer.split.split_inited;
    out
}

struct Analyzer<'a> {
    ast: &'a Ast,
    region: StrKey,
    resolution: &'a ResolutionResult,
    sigs: &'a SignatureStore,
    types: &'a TypeInterner,
    assign_op: Option<StrKey>,
    split: SplitOutcome,
    reads: HashMap<AstId, (i32, bool)>,
    frames: Vec<ScopeFrame>,
    out: InitDeinitResult,
}

impl Analyzer<'_> {
    fn resolved(&self, node: NodeId) -> Option<&sable_calls::ResolvedExpression> {
        let id = self.ast.ast_id(node);
        if id.path != self.region {
            return None;
        }
        self.resolution.get(id.post)
    }

    fn frame(&mut self) -> &mut ScopeFrame {
        self.frames.last_mut().expect("no active frame")
    }

    /// Value types with cleanup obligations: records, strings, and owned
    /// or shared classes.
    fn needs_cleanup(&self, node: NodeId) -> bool {
        let Some(re) = self.resolved(node) else {
            return false;
        };
        match self.types.try_get(re.qt.ty) {
            Some(TypeData::Record(_)) | Some(TypeData::Str) => true,
            Some(TypeData::Class { decorator, .. }) => matches!(
                decorator.management,
                Management::Owned | Management::Shared
            ),
            _ => false,
        }
    }

    /// The variable a read expression consumes, when the read is the last
    /// one on its path and sits outside any loop.
    fn elidable_source(&self, node: NodeId) -> Option<AstId> {
        let id = self.ast.ast_id(node);
        if id.path != self.region {
            return None;
        }
        let decl = self.resolved(node)?.to_id?;
        // only locals of this region move
        if decl.path != self.region {
            return None;
        }
        let (last, in_loop) = self.reads.get(&decl).copied()?;
        (!in_loop && last == id.post).then_some(decl)
    }

    fn mark_inited(&mut self, decl: AstId, var_node: Option<NodeId>) {
        // find the frame that declared it; initialization of an outer
        // variable is recorded in the current frame as well
        let declared_here = self.frame().declared.contains(&decl);
        self.frame().inited.insert(decl);
        if !declared_here {
            self.frame().inited_outer.push(decl);
        }
        if let Some(node) = var_node {
            if self.needs_cleanup(node) {
                let frame = self.frame();
                frame.end_of_scope.push(Action::new(ActionKind::Deinit, decl));
            }
        }
    }

    fn walk(&mut self, node: NodeId) {
        match self.ast.node(node).clone() {
            n if n.is_symbol_decl() => {}
            Node::Block(block) => {
                self.frames.push(ScopeFrame::new(node));
                for &stmt in &block.stmts {
                    self.walk(stmt);
                }
                let frame = self.frames.pop().expect("block frame");
                self.exit_frame(frame);
            }
            Node::Variable(variable) => {
                let decl = self.ast.ast_id(node);
                self.frame().declared.insert(decl);
                self.frame().locals_and_defers.push(node);
                if let Some(init) = variable.init {
                    self.walk(init);
                    self.mark_inited(decl, Some(node));
                }
            }
            Node::Defer(stmt) => {
                self.frame().locals_and_defers.push(node);
                self.walk(stmt.body);
            }
            Node::OpCall(op)
                if op.operands.len() == 2 && Some(op.op) == self.assign_op =>
            {
                self.analyze_assignment(node, op.operands[0], op.operands[1]);
            }
            Node::Call(call) => {
                for &actual in &call.actuals {
                    self.walk(actual);
                }
                self.analyze_call_actuals(node, &call.actuals);
            }
            _ => {
                for child in self.ast.children(node) {
                    self.walk(child);
                }
            }
        }
    }

    fn analyze_assignment(&mut self, node: NodeId, lhs: NodeId, rhs: NodeId) {
        self.walk(rhs);
        self.walk(lhs);

        let node_id = self.ast.ast_id(node);
        let lhs_qt = self.resolved(lhs).map(|re| re.qt);
        let lhs_decl = self.resolved(lhs).and_then(|re| re.to_id);

        // a split-init assignment initializes rather than overwrites
        let is_split_init_point = self.split.init_points.get(&lhs_decl.unwrap_or(node_id))
            == Some(&node);
        if let Some(decl) = lhs_decl {
            if is_split_init_point {
                self.mark_inited(decl, Some(lhs));
            }
        }

        let lowering = match lhs_qt.map(|qt| qt.kind) {
            Some(QtKind::Type) | Some(QtKind::Param) => AssignLowering::Move,
            _ => {
                let elided = self.try_elide(rhs, is_split_init_point);
                let lhs_is_record = lhs_qt
                    .and_then(|qt| self.types.try_get(qt.ty))
                    .map(|data| matches!(data, TypeData::Record(_)))
                    .unwrap_or(false);
                if is_split_init_point && elided {
                    AssignLowering::MoveInit
                } else if lhs_is_record {
                    AssignLowering::InitEqCall
                } else {
                    AssignLowering::AssignCall
                }
            }
        };
        self.out.lowering.insert(node_id, lowering);
    }

    /// Reclassifies the copy out of `rhs` as a move when the source is
    /// provably dead afterwards. Elided copies schedule no CopyInit and
    /// the source loses its Deinit.
    fn try_elide(&mut self, rhs: NodeId, into_init: bool) -> bool {
        if !into_init {
            return false;
        }
        let Some(source) = self.elidable_source(rhs) else {
            return false;
        };
        self.out.elided_copies.insert(self.ast.ast_id(rhs));
        self.out.moved_from.insert(source);
        for frame in self.frames.iter_mut().rev() {
            frame
                .end_of_scope
                .retain(|action| !(action.kind == ActionKind::Deinit && action.id == source));
        }
        true
    }

    /// Schedules copy-init and write-back actions around a resolved call's
    /// actuals, eliding the final read of a source into an `in` formal.
    fn analyze_call_actuals(&mut self, node: NodeId, actuals: &[NodeId]) {
        let Some(target) = self.resolved(node).and_then(|re| re.most_specific.clone()) else {
            return;
        };
        let sig = self.sigs.get(target.sig).clone();

        // positional pairing; the receiver occupies formal 0 of methods
        let offset = usize::from(sig.is_method);
        for (index, &actual) in actuals.iter().enumerate() {
            let Some(formal) = sig.formals.get(index + offset) else {
                break;
            };
            let actual_id = self.ast.ast_id(actual);
            match formal.intent {
                Intent::In | Intent::ConstIn | Intent::Blank => {
                    if !self.needs_cleanup(actual) {
                        continue;
                    }
                    if formal.intent == Intent::In {
                        if let Some(source) = self.elidable_source(actual) {
                            self.out.elided_copies.insert(actual_id);
                            self.out.moved_from.insert(source);
                            for frame in self.frames.iter_mut().rev() {
                                frame.end_of_scope.retain(|action| {
                                    !(action.kind == ActionKind::Deinit && action.id == source)
                                });
                            }
                            continue;
                        }
                    }
                    self.frame()
                        .end_of_scope
                        .push(Action::new(ActionKind::CopyInit, actual_id));
                }
                Intent::Out | Intent::Inout => {
                    self.frame()
                        .end_of_scope
                        .push(Action::new(ActionKind::WriteBack, actual_id));
                }
                _ => {}
            }
        }
    }

    fn exit_frame(&mut self, mut frame: ScopeFrame) {
        // drop deinits for variables moved from after scheduling
        let moved = self.out.moved_from.clone();
        frame
            .end_of_scope
            .retain(|action| !(action.kind == ActionKind::Deinit && moved.contains(&action.id)));
        frame
            .end_of_scope
            .retain(|action| !frame.deinited.contains(&action.id));

        let drained = frame.drain();
        self.out
            .actions_at
            .insert(self.ast.ast_id(frame.scope_node), drained);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_calls::ResolvedExpression;
    use sable_span::{Loc, SourceId, Span};
    use sable_tree::node::*;
    use sable_tree::AstBuilder;
    use sable_types::{CompositeType, Genericity, QualifiedType};

    fn loc() -> Loc {
        Loc::new(SourceId::new(0), Span::new(0, 0))
    }

    struct Fixture {
        ast: Ast,
        resolution: ResolutionResult,
        types: TypeInterner,
        strings: StrInterner,
        region: StrKey,
        roots: Vec<NodeId>,
        root: NodeId,
    }

    /// module M { var a: R = <lit>; var b: R; b = a; }
    fn move_fixture() -> Fixture {
        let mut strings = StrInterner::new();
        let mut types = TypeInterner::new();
        let mut builder = AstBuilder::new();

        let r_name = strings.intern("R");
        let record_ty = types.intern(TypeData::Record(CompositeType::root(
            AstId::symbol_root(strings.intern("M.R")),
            r_name,
            Genericity::Concrete,
        )));

        let a_init = builder.push(Literal::Int(0), loc());
        let a = builder.push(
            VariableDecl {
                name: strings.intern("a"),
                storage: StorageClass::Var,
                type_expr: None,
                init: Some(a_init),
            },
            loc(),
        );
        let r_ident = builder.push(
            Identifier { name: r_name },
            loc(),
        );
        let b = builder.push(
            VariableDecl {
                name: strings.intern("b"),
                storage: StorageClass::Var,
                type_expr: Some(r_ident),
                init: None,
            },
            loc(),
        );
        let lhs = builder.push(
            Identifier {
                name: strings.intern("b"),
            },
            loc(),
        );
        let rhs = builder.push(
            Identifier {
                name: strings.intern("a"),
            },
            loc(),
        );
        let assign = builder.push(
            OpCallExpr {
                op: strings.intern("="),
                operands: vec![lhs, rhs],
            },
            loc(),
        );
        let module = builder.push(
            ModuleDecl {
                name: strings.intern("M"),
                body: vec![a, b, assign],
            },
            loc(),
        );
        let ast = builder.finish(module, &mut strings);

        let qt = QualifiedType::var(record_ty);
        let mut resolution = ResolutionResult::new();
        for (node, decl) in [(lhs, b), (rhs, a)] {
            resolution.set(
                ast.ast_id(node).post,
                ResolvedExpression {
                    qt,
                    to_id: Some(ast.ast_id(decl)),
                    most_specific: None,
                },
            );
        }
        for decl in [a, b] {
            resolution.set(
                ast.ast_id(decl).post,
                ResolvedExpression {
                    qt,
                    to_id: Some(ast.ast_id(decl)),
                    most_specific: None,
                },
            );
        }
        resolution.set(ast.ast_id(a_init).post, ResolvedExpression::of_type(qt));

        let region = ast.ast_id(module).path;
        Fixture {
            roots: vec![a, b, assign],
            root: module,
            ast,
            resolution,
            types,
            strings,
            region,
        }
    }

    #[test]
    fn split_init_with_elision_becomes_a_move() {
        let fixture = move_fixture();
        let sigs = SignatureStore::new();
        let mut report = Report::new();

        let result = analyze_region(
            &fixture.ast,
            fixture.region,
            fixture.root,
            &fixture.roots,
            &fixture.resolution,
            &sigs,
            &fixture.types,
            &fixture.strings,
            &mut report,
        );

        assert!(report.is_empty());
        assert_eq!(result.split_inited.len(), 1);
        assert_eq!(result.moved_from.len(), 1);
        assert_eq!(
            result.lowering.values().copied().collect::<Vec<_>>(),
            vec![AssignLowering::MoveInit]
        );

        // the moved-from source keeps no deinit; only the target cleans up
        let actions = result
            .actions_at
            .get(&fixture.ast.ast_id(fixture.root))
            .expect("outer frame drained");
        assert_eq!(actions.iter().filter(|a| a.kind == ActionKind::Deinit).count(), 1);
    }

    #[test]
    fn actions_drain_in_reverse_declaration_order() {
        let mut strings = StrInterner::new();
        let mut types = TypeInterner::new();
        let mut builder = AstBuilder::new();

        let record_ty = types.intern(TypeData::Record(CompositeType::root(
            AstId::symbol_root(strings.intern("M.R")),
            strings.intern("R"),
            Genericity::Concrete,
        )));

        let x_init = builder.push(Literal::Int(0), loc());
        let x = builder.push(
            VariableDecl {
                name: strings.intern("x"),
                storage: StorageClass::Var,
                type_expr: None,
                init: Some(x_init),
            },
            loc(),
        );
        let y_init = builder.push(Literal::Int(0), loc());
        let y = builder.push(
            VariableDecl {
                name: strings.intern("y"),
                storage: StorageClass::Var,
                type_expr: None,
                init: Some(y_init),
            },
            loc(),
        );
        let module = builder.push(
            ModuleDecl {
                name: strings.intern("M"),
                body: vec![x, y],
            },
            loc(),
        );
        let ast = builder.finish(module, &mut strings);

        let qt = QualifiedType::var(record_ty);
        let mut resolution = ResolutionResult::new();
        for decl in [x, y] {
            resolution.set(
                ast.ast_id(decl).post,
                ResolvedExpression {
                    qt,
                    to_id: Some(ast.ast_id(decl)),
                    most_specific: None,
                },
            );
        }

        let sigs = SignatureStore::new();
        let mut report = Report::new();
        let result = analyze_region(
            &ast,
            ast.ast_id(module).path,
            module,
            &[x, y],
            &resolution,
            &sigs,
            &types,
            &strings,
            &mut report,
        );

        let actions = result.actions_at.get(&ast.ast_id(module)).unwrap();
        assert_eq!(
            actions
                .iter()
                .map(|action| action.id)
                .collect::<Vec<_>>(),
            vec![ast.ast_id(y), ast.ast_id(x)],
            "later declarations deinit first"
        );
    }
}
