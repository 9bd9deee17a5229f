use std::rc::Rc;

use sable_span::{ErrorKind, Loc, SourceId, Span};
use sable_tree::node::*;
use sable_tree::{Ast, AstBuilder, NodeId};
use sable_types::{ConversionKind, QtKind, TypeData};
use sable_utils::interner::StrInterner;

use crate::{ClosureParser, Context};

fn loc() -> Loc {
    Loc::new(SourceId::new(0), Span::new(0, 0))
}

/// A context whose parser builds the module trees programmatically, the
/// way the typer tests mock their sources.
fn context_with(build: impl Fn(&mut StrInterner) -> Vec<Ast> + 'static) -> Context {
    let parser = ClosureParser::new(move |_path, _text, strings, _report| build(strings));
    let mut context = Context::new(parser);
    context.set_file_text("main.sb", "<programmatic>");
    context
}

fn ident(b: &mut AstBuilder, strings: &mut StrInterner, name: &str) -> NodeId {
    b.push(
        Identifier {
            name: strings.intern(name),
        },
        loc(),
    )
}

fn var(
    b: &mut AstBuilder,
    strings: &mut StrInterner,
    name: &str,
    type_expr: Option<NodeId>,
    init: Option<NodeId>,
) -> NodeId {
    b.push(
        VariableDecl {
            name: strings.intern(name),
            storage: StorageClass::Var,
            type_expr,
            init,
        },
        loc(),
    )
}

fn formal(
    b: &mut AstBuilder,
    strings: &mut StrInterner,
    name: &str,
    intent: Intent,
    type_expr: Option<NodeId>,
) -> NodeId {
    b.push(
        FormalDecl {
            name: strings.intern(name),
            intent,
            type_expr,
            default: None,
        },
        loc(),
    )
}

fn proc(
    b: &mut AstBuilder,
    strings: &mut StrInterner,
    name: &str,
    formals: Vec<NodeId>,
    body_stmts: Vec<NodeId>,
    parenless: bool,
) -> NodeId {
    let body = b.push(Block { stmts: body_stmts }, loc());
    b.push(
        FunctionDecl {
            name: strings.intern(name),
            method_kind: MethodKind::None,
            receiver: None,
            formals,
            return_type: None,
            where_clause: None,
            body: Some(body),
            parenless,
        },
        loc(),
    )
}

fn module(
    b: AstBuilder,
    strings: &mut StrInterner,
    name: &str,
    body: Vec<NodeId>,
) -> Ast {
    let mut b = b;
    let root = b.push(
        ModuleDecl {
            name: strings.intern(name),
            body,
        },
        loc(),
    );
    b.finish(root, strings)
}

#[test]
fn var_decl_and_use_share_a_type() {
    let mut context = context_with(|strings| {
        let mut b = AstBuilder::new();
        let int = ident(&mut b, strings, "int");
        let decl = var(&mut b, strings, "x", Some(int), None);
        let mention = ident(&mut b, strings, "x");
        vec![module(b, strings, "M", vec![decl, mention])]
    });

    let artifacts = context.compile().unwrap();
    assert!(!context.has_errors(), "{:?}", context.report());

    let program = context.program().unwrap();
    let ast = &program.asts[0];
    let resolution = &artifacts[0].init_resolution;

    let decl_node = ast
        .iter()
        .find(|(_, node)| matches!(node, Node::Variable(_)))
        .map(|(id, _)| id)
        .unwrap();
    let use_node = ast
        .iter()
        .filter(|(_, node)| node.as_identifier().is_some())
        .map(|(id, _)| id)
        .last()
        .unwrap();

    let decl_re = resolution.get(ast.ast_id(decl_node).post).unwrap();
    let use_re = resolution.get(ast.ast_id(use_node).post).unwrap();

    assert_eq!(context.types().try_get(decl_re.qt.ty), Some(&TypeData::Int(64)));
    assert_eq!(context.types().try_get(use_re.qt.ty), Some(&TypeData::Int(64)));
    assert_eq!(use_re.to_id, Some(ast.ast_id(decl_node)));
}

#[test]
fn calls_bind_const_in_formals() {
    let mut context = context_with(|strings| {
        let mut b = AstBuilder::new();

        let int = ident(&mut b, strings, "int");
        let arg = formal(&mut b, strings, "arg", Intent::Blank, Some(int));
        let arg_use = ident(&mut b, strings, "arg");
        let ret = b.push(ReturnStmt { value: Some(arg_use) }, loc());
        let foo = proc(&mut b, strings, "foo", vec![arg], vec![ret], false);

        let callee = ident(&mut b, strings, "foo");
        let one = b.push(Literal::Int(1), loc());
        let call = b.push(CallExpr::positional(callee, vec![one]), loc());
        let y = var(&mut b, strings, "y", None, Some(call));

        vec![module(b, strings, "M", vec![foo, y])]
    });

    let artifacts = context.compile().unwrap();
    assert!(!context.has_errors(), "{:?}", context.report());

    let program = context.program().unwrap();
    let ast = &program.asts[0];
    let artifact = &artifacts[0];

    let y_node = ast
        .iter()
        .filter(|(_, node)| matches!(node, Node::Variable(_)))
        .map(|(id, _)| id)
        .last()
        .unwrap();
    let y_re = artifact
        .init_resolution
        .get(ast.ast_id(y_node).post)
        .unwrap();
    assert_eq!(context.types().try_get(y_re.qt.ty), Some(&TypeData::Int(64)));

    let call_node = ast
        .iter()
        .find(|(_, node)| matches!(node, Node::Call(_)))
        .map(|(id, _)| id)
        .unwrap();
    let call_re = artifact
        .init_resolution
        .get(ast.ast_id(call_node).post)
        .unwrap();
    let target = call_re.most_specific.as_ref().expect("call resolved");
    let sig = artifact.signature(target.sig).expect("signature listed");

    assert_eq!(&context.strings()[sig.name], "foo");
    assert_eq!(sig.formals.len(), 1);
    assert_eq!(sig.formals[0].qt.kind, QtKind::ConstIn);
    assert_eq!(
        context.types().try_get(sig.formals[0].qt.ty),
        Some(&TypeData::Int(64))
    );
}

#[test]
fn parenless_functions_resolve_as_calls() {
    let mut context = context_with(|strings| {
        let mut b = AstBuilder::new();
        let one = b.push(Literal::Int(1), loc());
        let ret = b.push(ReturnStmt { value: Some(one) }, loc());
        let parenless = proc(&mut b, strings, "parenless", vec![], vec![ret], true);
        let mention = ident(&mut b, strings, "parenless");
        vec![module(b, strings, "M", vec![parenless, mention])]
    });

    let artifacts = context.compile().unwrap();
    assert!(!context.has_errors(), "{:?}", context.report());

    let program = context.program().unwrap();
    let ast = &program.asts[0];
    let artifact = &artifacts[0];

    let mention_node = ast
        .iter()
        .filter(|(_, node)| node.as_identifier().is_some())
        .map(|(id, _)| id)
        .last()
        .unwrap();
    let re = artifact
        .init_resolution
        .get(ast.ast_id(mention_node).post)
        .unwrap();

    assert_eq!(context.types().try_get(re.qt.ty), Some(&TypeData::Int(64)));
    let target = re.most_specific.as_ref().expect("parenless call resolved");
    let sig = artifact.signature(target.sig).unwrap();
    assert!(sig.parenless);
    assert_eq!(sig.formals.len(), 0);
}

fn class_decl(
    b: &mut AstBuilder,
    strings: &mut StrInterner,
    name: &str,
    parent: Option<NodeId>,
) -> NodeId {
    b.push(
        Node::Class(AggregateDecl {
            name: strings.intern(name),
            parent_class: parent,
            body: vec![],
        }),
        loc(),
    )
}

fn owned_child_var(b: &mut AstBuilder, strings: &mut StrInterner, name: &str) -> NodeId {
    let child = ident(b, strings, "Child");
    let owned = b.push(
        OpCallExpr {
            op: strings.intern("owned"),
            operands: vec![child],
        },
        loc(),
    );
    let new_target = ident(b, strings, "Child");
    let new = b.push(
        NewExpr {
            type_expr: new_target,
            management: None,
        },
        loc(),
    );
    let init = b.push(CallExpr::positional(new, vec![]), loc());
    var(b, strings, name, Some(owned), Some(init))
}

#[test]
fn subclass_actuals_coerce_to_parent_formals() {
    let mut context = context_with(|strings| {
        let mut b = AstBuilder::new();

        let parent = class_decl(&mut b, strings, "Parent", None);
        let parent_ref = ident(&mut b, strings, "Parent");
        let child = class_decl(&mut b, strings, "Child", Some(parent_ref));

        let parent_ty = ident(&mut b, strings, "Parent");
        let arg = formal(&mut b, strings, "arg", Intent::In, Some(parent_ty));
        let f = proc(&mut b, strings, "f", vec![arg], vec![], false);

        let x = owned_child_var(&mut b, strings, "x");

        let callee = ident(&mut b, strings, "f");
        let x_use = ident(&mut b, strings, "x");
        let call = b.push(CallExpr::positional(callee, vec![x_use]), loc());

        vec![module(b, strings, "M", vec![parent, child, f, x, call])]
    });

    let artifacts = context.compile().unwrap();
    assert!(!context.has_errors(), "{:?}", context.report());

    let program = context.program().unwrap();
    let ast = &program.asts[0];
    let artifact = &artifacts[0];

    let call_node = ast
        .iter()
        .filter(|(_, node)| matches!(node, Node::Call(_)))
        .map(|(id, _)| id)
        .last()
        .unwrap();
    let re = artifact
        .init_resolution
        .get(ast.ast_id(call_node).post)
        .unwrap();

    let target = re.most_specific.as_ref().expect("call resolved");
    let sig = artifact.signature(target.sig).unwrap();
    assert_eq!(&context.strings()[sig.name], "f");
    assert_eq!(target.conversions, vec![ConversionKind::Subtype]);
    assert_eq!(context.types().try_get(re.qt.ty), Some(&TypeData::Void));
}

#[test]
fn const_ref_rejection_points_at_the_chosen_overload() {
    let mut context = context_with(|strings| {
        let mut b = AstBuilder::new();

        let parent = class_decl(&mut b, strings, "Parent", None);
        let parent_ref = ident(&mut b, strings, "Parent");
        let child = class_decl(&mut b, strings, "Child", Some(parent_ref));

        // proc f(const ref arg: Parent, x: int(8)) { }
        let parent_ty = ident(&mut b, strings, "Parent");
        let arg1 = formal(&mut b, strings, "arg", Intent::ConstRef, Some(parent_ty));
        let int_family = ident(&mut b, strings, "int");
        let eight = b.push(Literal::Int(8), loc());
        let int8 = b.push(CallExpr::positional(int_family, vec![eight]), loc());
        let x1 = formal(&mut b, strings, "x", Intent::Blank, Some(int8));
        let f1 = proc(&mut b, strings, "f", vec![arg1, x1], vec![], false);

        // proc f(const ref arg: Parent, x: numeric) { }
        let parent_ty2 = ident(&mut b, strings, "Parent");
        let arg2 = formal(&mut b, strings, "arg", Intent::ConstRef, Some(parent_ty2));
        let numeric = ident(&mut b, strings, "numeric");
        let x2 = formal(&mut b, strings, "x", Intent::Blank, Some(numeric));
        let f2 = proc(&mut b, strings, "f", vec![arg2, x2], vec![], false);

        let c = owned_child_var(&mut b, strings, "c");
        let int_ty = ident(&mut b, strings, "int");
        let one = b.push(Literal::Int(1), loc());
        let n = var(&mut b, strings, "n", Some(int_ty), Some(one));

        let callee = ident(&mut b, strings, "f");
        let c_use = ident(&mut b, strings, "c");
        let n_use = ident(&mut b, strings, "n");
        let call = b.push(CallExpr::positional(callee, vec![c_use, n_use]), loc());

        vec![module(
            b,
            strings,
            "M",
            vec![parent, child, f1, f2, c, n, call],
        )]
    });

    let artifacts = context.compile().unwrap();

    // exactly one diagnostic: the chosen (numeric) overload rejects the
    // owned-Child-to-const-ref-Parent coercion
    let errors: Vec<_> = context
        .report()
        .diagnostics()
        .iter()
        .filter(|diag| diag.is_error())
        .collect();
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert_eq!(errors[0].kind, ErrorKind::ConstRefCoercion);

    let program = context.program().unwrap();
    let ast = &program.asts[0];
    let call_node = ast
        .iter()
        .filter(|(_, node)| matches!(node, Node::Call(_)))
        .map(|(id, _)| id)
        .last()
        .unwrap();
    let re = artifacts[0]
        .init_resolution
        .get(ast.ast_id(call_node).post)
        .unwrap();
    assert_eq!(
        context.types().try_get(re.qt.ty),
        Some(&TypeData::Erroneous),
        "the call's type poisons downstream"
    );

    // the numeric overload was the one selected
    let target = re.most_specific.as_ref().unwrap();
    let sig = artifacts[0].signature(target.sig).unwrap();
    assert!(sig.instantiation.is_some(), "numeric overload instantiated");
}

#[test]
fn records_get_a_generated_initializer() {
    let mut context = context_with(|strings| {
        let mut b = AstBuilder::new();

        let int = ident(&mut b, strings, "int");
        let a = var(&mut b, strings, "a", Some(int), None);
        let string_ty = ident(&mut b, strings, "string");
        let field_b = var(&mut b, strings, "b", Some(string_ty), None);
        let record = b.push(
            Node::Record(AggregateDecl {
                name: strings.intern("R"),
                parent_class: None,
                body: vec![a, field_b],
            }),
            loc(),
        );

        let r_ty = ident(&mut b, strings, "R");
        let new = b.push(
            NewExpr {
                type_expr: r_ty,
                management: None,
            },
            loc(),
        );
        let one = b.push(Literal::Int(1), loc());
        let hi = b.push(Literal::Str(strings.intern("hi")), loc());
        let call = b.push(CallExpr::positional(new, vec![one, hi]), loc());
        let r = var(&mut b, strings, "r", None, Some(call));

        vec![module(b, strings, "M", vec![record, r])]
    });

    let artifacts = context.compile().unwrap();
    assert!(!context.has_errors(), "{:?}", context.report());

    let artifact = &artifacts[0];
    let (_, init) = artifact
        .generated
        .iter()
        .find(|(_, sig)| sig.kind == sable_calls::SignatureKind::GeneratedInit)
        .expect("init was generated");

    assert!(init.is_compiler_generated());
    assert_eq!(init.formals.len(), 3);

    assert_eq!(&context.strings()[init.formals[0].name], "this");
    assert_eq!(init.formals[0].qt.kind, QtKind::Ref);
    assert!(matches!(
        context.types().try_get(init.formals[0].qt.ty),
        Some(TypeData::Record(_))
    ));

    assert_eq!(&context.strings()[init.formals[1].name], "a");
    assert_eq!(init.formals[1].intent, Intent::In);
    assert_eq!(
        context.types().try_get(init.formals[1].qt.ty),
        Some(&TypeData::Int(64))
    );

    assert_eq!(&context.strings()[init.formals[2].name], "b");
    assert_eq!(init.formals[2].intent, Intent::In);
    assert_eq!(
        context.types().try_get(init.formals[2].qt.ty),
        Some(&TypeData::Str)
    );

    // the new-expression took the generated init
    let program = context.program().unwrap();
    let ast = &program.asts[0];
    let call_node = ast
        .iter()
        .find(|(_, node)| matches!(node, Node::Call(_)))
        .map(|(id, _)| id)
        .unwrap();
    let re = artifact
        .init_resolution
        .get(ast.ast_id(call_node).post)
        .unwrap();
    assert!(matches!(
        context.types().try_get(re.qt.ty),
        Some(TypeData::Record(_))
    ));
}

fn simple_module(strings: &mut StrInterner) -> Vec<Ast> {
    let mut b = AstBuilder::new();
    let int = ident(&mut b, strings, "int");
    let decl = var(&mut b, strings, "x", Some(int), None);
    let mention = ident(&mut b, strings, "x");
    vec![module(b, strings, "M", vec![decl, mention])]
}

#[test]
fn resolution_is_idempotent_across_quiet_revisions() {
    let mut context = context_with(simple_module);

    let first = context.compile().unwrap();
    context.advance_to_next_revision(false);
    let second = context.compile().unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert!(
            Rc::ptr_eq(a, b) || a == b,
            "resolution differs across a quiet revision"
        );
    }
}

#[test]
fn quiet_revisions_rerun_nothing() {
    let mut context = context_with(simple_module);

    context.compile().unwrap();
    context.advance_to_next_revision(false);

    let runs = context.executions();
    context.compile().unwrap();
    assert_eq!(
        context.executions(),
        runs,
        "a quiet revision advance must reuse every entry"
    );
}

#[test]
fn edits_invalidate_and_recompute() {
    let mut context = context_with(simple_module);

    context.compile().unwrap();
    let runs = context.executions();

    context.advance_to_next_revision(false);
    context.set_file_text("main.sb", "<edited>");
    context.compile().unwrap();

    assert!(
        context.executions() > runs,
        "an edited file must re-run the queries that read it"
    );
}

#[test]
fn cancellation_is_cooperative() {
    let mut context = context_with(simple_module);

    context.set_cancelled(true);
    let error = context.compile().unwrap_err();
    assert_eq!(error, sable_query::QueryError::Cancelled);

    context.set_cancelled(false);
    assert!(context.compile().is_ok());
}

#[test]
fn capture_frames_redirect_diagnostics() {
    let mut context = context_with(|strings| {
        let mut b = AstBuilder::new();
        let ghost = ident(&mut b, strings, "ghost");
        vec![module(b, strings, "M", vec![ghost])]
    });

    context.push_capture_frame();
    context.compile().unwrap();
    let captured = context.pop_capture_frame();

    assert!(captured
        .iter()
        .any(|diag| diag.kind == ErrorKind::UndeclaredIdentifier));
    assert!(
        context.report().diagnostics().is_empty(),
        "captured diagnostics bypass the base report"
    );
}

#[test]
fn installed_error_handlers_receive_reports() {
    use std::cell::RefCell;

    let mut context = context_with(|strings| {
        let mut b = AstBuilder::new();
        let ghost = ident(&mut b, strings, "ghost");
        vec![module(b, strings, "M", vec![ghost])]
    });

    let seen: Rc<RefCell<Vec<ErrorKind>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    context.set_error_handler(move |diagnostic| {
        sink.borrow_mut().push(diagnostic.kind);
    });

    context.compile().unwrap();
    assert_eq!(seen.borrow().as_slice(), &[ErrorKind::UndeclaredIdentifier]);
}

#[test]
fn garbage_collection_keeps_live_names() {
    let mut context = context_with(simple_module);
    context.compile().unwrap();

    // a name nothing references any more
    context.strings_mut().intern("short-lived scratch");

    context.advance_to_next_revision(true);
    context.collect_garbage();

    assert!(context.strings().lookup("x").is_some());
    assert!(context.strings().lookup("short-lived scratch").is_none());
    assert!(!context.types().is_empty());
}
