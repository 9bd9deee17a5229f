use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use sable_resolver::{LookupConfig, NameBindings, NameTarget, Program, TypeCategory};
use sable_span::{Loc, Report, SourceId, Span};
use sable_tree::node::{
    CallExpr, DotExpr, Intent, Literal, Management, Node, StorageClass, VariableDecl,
};
use sable_tree::{Ast, AstId, NodeId};
use sable_types::{
    can_pass, const_ref_violation, match_types, CanPass, CompositeType, ConversionKind, Decorator,
    FormalDetail, Genericity, Nilability, ParamValue, QtKind, QualifiedType, Substitution,
    TypeData, TypeId, TypeInterner, TypeVarType, WhereResult,
};
use sable_utils::interner::{StrInterner, StrKey};

use crate::candidate::{map_actuals, most_specific, Binding, CallShape, Candidate, Disambiguation};
use crate::error::CallError;
use crate::generated::{generated_signature, need_compiler_generated_method};
use crate::instantiate::{instantiate_signature, InstantiatedFn};
use crate::shape::synthesize_wrappers;
use crate::sig::{
    CallTarget, ResolutionResult, ResolvedExpression, SigId, SignatureKind, TypedSignature,
};
use crate::SignatureStore;

/// Cross-region resolution state for one revision: interned signatures,
/// memoized declaration types, instantiations and per-module bindings.
#[derive(Debug, Default)]
pub struct CallTables {
    pub sigs: SignatureStore,
    pub decl_types: HashMap<AstId, QualifiedType>,
    pub aggregate_types: HashMap<AstId, TypeId>,
    pub signatures: HashMap<AstId, SigId>,
    pub instantiations: HashMap<(AstId, Substitution), SigId>,
    pub in_progress: HashSet<(AstId, Substitution)>,
    pub instantiation_serial: u32,
    /// instantiated functions awaiting body resolution (driver fixed point)
    pub pending: Vec<InstantiatedFn>,
    pub fn_results: HashMap<AstId, Rc<ResolutionResult>>,
    pub bindings: HashMap<AstId, Rc<NameBindings>>,
    resolving: HashSet<AstId>,
}

impl CallTables {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The mutable context threaded through every resolution step. There is no
/// global state: hosts own one of these per revision.
pub struct Ctx<'c> {
    pub program: &'c Program,
    pub strings: &'c mut StrInterner,
    pub types: &'c mut TypeInterner,
    pub tables: &'c mut CallTables,
    pub report: &'c mut Report,
}

impl<'c> Ctx<'c> {
    pub fn fallback_loc(&self) -> Loc {
        Loc::new(SourceId::new(0), Span::new(0, 0))
    }

    pub fn erroneous(&mut self) -> QualifiedType {
        QualifiedType::var(self.types.erroneous())
    }

    fn bindings_for(&self, id: AstId) -> Option<Rc<NameBindings>> {
        let module = self.program.module_of(self.strings, id)?;
        let module_id = self.program.modules[module].module;
        self.tables.bindings.get(&module_id).cloned()
    }

    /// Root type of an aggregate declaration, memoized.
    pub fn type_for_aggregate(&mut self, decl: AstId) -> TypeId {
        if let Some(&ty) = self.tables.aggregate_types.get(&decl) {
            return ty;
        }
        if !self.tables.resolving.insert(decl) {
            // class inheriting from itself, or mutually recursive parents
            return self.types.erroneous();
        }

        let ty = self.compute_aggregate_type(decl);
        self.tables.resolving.remove(&decl);
        self.tables.aggregate_types.insert(decl, ty);
        ty
    }

    fn compute_aggregate_type(&mut self, decl: AstId) -> TypeId {
        let Some((ast, node)) = self.program.ast_for(self.strings, decl) else {
            return self.types.erroneous();
        };
        let ast = ast.clone();
        let Some(aggregate) = ast.node(node).as_aggregate().cloned() else {
            return self.types.erroneous();
        };

        // a composite is generic when it carries type/param fields or a
        // field with neither type nor initializer
        let mut genericity = Genericity::Concrete;
        let mut all_defaulted = true;
        for &child in &aggregate.body {
            if let Node::Variable(field) = ast.node(child) {
                let generic_field = matches!(field.storage, StorageClass::Type | StorageClass::Param)
                    || (field.type_expr.is_none() && field.init.is_none());
                if generic_field {
                    genericity = Genericity::Generic;
                    all_defaulted &= field.init.is_some();
                }
            }
        }
        if genericity == Genericity::Generic && all_defaulted {
            genericity = Genericity::GenericWithDefaults;
        }

        let parent_class = aggregate.parent_class.and_then(|parent_node| {
            let target = self.binding_of(&ast, parent_node)?;
            match target {
                NameTarget::Decl(parent_decl) => Some(self.type_for_aggregate(parent_decl)),
                _ => None,
            }
        });

        let composite = CompositeType {
            decl,
            name: aggregate.name,
            parent_class,
            instantiated_from: None,
            substitution: Substitution::new(),
            genericity,
        };

        let data = match ast.node(node) {
            Node::Record(_) => TypeData::Record(composite),
            Node::Union(_) => TypeData::Union(composite),
            _ => TypeData::BasicClass(composite),
        };
        self.types.intern(data)
    }

    fn binding_of(&self, ast: &Ast, node: NodeId) -> Option<NameTarget> {
        self.bindings_for(ast.ast_id(node))
            .and_then(|bindings| bindings.get(node).cloned())
    }

    /// The qualified type a builtin family denotes in type position.
    fn builtin_type(&mut self, builtin: sable_resolver::BuiltinType) -> TypeId {
        use sable_resolver::BuiltinType as B;
        match builtin {
            B::Int => self.types.int_default(),
            B::Uint => self.types.uint(64),
            B::Real => self.types.real(64),
            B::Imag => self.types.intern(TypeData::Imag(64)),
            B::Complex => self.types.intern(TypeData::Complex(128)),
            B::Bool => self.types.bool_(),
            B::Str => self.types.str_(),
            B::Numeric => self.types.any_numeric(),
            B::Void => self.types.void(),
            B::Nothing => self.types.nothing(),
        }
    }

    /// Evaluates a type expression to a type. Identifiers name builtins,
    /// aggregates, enums or `type` fields; `int(8)`-style calls pick a
    /// width; management operators decorate class types.
    pub fn eval_type_expr(&mut self, ast: &Ast, node: NodeId) -> QualifiedType {
        let ty = self.eval_type_expr_inner(ast, node);
        QualifiedType::type_of(ty)
    }

    fn eval_type_expr_inner(&mut self, ast: &Ast, node: NodeId) -> TypeId {
        match ast.node(node) {
            Node::Identifier(_) => match self.binding_of(ast, node) {
                Some(NameTarget::Decl(decl)) => self.type_of_type_decl(decl, ast, node),
                Some(NameTarget::Candidates(_)) | None => {
                    self.report.add(
                        CallError::InvalidPrimitive {
                            loc: ast.locate(node),
                        }
                        .into(),
                    );
                    self.types.erroneous()
                }
                Some(NameTarget::Erroneous) => self.types.erroneous(),
            },
            Node::Call(call) => {
                let call = call.clone();
                self.eval_type_call(ast, node, &call)
            }
            Node::OpCall(op) => {
                let op = op.clone();
                let op_text = self.strings[op.op].to_owned();
                match (op_text.as_str(), op.operands.as_slice()) {
                    ("owned", [inner]) | ("shared", [inner]) | ("borrowed", [inner])
                    | ("unmanaged", [inner]) => {
                        let management = match op_text.as_str() {
                            "owned" => Management::Owned,
                            "shared" => Management::Shared,
                            "borrowed" => Management::Borrowed,
                            _ => Management::Unmanaged,
                        };
                        let basic = self.eval_type_expr_inner(ast, *inner);
                        self.decorate_class(ast, node, basic, management, Nilability::NonNilable)
                    }
                    ("?", [inner]) => {
                        let inner_ty = self.eval_type_expr_inner(ast, *inner);
                        match *self.types.get(inner_ty) {
                            TypeData::Class { basic, decorator } => {
                                self.types.intern(TypeData::Class {
                                    basic,
                                    decorator: Decorator::new(
                                        decorator.management,
                                        Nilability::Nilable,
                                    ),
                                })
                            }
                            TypeData::BasicClass(_) => self.decorate_class(
                                ast,
                                node,
                                inner_ty,
                                Management::Borrowed,
                                Nilability::Nilable,
                            ),
                            _ => {
                                self.report.add(
                                    CallError::InvalidPrimitive {
                                        loc: ast.locate(node),
                                    }
                                    .into(),
                                );
                                self.types.erroneous()
                            }
                        }
                    }
                    _ => {
                        self.report.add(
                            CallError::InvalidPrimitive {
                                loc: ast.locate(node),
                            }
                            .into(),
                        );
                        self.types.erroneous()
                    }
                }
            }
            Node::Dot(dot) => {
                let dot = *dot;
                match self.binding_of(ast, dot.receiver) {
                    Some(NameTarget::Decl(module_decl))
                        if self
                            .program
                            .symbols
                            .get(module_decl)
                            .map(|s| matches!(s.kind, sable_resolver::SymbolKind::Module))
                            .unwrap_or(false) =>
                    {
                        let Some(scope) = self.program.scopes.scope_for(module_decl) else {
                            return self.types.erroneous();
                        };
                        let found = self.program.scopes.lookup(
                            scope,
                            dot.field,
                            LookupConfig::DECLS,
                            &self.program.symbols,
                        );
                        match found.first() {
                            Some(&decl) => self.type_of_type_decl(decl, ast, node),
                            None => self.types.erroneous(),
                        }
                    }
                    _ => self.types.erroneous(),
                }
            }
            Node::TupleExpr(tuple) => {
                let elems = tuple
                    .elements
                    .clone()
                    .iter()
                    .map(|&elem| {
                        let ty = self.eval_type_expr_inner(ast, elem);
                        QualifiedType::var(ty)
                    })
                    .collect();
                self.types
                    .intern(TypeData::Tuple(sable_types::TupleType { elems }))
            }
            _ => {
                self.report.add(
                    CallError::InvalidPrimitive {
                        loc: ast.locate(node),
                    }
                    .into(),
                );
                self.types.erroneous()
            }
        }
    }

    fn decorate_class(
        &mut self,
        ast: &Ast,
        node: NodeId,
        basic: TypeId,
        management: Management,
        nilability: Nilability,
    ) -> TypeId {
        match self.types.get(basic) {
            TypeData::BasicClass(_) => self.types.intern(TypeData::Class {
                basic,
                decorator: Decorator::new(management, nilability),
            }),
            TypeData::Erroneous => basic,
            _ => {
                self.report.add(
                    CallError::TypeMismatch {
                        expected: "a class type".to_owned(),
                        found: self.types.display(basic, self.strings),
                        loc: ast.locate(node),
                    }
                    .into(),
                );
                self.types.erroneous()
            }
        }
    }

    fn type_of_type_decl(&mut self, decl: AstId, ast: &Ast, use_node: NodeId) -> TypeId {
        if let Some(builtin) = self.program.prelude.builtin_for(decl) {
            return self.builtin_type(builtin);
        }

        let Some(symbol) = self.program.symbols.get(decl).copied() else {
            return self.types.erroneous();
        };
        match symbol.kind {
            sable_resolver::SymbolKind::Type { category } => match category {
                TypeCategory::Enum => self.types.intern(TypeData::Enum(sable_types::EnumType {
                    decl,
                    name: symbol.name,
                })),
                _ => self.type_for_aggregate(decl),
            },
            // `type` fields and formals act as type variables until
            // instantiation binds them
            sable_resolver::SymbolKind::Variable {
                storage: StorageClass::Type,
            }
            | sable_resolver::SymbolKind::Formal {
                intent: Intent::Type,
            } => match self.instantiation_binding(decl) {
                Some(bound) => bound.ty,
                None => self.types.intern(TypeData::TypeVar(TypeVarType {
                    decl,
                    name: symbol.name,
                })),
            },
            _ => {
                self.report.add(
                    CallError::InvalidPrimitive {
                        loc: ast.locate(use_node),
                    }
                    .into(),
                );
                self.types.erroneous()
            }
        }
    }

    /// Concrete binding of a `type` formal or field, when an instantiated
    /// body seeded it into the declaration-type table.
    fn instantiation_binding(&self, decl: AstId) -> Option<QualifiedType> {
        self.tables
            .decl_types
            .get(&decl)
            .copied()
            .filter(|qt| qt.is_type() && !self.types.is_generic(qt.ty))
    }

    /// `R(int, 3)`-style type construction and `int(8)`-style widths.
    fn eval_type_call(&mut self, ast: &Ast, node: NodeId, call: &CallExpr) -> TypeId {
        let target = match ast.node(call.callee) {
            Node::Identifier(_) => self.binding_of(ast, call.callee),
            _ => None,
        };
        let Some(NameTarget::Decl(decl)) = target else {
            self.report.add(
                CallError::InvalidPrimitive {
                    loc: ast.locate(node),
                }
                .into(),
            );
            return self.types.erroneous();
        };

        // width selection on a builtin family
        if let Some(builtin) = self.program.prelude.builtin_for(decl) {
            use sable_resolver::BuiltinType as B;
            let width = call
                .actuals
                .first()
                .and_then(|&actual| match ast.node(actual) {
                    Node::Literal(Literal::Int(value)) => Some(*value as u16),
                    _ => None,
                });
            let Some(width) = width else {
                self.report.add(
                    CallError::InvalidPrimitive {
                        loc: ast.locate(node),
                    }
                    .into(),
                );
                return self.types.erroneous();
            };
            return match builtin {
                B::Int => self.types.int(width),
                B::Uint => self.types.uint(width),
                B::Real => self.types.real(width),
                B::Imag => self.types.intern(TypeData::Imag(width)),
                B::Complex => self.types.intern(TypeData::Complex(width)),
                _ => {
                    self.report.add(
                        CallError::InvalidPrimitive {
                            loc: ast.locate(node),
                        }
                        .into(),
                    );
                    self.types.erroneous()
                }
            };
        }

        // generic composite instantiation: positional actuals bind the
        // type/param fields in declaration order
        let root = self.type_for_aggregate(decl);
        let generic_fields: Vec<_> =
            crate::fields::fields_for_type_decl(self, root, false)
                .into_iter()
                .filter(|field| matches!(field.qt.kind, QtKind::Type | QtKind::Param))
                .collect();

        let mut substitution = Substitution::new();
        for (field, &actual) in generic_fields.iter().zip(call.actuals.iter()) {
            let bound = match field.qt.kind {
                QtKind::Type => self.eval_type_expr(ast, actual),
                _ => match ast.node(actual) {
                    Node::Literal(literal) => {
                        let (ty, value) = self.literal_param(*literal);
                        QualifiedType::param_of(ty, value)
                    }
                    _ => {
                        self.report.add(
                            CallError::InvalidPrimitive {
                                loc: ast.locate(actual),
                            }
                            .into(),
                        );
                        self.erroneous()
                    }
                },
            };
            substitution.insert(field.decl, bound);
        }

        let Some(composite) = self.types.get(root).as_composite().cloned() else {
            return self.types.erroneous();
        };
        let instantiated = CompositeType {
            instantiated_from: Some(root),
            substitution,
            genericity: Genericity::Concrete,
            ..composite
        };
        let data = match self.types.get(root) {
            TypeData::Record(_) => TypeData::Record(instantiated),
            TypeData::Union(_) => TypeData::Union(instantiated),
            _ => TypeData::BasicClass(instantiated),
        };
        self.types.intern(data)
    }

    fn literal_param(&mut self, literal: Literal) -> (TypeId, ParamValue) {
        match literal {
            Literal::Bool(value) => (self.types.bool_(), ParamValue::Bool(value)),
            Literal::Int(value) => (self.types.int_default(), ParamValue::Int(value)),
            Literal::Uint(value) => (self.types.uint(64), ParamValue::Uint(value)),
            Literal::Real(value) => (self.types.real(64), ParamValue::Real(value)),
            Literal::Str(value) => (self.types.str_(), ParamValue::Str(value)),
        }
    }

    /// Qualified type of a variable-like declaration, memoized.
    pub fn type_of_decl(&mut self, decl: AstId) -> QualifiedType {
        if let Some(&qt) = self.tables.decl_types.get(&decl) {
            return qt;
        }
        if !self.tables.resolving.insert(decl) {
            return self.erroneous();
        }

        let qt = self.compute_decl_type(decl);
        self.tables.resolving.remove(&decl);
        self.tables.decl_types.insert(decl, qt);
        qt
    }

    fn compute_decl_type(&mut self, decl: AstId) -> QualifiedType {
        let Some((ast, node)) = self.program.ast_for(self.strings, decl) else {
            return self.erroneous();
        };
        let ast = ast.clone();

        match ast.node(node).clone() {
            Node::Variable(variable) => self.variable_type(&ast, node, &variable),
            Node::Formal(formal) => {
                // formal types are normally seeded by signature_of; getting
                // here means the formal is queried before its function
                let qt = match formal.type_expr {
                    Some(type_expr) => {
                        let ty = self.eval_type_expr_inner(&ast, type_expr);
                        QualifiedType::new(qt_kind_for_intent(formal.intent), ty)
                    }
                    None => QualifiedType::new(
                        qt_kind_for_intent(formal.intent),
                        self.types.any_type(),
                    ),
                };
                qt
            }
            Node::EnumElement(_) => {
                // the element's type is its enum
                let Some((enum_ast, mut current)) = self.program.ast_for(self.strings, decl) else {
                    return self.erroneous();
                };
                let enum_ast = enum_ast.clone();
                while let Some(parent) = enum_ast.parent(current) {
                    if enum_ast.node(parent).as_enum().is_some() {
                        let enum_decl = enum_ast.ast_id(parent);
                        let name = enum_ast
                            .node(parent)
                            .decl_name()
                            .expect("enums are named");
                        let ty = self
                            .types
                            .intern(TypeData::Enum(sable_types::EnumType {
                                decl: enum_decl,
                                name,
                            }));
                        return QualifiedType::const_var(ty);
                    }
                    current = parent;
                }
                self.erroneous()
            }
            _ => self.erroneous(),
        }
    }

    fn variable_type(&mut self, ast: &Ast, node: NodeId, variable: &VariableDecl) -> QualifiedType {
        let kind = match variable.storage {
            StorageClass::Const => QtKind::Const,
            StorageClass::Param => QtKind::Param,
            StorageClass::Ref => QtKind::Ref,
            StorageClass::Type => QtKind::Type,
            _ => QtKind::Var,
        };

        if let Some(type_expr) = variable.type_expr {
            let ty = self.eval_type_expr_inner(ast, type_expr);
            let mut qt = QualifiedType::new(kind, ty);
            if kind == QtKind::Param {
                if let Some(init) = variable.init {
                    if let Node::Literal(literal) = ast.node(init) {
                        qt.param = Some(self.literal_param(*literal).1);
                    }
                }
            }
            return qt;
        }

        if let Some(init) = variable.init {
            // infer from the initializer; params keep the literal value
            if let Node::Literal(literal) = ast.node(init) {
                let (ty, value) = self.literal_param(*literal);
                let mut qt = QualifiedType::new(kind, ty);
                if kind == QtKind::Param {
                    qt.param = Some(value);
                }
                return qt;
            }
            // non-literal initializers are resolved by the body resolver,
            // which stores the declaration type before uses are reached;
            // a bare query without that context answers unknown
            return QualifiedType::new(kind, self.types.unknown());
        }

        QualifiedType::new(kind, self.types.unknown())
    }

    /// Initial typed signature of a function declaration. Return-type
    /// inference for functions without a declared return runs through the
    /// body resolver on demand.
    pub fn signature_of(&mut self, decl: AstId) -> SigId {
        if let Some(&sig) = self.tables.signatures.get(&decl) {
            let pending_inference = {
                let data = self.tables.sigs.get(sig);
                matches!(self.types.get(data.return_type.ty), TypeData::Unknown)
            };
            if !pending_inference || self.tables.resolving.contains(&decl) {
                return sig;
            }
            BodyResolver::resolve_function(self, decl);
            return *self
                .tables
                .signatures
                .get(&decl)
                .expect("signature vanished during inference");
        }

        let sig = self.build_initial_signature(decl);
        self.tables.signatures.insert(decl, sig);

        let needs_inference = {
            let data = self.tables.sigs.get(sig);
            matches!(self.types.get(data.return_type.ty), TypeData::Unknown)
        };
        if needs_inference && !self.tables.resolving.contains(&decl) {
            BodyResolver::resolve_function(self, decl);
        }

        *self
            .tables
            .signatures
            .get(&decl)
            .expect("signature vanished after build")
    }

    fn build_initial_signature(&mut self, decl: AstId) -> SigId {
        let Some((ast, node)) = self.program.ast_for(self.strings, decl) else {
            // synthetic module-init functions have no AST; type them () -> void
            let name = self
                .program
                .symbols
                .get(decl)
                .map(|symbol| symbol.name)
                .unwrap_or_else(|| self.strings.intern("<unknown>"));
            let void = self.types.void();
            return self.tables.sigs.intern(TypedSignature {
                untyped: decl,
                name,
                kind: SignatureKind::User,
                is_method: false,
                parenless: false,
                formals: Vec::new(),
                return_type: QualifiedType::var(void),
                where_result: WhereResult::None,
                needs_instantiation: false,
                instantiation: None,
            });
        };
        let ast = ast.clone();
        let Some(function) = ast.node(node).as_function().cloned() else {
            let erroneous = self.erroneous();
            let name = self.strings.intern("<not a function>");
            return self.tables.sigs.intern(TypedSignature {
                untyped: decl,
                name,
                kind: SignatureKind::User,
                is_method: false,
                parenless: false,
                formals: Vec::new(),
                return_type: erroneous,
                where_result: WhereResult::None,
                needs_instantiation: false,
                instantiation: None,
            });
        };

        let mut formals = Vec::new();
        let mut needs_instantiation = false;
        for formal_node in function.all_formals() {
            let Some(formal) = ast.node(formal_node).as_formal().cloned() else {
                continue;
            };
            let kind = qt_kind_for_intent(formal.intent);
            let ty = match formal.type_expr {
                Some(type_expr) => self.eval_type_expr_inner(&ast, type_expr),
                None => self.types.any_type(),
            };
            let qt = QualifiedType::new(kind, ty);
            if self.types.is_generic(ty)
                || matches!(formal.intent, Intent::Type | Intent::Param)
            {
                needs_instantiation = true;
            }

            let detail = FormalDetail {
                name: formal.name,
                intent: formal.intent,
                qt,
                has_default: formal.default.is_some(),
            };
            self.tables.decl_types.insert(ast.ast_id(formal_node), qt);
            formals.push(detail);
        }

        let return_type = match function.return_type {
            Some(type_expr) => {
                let ty = self.eval_type_expr_inner(&ast, type_expr);
                QualifiedType::var(ty)
            }
            None if function.body.is_some() => {
                let unknown = self.types.unknown();
                QualifiedType::var(unknown)
            }
            None => QualifiedType::var(self.types.void()),
        };

        let where_result = match function.where_clause {
            None => WhereResult::None,
            Some(clause) => match ast.node(clause) {
                Node::Literal(Literal::Bool(true)) => WhereResult::True,
                Node::Literal(Literal::Bool(false)) => WhereResult::False,
                // anything referencing generic formals settles at
                // instantiation; stay permissive until then
                _ => WhereResult::True,
            },
        };

        self.tables.sigs.intern(TypedSignature {
            untyped: decl,
            name: function.name,
            kind: SignatureKind::User,
            is_method: function.is_method(),
            parenless: function.parenless,
            formals,
            return_type,
            where_result,
            needs_instantiation,
            instantiation: None,
        })
    }

    /// Field type used by the fields query; `type`/`param` fields without a
    /// substitution answer as type variables (or their defaults when
    /// requested).
    pub fn field_type(
        &mut self,
        ast: &Ast,
        node: NodeId,
        field: &VariableDecl,
        _owner: TypeId,
        use_generic_defaults: bool,
    ) -> QualifiedType {
        match field.storage {
            StorageClass::Type => {
                if use_generic_defaults {
                    if let Some(init) = field.init {
                        return self.eval_type_expr(ast, init);
                    }
                }
                let decl = ast.ast_id(node);
                let var = self.types.intern(TypeData::TypeVar(TypeVarType {
                    decl,
                    name: field.name,
                }));
                QualifiedType::type_of(var)
            }
            _ => self.variable_type(ast, node, field),
        }
    }
}

/// Maps a formal detail back to its declaration id inside the signature's
/// untyped declaration (formal nodes for functions, field declarations for
/// generated initializers).
pub fn formal_decl_id(ctx: &mut Ctx<'_>, sig: &TypedSignature, formal: &FormalDetail) -> AstId {
    if let Some((ast, node)) = ctx.program.ast_for(ctx.strings, sig.untyped) {
        if let Some(function) = ast.node(node).as_function() {
            for formal_node in function.all_formals() {
                if ast.node(formal_node).as_formal().map(|f| f.name) == Some(formal.name) {
                    return ast.ast_id(formal_node);
                }
            }
        }
        if let Some(aggregate) = ast.node(node).as_aggregate() {
            for &child in &aggregate.body {
                if ast.node(child).decl_name() == Some(formal.name) {
                    return ast.ast_id(child);
                }
            }
        }
    }
    sig.untyped
}

/// Unifies the collected return types of a body: all must agree; no return
/// statement means `void`. The result reads as a value.
fn infer_return(ctx: &mut Ctx<'_>, returns: &[(QualifiedType, Loc)]) -> QualifiedType {
    let Some(&(first, _)) = returns.first() else {
        return QualifiedType::var(ctx.types.void());
    };

    for &(qt, loc) in &returns[1..] {
        if qt.ty != first.ty {
            let expected = ctx.types.display(first.ty, ctx.strings);
            let found = ctx.types.display(qt.ty, ctx.strings);
            ctx.report.add(
                CallError::TypeMismatch {
                    expected,
                    found,
                    loc,
                }
                .into(),
            );
            return ctx.erroneous();
        }
    }

    first.with_kind(QtKind::Var)
}

fn qt_kind_for_intent(intent: Intent) -> QtKind {
    match intent {
        Intent::Blank | Intent::Const | Intent::ConstIn => QtKind::ConstIn,
        Intent::In => QtKind::In,
        Intent::Out => QtKind::Out,
        Intent::Inout => QtKind::Inout,
        Intent::Ref => QtKind::Ref,
        Intent::ConstRef => QtKind::ConstRef,
        Intent::Param => QtKind::Param,
        Intent::Type => QtKind::Type,
    }
}

/// Resolves one symbol's body: types every expression, resolves every call
/// and records the result dense by postorder index.
pub struct BodyResolver<'c, 'a> {
    ctx: &'a mut Ctx<'c>,
    ast: Ast,
    bindings: Rc<NameBindings>,
    region: StrKey,
    overrides: Substitution,
    result: ResolutionResult,
    returns: Vec<(QualifiedType, Loc)>,
}

impl<'c, 'a> BodyResolver<'c, 'a> {
    /// Resolves a function body, inferring the return type when the
    /// declaration omits one. Results are memoized per declaration.
    pub fn resolve_function(ctx: &'a mut Ctx<'c>, decl: AstId) -> Rc<ResolutionResult> {
        Self::resolve_function_with(ctx, decl, Substitution::new())
    }

    /// Same, under instantiation assumptions: `overrides` maps formal and
    /// type-field declaration ids to their concrete bindings.
    pub fn resolve_function_with(
        ctx: &'a mut Ctx<'c>,
        decl: AstId,
        overrides: Substitution,
    ) -> Rc<ResolutionResult> {
        if overrides.is_empty() {
            if let Some(result) = ctx.tables.fn_results.get(&decl) {
                return result.clone();
            }
        }
        if !ctx.tables.resolving.insert(decl) {
            return Rc::new(ResolutionResult::new());
        }

        let sig = ctx.signature_of_quiet(decl);
        let result = Self::run(ctx, decl, sig, overrides.clone());

        ctx.tables.resolving.remove(&decl);
        let result = Rc::new(result);
        if overrides.is_empty() {
            ctx.tables.fn_results.insert(decl, result.clone());
        }
        result
    }

    fn run(
        ctx: &mut Ctx<'c>,
        decl: AstId,
        sig: SigId,
        overrides: Substitution,
    ) -> ResolutionResult {
        let Some((ast, node)) = ctx.program.ast_for(ctx.strings, decl) else {
            return ResolutionResult::new();
        };
        let ast = ast.clone();
        let Some(bindings) = ctx.bindings_for(decl) else {
            return ResolutionResult::new();
        };
        let Some(function) = ast.node(node).as_function().cloned() else {
            return ResolutionResult::new();
        };

        // apply instantiation assumptions to the formal declaration types;
        // value formals keep their declared kind, only the type changes
        for &(formal_decl, bound) in overrides.iter() {
            let adjusted = match ctx.tables.decl_types.get(&formal_decl) {
                Some(existing) if !existing.is_type() && !existing.is_param() => {
                    bound.with_kind(existing.kind)
                }
                _ => bound,
            };
            ctx.tables.decl_types.insert(formal_decl, adjusted);
        }

        let mut resolver = BodyResolver {
            ctx,
            ast: ast.clone(),
            bindings,
            region: decl.path,
            overrides,
            result: ResolutionResult::new(),
            returns: Vec::new(),
        };

        if let Some(body) = function.body {
            resolver.resolve_node(body);
        }

        let returns = std::mem::take(&mut resolver.returns);
        let result = std::mem::replace(&mut resolver.result, ResolutionResult::new());
        let ctx = resolver.ctx;

        // return-type inference and missing-return checking
        let declared = ctx.tables.sigs.get(sig).return_type;
        let declared_unknown = matches!(ctx.types.get(declared.ty), TypeData::Unknown);
        let inferred = infer_return(ctx, &returns);

        if declared_unknown {
            let mut updated = ctx.tables.sigs.get(sig).clone();
            updated.return_type = inferred;
            let new_sig = ctx.tables.sigs.intern(updated);
            ctx.tables.signatures.insert(decl, new_sig);
        } else {
            let void = ctx.types.void();
            if declared.ty != void && returns.is_empty() && function.body.is_some() {
                let name = ctx.strings[function.name].to_owned();
                ctx.report.add(
                    CallError::MissingReturn {
                        name,
                        loc: ast.locate(node),
                    }
                    .into(),
                );
            }
        }

        result
    }

    /// Resolves a module's init statements (the body of the synthetic
    /// `__init_<module>` function).
    pub fn resolve_module_init(
        ctx: &'a mut Ctx<'c>,
        module_index: usize,
    ) -> ResolutionResult {
        let parts = ctx.program.modules[module_index].clone();
        let Some((ast, _)) = ctx.program.ast_for(ctx.strings, parts.module) else {
            return ResolutionResult::new();
        };
        let ast = ast.clone();
        let Some(bindings) = ctx.tables.bindings.get(&parts.module).cloned() else {
            return ResolutionResult::new();
        };

        let mut resolver = BodyResolver {
            ctx,
            ast,
            bindings,
            region: parts.module.path,
            overrides: Substitution::new(),
            result: ResolutionResult::new(),
            returns: Vec::new(),
        };

        // globals first so init statements see their types
        for &global in &parts.globals {
            resolver.resolve_global(global);
        }
        for &stmt in &parts.init_stmts {
            resolver.resolve_node(stmt);
        }

        std::mem::replace(&mut resolver.result, ResolutionResult::new())
    }

    fn resolve_global(&mut self, node: NodeId) {
        match self.ast.node(node) {
            Node::Variable(_) | Node::MultiDecl(_) | Node::TupleDecl(_) => {
                self.resolve_node(node);
            }
            // functions and aggregates are their own regions
            _ => {}
        }
    }

    fn record(&mut self, node: NodeId, resolved: ResolvedExpression) -> QualifiedType {
        let qt = resolved.qt;
        let id = self.ast.ast_id(node);
        if id.path == self.region {
            self.result.set(id.post, resolved);
        }
        qt
    }

    /// Postorder resolution of one node; returns its qualified type.
    fn resolve_node(&mut self, node: NodeId) -> QualifiedType {
        let current = self.ast.node(node).clone();
        match current {
            // nested symbols are their own regions
            ref n if n.is_symbol_decl() => {
                let void = self.ctx.types.void();
                QualifiedType::var(void)
            }
            Node::Literal(literal) => {
                let (ty, value) = self.ctx.literal_param(literal);
                let qt = QualifiedType {
                    kind: QtKind::Param,
                    ty,
                    param: Some(value),
                };
                self.record(node, ResolvedExpression::of_type(qt))
            }
            Node::Identifier(_) => self.resolve_identifier(node),
            Node::Call(call) => self.resolve_call(node, &call),
            Node::OpCall(op) => {
                let operands = op.operands.clone();
                self.resolve_op_call(node, op.op, &operands)
            }
            Node::Dot(dot) => self.resolve_dot(node, &dot),
            Node::New(new) => {
                self.resolve_new(node, new.type_expr, new.management, CallShape::default())
            }
            Node::Variable(variable) => self.resolve_variable(node, &variable),
            Node::MultiDecl(multi) => {
                for &child in &multi.decls {
                    self.resolve_node(child);
                }
                self.void(node)
            }
            Node::TupleDecl(tuple) => {
                if let Some(init) = tuple.init {
                    self.resolve_node(init);
                }
                for &element in &tuple.elements {
                    self.resolve_node(element);
                }
                self.void(node)
            }
            Node::Formal(_) => {
                let qt = self.ctx.type_of_decl(self.ast.ast_id(node));
                self.record(node, ResolvedExpression::of_type(qt))
            }
            Node::TupleExpr(tuple) => {
                let elems = tuple
                    .elements
                    .iter()
                    .map(|&element| self.resolve_node(element))
                    .collect();
                let ty = self
                    .ctx
                    .types
                    .intern(TypeData::Tuple(sable_types::TupleType { elems }));
                self.record(node, ResolvedExpression::of_type(QualifiedType::var(ty)))
            }
            Node::Domain(domain) => {
                for &dim in &domain.dims {
                    self.resolve_node(dim);
                }
                let ty = self.ctx.types.intern(TypeData::Domain {
                    rank: domain.dims.len() as u8,
                });
                self.record(node, ResolvedExpression::of_type(QualifiedType::const_var(ty)))
            }
            Node::Range(range) => {
                if let Some(low) = range.low {
                    self.resolve_node(low);
                }
                if let Some(high) = range.high {
                    self.resolve_node(high);
                }
                let ty = self.ctx.types.intern(TypeData::Domain { rank: 1 });
                self.record(node, ResolvedExpression::of_type(QualifiedType::const_var(ty)))
            }
            Node::Block(block) => {
                for &stmt in &block.stmts {
                    self.resolve_node(stmt);
                }
                self.void(node)
            }
            Node::Return(ret) => {
                let qt = match ret.value {
                    Some(value) => self.resolve_node(value),
                    None => QualifiedType::var(self.ctx.types.void()),
                };
                self.returns.push((qt, self.ast.locate(node)));
                self.void(node)
            }
            Node::Conditional(cond) => {
                let condition = self.resolve_node(cond.condition);
                self.expect_bool(&condition, cond.condition);
                self.resolve_node(cond.then_block);
                if let Some(else_block) = cond.else_block {
                    self.resolve_node(else_block);
                }
                self.void(node)
            }
            Node::While(stmt) => {
                let condition = self.resolve_node(stmt.condition);
                self.expect_bool(&condition, stmt.condition);
                self.resolve_node(stmt.body);
                self.void(node)
            }
            Node::For(stmt) => {
                self.resolve_node(stmt.iterand);
                if let Some(index) = stmt.index {
                    self.resolve_node(index);
                }
                self.resolve_node(stmt.body);
                self.void(node)
            }
            Node::Defer(stmt) => {
                self.resolve_node(stmt.body);
                self.void(node)
            }
            Node::Label(stmt) => {
                self.resolve_node(stmt.target);
                self.void(node)
            }
            Node::InitThis(_) | Node::Use(_) => self.void(node),
            Node::Module(_)
            | Node::Function(_)
            | Node::Record(_)
            | Node::Class(_)
            | Node::Union(_)
            | Node::Enum(_)
            | Node::EnumElement(_) => {
                let void = self.ctx.types.void();
                QualifiedType::var(void)
            }
        }
    }

    fn void(&mut self, node: NodeId) -> QualifiedType {
        let void = self.ctx.types.void();
        self.record(
            node,
            ResolvedExpression::of_type(QualifiedType::var(void)),
        )
    }

    fn expect_bool(&mut self, qt: &QualifiedType, node: NodeId) {
        let boolean = self.ctx.types.bool_();
        let erroneous = self.ctx.types.erroneous();
        if qt.ty != boolean && qt.ty != erroneous {
            let found = self.ctx.types.display(qt.ty, self.ctx.strings);
            self.ctx.report.add(
                CallError::TypeMismatch {
                    expected: "bool".to_owned(),
                    found,
                    loc: self.ast.locate(node),
                }
                .into(),
            );
        }
    }

    fn resolve_variable(&mut self, node: NodeId, variable: &VariableDecl) -> QualifiedType {
        let decl = self.ast.ast_id(node);

        let declared = variable
            .type_expr
            .map(|type_expr| self.ctx.eval_type_expr_inner(&self.ast.clone(), type_expr));
        let initialized = variable.init.map(|init| self.resolve_node(init));

        let kind = match variable.storage {
            StorageClass::Const => QtKind::Const,
            StorageClass::Param => QtKind::Param,
            StorageClass::Ref => QtKind::Ref,
            StorageClass::Type => QtKind::Type,
            _ => QtKind::Var,
        };

        let qt = match (declared, initialized) {
            (Some(ty), Some(init)) => {
                let formal = QualifiedType::new(kind, ty);
                let passes = can_pass(self.ctx.types, &init, &formal);
                if !passes.passes {
                    let expected = self.ctx.types.display(ty, self.ctx.strings);
                    let found = self.ctx.types.display(init.ty, self.ctx.strings);
                    self.ctx.report.add(
                        CallError::TypeMismatch {
                            expected,
                            found,
                            loc: self.ast.locate(node),
                        }
                        .into(),
                    );
                    self.ctx.erroneous()
                } else {
                    formal
                }
            }
            (Some(ty), None) => QualifiedType::new(kind, ty),
            (None, Some(init)) => {
                let mut qt = init.with_kind(kind);
                if kind == QtKind::Param {
                    qt.param = init.param;
                }
                qt
            }
            (None, None) => QualifiedType::new(kind, self.ctx.types.unknown()),
        };

        self.ctx.tables.decl_types.insert(decl, qt);
        self.record(
            node,
            ResolvedExpression {
                qt,
                to_id: Some(decl),
                most_specific: None,
            },
        )
    }

    fn resolve_identifier(&mut self, node: NodeId) -> QualifiedType {
        match self.bindings.get(node).cloned() {
            Some(NameTarget::Decl(decl)) => {
                let symbol = self.ctx.program.symbols.get(decl).copied();
                let qt = match symbol.map(|s| s.kind) {
                    Some(sable_resolver::SymbolKind::Type { .. }) => {
                        let ty = self
                            .ctx
                            .type_of_type_decl(decl, &self.ast.clone(), node);
                        QualifiedType::type_of(ty)
                    }
                    Some(sable_resolver::SymbolKind::Module) => {
                        // module mention; meaningful only under a dot
                        QualifiedType::var(self.ctx.types.void())
                    }
                    _ => {
                        let bound = self.overrides.get(decl);
                        let declared = bound.unwrap_or_else(|| self.ctx.type_of_decl(decl));
                        mention_kind(declared)
                    }
                };
                self.record(
                    node,
                    ResolvedExpression {
                        qt,
                        to_id: Some(decl),
                        most_specific: None,
                    },
                )
            }
            Some(NameTarget::Candidates(decls)) => {
                // no enclosing call: a parenless function mention is a call
                // with zero actuals
                let shape = CallShape::default();
                self.dispatch_call(node, &decls, shape, true)
            }
            Some(NameTarget::Erroneous) | None => {
                let qt = self.ctx.erroneous();
                self.record(node, ResolvedExpression::of_type(qt))
            }
        }
    }

    fn resolve_call(&mut self, node: NodeId, call: &CallExpr) -> QualifiedType {
        // a call on a type name is type construction, not a function call
        if let Node::Identifier(_) = self.ast.node(call.callee) {
            if let Some(NameTarget::Decl(decl)) = self.bindings.get(call.callee).cloned() {
                let is_type = self.ctx.program.prelude.builtin_for(decl).is_some()
                    || self
                        .ctx
                        .program
                        .symbols
                        .get(decl)
                        .map(|s| matches!(s.kind, sable_resolver::SymbolKind::Type { .. }))
                        .unwrap_or(false);
                if is_type {
                    let qt = self.ctx.eval_type_expr(&self.ast.clone(), node);
                    return self.record(
                        node,
                        ResolvedExpression {
                            qt,
                            to_id: Some(decl),
                            most_specific: None,
                        },
                    );
                }
            }
        }

        let mut shape = CallShape {
            actuals: Vec::new(),
            names: call.actual_names.clone(),
            receiver: None,
        };
        for &actual in &call.actuals {
            let qt = self.resolve_node(actual);
            shape.actuals.push(qt);
        }

        match self.ast.node(call.callee).clone() {
            Node::Identifier(_) => match self.bindings.get(call.callee).cloned() {
                Some(NameTarget::Candidates(decls)) => {
                    self.dispatch_call(node, &decls, shape, false)
                }
                Some(NameTarget::Erroneous) | None => {
                    let qt = self.ctx.erroneous();
                    self.record(node, ResolvedExpression::of_type(qt))
                }
                Some(NameTarget::Decl(_)) => {
                    let qt = self.ctx.erroneous();
                    self.no_candidates(node, "<not callable>", &[]);
                    self.record(node, ResolvedExpression::of_type(qt))
                }
            },
            Node::Dot(dot) => {
                let receiver = self.resolve_node(dot.receiver);
                shape.receiver = Some(receiver);
                let decls = self.method_candidates(receiver.ty, dot.field, false);
                self.dispatch_call(node, &decls, shape, false)
            }
            Node::New(new) => self.resolve_new(node, new.type_expr, new.management, shape),
            _ => {
                self.resolve_node(call.callee);
                self.no_candidates(node, "<expression>", &[]);
                let qt = self.ctx.erroneous();
                self.record(node, ResolvedExpression::of_type(qt))
            }
        }
    }

    /// Candidate declarations for a method call on `receiver_ty`: user
    /// methods in the receiver's defining scope and at the call site, plus
    /// compiler-generated ones.
    fn method_candidates(
        &mut self,
        receiver_ty: TypeId,
        name: StrKey,
        parenless: bool,
    ) -> Vec<CandidateDecl> {
        let mut decls: Vec<CandidateDecl> = Vec::new();

        let basic = match *self.ctx.types.get(receiver_ty) {
            TypeData::Class { basic, .. } => basic,
            _ => receiver_ty,
        };

        if let Some(composite) = self.ctx.types.get(basic).as_composite().cloned() {
            if let Some(scope) = self.ctx.program.scopes.scope_for(composite.decl) {
                for decl in self.ctx.program.scopes.lookup(
                    scope,
                    name,
                    LookupConfig::DECLS,
                    &self.ctx.program.symbols,
                ) {
                    decls.push(CandidateDecl::User(decl));
                }
            }
        }

        if decls.is_empty() && need_compiler_generated_method(self.ctx, basic, name, parenless) {
            if let Some(sig) = generated_signature(self.ctx, basic, name) {
                decls.push(CandidateDecl::Generated(sig));
            }
        }

        decls
    }

    fn no_candidates(&mut self, node: NodeId, name: &str, rejected: &[String]) {
        self.ctx.report.add(
            CallError::NoMatchingCandidate {
                name: name.to_owned(),
                loc: self.ast.locate(node),
                rejected: rejected.to_vec(),
            }
            .into(),
        );
    }

    /// The full resolution pipeline over an explicit candidate list:
    /// typing, mapping, instantiation, disambiguation, the const-ref
    /// post-check and wrapper synthesis.
    fn dispatch_call(
        &mut self,
        node: NodeId,
        decls: &[impl CandidateSource],
        shape: CallShape,
        parenless_mention: bool,
    ) -> QualifiedType {
        let mut candidates = Vec::new();
        let mut rejected = Vec::new();

        for source in decls {
            let sig_id = match source.signature(self.ctx) {
                Some(sig) => sig,
                None => continue,
            };
            let sig = self.ctx.tables.sigs.get(sig_id).clone();

            if parenless_mention && !sig.parenless {
                rejected.push(self.describe(&sig));
                continue;
            }
            if sig.where_result == WhereResult::False {
                rejected.push(self.describe(&sig));
                continue;
            }

            let Some(map) = map_actuals(&sig, &shape) else {
                rejected.push(self.describe(&sig));
                continue;
            };

            // generic candidates instantiate before conversion checking
            let (sig_id, sig, was_generic) = if sig.needs_instantiation {
                match self.instantiate_candidate(sig_id, &sig, &map, &shape) {
                    Some(instantiated) => {
                        let data = self.ctx.tables.sigs.get(instantiated).clone();
                        (instantiated, data, true)
                    }
                    None => {
                        rejected.push(self.describe(&sig));
                        continue;
                    }
                }
            } else {
                (sig_id, sig, false)
            };

            let Some(conversions) = self.check_conversions(&sig, &map, &shape) else {
                rejected.push(self.describe(&sig));
                continue;
            };

            candidates.push(Candidate {
                sig: sig_id,
                map,
                conversions,
                was_generic,
            });
        }

        let name = candidates
            .first()
            .map(|candidate| {
                self.ctx.strings[self.ctx.tables.sigs.get(candidate.sig).name].to_owned()
            })
            .unwrap_or_else(|| "<call>".to_owned());

        match most_specific(&self.ctx.tables.sigs, self.ctx.types, &candidates) {
            Disambiguation::Empty => {
                self.no_candidates(node, &name, &rejected);
                let qt = self.ctx.erroneous();
                self.record(node, ResolvedExpression::of_type(qt))
            }
            Disambiguation::Ambiguous(tied) => {
                let tied_names: Vec<String> = tied
                    .iter()
                    .map(|&index| {
                        let sig = self.ctx.tables.sigs.get(candidates[index].sig).clone();
                        self.describe(&sig)
                    })
                    .collect();
                self.ctx.report.add(
                    CallError::AmbiguousCall {
                        name,
                        loc: self.ast.locate(node),
                        candidates: tied_names,
                    }
                    .into(),
                );
                let qt = self.ctx.erroneous();
                self.record(node, ResolvedExpression::of_type(qt))
            }
            Disambiguation::Best(index) => {
                let candidate = &candidates[index];
                let sig = self.ctx.tables.sigs.get(candidate.sig).clone();
                log::trace!(
                    "call at {:?} resolved to {}",
                    self.ast.ast_id(node),
                    self.describe(&sig)
                );

                // the const-ref rule runs after disambiguation so the
                // diagnostic names the chosen candidate
                let mut const_ref_failed = false;
                for (index, (formal, conversion)) in
                    sig.formals.iter().zip(&candidate.conversions).enumerate()
                {
                    if !const_ref_violation(&formal.qt, conversion) {
                        continue;
                    }
                    const_ref_failed = true;
                    let actual_ty = match candidate.map.bindings[index] {
                        Binding::Receiver => shape.receiver.map(|qt| qt.ty),
                        Binding::Actual(actual) => Some(shape.actuals[actual].ty),
                        Binding::Default => None,
                    };
                    let actual = actual_ty
                        .map(|ty| self.ctx.types.display(ty, self.ctx.strings))
                        .unwrap_or_else(|| "<default>".to_owned());
                    let formal_text = self.ctx.types.display(formal.qt.ty, self.ctx.strings);
                    self.ctx.report.add(
                        CallError::ConstRefCoercion {
                            name: self.ctx.strings[sig.name].to_owned(),
                            formal: formal_text,
                            actual,
                            loc: self.ast.locate(node),
                        }
                        .into(),
                    );
                    break;
                }

                let wrappers = synthesize_wrappers(
                    &mut self.ctx.tables.sigs,
                    candidate.sig,
                    &candidate.map,
                    &candidate.conversions,
                    &shape,
                );

                let target = CallTarget {
                    sig: candidate.sig,
                    conversions: candidate
                        .conversions
                        .iter()
                        .map(|conversion| conversion.conversion)
                        .collect(),
                    wrappers,
                };

                let qt = if const_ref_failed {
                    self.ctx.erroneous()
                } else {
                    self.ctx.tables.sigs.get(candidate.sig).return_type
                };

                self.record(
                    node,
                    ResolvedExpression {
                        qt,
                        to_id: Some(sig.untyped),
                        most_specific: Some(target),
                    },
                )
            }
        }
    }

    fn describe(&self, sig: &TypedSignature) -> String {
        let formals: Vec<String> = sig
            .formals
            .iter()
            .map(|formal| {
                format!(
                    "{}: {}",
                    &self.ctx.strings[formal.name],
                    self.ctx.types.display(formal.qt.ty, self.ctx.strings)
                )
            })
            .collect();
        format!(
            "{}({})",
            &self.ctx.strings[sig.name],
            formals.join(", ")
        )
    }

    fn check_conversions(
        &mut self,
        sig: &TypedSignature,
        map: &crate::candidate::FormalActualMap,
        shape: &CallShape,
    ) -> Option<Vec<CanPass>> {
        let mut conversions = Vec::with_capacity(sig.formals.len());
        for (formal, binding) in sig.formals.iter().zip(&map.bindings) {
            let actual = match binding {
                Binding::Receiver => shape.receiver?,
                Binding::Actual(index) => shape.actuals[*index],
                Binding::Default => {
                    conversions.push(CanPass::pass(ConversionKind::Identity));
                    continue;
                }
            };
            // out formals write back; the actual's type is not constrained
            if formal.qt.kind == QtKind::Out {
                conversions.push(CanPass::pass(ConversionKind::Identity));
                continue;
            }
            let result = can_pass(self.ctx.types, &actual, &formal.qt);
            if !result.passes {
                return None;
            }
            conversions.push(result);
        }
        Some(conversions)
    }

    /// Derives the substitution a generic candidate needs from the mapped
    /// actuals and runs the instantiator.
    fn instantiate_candidate(
        &mut self,
        sig_id: SigId,
        sig: &TypedSignature,
        map: &crate::candidate::FormalActualMap,
        shape: &CallShape,
    ) -> Option<SigId> {
        let mut subs = Substitution::new();

        for (formal, binding) in sig.formals.iter().zip(&map.bindings) {
            let actual = match binding {
                Binding::Receiver => shape.receiver?,
                Binding::Actual(index) => shape.actuals[*index],
                Binding::Default => continue,
            };

            match formal.intent {
                Intent::Type => {
                    if !actual.is_type() {
                        return None;
                    }
                    let decl = formal_decl_id(self.ctx, sig, formal);
                    subs.insert(decl, actual);
                }
                Intent::Param => {
                    let decl = formal_decl_id(self.ctx, sig, formal);
                    if actual.param.is_none() {
                        return None;
                    }
                    subs.insert(decl, actual);
                }
                _ => {
                    if self.ctx.types.is_generic(formal.qt.ty) {
                        match self.ctx.types.get(formal.qt.ty) {
                            TypeData::AnyType | TypeData::AnyNumeric => {
                                let decl = formal_decl_id(self.ctx, sig, formal);
                                subs.insert(decl, QualifiedType::type_of(actual.ty));
                            }
                            _ => {
                                if !match_types(
                                    self.ctx.types,
                                    formal.qt.ty,
                                    actual.ty,
                                    &mut subs,
                                ) {
                                    return None;
                                }
                            }
                        }
                    }
                }
            }
        }

        match instantiate_signature(self.ctx, sig_id, subs) {
            Ok(instantiated) => Some(instantiated),
            Err(error) => {
                self.ctx.report.add(error.into());
                None
            }
        }
    }

    fn resolve_op_call(&mut self, node: NodeId, op: StrKey, operands: &[NodeId]) -> QualifiedType {
        let op_text = self.ctx.strings[op].to_owned();

        if op_text == "=" && operands.len() == 2 {
            return self.resolve_assignment(node, operands[0], operands[1]);
        }

        let resolved: Vec<QualifiedType> = operands
            .iter()
            .map(|&operand| self.resolve_node(operand))
            .collect();

        // user-defined operators come first; builtin numeric semantics are
        // the fallback
        if let Some(qt) = self.try_user_operator(node, op, &resolved) {
            return qt;
        }

        let qt = self.builtin_operator(node, &op_text, &resolved);
        self.record(node, ResolvedExpression::of_type(qt))
    }

    fn try_user_operator(
        &mut self,
        node: NodeId,
        op: StrKey,
        resolved: &[QualifiedType],
    ) -> Option<QualifiedType> {
        // operators are looked up like any other name from the region's
        // scope; the region symbol's scope is the innermost we know here
        let scope = self
            .ctx
            .program
            .scopes
            .scope_for(AstId::symbol_root(self.region))?;
        let found = self.ctx.program.scopes.lookup(
            scope,
            op,
            LookupConfig::DECLS_PARENTS_IMPORTS,
            &self.ctx.program.symbols,
        );
        let decls: Vec<CandidateDecl> = found
            .into_iter()
            .filter(|decl| {
                self.ctx
                    .program
                    .symbols
                    .get(*decl)
                    .map(|symbol| symbol.kind.is_function())
                    .unwrap_or(false)
            })
            .map(CandidateDecl::User)
            .collect();
        if decls.is_empty() {
            return None;
        }

        let shape = CallShape {
            actuals: resolved.to_vec(),
            names: vec![None; resolved.len()],
            receiver: None,
        };
        Some(self.dispatch_call(node, &decls, shape, false))
    }

    fn builtin_operator(
        &mut self,
        node: NodeId,
        op: &str,
        resolved: &[QualifiedType],
    ) -> QualifiedType {
        let erroneous = self.ctx.types.erroneous();
        if resolved.iter().any(|qt| qt.ty == erroneous) {
            return QualifiedType::var(erroneous);
        }

        match op {
            "==" | "!=" | "<" | "<=" | ">" | ">=" => {
                QualifiedType::var(self.ctx.types.bool_())
            }
            "&&" | "||" | "!" => QualifiedType::var(self.ctx.types.bool_()),
            "+" | "-" | "*" | "/" | "%" if !resolved.is_empty() => {
                // numeric promotion: the wider operand wins
                let mut best = resolved[0];
                for qt in &resolved[1..] {
                    let widened = can_pass(self.ctx.types, &best, &QualifiedType::var(qt.ty));
                    if widened.passes {
                        best = *qt;
                    }
                }
                if resolved
                    .iter()
                    .all(|qt| self.ctx.types.get(qt.ty).is_numeric())
                {
                    QualifiedType::var(best.ty)
                } else {
                    self.operator_mismatch(node, op, resolved)
                }
            }
            _ => self.operator_mismatch(node, op, resolved),
        }
    }

    fn operator_mismatch(
        &mut self,
        node: NodeId,
        op: &str,
        resolved: &[QualifiedType],
    ) -> QualifiedType {
        let found = resolved
            .iter()
            .map(|qt| self.ctx.types.display(qt.ty, self.ctx.strings))
            .collect::<Vec<_>>()
            .join(", ");
        self.ctx.report.add(
            CallError::TypeMismatch {
                expected: format!("operands supporting '{op}'"),
                found,
                loc: self.ast.locate(node),
            }
            .into(),
        );
        self.ctx.erroneous()
    }

    /// Assignment per the lowering rules: type/param moves, record `init=`
    /// method, otherwise the `=` operator.
    fn resolve_assignment(&mut self, node: NodeId, lhs: NodeId, rhs: NodeId) -> QualifiedType {
        let lhs_qt = self.resolve_node(lhs);
        let rhs_qt = self.resolve_node(rhs);
        let void = QualifiedType::var(self.ctx.types.void());

        // type and param assignment is a compile-time move, no call
        if lhs_qt.is_type() || lhs_qt.is_param() {
            return self.record(node, ResolvedExpression::of_type(void));
        }

        let lhs_is_record = matches!(self.ctx.types.get(lhs_qt.ty), TypeData::Record(_));
        if lhs_is_record {
            let init_name = self.ctx.strings.intern("init=");
            let decls = self.method_candidates(lhs_qt.ty, init_name, false);
            if !decls.is_empty() {
                let shape = CallShape {
                    actuals: vec![rhs_qt],
                    names: vec![None],
                    receiver: Some(lhs_qt),
                };
                self.dispatch_call(node, &decls, shape, false);
                // assignment itself is void regardless of init='s shape
                return self.record(node, ResolvedExpression::of_type(void));
            }
        }

        let passes = can_pass(self.ctx.types, &rhs_qt, &lhs_qt.with_kind(QtKind::Var));
        if !passes.passes {
            let expected = self.ctx.types.display(lhs_qt.ty, self.ctx.strings);
            let found = self.ctx.types.display(rhs_qt.ty, self.ctx.strings);
            self.ctx.report.add(
                CallError::TypeMismatch {
                    expected,
                    found,
                    loc: self.ast.locate(node),
                }
                .into(),
            );
        }
        self.record(node, ResolvedExpression::of_type(void))
    }

    fn resolve_dot(&mut self, node: NodeId, dot: &DotExpr) -> QualifiedType {
        // module member access resolves through the module's scope
        if let Some(NameTarget::Decl(decl)) = self.bindings.get(dot.receiver).cloned() {
            if self
                .ctx
                .program
                .symbols
                .get(decl)
                .map(|s| matches!(s.kind, sable_resolver::SymbolKind::Module))
                .unwrap_or(false)
            {
                self.resolve_node(dot.receiver);
                if let Some(scope) = self.ctx.program.scopes.scope_for(decl) {
                    let found = self.ctx.program.scopes.lookup(
                        scope,
                        dot.field,
                        LookupConfig::DECLS,
                        &self.ctx.program.symbols,
                    );
                    if let Some(&member) = found.first() {
                        let qt = self.ctx.type_of_decl(member);
                        return self.record(
                            node,
                            ResolvedExpression {
                                qt: mention_kind(qt),
                                to_id: Some(member),
                                most_specific: None,
                            },
                        );
                    }
                }
                let qt = self.ctx.erroneous();
                return self.record(node, ResolvedExpression::of_type(qt));
            }
        }

        let receiver = self.resolve_node(dot.receiver);

        // enum element access
        if let TypeData::Enum(enum_type) = self.ctx.types.get(receiver.ty).clone() {
            if receiver.is_type() {
                if let Some((ast, enum_node)) =
                    self.ctx.program.ast_for(self.ctx.strings, enum_type.decl)
                {
                    let ast = ast.clone();
                    if let Some(decl) = ast.node(enum_node).as_enum().and_then(|e| {
                        e.elements.iter().copied().find(|&element| {
                            ast.node(element).decl_name() == Some(dot.field)
                        })
                    }) {
                        let qt = QualifiedType::const_var(receiver.ty);
                        return self.record(
                            node,
                            ResolvedExpression {
                                qt,
                                to_id: Some(ast.ast_id(decl)),
                                most_specific: None,
                            },
                        );
                    }
                }
            }
        }

        // parenless field accessor or parenless method
        let decls = self.method_candidates(receiver.ty, dot.field, true);
        if decls.is_empty() {
            let found = self.ctx.types.display(receiver.ty, self.ctx.strings);
            self.ctx.report.add(
                CallError::NoMatchingCandidate {
                    name: self.ctx.strings[dot.field].to_owned(),
                    loc: self.ast.locate(node),
                    rejected: vec![found],
                }
                .into(),
            );
            let qt = self.ctx.erroneous();
            return self.record(node, ResolvedExpression::of_type(qt));
        }

        let shape = CallShape {
            actuals: Vec::new(),
            names: Vec::new(),
            receiver: Some(receiver),
        };
        let qt = self.dispatch_call(node, &decls, shape, true);

        // accessor results track receiver const-ness
        if receiver.kind.is_const() && qt.kind == QtKind::ConstRef {
            qt
        } else if qt.kind == QtKind::ConstRef && !receiver.kind.is_const() {
            qt.with_kind(QtKind::Ref)
        } else {
            qt
        }
    }

    /// `new T(...)`: resolve the constructed type, dispatch its `init`, and
    /// produce the managed value (classes wrap in the requested management,
    /// owned by default; records are the value itself).
    fn resolve_new(
        &mut self,
        node: NodeId,
        type_expr: NodeId,
        management: Option<Management>,
        mut shape: CallShape,
    ) -> QualifiedType {
        let target = self.ctx.eval_type_expr(&self.ast.clone(), type_expr);
        let erroneous = self.ctx.types.erroneous();
        if target.ty == erroneous {
            return self
                .record(node, ResolvedExpression::of_type(QualifiedType::var(erroneous)));
        }
        shape.receiver = Some(QualifiedType::reference(target.ty));

        let init = self.ctx.strings.intern("init");
        let decls = self.method_candidates(target.ty, init, false);
        if decls.is_empty() {
            self.no_candidates(node, "init", &[]);
            let qt = self.ctx.erroneous();
            return self.record(node, ResolvedExpression::of_type(qt));
        }

        let resolved = self.dispatch_call(node, &decls, shape, false);
        let produced = if resolved.ty == erroneous {
            QualifiedType::var(erroneous)
        } else {
            match self.ctx.types.get(target.ty).clone() {
                TypeData::BasicClass(_) => {
                    let decorator = Decorator::new(
                        management.unwrap_or(Management::Owned),
                        Nilability::NonNilable,
                    );
                    let class = self.ctx.types.intern(TypeData::Class {
                        basic: target.ty,
                        decorator,
                    });
                    QualifiedType::var(class)
                }
                _ => QualifiedType::var(target.ty),
            }
        };

        // keep the init target recorded by dispatch, update the value type
        let recorded = self
            .result
            .get(self.ast.ast_id(node).post)
            .cloned()
            .unwrap_or_else(|| ResolvedExpression::of_type(produced));
        self.record(
            node,
            ResolvedExpression {
                qt: produced,
                ..recorded
            },
        )
    }
}

/// A candidate before typing: a user declaration or an already synthesized
/// generated signature.
enum CandidateDecl {
    User(AstId),
    Generated(SigId),
}

trait CandidateSource {
    fn signature(&self, ctx: &mut Ctx<'_>) -> Option<SigId>;
}

impl CandidateSource for CandidateDecl {
    fn signature(&self, ctx: &mut Ctx<'_>) -> Option<SigId> {
        match self {
            CandidateDecl::User(decl) => Some(ctx.signature_of(*decl)),
            CandidateDecl::Generated(sig) => Some(*sig),
        }
    }
}

impl CandidateSource for AstId {
    fn signature(&self, ctx: &mut Ctx<'_>) -> Option<SigId> {
        ctx.program
            .symbols
            .get(*self)
            .filter(|symbol| symbol.kind.is_function())
            .map(|_| ctx.signature_of(*self))
    }
}

impl<'c> Ctx<'c> {
    fn signature_of_quiet(&mut self, decl: AstId) -> SigId {
        if let Some(&sig) = self.tables.signatures.get(&decl) {
            return sig;
        }
        let sig = self.build_initial_signature(decl);
        self.tables.signatures.insert(decl, sig);
        sig
    }
}

/// The local view of a declaration mention: in-formals read as values,
/// const formals as consts, refs stay refs.
fn mention_kind(declared: QualifiedType) -> QualifiedType {
    match declared.kind {
        QtKind::In => declared.with_kind(QtKind::Var),
        QtKind::ConstIn => declared.with_kind(QtKind::Const),
        QtKind::Out | QtKind::Inout => declared.with_kind(QtKind::Var),
        _ => declared,
    }
}
