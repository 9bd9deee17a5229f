use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use camino::Utf8Path;
use sable_analysis::analyze_region;
use sable_calls::{BodyResolver, CallTables, Ctx, InstantiatedFn};
use sable_query::{Engine, QueryDispatch, QueryError, Revision};
use sable_resolver::{bind_symbol, build_scopes, Program};
use sable_span::{Diagnostic, ErrorKind, Loc, Report, SourceId, SourceManager, Span};
use sable_tree::node::Node;
use sable_tree::{Ast, AstId};
use sable_types::TypeInterner;
use sable_utils::interner::{StrInterner, StrKey};

use crate::artifact::ResolvedArtifact;
use crate::parser::ParseSource;
use crate::request::{Output, Request};

/// Upper bound on instantiation rounds per artifact; reaching it means a
/// generic keeps producing fresh instantiations of itself.
const MAX_INSTANTIATION_ROUNDS: usize = 128;

/// The sequential owner of everything: interners, sources, query caches
/// and per-revision resolution state. Sharing across contexts is by copy.
pub struct Context {
    engine: Engine<Dispatcher>,
    inner: Dispatcher,
    /// installed report sink; stderr rendering is the default
    handler: Option<Box<dyn FnMut(&Diagnostic)>>,
    flushed: usize,
}

struct Dispatcher {
    strings: StrInterner,
    types: TypeInterner,
    sources: SourceManager,
    parser: Box<dyn ParseSource>,
    report: Report,
    tables: CallTables,
    prepare_to_gc: bool,
}

impl Context {
    pub fn new(parser: impl ParseSource + 'static) -> Self {
        Self {
            engine: Engine::new(),
            inner: Dispatcher {
                strings: StrInterner::new(),
                types: TypeInterner::new(),
                sources: SourceManager::new(),
                parser: Box::new(parser),
                report: Report::new(),
                tables: CallTables::new(),
                prepare_to_gc: false,
            },
            handler: None,
            flushed: 0,
        }
    }

    /// Installs a report sink; every diagnostic produced from now on flows
    /// through it instead of the default stderr rendering. The handler
    /// lives as long as the context.
    pub fn set_error_handler(&mut self, handler: impl FnMut(&Diagnostic) + 'static) {
        self.handler = Some(Box::new(handler));
    }

    /// Feeds diagnostics accumulated since the last flush to the installed
    /// handler, or renders them to stderr when none is installed. Capture
    /// frames bypass this entirely.
    pub fn flush_diagnostics(&mut self) {
        let diagnostics = self.inner.report.diagnostics();
        let fresh = &diagnostics[self.flushed.min(diagnostics.len())..];
        match self.handler.as_mut() {
            Some(handler) => {
                for diagnostic in fresh {
                    handler(diagnostic);
                }
            }
            None => {
                for diagnostic in fresh {
                    let _ = diagnostic.eprint(&self.inner.sources);
                }
            }
        }
        self.flushed = diagnostics.len();
    }

    /// Registers or replaces the text of one source file. Subsequent
    /// queries recompute whatever depended on it.
    pub fn set_file_text(&mut self, path: impl AsRef<Utf8Path>, text: impl Into<Arc<str>>) {
        let text = text.into();
        let id = self.inner.sources.set_text(path, text.clone());
        self.engine.set_input(Request::FileText(id), Output::Text(text));
        let ids: Vec<SourceId> = self.inner.sources.ids().collect();
        self.engine.set_input(Request::SourceList, Output::Ids(ids));
    }

    /// Ticks the revision counter; every cached entry becomes stale and is
    /// either reused (dependencies unchanged) or recomputed on access.
    pub fn advance_to_next_revision(&mut self, prepare_to_gc: bool) {
        self.engine.advance_to_next_revision();
        self.inner.prepare_to_gc = prepare_to_gc;
        // per-revision working state; the engine carries reuse across
        self.inner.tables = CallTables::new();
    }

    pub fn revision(&self) -> Revision {
        self.engine.revision()
    }

    /// Count of query-function executions, for reuse assertions.
    pub fn executions(&self) -> u64 {
        self.engine.executions()
    }

    /// Cooperative cancellation; checked at query entry.
    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.engine.set_cancelled(cancelled);
    }

    pub fn strings(&self) -> &StrInterner {
        &self.inner.strings
    }

    pub fn strings_mut(&mut self) -> &mut StrInterner {
        &mut self.inner.strings
    }

    pub fn types(&self) -> &TypeInterner {
        &self.inner.types
    }

    pub fn report(&self) -> &Report {
        &self.inner.report
    }

    /// Opens a capture frame: diagnostics reported until the matching
    /// [`Context::pop_capture_frame`] collect into the returned list
    /// instead of the context's report.
    pub fn push_capture_frame(&mut self) {
        self.inner.report.push_frame();
    }

    pub fn pop_capture_frame(&mut self) -> Vec<Diagnostic> {
        self.inner.report.pop_frame()
    }

    /// Renders every accumulated diagnostic to stderr.
    pub fn print_diagnostics(&self) -> std::io::Result<()> {
        self.inner.report.eprint(&self.inner.sources)
    }

    pub fn query(&mut self, request: Request) -> Result<Output, QueryError<Request>> {
        self.engine.query(&mut self.inner, &request)
    }

    pub fn program(&mut self) -> Result<Rc<Program>, QueryError<Request>> {
        let output = self.query(Request::Program)?;
        Ok(output.as_program().expect("program output").clone())
    }

    pub fn artifact(&mut self, module: u32) -> Result<Rc<ResolvedArtifact>, QueryError<Request>> {
        let output = self.query(Request::Artifact(module))?;
        Ok(output.as_artifact().expect("artifact output").clone())
    }

    /// Runs the full pipeline over every module. `Ok` carries the
    /// artifacts; the run counts as failed when any error-severity
    /// diagnostic was produced.
    pub fn compile(&mut self) -> Result<Vec<Rc<ResolvedArtifact>>, QueryError<Request>> {
        let program = self.program()?;
        let mut artifacts = Vec::new();
        for index in 0..program.modules.len() {
            artifacts.push(self.artifact(index as u32)?);
        }
        self.flush_diagnostics();
        Ok(artifacts)
    }

    pub fn has_errors(&self) -> bool {
        self.inner.report.has_errors()
    }

    /// Sweeps interned strings and types unreachable from cached outputs.
    /// Runs only after a revision advance with `prepare_to_gc`, and never
    /// while a query executes.
    pub fn collect_garbage(&mut self) {
        assert!(
            !self.engine.is_executing(),
            "garbage collection during query execution"
        );
        if !self.inner.prepare_to_gc {
            log::debug!("collect_garbage without prepare_to_gc; skipping sweep");
            return;
        }
        self.inner.prepare_to_gc = false;

        let mut live_strings: HashSet<StrKey> = HashSet::new();
        let mut live_types = HashSet::new();

        for output in self.engine.outputs() {
            mark_output(
                output,
                &self.inner.types,
                &mut live_strings,
                &mut live_types,
            );
        }

        // the current revision's working set stays live
        for (_, sig) in self.inner.tables.sigs.iter() {
            live_strings.insert(sig.name);
            live_strings.insert(sig.untyped.path);
            for formal in &sig.formals {
                live_strings.insert(formal.name);
                self.inner.types.mark(formal.qt.ty, &mut live_types);
            }
            self.inner.types.mark(sig.return_type.ty, &mut live_types);
        }
        for qt in self.inner.tables.decl_types.values() {
            self.inner.types.mark(qt.ty, &mut live_types);
        }
        for (&decl, &ty) in &self.inner.tables.aggregate_types {
            live_strings.insert(decl.path);
            self.inner.types.mark(ty, &mut live_types);
        }

        let swept_strings = self
            .inner
            .strings
            .sweep(|key| live_strings.contains(&key));
        let swept_types = self.inner.types.sweep(|id| live_types.contains(&id));
        log::debug!("collected {swept_strings} strings, {swept_types} types");
    }
}

fn mark_output(
    output: &Output,
    types: &TypeInterner,
    live_strings: &mut HashSet<StrKey>,
    live_types: &mut HashSet<sable_types::TypeId>,
) {
    match output {
        Output::Ids(_) | Output::Text(_) => {}
        Output::Asts(asts) => {
            for ast in asts.iter() {
                mark_ast(ast, live_strings);
            }
        }
        Output::Program(program) => {
            for ast in &program.asts {
                mark_ast(ast, live_strings);
            }
            for (_, scope) in program.scopes.iter() {
                live_strings.insert(scope.created_by.path);
                for (name, decls) in scope.declarations() {
                    live_strings.insert(name);
                    for decl in decls {
                        live_strings.insert(decl.path);
                    }
                }
            }
        }
        Output::Bindings(bindings) => {
            for (_, target) in bindings.iter() {
                if let sable_resolver::NameTarget::Decl(decl) = target {
                    live_strings.insert(decl.path);
                }
            }
        }
        Output::Resolution(result) => mark_resolution(result, types, live_strings, live_types),
        Output::Artifact(artifact) => {
            live_strings.insert(artifact.module.path);
            mark_resolution(&artifact.init_resolution, types, live_strings, live_types);
            for (decl, result) in &artifact.functions {
                live_strings.insert(decl.path);
                mark_resolution(result, types, live_strings, live_types);
            }
            for (_, result) in &artifact.instantiated {
                mark_resolution(result, types, live_strings, live_types);
            }
            for (_, sig) in &artifact.generated {
                live_strings.insert(sig.name);
                for formal in &sig.formals {
                    live_strings.insert(formal.name);
                    types.mark(formal.qt.ty, live_types);
                }
                types.mark(sig.return_type.ty, live_types);
            }
        }
    }
}

fn mark_resolution(
    result: &sable_calls::ResolutionResult,
    types: &TypeInterner,
    live_strings: &mut HashSet<StrKey>,
    live_types: &mut HashSet<sable_types::TypeId>,
) {
    for (_, resolved) in result.iter() {
        types.mark(resolved.qt.ty, live_types);
        if let Some(to_id) = resolved.to_id {
            live_strings.insert(to_id.path);
        }
    }
    // strings referenced by live types stay as well
    for &ty in live_types.iter() {
        if let Some(data) = types.try_get(ty) {
            live_strings.extend(data.referenced_strings());
        }
    }
}

fn mark_ast(ast: &Ast, live_strings: &mut HashSet<StrKey>) {
    for (id, node) in ast.iter() {
        live_strings.insert(ast.ast_id(id).path);
        if let Some(name) = node.decl_name() {
            live_strings.insert(name);
        }
        match node {
            Node::Identifier(identifier) => {
                live_strings.insert(identifier.name);
            }
            Node::OpCall(op) => {
                live_strings.insert(op.op);
            }
            Node::Dot(dot) => {
                live_strings.insert(dot.field);
            }
            Node::Label(label) => {
                live_strings.insert(label.name);
            }
            Node::Literal(sable_tree::node::Literal::Str(key)) => {
                live_strings.insert(*key);
            }
            Node::Call(call) => {
                live_strings.extend(call.actual_names.iter().flatten().copied());
            }
            _ => {}
        }
    }
}

impl QueryDispatch for Dispatcher {
    type Request = Request;
    type Output = Output;

    fn execute(
        &mut self,
        engine: &mut Engine<Self>,
        request: &Request,
    ) -> Result<Output, QueryError<Request>> {
        log::trace!("executing {request:?}");
        match request {
            Request::SourceList => Ok(Output::Ids(self.sources.ids().collect())),
            Request::FileText(id) => {
                let text = self
                    .sources
                    .text(*id)
                    .cloned()
                    .unwrap_or_else(|| Arc::from(""));
                Ok(Output::Text(text))
            }
            Request::Parse(id) => {
                let text = engine
                    .query(self, &Request::FileText(*id))?
                    .as_text()
                    .expect("text output")
                    .clone();
                let path = self
                    .sources
                    .path(*id)
                    .map(|path| path.to_owned())
                    .unwrap_or_default();
                let asts =
                    self.parser
                        .parse(&path, &text, &mut self.strings, &mut self.report);
                Ok(Output::Asts(Rc::new(asts)))
            }
            Request::Program => {
                let ids = match engine.query(self, &Request::SourceList)? {
                    Output::Ids(ids) => ids,
                    _ => Vec::new(),
                };
                let mut asts = Vec::new();
                for id in ids {
                    let parsed = engine.query(self, &Request::Parse(id))?;
                    asts.extend(parsed.as_asts().expect("ast output").iter().cloned());
                }
                let program = build_scopes(asts, &mut self.strings, &mut self.report);
                Ok(Output::Program(Rc::new(program)))
            }
            Request::BindModule(index) => {
                let program = engine
                    .query(self, &Request::Program)?
                    .as_program()
                    .expect("program output")
                    .clone();
                let Some(parts) = program.modules.get(*index as usize).cloned() else {
                    return Ok(Output::Bindings(Rc::new(Default::default())));
                };
                let Some((ast, root)) = program.ast_for(&self.strings, parts.module) else {
                    return Ok(Output::Bindings(Rc::new(Default::default())));
                };
                let ast = ast.clone();
                let bindings = Rc::new(bind_symbol(
                    &program,
                    &ast,
                    root,
                    parts.scope,
                    &self.strings,
                    &mut self.report,
                ));
                self.tables.bindings.insert(parts.module, bindings.clone());
                Ok(Output::Bindings(bindings))
            }
            Request::ResolveModuleInit(index) => {
                let program = self.bound_program(engine)?;
                let result = {
                    let mut ctx = self.ctx(&program);
                    BodyResolver::resolve_module_init(&mut ctx, *index as usize)
                };
                Ok(Output::Resolution(Rc::new(result)))
            }
            Request::ResolveFunction(decl) => {
                let program = self.bound_program(engine)?;
                let result = {
                    let mut ctx = self.ctx(&program);
                    BodyResolver::resolve_function(&mut ctx, *decl)
                };
                Ok(Output::Resolution(result))
            }
            Request::Artifact(index) => self.build_artifact(engine, *index),
        }
    }
}

impl Dispatcher {
    fn ctx<'a>(&'a mut self, program: &'a Program) -> Ctx<'a> {
        Ctx {
            program,
            strings: &mut self.strings,
            types: &mut self.types,
            tables: &mut self.tables,
            report: &mut self.report,
        }
    }

    /// The program with every module's bindings materialized in the
    /// resolution tables.
    fn bound_program(
        &mut self,
        engine: &mut Engine<Self>,
    ) -> Result<Rc<Program>, QueryError<Request>> {
        let program = engine
            .query(self, &Request::Program)?
            .as_program()
            .expect("program output")
            .clone();
        for index in 0..program.modules.len() {
            let bound = engine.query(self, &Request::BindModule(index as u32))?;
            // re-seed the per-revision tables even when the binding query
            // was reused from a previous revision
            if let Some(bindings) = bound.as_bindings() {
                let module_id = program.modules[index].module;
                self.tables.bindings.insert(module_id, bindings.clone());
            }
        }
        Ok(program)
    }

    fn build_artifact(
        &mut self,
        engine: &mut Engine<Self>,
        index: u32,
    ) -> Result<Output, QueryError<Request>> {
        let program = self.bound_program(engine)?;
        let Some(parts) = program.modules.get(index as usize).cloned() else {
            return Ok(Output::Artifact(Rc::new(ResolvedArtifact {
                module: AstId::symbol_root(self.strings.intern("<missing>")),
                init_resolution: Rc::new(Default::default()),
                functions: Vec::new(),
                instantiated: Vec::new(),
                init_deinit: Vec::new(),
                signatures: Vec::new(),
                generated: Vec::new(),
            })));
        };

        let init_resolution = engine
            .query(self, &Request::ResolveModuleInit(index))?
            .as_resolution()
            .expect("resolution output")
            .clone();

        let Some((ast, _)) = program.ast_for(&self.strings, parts.module) else {
            return Ok(Output::Artifact(Rc::new(ResolvedArtifact {
                module: parts.module,
                init_resolution,
                functions: Vec::new(),
                instantiated: Vec::new(),
                init_deinit: Vec::new(),
                signatures: Vec::new(),
                generated: Vec::new(),
            })));
        };
        let ast = ast.clone();

        // every function declared anywhere in the module
        let mut functions = Vec::new();
        for (node, data) in ast.iter() {
            if matches!(data, Node::Function(_)) {
                let decl = ast.ast_id(node);
                let result = engine
                    .query(self, &Request::ResolveFunction(decl))?
                    .as_resolution()
                    .expect("resolution output")
                    .clone();
                functions.push((decl, result));
            }
        }

        // instantiation fixed point: resolving a body may surface new
        // instantiations; the set strictly grows and repeats are memoized
        let mut instantiated = Vec::new();
        let mut rounds = 0;
        loop {
            let pending: Vec<InstantiatedFn> = std::mem::take(&mut self.tables.pending);
            if pending.is_empty() {
                break;
            }
            rounds += 1;
            if rounds > MAX_INSTANTIATION_ROUNDS {
                self.report.add(Diagnostic::error(
                    ErrorKind::GenericInstantiationFailure,
                    Loc::new(SourceId::new(0), Span::new(0, 0)),
                    "generic instantiation does not terminate",
                ));
                break;
            }
            for instance in pending {
                let result = {
                    let mut ctx = self.ctx(&program);
                    BodyResolver::resolve_function_with(
                        &mut ctx,
                        instance.origin,
                        instance.subs.clone(),
                    )
                };
                instantiated.push((instance.sig, result));
            }
        }

        // init/deinit over the module init region and every function body
        let mut init_deinit = Vec::new();
        {
            let mut roots = parts.globals.clone();
            roots.extend(parts.init_stmts.iter().copied());
            let analysis = analyze_region(
                &ast,
                parts.module.path,
                parts.root,
                &roots,
                &init_resolution,
                &self.tables.sigs,
                &self.types,
                &self.strings,
                &mut self.report,
            );
            init_deinit.push((parts.module, Rc::new(analysis)));
        }
        for (decl, result) in &functions {
            let Some(node) = ast.find(*decl) else {
                continue;
            };
            let Some(body) = ast.node(node).as_function().and_then(|f| f.body) else {
                continue;
            };
            let analysis = analyze_region(
                &ast,
                decl.path,
                body,
                &[body],
                result,
                &self.tables.sigs,
                &self.types,
                &self.strings,
                &mut self.report,
            );
            init_deinit.push((*decl, Rc::new(analysis)));
        }

        let signatures: Vec<_> = self
            .tables
            .sigs
            .iter()
            .map(|(sig, data)| (sig, data.clone()))
            .collect();
        let generated = signatures
            .iter()
            .filter(|(_, data)| data.is_compiler_generated())
            .cloned()
            .collect();

        Ok(Output::Artifact(Rc::new(ResolvedArtifact {
            module: parts.module,
            init_resolution,
            functions,
            instantiated,
            init_deinit,
            signatures,
            generated,
        })))
    }
}
