use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use sable_calls::ResolutionResult;
use sable_resolver::{NameBindings, Program};
use sable_span::SourceId;
use sable_tree::{Ast, AstId};

use crate::artifact::ResolvedArtifact;

/// The closed request sum the driver dispatches on. Every analysis result
/// is the output of exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Request {
    /// Host input: the registered source ids, in registration order.
    SourceList,
    /// Host input: the text of one source.
    FileText(SourceId),
    Parse(SourceId),
    /// Scope graph, symbol table and module partition over all modules.
    Program,
    /// Identifier bindings of one module (by program module index).
    BindModule(u32),
    /// Typed resolution of one module's init statements.
    ResolveModuleInit(u32),
    /// Typed resolution of one function body.
    ResolveFunction(AstId),
    /// Emit-ready artifact of one module, after the instantiation fixed
    /// point and init/deinit analysis.
    Artifact(u32),
}

/// Query outputs. Hashing is structural so the engine can fingerprint
/// dependencies; interned ids hash as their keys.
#[derive(Debug, Clone)]
pub enum Output {
    Ids(Vec<SourceId>),
    Text(Arc<str>),
    Asts(Rc<Vec<Ast>>),
    Program(Rc<Program>),
    Bindings(Rc<NameBindings>),
    Resolution(Rc<ResolutionResult>),
    Artifact(Rc<ResolvedArtifact>),
}

impl Output {
    pub fn as_text(&self) -> Option<&Arc<str>> {
        match self {
            Output::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_asts(&self) -> Option<&Rc<Vec<Ast>>> {
        match self {
            Output::Asts(asts) => Some(asts),
            _ => None,
        }
    }

    pub fn as_program(&self) -> Option<&Rc<Program>> {
        match self {
            Output::Program(program) => Some(program),
            _ => None,
        }
    }

    pub fn as_bindings(&self) -> Option<&Rc<NameBindings>> {
        match self {
            Output::Bindings(bindings) => Some(bindings),
            _ => None,
        }
    }

    pub fn as_resolution(&self) -> Option<&Rc<ResolutionResult>> {
        match self {
            Output::Resolution(result) => Some(result),
            _ => None,
        }
    }

    pub fn as_artifact(&self) -> Option<&Rc<ResolvedArtifact>> {
        match self {
            Output::Artifact(artifact) => Some(artifact),
            _ => None,
        }
    }
}

impl Hash for Output {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Output::Ids(ids) => {
                0u8.hash(state);
                ids.hash(state);
            }
            Output::Text(text) => {
                1u8.hash(state);
                text.as_ref().hash(state);
            }
            Output::Asts(asts) => {
                2u8.hash(state);
                state.write_usize(asts.len());
                for ast in asts.iter() {
                    ast.structural_hash(ast.root()).hash(state);
                }
            }
            Output::Program(program) => {
                3u8.hash(state);
                state.write_usize(program.scopes.len());
                state.write_usize(program.symbols.len());
                for parts in &program.modules {
                    parts.module.hash(state);
                    parts.globals.hash(state);
                    parts.init_stmts.hash(state);
                }
            }
            Output::Bindings(bindings) => {
                4u8.hash(state);
                let mut entries: Vec<_> = bindings.iter().collect();
                entries.sort_by_key(|(node, _)| *node);
                for (node, target) in entries {
                    node.hash(state);
                    target.hash(state);
                }
            }
            Output::Resolution(result) => {
                5u8.hash(state);
                result.hash(state);
            }
            Output::Artifact(artifact) => {
                6u8.hash(state);
                artifact.hash(state);
            }
        }
    }
}
