use std::hash::{Hash, Hasher};
use std::rc::Rc;

use sable_analysis::InitDeinitResult;
use sable_calls::{ResolutionResult, SigId, TypedSignature};
use sable_tree::AstId;

/// The emit-ready product of one module: post-resolution results for every
/// region, the analyzer's action schedule, and the compiler-generated and
/// wrapper signatures the backend must also emit.
#[derive(Debug, Clone)]
pub struct ResolvedArtifact {
    pub module: AstId,
    /// resolution of the synthetic `__init_<module>` body
    pub init_resolution: Rc<ResolutionResult>,
    /// per-function results, in declaration order
    pub functions: Vec<(AstId, Rc<ResolutionResult>)>,
    /// instantiated bodies, one per typed signature
    pub instantiated: Vec<(SigId, Rc<ResolutionResult>)>,
    /// init/deinit schedules per region symbol
    pub init_deinit: Vec<(AstId, Rc<InitDeinitResult>)>,
    /// every typed signature minted while resolving this module, addressed
    /// by the [`SigId`]s stored in call targets
    pub signatures: Vec<(SigId, TypedSignature)>,
    /// compiler-generated methods and wrappers
    pub generated: Vec<(SigId, TypedSignature)>,
}

impl ResolvedArtifact {
    pub fn resolution_for(&self, region: AstId) -> Option<&Rc<ResolutionResult>> {
        if region == self.module {
            return Some(&self.init_resolution);
        }
        self.functions
            .iter()
            .find(|(decl, _)| *decl == region)
            .map(|(_, result)| result)
    }

    pub fn signature(&self, sig: SigId) -> Option<&TypedSignature> {
        self.signatures
            .iter()
            .find(|(id, _)| *id == sig)
            .map(|(_, data)| data)
    }
}

impl PartialEq for ResolvedArtifact {
    fn eq(&self, other: &Self) -> bool {
        self.module == other.module
            && self.init_resolution == other.init_resolution
            && self.functions == other.functions
            && self.generated == other.generated
    }
}

impl Hash for ResolvedArtifact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.module.hash(state);
        self.init_resolution.hash(state);
        for (decl, result) in &self.functions {
            decl.hash(state);
            result.hash(state);
        }
        for (sig, result) in &self.instantiated {
            sig.hash(state);
            result.hash(state);
        }
        for (sig, data) in &self.signatures {
            sig.hash(state);
            data.hash(state);
        }
        for (sig, data) in &self.generated {
            sig.hash(state);
            data.hash(state);
        }
        for (region, analysis) in &self.init_deinit {
            region.hash(state);
            // hash the stable parts in a deterministic order
            let mut split: Vec<_> = analysis.split_inited.iter().collect();
            split.sort();
            split.hash(state);
            let mut elided: Vec<_> = analysis.elided_copies.iter().collect();
            elided.sort();
            elided.hash(state);
            for (scope, actions) in &analysis.actions_at {
                scope.hash(state);
                actions.hash(state);
            }
        }
    }
}
