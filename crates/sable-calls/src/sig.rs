use std::collections::HashMap;

use derive_more::Display;
use sable_tree::AstId;
use sable_types::{ConversionKind, FormalDetail, QualifiedType, Substitution, WhereResult};
use sable_utils::{define_id, interner::StrKey};
use serde::{Deserialize, Serialize};

define_id!(
    /// Handle of one interned typed signature.
    SigId
);

/// Provenance of a typed signature.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum SignatureKind {
    User,
    GeneratedInit,
    GeneratedDeinit,
    GeneratedInitEq,
    GeneratedAccessor,
    OrderWrapper,
    DefaultWrapper,
    CoercionWrapper,
}

impl SignatureKind {
    pub fn is_compiler_generated(self) -> bool {
        !matches!(self, SignatureKind::User)
    }

    pub fn is_wrapper(self) -> bool {
        matches!(
            self,
            SignatureKind::OrderWrapper
                | SignatureKind::DefaultWrapper
                | SignatureKind::CoercionWrapper
        )
    }
}

/// A fully typed callable: formal details in order, return type and the
/// where-clause outcome. Interned in the [`SignatureStore`]; equal
/// substitutions of one generic share one id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypedSignature {
    /// The declaration this signature types; wrappers point at the callee
    /// they adapt.
    pub untyped: AstId,
    pub name: StrKey,
    pub kind: SignatureKind,
    pub is_method: bool,
    pub parenless: bool,
    pub formals: Vec<FormalDetail>,
    pub return_type: QualifiedType,
    pub where_result: WhereResult,
    pub needs_instantiation: bool,
    /// The substitution this signature was instantiated with, when it came
    /// out of the generic instantiator.
    pub instantiation: Option<Substitution>,
}

impl TypedSignature {
    pub fn is_compiler_generated(&self) -> bool {
        self.kind.is_compiler_generated()
    }

    pub fn arity(&self) -> usize {
        self.formals.len()
    }
}

/// Hash-consing store for typed signatures plus the wrapper memo table.
#[derive(Debug, Clone, Default)]
pub struct SignatureStore {
    slots: Vec<TypedSignature>,
    map: HashMap<TypedSignature, SigId>,
}

impl SignatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, sig: TypedSignature) -> SigId {
        if let Some(&id) = self.map.get(&sig) {
            return id;
        }
        let id = SigId::from_usize(self.slots.len());
        self.slots.push(sig.clone());
        self.map.insert(sig, id);
        id
    }

    pub fn get(&self, id: SigId) -> &TypedSignature {
        &self.slots[id.as_usize()]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SigId, &TypedSignature)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, sig)| (SigId::from_usize(index), sig))
    }

    /// Compiler-generated and wrapper signatures, for the backend listing.
    pub fn generated(&self) -> impl Iterator<Item = (SigId, &TypedSignature)> {
        self.iter().filter(|(_, sig)| sig.is_compiler_generated())
    }
}

/// The selected target of one resolved call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallTarget {
    pub sig: SigId,
    /// Conversion applied per formal, in formal order.
    pub conversions: Vec<ConversionKind>,
    /// Wrappers layered around the callee (order, default, coercion).
    pub wrappers: Vec<SigId>,
}

/// What resolution attached to one expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedExpression {
    pub qt: QualifiedType,
    /// Target declaration for identifier uses.
    pub to_id: Option<AstId>,
    /// Chosen candidate for call expressions.
    pub most_specific: Option<CallTarget>,
}

impl ResolvedExpression {
    pub fn of_type(qt: QualifiedType) -> Self {
        Self {
            qt,
            to_id: None,
            most_specific: None,
        }
    }
}

/// Resolution results of one analyzed symbol, dense by postorder index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionResult {
    by_post: Vec<Option<ResolvedExpression>>,
}

impl ResolutionResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, post: i32, resolved: ResolvedExpression) {
        if post < 0 {
            return;
        }
        let index = post as usize;
        if self.by_post.len() <= index {
            self.by_post.resize(index + 1, None);
        }
        self.by_post[index] = Some(resolved);
    }

    pub fn get(&self, post: i32) -> Option<&ResolvedExpression> {
        if post < 0 {
            return None;
        }
        self.by_post.get(post as usize).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.by_post.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_post.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &ResolvedExpression)> {
        self.by_post
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|re| (index as i32, re)))
    }
}

impl std::hash::Hash for ResolutionResult {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for (post, resolved) in self.iter() {
            post.hash(state);
            resolved.hash(state);
        }
    }
}
