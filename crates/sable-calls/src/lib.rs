//! Call resolution.
//!
//! Candidate gathering, formal/actual mapping, wrapper synthesis,
//! disambiguation, compiler-generated methods and generic instantiation.
//! The [`BodyResolver`] drives typed resolution of one symbol's body and
//! produces the [`ResolutionResult`] consumed by the init/deinit analyzer
//! and the backend.

mod candidate;
mod error;
mod fields;
mod generated;
mod instantiate;
mod resolve;
mod shape;
mod sig;

pub use candidate::{
    map_actuals, most_specific, Binding, CallShape, Candidate, Disambiguation, FormalActualMap,
};
pub use error::CallError;
pub use fields::{field_named, fields_for_type_decl, is_name_of_field, FieldInfo};
pub use generated::{
    generated_signature, is_name_of_compiler_generated_method, need_compiler_generated_method,
};
pub use instantiate::{instantiate_signature, InstantiatedFn};
pub use resolve::{formal_decl_id, BodyResolver, CallTables, Ctx};
pub use shape::{synthesize_wrappers, ShapeKey};
pub use sig::{
    CallTarget, ResolutionResult, ResolvedExpression, SigId, SignatureKind, SignatureStore,
    TypedSignature,
};
