use sable_span::{Diagnostic, ErrorKind, Loc};
use thiserror::Error;

/// Typed call-resolution failures; the candidate lists survive into the
/// diagnostic payload.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CallError {
    #[error("ambiguous call to '{name}'")]
    AmbiguousCall {
        name: String,
        loc: Loc,
        candidates: Vec<String>,
    },

    #[error("no matching candidate for call to '{name}'")]
    NoMatchingCandidate {
        name: String,
        loc: Loc,
        rejected: Vec<String>,
    },

    #[error("cannot pass '{actual}' to 'const ref' formal '{formal}' of '{name}'")]
    ConstRefCoercion {
        name: String,
        formal: String,
        actual: String,
        loc: Loc,
    },

    #[error("type mismatch: expected '{expected}', found '{found}'")]
    TypeMismatch {
        expected: String,
        found: String,
        loc: Loc,
    },

    #[error("cannot instantiate '{name}'")]
    GenericInstantiationFailure { name: String, loc: Loc },

    #[error("function '{name}' declares a return type but has no return statement")]
    MissingReturn { name: String, loc: Loc },

    #[error("invalid primitive type expression")]
    InvalidPrimitive { loc: Loc },
}

impl From<CallError> for Diagnostic {
    fn from(error: CallError) -> Self {
        let message = error.to_string();
        match error {
            CallError::AmbiguousCall {
                loc, candidates, ..
            } => Diagnostic::error(ErrorKind::AmbiguousCall, loc, message)
                .with_payload(serde_json::json!({ "candidates": candidates })),
            CallError::NoMatchingCandidate { loc, rejected, .. } => {
                Diagnostic::error(ErrorKind::NoMatchingCandidate, loc, message)
                    .with_payload(serde_json::json!({ "rejected": rejected }))
            }
            CallError::ConstRefCoercion { loc, .. } => {
                Diagnostic::error(ErrorKind::ConstRefCoercion, loc, message)
            }
            CallError::TypeMismatch { loc, .. } => {
                Diagnostic::error(ErrorKind::TypeMismatch, loc, message)
            }
            CallError::GenericInstantiationFailure { loc, .. } => {
                Diagnostic::error(ErrorKind::GenericInstantiationFailure, loc, message)
            }
            CallError::MissingReturn { loc, .. } => {
                Diagnostic::error(ErrorKind::MissingReturn, loc, message)
            }
            CallError::InvalidPrimitive { loc } => {
                Diagnostic::error(ErrorKind::InvalidPrimitive, loc, message)
            }
        }
    }
}
