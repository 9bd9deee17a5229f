use sable_span::{Diagnostic, ErrorKind, Loc};
use thiserror::Error;

/// Typed resolution failures; converted into [`Diagnostic`] at the report
/// boundary so the machine-readable part survives.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    #[error("'{name}' is not declared in this scope")]
    UndeclaredIdentifier { name: String, loc: Loc },

    #[error("'{name}' is already defined")]
    DuplicateDefinition {
        name: String,
        loc: Loc,
        previous: Loc,
    },

    #[error("cannot use '{name}': no module with that name is in the program")]
    UnresolvedUse { name: String, loc: Loc },
}

impl From<ResolveError> for Diagnostic {
    fn from(error: ResolveError) -> Self {
        match &error {
            ResolveError::UndeclaredIdentifier { name, loc } => Diagnostic::error(
                ErrorKind::UndeclaredIdentifier,
                *loc,
                format!("'{name}' is not declared in this scope"),
            ),
            ResolveError::DuplicateDefinition {
                name,
                loc,
                previous,
            } => Diagnostic::error(
                ErrorKind::DuplicateDefinition,
                *loc,
                format!("'{name}' is already defined"),
            )
            .with_trace([(format!("'{name}' was first defined here"), *previous)]),
            ResolveError::UnresolvedUse { name, loc } => Diagnostic::error(
                ErrorKind::UndeclaredIdentifier,
                *loc,
                format!("cannot use '{name}': no module with that name is in the program"),
            ),
        }
    }
}
