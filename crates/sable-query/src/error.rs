use std::fmt::Debug;

use thiserror::Error;

/// Fatal query failures. Everything recoverable travels as diagnostics in
/// query outputs instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError<R: Debug> {
    /// A request re-entered itself; the path runs from the first active
    /// occurrence back to the reentry.
    #[error("query cycle detected through {:?}", .path.first())]
    Cycle { path: Vec<R> },

    /// The context's cancellation token was set.
    #[error("analysis cancelled")]
    Cancelled,
}

impl<R: Debug> QueryError<R> {
    pub fn is_cycle(&self) -> bool {
        matches!(self, QueryError::Cycle { .. })
    }
}
