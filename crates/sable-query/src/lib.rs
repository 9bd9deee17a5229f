//! Revision-scoped memoization.
//!
//! Every analysis result is the output of a query: a request value from a
//! closed sum, dispatched by the driver. The engine memoizes outputs per
//! revision, records the dependencies observed during execution, and reuses
//! a stale entry when all of its dependencies reproduce their previous
//! outputs. Reentering an active request is a cycle, never a deadlock.

mod engine;
mod error;

pub use engine::{Engine, QueryDispatch, Revision};
pub use error::QueryError;
