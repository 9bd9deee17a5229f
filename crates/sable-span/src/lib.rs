//! Source positions, source text management, and diagnostics.
//!
//! Important concepts in this module include:
//!
//! - the *span*, represented by [`Span`], and its source-scoped form [`Loc`];
//! - source text registered with a [`SourceManager`];
//! - analysis findings carried as [`Diagnostic`] values.

mod diag;
mod loc;
mod source;
mod span;

pub use diag::{Diagnostic, ErrorKind, Report, Severity};
pub use loc::{Loc, Located};
pub use source::{Source, SourceId, SourceManager};
pub use span::Span;
