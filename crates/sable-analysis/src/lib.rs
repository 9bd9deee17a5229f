//! Init/deinit analysis.
//!
//! Runs after call resolution over one resolved region: detects
//! split-initialized variables with a forward dataflow (merge is path
//! intersection), elides dead copies into moves, classifies assignment
//! lowering, and schedules end-of-scope cleanup actions in reverse
//! declaration order with `defer` bodies interleaved.

mod analyzer;
mod frames;
mod split;

pub use analyzer::{analyze_region, AssignLowering, InitDeinitResult};
pub use frames::{Action, ActionKind, ScopeFrame};
pub use split::{last_reads, split_inits, SplitOutcome, SplitState};
