use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Monotonic revision counter; one logical compilation state.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Revision(u64);

impl Revision {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// The driver side of the engine: a closed request sum and the function
/// that computes one output. Nested queries go back through the engine so
/// they are recorded as dependencies.
pub trait QueryDispatch {
    type Request: Clone + Eq + Hash + Debug;
    type Output: Clone + Hash;

    fn execute(
        &mut self,
        engine: &mut Engine<Self>,
        request: &Self::Request,
    ) -> Result<Self::Output, QueryError<Self::Request>>;
}

#[derive(Debug, Clone)]
struct Slot<R, O> {
    output: O,
    fingerprint: u64,
    /// dependencies in observation order, with the output fingerprint seen
    deps: Vec<(R, u64)>,
    /// revision the entry was last validated in
    checked_at: Revision,
    /// revision the output last actually changed in
    changed_at: Revision,
    /// host-fed input slot; only `set_input` ever changes it
    is_input: bool,
}

#[derive(Debug)]
struct Frame<R> {
    request: R,
    deps: Vec<(R, u64)>,
}

/// The memo table plus the active-query stack.
pub struct Engine<D: QueryDispatch + ?Sized> {
    slots: HashMap<D::Request, Slot<D::Request, D::Output>>,
    active: Vec<Frame<D::Request>>,
    revision: Revision,
    executions: u64,
    cancelled: bool,
}

impl<D: QueryDispatch + ?Sized> Default for Engine<D> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
            active: Vec::new(),
            revision: Revision::default(),
            executions: 0,
            cancelled: false,
        }
    }
}

impl<D: QueryDispatch + ?Sized> Engine<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Count of actual query-function executions, across all revisions.
    /// After a no-change revision a full re-query leaves this untouched.
    pub fn executions(&self) -> u64 {
        self.executions
    }

    pub fn is_executing(&self) -> bool {
        !self.active.is_empty()
    }

    /// Sets the cooperative cancellation token; checked at query entry.
    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }

    /// Ticks the revision counter, logically marking every entry stale.
    /// Must not be called while a query executes.
    pub fn advance_to_next_revision(&mut self) {
        assert!(
            self.active.is_empty(),
            "revision advanced while a query is executing"
        );
        self.revision = self.revision.next();
        log::debug!("advanced to revision {}", self.revision.raw());
    }

    /// Marks an input request as changed in the current revision, so
    /// entries depending on it recompute. Inputs are queries whose body
    /// reads host-provided state (file text).
    pub fn set_input(&mut self, request: D::Request, output: D::Output) {
        let fingerprint = fingerprint_of(&output);
        let changed_at = match self.slots.get(&request) {
            Some(slot) if slot.fingerprint == fingerprint => slot.changed_at,
            _ => self.revision,
        };
        self.slots.insert(
            request,
            Slot {
                output,
                fingerprint,
                deps: Vec::new(),
                checked_at: self.revision,
                changed_at,
                is_input: true,
            },
        );
    }

    /// Cached outputs, for GC marking. Stale entries are included: they may
    /// still be promoted by a later verification pass.
    pub fn outputs(&self) -> impl Iterator<Item = &D::Output> {
        self.slots.values().map(|slot| &slot.output)
    }

    /// Drops every cached entry. Used by hosts that want a cold start
    /// without rebuilding the context.
    pub fn clear(&mut self) {
        assert!(self.active.is_empty(), "cleared while a query is executing");
        self.slots.clear();
    }

    /// Executes or reuses the query for `request`.
    pub fn query(
        &mut self,
        dispatcher: &mut D,
        request: &D::Request,
    ) -> Result<D::Output, QueryError<D::Request>> {
        if self.cancelled {
            return Err(QueryError::Cancelled);
        }

        if let Some(position) = self
            .active
            .iter()
            .position(|frame| frame.request == *request)
        {
            let mut path: Vec<D::Request> = self.active[position..]
                .iter()
                .map(|frame| frame.request.clone())
                .collect();
            path.push(request.clone());
            return Err(QueryError::Cycle { path });
        }

        // live entry; an input slot is stale only when set_input said so,
        // which makes a quiet revision advance free of executions
        if let Some(slot) = self.slots.get_mut(request) {
            if slot.checked_at == self.revision || slot.is_input {
                slot.checked_at = self.revision;
                let (output, fingerprint) = (slot.output.clone(), slot.fingerprint);
                self.record_dep(request, fingerprint);
                return Ok(output);
            }
        }

        self.active.push(Frame {
            request: request.clone(),
            deps: Vec::new(),
        });

        // stale entry: verify dependencies in observation order and promote
        // the old output when none of them changed
        if let Some(slot) = self.slots.get(request) {
            let deps = slot.deps.clone();
            // vacuously unchanged when the dependency set is empty
            let mut unchanged = true;
            for (dep, seen) in &deps {
                match self.query(dispatcher, dep) {
                    Ok(output) => {
                        if fingerprint_of(&output) != *seen {
                            unchanged = false;
                            break;
                        }
                    }
                    Err(error @ QueryError::Cancelled) => {
                        self.active.pop();
                        return Err(error);
                    }
                    Err(QueryError::Cycle { .. }) => {
                        unchanged = false;
                        break;
                    }
                }
            }

            if unchanged {
                self.active.pop();
                let slot = self.slots.get_mut(request).expect("slot vanished");
                slot.checked_at = self.revision;
                let (output, fingerprint) = (slot.output.clone(), slot.fingerprint);
                self.record_dep(request, fingerprint);
                log::trace!("reused {request:?} across revision");
                return Ok(output);
            }

            // verification touched sub-queries; they are not this entry's
            // dependencies unless execution observes them again
            self.active
                .last_mut()
                .expect("active frame vanished")
                .deps
                .clear();
        }

        self.executions += 1;
        let result = dispatcher.execute(self, request);
        let frame = self.active.pop().expect("active frame vanished");
        let output = result?;

        let fingerprint = fingerprint_of(&output);
        let changed_at = match self.slots.get(request) {
            Some(old) if old.fingerprint == fingerprint => old.changed_at,
            _ => self.revision,
        };
        self.slots.insert(
            request.clone(),
            Slot {
                output: output.clone(),
                fingerprint,
                deps: frame.deps,
                checked_at: self.revision,
                changed_at,
                is_input: false,
            },
        );
        self.record_dep(request, fingerprint);
        Ok(output)
    }

    fn record_dep(&mut self, request: &D::Request, fingerprint: u64) {
        if let Some(parent) = self.active.last_mut() {
            parent.deps.push((request.clone(), fingerprint));
        }
    }
}

fn fingerprint_of<O: Hash>(output: &O) -> u64 {
    let mut hasher = DefaultHasher::new();
    output.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Toy dispatcher: `Value(n)` is an input, `Double(n)` doubles it,
    /// `Cyclic` depends on itself.
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    enum Req {
        Value(u32),
        Double(u32),
        Cyclic,
    }

    #[derive(Default)]
    struct Math {
        values: HashMap<u32, i64>,
    }

    impl QueryDispatch for Math {
        type Request = Req;
        type Output = i64;

        fn execute(
            &mut self,
            engine: &mut Engine<Self>,
            request: &Req,
        ) -> Result<i64, QueryError<Req>> {
            match request {
                Req::Value(key) => Ok(self.values.get(key).copied().unwrap_or(0)),
                Req::Double(key) => {
                    let value = engine.query(self, &Req::Value(*key))?;
                    Ok(value * 2)
                }
                Req::Cyclic => engine.query(self, &Req::Cyclic),
            }
        }
    }

    #[test]
    fn memoizes_within_a_revision() {
        let mut engine = Engine::new();
        let mut math = Math::default();
        engine.set_input(Req::Value(1), 21);

        assert_eq!(engine.query(&mut math, &Req::Double(1)).unwrap(), 42);
        let runs = engine.executions();
        assert_eq!(engine.query(&mut math, &Req::Double(1)).unwrap(), 42);
        assert_eq!(engine.executions(), runs);
    }

    #[test]
    fn no_spurious_reruns_after_a_quiet_revision() {
        let mut engine = Engine::new();
        let mut math = Math::default();
        engine.set_input(Req::Value(1), 21);

        engine.query(&mut math, &Req::Double(1)).unwrap();
        engine.advance_to_next_revision();

        let runs = engine.executions();
        assert_eq!(engine.query(&mut math, &Req::Double(1)).unwrap(), 42);
        assert_eq!(engine.executions(), runs);
    }

    #[test]
    fn changed_inputs_invalidate_dependents() {
        let mut engine = Engine::new();
        let mut math = Math::default();
        engine.set_input(Req::Value(1), 21);

        assert_eq!(engine.query(&mut math, &Req::Double(1)).unwrap(), 42);

        engine.advance_to_next_revision();
        engine.set_input(Req::Value(1), 50);
        assert_eq!(engine.query(&mut math, &Req::Double(1)).unwrap(), 100);
    }

    #[test]
    fn reentry_is_a_cycle() {
        let mut engine = Engine::new();
        let mut math = Math::default();

        let error = engine.query(&mut math, &Req::Cyclic).unwrap_err();
        match error {
            QueryError::Cycle { path } => {
                assert_eq!(path, vec![Req::Cyclic, Req::Cyclic]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(!engine.is_executing());
    }

    #[test]
    fn cancellation_is_checked_at_entry() {
        let mut engine = Engine::new();
        let mut math = Math::default();

        engine.set_cancelled(true);
        assert_eq!(
            engine.query(&mut math, &Req::Value(1)).unwrap_err(),
            QueryError::Cancelled
        );

        engine.set_cancelled(false);
        assert!(engine.query(&mut math, &Req::Value(1)).is_ok());
    }
}
