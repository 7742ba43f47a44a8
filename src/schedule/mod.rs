//! Scheduler: per-turn batching of update requests.
//!
//! Update requests issued within one synchronous turn merge into a single
//! [`PendingBatch`] per instance (last write wins per key) and share one
//! eventual commit. The turn boundary is explicit: the host loop calls
//! [`flush_turn`], mirroring a cooperative run-to-completion model with no
//! minimum delay or batching window. Requests issued while a flush is in
//! progress land in the next turn.
//!
//! Every request returns an [`UpdateHandle`] that resolves once the
//! triggering render and lifecycle pass finishes. There is no cancellation:
//! once accepted, a value will be applied (possibly overwritten by a later
//! request in the same batch) and will produce a commit.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use log::debug;

use crate::error::EngineError;
use crate::types::{SharedValue, StateDelta};

// =============================================================================
// Update handle
// =============================================================================

/// Resolution state of an update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// Not yet committed.
    Pending,
    /// Commit, render, and lifecycle hooks finished.
    Complete,
    /// The update was aborted (effects chain divergence).
    Failed,
}

#[derive(Default)]
struct HandleInner {
    status: Option<UpdateStatus>,
    callbacks: Vec<Box<dyn FnOnce(UpdateStatus)>>,
}

/// Completion handle for one update request.
///
/// All handles issued within a turn resolve together, after that turn's
/// render and lifecycle hooks. Poll with [`status`](UpdateHandle::status)
/// or register a callback with [`on_resolved`](UpdateHandle::on_resolved).
#[derive(Clone, Default)]
pub struct UpdateHandle {
    inner: Rc<RefCell<HandleInner>>,
}

impl UpdateHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Current status.
    pub fn status(&self) -> UpdateStatus {
        self.inner.borrow().status.unwrap_or(UpdateStatus::Pending)
    }

    /// True once the handle resolved, successfully or not.
    pub fn is_resolved(&self) -> bool {
        self.inner.borrow().status.is_some()
    }

    /// Run `callback` when the handle resolves. Fires immediately if it
    /// already has.
    pub fn on_resolved(&self, callback: impl FnOnce(UpdateStatus) + 'static) {
        let resolved = self.inner.borrow().status;
        match resolved {
            Some(status) => callback(status),
            None => self.inner.borrow_mut().callbacks.push(Box::new(callback)),
        }
    }

    /// First resolution wins; later calls are ignored.
    pub(crate) fn resolve(&self, status: UpdateStatus) {
        let callbacks = {
            let mut inner = self.inner.borrow_mut();
            if inner.status.is_some() {
                return;
            }
            inner.status = Some(status);
            std::mem::take(&mut inner.callbacks)
        };
        for callback in callbacks {
            callback(status);
        }
    }
}

// =============================================================================
// Pending batch
// =============================================================================

struct BatchEntry {
    value: SharedValue,
    raise: bool,
}

/// Write-time capture of the raise-change-events flag for one batch.
///
/// Commits are deferred to the turn boundary, so the flag is recorded per
/// accepted write; keys that change only through derivation fall back to
/// the OR across the batch's writes.
#[derive(Default)]
pub(crate) struct RaiseCapture {
    per_key: HashMap<String, bool>,
    any: bool,
}

impl RaiseCapture {
    /// Should a change to `key` in this commit raise a notification?
    pub(crate) fn for_key(&self, key: &str) -> bool {
        self.per_key.get(key).copied().unwrap_or(self.any)
    }
}

/// Update requests accepted since the last commit, keyed by target key,
/// most-recent write winning. Cleared atomically at commit time.
#[derive(Default)]
pub(crate) struct PendingBatch {
    entries: HashMap<String, BatchEntry>,
    raise_any: bool,
    handles: Vec<UpdateHandle>,
    has_requests: bool,
}

impl PendingBatch {
    /// Merge one request into the batch.
    pub(crate) fn accept(&mut self, delta: StateDelta, raise: bool, handle: UpdateHandle) {
        for (key, value) in delta {
            self.entries.insert(key, BatchEntry { value, raise });
            self.raise_any |= raise;
        }
        self.handles.push(handle);
        self.has_requests = true;
    }

    /// True if no request has been accepted since the last commit.
    pub(crate) fn is_empty(&self) -> bool {
        !self.has_requests
    }

    /// Take the batch, leaving an empty one behind.
    pub(crate) fn take(&mut self) -> PendingBatch {
        std::mem::take(self)
    }

    /// The merged partial state.
    pub(crate) fn delta(&self) -> StateDelta {
        self.entries
            .iter()
            .map(|(key, entry)| (key.clone(), Rc::clone(&entry.value)))
            .collect()
    }

    /// Write-time raise-flag capture for this batch.
    pub(crate) fn raise_capture(&self) -> RaiseCapture {
        RaiseCapture {
            per_key: self
                .entries
                .iter()
                .map(|(key, entry)| (key.clone(), entry.raise))
                .collect(),
            any: self.raise_any,
        }
    }

    /// Handles issued for this batch's requests.
    pub(crate) fn handles(&self) -> &[UpdateHandle] {
        &self.handles
    }
}

// =============================================================================
// Turn queue
// =============================================================================

/// An instance that can run one commit+render turn.
pub(crate) trait TurnParticipant {
    /// Run one full update cycle for this instance.
    fn run_turn(self: Rc<Self>) -> Result<(), EngineError>;

    /// Clear the instance's scheduled marker so a request made during its
    /// own turn re-enqueues it.
    fn clear_scheduled(&self);
}

thread_local! {
    static TURN_QUEUE: RefCell<Vec<Weak<dyn TurnParticipant>>> = RefCell::new(Vec::new());
    static FLUSHING: Cell<bool> = const { Cell::new(false) };
}

pub(crate) fn enqueue(participant: Weak<dyn TurnParticipant>) {
    TURN_QUEUE.with(|queue| queue.borrow_mut().push(participant));
}

/// True if any live instance awaits a turn.
pub fn has_pending() -> bool {
    TURN_QUEUE.with(|queue| {
        queue
            .borrow()
            .iter()
            .any(|participant| participant.upgrade().is_some())
    })
}

struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        FLUSHING.with(|flag| flag.set(false));
    }
}

/// Run one turn boundary: commit every instance scheduled before this call.
///
/// Instances scheduled during the flush (e.g. by a render hook requesting
/// an update) wait for the next turn, trading a turn of latency for bounded
/// recursion. Calling `flush_turn` from within a flush is a no-op.
///
/// Returns the number of instances committed. If an instance's effects
/// chain diverges, the remaining instances still run and the first error is
/// returned.
pub fn flush_turn() -> Result<usize, EngineError> {
    let already_flushing = FLUSHING.with(|flag| flag.replace(true));
    if already_flushing {
        return Ok(0);
    }
    let _guard = FlushGuard;

    let drained: Vec<_> = TURN_QUEUE.with(|queue| queue.borrow_mut().drain(..).collect());
    if drained.is_empty() {
        return Ok(0);
    }
    debug!("flushing turn: {} scheduled instance(s)", drained.len());

    let mut committed = 0;
    let mut first_error = None;
    for weak in drained {
        let Some(participant) = weak.upgrade() else {
            continue;
        };
        participant.clear_scheduled();
        match participant.run_turn() {
            Ok(()) => committed += 1,
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(committed),
    }
}

/// Flush turns until no instance is scheduled. Returns the turn count.
pub fn settle() -> Result<usize, EngineError> {
    let mut turns = 0;
    while has_pending() {
        flush_turn()?;
        turns += 1;
    }
    Ok(turns)
}

/// Drop all scheduled work on this thread.
pub fn reset() {
    TURN_QUEUE.with(|queue| queue.borrow_mut().clear());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::shared;
    use serde_json::json;

    fn delta_of(key: &str, value: serde_json::Value) -> StateDelta {
        let mut delta = StateDelta::new();
        delta.insert(key.to_string(), shared(value));
        delta
    }

    #[test]
    fn test_batch_last_write_wins() {
        let mut batch = PendingBatch::default();
        batch.accept(delta_of("k", json!(1)), false, UpdateHandle::new());
        batch.accept(delta_of("k", json!(2)), false, UpdateHandle::new());

        let delta = batch.delta();
        assert_eq!(*delta["k"], json!(2));
        assert_eq!(batch.handles().len(), 2);
    }

    #[test]
    fn test_batch_take_clears() {
        let mut batch = PendingBatch::default();
        batch.accept(delta_of("k", json!(1)), false, UpdateHandle::new());

        let taken = batch.take();
        assert!(!taken.is_empty());
        assert!(batch.is_empty());
        assert!(batch.delta().is_empty());
    }

    #[test]
    fn test_raise_capture_per_key_with_any_fallback() {
        let mut batch = PendingBatch::default();
        batch.accept(delta_of("quiet", json!(1)), false, UpdateHandle::new());
        batch.accept(delta_of("loud", json!(2)), true, UpdateHandle::new());

        let capture = batch.raise_capture();
        assert!(!capture.for_key("quiet"));
        assert!(capture.for_key("loud"));
        // Derived-only keys inherit the batch OR.
        assert!(capture.for_key("derived"));
    }

    #[test]
    fn test_handle_resolution_and_callbacks() {
        let handle = UpdateHandle::new();
        assert_eq!(handle.status(), UpdateStatus::Pending);

        let seen = Rc::new(Cell::new(None));
        let seen_clone = Rc::clone(&seen);
        handle.on_resolved(move |status| seen_clone.set(Some(status)));

        handle.resolve(UpdateStatus::Complete);
        assert_eq!(handle.status(), UpdateStatus::Complete);
        assert_eq!(seen.get(), Some(UpdateStatus::Complete));

        // Late registration fires immediately; re-resolution is ignored.
        handle.resolve(UpdateStatus::Failed);
        assert_eq!(handle.status(), UpdateStatus::Complete);
        let late = Rc::new(Cell::new(None));
        let late_clone = Rc::clone(&late);
        handle.on_resolved(move |status| late_clone.set(Some(status)));
        assert_eq!(late.get(), Some(UpdateStatus::Complete));
    }

    struct CountingParticipant {
        runs: Cell<usize>,
    }

    impl TurnParticipant for CountingParticipant {
        fn run_turn(self: Rc<Self>) -> Result<(), EngineError> {
            self.runs.set(self.runs.get() + 1);
            Ok(())
        }

        fn clear_scheduled(&self) {}
    }

    #[test]
    fn test_flush_runs_scheduled_participants() {
        reset();
        let participant = Rc::new(CountingParticipant { runs: Cell::new(0) });
        let as_dyn: Rc<dyn TurnParticipant> = Rc::clone(&participant) as Rc<dyn TurnParticipant>;
        enqueue(Rc::downgrade(&as_dyn));

        assert!(has_pending());
        assert_eq!(flush_turn().unwrap(), 1);
        assert_eq!(participant.runs.get(), 1);
        assert!(!has_pending());
    }

    #[test]
    fn test_dead_participants_are_skipped() {
        reset();
        {
            let participant = Rc::new(CountingParticipant { runs: Cell::new(0) });
            let as_dyn: Rc<dyn TurnParticipant> = participant as Rc<dyn TurnParticipant>;
            enqueue(Rc::downgrade(&as_dyn));
            // Instance torn down before the turn boundary.
        }
        assert!(!has_pending());
        assert_eq!(flush_turn().unwrap(), 0);
    }
}
