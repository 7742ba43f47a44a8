//! Effects chain: trait-contributed state derivation, driven to a fixed
//! point.
//!
//! Each trait's `state_effects` hook receives the proposed state and the
//! changed-map so far, queries its base chain's delta through the threaded
//! continuation, and overlays its own partial state (e.g. "if the cursor
//! index changed, mirror it into the selection index"). The driver merges
//! the chain's output into the proposed state, recomputes the changed-map,
//! and reruns the chain while new changed keys keep appearing.
//!
//! The pass cap bounds cyclic trait dependencies. Hitting it is a fatal
//! configuration error: the engine detects cycles, it never breaks them.

use std::rc::Rc;

use log::{error, trace};

use crate::error::EngineError;
use crate::state::{diff, ChangedMap};
use crate::traits::ComponentTrait;
use crate::types::{merge_delta, State, StateDelta};

/// Maximum effects passes per update cycle before declaring divergence.
pub const MAX_EFFECT_PASSES: usize = 100;

// =============================================================================
// Chain driver
// =============================================================================

/// Run the effects chain once, top trait outermost.
///
/// The outermost (last-registered) trait runs first and pulls its base
/// chain's delta through the continuation, so each layer observes its
/// predecessors' output before overlaying its own.
pub(crate) fn run_chain(
    traits: &[Rc<dyn ComponentTrait>],
    state: &State,
    changed: &ChangedMap,
) -> StateDelta {
    match traits.split_last() {
        Some((top, base)) => {
            top.state_effects(state, changed, &mut || run_chain(base, state, changed))
        }
        None => StateDelta::new(),
    }
}

// =============================================================================
// Fixed point
// =============================================================================

/// Drive the effects chain to a fixed point.
///
/// `base` is the diff baseline (the committed state, or empty for an
/// instance's first render) and `proposed` is the committed state with the
/// pending batch merged in. Returns the converged state, its changed-map
/// relative to `base`, and the number of passes taken.
///
/// # Errors
///
/// [`EngineError::EffectsDivergence`] if new changed keys still appear
/// after [`MAX_EFFECT_PASSES`] passes, carrying the keys that were still
/// toggling. The caller aborts the update; nothing is committed.
pub(crate) fn run_to_fixpoint(
    traits: &[Rc<dyn ComponentTrait>],
    base: &State,
    proposed: State,
) -> Result<(State, ChangedMap, usize), EngineError> {
    let mut proposed = proposed;
    let mut changed = diff(base, &proposed);
    let mut last_new_keys = Vec::new();

    for pass in 1..=MAX_EFFECT_PASSES {
        let delta = run_chain(traits, &proposed, &changed);
        let mut next = proposed.clone();
        merge_delta(&mut next, &delta);

        let next_changed = diff(base, &next);
        let new_keys = next_changed.added_over(&changed);
        proposed = next;

        if new_keys.is_empty() {
            trace!("effects converged after {pass} pass(es)");
            return Ok((proposed, next_changed, pass));
        }

        trace!("effects pass {pass} introduced: {}", new_keys.join(", "));
        changed = next_changed;
        last_new_keys = new_keys;
    }

    last_new_keys.sort();
    error!(
        "effects chain diverged; still toggling after {MAX_EFFECT_PASSES} passes: {}",
        last_new_keys.join(", ")
    );
    Err(EngineError::EffectsDivergence {
        keys: last_new_keys,
        passes: MAX_EFFECT_PASSES,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::EffectsNext;
    use crate::types::shared;
    use serde_json::json;
    use std::cell::Cell;

    /// Mirrors `from` into `to` whenever `from` changed.
    struct Mirror {
        from: &'static str,
        to: &'static str,
    }

    impl ComponentTrait for Mirror {
        fn name(&self) -> &str {
            "mirror"
        }

        fn state_effects(
            &self,
            state: &State,
            changed: &ChangedMap,
            next: EffectsNext<'_>,
        ) -> StateDelta {
            let mut delta = next();
            if changed.is_changed(self.from) {
                if let Some(value) = state.get(self.from) {
                    delta.insert(self.to.to_string(), shared((**value).clone()));
                }
            }
            delta
        }
    }

    /// Counts chain passes through a shared cell.
    struct PassCounter(Rc<Cell<usize>>);

    impl ComponentTrait for PassCounter {
        fn name(&self) -> &str {
            "pass-counter"
        }

        fn state_effects(
            &self,
            _state: &State,
            _changed: &ChangedMap,
            next: EffectsNext<'_>,
        ) -> StateDelta {
            self.0.set(self.0.get() + 1);
            next()
        }
    }

    /// Pathological trait: mints a fresh key every time anything changed.
    struct KeyMinter(Rc<Cell<usize>>);

    impl ComponentTrait for KeyMinter {
        fn name(&self) -> &str {
            "key-minter"
        }

        fn state_effects(
            &self,
            _state: &State,
            changed: &ChangedMap,
            next: EffectsNext<'_>,
        ) -> StateDelta {
            let mut delta = next();
            if changed.any_changed() {
                let n = self.0.get();
                self.0.set(n + 1);
                delta.insert(format!("minted{n}"), shared(json!(n)));
            }
            delta
        }
    }

    fn chain(traits: Vec<Rc<dyn ComponentTrait>>) -> Vec<Rc<dyn ComponentTrait>> {
        traits
    }

    fn proposed_with(key: &str, value: serde_json::Value) -> State {
        let mut state = State::new();
        state.insert(key.to_string(), shared(value));
        state
    }

    #[test]
    fn test_three_layer_cascade_converges_in_three_passes() {
        // A sets x (via the request), B reacts to x by setting y,
        // C reacts to y by setting z.
        let passes = Rc::new(Cell::new(0));
        let traits = chain(vec![
            Rc::new(PassCounter(Rc::clone(&passes))),
            Rc::new(Mirror { from: "x", to: "y" }),
            Rc::new(Mirror { from: "y", to: "z" }),
        ]);

        let base = State::new();
        let (state, changed, pass_count) =
            run_to_fixpoint(&traits, &base, proposed_with("x", json!(1))).unwrap();

        assert_eq!(pass_count, 3);
        assert_eq!(passes.get(), 3);
        assert!(changed.is_changed("x"));
        assert!(changed.is_changed("y"));
        assert!(changed.is_changed("z"));
        assert_eq!(*state["y"], json!(1));
        assert_eq!(*state["z"], json!(1));
    }

    #[test]
    fn test_fixpoint_is_idempotent() {
        let traits = chain(vec![
            Rc::new(Mirror { from: "x", to: "y" }),
            Rc::new(Mirror { from: "y", to: "z" }),
        ]);

        let base = State::new();
        let (state, changed, _) =
            run_to_fixpoint(&traits, &base, proposed_with("x", json!(1))).unwrap();

        // Rerunning the chain on an already-converged (state, changed)
        // yields no further changed keys.
        let delta = run_chain(&traits, &state, &changed);
        let mut rerun = state.clone();
        merge_delta(&mut rerun, &delta);
        let rerun_changed = diff(&base, &rerun);
        assert!(rerun_changed.added_over(&changed).is_empty());
    }

    #[test]
    fn test_no_change_single_pass() {
        let traits = chain(vec![Rc::new(Mirror { from: "x", to: "y" })]);
        let base = proposed_with("x", json!(1));
        let (_, changed, pass_count) =
            run_to_fixpoint(&traits, &base, base.clone()).unwrap();
        assert_eq!(pass_count, 1);
        assert!(!changed.any_changed());
    }

    #[test]
    fn test_divergence_reports_toggling_keys() {
        let traits = chain(vec![Rc::new(KeyMinter(Rc::new(Cell::new(0))))]);
        let base = State::new();

        let err = run_to_fixpoint(&traits, &base, proposed_with("seed", json!(0)))
            .unwrap_err();
        match err {
            EngineError::EffectsDivergence { keys, passes } => {
                assert_eq!(passes, MAX_EFFECT_PASSES);
                assert!(!keys.is_empty());
                assert!(keys[0].starts_with("minted"));
            }
        }
    }
}
