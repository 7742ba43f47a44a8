//! Per-instance state container.
//!
//! Holds the committed state and the prior snapshot for comparison. State
//! is exclusively owned by one instance, mutated only through the update
//! cycle, and replaced wholesale on each commit. Top-level values are
//! `Rc`-shared, so keeping the prior snapshot costs one map of pointers.

use std::rc::Rc;

use crate::types::{merge_delta, State, StateDelta};

/// Committed state plus the previous commit.
#[derive(Debug, Default)]
pub struct StateContainer {
    current: State,
    previous: State,
}

impl StateContainer {
    /// Create a container seeded with the assembled default state.
    ///
    /// The defaults count as never-committed: the previous snapshot starts
    /// empty so the first commit reports every key as changed.
    pub fn new(initial: State) -> Self {
        Self {
            current: initial,
            previous: State::new(),
        }
    }

    /// The committed state.
    pub fn current(&self) -> &State {
        &self.current
    }

    /// The state as of the commit before the current one.
    pub fn previous(&self) -> &State {
        &self.previous
    }

    /// Committed value for one key, if present.
    pub fn get(&self, key: &str) -> Option<&Rc<serde_json::Value>> {
        self.current.get(key)
    }

    /// Merge a partial state over the committed state without mutating it.
    pub fn propose(&self, delta: &StateDelta) -> State {
        let mut proposed = self.current.clone();
        merge_delta(&mut proposed, delta);
        proposed
    }

    /// Atomically replace the committed state, retaining the old commit as
    /// the previous snapshot.
    pub fn commit(&mut self, next: State) {
        self.previous = std::mem::replace(&mut self.current, next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::diff;
    use crate::types::shared;
    use serde_json::json;

    fn state_of(pairs: &[(&str, serde_json::Value)]) -> State {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), shared(v.clone())))
            .collect()
    }

    #[test]
    fn test_propose_does_not_mutate_current() {
        let container = StateContainer::new(state_of(&[("count", json!(0))]));
        let delta: StateDelta = state_of(&[("count", json!(5))]);

        let proposed = container.propose(&delta);
        assert_eq!(*proposed["count"], json!(5));
        assert_eq!(*container.current()["count"], json!(0));
    }

    #[test]
    fn test_commit_rotates_snapshots() {
        let mut container = StateContainer::new(state_of(&[("count", json!(0))]));
        let first = container.current().clone();

        let next = container.propose(&state_of(&[("count", json!(1))]));
        container.commit(next);

        assert_eq!(*container.current()["count"], json!(1));
        assert!(Rc::ptr_eq(
            &container.previous()["count"],
            &first["count"]
        ));
    }

    #[test]
    fn test_first_commit_diffs_against_empty() {
        let mut container = StateContainer::new(state_of(&[("a", json!(1))]));
        let next = container.current().clone();
        container.commit(next);

        let changed = diff(container.previous(), container.current());
        assert!(changed.is_changed("a"));
    }

    #[test]
    fn test_propose_shares_untouched_values() {
        let container = StateContainer::new(state_of(&[("kept", json!("x"))]));
        let proposed = container.propose(&StateDelta::new());
        assert!(Rc::ptr_eq(&proposed["kept"], &container.current()["kept"]));
    }
}
