//! Change tracking between state snapshots.
//!
//! The changed-map records, per top-level key, whether the new value is
//! reference-identical to the old one. Identity comparison is intentional:
//! a trait that recomputes a derived collection each cycle returns a new
//! `Rc` to be treated as changed, while returning a cached prior `Rc` lets
//! expensive derivations opt out of downstream recomputation.

use std::collections::HashMap;
use std::rc::Rc;

use crate::types::State;

// =============================================================================
// ChangedMap
// =============================================================================

/// Per-key boolean record of what changed between two snapshots.
///
/// Present only during an update cycle; render appliers use it to touch
/// only the part of the subtree whose governing key actually changed.
#[derive(Debug, Clone, Default)]
pub struct ChangedMap {
    map: HashMap<String, bool>,
}

impl ChangedMap {
    /// An empty changed-map (nothing changed).
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff `key` changed. Keys never seen report false.
    pub fn is_changed(&self, key: &str) -> bool {
        self.map.get(key).copied().unwrap_or(false)
    }

    /// True iff any key changed.
    pub fn any_changed(&self) -> bool {
        self.map.values().any(|&changed| changed)
    }

    /// All keys currently marked changed, in no particular order.
    pub fn changed_keys(&self) -> Vec<String> {
        self.map
            .iter()
            .filter(|&(_, &changed)| changed)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Keys marked changed here but not in `earlier`.
    ///
    /// Drives fixed-point detection: an effects pass that introduces no
    /// new changed keys has converged.
    pub fn added_over(&self, earlier: &ChangedMap) -> Vec<String> {
        self.map
            .iter()
            .filter(|&(ref key, &changed)| changed && !earlier.is_changed(key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub(crate) fn mark(&mut self, key: impl Into<String>, changed: bool) {
        self.map.insert(key.into(), changed);
    }
}

// =============================================================================
// Diff
// =============================================================================

/// Compute the changed-map between two snapshots.
///
/// A key is changed iff its value in `new` is not pointer-identical to its
/// value in `old`; keys present on only one side are changed. Pure, no side
/// effects, no error conditions.
pub fn diff(old: &State, new: &State) -> ChangedMap {
    let mut changed = ChangedMap::new();
    for (key, new_value) in new {
        let is_changed = match old.get(key) {
            Some(old_value) => !Rc::ptr_eq(old_value, new_value),
            None => true,
        };
        changed.mark(key.clone(), is_changed);
    }
    for key in old.keys() {
        if !new.contains_key(key) {
            changed.mark(key.clone(), true);
        }
    }
    changed
}

// =============================================================================
// Tests
// =============================================================================
