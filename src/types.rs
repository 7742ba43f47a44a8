//! Core types shared across the engine.
//!
//! State values are opaque JSON trees behind `Rc`, so snapshots share
//! structure and the change tracker can compare by pointer identity
//! instead of deep equality.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

// =============================================================================
// State values
// =============================================================================

/// An opaque state value of arbitrary depth.
///
/// Values are reference-counted so that proposing, committing, and
/// snapshotting state never deep-copies. Identity (not content) drives the
/// changed-map: a trait that returns a new `Rc` for an equal value is still
/// treated as changed, and a trait that caches and returns the prior `Rc`
/// opts out of downstream work.
pub type SharedValue = Rc<Value>;

/// Committed or proposed state: top-level key to value.
pub type State = HashMap<String, SharedValue>;

/// A partial state: the shape of update requests and effect outputs.
pub type StateDelta = HashMap<String, SharedValue>;

/// Wrap a plain JSON value as a shared state value.
pub fn shared(value: Value) -> SharedValue {
    Rc::new(value)
}

/// Overlay `delta` onto `base`, last write winning per key.
pub fn merge_delta(base: &mut State, delta: &StateDelta) {
    for (key, value) in delta {
        base.insert(key.clone(), Rc::clone(value));
    }
}

// =============================================================================
// Engine flags
// =============================================================================

bitflags::bitflags! {
    /// Per-instance engine flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u8 {
        /// Commits produced while set dispatch change notifications.
        /// Interaction handlers toggle this around their body of work.
        const RAISE_CHANGE_EVENTS = 1 << 0;
        /// A render pass is in progress; update requests are deferred
        /// to the next turn instead of rendering re-entrantly.
        const RENDERING = 1 << 1;
        /// Set from construction until the first render pass completes.
        const FIRST_RENDER = 1 << 2;
    }
}

// =============================================================================
// Color scheme
// =============================================================================

/// Ambient light/dark preference, observed process-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorScheme {
    #[default]
    Light,
    Dark,
}

impl ColorScheme {
    /// True for the dark preference.
    pub fn is_dark(&self) -> bool {
        matches!(self, ColorScheme::Dark)
    }
}

// =============================================================================
// Public properties
// =============================================================================

/// How a property's external string form is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// Numeric property. Integral inputs become JSON integers.
    Number,
    /// Boolean property. An empty attribute value reads as true.
    Boolean,
    /// Free-form text property.
    Text,
}

/// A declared public property: state key, external attribute name, and kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySpec {
    /// Top-level state key (camelCase, e.g. `selectedIndex`).
    pub key: String,
    /// External attribute name (kebab-case, e.g. `selected-index`).
    pub attribute: String,
    /// Parse discipline for string input.
    pub kind: PropertyKind,
}

impl PropertySpec {
    /// Declare a property; the attribute name is derived from the key.
    pub fn new(key: impl Into<String>, kind: PropertyKind) -> Self {
        let key = key.into();
        let attribute = kebab_case(&key);
        Self { key, attribute, kind }
    }

    /// Declare a property with an explicit attribute name.
    pub fn with_attribute(
        key: impl Into<String>,
        attribute: impl Into<String>,
        kind: PropertyKind,
    ) -> Self {
        Self {
            key: key.into(),
            attribute: attribute.into(),
            kind,
        }
    }
}

/// Convert a camelCase key to its kebab-case external form.
///
/// `selectedIndex` becomes `selected-index`.
pub fn kebab_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

// =============================================================================
// Tests
// =============================================================================
