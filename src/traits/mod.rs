//! Trait contract and component descriptor.
//!
//! A trait is a composable behavior unit. Instead of deep inheritance
//! chains, traits are registered as an explicit ordered list on a
//! [`ComponentDescriptor`]; the engine owns the list and threads a
//! continuation (`next`) through each hook, so every layer still sees its
//! base chain's output without inheritance. Registration order determines
//! both default-state merge order and base-first render order.
//!
//! Hooks on [`ComponentTrait`] are the engine-internal interface; a
//! component's public surface is the accessor and listener API on
//! `Component`. All hooks have delegate-only defaults, so a trait defines
//! just the subset it needs.

use std::rc::Rc;

use crate::render::RenderContext;
use crate::state::ChangedMap;
use crate::types::{PropertyKind, PropertySpec, State, StateDelta};

// =============================================================================
// Continuation types
// =============================================================================

/// Continuation producing the base chain's default state.
pub type DefaultsNext<'n> = &'n mut dyn FnMut() -> State;

/// Continuation producing the base chain's effects delta.
pub type EffectsNext<'n> = &'n mut dyn FnMut() -> StateDelta;

/// Continuation running the base chain's render (or rendered) work.
pub type RenderNext<'n> = &'n mut dyn FnMut(&mut RenderContext);

// =============================================================================
// Trait contract
// =============================================================================

/// A composable behavior layer.
///
/// Every hook receives the base chain as `next`. The default
/// implementations delegate and contribute nothing, so a trait overrides
/// only what it uses. Traits are expected to extend, not replace, their
/// base's contribution: call `next` and layer on top of its result.
pub trait ComponentTrait {
    /// Trait name, for logs and diagnostics.
    fn name(&self) -> &str;

    /// Contribute default state. Reads the base chain's defaults via
    /// `next` and layers its own on top; the last-registered trait's
    /// explicit values win on key collision.
    fn default_state(&self, next: DefaultsNext<'_>) -> State {
        next()
    }

    /// Derive state from a change. Queries the base chain's delta via
    /// `next`, then overlays its own partial state. Must be pure: same
    /// `(state, changed)` in, same delta out, no side effects.
    fn state_effects(
        &self,
        state: &State,
        changed: &ChangedMap,
        next: EffectsNext<'_>,
    ) -> StateDelta {
        let _ = (state, changed);
        next()
    }

    /// Apply state to the subtree. The default delegates first, so later
    /// (more specialized) traits observe and adjust what earlier (general)
    /// traits already applied. A trait may instead do its own work before
    /// calling `next`, e.g. to release node references about to be
    /// replaced. Touch only the parts whose governing key is true in
    /// `changed`, and never render re-entrantly: updates requested here go
    /// through `ctx.request_update` and land in a later turn.
    fn render(&self, ctx: &mut RenderContext, changed: &ChangedMap, next: RenderNext<'_>) {
        let _ = changed;
        next(ctx);
    }

    /// Post-render hook, after the subtree reflects the new state. Runs
    /// for measurement-dependent work such as scrolling into view.
    fn rendered(&self, ctx: &mut RenderContext, changed: &ChangedMap, next: RenderNext<'_>) {
        let _ = changed;
        next(ctx);
    }

    /// Fired once per attach, after the first rendered pass that follows it.
    fn mounted(&self, ctx: &mut RenderContext) {
        let _ = ctx;
    }

    /// Fired when the owning instance detaches.
    fn detached(&self) {}
}

// =============================================================================
// Component descriptor
// =============================================================================

/// Describes a component: its ordered trait list, public properties, and
/// which process-wide services it observes.
pub struct ComponentDescriptor {
    name: String,
    traits: Vec<Rc<dyn ComponentTrait>>,
    properties: Vec<PropertySpec>,
    observe_viewport: bool,
    observe_color_scheme: bool,
}

impl ComponentDescriptor {
    /// Start an empty descriptor.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            traits: Vec::new(),
            properties: Vec::new(),
            observe_viewport: false,
            observe_color_scheme: false,
        }
    }

    /// Register a trait. Order matters: earlier traits are more general
    /// and run first in the base-first render order.
    pub fn with_trait(mut self, layer: impl ComponentTrait + 'static) -> Self {
        self.traits.push(Rc::new(layer));
        self
    }

    /// Declare a public property (attribute name derived from the key).
    pub fn with_property(mut self, key: impl Into<String>, kind: PropertyKind) -> Self {
        self.properties.push(PropertySpec::new(key, kind));
        self
    }

    /// Declare a public property with an explicit attribute name.
    pub fn with_property_attribute(
        mut self,
        key: impl Into<String>,
        attribute: impl Into<String>,
        kind: PropertyKind,
    ) -> Self {
        self.properties
            .push(PropertySpec::with_attribute(key, attribute, kind));
        self
    }

    /// Observe the process-wide viewport service while attached.
    pub fn observe_viewport(mut self) -> Self {
        self.observe_viewport = true;
        self
    }

    /// Observe the process-wide color-scheme service while attached.
    pub fn observe_color_scheme(mut self) -> Self {
        self.observe_color_scheme = true;
        self
    }

    /// Component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered traits in base-first order.
    pub fn traits(&self) -> &[Rc<dyn ComponentTrait>] {
        &self.traits
    }

    /// Declared public properties.
    pub fn properties(&self) -> &[PropertySpec] {
        &self.properties
    }

    /// Look up a property by state key.
    pub fn property(&self, key: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|spec| spec.key == key)
    }

    /// Look up a property by external attribute name.
    pub fn property_by_attribute(&self, attribute: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|spec| spec.attribute == attribute)
    }

    pub(crate) fn observes_viewport(&self) -> bool {
        self.observe_viewport
    }

    pub(crate) fn observes_color_scheme(&self) -> bool {
        self.observe_color_scheme
    }

    /// Assemble the instance's initial state by walking the trait chain:
    /// each trait reads its base's defaults and layers its own on top.
    pub fn assemble_defaults(&self) -> State {
        assemble_defaults(&self.traits)
    }
}

fn assemble_defaults(traits: &[Rc<dyn ComponentTrait>]) -> State {
    match traits.split_last() {
        Some((top, base)) => top.default_state(&mut || assemble_defaults(base)),
        None => State::new(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::shared;
    use serde_json::json;

    struct Defaults(&'static str, serde_json::Value);

    impl ComponentTrait for Defaults {
        fn name(&self) -> &str {
            "defaults"
        }

        fn default_state(&self, next: DefaultsNext<'_>) -> State {
            let mut state = next();
            state.insert(self.0.to_string(), shared(self.1.clone()));
            state
        }
    }

    /// A trait whose defaults ignore the base chain entirely. Malformed
    /// composition: base defaults are silently lost.
    struct Clobber;

    impl ComponentTrait for Clobber {
        fn name(&self) -> &str {
            "clobber"
        }

        fn default_state(&self, _next: DefaultsNext<'_>) -> State {
            let mut state = State::new();
            state.insert("only".to_string(), shared(json!(true)));
            state
        }
    }

    #[test]
    fn test_defaults_merge_order() {
        let descriptor = ComponentDescriptor::new("sample")
            .with_trait(Defaults("a", json!(1)))
            .with_trait(Defaults("b", json!(2)))
            .with_trait(Defaults("a", json!(3)));

        let defaults = descriptor.assemble_defaults();
        // Last-registered trait wins the collision on "a".
        assert_eq!(*defaults["a"], json!(3));
        assert_eq!(*defaults["b"], json!(2));
    }

    #[test]
    fn test_clobbering_trait_loses_base_defaults() {
        let descriptor = ComponentDescriptor::new("sample")
            .with_trait(Defaults("a", json!(1)))
            .with_trait(Clobber);

        let defaults = descriptor.assemble_defaults();
        assert!(!defaults.contains_key("a"));
        assert_eq!(*defaults["only"], json!(true));
    }

    #[test]
    fn test_property_lookup() {
        let descriptor = ComponentDescriptor::new("sample")
            .with_property("selectedIndex", PropertyKind::Number);

        let spec = descriptor.property("selectedIndex").unwrap();
        assert_eq!(spec.attribute, "selected-index");
        assert!(descriptor.property_by_attribute("selected-index").is_some());
        assert!(descriptor.property("missing").is_none());
    }

    #[test]
    fn test_empty_chain_defaults() {
        let descriptor = ComponentDescriptor::new("bare");
        assert!(descriptor.assemble_defaults().is_empty());
    }
}
