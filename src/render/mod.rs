//! Renderer: the base-first applier pipeline and its context.
//!
//! Appliers run once per commit with the final changed-map, after the
//! effects chain has reached its fixed point, so render never observes
//! un-derived pending state. The chain is driven outermost-trait-first,
//! with each layer delegating inward through the threaded continuation;
//! the default hook delegates before its own work (base-first), and a
//! trait can invert that to release node references before delegating.
//!
//! - [`tree`] - The subtree arena appliers mutate

pub mod tree;

pub use tree::{NodeId, Subtree};

use std::rc::Rc;

use crate::notify::{ListenerRegistry, Notification};
use crate::schedule::{RaiseCapture, UpdateHandle};
use crate::state::ChangedMap;
use crate::traits::ComponentTrait;
use crate::types::{PropertySpec, SharedValue, State, StateDelta};

// =============================================================================
// Render context
// =============================================================================

/// Everything a render or post-render hook may touch.
///
/// Holds the committed state snapshot for this pass, the instance's
/// subtree, and the channels for deferred updates and notifications. The
/// context is assembled for one pass and dismantled afterwards; hooks
/// never see the instance's internals directly.
pub struct RenderContext {
    state: State,
    properties: Vec<PropertySpec>,
    subtree: Subtree,
    first_render: bool,
    raises: RaiseCapture,
    listeners: ListenerRegistry,
    deferred: Vec<(StateDelta, UpdateHandle)>,
}

impl RenderContext {
    pub(crate) fn new(
        state: State,
        properties: Vec<PropertySpec>,
        subtree: Subtree,
        first_render: bool,
        raises: RaiseCapture,
        listeners: ListenerRegistry,
    ) -> Self {
        Self {
            state,
            properties,
            subtree,
            first_render,
            raises,
            listeners,
            deferred: Vec::new(),
        }
    }

    /// The committed state this pass renders.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Committed value for one key.
    pub fn get(&self, key: &str) -> Option<&SharedValue> {
        self.state.get(key)
    }

    /// The subtree, for reading.
    pub fn subtree(&self) -> &Subtree {
        &self.subtree
    }

    /// The subtree, for applier writes.
    pub fn subtree_mut(&mut self) -> &mut Subtree {
        &mut self.subtree
    }

    /// True only during an instance's very first render pass.
    pub fn first_render(&self) -> bool {
        self.first_render
    }

    /// The instance's declared public properties.
    pub fn properties(&self) -> &[PropertySpec] {
        &self.properties
    }

    /// Whether a change to `key` in this commit should raise externally
    /// visible notifications (write-time flag capture).
    pub fn raise_change_events(&self, key: &str) -> bool {
        self.raises.for_key(key)
    }

    /// Dispatch a notification to the instance's listeners, synchronously.
    pub fn dispatch(&self, name: impl Into<String>, payload: StateDelta) {
        self.listeners.dispatch(&Notification {
            name: name.into(),
            payload,
        });
    }

    /// Request a further update. Deferred through the scheduler: the
    /// request lands in a following turn, never in the current pass.
    pub fn request_update(&mut self, delta: StateDelta) -> UpdateHandle {
        let handle = UpdateHandle::new();
        self.deferred.push((delta, handle.clone()));
        handle
    }

    pub(crate) fn into_parts(self) -> (Subtree, Vec<(StateDelta, UpdateHandle)>) {
        (self.subtree, self.deferred)
    }
}

// =============================================================================
// Pipeline drivers
// =============================================================================

/// Drive the render chain, outermost trait first, delegating inward.
pub(crate) fn render_chain(
    traits: &[Rc<dyn ComponentTrait>],
    ctx: &mut RenderContext,
    changed: &ChangedMap,
) {
    if let Some((top, base)) = traits.split_last() {
        top.render(ctx, changed, &mut |ctx| render_chain(base, ctx, changed));
    }
}

/// Drive the post-render chain, same shape as [`render_chain`].
pub(crate) fn rendered_chain(
    traits: &[Rc<dyn ComponentTrait>],
    ctx: &mut RenderContext,
    changed: &ChangedMap,
) {
    if let Some((top, base)) = traits.split_last() {
        top.rendered(ctx, changed, &mut |ctx| rendered_chain(base, ctx, changed));
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::RenderNext;
    use crate::types::shared;
    use serde_json::json;
    use std::cell::RefCell;

    fn context_with(state: State) -> RenderContext {
        RenderContext::new(
            state,
            Vec::new(),
            Subtree::new(),
            true,
            RaiseCapture::default(),
            ListenerRegistry::new(),
        )
    }

    /// Records its label into the host's `order` attribute; base-first by
    /// default, or own-work-first when `invert` is set.
    struct Tracer {
        label: &'static str,
        invert: bool,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Tracer {
        fn apply(&self, ctx: &mut RenderContext) {
            self.log.borrow_mut().push(self.label);
            let root = ctx.subtree().root();
            let prior = ctx.subtree().attribute(root, "order").unwrap_or("").to_string();
            ctx.subtree_mut()
                .set_attribute(root, "order", format!("{prior}{}", self.label));
        }
    }

    impl ComponentTrait for Tracer {
        fn name(&self) -> &str {
            self.label
        }

        fn render(&self, ctx: &mut RenderContext, _changed: &ChangedMap, next: RenderNext<'_>) {
            if self.invert {
                self.apply(ctx);
                next(ctx);
            } else {
                next(ctx);
                self.apply(ctx);
            }
        }
    }

    fn tracer(label: &'static str, invert: bool, log: &Rc<RefCell<Vec<&'static str>>>) -> Rc<dyn ComponentTrait> {
        Rc::new(Tracer {
            label,
            invert,
            log: Rc::clone(log),
        })
    }

    #[test]
    fn test_render_chain_is_base_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let traits = vec![
            tracer("a", false, &log),
            tracer("b", false, &log),
            tracer("c", false, &log),
        ];

        let mut ctx = context_with(State::new());
        render_chain(&traits, &mut ctx, &ChangedMap::new());

        // Registration order a, b, c: the general trait's work applies
        // first so later traits can observe and adjust it.
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
        let root = ctx.subtree().root();
        assert_eq!(ctx.subtree().attribute(root, "order"), Some("abc"));
    }

    #[test]
    fn test_inverted_trait_runs_before_its_base() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let traits = vec![
            tracer("a", false, &log),
            tracer("b", true, &log),
        ];

        let mut ctx = context_with(State::new());
        render_chain(&traits, &mut ctx, &ChangedMap::new());

        // The inverted outer trait does its own work before delegating.
        assert_eq!(*log.borrow(), vec!["b", "a"]);
    }

    #[test]
    fn test_request_update_is_deferred() {
        let mut ctx = context_with(State::new());
        let mut delta = StateDelta::new();
        delta.insert("later".to_string(), shared(json!(1)));
        let handle = ctx.request_update(delta);

        assert!(!handle.is_resolved());
        let (_, deferred) = ctx.into_parts();
        assert_eq!(deferred.len(), 1);
        assert!(deferred[0].0.contains_key("later"));
    }
}
