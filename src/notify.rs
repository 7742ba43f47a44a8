//! Change notifications.
//!
//! When a commit changes a public key and the raise-change-events flag was
//! set for that write, the [`ChangeNotifier`] trait dispatches a
//! `<property>-changed` notification carrying the new value. Notifications
//! are an external interface: listeners registered on the instance receive
//! them synchronously during the post-render phase, after the subtree
//! already reflects the new state.

use std::cell::RefCell;
use std::rc::Rc;

use crate::render::RenderContext;
use crate::state::ChangedMap;
use crate::traits::{ComponentTrait, RenderNext};
use crate::types::StateDelta;

// =============================================================================
// Notifications
// =============================================================================

/// A named notification with a partial-state payload.
#[derive(Clone)]
pub struct Notification {
    /// Notification name, e.g. `selected-index-changed`.
    pub name: String,
    /// The new value(s), keyed by state key.
    pub payload: StateDelta,
}

/// Notification callback.
///
/// `Rc<dyn Fn>` so callbacks clone into closures without ownership issues.
pub type NotificationCallback = Rc<dyn Fn(&Notification)>;

/// Token identifying one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

// =============================================================================
// Listener registry
// =============================================================================

struct ListenerEntry {
    id: ListenerId,
    name: String,
    callback: NotificationCallback,
}

#[derive(Default)]
struct RegistryInner {
    entries: Vec<ListenerEntry>,
    next_id: u64,
}

/// Per-instance listener registry.
///
/// Cloning shares the registry; the render context holds a clone so
/// post-render hooks can dispatch without reaching into the instance.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Rc<RefCell<RegistryInner>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for notifications named `name`.
    pub fn add(&self, name: impl Into<String>, callback: impl Fn(&Notification) + 'static) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner.entries.push(ListenerEntry {
            id,
            name: name.into(),
            callback: Rc::new(callback),
        });
        id
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn remove(&self, id: ListenerId) {
        self.inner.borrow_mut().entries.retain(|entry| entry.id != id);
    }

    /// Dispatch to every listener registered for the notification's name.
    ///
    /// Callbacks run outside the registry borrow, so a listener may add or
    /// remove listeners from within its callback.
    pub fn dispatch(&self, notification: &Notification) {
        let callbacks: Vec<NotificationCallback> = self
            .inner
            .borrow()
            .entries
            .iter()
            .filter(|entry| entry.name == notification.name)
            .map(|entry| Rc::clone(&entry.callback))
            .collect();
        for callback in callbacks {
            callback(notification);
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// True if no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }
}

// =============================================================================
// ChangeNotifier trait
// =============================================================================

/// Trait layer that raises `<property>-changed` notifications.
///
/// Register it near the top of the trait stack. In the post-render phase
/// it walks the instance's declared public properties and, for each key
/// whose changed-bit is true and whose write captured the
/// raise-change-events flag, dispatches one notification named
/// `<attribute>-changed` carrying `{key: newValue}`.
pub struct ChangeNotifier;

impl ComponentTrait for ChangeNotifier {
    fn name(&self) -> &str {
        "change-notifier"
    }

    fn rendered(&self, ctx: &mut RenderContext, changed: &ChangedMap, next: RenderNext<'_>) {
        next(ctx);
        for spec in ctx.properties().to_vec() {
            if !changed.is_changed(&spec.key) || !ctx.raise_change_events(&spec.key) {
                continue;
            }
            let Some(value) = ctx.get(&spec.key) else {
                continue;
            };
            let mut payload = StateDelta::new();
            payload.insert(spec.key.clone(), Rc::clone(value));
            ctx.dispatch(format!("{}-changed", spec.attribute), payload);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{rendered_chain, Subtree};
    use crate::schedule::PendingBatch;
    use crate::schedule::UpdateHandle;
    use crate::types::{shared, PropertyKind, PropertySpec, State};
    use serde_json::json;

    #[test]
    fn test_listener_registry_dispatch_and_remove() {
        let registry = ListenerRegistry::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let seen_clone = Rc::clone(&seen);
        let id = registry.add("value-changed", move |n| {
            seen_clone.borrow_mut().push(n.name.clone());
        });
        registry.add("other-changed", |_| {});

        registry.dispatch(&Notification {
            name: "value-changed".to_string(),
            payload: StateDelta::new(),
        });
        assert_eq!(*seen.borrow(), vec!["value-changed".to_string()]);

        registry.remove(id);
        registry.dispatch(&Notification {
            name: "value-changed".to_string(),
            payload: StateDelta::new(),
        });
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_listener_may_mutate_registry_reentrantly() {
        let registry = ListenerRegistry::new();
        let registry_clone = registry.clone();
        registry.add("ping", move |_| {
            registry_clone.add("pong", |_| {});
        });

        registry.dispatch(&Notification {
            name: "ping".to_string(),
            payload: StateDelta::new(),
        });
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_change_notifier_respects_raise_capture() {
        let mut state = State::new();
        state.insert("selectedIndex".to_string(), shared(json!(1)));
        state.insert("quietKey".to_string(), shared(json!(2)));

        // selectedIndex written with the flag set, quietKey without.
        let mut batch = PendingBatch::default();
        let mut loud = StateDelta::new();
        loud.insert("selectedIndex".to_string(), shared(json!(1)));
        batch.accept(loud, true, UpdateHandle::new());
        let mut quiet = StateDelta::new();
        quiet.insert("quietKey".to_string(), shared(json!(2)));
        batch.accept(quiet, false, UpdateHandle::new());

        let listeners = ListenerRegistry::new();
        let received = Rc::new(RefCell::new(Vec::new()));
        let received_clone = Rc::clone(&received);
        listeners.add("selected-index-changed", move |n| {
            received_clone.borrow_mut().push(n.payload.clone());
        });
        listeners.add("quiet-key-changed", |_| panic!("quiet key must not notify"));

        let mut changed = ChangedMap::new();
        changed.mark("selectedIndex", true);
        changed.mark("quietKey", true);

        let mut ctx = RenderContext::new(
            state,
            vec![
                PropertySpec::new("selectedIndex", PropertyKind::Number),
                PropertySpec::new("quietKey", PropertyKind::Number),
            ],
            Subtree::new(),
            false,
            batch.raise_capture(),
            listeners,
        );

        let traits: Vec<Rc<dyn ComponentTrait>> = vec![Rc::new(ChangeNotifier)];
        rendered_chain(&traits, &mut ctx, &changed);

        let received = received.borrow();
        assert_eq!(received.len(), 1);
        assert_eq!(*received[0]["selectedIndex"], json!(1));
    }
}
