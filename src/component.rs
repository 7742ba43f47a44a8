//! Component instance: the update-cycle orchestrator.
//!
//! A component owns its state container, pending batch, subtree, and
//! listener registry, and wires the trait chain through one strict cycle
//! per turn:
//!
//! ```text
//! request_update -> PendingBatch -> (turn boundary) -> diff ->
//! effects fixpoint -> commit -> render -> rendered -> mounted? ->
//! resolve handles
//! ```
//!
//! The effects chain always reaches its fixed point before render runs,
//! so render never observes un-derived pending state; `rendered` always
//! follows `render`, and the turn's completion handles resolve last.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{debug, warn};

use crate::bridge;
use crate::effects::run_to_fixpoint;
use crate::error::EngineError;
use crate::lifecycle::LifecycleController;
use crate::notify::{ListenerId, ListenerRegistry, Notification};
use crate::render::{render_chain, rendered_chain, RenderContext, Subtree};
use crate::schedule::{self, PendingBatch, TurnParticipant, UpdateHandle, UpdateStatus};
use crate::services::{ServiceToken, Services};
use crate::state::StateContainer;
use crate::traits::ComponentDescriptor;
use crate::types::{merge_delta, shared, Flags, SharedValue, State, StateDelta};

// =============================================================================
// Component core
// =============================================================================

enum ServiceRegistration {
    Viewport(crate::services::ViewportService, ServiceToken),
    ColorScheme(crate::services::ColorSchemeService, ServiceToken),
}

/// Shared interior of one component instance.
pub(crate) struct ComponentCore {
    descriptor: ComponentDescriptor,
    container: RefCell<StateContainer>,
    pending: RefCell<PendingBatch>,
    subtree: RefCell<Subtree>,
    listeners: ListenerRegistry,
    lifecycle: RefCell<LifecycleController>,
    flags: Cell<Flags>,
    scheduled: Cell<bool>,
    registrations: RefCell<Vec<ServiceRegistration>>,
}

impl ComponentCore {
    /// Accept one update request into the pending batch and make sure the
    /// instance has a turn scheduled. The raise-change-events flag is
    /// captured now, at write time, because the commit is deferred.
    pub(crate) fn request_update_internal(
        this: &Rc<Self>,
        delta: StateDelta,
        handle: UpdateHandle,
    ) {
        let raise = this.flags.get().contains(Flags::RAISE_CHANGE_EVENTS);
        this.pending.borrow_mut().accept(delta, raise, handle);
        Self::schedule_if_needed(this);
    }

    /// Internal fire-and-forget update, used by service fan-out.
    pub(crate) fn push_update(this: &Rc<Self>, delta: StateDelta) {
        Self::request_update_internal(this, delta, UpdateHandle::new());
    }

    fn schedule_if_needed(this: &Rc<Self>) {
        if !this.scheduled.replace(true) {
            let as_participant: Rc<dyn TurnParticipant> = Rc::clone(this) as Rc<dyn TurnParticipant>;
            schedule::enqueue(Rc::downgrade(&as_participant));
        }
    }
}

impl TurnParticipant for ComponentCore {
    fn run_turn(self: Rc<Self>) -> Result<(), EngineError> {
        if self.flags.get().contains(Flags::RENDERING) {
            // Re-entrant render attempt; keep the work queued for the
            // next turn instead of rendering within the current pass.
            ComponentCore::schedule_if_needed(&self);
            return Ok(());
        }
        let batch = self.pending.borrow_mut().take();
        let first_render = self.flags.get().contains(Flags::FIRST_RENDER);

        let committed = self.container.borrow().current().clone();
        // The first commit diffs against nothing: defaults were never
        // observed, so every key reads as changed.
        let baseline = if first_render {
            State::new()
        } else {
            committed.clone()
        };
        let mut proposed = committed;
        merge_delta(&mut proposed, &batch.delta());

        let (final_state, changed, passes) =
            match run_to_fixpoint(self.descriptor.traits(), &baseline, proposed) {
                Ok(converged) => converged,
                Err(err) => {
                    // Abort: nothing committed, nothing rendered. The
                    // batch is already taken, so the bad values are gone.
                    for handle in batch.handles() {
                        handle.resolve(UpdateStatus::Failed);
                    }
                    return Err(err);
                }
            };
        debug!(
            "{}: committing after {passes} effects pass(es), changed: {:?}",
            self.descriptor.name(),
            changed.changed_keys()
        );
        self.container.borrow_mut().commit(final_state.clone());

        // Render phase. The subtree moves into the context for the pass;
        // the RENDERING flag defers any update requested by a hook to the
        // next turn.
        self.flags.set(self.flags.get() | Flags::RENDERING);
        let subtree = self.subtree.replace(Subtree::new());
        let mut ctx = RenderContext::new(
            final_state,
            self.descriptor.properties().to_vec(),
            subtree,
            first_render,
            batch.raise_capture(),
            self.listeners.clone(),
        );

        render_chain(self.descriptor.traits(), &mut ctx, &changed);
        rendered_chain(self.descriptor.traits(), &mut ctx, &changed);

        let fire_mounted = self.lifecycle.borrow_mut().finish_render_pass();
        if fire_mounted {
            for layer in self.descriptor.traits() {
                layer.mounted(&mut ctx);
            }
        }

        let (subtree, deferred) = ctx.into_parts();
        self.subtree.replace(subtree);
        let mut flags = self.flags.get();
        flags -= Flags::RENDERING;
        flags -= Flags::FIRST_RENDER;
        self.flags.set(flags);

        for (delta, handle) in deferred {
            ComponentCore::request_update_internal(&self, delta, handle);
        }
        for handle in batch.handles() {
            handle.resolve(UpdateStatus::Complete);
        }
        Ok(())
    }

    fn clear_scheduled(&self) {
        self.scheduled.set(false);
    }
}

// =============================================================================
// Component
// =============================================================================

/// One component instance.
///
/// Cloning yields another handle to the same instance. State lives only
/// as long as the instance: when the last handle drops, the state, the
/// subtree, and any stale scheduler or service entries die with it.
#[derive(Clone)]
pub struct Component {
    core: Rc<ComponentCore>,
}

impl Component {
    /// Create an instance from a descriptor. Initial state is assembled
    /// from the trait chain's defaults.
    pub fn new(descriptor: ComponentDescriptor) -> Self {
        let defaults = descriptor.assemble_defaults();
        Self {
            core: Rc::new(ComponentCore {
                descriptor,
                container: RefCell::new(StateContainer::new(defaults)),
                pending: RefCell::new(PendingBatch::default()),
                subtree: RefCell::new(Subtree::new()),
                listeners: ListenerRegistry::new(),
                lifecycle: RefCell::new(LifecycleController::new()),
                flags: Cell::new(Flags::FIRST_RENDER),
                scheduled: Cell::new(false),
                registrations: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Component name, from the descriptor.
    pub fn name(&self) -> &str {
        self.core.descriptor.name()
    }

    /// The descriptor this instance was built from.
    pub fn descriptor(&self) -> &ComponentDescriptor {
        &self.core.descriptor
    }

    // -------------------------------------------------------------------------
    // State access
    // -------------------------------------------------------------------------

    /// Snapshot of the committed state.
    pub fn state(&self) -> State {
        self.core.container.borrow().current().clone()
    }

    /// Committed value for one key.
    pub fn get(&self, key: &str) -> Option<SharedValue> {
        self.core.container.borrow().get(key).cloned()
    }

    /// Request a partial-state update.
    ///
    /// Requests within one synchronous turn merge last-write-wins per key
    /// into a single commit at the next turn boundary. The handle resolves
    /// once that turn's render and lifecycle pass finishes.
    pub fn request_update(&self, delta: StateDelta) -> UpdateHandle {
        let handle = UpdateHandle::new();
        ComponentCore::request_update_internal(&self.core, delta, handle.clone());
        handle
    }

    /// True if update requests are waiting for the next turn boundary.
    pub fn has_pending_updates(&self) -> bool {
        !self.core.pending.borrow().is_empty()
    }

    // -------------------------------------------------------------------------
    // Property accessors
    // -------------------------------------------------------------------------

    /// Write a public property from its external string form.
    ///
    /// Invalid input (an unknown key, or a value that does not parse per
    /// the property's kind) is silently ignored: no commit is requested
    /// and nothing is thrown. Returns the update handle when a write was
    /// accepted.
    pub fn set_property(&self, key: &str, raw: &str) -> Option<UpdateHandle> {
        let Some(spec) = self.core.descriptor.property(key) else {
            warn!("{}: ignoring write to unknown property {key:?}", self.name());
            return None;
        };
        let Some(value) = bridge::parse_property(spec.kind, raw) else {
            warn!(
                "{}: ignoring invalid value {raw:?} for property {key:?}",
                self.name()
            );
            return None;
        };
        let mut delta = StateDelta::new();
        delta.insert(key.to_string(), shared(value));
        Some(self.request_update(delta))
    }

    /// Apply an external attribute change through the name-mapping table.
    pub fn set_attribute(&self, attribute: &str, raw: &str) -> Option<UpdateHandle> {
        bridge::apply_attribute(self, attribute, raw)
    }

    // -------------------------------------------------------------------------
    // Flags
    // -------------------------------------------------------------------------

    /// Toggle whether subsequent writes raise change notifications.
    /// Interaction handlers set this around their body of work.
    pub fn set_raise_change_events(&self, raise: bool) {
        let mut flags = self.core.flags.get();
        flags.set(Flags::RAISE_CHANGE_EVENTS, raise);
        self.core.flags.set(flags);
    }

    /// Whether writes currently raise change notifications.
    pub fn raise_change_events(&self) -> bool {
        self.core.flags.get().contains(Flags::RAISE_CHANGE_EVENTS)
    }

    /// True until the instance's first render pass completes.
    pub fn first_render(&self) -> bool {
        self.core.flags.get().contains(Flags::FIRST_RENDER)
    }

    // -------------------------------------------------------------------------
    // Notifications
    // -------------------------------------------------------------------------

    /// Listen for notifications named `name`.
    pub fn add_listener(
        &self,
        name: impl Into<String>,
        callback: impl Fn(&Notification) + 'static,
    ) -> ListenerId {
        self.core.listeners.add(name, callback)
    }

    /// Remove a listener.
    pub fn remove_listener(&self, id: ListenerId) {
        self.core.listeners.remove(id);
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Attach to a host: register with the observed services and schedule
    /// the mount render. Attaching twice is a no-op.
    pub fn attach(&self, services: &Services) {
        if self.core.lifecycle.borrow().is_attached() {
            return;
        }
        self.core.lifecycle.borrow_mut().note_attached();

        if self.core.descriptor.observes_viewport() {
            let token = services.viewport.register(&self.core);
            self.core
                .registrations
                .borrow_mut()
                .push(ServiceRegistration::Viewport(services.viewport.clone(), token));
        }
        if self.core.descriptor.observes_color_scheme() {
            let token = services.color_scheme.register(&self.core);
            self.core.registrations.borrow_mut().push(
                ServiceRegistration::ColorScheme(services.color_scheme.clone(), token),
            );
        }

        // Mount render: an empty request still produces a commit.
        ComponentCore::push_update(&self.core, StateDelta::new());
    }

    /// Detach from the host: unregister from services and notify traits.
    /// Detaching while not attached is a no-op.
    pub fn detach(&self) {
        if !self.core.lifecycle.borrow().is_attached() {
            return;
        }
        self.core.lifecycle.borrow_mut().note_detached();
        for registration in self.core.registrations.borrow_mut().drain(..) {
            match registration {
                ServiceRegistration::Viewport(service, token) => service.unregister(token),
                ServiceRegistration::ColorScheme(service, token) => service.unregister(token),
            }
        }
        for layer in self.core.descriptor.traits() {
            layer.detached();
        }
    }

    /// True while attached to a host.
    pub fn is_attached(&self) -> bool {
        self.core.lifecycle.borrow().is_attached()
    }

    /// Completed render passes.
    pub fn render_count(&self) -> usize {
        self.core.lifecycle.borrow().render_count()
    }

    // -------------------------------------------------------------------------
    // Subtree
    // -------------------------------------------------------------------------

    /// Read the instance's subtree.
    pub fn with_subtree<R>(&self, read: impl FnOnce(&Subtree) -> R) -> R {
        read(&self.core.subtree.borrow())
    }
}

// =============================================================================
// Tests
// =============================================================================
