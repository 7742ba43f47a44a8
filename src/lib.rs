//! # strata-ui
//!
//! Reactive state and render kernel for trait-composed UI components.
//!
//! Every visual component built on this library shares the same core: a
//! per-instance state container, a chain of state-derivation hooks
//! contributed by independently authored trait layers, a batching
//! scheduler, and a lifecycle controller deciding when and what to
//! repaint.
//!
//! ## Architecture
//!
//! One update cycle per turn, in a strict order:
//!
//! ```text
//! request_update -> PendingBatch -> diff -> effects fixpoint ->
//! commit -> render -> rendered -> mounted? -> handles resolve
//! ```
//!
//! Traits compose without a central coordinator: the engine owns the
//! ordered trait list and threads a continuation through every hook, so
//! each layer sees its base chain's output and overlays its own, for
//! defaults, derived state, and subtree work alike.
//!
//! ## Modules
//!
//! - [`types`] - Shared types (state values, flags, property specs)
//! - [`state`] - State container and identity-based change tracking
//! - [`traits`] - Trait contract and component descriptor
//! - [`effects`] - Effects chain driven to a fixed point
//! - [`schedule`] - Per-turn batching and completion handles
//! - [`render`] - Base-first applier pipeline and subtree arena
//! - [`lifecycle`] - First-render/mount/update bookkeeping
//! - [`notify`] - Change notifications
//! - [`bridge`] - Attribute-to-property bridge
//! - [`services`] - Injected process-wide services
//! - [`component`] - The instance tying it all together

pub mod bridge;
pub mod component;
pub mod effects;
pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod render;
pub mod schedule;
pub mod services;
pub mod state;
pub mod traits;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use component::Component;

pub use error::EngineError;

pub use effects::MAX_EFFECT_PASSES;

pub use notify::{ChangeNotifier, ListenerId, ListenerRegistry, Notification, NotificationCallback};

pub use render::{NodeId, RenderContext, Subtree};

pub use schedule::{flush_turn, has_pending, settle, UpdateHandle, UpdateStatus};

pub use services::{ColorSchemeService, Services, ViewportService};

pub use state::{diff, ChangedMap, StateContainer};

pub use traits::{ComponentDescriptor, ComponentTrait, DefaultsNext, EffectsNext, RenderNext};
