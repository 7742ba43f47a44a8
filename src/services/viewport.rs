//! Viewport service: one observer for visual-size changes.
//!
//! The host reports size changes once, process-wide; the service fans each
//! change out to every registered instance as an internal update request
//! against the `viewportWidth`/`viewportHeight` state keys. A newly
//! registered instance is seeded with the current size so late attaches
//! converge with everyone else.

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;
use serde_json::json;

use super::{Roster, ServiceToken};
use crate::component::ComponentCore;
use crate::types::{shared, StateDelta};

#[derive(Default)]
struct ViewportInner {
    size: Option<(u32, u32)>,
    roster: Roster,
}

/// Process-wide visual-size observer.
#[derive(Clone, Default)]
pub struct ViewportService {
    inner: Rc<RefCell<ViewportInner>>,
}

impl ViewportService {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last reported size.
    pub fn size(&self) -> Option<(u32, u32)> {
        self.inner.borrow().size
    }

    /// Number of live registered instances.
    pub fn registered_count(&self) -> usize {
        self.inner.borrow().roster.live_count()
    }

    /// Report a size change and fan it out to registered instances.
    ///
    /// Reporting an unchanged size is a no-op.
    pub fn set_size(&self, width: u32, height: u32) {
        let targets = {
            let mut inner = self.inner.borrow_mut();
            if inner.size == Some((width, height)) {
                return;
            }
            inner.size = Some((width, height));
            inner.roster.live_targets()
        };
        debug!("viewport {width}x{height}: notifying {} instance(s)", targets.len());
        for target in targets {
            ComponentCore::push_update(&target, size_delta(width, height));
        }
    }

    pub(crate) fn register(&self, target: &Rc<ComponentCore>) -> ServiceToken {
        let (token, seed) = {
            let mut inner = self.inner.borrow_mut();
            (inner.roster.register(target), inner.size)
        };
        if let Some((width, height)) = seed {
            ComponentCore::push_update(target, size_delta(width, height));
        }
        token
    }

    pub(crate) fn unregister(&self, token: ServiceToken) {
        self.inner.borrow_mut().roster.unregister(token);
    }
}

fn size_delta(width: u32, height: u32) -> StateDelta {
    let mut delta = StateDelta::new();
    delta.insert("viewportWidth".to_string(), shared(json!(width)));
    delta.insert("viewportHeight".to_string(), shared(json!(height)));
    delta
}
