//! Color-scheme service: one listener for the ambient light/dark
//! preference.
//!
//! Fans preference changes out to every registered instance as an internal
//! update request against the `darkMode` state key. Registration seeds the
//! instance with the current preference.

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;
use serde_json::json;

use super::{Roster, ServiceToken};
use crate::component::ComponentCore;
use crate::types::{shared, ColorScheme, StateDelta};

#[derive(Default)]
struct SchemeInner {
    scheme: ColorScheme,
    roster: Roster,
}

/// Process-wide light/dark preference listener.
#[derive(Clone, Default)]
pub struct ColorSchemeService {
    inner: Rc<RefCell<SchemeInner>>,
}

impl ColorSchemeService {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current preference.
    pub fn scheme(&self) -> ColorScheme {
        self.inner.borrow().scheme
    }

    /// Number of live registered instances.
    pub fn registered_count(&self) -> usize {
        self.inner.borrow().roster.live_count()
    }

    /// Report a preference change and fan it out.
    ///
    /// Reporting the current preference again is a no-op.
    pub fn set_scheme(&self, scheme: ColorScheme) {
        let targets = {
            let mut inner = self.inner.borrow_mut();
            if inner.scheme == scheme {
                return;
            }
            inner.scheme = scheme;
            inner.roster.live_targets()
        };
        debug!("color scheme {scheme:?}: notifying {} instance(s)", targets.len());
        for target in targets {
            ComponentCore::push_update(&target, scheme_delta(scheme));
        }
    }

    pub(crate) fn register(&self, target: &Rc<ComponentCore>) -> ServiceToken {
        let (token, scheme) = {
            let mut inner = self.inner.borrow_mut();
            (inner.roster.register(target), inner.scheme)
        };
        ComponentCore::push_update(target, scheme_delta(scheme));
        token
    }

    pub(crate) fn unregister(&self, token: ServiceToken) {
        self.inner.borrow_mut().roster.unregister(token);
    }
}

fn scheme_delta(scheme: ColorScheme) -> StateDelta {
    let mut delta = StateDelta::new();
    delta.insert("darkMode".to_string(), shared(json!(scheme.is_dark())));
    delta
}
