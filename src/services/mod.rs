//! Process-wide services.
//!
//! The only cross-instance shared resources in the system. Each is an
//! explicit struct constructed once per process and injected at attach
//! time rather than referenced as an ambient global; instances register on
//! attach and unregister on detach, at arbitrary times. A service fans a
//! change out as an internal update request to each registered instance.
//!
//! - [`viewport`] - Visual-size changes
//! - [`scheme`] - Ambient light/dark preference

pub mod scheme;
pub mod viewport;

pub use scheme::ColorSchemeService;
pub use viewport::ViewportService;

use std::rc::{Rc, Weak};

use log::debug;

use crate::component::ComponentCore;

/// Token identifying one service registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceToken(u64);

// =============================================================================
// Registration roster
// =============================================================================

/// Weak registry of instances observing one service.
///
/// Instances register and unregister at arbitrary times; entries whose
/// instance was torn down without unregistering are pruned on the next
/// fan-out.
#[derive(Default)]
pub(crate) struct Roster {
    entries: Vec<(ServiceToken, Weak<ComponentCore>)>,
    next_token: u64,
}

impl Roster {
    pub(crate) fn register(&mut self, target: &Rc<ComponentCore>) -> ServiceToken {
        let token = ServiceToken(self.next_token);
        self.next_token += 1;
        self.entries.push((token, Rc::downgrade(target)));
        token
    }

    pub(crate) fn unregister(&mut self, token: ServiceToken) {
        self.entries.retain(|(entry_token, _)| *entry_token != token);
    }

    /// Strong references to the live registrants, pruning dead entries.
    pub(crate) fn live_targets(&mut self) -> Vec<Rc<ComponentCore>> {
        let before = self.entries.len();
        let mut targets = Vec::with_capacity(before);
        self.entries.retain(|(_, weak)| match weak.upgrade() {
            Some(target) => {
                targets.push(target);
                true
            }
            None => false,
        });
        let pruned = before - self.entries.len();
        if pruned > 0 {
            debug!("pruned {pruned} dead service registration(s)");
        }
        targets
    }

    pub(crate) fn live_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, weak)| weak.upgrade().is_some())
            .count()
    }
}

// =============================================================================
// Service bundle
// =============================================================================

/// The full set of injectable services, constructed once per process.
#[derive(Clone, Default)]
pub struct Services {
    pub viewport: ViewportService,
    pub color_scheme: ColorSchemeService,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }
}
