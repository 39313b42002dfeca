#![forbid(unsafe_code)]

//! Deregistration handles.
//!
//! [`Deregistration`] is returned by every `watch*` and `on` call. It holds
//! the scope and the registered entry weakly, so keeping a handle around
//! never keeps a destroyed scope or its callbacks alive.
//!
//! # Invariants
//!
//! 1. `cancel()` removes exactly the entry it was created for, by id.
//! 2. `cancel()` is idempotent; only the first call has an effect.
//! 3. A cancelled entry is skipped by a digest or event pass that is
//!    already in progress.
//! 4. Dropping the handle does not cancel anything.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::scope::{ListenerId, ListenerSlot, WeakScope};
use crate::watcher::{Watch, WatcherId};

enum Target {
    Inert,
    Watcher {
        id: WatcherId,
        watcher: Weak<dyn Watch>,
    },
    Listener {
        event: Rc<str>,
        id: ListenerId,
        slot: Weak<ListenerSlot>,
    },
}

/// Cancellation token for one watcher or listener.
pub struct Deregistration {
    scope: WeakScope,
    target: Target,
    cancelled: Cell<bool>,
}

impl Deregistration {
    /// A handle that was never attached to anything, as returned when
    /// registering on a destroyed scope.
    #[must_use]
    pub fn inert() -> Self {
        Self {
            scope: WeakScope::new(),
            target: Target::Inert,
            cancelled: Cell::new(true),
        }
    }

    pub(crate) fn watcher(scope: WeakScope, watcher: &Rc<dyn Watch>) -> Self {
        Self {
            scope,
            target: Target::Watcher {
                id: watcher.id(),
                watcher: Rc::downgrade(watcher),
            },
            cancelled: Cell::new(false),
        }
    }

    pub(crate) fn listener(scope: WeakScope, event: Rc<str>, slot: &Rc<ListenerSlot>) -> Self {
        Self {
            scope,
            target: Target::Listener {
                event,
                id: slot.id(),
                slot: Rc::downgrade(slot),
            },
            cancelled: Cell::new(false),
        }
    }

    /// Remove the registered entry. Later calls do nothing.
    pub fn cancel(&self) {
        if self.cancelled.replace(true) {
            return;
        }
        match &self.target {
            Target::Inert => {}
            Target::Watcher { id, watcher } => {
                if let Some(watcher) = watcher.upgrade() {
                    watcher.cancel();
                }
                if let Some(scope) = self.scope.upgrade() {
                    scope.remove_watcher(*id);
                }
            }
            Target::Listener { event, id, slot } => {
                if let Some(slot) = slot.upgrade() {
                    slot.cancel();
                }
                if let Some(scope) = self.scope.upgrade() {
                    scope.remove_listener(event, *id);
                }
            }
        }
    }

    /// Whether the entry can no longer run: cancelled through this handle,
    /// released by a destroy, or never registered.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.get() {
            return true;
        }
        match &self.target {
            Target::Inert => true,
            Target::Watcher { watcher, .. } => watcher.upgrade().is_none_or(|w| !w.is_active()),
            Target::Listener { slot, .. } => slot.upgrade().is_none_or(|s| !s.is_active()),
        }
    }
}

impl fmt::Debug for Deregistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match &self.target {
            Target::Inert => "inert".to_owned(),
            Target::Watcher { id, .. } => format!("watcher {}", id.get()),
            Target::Listener { event, id, .. } => format!("listener {} on {event:?}", id.get()),
        };
        f.debug_struct("Deregistration")
            .field("target", &target)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
