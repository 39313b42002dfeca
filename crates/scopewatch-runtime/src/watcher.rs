#![forbid(unsafe_code)]

//! Change-detecting watchers.
//!
//! A watcher pairs a [`Getter`] with a cached previous result and an
//! optional change callback. Each digest invokes [`Watch::call`] once.
//!
//! - [`Watcher`] compares whole values with [`Value::same_value`].
//! - [`CollectionWatcher`] compares the top-level members of an array or
//!   object against a shallow snapshot.
//!
//! # Invariants
//!
//! 1. The cache starts as "never observed", so the first call always fires,
//!    reporting `Undefined` as the old value.
//! 2. A call with no change since the previous call never fires.
//! 3. No internal borrow is held while the getter or callback runs.
//! 4. A cancelled watcher never evaluates its getter again.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use scopewatch_expr::Value;
use tracing::trace;

use crate::getter::Getter;

static WATCHER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Callback invoked with `(new_value, old_value)` when a watcher fires.
pub type ChangeCallback = Rc<dyn Fn(&Value, &Value)>;

/// Unique identifier of a registered watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(u64);

impl WatcherId {
    fn next() -> Self {
        Self(WATCHER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Something a scope runs once per digest.
pub trait Watch {
    fn id(&self) -> WatcherId;

    /// Evaluate once and fire the callback on change. Returns whether a
    /// change was detected.
    fn call(&self) -> bool;

    /// Stop evaluating. Idempotent.
    fn cancel(&self);

    fn is_active(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

/// Scalar watcher: fires when the getter result is no longer the same value.
pub struct Watcher {
    id: WatcherId,
    getter: Getter,
    callback: Option<ChangeCallback>,
    last: RefCell<Option<Value>>,
    active: Cell<bool>,
}

impl Watcher {
    #[must_use]
    pub fn new(getter: Getter, callback: Option<ChangeCallback>) -> Self {
        Self {
            id: WatcherId::next(),
            getter,
            callback,
            last: RefCell::new(None),
            active: Cell::new(true),
        }
    }

    /// Last observed value, or `None` before the first call.
    #[must_use]
    pub fn last_value(&self) -> Option<Value> {
        self.last.borrow().clone()
    }
}

impl Watch for Watcher {
    fn id(&self) -> WatcherId {
        self.id
    }

    fn call(&self) -> bool {
        if !self.is_active() {
            return false;
        }
        let new = (self.getter)();
        let old = {
            let last = self.last.borrow();
            match &*last {
                Some(prev) if prev.same_value(&new) => return false,
                Some(prev) => prev.clone(),
                None => Value::Undefined,
            }
        };
        *self.last.borrow_mut() = Some(new.clone());
        trace!(watcher = self.id.get(), "watcher value changed");
        if let Some(callback) = &self.callback {
            callback(&new, &old);
        }
        true
    }

    fn cancel(&self) {
        self.active.set(false);
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id)
            .field("active", &self.active.get())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// CollectionWatcher
// ---------------------------------------------------------------------------

/// Shallow copy of the last observed result.
enum Snapshot {
    Never,
    Scalar(Value),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Snapshot {
    fn capture(value: &Value) -> Self {
        match value {
            Value::Array(items) => Snapshot::Array(items.to_vec()),
            Value::Object(members) => Snapshot::Object(members.to_map()),
            other => Snapshot::Scalar(other.clone()),
        }
    }

    /// Whether `value` has the same shape and top-level members.
    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Snapshot::Array(prev), Value::Array(items)) => {
                let items = items.borrow();
                prev.len() == items.len()
                    && prev.iter().zip(items.iter()).all(|(a, b)| a.same_value(b))
            }
            (Snapshot::Object(prev), Value::Object(members)) => {
                let members = members.borrow();
                prev.len() == members.len()
                    && prev
                        .iter()
                        .zip(members.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va.same_value(vb))
            }
            (Snapshot::Scalar(prev), value) if !value.is_collection() => prev.same_value(value),
            _ => false,
        }
    }
}

/// Shallow collection watcher: fires when an element or member is added,
/// removed, or replaced. Nested changes are not seen.
///
/// The callback receives the live collections, not the snapshots: the old
/// value is whatever the getter returned on the previous change.
pub struct CollectionWatcher {
    id: WatcherId,
    getter: Getter,
    callback: Option<ChangeCallback>,
    snapshot: RefCell<Snapshot>,
    last: RefCell<Value>,
    active: Cell<bool>,
}

impl CollectionWatcher {
    #[must_use]
    pub fn new(getter: Getter, callback: Option<ChangeCallback>) -> Self {
        Self {
            id: WatcherId::next(),
            getter,
            callback,
            snapshot: RefCell::new(Snapshot::Never),
            last: RefCell::new(Value::Undefined),
            active: Cell::new(true),
        }
    }
}

impl Watch for CollectionWatcher {
    fn id(&self) -> WatcherId {
        self.id
    }

    fn call(&self) -> bool {
        if !self.is_active() {
            return false;
        }
        let new = (self.getter)();
        if self.snapshot.borrow().matches(&new) {
            return false;
        }
        *self.snapshot.borrow_mut() = Snapshot::capture(&new);
        let old = self.last.replace(new.clone());
        trace!(watcher = self.id.get(), "collection changed");
        if let Some(callback) = &self.callback {
            callback(&new, &old);
        }
        true
    }

    fn cancel(&self) {
        self.active.set(false);
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }
}

impl fmt::Debug for CollectionWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionWatcher")
            .field("id", &self.id)
            .field("active", &self.active.get())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopewatch_expr::{Array, Object};

    type Calls = Rc<RefCell<Vec<(Value, Value)>>>;

    fn recorder() -> (Calls, ChangeCallback) {
        let calls: Calls = Rc::default();
        let sink = Rc::clone(&calls);
        let callback: ChangeCallback = Rc::new(move |new: &Value, old: &Value| {
            sink.borrow_mut().push((new.clone(), old.clone()));
        });
        (calls, callback)
    }

    fn cell_getter(cell: &Rc<RefCell<Value>>) -> Getter {
        let cell = Rc::clone(cell);
        Rc::new(move || cell.borrow().clone())
    }

    #[test]
    fn first_call_fires_with_undefined_old_value() {
        let (calls, callback) = recorder();
        let watcher = Watcher::new(Rc::new(|| Value::from(1)), Some(callback));
        assert!(watcher.call());
        assert_eq!(*calls.borrow(), vec![(Value::from(1), Value::Undefined)]);
    }

    #[test]
    fn first_call_fires_even_for_undefined() {
        let (calls, callback) = recorder();
        let watcher = Watcher::new(Rc::new(|| Value::Undefined), Some(callback));
        assert!(watcher.call());
        assert!(!watcher.call());
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn fires_only_on_change() {
        let source = Rc::new(RefCell::new(Value::from("a")));
        let (calls, callback) = recorder();
        let watcher = Watcher::new(cell_getter(&source), Some(callback));

        watcher.call();
        watcher.call();
        *source.borrow_mut() = Value::from("b");
        watcher.call();
        watcher.call();

        assert_eq!(
            *calls.borrow(),
            vec![
                (Value::from("a"), Value::Undefined),
                (Value::from("b"), Value::from("a")),
            ]
        );
    }

    #[test]
    fn nan_does_not_refire() {
        let watcher = Watcher::new(Rc::new(|| Value::Number(f64::NAN)), None);
        assert!(watcher.call());
        assert!(!watcher.call());
    }

    #[test]
    fn callbackless_watcher_still_evaluates() {
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let watcher = Watcher::new(
            Rc::new(move || {
                counter.set(counter.get() + 1);
                Value::from(counter.get())
            }),
            None,
        );
        watcher.call();
        watcher.call();
        assert_eq!(hits.get(), 2);
        assert_eq!(watcher.last_value(), Some(Value::from(2)));
    }

    #[test]
    fn cancelled_watcher_skips_getter() {
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let watcher = Watcher::new(
            Rc::new(move || {
                counter.set(counter.get() + 1);
                Value::Null
            }),
            None,
        );
        watcher.cancel();
        watcher.cancel();
        assert!(!watcher.call());
        assert_eq!(hits.get(), 0);
        assert!(!watcher.is_active());
    }

    #[test]
    fn scalar_watcher_ignores_in_place_mutation() {
        let items = Array::from_vec(vec![Value::from(1)]);
        let live = Value::from(items.clone());
        let watcher = Watcher::new(Rc::new(move || live.clone()), None);
        watcher.call();
        items.push(2);
        assert!(!watcher.call());
    }

    #[test]
    fn collection_detects_added_removed_and_replaced_elements() {
        let items = Array::from_vec(vec![Value::from(1), Value::from(2)]);
        let live = Value::from(items.clone());
        let (calls, callback) = recorder();
        let watcher = CollectionWatcher::new(Rc::new(move || live.clone()), Some(callback));

        assert!(watcher.call());
        assert!(!watcher.call());
        items.push(3);
        assert!(watcher.call());
        items.remove(0);
        assert!(watcher.call());
        items.set(0, "two");
        assert!(watcher.call());
        assert!(!watcher.call());
        assert_eq!(calls.borrow().len(), 4);
    }

    #[test]
    fn collection_reports_live_values() {
        let members = Object::new();
        members.set("a", 1);
        let live = Value::from(members.clone());
        let (calls, callback) = recorder();
        let watcher = CollectionWatcher::new(Rc::new(move || live.clone()), Some(callback));

        watcher.call();
        members.set("b", 2);
        watcher.call();

        let calls = calls.borrow();
        let (new, old) = &calls[1];
        assert!(new.as_object().unwrap().ptr_eq(&members));
        assert!(old.as_object().unwrap().ptr_eq(&members));
        assert_eq!(new.to_json(), serde_json::json!({"a": 1, "b": 2}));
    }

    #[test]
    fn collection_ignores_nested_changes() {
        let inner = Object::new();
        inner.set("b", 1);
        let outer = Object::new();
        outer.set("a", inner.clone());
        let live = Value::from(outer);
        let watcher = CollectionWatcher::new(Rc::new(move || live.clone()), None);

        watcher.call();
        inner.set("b", 2);
        assert!(!watcher.call());
    }

    #[test]
    fn collection_treats_equal_contents_as_unchanged() {
        let source = Rc::new(RefCell::new(Value::array([1, 2])));
        let watcher = CollectionWatcher::new(cell_getter(&source), None);
        watcher.call();
        *source.borrow_mut() = Value::array([1, 2]);
        assert!(!watcher.call());
    }

    #[test]
    fn collection_shape_change_fires() {
        let source = Rc::new(RefCell::new(Value::array(Vec::<Value>::new())));
        let watcher = CollectionWatcher::new(cell_getter(&source), None);
        watcher.call();
        *source.borrow_mut() = Value::object(Vec::<(String, Value)>::new());
        assert!(watcher.call());
        *source.borrow_mut() = Value::Null;
        assert!(watcher.call());
        *source.borrow_mut() = Value::Null;
        assert!(!watcher.call());
    }
}
