#![forbid(unsafe_code)]

//! The scope tree.
//!
//! A [`Scope`] is a shared handle to one node of a tree of model state.
//! Each node owns its children, its watchers and its event listeners, and
//! links to its parent weakly.
//!
//! # Architecture
//!
//! Reads are read-through: [`Scope::get`] walks the node's own values, then
//! each ancestor's, until the name is found. Writes are write-local:
//! [`Scope::set`] only ever touches the node it is called on.
//!
//! [`Scope::apply`] runs one top-down digest: a node's own watchers in
//! registration order, then each child's digest in creation order.
//! [`Scope::broadcast`] delivers an event down a subtree in the same order,
//! [`Scope::emit`] delivers it up to the root.
//!
//! Every pass iterates a snapshot of the list it walks, and no internal
//! borrow is held while user code runs. Callbacks may read and write model
//! state, register or cancel entries, generate children, or destroy scopes.
//!
//! # Invariants
//!
//! 1. `children()` holds exactly the live nodes generated under this node,
//!    in creation order.
//! 2. A destroyed node never runs a watcher or delivers an event again,
//!    and neither does any node of its former subtree.
//! 3. Within one digest, ancestor watchers run before descendant watchers.
//! 4. Within one broadcast, ancestor listeners run before descendant
//!    listeners; within one emit, a node's listeners run before its
//!    ancestors'.
//! 5. Entries registered during a pass do not run in that pass; entries
//!    cancelled during a pass do not run after the cancellation.
//!
//! # Failure Modes
//!
//! - Registering on, digesting, or delivering events through a destroyed
//!   scope does nothing. Registration returns an inert handle.
//! - Expression failures inside watchers yield `Undefined` and never abort
//!   the digest.
//! - A panic in a host callback or getter propagates to the caller of the
//!   pass that ran it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use scopewatch_expr::{Context, EvalError, Value, compile_cached};
use smallvec::SmallVec;
use tracing::{debug, trace, trace_span};

use crate::config::RuntimeConfig;
use crate::getter::{Getter, WatchSource, evaluate_in, resolve};
use crate::handle::Deregistration;
use crate::watcher::{ChangeCallback, CollectionWatcher, Watch, Watcher, WatcherId};

/// Event broadcast to a subtree just before it is destroyed.
pub const DESTROY_EVENT: &str = "destroy";

static SCOPE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static LISTENER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static ROOT: RefCell<Option<Scope>> = const { RefCell::new(None) };
}

/// Unique identifier of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    fn next() -> Self {
        Self(SCOPE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

/// Unique identifier of a registered event listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        Self(LISTENER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// One registered event listener.
pub(crate) struct ListenerSlot {
    id: ListenerId,
    active: Cell<bool>,
    callback: Box<dyn Fn(&[Value])>,
}

impl ListenerSlot {
    fn new(callback: impl Fn(&[Value]) + 'static) -> Self {
        Self {
            id: ListenerId::next(),
            active: Cell::new(true),
            callback: Box::new(callback),
        }
    }

    pub(crate) fn id(&self) -> ListenerId {
        self.id
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }

    pub(crate) fn cancel(&self) {
        self.active.set(false);
    }
}

type Listeners = SmallVec<[Rc<ListenerSlot>; 2]>;

struct ScopeInner {
    id: ScopeId,
    parent: Weak<RefCell<ScopeInner>>,
    children: Vec<Scope>,
    watchers: Vec<Rc<dyn Watch>>,
    listeners: AHashMap<Rc<str>, Listeners>,
    values: AHashMap<String, Value>,
    /// The scope whose in-progress `destroy` owns this node's teardown.
    teardown: Option<ScopeId>,
    destroyed: bool,
}

/// Shared handle to a scope node. Clones refer to the same node.
#[derive(Clone)]
pub struct Scope {
    inner: Rc<RefCell<ScopeInner>>,
}

/// Non-owning handle to a scope node.
#[derive(Clone, Default)]
pub struct WeakScope(Weak<RefCell<ScopeInner>>);

impl WeakScope {
    /// A handle that never upgrades.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn upgrade(&self) -> Option<Scope> {
        self.0.upgrade().map(|inner| Scope { inner })
    }
}

impl fmt::Debug for WeakScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(scope) => f.debug_tuple("WeakScope").field(&scope.id()).finish(),
            None => f.write_str("WeakScope(dropped)"),
        }
    }
}

impl Scope {
    fn with_parent(parent: Weak<RefCell<ScopeInner>>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ScopeInner {
                id: ScopeId::next(),
                parent,
                children: Vec::new(),
                watchers: Vec::new(),
                listeners: AHashMap::new(),
                values: AHashMap::new(),
                teardown: None,
                destroyed: false,
            })),
        }
    }

    /// The root scope of this thread, created on first access and again on
    /// the first access after it was destroyed.
    #[must_use]
    pub fn root() -> Self {
        ROOT.with(|root| root.borrow_mut().get_or_insert_with(Self::detached).clone())
    }

    /// A new parentless scope that is not the thread's root.
    #[must_use]
    pub fn detached() -> Self {
        Self::with_parent(Weak::new())
    }

    // -----------------------------------------------------------------------
    // Tree structure
    // -----------------------------------------------------------------------

    /// Create a child that reads through to this scope.
    ///
    /// On a destroyed scope this returns a parentless scope that is already
    /// destroyed.
    pub fn generate(&self) -> Scope {
        if self.is_destroyed() {
            let orphan = Self::detached();
            orphan.inner.borrow_mut().destroyed = true;
            return orphan;
        }
        let child = Self::with_parent(Rc::downgrade(&self.inner));
        self.inner.borrow_mut().children.push(child.clone());
        trace!(parent = self.id().get(), child = child.id().get(), "scope generated");
        child
    }

    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.inner.borrow().id
    }

    #[must_use]
    pub fn parent(&self) -> Option<Scope> {
        self.inner
            .borrow()
            .parent
            .upgrade()
            .map(|inner| Scope { inner })
    }

    /// Live children in creation order.
    #[must_use]
    pub fn children(&self) -> Vec<Scope> {
        self.inner.borrow().children.clone()
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.borrow().destroyed
    }

    /// Whether this is the thread's current root scope.
    #[must_use]
    pub fn is_root(&self) -> bool {
        ROOT.with(|root| root.borrow().as_ref().is_some_and(|r| r.ptr_eq(self)))
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakScope {
        WeakScope(Rc::downgrade(&self.inner))
    }

    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.inner
            .borrow()
            .watchers
            .iter()
            .filter(|w| w.is_active())
            .count()
    }

    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner
            .borrow()
            .listeners
            .get(event)
            .map_or(0, |slots| slots.iter().filter(|s| s.is_active()).count())
    }

    // -----------------------------------------------------------------------
    // Model state
    // -----------------------------------------------------------------------

    /// Assign `name` on this scope, shadowing any ancestor value.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.inner
            .borrow_mut()
            .values
            .insert(name.into(), value.into());
    }

    /// Value of `name` on this scope or its nearest ancestor defining it.
    #[must_use]
    pub fn get(&self, name: &str) -> Value {
        self.find(name).unwrap_or_default()
    }

    /// Value of `name` on this scope only.
    #[must_use]
    pub fn get_own(&self, name: &str) -> Option<Value> {
        self.inner.borrow().values.get(name).cloned()
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    #[must_use]
    pub fn has_own(&self, name: &str) -> bool {
        self.inner.borrow().values.contains_key(name)
    }

    /// Remove the local value of `name`, exposing any ancestor value again.
    pub fn unset(&self, name: &str) -> Option<Value> {
        self.inner.borrow_mut().values.remove(name)
    }

    fn find(&self, name: &str) -> Option<Value> {
        let mut current = Some(Rc::clone(&self.inner));
        while let Some(node) = current {
            let node = node.borrow();
            if let Some(value) = node.values.get(name) {
                return Some(value.clone());
            }
            current = node.parent.upgrade();
        }
        None
    }

    /// Evaluate `source` once against this scope. Failures yield
    /// `Undefined`.
    pub fn eval(&self, source: &str) -> Value {
        let expr = compile_cached(source, RuntimeConfig::global().dialect);
        evaluate_in(&expr, self)
    }

    /// Evaluate `source` once against this scope, reporting failures.
    pub fn try_eval(&self, source: &str) -> Result<Value, EvalError> {
        compile_cached(source, RuntimeConfig::global().dialect).try_evaluate(self)
    }

    // -----------------------------------------------------------------------
    // Watchers
    // -----------------------------------------------------------------------

    /// Watch `source`, calling `on_change(new, old)` whenever its value is
    /// no longer the same value as at the previous digest.
    pub fn watch(
        &self,
        source: impl Into<WatchSource>,
        on_change: impl Fn(&Value, &Value) + 'static,
    ) -> Deregistration {
        let callback: ChangeCallback = Rc::new(on_change);
        self.register(source.into(), |getter| Watcher::new(getter, Some(callback)))
    }

    /// Evaluate `source` on every digest without a callback.
    pub fn watch_effect(&self, source: impl Into<WatchSource>) -> Deregistration {
        self.register(source.into(), |getter| Watcher::new(getter, None))
    }

    /// Watch the top-level members of the array or object `source` yields.
    pub fn watch_collection(
        &self,
        source: impl Into<WatchSource>,
        on_change: impl Fn(&Value, &Value) + 'static,
    ) -> Deregistration {
        let callback: ChangeCallback = Rc::new(on_change);
        self.register(source.into(), |getter| {
            CollectionWatcher::new(getter, Some(callback))
        })
    }

    pub fn watch_collection_effect(&self, source: impl Into<WatchSource>) -> Deregistration {
        self.register(source.into(), |getter| CollectionWatcher::new(getter, None))
    }

    fn register<W: Watch + 'static>(
        &self,
        source: WatchSource,
        build: impl FnOnce(Getter) -> W,
    ) -> Deregistration {
        if self.is_destroyed() {
            return Deregistration::inert();
        }
        let getter = resolve(source, self, RuntimeConfig::global().dialect);
        self.add_watcher(Rc::new(build(getter)))
    }

    /// Append a custom watcher to this scope's digest.
    pub fn add_watcher(&self, watcher: Rc<dyn Watch>) -> Deregistration {
        let mut inner = self.inner.borrow_mut();
        if inner.destroyed {
            return Deregistration::inert();
        }
        let handle = Deregistration::watcher(self.downgrade(), &watcher);
        inner.watchers.push(watcher);
        handle
    }

    pub(crate) fn remove_watcher(&self, id: WatcherId) {
        self.inner.borrow_mut().watchers.retain(|w| w.id() != id);
    }

    /// Run one digest over this scope and its subtree. Returns the number
    /// of watchers that detected a change.
    pub fn apply(&self) -> usize {
        let _span = trace_span!("digest", scope = self.id().get()).entered();
        let changed = self.digest();
        trace!(changed, "digest finished");
        changed
    }

    fn digest(&self) -> usize {
        let (watchers, children) = {
            let inner = self.inner.borrow();
            if inner.destroyed {
                return 0;
            }
            (inner.watchers.clone(), inner.children.clone())
        };
        let mut changed = 0;
        for watcher in &watchers {
            if self.is_destroyed() {
                return changed;
            }
            if watcher.call() {
                changed += 1;
            }
        }
        for child in &children {
            changed += child.digest();
        }
        changed
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Listen for `event` on this scope.
    pub fn on(&self, event: &str, listener: impl Fn(&[Value]) + 'static) -> Deregistration {
        let mut inner = self.inner.borrow_mut();
        if inner.destroyed {
            return Deregistration::inert();
        }
        let event: Rc<str> = Rc::from(event);
        let slot = Rc::new(ListenerSlot::new(listener));
        let handle = Deregistration::listener(self.downgrade(), Rc::clone(&event), &slot);
        inner.listeners.entry(event).or_default().push(slot);
        handle
    }

    pub(crate) fn remove_listener(&self, event: &str, id: ListenerId) {
        let mut inner = self.inner.borrow_mut();
        let now_empty = match inner.listeners.get_mut(event) {
            Some(slots) => {
                slots.retain(|slot| slot.id != id);
                slots.is_empty()
            }
            None => false,
        };
        if now_empty {
            inner.listeners.remove(event);
        }
    }

    /// Deliver `event` to this scope and then, in creation order, to every
    /// live descendant.
    pub fn broadcast(&self, event: &str, args: &[Value]) {
        let _span = trace_span!("broadcast", event, scope = self.id().get()).entered();
        self.deliver_down(event, args);
    }

    fn deliver_down(&self, event: &str, args: &[Value]) {
        if !self.notify(event, args) {
            return;
        }
        let children = {
            let inner = self.inner.borrow();
            if inner.destroyed {
                return;
            }
            inner.children.clone()
        };
        for child in &children {
            child.deliver_down(event, args);
        }
    }

    /// Deliver `event` to this scope and then to each ancestor up to the
    /// root.
    pub fn emit(&self, event: &str, args: &[Value]) {
        let _span = trace_span!("emit", event, scope = self.id().get()).entered();
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            let parent = scope.parent();
            if !scope.notify(event, args) {
                return;
            }
            current = parent;
        }
    }

    /// Run this scope's own listeners for `event`. Returns `false` when the
    /// scope was already destroyed.
    fn notify(&self, event: &str, args: &[Value]) -> bool {
        let slots = {
            let inner = self.inner.borrow();
            if inner.destroyed {
                return false;
            }
            inner.listeners.get(event).cloned().unwrap_or_default()
        };
        for slot in &slots {
            if self.is_destroyed() {
                break;
            }
            if slot.is_active() {
                (slot.callback)(args);
            }
        }
        true
    }

    // -----------------------------------------------------------------------
    // Destruction
    // -----------------------------------------------------------------------

    /// Destroy this scope and its subtree.
    ///
    /// Broadcasts [`DESTROY_EVENT`] to the live subtree first, then detaches
    /// from the parent and releases every node depth-first. Destroying the
    /// root clears the thread's root so the next [`Scope::root`] builds a
    /// fresh one. Idempotent, including from inside a destroy listener: a
    /// scope already being destroyed is left to the outer call, and each
    /// node hears [`DESTROY_EVENT`] at most once.
    pub fn destroy(&self) {
        {
            let inner = self.inner.borrow();
            if inner.destroyed || inner.teardown.is_some() {
                return;
            }
        }
        let owner = self.id();
        self.claim_teardown(owner);
        {
            let _span = trace_span!("broadcast", event = DESTROY_EVENT, scope = owner.get())
                .entered();
            self.deliver_destroy(owner);
        }
        // A destroy listener may already have torn this scope down.
        if self.is_destroyed() {
            return;
        }
        if let Some(parent) = self.parent() {
            parent
                .inner
                .borrow_mut()
                .children
                .retain(|child| !child.ptr_eq(self));
        }
        let released = self.release();
        ROOT.with(|root| {
            let mut root = root.borrow_mut();
            if root.as_ref().is_some_and(|r| r.ptr_eq(self)) {
                *root = None;
            }
        });
        debug!(scope = owner.get(), released, "scope destroyed");
    }

    /// Claim every node of this subtree not already claimed by another
    /// `destroy` call.
    fn claim_teardown(&self, owner: ScopeId) {
        let children = {
            let mut inner = self.inner.borrow_mut();
            if inner.destroyed || inner.teardown.is_some() {
                return;
            }
            inner.teardown = Some(owner);
            inner.children.clone()
        };
        for child in &children {
            child.claim_teardown(owner);
        }
    }

    /// Deliver [`DESTROY_EVENT`] to the nodes `owner` claimed, parents
    /// first. A subtree claimed by another `destroy` call hears it from
    /// that call instead.
    fn deliver_destroy(&self, owner: ScopeId) {
        let claimed = self.inner.borrow().teardown == Some(owner);
        if !claimed || !self.notify(DESTROY_EVENT, &[]) {
            return;
        }
        let children = {
            let inner = self.inner.borrow();
            if inner.destroyed {
                return;
            }
            inner.children.clone()
        };
        for child in &children {
            child.deliver_destroy(owner);
        }
    }

    /// Mark this subtree destroyed, descendants first, and drop everything
    /// it owns. Returns the number of nodes released.
    fn release(&self) -> usize {
        let children = mem::take(&mut self.inner.borrow_mut().children);
        let released: usize = children.iter().map(Scope::release).sum();
        let (watchers, listeners) = {
            let mut inner = self.inner.borrow_mut();
            inner.destroyed = true;
            inner.parent = Weak::new();
            (
                mem::take(&mut inner.watchers),
                mem::take(&mut inner.listeners),
            )
        };
        for watcher in &watchers {
            watcher.cancel();
        }
        for slot in listeners.values().flatten() {
            slot.cancel();
        }
        released + 1
    }
}

/// Bare identifiers resolve through the scope chain.
impl Context for Scope {
    fn lookup(&self, name: &str) -> Value {
        self.get(name)
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Scope {}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => f
                .debug_struct("Scope")
                .field("id", &inner.id)
                .field("destroyed", &inner.destroyed)
                .field("children", &inner.children.len())
                .field("watchers", &inner.watchers.len())
                .field("values", &inner.values.len())
                .finish(),
            Err(_) => f.write_str("Scope(<borrowed>)"),
        }
    }
}
