#![forbid(unsafe_code)]

//! Reactive data binding over a tree of scopes.
//!
//! Application code builds scopes under a per-thread root, stores model
//! state on them, and registers watchers and event listeners. After any
//! externally triggered state change the host calls [`apply`] and every
//! watcher whose value changed runs its callback, ancestors before
//! descendants.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use scopewatch::prelude::*;
//!
//! let list = scopewatch::generate();
//! let visible = Rc::new(RefCell::new(Value::Undefined));
//! let sink = Rc::clone(&visible);
//! list.watch("!!users.length", move |new, _| *sink.borrow_mut() = new.clone());
//!
//! list.set("users", Value::array([Value::object([("name", "Taro")])]));
//! scopewatch::apply();
//! assert_eq!(*visible.borrow(), Value::Bool(true));
//! ```
//!
//! # Crates
//!
//! - [`scopewatch_expr`]: model values and the expression language.
//! - [`scopewatch_runtime`]: scopes, watchers, events and configuration.

pub use scopewatch_expr as expr;
pub use scopewatch_runtime as runtime;

pub use scopewatch_expr::{
    Array, Context, Dialect, EvalError, ExprError, Expression, Function, Object, Value,
};
pub use scopewatch_runtime::{
    CollectionWatcher, DESTROY_EVENT, Deregistration, Getter, RuntimeConfig, Scope, ScopeId,
    Watch, WatchSource, Watcher, apply, generate,
};

/// The types most bindings need.
pub mod prelude {
    pub use scopewatch_expr::{Dialect, Expression, Value};
    pub use scopewatch_runtime::{
        DESTROY_EVENT, Deregistration, RuntimeConfig, Scope, WatchSource,
    };
}
