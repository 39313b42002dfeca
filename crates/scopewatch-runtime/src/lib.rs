#![forbid(unsafe_code)]

//! Scope tree, dirty-checking digest and event bus for scopewatch.
//!
//! This crate provides:
//! - [`Scope`], a node of hierarchical model state with read-through
//!   inheritance, watchers, and event listeners
//! - [`Watcher`] and [`CollectionWatcher`], the change detectors a digest runs
//! - [`WatchSource`] and [`resolve`], which turn text, compiled expressions,
//!   host getters and literals into getters
//! - [`Deregistration`], the cancellation token for watchers and listeners
//! - [`RuntimeConfig`], the per-thread settings used when binding text
//!
//! Everything here is single-threaded: each thread owns an independent root
//! scope, configuration, and expression cache.

pub mod config;
pub mod getter;
pub mod handle;
pub mod scope;
pub mod watcher;

pub use config::{CACHE_CAPACITY_ENV, DIALECT_ENV, RuntimeConfig};
pub use getter::{Getter, WatchSource, evaluate_in, resolve};
pub use handle::Deregistration;
pub use scope::{DESTROY_EVENT, ListenerId, Scope, ScopeId, WeakScope};
pub use watcher::{ChangeCallback, CollectionWatcher, Watch, Watcher, WatcherId};

/// Generate a child of this thread's root scope.
pub fn generate() -> Scope {
    Scope::root().generate()
}

/// Digest this thread's whole scope tree. Returns the number of watchers
/// that detected a change.
pub fn apply() -> usize {
    Scope::root().apply()
}
