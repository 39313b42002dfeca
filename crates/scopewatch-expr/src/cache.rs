#![forbid(unsafe_code)]

//! Compiled-expression cache.
//!
//! Bindings are usually declared with the same handful of texts over and
//! over (one per repeated row, for instance). The cache compiles each
//! distinct `(dialect, source)` pair once and hands out shared
//! [`Expression`]s.
//!
//! # Invariants
//!
//! 1. For a cached key, every lookup returns the same `Rc` until the entry
//!    is evicted or the cache is cleared.
//! 2. At most `capacity` entries are retained; the least recently used
//!    entry is evicted first.
//! 3. `hits + misses` equals the number of lookups since creation or the
//!    last [`ExpressionCache::clear`].

use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::rc::Rc;

use lru::LruCache;

use crate::compile::{Dialect, Expression};

/// Default number of retained expressions.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

thread_local! {
    static DEFAULT_CACHE: RefCell<ExpressionCache> =
        RefCell::new(ExpressionCache::new(DEFAULT_CACHE_CAPACITY));
}

/// Lookup counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// LRU cache of compiled expressions.
pub struct ExpressionCache {
    entries: LruCache<(Dialect, String), Rc<Expression>>,
    stats: CacheStats,
}

fn non_zero(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}

impl ExpressionCache {
    /// Create a cache retaining at most `capacity` expressions (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::new(non_zero(capacity)),
            stats: CacheStats::default(),
        }
    }

    /// Return the cached expression for `source`, compiling it on a miss.
    pub fn get_or_compile(&mut self, source: &str, dialect: Dialect) -> Rc<Expression> {
        let key = (dialect, source.to_owned());
        if let Some(hit) = self.entries.get(&key) {
            self.stats.hits += 1;
            return Rc::clone(hit);
        }
        self.stats.misses += 1;
        let compiled = Rc::new(Expression::compile_with(source, dialect));
        self.entries.put(key, Rc::clone(&compiled));
        compiled
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Change the capacity, evicting least recently used entries if needed.
    pub fn resize(&mut self, capacity: usize) {
        self.entries.resize(non_zero(capacity));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.stats = CacheStats::default();
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

impl Default for ExpressionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl std::fmt::Debug for ExpressionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity())
            .field("stats", &self.stats)
            .finish()
    }
}

/// Compile through this thread's shared cache.
pub fn compile_cached(source: &str, dialect: Dialect) -> Rc<Expression> {
    DEFAULT_CACHE.with(|cache| cache.borrow_mut().get_or_compile(source, dialect))
}

/// Resize this thread's shared cache.
pub fn set_cache_capacity(capacity: usize) {
    DEFAULT_CACHE.with(|cache| cache.borrow_mut().resize(capacity));
}

/// Counters of this thread's shared cache.
#[must_use]
pub fn cache_stats() -> CacheStats {
    DEFAULT_CACHE.with(|cache| cache.borrow().stats())
}

/// Empty this thread's shared cache.
pub fn clear_cache() {
    DEFAULT_CACHE.with(|cache| cache.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_source_compiles_once() {
        let mut cache = ExpressionCache::new(4);
        let a = cache.get_or_compile("user.name", Dialect::Strict);
        let b = cache.get_or_compile("user.name", Dialect::Strict);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn dialect_is_part_of_the_key() {
        let mut cache = ExpressionCache::new(4);
        let strict = cache.get_or_compile("'x'", Dialect::Strict);
        let compat = cache.get_or_compile("'x'", Dialect::Compat);
        assert!(!Rc::ptr_eq(&strict, &compat));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let mut cache = ExpressionCache::new(2);
        let a = cache.get_or_compile("a", Dialect::Strict);
        cache.get_or_compile("b", Dialect::Strict);
        cache.get_or_compile("a", Dialect::Strict);
        cache.get_or_compile("c", Dialect::Strict);
        assert_eq!(cache.len(), 2);
        assert!(Rc::ptr_eq(&a, &cache.get_or_compile("a", Dialect::Strict)));
        assert_eq!(cache.stats().misses, 3);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut cache = ExpressionCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.resize(8);
        assert_eq!(cache.capacity(), 8);
    }

    #[test]
    fn clear_resets_counters() {
        let mut cache = ExpressionCache::default();
        cache.get_or_compile("a", Dialect::Strict);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn thread_cache_shares_expressions() {
        clear_cache();
        let a = compile_cached("items.length", Dialect::Strict);
        let b = compile_cached("items.length", Dialect::Strict);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(cache_stats(), CacheStats { hits: 1, misses: 1 });
    }
}
