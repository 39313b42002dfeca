#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! A [`RuntimeConfig`] is held per thread, like the scope tree itself. It is
//! read whenever a text expression is bound to a scope, so changing it
//! affects registrations made afterwards, never existing watchers.

use std::cell::Cell;
use std::env;

use scopewatch_expr::{DEFAULT_CACHE_CAPACITY, Dialect, set_cache_capacity};
use tracing::debug;

/// Environment variable selecting the expression dialect.
pub const DIALECT_ENV: &str = "SCOPEWATCH_DIALECT";

/// Environment variable sizing the compiled-expression cache.
pub const CACHE_CAPACITY_ENV: &str = "SCOPEWATCH_CACHE_CAPACITY";

thread_local! {
    static GLOBAL_CONFIG: Cell<RuntimeConfig> = Cell::new(RuntimeConfig::DEFAULT);
}

/// Settings consulted when bindings are registered and evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Dialect used to compile text expressions.
    pub dialect: Dialect,
    /// Number of compiled expressions retained per thread.
    pub cache_capacity: usize,
    /// Emit a `debug` event when an expression fails to evaluate.
    pub log_eval_failures: bool,
}

impl RuntimeConfig {
    const DEFAULT: Self = Self {
        dialect: Dialect::Strict,
        cache_capacity: DEFAULT_CACHE_CAPACITY,
        log_eval_failures: true,
    };

    #[must_use]
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_log_eval_failures(mut self, enabled: bool) -> Self {
        self.log_eval_failures = enabled;
        self
    }

    /// Build a configuration from `SCOPEWATCH_DIALECT` and
    /// `SCOPEWATCH_CACHE_CAPACITY`. Missing or invalid values keep their
    /// defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let dialect = env::var(DIALECT_ENV).ok();
        let capacity = env::var(CACHE_CAPACITY_ENV).ok();
        Self::from_vars(dialect.as_deref(), capacity.as_deref())
    }

    fn from_vars(dialect: Option<&str>, capacity: Option<&str>) -> Self {
        let mut config = Self::default();
        if let Some(raw) = dialect {
            match raw.parse() {
                Ok(dialect) => config.dialect = dialect,
                Err(err) => debug!(error = %err, "ignoring {DIALECT_ENV}"),
            }
        }
        if let Some(raw) = capacity {
            match raw.trim().parse::<usize>() {
                Ok(capacity) if capacity > 0 => config.cache_capacity = capacity,
                _ => debug!(value = raw, "ignoring {CACHE_CAPACITY_ENV}"),
            }
        }
        config
    }

    /// The configuration in effect on this thread.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL_CONFIG.with(Cell::get)
    }

    /// Replace this thread's configuration and resize its expression cache.
    pub fn set_global(config: Self) {
        GLOBAL_CONFIG.with(|global| global.set(config));
        set_cache_capacity(config.cache_capacity);
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
