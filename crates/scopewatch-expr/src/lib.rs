#![forbid(unsafe_code)]

//! Binding expressions and model values for scopewatch.
//!
//! This crate provides:
//! - [`Value`], the dynamic model value scopes hold and expressions produce
//! - [`Expression`], a compiled closed-grammar expression evaluated against
//!   any [`Context`]
//! - [`Dialect::Compat`], which reproduces the legacy `scope.`-prefix rewrite
//! - a per-thread [`ExpressionCache`] so each distinct text compiles once
//!
//! # Example
//!
//! ```
//! use scopewatch_expr::{Expression, Value};
//!
//! let ctx = Value::from(serde_json::json!({"user": {"age": 15}}));
//! let young = Expression::compile("user.age < 20");
//! assert_eq!(young.evaluate(&ctx), Value::Bool(true));
//! ```

pub mod ast;
pub mod cache;
pub mod compile;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod rewrite;
pub mod value;

pub use cache::{
    CacheStats, DEFAULT_CACHE_CAPACITY, ExpressionCache, cache_stats, clear_cache, compile_cached,
    set_cache_capacity,
};
pub use compile::{Dialect, Expression};
pub use error::{EvalError, ExprError, UnknownDialect};
pub use eval::{Context, evaluate};
pub use value::{Array, Function, NativeFn, Object, Value};
