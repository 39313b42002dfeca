#![forbid(unsafe_code)]

//! Value-getter resolution.
//!
//! Every binding surface accepts a [`WatchSource`]: a text expression, an
//! already compiled [`Expression`], a host getter, or a literal. [`resolve`]
//! turns any of them into a zero-argument [`Getter`].
//!
//! Expression getters hold the scope weakly, so a watcher never keeps its
//! own scope alive. Once the scope is gone they yield `Undefined`.

use std::fmt;
use std::rc::Rc;

use scopewatch_expr::{Dialect, EvalError, Expression, Value, compile_cached};
use tracing::debug;

use crate::config::RuntimeConfig;
use crate::scope::Scope;

/// A zero-argument value producer.
pub type Getter = Rc<dyn Fn() -> Value>;

/// Anything a watcher can observe.
#[derive(Clone)]
pub enum WatchSource {
    /// Source text, compiled through the thread's expression cache.
    Text(String),
    Compiled(Rc<Expression>),
    /// Used as is.
    Getter(Getter),
    /// A constant.
    Literal(Value),
}

impl WatchSource {
    pub fn getter(f: impl Fn() -> Value + 'static) -> Self {
        WatchSource::Getter(Rc::new(f))
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchSource::Text(text) => f.debug_tuple("Text").field(text).finish(),
            WatchSource::Compiled(expr) => f.debug_tuple("Compiled").field(&expr.source()).finish(),
            WatchSource::Getter(_) => f.write_str("Getter"),
            WatchSource::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
        }
    }
}

impl From<&str> for WatchSource {
    fn from(text: &str) -> Self {
        WatchSource::Text(text.to_owned())
    }
}

impl From<String> for WatchSource {
    fn from(text: String) -> Self {
        WatchSource::Text(text)
    }
}

impl From<Rc<Expression>> for WatchSource {
    fn from(expr: Rc<Expression>) -> Self {
        WatchSource::Compiled(expr)
    }
}

impl From<Expression> for WatchSource {
    fn from(expr: Expression) -> Self {
        WatchSource::Compiled(Rc::new(expr))
    }
}

impl From<Getter> for WatchSource {
    fn from(getter: Getter) -> Self {
        WatchSource::Getter(getter)
    }
}

impl From<Value> for WatchSource {
    fn from(value: Value) -> Self {
        WatchSource::Literal(value)
    }
}

macro_rules! literal_source {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for WatchSource {
                fn from(value: $ty) -> Self {
                    WatchSource::Literal(Value::from(value))
                }
            }
        )*
    };
}

literal_source!(bool, f64, i32, u32, i64, usize);

/// Turn `source` into a getter bound to `scope`.
pub fn resolve(source: WatchSource, scope: &Scope, dialect: Dialect) -> Getter {
    match source {
        WatchSource::Text(text) => bind(compile_cached(&text, dialect), scope),
        WatchSource::Compiled(expr) => bind(expr, scope),
        WatchSource::Getter(getter) => getter,
        WatchSource::Literal(value) => Rc::new(move || value.clone()),
    }
}

fn bind(expr: Rc<Expression>, scope: &Scope) -> Getter {
    let scope = scope.downgrade();
    Rc::new(move || match scope.upgrade() {
        Some(scope) => evaluate_in(&expr, &scope),
        None => Value::Undefined,
    })
}

/// Evaluate `expr` against `scope`, turning any failure into `Undefined`.
pub fn evaluate_in(expr: &Expression, scope: &Scope) -> Value {
    expr.try_evaluate(scope).unwrap_or_else(|err| {
        report(expr, &err);
        Value::Undefined
    })
}

fn report(expr: &Expression, err: &EvalError) {
    if RuntimeConfig::global().log_eval_failures {
        debug!(source = expr.source(), error = %err, "expression evaluation failed");
    }
}
