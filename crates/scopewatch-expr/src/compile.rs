#![forbid(unsafe_code)]

//! Compiled expressions.
//!
//! An [`Expression`] is built once from a source text and can then be
//! evaluated against any [`Context`] any number of times. It holds no state
//! between evaluations and belongs to no particular scope.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Parse error | Text outside the grammar | Every evaluation yields `undefined` |
//! | Member of `undefined`/`null` | Missing intermediate path | `undefined` |
//! | Call of a non-function | Missing or mistyped callable | `undefined` |
//!
//! [`Expression::try_evaluate`] reports the failure instead.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::ast::Expr;
use crate::error::{EvalError, ExprError, UnknownDialect};
use crate::eval::{Context, evaluate};
use crate::parser::parse;
use crate::rewrite::{rewrite_legacy, unbind};
use crate::value::Value;

/// How source text is turned into an expression tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    /// Parse the text as written.
    #[default]
    Strict,
    /// Reproduce the legacy `scope.`-prefix rewrite, defects included.
    /// See [`crate::rewrite`].
    Compat,
}

impl Dialect {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Dialect::Strict => "strict",
            Dialect::Compat => "compat",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Dialect::Strict),
            "compat" | "legacy" => Ok(Dialect::Compat),
            _ => Err(UnknownDialect(s.to_owned())),
        }
    }
}

/// A compiled binding expression.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    dialect: Dialect,
    compiled: Result<Expr, ExprError>,
}

impl Expression {
    /// Compile `source` in the strict dialect. Never fails; see
    /// [`Expression::parse`] for the fallible form.
    #[must_use]
    pub fn compile(source: &str) -> Self {
        Self::compile_with(source, Dialect::Strict)
    }

    /// Compile `source` in the given dialect.
    #[must_use]
    pub fn compile_with(source: &str, dialect: Dialect) -> Self {
        let compiled = match dialect {
            Dialect::Strict => parse(source),
            Dialect::Compat => parse(&rewrite_legacy(source)).map(unbind),
        };
        if let Err(err) = &compiled {
            debug!(source, %dialect, error = %err, "expression failed to compile");
        }
        Self {
            source: source.to_owned(),
            dialect,
            compiled,
        }
    }

    /// Compile `source` in the strict dialect, reporting syntax errors.
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        Self::parse_with(source, Dialect::Strict)
    }

    pub fn parse_with(source: &str, dialect: Dialect) -> Result<Self, ExprError> {
        let expression = Self::compile_with(source, dialect);
        if let Some(err) = expression.parse_error() {
            return Err(err.clone());
        }
        Ok(expression)
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.compiled.is_ok()
    }

    #[must_use]
    pub fn parse_error(&self) -> Option<&ExprError> {
        self.compiled.as_ref().err()
    }

    /// The expression tree, when the source parsed.
    #[must_use]
    pub fn ast(&self) -> Option<&Expr> {
        self.compiled.as_ref().ok()
    }

    /// Evaluate against `ctx`, reporting failures.
    pub fn try_evaluate(&self, ctx: &dyn Context) -> Result<Value, EvalError> {
        match &self.compiled {
            Ok(expr) => evaluate(expr, ctx),
            Err(err) => Err(EvalError::Parse(err.clone())),
        }
    }

    /// Evaluate against `ctx`. Any failure yields `Value::Undefined`.
    pub fn evaluate(&self, ctx: &dyn Context) -> Value {
        match self.try_evaluate(ctx) {
            Ok(value) => value,
            Err(err) => {
                trace!(source = %self.source, error = %err, "evaluation failed, yielding undefined");
                Value::Undefined
            }
        }
    }
}
