#![forbid(unsafe_code)]

//! Tree-walking evaluator.
//!
//! Bare identifiers are resolved through a [`Context`], the scope-like value
//! an expression is evaluated against. Operator semantics follow JavaScript
//! for the supported subset.

use std::cmp::Ordering;

use crate::ast::{BinaryOp, Expr, Literal, LogicalOp, UnaryOp};
use crate::error::EvalError;
use crate::value::{Object, Value};

/// Name resolution for bare identifiers.
pub trait Context {
    /// Value bound to `name`, or `Value::Undefined`.
    fn lookup(&self, name: &str) -> Value;
}

/// Objects resolve their members; every other value resolves nothing.
impl Context for Value {
    fn lookup(&self, name: &str) -> Value {
        match self {
            Value::Object(o) => o.get(name).unwrap_or_default(),
            _ => Value::Undefined,
        }
    }
}

impl Context for Object {
    fn lookup(&self, name: &str) -> Value {
        self.get(name).unwrap_or_default()
    }
}

/// Evaluate `expr` against `ctx`.
pub fn evaluate(expr: &Expr, ctx: &dyn Context) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(lit) => Ok(literal(lit)),
        Expr::Ident(name) => Ok(ctx.lookup(name)),
        Expr::Member { object, property } => evaluate(object, ctx)?.member(property),
        Expr::Index { object, index } => {
            let target = evaluate(object, ctx)?;
            let key = evaluate(index, ctx)?;
            target.index(&key)
        }
        Expr::Call { callee, args } => {
            let target = evaluate(callee, ctx)?;
            let Value::Function(function) = target else {
                return Err(EvalError::NotCallable {
                    callee: callee.to_string(),
                });
            };
            let args = args
                .iter()
                .map(|arg| evaluate(arg, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(function.call(&args))
        }
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, ctx)?;
            Ok(match op {
                UnaryOp::Not => Value::Bool(!value.is_truthy()),
                UnaryOp::Negate => Value::Number(-value.to_number()),
                UnaryOp::Plus => Value::Number(value.to_number()),
            })
        }
        Expr::Binary { op, left, right } => {
            let lhs = evaluate(left, ctx)?;
            let rhs = evaluate(right, ctx)?;
            Ok(binary(*op, &lhs, &rhs))
        }
        Expr::Logical { op, left, right } => {
            let lhs = evaluate(left, ctx)?;
            match (op, lhs.is_truthy()) {
                (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(lhs),
                _ => evaluate(right, ctx),
            }
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            if evaluate(test, ctx)?.is_truthy() {
                evaluate(consequent, ctx)
            } else {
                evaluate(alternate, ctx)
            }
        }
        Expr::Array(items) => {
            let values = items
                .iter()
                .map(|item| evaluate(item, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::from(values))
        }
    }
}

fn literal(lit: &Literal) -> Value {
    match lit {
        Literal::Undefined => Value::Undefined,
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Number(n) => Value::Number(*n),
        Literal::String(s) => Value::String(s.clone()),
    }
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    match op {
        BinaryOp::Add => add(lhs, rhs),
        BinaryOp::Sub => Value::Number(lhs.to_number() - rhs.to_number()),
        BinaryOp::Mul => Value::Number(lhs.to_number() * rhs.to_number()),
        BinaryOp::Div => Value::Number(lhs.to_number() / rhs.to_number()),
        BinaryOp::Rem => Value::Number(lhs.to_number() % rhs.to_number()),
        BinaryOp::Lt => Value::Bool(compare(lhs, rhs) == Some(Ordering::Less)),
        BinaryOp::LtEq => Value::Bool(matches!(
            compare(lhs, rhs),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Gt => Value::Bool(compare(lhs, rhs) == Some(Ordering::Greater)),
        BinaryOp::GtEq => Value::Bool(matches!(
            compare(lhs, rhs),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::StrictEq => Value::Bool(lhs.strict_eq(rhs)),
        BinaryOp::StrictNe => Value::Bool(!lhs.strict_eq(rhs)),
        BinaryOp::LooseEq => Value::Bool(lhs.loose_eq(rhs)),
        BinaryOp::LooseNe => Value::Bool(!lhs.loose_eq(rhs)),
    }
}

/// `+` concatenates as soon as either side is not a primitive number-like.
fn add(lhs: &Value, rhs: &Value) -> Value {
    let concatenates = |v: &Value| {
        matches!(
            v,
            Value::String(_) | Value::Array(_) | Value::Object(_) | Value::Function(_)
        )
    };
    if concatenates(lhs) || concatenates(rhs) {
        Value::from(format!("{lhs}{rhs}"))
    } else {
        Value::Number(lhs.to_number() + rhs.to_number())
    }
}

/// Relational ordering: strings compare lexicographically, everything else
/// numerically. `None` when either side is `NaN`.
fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => lhs.to_number().partial_cmp(&rhs.to_number()),
    }
}
