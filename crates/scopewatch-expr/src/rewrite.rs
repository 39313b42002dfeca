#![forbid(unsafe_code)]

//! Legacy textual rewrite behind [`Dialect::Compat`].
//!
//! Older bindings were compiled by prefixing every maximal run of
//! `[A-Za-z$_][A-Za-z$_0-9.]*` with `scope.` and evaluating the result.
//! The scan knows nothing about string literals or keywords, so:
//!
//! - `mode === 'show'` compares against the string `"scope.show"`;
//! - `true`, `null`, `undefined` become members looked up on the scope;
//! - `1e3` becomes `1scope.e3`, which does not parse.
//!
//! The compatibility dialect reproduces exactly that by rewriting the text,
//! parsing the rewritten text with the ordinary grammar, and then folding
//! every `scope.<name>` access back into a bare identifier.
//!
//! [`Dialect::Compat`]: crate::Dialect::Compat

use crate::ast::Expr;
use crate::lexer::is_ident_start;

/// Name the rewrite binds the evaluation context to.
pub const BINDING_NAME: &str = "scope";

fn is_run_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '$' || ch == '.'
}

/// Apply the legacy prefix rewrite to `src`.
#[must_use]
pub fn rewrite_legacy(src: &str) -> String {
    let mut out = String::with_capacity(src.len() + 16);
    let mut in_run = false;
    for ch in src.chars() {
        if in_run && is_run_continue(ch) {
            out.push(ch);
            continue;
        }
        in_run = is_ident_start(ch);
        if in_run {
            out.push_str(BINDING_NAME);
            out.push('.');
        }
        out.push(ch);
    }
    out
}

/// Replace each `scope.<name>` access with the bare identifier `<name>`.
#[must_use]
pub fn unbind(expr: Expr) -> Expr {
    let boxed = |e: Box<Expr>| Box::new(unbind(*e));
    match expr {
        Expr::Member { object, property } => match *object {
            Expr::Ident(ref name) if name == BINDING_NAME => Expr::Ident(property),
            other => Expr::Member {
                object: Box::new(unbind(other)),
                property,
            },
        },
        Expr::Index { object, index } => Expr::Index {
            object: boxed(object),
            index: boxed(index),
        },
        Expr::Call { callee, args } => Expr::Call {
            callee: boxed(callee),
            args: args.into_iter().map(unbind).collect(),
        },
        Expr::Unary { op, operand } => Expr::Unary {
            op,
            operand: boxed(operand),
        },
        Expr::Binary { op, left, right } => Expr::Binary {
            op,
            left: boxed(left),
            right: boxed(right),
        },
        Expr::Logical { op, left, right } => Expr::Logical {
            op,
            left: boxed(left),
            right: boxed(right),
        },
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => Expr::Conditional {
            test: boxed(test),
            consequent: boxed(consequent),
            alternate: boxed(alternate),
        },
        Expr::Array(items) => Expr::Array(items.into_iter().map(unbind).collect()),
        leaf @ (Expr::Literal(_) | Expr::Ident(_)) => leaf,
    }
}
