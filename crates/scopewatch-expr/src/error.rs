#![forbid(unsafe_code)]

//! Error types for expression parsing and evaluation.
//!
//! Neither error ever escapes a watcher: the runtime converts both into
//! `undefined` at the getter boundary. They exist so callers that want a
//! diagnosis (tests, tooling, [`Expression::parse`]) can get one.
//!
//! [`Expression::parse`]: crate::Expression::parse

use thiserror::Error;

/// A source text that does not belong to the expression grammar.
///
/// Offsets are byte offsets into the text that was tokenized. For the
/// compatibility dialect that is the rewritten text, not the original.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("unexpected character {ch:?} at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("malformed number {text:?} at offset {offset}")]
    MalformedNumber { text: String, offset: usize },

    #[error("unexpected {found} at offset {offset}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        offset: usize,
    },

    #[error("unexpected end of expression, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("expression nested too deeply at offset {offset}")]
    TooDeep { offset: usize },
}

/// A failure while evaluating a well-formed expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("cannot read property {property:?} of {receiver}")]
    NullMember {
        property: String,
        receiver: &'static str,
    },

    #[error("{callee} is not a function")]
    NotCallable { callee: String },

    #[error(transparent)]
    Parse(#[from] ExprError),
}

/// An unrecognised dialect name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown expression dialect {0:?}, expected \"strict\" or \"compat\"")]
pub struct UnknownDialect(pub String);
