#![forbid(unsafe_code)]

//! Recursive-descent parser for binding expressions.
//!
//! Binary operators are parsed by precedence climbing over the table in
//! [`binary_operator`]; everything binds tighter than `?:`.
//!
//! An empty (or all-whitespace) source parses to the `undefined` literal.
//!
//! Nesting is bounded by [`MAX_NESTING`], both for the parser's own
//! recursion (parentheses, brackets, unary chains, `?:`) and for the height
//! of the tree it builds (long `a.b.c...` or `a + a + ...` chains). Deeper
//! input fails with [`ExprError::TooDeep`], so evaluating, rendering or
//! dropping a parsed tree never exhausts the stack.

use std::rc::Rc;

use crate::ast::{BinaryOp, Expr, Literal, LogicalOp, UnaryOp};
use crate::error::ExprError;
use crate::lexer::{Punct, Token, TokenKind, tokenize};

/// Deepest nesting a parsed expression may have.
pub const MAX_NESTING: usize = 256;

/// Parse a complete expression.
pub fn parse(src: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Ok(Expr::Literal(Literal::Undefined));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        end: src.len(),
    };
    let (expr, _) = parser.expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(ExprError::UnexpectedToken {
            found: token.kind.to_string(),
            expected: "end of expression",
            offset: token.offset,
        }),
    }
}

#[derive(Clone, Copy)]
enum BinaryKind {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

/// Precedence (higher binds tighter) and operator for a binary punctuator.
fn binary_operator(punct: Punct) -> Option<(u8, BinaryKind)> {
    use BinaryKind::{Binary, Logical};
    let entry = match punct {
        Punct::BarBar => (1, Logical(LogicalOp::Or)),
        Punct::AmpAmp => (2, Logical(LogicalOp::And)),
        Punct::EqEqEq => (3, Binary(BinaryOp::StrictEq)),
        Punct::BangEqEq => (3, Binary(BinaryOp::StrictNe)),
        Punct::EqEq => (3, Binary(BinaryOp::LooseEq)),
        Punct::BangEq => (3, Binary(BinaryOp::LooseNe)),
        Punct::Lt => (4, Binary(BinaryOp::Lt)),
        Punct::LtEq => (4, Binary(BinaryOp::LtEq)),
        Punct::Gt => (4, Binary(BinaryOp::Gt)),
        Punct::GtEq => (4, Binary(BinaryOp::GtEq)),
        Punct::Plus => (5, Binary(BinaryOp::Add)),
        Punct::Minus => (5, Binary(BinaryOp::Sub)),
        Punct::Star => (6, Binary(BinaryOp::Mul)),
        Punct::Slash => (6, Binary(BinaryOp::Div)),
        Punct::Percent => (6, Binary(BinaryOp::Rem)),
        _ => return None,
    };
    Some(entry)
}

/// A subtree and its height.
type Parsed = (Expr, usize);

/// Height of a node whose tallest child is `child`.
fn grow(child: usize, offset: usize) -> Result<usize, ExprError> {
    if child >= MAX_NESTING {
        return Err(ExprError::TooDeep { offset });
    }
    Ok(child + 1)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Current recursion depth of `expression` and `unary`.
    depth: usize,
    /// Byte length of the source, reported for errors at the end.
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_punct(&self) -> Option<Punct> {
        match self.peek()?.kind {
            TokenKind::Punct(p) => Some(p),
            _ => None,
        }
    }

    fn offset(&self) -> usize {
        self.peek().map_or(self.end, |token| token.offset)
    }

    fn next(&mut self, expected: &'static str) -> Result<Token, ExprError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ExprError::UnexpectedEnd { expected })?;
        self.pos += 1;
        Ok(token)
    }

    fn eat(&mut self, punct: Punct) -> bool {
        if self.peek_punct() == Some(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: Punct, expected: &'static str) -> Result<(), ExprError> {
        let token = self.next(expected)?;
        if token.kind == TokenKind::Punct(punct) {
            Ok(())
        } else {
            Err(ExprError::UnexpectedToken {
                found: token.kind.to_string(),
                expected,
                offset: token.offset,
            })
        }
    }

    /// Run `parse` one recursion level deeper.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ExprError>,
    ) -> Result<T, ExprError> {
        if self.depth >= MAX_NESTING {
            return Err(ExprError::TooDeep {
                offset: self.offset(),
            });
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expression(&mut self) -> Result<Parsed, ExprError> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> Result<Parsed, ExprError> {
        let (test, test_height) = self.binary(1)?;
        let offset = self.offset();
        if !self.eat(Punct::Question) {
            return Ok((test, test_height));
        }
        let (consequent, consequent_height) = self.expression()?;
        self.expect(Punct::Colon, "`:`")?;
        let (alternate, alternate_height) = self.expression()?;
        let height = grow(
            test_height.max(consequent_height).max(alternate_height),
            offset,
        )?;
        let expr = Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        };
        Ok((expr, height))
    }

    fn binary(&mut self, min_prec: u8) -> Result<Parsed, ExprError> {
        let (mut left, mut height) = self.unary()?;
        while let Some((prec, kind)) = self.peek_punct().and_then(binary_operator) {
            if prec < min_prec {
                break;
            }
            let offset = self.offset();
            self.pos += 1;
            let (right, right_height) = self.binary(prec + 1)?;
            height = grow(height.max(right_height), offset)?;
            let (lhs, right) = (Box::new(left), Box::new(right));
            left = match kind {
                BinaryKind::Binary(op) => Expr::Binary {
                    op,
                    left: lhs,
                    right,
                },
                BinaryKind::Logical(op) => Expr::Logical {
                    op,
                    left: lhs,
                    right,
                },
            };
        }
        Ok((left, height))
    }

    fn unary(&mut self) -> Result<Parsed, ExprError> {
        let op = match self.peek_punct() {
            Some(Punct::Bang) => UnaryOp::Not,
            Some(Punct::Minus) => UnaryOp::Negate,
            Some(Punct::Plus) => UnaryOp::Plus,
            _ => return self.postfix(),
        };
        let offset = self.offset();
        self.pos += 1;
        let (operand, operand_height) = self.nested(Self::unary)?;
        let height = grow(operand_height, offset)?;
        let expr = Expr::Unary {
            op,
            operand: Box::new(operand),
        };
        Ok((expr, height))
    }

    fn postfix(&mut self) -> Result<Parsed, ExprError> {
        let (mut expr, mut height) = self.primary()?;
        loop {
            let offset = self.offset();
            if self.eat(Punct::Dot) {
                let token = self.next("a property name")?;
                let property = match token.kind {
                    TokenKind::Ident(name) => name,
                    other => {
                        return Err(ExprError::UnexpectedToken {
                            found: other.to_string(),
                            expected: "a property name",
                            offset: token.offset,
                        });
                    }
                };
                height = grow(height, offset)?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                };
            } else if self.eat(Punct::BracketOpen) {
                let (index, index_height) = self.expression()?;
                self.expect(Punct::BracketClose, "`]`")?;
                height = grow(height.max(index_height), offset)?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat(Punct::ParenOpen) {
                let (args, args_height) = self.list(Punct::ParenClose, "`)`")?;
                height = grow(height.max(args_height), offset)?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                return Ok((expr, height));
            }
        }
    }

    /// Comma-separated expressions up to and including `close`, with the
    /// height of the tallest.
    fn list(
        &mut self,
        close: Punct,
        expected: &'static str,
    ) -> Result<(Vec<Expr>, usize), ExprError> {
        let mut items = Vec::new();
        let mut height = 0;
        if self.eat(close) {
            return Ok((items, height));
        }
        loop {
            let (item, item_height) = self.expression()?;
            items.push(item);
            height = height.max(item_height);
            if self.eat(close) {
                return Ok((items, height));
            }
            self.expect(Punct::Comma, expected)?;
        }
    }

    fn primary(&mut self) -> Result<Parsed, ExprError> {
        let token = self.next("an expression")?;
        let leaf = |expr: Expr| -> Result<Parsed, ExprError> { Ok((expr, 1)) };
        match token.kind {
            TokenKind::Number(n) => leaf(Expr::Literal(Literal::Number(n))),
            TokenKind::String(s) => leaf(Expr::Literal(Literal::String(Rc::from(s)))),
            TokenKind::Ident(name) => leaf(match name.as_str() {
                "true" => Expr::Literal(Literal::Bool(true)),
                "false" => Expr::Literal(Literal::Bool(false)),
                "null" => Expr::Literal(Literal::Null),
                "undefined" => Expr::Literal(Literal::Undefined),
                _ => Expr::Ident(name),
            }),
            TokenKind::Punct(Punct::ParenOpen) => {
                let inner = self.expression()?;
                self.expect(Punct::ParenClose, "`)`")?;
                Ok(inner)
            }
            TokenKind::Punct(Punct::BracketOpen) => {
                let (items, items_height) = self.list(Punct::BracketClose, "`]`")?;
                let height = grow(items_height, token.offset)?;
                Ok((Expr::Array(items), height))
            }
            other => Err(ExprError::UnexpectedToken {
                found: other.to_string(),
                expected: "an expression",
                offset: token.offset,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(src: &str) -> String {
        parse(src).unwrap().to_string()
    }

    #[test]
    fn dotted_paths() {
        assert_eq!(shape("user.language.name"), "user.language.name");
    }

    #[test]
    fn precedence_climbs() {
        assert_eq!(shape("a + b * c"), "(a + (b * c))");
        assert_eq!(shape("a - b - c"), "((a - b) - c)");
        assert_eq!(shape("a || b && c"), "(a || (b && c))");
        assert_eq!(shape("a < b === c > d"), "((a < b) === (c > d))");
    }

    #[test]
    fn unary_binds_tighter_than_binary() {
        assert_eq!(shape("!!users.length"), "(!(!users.length))");
        assert_eq!(shape("-a * b"), "((-a) * b)");
    }

    #[test]
    fn conditional_is_right_associative() {
        assert_eq!(shape("a ? b : c ? d : e"), "(a ? b : (c ? d : e))");
    }

    #[test]
    fn calls_and_indexing() {
        assert_eq!(shape("showUser(user)"), "showUser(user)");
        assert_eq!(shape("users[0].name"), "users[0].name");
        assert_eq!(shape("f()(1, 2)"), "f()(1, 2)");
        assert_eq!(shape("[1, 'a']"), "[1, \"a\"]");
    }

    #[test]
    fn keywords_are_literals_but_valid_property_names() {
        assert_eq!(parse("true").unwrap(), Expr::Literal(Literal::Bool(true)));
        assert_eq!(shape("scope.true"), "scope.true");
    }

    #[test]
    fn empty_source_is_undefined() {
        assert_eq!(parse("   ").unwrap(), Expr::Literal(Literal::Undefined));
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        assert_eq!(
            parse("a b"),
            Err(ExprError::UnexpectedToken {
                found: "identifier `b`".into(),
                expected: "end of expression",
                offset: 2,
            })
        );
    }

    #[test]
    fn dangling_operator_is_unexpected_end() {
        assert_eq!(
            parse("a +"),
            Err(ExprError::UnexpectedEnd {
                expected: "an expression"
            })
        );
    }

    #[test]
    fn missing_property_name_after_dot() {
        assert!(matches!(
            parse("a.1"),
            Err(ExprError::UnexpectedToken { .. })
        ));
        assert_eq!(
            parse("a."),
            Err(ExprError::UnexpectedEnd {
                expected: "a property name"
            })
        );
    }

    #[test]
    fn nesting_up_to_the_limit_parses() {
        let src = format!("{}a{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(shape(&src), "a");
        assert!(parse(&format!("{}a", "!".repeat(200))).is_ok());
    }

    #[test]
    fn deep_parentheses_are_too_deep() {
        let src = format!("{}a{}", "(".repeat(200_000), ")".repeat(200_000));
        assert_eq!(
            parse(&src),
            Err(ExprError::TooDeep {
                offset: MAX_NESTING
            })
        );
    }

    #[test]
    fn deep_brackets_and_unary_chains_are_too_deep() {
        let brackets = format!("{}1{}", "[".repeat(10_000), "]".repeat(10_000));
        assert!(matches!(parse(&brackets), Err(ExprError::TooDeep { .. })));
        let nots = format!("{}a", "!".repeat(10_000));
        assert!(matches!(parse(&nots), Err(ExprError::TooDeep { .. })));
        let calls = format!("f{}", "(".repeat(10_000));
        assert!(matches!(parse(&calls), Err(ExprError::TooDeep { .. })));
    }

    #[test]
    fn long_chains_are_too_deep() {
        let sums = vec!["a"; 10_000].join(" + ");
        assert!(matches!(parse(&sums), Err(ExprError::TooDeep { .. })));
        let path = vec!["a"; 10_000].join(".");
        assert!(matches!(parse(&path), Err(ExprError::TooDeep { .. })));
        let indexes = format!("a{}", "[0]".repeat(10_000));
        assert!(matches!(parse(&indexes), Err(ExprError::TooDeep { .. })));
    }

    #[test]
    fn wide_expressions_are_not_deep() {
        let items = vec!["a"; 10_000].join(", ");
        assert!(parse(&format!("[{items}]")).is_ok());
        assert!(parse(&format!("f({items})")).is_ok());
    }
}
