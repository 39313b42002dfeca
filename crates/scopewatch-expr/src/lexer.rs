#![forbid(unsafe_code)]

//! Tokenizer for binding expressions.
//!
//! Keywords are not distinguished here: `true`, `null` and friends come out
//! as [`TokenKind::Ident`] and the parser decides what they mean by position.

use std::fmt;

use crate::error::ExprError;

/// Punctuators and operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Punct {
    Dot,
    Comma,
    ParenOpen,
    ParenClose,
    BracketOpen,
    BracketClose,
    Question,
    Colon,
    Bang,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    LtEq,
    Gt,
    GtEq,
    EqEq,
    EqEqEq,
    BangEq,
    BangEqEq,
    AmpAmp,
    BarBar,
}

impl Punct {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Punct::Dot => ".",
            Punct::Comma => ",",
            Punct::ParenOpen => "(",
            Punct::ParenClose => ")",
            Punct::BracketOpen => "[",
            Punct::BracketClose => "]",
            Punct::Question => "?",
            Punct::Colon => ":",
            Punct::Bang => "!",
            Punct::Plus => "+",
            Punct::Minus => "-",
            Punct::Star => "*",
            Punct::Slash => "/",
            Punct::Percent => "%",
            Punct::Lt => "<",
            Punct::LtEq => "<=",
            Punct::Gt => ">",
            Punct::GtEq => ">=",
            Punct::EqEq => "==",
            Punct::EqEqEq => "===",
            Punct::BangEq => "!=",
            Punct::BangEqEq => "!==",
            Punct::AmpAmp => "&&",
            Punct::BarBar => "||",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    String(String),
    Ident(String),
    Punct(Punct),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "number {n}"),
            TokenKind::String(s) => write!(f, "string {s:?}"),
            TokenKind::Ident(name) => write!(f, "identifier `{name}`"),
            TokenKind::Punct(p) => write!(f, "`{}`", p.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub offset: usize,
}

pub(crate) fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
}

pub(crate) fn is_ident_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '$'
}

/// Split `src` into tokens.
pub fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    Lexer { src, pos: 0 }.run()
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl Lexer<'_> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.src[self.pos..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn run(mut self) -> Result<Vec<Token>, ExprError> {
        let mut tokens = Vec::new();
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.bump();
                continue;
            }
            let offset = self.pos;
            let kind = if ch.is_ascii_digit()
                || (ch == '.' && self.peek_second().is_some_and(|c| c.is_ascii_digit()))
            {
                self.number(offset)?
            } else if is_ident_start(ch) {
                self.ident()
            } else if ch == '\'' || ch == '"' {
                self.string(offset)?
            } else {
                TokenKind::Punct(self.punct(offset)?)
            };
            tokens.push(Token { kind, offset });
        }
        Ok(tokens)
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
    }

    fn number(&mut self, offset: usize) -> Result<TokenKind, ExprError> {
        let src = self.src;
        self.take_while(|c| c.is_ascii_digit());
        if self.peek() == Some('.') {
            self.bump();
            self.take_while(|c| c.is_ascii_digit());
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let rest = &src[self.pos + 1..];
            let digits_at = usize::from(rest.starts_with(['+', '-']));
            if rest[digits_at..].starts_with(|c: char| c.is_ascii_digit()) {
                self.pos += 1 + digits_at;
                self.take_while(|c| c.is_ascii_digit());
            }
        }
        let text = &src[offset..self.pos];
        // An identifier glued to a number (`1abc`, `0xff`) is not a number.
        if self.peek().is_some_and(is_ident_start) {
            self.take_while(is_ident_continue);
            return Err(ExprError::MalformedNumber {
                text: src[offset..self.pos].to_owned(),
                offset,
            });
        }
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| ExprError::MalformedNumber {
                text: text.to_owned(),
                offset,
            })
    }

    fn ident(&mut self) -> TokenKind {
        let start = self.pos;
        self.take_while(is_ident_continue);
        TokenKind::Ident(self.src[start..self.pos].to_owned())
    }

    fn string(&mut self, offset: usize) -> Result<TokenKind, ExprError> {
        let quote = self.bump().unwrap_or('"');
        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some('\n' | '\r') => return Err(ExprError::UnterminatedString { offset }),
                Some(c) if c == quote => return Ok(TokenKind::String(value)),
                Some('\\') => match self.bump() {
                    None => return Err(ExprError::UnterminatedString { offset }),
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('0') => value.push('\0'),
                    Some(other) => value.push(other),
                },
                Some(c) => value.push(c),
            }
        }
    }

    fn punct(&mut self, offset: usize) -> Result<Punct, ExprError> {
        let ch = self.bump().ok_or(ExprError::UnexpectedEnd {
            expected: "a token",
        })?;
        let punct = match ch {
            '.' => Punct::Dot,
            ',' => Punct::Comma,
            '(' => Punct::ParenOpen,
            ')' => Punct::ParenClose,
            '[' => Punct::BracketOpen,
            ']' => Punct::BracketClose,
            '?' => Punct::Question,
            ':' => Punct::Colon,
            '+' => Punct::Plus,
            '-' => Punct::Minus,
            '*' => Punct::Star,
            '/' => Punct::Slash,
            '%' => Punct::Percent,
            '<' if self.eat('=') => Punct::LtEq,
            '<' => Punct::Lt,
            '>' if self.eat('=') => Punct::GtEq,
            '>' => Punct::Gt,
            '!' if self.eat('=') => {
                if self.eat('=') {
                    Punct::BangEqEq
                } else {
                    Punct::BangEq
                }
            }
            '!' => Punct::Bang,
            '=' if self.eat('=') => {
                if self.eat('=') {
                    Punct::EqEqEq
                } else {
                    Punct::EqEq
                }
            }
            '&' if self.eat('&') => Punct::AmpAmp,
            '|' if self.eat('|') => Punct::BarBar,
            _ => return Err(ExprError::UnexpectedChar { ch, offset }),
        };
        Ok(punct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_paths_and_operators() {
        assert_eq!(
            kinds("mode === MODE.SHOW"),
            vec![
                TokenKind::Ident("mode".into()),
                TokenKind::Punct(Punct::EqEqEq),
                TokenKind::Ident("MODE".into()),
                TokenKind::Punct(Punct::Dot),
                TokenKind::Ident("SHOW".into()),
            ]
        );
    }

    #[test]
    fn tokenizes_numbers() {
        assert_eq!(
            kinds("1 2.5 .5 1e3 2E-2"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Number(2.5),
                TokenKind::Number(0.5),
                TokenKind::Number(1000.0),
                TokenKind::Number(0.02),
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "a\nb""#),
            vec![
                TokenKind::String("it's".into()),
                TokenKind::String("a\nb".into()),
            ]
        );
    }

    #[test]
    fn identifier_glued_to_number_is_malformed() {
        assert_eq!(
            tokenize("1scope.e5"),
            Err(ExprError::MalformedNumber {
                text: "1scope".into(),
                offset: 0
            })
        );
    }

    #[test]
    fn unterminated_string_reports_start() {
        assert_eq!(
            tokenize("a + 'oops"),
            Err(ExprError::UnterminatedString { offset: 4 })
        );
    }

    #[test]
    fn lone_ampersand_is_rejected() {
        assert_eq!(
            tokenize("a & b"),
            Err(ExprError::UnexpectedChar { ch: '&', offset: 2 })
        );
    }

    #[test]
    fn offsets_are_byte_positions() {
        let tokens = tokenize("  ab <= 3").unwrap();
        let offsets: Vec<_> = tokens.iter().map(|t| t.offset).collect();
        assert_eq!(offsets, vec![2, 5, 8]);
    }
}
