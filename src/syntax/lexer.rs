// Copyright 2026 Dredge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Hand-rolled tokenizer for DQL source text.
//!
//! Keywords are uppercase and reserved; lowercase spellings lex as plain
//! identifiers. `//` line and `/* block */` comments are trivia. The
//! tokenizer always ends the stream with an `Eof` token so the parser can
//! report a position for truncated input.

use std::fmt;

use crate::error::SyntaxError;
use crate::syntax::ast::Pos;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Keyword(Keyword),

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    ColonColon,
    Dot,
    DotDot,
    Question,
    At,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    RegexMatch,
    RegexNotMatch,
    Bang,
    AndAnd,
    OrOr,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keyword {
    Let,
    Return,
    For,
    In,
    While,
    Filter,
    Sort,
    Limit,
    Collect,
    Into,
    With,
    Count,
    Aggregate,
    Asc,
    Desc,
    Waitfor,
    Event,
    Timeout,
    None,
    Null,
    True,
    False,
    And,
    Or,
    Not,
    Like,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Keyword> {
        let kw = match word {
            "LET" => Keyword::Let,
            "RETURN" => Keyword::Return,
            "FOR" => Keyword::For,
            "IN" => Keyword::In,
            "WHILE" => Keyword::While,
            "FILTER" => Keyword::Filter,
            "SORT" => Keyword::Sort,
            "LIMIT" => Keyword::Limit,
            "COLLECT" => Keyword::Collect,
            "INTO" => Keyword::Into,
            "WITH" => Keyword::With,
            "COUNT" => Keyword::Count,
            "AGGREGATE" => Keyword::Aggregate,
            "ASC" => Keyword::Asc,
            "DESC" => Keyword::Desc,
            "WAITFOR" => Keyword::Waitfor,
            "EVENT" => Keyword::Event,
            "TIMEOUT" => Keyword::Timeout,
            "NONE" => Keyword::None,
            "NULL" => Keyword::Null,
            "TRUE" => Keyword::True,
            "FALSE" => Keyword::False,
            "AND" => Keyword::And,
            "OR" => Keyword::Or,
            "NOT" => Keyword::Not,
            "LIKE" => Keyword::Like,
            _ => return Option::None,
        };
        Some(kw)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Let => "LET",
            Keyword::Return => "RETURN",
            Keyword::For => "FOR",
            Keyword::In => "IN",
            Keyword::While => "WHILE",
            Keyword::Filter => "FILTER",
            Keyword::Sort => "SORT",
            Keyword::Limit => "LIMIT",
            Keyword::Collect => "COLLECT",
            Keyword::Into => "INTO",
            Keyword::With => "WITH",
            Keyword::Count => "COUNT",
            Keyword::Aggregate => "AGGREGATE",
            Keyword::Asc => "ASC",
            Keyword::Desc => "DESC",
            Keyword::Waitfor => "WAITFOR",
            Keyword::Event => "EVENT",
            Keyword::Timeout => "TIMEOUT",
            Keyword::None => "NONE",
            Keyword::Null => "NULL",
            Keyword::True => "TRUE",
            Keyword::False => "FALSE",
            Keyword::And => "AND",
            Keyword::Or => "OR",
            Keyword::Not => "NOT",
            Keyword::Like => "LIKE",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Int(i) => write!(f, "{i}"),
            TokenKind::Float(x) => write!(f, "{x}"),
            TokenKind::Str(_) => f.write_str("string literal"),
            TokenKind::Ident(name) => f.write_str(name),
            TokenKind::Keyword(kw) => f.write_str(kw.as_str()),
            TokenKind::LParen => f.write_str("("),
            TokenKind::RParen => f.write_str(")"),
            TokenKind::LBracket => f.write_str("["),
            TokenKind::RBracket => f.write_str("]"),
            TokenKind::LBrace => f.write_str("{"),
            TokenKind::RBrace => f.write_str("}"),
            TokenKind::Comma => f.write_str(","),
            TokenKind::Colon => f.write_str(":"),
            TokenKind::ColonColon => f.write_str("::"),
            TokenKind::Dot => f.write_str("."),
            TokenKind::DotDot => f.write_str(".."),
            TokenKind::Question => f.write_str("?"),
            TokenKind::At => f.write_str("@"),
            TokenKind::Plus => f.write_str("+"),
            TokenKind::Minus => f.write_str("-"),
            TokenKind::Star => f.write_str("*"),
            TokenKind::Slash => f.write_str("/"),
            TokenKind::Percent => f.write_str("%"),
            TokenKind::Assign => f.write_str("="),
            TokenKind::Eq => f.write_str("=="),
            TokenKind::Ne => f.write_str("!="),
            TokenKind::Lt => f.write_str("<"),
            TokenKind::Gt => f.write_str(">"),
            TokenKind::Le => f.write_str("<="),
            TokenKind::Ge => f.write_str(">="),
            TokenKind::RegexMatch => f.write_str("=~"),
            TokenKind::RegexNotMatch => f.write_str("!~"),
            TokenKind::Bang => f.write_str("!"),
            TokenKind::AndAnd => f.write_str("&&"),
            TokenKind::OrOr => f.write_str("||"),
            TokenKind::Eof => f.write_str("end of input"),
        }
    }
}

pub(crate) fn tokenize(src: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(src).run()
}

struct Lexer {
    chars: Vec<char>,
    index: usize,
    line: u32,
    col: u32,
}

impl Lexer {
    fn new(src: &str) -> Self {
        Self {
            chars: src.chars().collect(),
            index: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.index + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.index += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn pos(&self) -> Pos {
        Pos::new(self.line, self.col)
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let pos = self.pos();
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    pos,
                });
                return Ok(tokens);
            };

            let kind = match c {
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                '[' => self.single(TokenKind::LBracket),
                ']' => self.single(TokenKind::RBracket),
                '{' => self.single(TokenKind::LBrace),
                '}' => self.single(TokenKind::RBrace),
                ',' => self.single(TokenKind::Comma),
                '?' => self.single(TokenKind::Question),
                '@' => self.single(TokenKind::At),
                '+' => self.single(TokenKind::Plus),
                '-' => self.single(TokenKind::Minus),
                '*' => self.single(TokenKind::Star),
                '/' => self.single(TokenKind::Slash),
                '%' => self.single(TokenKind::Percent),
                ':' => self.pair(':', TokenKind::ColonColon, TokenKind::Colon),
                '.' => self.pair('.', TokenKind::DotDot, TokenKind::Dot),
                '<' => self.pair('=', TokenKind::Le, TokenKind::Lt),
                '>' => self.pair('=', TokenKind::Ge, TokenKind::Gt),
                '=' => match self.peek2() {
                    Some('=') => self.double(TokenKind::Eq),
                    Some('~') => self.double(TokenKind::RegexMatch),
                    _ => self.single(TokenKind::Assign),
                },
                '!' => match self.peek2() {
                    Some('=') => self.double(TokenKind::Ne),
                    Some('~') => self.double(TokenKind::RegexNotMatch),
                    _ => self.single(TokenKind::Bang),
                },
                '&' if self.peek2() == Some('&') => self.double(TokenKind::AndAnd),
                '|' if self.peek2() == Some('|') => self.double(TokenKind::OrOr),
                '\'' | '"' => self.string(pos)?,
                '0'..='9' => self.number(pos)?,
                c if c.is_ascii_alphabetic() || c == '_' => self.word(),
                other => {
                    return Err(SyntaxError::new(
                        pos,
                        format!("unexpected character '{other}'"),
                    ))
                }
            };
            tokens.push(Token { kind, pos });
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn double(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        self.bump();
        kind
    }

    fn pair(&mut self, second: char, double: TokenKind, single: TokenKind) -> TokenKind {
        if self.peek2() == Some(second) {
            self.double(double)
        } else {
            self.single(single)
        }
    }

    fn skip_trivia(&mut self) -> Result<(), SyntaxError> {
        loop {
            match (self.peek(), self.peek2()) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.pos();
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek2()) {
                            (Some('*'), Some('/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => {
                                return Err(SyntaxError::new(start, "unterminated block comment"))
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn string(&mut self, start: Pos) -> Result<TokenKind, SyntaxError> {
        let quote = match self.bump() {
            Some(q) => q,
            None => return Err(SyntaxError::new(start, "unterminated string literal")),
        };
        let mut text = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(SyntaxError::new(start, "unterminated string literal"))
                }
                Some(c) if c == quote => return Ok(TokenKind::Str(text)),
                Some('\\') => {
                    let escape_pos = self.pos();
                    match self.bump() {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some('r') => text.push('\r'),
                        Some('0') => text.push('\0'),
                        Some('\\') => text.push('\\'),
                        Some('/') => text.push('/'),
                        Some('\'') => text.push('\''),
                        Some('"') => text.push('"'),
                        Some(other) => {
                            return Err(SyntaxError::new(
                                escape_pos,
                                format!("invalid escape sequence '\\{other}'"),
                            ))
                        }
                        None => {
                            return Err(SyntaxError::new(start, "unterminated string literal"))
                        }
                    }
                }
                Some(c) => text.push(c),
            }
        }
    }

    fn number(&mut self, start: Pos) -> Result<TokenKind, SyntaxError> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }

        // A '.' followed by a digit continues a float; '..' is the range
        // operator and must stay untouched.
        let is_float = self.peek() == Some('.')
            && self.peek2().map(|c| c.is_ascii_digit()).unwrap_or(false);
        if is_float {
            text.push('.');
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            let value: f64 = text
                .parse()
                .map_err(|_| SyntaxError::new(start, format!("invalid number '{text}'")))?;
            return Ok(TokenKind::Float(value));
        }

        let value: i64 = text
            .parse()
            .map_err(|_| SyntaxError::new(start, format!("integer literal '{text}' out of range")))?;
        Ok(TokenKind::Int(value))
    }

    fn word(&mut self) -> TokenKind {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        match Keyword::from_word(&text) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident(text),
        }
    }
}
