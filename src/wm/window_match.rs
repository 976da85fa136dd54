//! Window Match Expressions
//!
//! Small boolean language selecting windows, used by the focus prevention
//! policy:
//!
//! ```text
//! any
//! type=dialog | type=modaldialog
//! !(class=Firefox) & state=attention
//! xid=0x1a00003
//! ```

use std::fmt;
use std::str::FromStr;

use crate::core::Xid;
use crate::error::MatchError;
use crate::wm::client::Client;
use crate::wm::client_flags::{WindowState, WindowType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowMatch {
    Any,
    Type(WindowType),
    State(WindowState),
    Xid(Xid),
    Class(String),
    Not(Box<WindowMatch>),
    And(Box<WindowMatch>, Box<WindowMatch>),
    Or(Box<WindowMatch>, Box<WindowMatch>),
}

impl WindowMatch {
    pub fn parse(input: &str) -> Result<Self, MatchError> {
        let tokens = tokenize(input);
        if tokens.is_empty() {
            return Err(MatchError::Empty);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.or()?;
        match parser.tokens.get(parser.pos) {
            None => Ok(expr),
            Some((offset, token)) => Err(MatchError::Unexpected {
                offset: *offset,
                found: token.to_string(),
            }),
        }
    }

    pub fn matches(&self, c: &Client) -> bool {
        match self {
            WindowMatch::Any => true,
            WindowMatch::Type(t) => c.is_type(*t),
            WindowMatch::State(s) => c.state.contains(*s),
            WindowMatch::Xid(id) => c.id == *id,
            WindowMatch::Class(class) => c.res_class.as_deref() == Some(class.as_str()),
            WindowMatch::Not(inner) => !inner.matches(c),
            WindowMatch::And(a, b) => a.matches(c) && b.matches(c),
            WindowMatch::Or(a, b) => a.matches(c) || b.matches(c),
        }
    }
}

impl Default for WindowMatch {
    fn default() -> Self {
        WindowMatch::Any
    }
}

impl FromStr for WindowMatch {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for WindowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowMatch::Any => write!(f, "any"),
            WindowMatch::Type(t) => write!(f, "type={}", t.name()),
            WindowMatch::State(s) => write!(f, "state={}", s.name()),
            WindowMatch::Xid(id) => write!(f, "xid=0x{:x}", id),
            WindowMatch::Class(class) => write!(f, "class={}", class),
            WindowMatch::Not(inner) => write!(f, "!({})", inner),
            WindowMatch::And(a, b) => write!(f, "({}) & ({})", a, b),
            WindowMatch::Or(a, b) => write!(f, "({}) | ({})", a, b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    And,
    Or,
    Not,
    Term(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Open => write!(f, "("),
            Token::Close => write!(f, ")"),
            Token::And => write!(f, "&"),
            Token::Or => write!(f, "|"),
            Token::Not => write!(f, "!"),
            Token::Term(t) => write!(f, "{}", t),
        }
    }
}

fn tokenize(input: &str) -> Vec<(usize, Token)> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        let single = match ch {
            '(' => Some(Token::Open),
            ')' => Some(Token::Close),
            '&' => Some(Token::And),
            '|' => Some(Token::Or),
            '!' => Some(Token::Not),
            _ => None,
        };
        if let Some(token) = single {
            tokens.push((offset, token));
            chars.next();
            continue;
        }
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        let mut term = String::new();
        while let Some(&(_, c)) = chars.peek() {
            if c.is_whitespace() || "()&|!".contains(c) {
                break;
            }
            term.push(c);
            chars.next();
        }
        tokens.push((offset, Token::Term(term)));
    }
    tokens
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Result<(usize, Token), MatchError> {
        let token = self.tokens.get(self.pos).cloned().ok_or(MatchError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn or(&mut self) -> Result<WindowMatch, MatchError> {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.and()?;
            left = WindowMatch::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<WindowMatch, MatchError> {
        let mut left = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.unary()?;
            left = WindowMatch::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<WindowMatch, MatchError> {
        match self.next()? {
            (_, Token::Not) => Ok(WindowMatch::Not(Box::new(self.unary()?))),
            (_, Token::Open) => {
                let inner = self.or()?;
                match self.next()? {
                    (_, Token::Close) => Ok(inner),
                    (offset, token) => Err(MatchError::Unexpected {
                        offset,
                        found: token.to_string(),
                    }),
                }
            }
            (_, Token::Term(term)) => term_match(&term),
            (offset, token) => Err(MatchError::Unexpected {
                offset,
                found: token.to_string(),
            }),
        }
    }
}

fn term_match(term: &str) -> Result<WindowMatch, MatchError> {
    if term.eq_ignore_ascii_case("any") {
        return Ok(WindowMatch::Any);
    }
    let (key, value) = term
        .split_once('=')
        .ok_or_else(|| MatchError::UnknownKey(term.to_string()))?;
    let bad_value = || MatchError::BadValue {
        key: key.to_string(),
        value: value.to_string(),
    };

    match key {
        "type" => WindowType::from_label(value).map(WindowMatch::Type).ok_or_else(bad_value),
        "state" => WindowState::from_label(value).map(WindowMatch::State).ok_or_else(bad_value),
        "xid" => {
            let parsed = match value.strip_prefix("0x") {
                Some(hex) => Xid::from_str_radix(hex, 16),
                None => value.parse(),
            };
            parsed.map(WindowMatch::Xid).map_err(|_| bad_value())
        }
        "class" if !value.is_empty() => Ok(WindowMatch::Class(value.to_string())),
        "class" => Err(bad_value()),
        _ => Err(MatchError::UnknownKey(key.to_string())),
    }
}
