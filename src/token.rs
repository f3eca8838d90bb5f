use std::fmt;
use strum_macros::Display;

#[rustfmt::skip]
#[derive(Debug, Clone, PartialEq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    // Single-character tokens.
    LeftParen, RightParen, LeftBrace, RightBrace,
    Comma, Dot, Minus, Plus, Semicolon, Slash, Star, Percent,

    // One or two character tokens.
    Bang, BangEqual,
    Equal, EqualEqual,
    Greater, GreaterEqual,
    Less, LessEqual,

    // Literals.
    Identifier(String), String(String), Number(f64),

    // Keywords.
    And, Class, Else, False, Fun, For, If, Nil, Or,
    Print, Return, Super, This, True, Var, While,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tokentype: TokenType,
    pub lexeme: String,
    pub line: usize,
}

impl Token {
    pub fn new(tokentype: TokenType, lexeme: impl Into<String>, line: usize) -> Token {
        Token {
            tokentype,
            lexeme: lexeme.into(),
            line,
        }
    }
    pub fn is_eof(&self) -> bool {
        matches!(self.tokentype, TokenType::Eof)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tokentype {
            TokenType::String(x) => write!(f, "{} {} {}", self.tokentype, self.lexeme, x),
            TokenType::Number(x) => write!(f, "{} {} {}", self.tokentype, self.lexeme, x),
            _ => write!(f, "{} {}", self.tokentype, self.lexeme),
        }
    }
}
