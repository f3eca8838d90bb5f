use crate::token::{Token, TokenType};
use phf::phf_map;
use std::iter::Peekable;
use std::str::CharIndices;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("[line {line}] Error: {message}")]
pub struct ScanError {
    pub line: usize,
    pub message: String,
}

// Note: current becomes self.iter.peek()?.0
struct Scanner<'a> {
    source: &'a str,
    iter: Peekable<CharIndices<'a>>,
    start: usize,
    line: usize,
}

/// Scans the whole source, collecting every error instead of stopping at
/// the first one. The token list always ends with `Eof`.
pub fn scan_tokens(source: &str) -> (Vec<Token>, Vec<ScanError>) {
    let mut scanner = Scanner {
        source,
        iter: source.char_indices().peekable(),
        start: 0,
        line: 1,
    };
    let mut tokens: Vec<Token> = Vec::new();
    let mut errors: Vec<ScanError> = Vec::new();

    while let Some((idx, _)) = scanner.iter.peek() {
        scanner.start = *idx;
        match scanner.scan_token() {
            Ok(Some(token)) => tokens.push(token),
            Ok(None) => (),
            Err(e) => errors.push(e),
        }
    }
    tokens.push(Token::new(TokenType::Eof, "", scanner.line));
    tracing::debug!(
        tokens = tokens.len(),
        errors = errors.len(),
        "scanned source"
    );
    (tokens, errors)
}

impl<'a> Scanner<'a> {
    fn scan_token(&mut self) -> Result<Option<Token>, ScanError> {
        let c = match self.iter.next() {
            Some((_, c)) => c,
            None => return Ok(None),
        };
        match c {
            '(' => Ok(Some(self.token(TokenType::LeftParen))),
            ')' => Ok(Some(self.token(TokenType::RightParen))),
            '{' => Ok(Some(self.token(TokenType::LeftBrace))),
            '}' => Ok(Some(self.token(TokenType::RightBrace))),
            ',' => Ok(Some(self.token(TokenType::Comma))),
            '.' => Ok(Some(self.token(TokenType::Dot))),
            '-' => Ok(Some(self.token(TokenType::Minus))),
            '+' => Ok(Some(self.token(TokenType::Plus))),
            ';' => Ok(Some(self.token(TokenType::Semicolon))),
            '*' => Ok(Some(self.token(TokenType::Star))),
            '%' => Ok(Some(self.token(TokenType::Percent))),
            '!' => Ok(Some(self.either('=', TokenType::BangEqual, TokenType::Bang))),
            '=' => Ok(Some(self.either('=', TokenType::EqualEqual, TokenType::Equal))),
            '<' => Ok(Some(self.either('=', TokenType::LessEqual, TokenType::Less))),
            '>' => Ok(Some(self.either('=', TokenType::GreaterEqual, TokenType::Greater))),
            '/' => {
                if self.next_if('/') {
                    while let Some((_, c)) = self.iter.peek() {
                        if *c == '\n' {
                            break;
                        }
                        self.iter.next();
                    }
                    Ok(None)
                } else {
                    Ok(Some(self.token(TokenType::Slash)))
                }
            }
            ' ' | '\r' | '\t' => Ok(None),
            '\n' => {
                self.line += 1;
                Ok(None)
            }
            '"' | '\'' => self.string(c).map(Some),
            '0'..='9' => self.number().map(Some),
            'a'..='z' | 'A'..='Z' | '_' => Ok(Some(self.identifier())),
            _ => Err(self.error(format!("Unexpected character '{}'.", c))),
        }
    }
    fn current(&mut self) -> usize {
        match self.iter.peek() {
            None => self.source.len(),
            Some((idx, _)) => *idx,
        }
    }
    fn token(&mut self, token_type: TokenType) -> Token {
        let current = self.current();
        Token::new(token_type, &self.source[self.start..current], self.line)
    }
    fn error(&self, message: String) -> ScanError {
        ScanError {
            line: self.line,
            message,
        }
    }
    fn either(&mut self, expected: char, matched: TokenType, otherwise: TokenType) -> Token {
        if self.next_if(expected) {
            self.token(matched)
        } else {
            self.token(otherwise)
        }
    }
    fn next_if(&mut self, expected: char) -> bool {
        self.iter.next_if(|(_, c)| *c == expected).is_some()
    }
    fn peek_is_digit(&mut self) -> bool {
        matches!(self.iter.peek(), Some((_, '0'..='9')))
    }
    fn string(&mut self, quote: char) -> Result<Token, ScanError> {
        loop {
            match self.iter.peek() {
                Some((_, c)) if *c == quote => break,
                // Strings close on the line they open on. The newline is
                // left for the main loop so line counting stays correct.
                Some((_, '\n')) | None => {
                    return Err(self.error("Unterminated string.".to_string()));
                }
                Some(_) => {
                    self.iter.next();
                }
            }
        }
        self.iter.next();
        let current = self.current();
        let value = self.source[self.start + 1..current - 1].to_string();
        Ok(self.token(TokenType::String(value)))
    }
    fn number(&mut self) -> Result<Token, ScanError> {
        while self.peek_is_digit() {
            self.iter.next();
        }

        if let Some((_, '.')) = self.iter.peek() {
            let mut lookahead = self.iter.clone();
            lookahead.next();
            if let Some((_, '0'..='9')) = lookahead.peek() {
                self.iter.next();
                while self.peek_is_digit() {
                    self.iter.next();
                }
            }
        }

        let current = self.current();
        let source = self.source;
        let text = &source[self.start..current];
        let value: f64 = text
            .parse()
            .map_err(|_| self.error(format!("Invalid number '{}'.", text)))?;
        Ok(self.token(TokenType::Number(value)))
    }
    fn identifier(&mut self) -> Token {
        while let Some((_, '0'..='9' | 'a'..='z' | 'A'..='Z' | '_')) = self.iter.peek() {
            self.iter.next();
        }
        let current = self.current();
        let source = self.source;
        let text = &source[self.start..current];
        match KEYWORDS.get(text) {
            None => self.token(TokenType::Identifier(text.to_string())),
            Some(x) => self.token(x.clone()),
        }
    }
}

static KEYWORDS: phf::Map<&'static str, TokenType> = phf_map! {
    "and" => TokenType::And,
    "class" => TokenType::Class,
    "else" => TokenType::Else,
    "false" => TokenType::False,
    "for" => TokenType::For,
    "fun" => TokenType::Fun,
    "if" => TokenType::If,
    "nil" => TokenType::Nil,
    "or" => TokenType::Or,
    "print" => TokenType::Print,
    "return" => TokenType::Return,
    "super" => TokenType::Super,
    "this" => TokenType::This,
    "true" => TokenType::True,
    "var" => TokenType::Var,
    "while" => TokenType::While,
};
