use crate::ast::{Expression, FunctionDecl, LiteralValue, Statement};
use crate::stack::ensure_sufficient_stack;
use crate::token::{Token, TokenType};
use std::cell::Cell;
use std::mem;
use std::rc::Rc;
use thiserror::Error;

/// Calls and function declarations are limited to this many arguments.
pub const MAX_ARGUMENTS: usize = 255;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("[line {line}] Error{location}: {message}")]
pub struct ParseError {
    pub line: usize,
    /// ` at 'lexeme'` or ` at end`.
    pub location: String,
    pub message: String,
}

static EOF_TOKEN: Token = Token {
    tokentype: TokenType::Eof,
    lexeme: String::new(),
    line: 0,
};

type ParseResult<T> = Result<T, ParseError>;

/// Parses every statement it can. A malformed statement is reported and
/// skipped, so the returned errors cover the whole token stream.
pub fn parse(tokens: &[Token]) -> (Vec<Statement>, Vec<ParseError>) {
    let mut parser = Parser::new(tokens);
    let statements = parser.parse();
    tracing::debug!(
        statements = statements.len(),
        errors = parser.errors.len(),
        "parsed tokens"
    );
    (statements, parser.errors)
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    current: usize,
    errors: Vec<ParseError>,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Parser<'a> {
        Parser {
            tokens,
            current: 0,
            errors: Vec::new(),
        }
    }
    pub fn parse(&mut self) -> Vec<Statement> {
        let mut statements: Vec<Statement> = Vec::new();
        while !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }
        statements
    }
    fn declaration(&mut self) -> Option<Statement> {
        let result = ensure_sufficient_stack(|| match self.peek().tokentype {
            TokenType::Class => {
                self.advance();
                self.class_declaration()
            }
            TokenType::Fun if self.next_is_identifier() => {
                self.advance();
                self.function("function").map(Statement::Function)
            }
            TokenType::Var => {
                self.advance();
                self.var_declaration()
            }
            _ => self.statement(),
        });
        match result {
            Ok(stmt) => Some(stmt),
            Err(err) => {
                self.errors.push(err);
                self.synchronize();
                None
            }
        }
    }
    fn class_declaration(&mut self) -> ParseResult<Statement> {
        let name = self.consume_identifier("Expect class name.")?;
        let superclass = if self.next_if(&TokenType::Less) {
            let superclass_name = self.consume_identifier("Expect superclass name.")?;
            Some(Expression::Variable {
                name: superclass_name,
                depth: Cell::new(None),
            })
        } else {
            None
        };
        self.consume(&TokenType::LeftBrace, "Expect '{' before class body.")?;
        let mut methods = Vec::new();
        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            methods.push(self.function("method")?);
        }
        self.consume(&TokenType::RightBrace, "Expect '}' after class body.")?;
        Ok(Statement::Class {
            name,
            superclass,
            methods,
        })
    }
    fn function(&mut self, kind: &str) -> ParseResult<Rc<FunctionDecl>> {
        let name = self.consume_identifier(&format!("Expect {} name.", kind))?;
        self.consume(
            &TokenType::LeftParen,
            &format!("Expect '(' after {} name.", kind),
        )?;
        self.function_body(name.clone(), Some(name), kind)
    }
    /// Parameters and body, starting just after the opening parenthesis.
    fn function_body(
        &mut self,
        keyword: Token,
        name: Option<Token>,
        kind: &str,
    ) -> ParseResult<Rc<FunctionDecl>> {
        let mut params = Vec::new();
        if !self.check(&TokenType::RightParen) {
            loop {
                if params.len() >= MAX_ARGUMENTS {
                    let err = self.error(self.peek(), "Can't have more than 255 parameters.");
                    self.errors.push(err);
                }
                params.push(self.consume_identifier("Expect parameter name.")?);
                if !self.next_if(&TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenType::RightParen, "Expect ')' after parameters.")?;
        self.consume(
            &TokenType::LeftBrace,
            &format!("Expect '{{' before {} body.", kind),
        )?;
        let body = self.block()?;
        Ok(Rc::new(FunctionDecl {
            name,
            keyword,
            params,
            body,
        }))
    }
    fn var_declaration(&mut self) -> ParseResult<Statement> {
        let name = self.consume_identifier("Expect variable name.")?;
        let initializer = if self.next_if(&TokenType::Equal) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(
            &TokenType::Semicolon,
            "Expect ';' after variable declaration.",
        )?;
        Ok(Statement::Var { name, initializer })
    }
    fn statement(&mut self) -> ParseResult<Statement> {
        match self.peek().tokentype {
            TokenType::If => {
                self.advance();
                self.if_statement()
            }
            TokenType::Print => {
                self.advance();
                self.print_statement()
            }
            TokenType::Return => {
                self.advance();
                self.return_statement()
            }
            TokenType::LeftBrace => {
                self.advance();
                Ok(Statement::Block(self.block()?))
            }
            TokenType::While => {
                self.advance();
                self.while_statement()
            }
            TokenType::For => {
                self.advance();
                self.for_statement()
            }
            _ => self.expression_statement(),
        }
    }
    fn for_statement(&mut self) -> ParseResult<Statement> {
        self.consume(&TokenType::LeftParen, "Expect '(' after 'for'.")?;
        let initializer = match self.peek().tokentype {
            TokenType::Semicolon => {
                self.advance();
                None
            }
            TokenType::Var => {
                self.advance();
                Some(self.var_declaration()?)
            }
            _ => Some(self.expression_statement()?),
        };

        let condition = match self.peek().tokentype {
            TokenType::Semicolon => Expression::Literal(LiteralValue::Boolean(true)),
            _ => self.expression()?,
        };
        self.consume(&TokenType::Semicolon, "Expect ';' after loop condition.")?;

        let increment = match self.peek().tokentype {
            TokenType::RightParen => None,
            _ => Some(self.expression()?),
        };
        self.consume(&TokenType::RightParen, "Expect ')' after for clauses.")?;

        let mut body = self.statement()?;
        if let Some(x) = increment {
            body = Statement::Block(vec![body, Statement::Expression(x)]);
        }
        body = Statement::While {
            condition,
            body: Box::new(body),
        };
        match initializer {
            None => Ok(body),
            Some(x) => Ok(Statement::Block(vec![x, body])),
        }
    }
    fn while_statement(&mut self) -> ParseResult<Statement> {
        self.consume(&TokenType::LeftParen, "Expect '(' after 'while'.")?;
        let condition = self.expression()?;
        self.consume(&TokenType::RightParen, "Expect ')' after condition.")?;
        let body = self.statement()?;
        Ok(Statement::While {
            condition,
            body: Box::new(body),
        })
    }
    fn if_statement(&mut self) -> ParseResult<Statement> {
        self.consume(&TokenType::LeftParen, "Expect '(' after 'if'.")?;
        let condition = self.expression()?;
        self.consume(&TokenType::RightParen, "Expect ')' after if condition.")?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.next_if(&TokenType::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Statement::If {
            condition,
            then_branch,
            else_branch,
        })
    }
    fn return_statement(&mut self) -> ParseResult<Statement> {
        let keyword = self.previous().clone();
        let value = if self.check(&TokenType::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(&TokenType::Semicolon, "Expect ';' after return value.")?;
        Ok(Statement::Return { keyword, value })
    }
    /// Statements up to the closing brace; the opening brace is already consumed.
    fn block(&mut self) -> ParseResult<Vec<Statement>> {
        let mut statements: Vec<Statement> = Vec::new();
        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }
        self.consume(&TokenType::RightBrace, "Expect '}' after block.")?;
        Ok(statements)
    }
    fn print_statement(&mut self) -> ParseResult<Statement> {
        let keyword = self.previous().clone();
        let value = self.expression()?;
        self.consume(&TokenType::Semicolon, "Expect ';' after value.")?;
        Ok(Statement::Print { keyword, value })
    }
    fn expression_statement(&mut self) -> ParseResult<Statement> {
        let expr = self.expression()?;
        self.consume(&TokenType::Semicolon, "Expect ';' after expression.")?;
        Ok(Statement::Expression(expr))
    }
    fn expression(&mut self) -> ParseResult<Expression> {
        ensure_sufficient_stack(|| self.assignment())
    }
    fn assignment(&mut self) -> ParseResult<Expression> {
        let expr = self.or()?;
        if !self.next_if(&TokenType::Equal) {
            return Ok(expr);
        }
        let equals = self.previous().clone();
        let value = Box::new(self.assignment()?);
        match expr {
            Expression::Variable { name, .. } => Ok(Expression::Assign {
                name,
                value,
                depth: Cell::new(None),
            }),
            Expression::Get { object, name } => Ok(Expression::Set {
                object,
                name,
                value,
            }),
            other => {
                // Reported, but the parser is not confused, so keep going.
                let err = self.error(&equals, "Invalid assignment target.");
                self.errors.push(err);
                Ok(other)
            }
        }
    }
    fn or(&mut self) -> ParseResult<Expression> {
        let mut expr = self.and()?;
        while self.next_if(&TokenType::Or) {
            let operator = self.previous().clone();
            let right = self.and()?;
            expr = Expression::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }
    fn and(&mut self) -> ParseResult<Expression> {
        let mut expr = self.equality()?;
        while self.next_if(&TokenType::And) {
            let operator = self.previous().clone();
            let right = self.equality()?;
            expr = Expression::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }
    fn equality(&mut self) -> ParseResult<Expression> {
        let mut expr = self.comparison()?;
        loop {
            match self.peek().tokentype {
                TokenType::BangEqual | TokenType::EqualEqual => {
                    self.advance();
                    let operator = self.previous().clone();
                    let right = self.comparison()?;
                    expr = binary(expr, operator, right);
                }
                _ => break,
            }
        }
        Ok(expr)
    }
    fn comparison(&mut self) -> ParseResult<Expression> {
        let mut expr = self.addition()?;
        loop {
            match self.peek().tokentype {
                TokenType::Greater
                | TokenType::GreaterEqual
                | TokenType::Less
                | TokenType::LessEqual => {
                    self.advance();
                    let operator = self.previous().clone();
                    let right = self.addition()?;
                    expr = binary(expr, operator, right);
                }
                _ => break,
            }
        }
        Ok(expr)
    }
    fn addition(&mut self) -> ParseResult<Expression> {
        let mut expr = self.multiplication()?;
        loop {
            match self.peek().tokentype {
                TokenType::Minus | TokenType::Plus => {
                    self.advance();
                    let operator = self.previous().clone();
                    let right = self.multiplication()?;
                    expr = binary(expr, operator, right);
                }
                _ => break,
            }
        }
        Ok(expr)
    }
    fn multiplication(&mut self) -> ParseResult<Expression> {
        let mut expr = self.unary()?;
        loop {
            match self.peek().tokentype {
                TokenType::Slash | TokenType::Star | TokenType::Percent => {
                    self.advance();
                    let operator = self.previous().clone();
                    let right = self.unary()?;
                    expr = binary(expr, operator, right);
                }
                _ => break,
            }
        }
        Ok(expr)
    }
    fn unary(&mut self) -> ParseResult<Expression> {
        match self.peek().tokentype {
            TokenType::Bang | TokenType::Minus => {
                self.advance();
                let operator = self.previous().clone();
                let right = ensure_sufficient_stack(|| self.unary())?;
                Ok(Expression::Unary {
                    operator,
                    right: Box::new(right),
                })
            }
            _ => self.call(),
        }
    }
    fn call(&mut self) -> ParseResult<Expression> {
        let mut expr = self.primary()?;
        loop {
            if self.next_if(&TokenType::LeftParen) {
                expr = self.finish_call(expr)?;
            } else if self.next_if(&TokenType::Dot) {
                let name = self.consume_identifier("Expect property name after '.'.")?;
                expr = Expression::Get {
                    object: Box::new(expr),
                    name,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }
    fn finish_call(&mut self, callee: Expression) -> ParseResult<Expression> {
        let mut arguments = Vec::new();
        if !self.check(&TokenType::RightParen) {
            loop {
                if arguments.len() >= MAX_ARGUMENTS {
                    let err = self.error(self.peek(), "Can't have more than 255 arguments.");
                    self.errors.push(err);
                }
                arguments.push(self.expression()?);
                if !self.next_if(&TokenType::Comma) {
                    break;
                }
            }
        }
        let paren = self
            .consume(&TokenType::RightParen, "Expect ')' after arguments.")?
            .clone();
        Ok(Expression::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        })
    }
    fn primary(&mut self) -> ParseResult<Expression> {
        let token = self.peek();
        let expr = match &token.tokentype {
            TokenType::False => Expression::Literal(LiteralValue::Boolean(false)),
            TokenType::True => Expression::Literal(LiteralValue::Boolean(true)),
            TokenType::Nil => Expression::Literal(LiteralValue::Nil),
            TokenType::Number(x) => Expression::Literal(LiteralValue::Number(*x)),
            TokenType::String(x) => Expression::Literal(LiteralValue::String(x.as_str().into())),
            TokenType::Identifier(_) => Expression::Variable {
                name: token.clone(),
                depth: Cell::new(None),
            },
            TokenType::This => Expression::This {
                keyword: token.clone(),
                depth: Cell::new(None),
            },
            TokenType::Super => {
                let keyword = token.clone();
                self.advance();
                self.consume(&TokenType::Dot, "Expect '.' after 'super'.")?;
                let method = self.consume_identifier("Expect superclass method name.")?;
                return Ok(Expression::Super {
                    keyword,
                    method,
                    depth: Cell::new(None),
                });
            }
            TokenType::Fun => {
                let keyword = token.clone();
                self.advance();
                self.consume(&TokenType::LeftParen, "Expect '(' after 'fun'.")?;
                return Ok(Expression::Function(
                    self.function_body(keyword, None, "function")?,
                ));
            }
            TokenType::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(&TokenType::RightParen, "Expect ')' after expression.")?;
                return Ok(Expression::Grouping(Box::new(expr)));
            }
            _ => return Err(self.error(token, "Expect expression.")),
        };
        self.advance();
        Ok(expr)
    }
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if let TokenType::Semicolon = self.previous().tokentype {
                return;
            }
            match self.peek().tokentype {
                TokenType::Class
                | TokenType::Fun
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return => return,
                _ => (),
            }
            self.advance();
        }
    }
    fn advance(&mut self) -> &'a Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }
    fn is_at_end(&self) -> bool {
        self.peek().is_eof()
    }
    /// Compares token kinds only, ignoring literal payloads.
    fn check(&self, tokentype: &TokenType) -> bool {
        mem::discriminant(&self.peek().tokentype) == mem::discriminant(tokentype)
    }
    fn next_if(&mut self, tokentype: &TokenType) -> bool {
        if self.check(tokentype) {
            self.advance();
            true
        } else {
            false
        }
    }
    fn next_is_identifier(&self) -> bool {
        matches!(
            self.tokens.get(self.current + 1).map(|t| &t.tokentype),
            Some(TokenType::Identifier(_))
        )
    }
    fn consume(&mut self, tokentype: &TokenType, message: &str) -> ParseResult<&'a Token> {
        if self.check(tokentype) {
            Ok(self.advance())
        } else {
            Err(self.error(self.peek(), message))
        }
    }
    fn consume_identifier(&mut self, message: &str) -> ParseResult<Token> {
        match self.peek().tokentype {
            TokenType::Identifier(_) => Ok(self.advance().clone()),
            _ => Err(self.error(self.peek(), message)),
        }
    }
    fn peek(&self) -> &'a Token {
        self.tokens
            .get(self.current)
            .or_else(|| self.tokens.last())
            .unwrap_or(&EOF_TOKEN)
    }
    fn previous(&self) -> &'a Token {
        self.tokens
            .get(self.current.saturating_sub(1))
            .unwrap_or(&EOF_TOKEN)
    }
    fn error(&self, token: &Token, message: &str) -> ParseError {
        let location = if token.is_eof() {
            String::from(" at end")
        } else {
            format!(" at '{}'", token.lexeme)
        };
        ParseError {
            line: token.line,
            location,
            message: message.to_string(),
        }
    }
}

fn binary(left: Expression, operator: Token, right: Expression) -> Expression {
    Expression::Binary {
        left: Box::new(left),
        operator,
        right: Box::new(right),
    }
}
