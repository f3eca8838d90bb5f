use crate::ast::{Depth, Expression, FunctionDecl, Statement, Visitor};
use crate::stack::ensure_sufficient_stack;
use crate::token::Token;
use rustc_hash::FxHashMap;
use std::mem;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("[line {line}] Error at '{lexeme}': {message}")]
pub struct ResolveError {
    pub line: usize,
    pub lexeme: String,
    pub message: String,
}

impl ResolveError {
    fn new(token: &Token, message: &str) -> ResolveError {
        ResolveError {
            line: token.line,
            lexeme: token.lexeme.clone(),
            message: message.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum FunctionType {
    None,
    Function,
    Initializer,
    Method,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

/// Static pass that records, for every local variable reference, how many
/// scopes separate it from its declaration. Globals are left unresolved.
pub struct Resolver {
    /// `false` while a variable is declared but its initializer is still running.
    scopes: Vec<FxHashMap<String, bool>>,
    current_function: FunctionType,
    current_class: ClassType,
    errors: Vec<ResolveError>,
}

impl Default for Resolver {
    fn default() -> Self {
        Resolver::new()
    }
}

impl Visitor<Expression, ()> for Resolver {
    fn visit(&mut self, expr: &Expression) {
        match expr {
            Expression::Binary { left, right, .. } | Expression::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expression::Grouping(inner) => self.resolve_expr(inner),
            Expression::Literal(_) => (),
            Expression::Unary { right, .. } => self.resolve_expr(right),
            Expression::Variable { name, depth } => {
                if let Some(false) = self.scopes.last().and_then(|s| s.get(&name.lexeme)) {
                    self.error(name, "Can't read local variable in its own initializer.");
                }
                self.resolve_local(name, depth);
            }
            Expression::Assign { name, value, depth } => {
                self.resolve_expr(value);
                self.resolve_local(name, depth);
            }
            Expression::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee);
                for argument in arguments {
                    self.resolve_expr(argument);
                }
            }
            Expression::Get { object, .. } => self.resolve_expr(object),
            Expression::Set { object, value, .. } => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }
            Expression::This { keyword, depth } => {
                if self.current_class == ClassType::None {
                    self.error(keyword, "Can't use 'this' outside of a class.");
                    return;
                }
                self.resolve_local(keyword, depth);
            }
            Expression::Super { keyword, depth, .. } => {
                match self.current_class {
                    ClassType::None => {
                        self.error(keyword, "Can't use 'super' outside of a class.");
                    }
                    ClassType::Class => {
                        self.error(keyword, "Can't use 'super' in a class with no superclass.");
                    }
                    ClassType::Subclass => self.resolve_local(keyword, depth),
                }
            }
            Expression::Function(decl) => self.resolve_function(decl, FunctionType::Function),
        }
    }
}

impl Visitor<Statement, ()> for Resolver {
    fn visit(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Print { value: expr, .. } | Statement::Expression(expr) => {
                self.resolve_expr(expr)
            }
            Statement::Var { name, initializer } => {
                self.declare(name);
                if let Some(x) = initializer {
                    self.resolve_expr(x);
                }
                self.define(name);
            }
            Statement::Block(stmts) => {
                self.begin_scope();
                self.resolve_all(stmts);
                self.end_scope();
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(x) = else_branch {
                    self.resolve_stmt(x);
                }
            }
            Statement::While { condition, body } => {
                self.resolve_expr(condition);
                self.resolve_stmt(body);
            }
            Statement::Function(decl) => {
                if let Some(name) = &decl.name {
                    self.declare(name);
                    self.define(name);
                }
                self.resolve_function(decl, FunctionType::Function);
            }
            Statement::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.error(keyword, "Can't return from top-level code.");
                }
                if let Some(x) = value {
                    if self.current_function == FunctionType::Initializer {
                        self.error(keyword, "Can't return a value from an initializer.");
                    }
                    self.resolve_expr(x);
                }
            }
            Statement::Class {
                name,
                superclass,
                methods,
            } => {
                let enclosing_class = self.current_class;
                self.current_class = ClassType::Class;
                self.declare(name);
                self.define(name);

                if let Some(superclass) = superclass {
                    if let Expression::Variable {
                        name: superclass_name,
                        ..
                    } = superclass
                    {
                        if superclass_name.lexeme == name.lexeme {
                            self.error(superclass_name, "A class can't inherit from itself.");
                        }
                    }
                    self.current_class = ClassType::Subclass;
                    self.resolve_expr(superclass);
                    self.begin_scope();
                    self.define_keyword("super");
                }

                self.begin_scope();
                self.define_keyword("this");
                for method in methods {
                    let function_type = if method.name() == "init" {
                        FunctionType::Initializer
                    } else {
                        FunctionType::Method
                    };
                    self.resolve_function(method, function_type);
                }
                self.end_scope();

                if superclass.is_some() {
                    self.end_scope();
                }
                self.current_class = enclosing_class;
            }
        }
    }
}

impl Resolver {
    pub fn new() -> Resolver {
        Resolver {
            scopes: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
            errors: Vec::new(),
        }
    }
    /// Resolves the whole tree and reports every error found, in source order.
    pub fn resolve(&mut self, statements: &[Statement]) -> Result<(), Vec<ResolveError>> {
        self.resolve_all(statements);
        tracing::debug!(errors = self.errors.len(), "resolved statements");
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(mem::take(&mut self.errors))
        }
    }
    fn resolve_all(&mut self, statements: &[Statement]) {
        for stmt in statements {
            self.resolve_stmt(stmt);
        }
    }
    fn resolve_expr(&mut self, expr: &Expression) {
        ensure_sufficient_stack(|| expr.accept(self))
    }
    fn resolve_stmt(&mut self, stmt: &Statement) {
        ensure_sufficient_stack(|| stmt.accept(self))
    }
    fn begin_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }
    fn end_scope(&mut self) {
        self.scopes.pop();
    }
    fn declare(&mut self, name: &Token) {
        let duplicate = match self.scopes.last_mut() {
            Some(scope) => scope.insert(name.lexeme.clone(), false).is_some(),
            None => false,
        };
        if duplicate {
            self.error(name, "Already a variable with this name in this scope.");
        }
    }
    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }
    fn define_keyword(&mut self, keyword: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(keyword.to_string(), true);
        }
    }
    fn resolve_local(&mut self, name: &Token, depth: &Depth) {
        for (i, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(&name.lexeme) {
                depth.set(Some(i));
                return;
            }
        }
    }
    fn resolve_function(&mut self, decl: &FunctionDecl, function_type: FunctionType) {
        let enclosing_function = self.current_function;
        self.current_function = function_type;
        self.begin_scope();
        for param in &decl.params {
            self.declare(param);
            self.define(param);
        }
        self.resolve_all(&decl.body);
        self.end_scope();
        self.current_function = enclosing_function;
    }
    fn error(&mut self, token: &Token, message: &str) {
        self.errors.push(ResolveError::new(token, message));
    }
}
