use crate::ast::{Depth, Expression, FunctionDecl, LiteralValue, Statement, Visitor};
use crate::callable::{natives, LoxFunction};
use crate::class::Class;
use crate::config::Config;
use crate::heap::{EnvRef, GcStats, Heap};
use crate::stack::ensure_sufficient_stack;
use crate::token::{Token, TokenType};
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::io::{self, Write};
use std::mem;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("[line {line}] Error: {message}")]
pub struct RuntimeError {
    pub line: usize,
    pub message: String,
}

impl RuntimeError {
    pub fn new(token: &Token, message: impl Into<String>) -> RuntimeError {
        RuntimeError {
            line: token.line,
            message: message.into(),
        }
    }
}

/// How a statement finished. `return` unwinds through this, never through `Err`.
#[derive(Debug)]
pub enum Flow {
    Normal,
    Return(Value),
}

pub struct Interpreter<W: Write> {
    pub(crate) heap: Heap,
    globals: EnvRef,
    environment: EnvRef,
    /// Frames displaced by the blocks and calls currently executing.
    saved: Vec<EnvRef>,
    /// Values held only by the Rust stack while a sub-expression runs.
    temporaries: Vec<Value>,
    call_depth: usize,
    config: Config,
    output: W,
}

impl Interpreter<io::Stdout> {
    pub fn new() -> Interpreter<io::Stdout> {
        Interpreter::with_output(io::stdout(), Config::default())
    }
}

impl Default for Interpreter<io::Stdout> {
    fn default() -> Self {
        Interpreter::new()
    }
}

impl<W: Write> Interpreter<W> {
    pub fn with_output(output: W, config: Config) -> Interpreter<W> {
        let mut heap = Heap::new(&config);
        let globals = heap.new_environment(None);
        for native in natives() {
            heap.define(globals, native.name, Value::Native(Rc::new(native)));
        }
        Interpreter {
            heap,
            globals,
            environment: globals,
            saved: Vec::new(),
            temporaries: Vec::new(),
            call_depth: 0,
            config,
            output,
        }
    }
    pub fn output(&self) -> &W {
        &self.output
    }
    pub fn into_output(self) -> W {
        self.output
    }
    /// Runs top-level statements in order, stopping at the first runtime error.
    /// Globals defined before the error stay defined.
    pub fn interpret(&mut self, statements: &[Statement]) -> Result<(), RuntimeError> {
        for stmt in statements {
            if let Err(err) = self.execute(stmt) {
                tracing::debug!(line = err.line, "runtime error");
                self.reset();
                return Err(err);
            }
        }
        Ok(())
    }
    pub fn global(&self, name: &str) -> Option<Value> {
        self.heap[self.globals].lookup(name).cloned()
    }
    pub fn collect_garbage(&mut self) -> GcStats {
        let mut roots = Vec::with_capacity(self.saved.len() + 2);
        roots.push(self.globals);
        roots.push(self.environment);
        roots.extend(self.saved.iter().copied());
        self.heap.collect(&roots, &self.temporaries)
    }
    fn reset(&mut self) {
        self.environment = self.globals;
        self.saved.clear();
        self.temporaries.clear();
        self.call_depth = 0;
    }
    fn execute(&mut self, stmt: &Statement) -> Result<Flow, RuntimeError> {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        ensure_sufficient_stack(|| stmt.accept(self))
    }
    fn evaluate(&mut self, expr: &Expression) -> Result<Value, RuntimeError> {
        ensure_sufficient_stack(|| expr.accept(self))
    }
    pub(crate) fn execute_block(
        &mut self,
        statements: &[Statement],
        environment: EnvRef,
    ) -> Result<Flow, RuntimeError> {
        let previous = mem::replace(&mut self.environment, environment);
        self.saved.push(previous);
        let mut result = Ok(Flow::Normal);
        for stmt in statements {
            match self.execute(stmt) {
                Ok(Flow::Normal) => (),
                other => {
                    result = other;
                    break;
                }
            }
        }
        self.saved.pop();
        self.environment = previous;
        result
    }
    /// Keeps `value` reachable for the collector while `f` runs.
    fn rooted<T>(&mut self, value: &Value, f: impl FnOnce(&mut Self) -> T) -> T {
        let mark = self.temporaries.len();
        self.temporaries.push(value.clone());
        let result = f(self);
        self.temporaries.truncate(mark);
        result
    }
    fn look_up_variable(&self, name: &Token, depth: &Depth) -> Result<Value, RuntimeError> {
        match depth.get() {
            Some(distance) => self.heap.get_at(self.environment, distance, name),
            None => self.heap.get(self.globals, name),
        }
    }
    fn call(
        &mut self,
        callee: &Expression,
        paren: &Token,
        arguments: &[Expression],
    ) -> Result<Value, RuntimeError> {
        let callee = self.evaluate(callee)?;
        self.rooted(&callee, |this| -> Result<Value, RuntimeError> {
            let mut values = Vec::with_capacity(arguments.len());
            for argument in arguments {
                let value = this.evaluate(argument)?;
                this.temporaries.push(value.clone());
                values.push(value);
            }
            this.call_value(&callee, values, paren)
        })
    }
    fn call_value(
        &mut self,
        callee: &Value,
        arguments: Vec<Value>,
        paren: &Token,
    ) -> Result<Value, RuntimeError> {
        let arity = match callee {
            Value::Function(function) => function.arity(),
            Value::Native(native) => native.arity,
            Value::Class(class) => class.arity(),
            _ => {
                return Err(RuntimeError::new(
                    paren,
                    "Can only call functions and classes.",
                ))
            }
        };
        if arguments.len() != arity {
            return Err(RuntimeError::new(
                paren,
                format!("Expected {} arguments but got {}.", arity, arguments.len()),
            ));
        }
        if self.call_depth >= self.config.max_call_depth {
            return Err(RuntimeError::new(paren, "Stack overflow."));
        }
        tracing::trace!(callee = %callee, depth = self.call_depth, "call");
        self.call_depth += 1;
        let result = match callee {
            Value::Function(function) => function.call(self, arguments),
            Value::Native(native) => Ok((native.function)(&arguments)),
            Value::Class(class) => class.instantiate(self, arguments),
            _ => Ok(Value::Nil),
        };
        self.call_depth -= 1;
        result
    }
    fn binary(&self, operator: &Token, left: Value, right: Value) -> Result<Value, RuntimeError> {
        let value = match (&operator.tokentype, &left, &right) {
            (TokenType::EqualEqual, _, _) => Value::Boolean(left.is_equal(&right)),
            (TokenType::BangEqual, _, _) => Value::Boolean(!left.is_equal(&right)),
            (TokenType::Plus, Value::Number(l), Value::Number(r)) => Value::Number(l + r),
            (TokenType::Plus, Value::String(_), _) | (TokenType::Plus, _, Value::String(_)) => {
                Value::String(format!("{}{}", left, right).into())
            }
            (TokenType::Plus, _, _) => {
                return Err(RuntimeError::new(
                    operator,
                    "Operands must be two numbers or two strings.",
                ))
            }
            (_, Value::Number(l), Value::Number(r)) => {
                let (l, r) = (*l, *r);
                match operator.tokentype {
                    TokenType::Minus => Value::Number(l - r),
                    TokenType::Star => Value::Number(l * r),
                    TokenType::Slash if r == 0.0 => {
                        return Err(RuntimeError::new(operator, "Division by zero."))
                    }
                    TokenType::Slash => Value::Number(l / r),
                    TokenType::Percent if r == 0.0 => {
                        return Err(RuntimeError::new(operator, "Modulus by zero."))
                    }
                    TokenType::Percent => Value::Number(l % r),
                    TokenType::Greater => Value::Boolean(l > r),
                    TokenType::GreaterEqual => Value::Boolean(l >= r),
                    TokenType::Less => Value::Boolean(l < r),
                    TokenType::LessEqual => Value::Boolean(l <= r),
                    _ => {
                        return Err(RuntimeError::new(
                            operator,
                            format!("Unknown binary operator '{}'.", operator.lexeme),
                        ))
                    }
                }
            }
            _ => return Err(RuntimeError::new(operator, "Operands must be numbers.")),
        };
        Ok(value)
    }
    fn function(&self, decl: &Rc<FunctionDecl>) -> Value {
        Value::Function(Rc::new(LoxFunction::new(
            decl.clone(),
            self.environment,
            false,
        )))
    }
    fn class_declaration(
        &mut self,
        name: &Token,
        superclass: &Option<Expression>,
        methods: &[Rc<FunctionDecl>],
    ) -> Result<(), RuntimeError> {
        let superclass = match superclass {
            Some(expr) => match self.evaluate(expr)? {
                Value::Class(class) => Some(class),
                _ => {
                    let token = match expr {
                        Expression::Variable {
                            name: superclass_name,
                            ..
                        } => superclass_name,
                        _ => name,
                    };
                    return Err(RuntimeError::new(token, "Superclass must be a class."));
                }
            },
            None => None,
        };
        self.heap
            .define(self.environment, name.lexeme.as_str(), Value::Nil);

        let closure = match &superclass {
            Some(class) => {
                let environment = self.heap.new_environment(Some(self.environment));
                self.heap
                    .define(environment, "super", Value::Class(class.clone()));
                environment
            }
            None => self.environment,
        };
        let methods: FxHashMap<String, Rc<LoxFunction>> = methods
            .iter()
            .map(|decl| {
                let function = LoxFunction::new(decl.clone(), closure, decl.name() == "init");
                (decl.name().to_string(), Rc::new(function))
            })
            .collect();
        let class = Class::new(name.lexeme.clone(), superclass, methods);
        self.heap.define(
            self.environment,
            name.lexeme.as_str(),
            Value::Class(Rc::new(class)),
        );
        Ok(())
    }
}

impl<W: Write> Visitor<Expression, Result<Value, RuntimeError>> for Interpreter<W> {
    fn visit(&mut self, expr: &Expression) -> Result<Value, RuntimeError> {
        match expr {
            Expression::Literal(x) => Ok(match x {
                LiteralValue::Nil => Value::Nil,
                LiteralValue::Boolean(b) => Value::Boolean(*b),
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::String(s) => Value::String(s.clone()),
            }),
            Expression::Grouping(x) => self.evaluate(x),
            Expression::Unary { operator, right } => {
                let value = self.evaluate(right)?;
                match (&operator.tokentype, value) {
                    (TokenType::Minus, Value::Number(x)) => Ok(Value::Number(-x)),
                    (TokenType::Minus, _) => {
                        Err(RuntimeError::new(operator, "Operand must be a number."))
                    }
                    (_, value) => Ok(Value::Boolean(!value.is_truthy())),
                }
            }
            Expression::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let right = self.rooted(&left, |this| this.evaluate(right))?;
                self.binary(operator, left, right)
            }
            Expression::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let short_circuit = match operator.tokentype {
                    TokenType::Or => left.is_truthy(),
                    _ => !left.is_truthy(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.evaluate(right)
                }
            }
            Expression::Variable { name, depth } => self.look_up_variable(name, depth),
            Expression::Assign { name, value, depth } => {
                let value = self.evaluate(value)?;
                match depth.get() {
                    Some(distance) => {
                        self.heap
                            .assign_at(self.environment, distance, name, value.clone())?
                    }
                    None => self.heap.assign(self.globals, name, value.clone())?,
                }
                Ok(value)
            }
            Expression::Call {
                callee,
                paren,
                arguments,
            } => self.call(callee, paren, arguments),
            Expression::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => instance.get(name, &mut self.heap),
                _ => Err(RuntimeError::new(name, "Only instances have properties.")),
            },
            Expression::Set {
                object,
                name,
                value,
            } => {
                let object = self.evaluate(object)?;
                let instance = match &object {
                    Value::Instance(instance) => instance.clone(),
                    _ => return Err(RuntimeError::new(name, "Only instances have fields.")),
                };
                let value = self.rooted(&object, |this| this.evaluate(value))?;
                instance.set(name, value.clone(), &mut self.heap);
                Ok(value)
            }
            Expression::This { keyword, depth } => self.look_up_variable(keyword, depth),
            Expression::Super {
                keyword,
                method,
                depth,
            } => {
                let distance = match depth.get() {
                    Some(distance) => distance,
                    None => return Err(RuntimeError::new(keyword, "Unresolved 'super'.")),
                };
                let superclass = match self.heap.get_name_at(self.environment, distance, "super") {
                    Some(Value::Class(class)) => class,
                    _ => return Err(RuntimeError::new(keyword, "Unresolved 'super'.")),
                };
                // `this` is always bound one scope inside `super`.
                let object = match self
                    .heap
                    .get_name_at(self.environment, distance.saturating_sub(1), "this")
                {
                    Some(Value::Instance(instance)) => instance,
                    _ => return Err(RuntimeError::new(keyword, "Unresolved 'this'.")),
                };
                match superclass.find_method(&method.lexeme) {
                    Some(found) => Ok(Value::Function(Rc::new(
                        found.bind(object, &mut self.heap),
                    ))),
                    None => Err(RuntimeError::new(
                        method,
                        format!("Undefined property '{}'.", method.lexeme),
                    )),
                }
            }
            Expression::Function(decl) => Ok(self.function(decl)),
        }
    }
}

impl<W: Write> Visitor<Statement, Result<Flow, RuntimeError>> for Interpreter<W> {
    fn visit(&mut self, stmt: &Statement) -> Result<Flow, RuntimeError> {
        match stmt {
            Statement::Expression(expr) => {
                self.evaluate(expr)?;
            }
            Statement::Print { keyword, value } => {
                let value = self.evaluate(value)?;
                writeln!(self.output, "{}", value)
                    .and_then(|()| self.output.flush())
                    .map_err(|err| {
                        RuntimeError::new(keyword, format!("Could not write output: {}", err))
                    })?;
            }
            Statement::Var { name, initializer } => {
                let value = match initializer {
                    Some(x) => self.evaluate(x)?,
                    None => Value::Nil,
                };
                self.heap
                    .define(self.environment, name.lexeme.as_str(), value);
            }
            Statement::Block(statements) => {
                let environment = self.heap.new_environment(Some(self.environment));
                return self.execute_block(statements, environment);
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    return self.execute(then_branch);
                } else if let Some(x) = else_branch {
                    return self.execute(x);
                }
            }
            Statement::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    if let Flow::Return(value) = self.execute(body)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
            Statement::Function(decl) => {
                let function = self.function(decl);
                self.heap
                    .define(self.environment, decl.name(), function);
            }
            Statement::Return { value, .. } => {
                let value = match value {
                    Some(x) => self.evaluate(x)?,
                    None => Value::Nil,
                };
                return Ok(Flow::Return(value));
            }
            Statement::Class {
                name,
                superclass,
                methods,
            } => self.class_declaration(name, superclass, methods)?,
        }
        Ok(Flow::Normal)
    }
}
