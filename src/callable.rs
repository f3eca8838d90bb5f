use crate::ast::FunctionDecl;
use crate::heap::{EnvRef, Heap};
use crate::instance::Instance;
use crate::interpreter::{Flow, Interpreter, RuntimeError};
use crate::value::Value;
use std::fmt;
use std::io::Write;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A user-defined function or method together with the scope it closes over.
#[derive(Debug)]
pub struct LoxFunction {
    pub declaration: Rc<FunctionDecl>,
    pub closure: EnvRef,
    pub is_initializer: bool,
}

impl LoxFunction {
    pub fn new(declaration: Rc<FunctionDecl>, closure: EnvRef, is_initializer: bool) -> LoxFunction {
        LoxFunction {
            declaration,
            closure,
            is_initializer,
        }
    }
    pub fn arity(&self) -> usize {
        self.declaration.params.len()
    }
    /// A copy of this method whose closure binds `this` to `instance`.
    pub fn bind(&self, instance: Instance, heap: &mut Heap) -> LoxFunction {
        let environment = heap.new_environment(Some(self.closure));
        heap.define(environment, "this", Value::Instance(instance));
        LoxFunction::new(self.declaration.clone(), environment, self.is_initializer)
    }
    pub fn call<W: Write>(
        &self,
        interpreter: &mut Interpreter<W>,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let environment = interpreter.heap.new_environment(Some(self.closure));
        for (param, argument) in self.declaration.params.iter().zip(arguments) {
            interpreter
                .heap
                .define(environment, param.lexeme.as_str(), argument);
        }
        let flow = interpreter.execute_block(&self.declaration.body, environment)?;
        if self.is_initializer {
            return Ok(interpreter
                .heap
                .get_name_at(self.closure, 0, "this")
                .unwrap_or(Value::Nil));
        }
        match flow {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Nil),
        }
    }
}

impl fmt::Display for LoxFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.declaration.name {
            Some(name) => write!(f, "<fn {}>", name.lexeme),
            None => write!(f, "<fn>"),
        }
    }
}

#[derive(Debug)]
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub function: fn(&[Value]) -> Value,
}

impl fmt::Display for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn>")
    }
}

/// Seconds since the Unix epoch, with sub-second precision.
fn clock(_arguments: &[Value]) -> Value {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Value::Number(seconds)
}

/// Functions predefined in every global scope.
pub fn natives() -> Vec<NativeFunction> {
    vec![NativeFunction {
        name: "clock",
        arity: 0,
        function: clock,
    }]
}
