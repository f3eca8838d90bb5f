use crate::callable::LoxFunction;
use crate::instance::Instance;
use crate::interpreter::{Interpreter, RuntimeError};
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

/// Classes never change after declaration, so they are shared by `Rc`.
/// The superclass chain is acyclic: a class can only name one declared before it.
#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub superclass: Option<Rc<Class>>,
    pub methods: FxHashMap<String, Rc<LoxFunction>>,
}

impl Class {
    pub fn new(
        name: String,
        superclass: Option<Rc<Class>>,
        methods: FxHashMap<String, Rc<LoxFunction>>,
    ) -> Class {
        Class {
            name,
            superclass,
            methods,
        }
    }
    /// Looks in this class first, then up the superclass chain.
    pub fn find_method(&self, name: &str) -> Option<Rc<LoxFunction>> {
        let mut class = Some(self);
        while let Some(current) = class {
            if let Some(method) = current.methods.get(name) {
                return Some(method.clone());
            }
            class = current.superclass.as_deref();
        }
        None
    }
    pub fn arity(&self) -> usize {
        self.find_method("init").map_or(0, |init| init.arity())
    }
    /// Creates an instance and runs `init` on it, if any class in the chain has one.
    pub fn instantiate<W: Write>(
        self: &Rc<Self>,
        interpreter: &mut Interpreter<W>,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let instance = Instance {
            id: interpreter.heap.alloc_instance(),
            class: self.clone(),
        };
        if let Some(initializer) = self.find_method("init") {
            initializer
                .bind(instance.clone(), &mut interpreter.heap)
                .call(interpreter, arguments)?;
        }
        Ok(Value::Instance(instance))
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
