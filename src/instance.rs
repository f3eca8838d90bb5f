use crate::class::Class;
use crate::heap::{Heap, InstanceRef};
use crate::interpreter::RuntimeError;
use crate::token::Token;
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

/// A handle to an object. Its fields live in the heap so that they can
/// refer back to the instance without keeping it alive forever.
#[derive(Clone, Debug)]
pub struct Instance {
    pub id: InstanceRef,
    pub class: Rc<Class>,
}

impl Instance {
    /// Fields shadow methods. Methods come back bound to this instance.
    pub fn get(&self, name: &Token, heap: &mut Heap) -> Result<Value, RuntimeError> {
        if let Some(value) = heap[self.id].get(&name.lexeme) {
            return Ok(value.clone());
        }
        match self.class.find_method(&name.lexeme) {
            Some(method) => Ok(Value::Function(Rc::new(method.bind(self.clone(), heap)))),
            None => Err(RuntimeError::new(
                name,
                format!("Undefined property '{}'.", name.lexeme),
            )),
        }
    }
    pub fn set(&self, name: &Token, value: Value, heap: &mut Heap) {
        heap[self.id].insert(name.lexeme.clone(), value);
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} instance", self.class.name)
    }
}
