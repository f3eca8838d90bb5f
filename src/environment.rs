use crate::heap::{EnvRef, Heap};
use crate::interpreter::RuntimeError;
use crate::token::Token;
use crate::value::Value;
use rustc_hash::FxHashMap;

/// One scope's bindings plus a link to the scope it is nested in.
#[derive(Debug, Default)]
pub struct Environment {
    values: FxHashMap<String, Value>,
    enclosing: Option<EnvRef>,
}

impl Environment {
    pub fn new(enclosing: Option<EnvRef>) -> Environment {
        Environment {
            values: FxHashMap::default(),
            enclosing,
        }
    }
    pub fn enclosing(&self) -> Option<EnvRef> {
        self.enclosing
    }
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.values()
    }
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

fn undefined(name: &Token) -> RuntimeError {
    RuntimeError::new(name, format!("Undefined variable '{}'.", name.lexeme))
}

impl Heap {
    pub fn new_environment(&mut self, enclosing: Option<EnvRef>) -> EnvRef {
        self.alloc_environment(Environment::new(enclosing))
    }
    /// Binds `name` in `env`, replacing any existing binding of that name.
    pub fn define(&mut self, env: EnvRef, name: impl Into<String>, value: Value) {
        self[env].values.insert(name.into(), value);
    }
    /// Looks `name` up through the whole chain, innermost scope first.
    pub fn get(&self, env: EnvRef, name: &Token) -> Result<Value, RuntimeError> {
        let mut current = Some(env);
        while let Some(r) = current {
            if let Some(value) = self[r].values.get(&name.lexeme) {
                return Ok(value.clone());
            }
            current = self[r].enclosing;
        }
        Err(undefined(name))
    }
    /// Rebinds the innermost existing `name`. Assignment never creates a binding.
    pub fn assign(&mut self, env: EnvRef, name: &Token, value: Value) -> Result<(), RuntimeError> {
        let mut current = Some(env);
        while let Some(r) = current {
            if let Some(slot) = self[r].values.get_mut(&name.lexeme) {
                *slot = value;
                return Ok(());
            }
            current = self[r].enclosing;
        }
        Err(undefined(name))
    }
    /// The scope `distance` links out from `env`. Stops at the outermost scope.
    pub fn ancestor(&self, env: EnvRef, distance: usize) -> EnvRef {
        let mut current = env;
        for _ in 0..distance {
            match self[current].enclosing {
                Some(enclosing) => current = enclosing,
                None => break,
            }
        }
        current
    }
    pub fn get_at(&self, env: EnvRef, distance: usize, name: &Token) -> Result<Value, RuntimeError> {
        self.get_name_at(env, distance, &name.lexeme)
            .ok_or_else(|| undefined(name))
    }
    /// Like `get_at` for the implicit `this` and `super` bindings.
    pub fn get_name_at(&self, env: EnvRef, distance: usize, name: &str) -> Option<Value> {
        let target = self.ancestor(env, distance);
        self[target].values.get(name).cloned()
    }
    pub fn assign_at(
        &mut self,
        env: EnvRef,
        distance: usize,
        name: &Token,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let target = self.ancestor(env, distance);
        match self[target].values.get_mut(&name.lexeme) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(undefined(name)),
        }
    }
}

#[cfg(test)]
mod environment_tests {
    use crate::config::Config;
    use crate::heap::Heap;
    use crate::token::{Token, TokenType};
    use crate::value::Value;

    fn name(x: &str) -> Token {
        Token::new(TokenType::Identifier(x.to_string()), x, 1)
    }

    fn number(value: Result<Value, crate::interpreter::RuntimeError>) -> f64 {
        match value {
            Ok(Value::Number(x)) => x,
            other => panic!("expected a number, got {:?}", other),
        }
    }

    #[test]
    fn lookup_walks_enclosing_scopes() {
        let mut heap = Heap::new(&Config::default());
        let globals = heap.new_environment(None);
        let inner = heap.new_environment(Some(globals));
        heap.define(globals, "a", Value::Number(1.0));
        assert_eq!(number(heap.get(inner, &name("a"))), 1.0);
        heap.define(inner, "a", Value::Number(2.0));
        assert_eq!(number(heap.get(inner, &name("a"))), 2.0);
        assert_eq!(number(heap.get(globals, &name("a"))), 1.0);
    }

    #[test]
    fn assign_updates_innermost_binding() {
        let mut heap = Heap::new(&Config::default());
        let globals = heap.new_environment(None);
        let inner = heap.new_environment(Some(globals));
        heap.define(globals, "a", Value::Number(1.0));
        assert!(heap.assign(inner, &name("a"), Value::Number(3.0)).is_ok());
        assert_eq!(number(heap.get(globals, &name("a"))), 3.0);
    }

    #[test]
    fn undefined_variable() {
        let mut heap = Heap::new(&Config::default());
        let globals = heap.new_environment(None);
        let err = heap.get(globals, &name("nope")).unwrap_err();
        assert_eq!(err.message, "Undefined variable 'nope'.");
        let err = heap
            .assign(globals, &name("nope"), Value::Nil)
            .unwrap_err();
        assert_eq!(err.message, "Undefined variable 'nope'.");
    }

    #[test]
    fn resolved_access_uses_exact_distance() {
        let mut heap = Heap::new(&Config::default());
        let outer = heap.new_environment(None);
        let middle = heap.new_environment(Some(outer));
        let inner = heap.new_environment(Some(middle));
        heap.define(outer, "x", Value::Number(1.0));
        heap.define(inner, "x", Value::Number(3.0));
        assert_eq!(heap.ancestor(inner, 2), outer);
        assert_eq!(number(heap.get_at(inner, 2, &name("x"))), 1.0);
        assert_eq!(number(heap.get_at(inner, 0, &name("x"))), 3.0);
        assert!(heap.get_at(inner, 1, &name("x")).is_err());
        assert!(heap
            .assign_at(inner, 2, &name("x"), Value::Number(5.0))
            .is_ok());
        assert_eq!(number(heap.get(outer, &name("x"))), 5.0);
    }
}
