use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::Error;
use crate::object::Object;
use crate::token::Token;

// One lexical scope: a name-to-value map plus a parent pointer. Scopes are
// reference counted because closures keep their defining environment alive
// after the block that created it has exited, so the chain is a DAG rather
// than a stack.
pub struct Environment {
    values: HashMap<String, Object>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    pub fn from(enclosing: &Rc<RefCell<Environment>>) -> Self {
        Self {
            values: HashMap::new(),
            enclosing: Some(Rc::clone(enclosing)),
        }
    }

    // Unconditional insert: shadowing an outer binding is legal, and the
    // resolver statically rejects redeclaration within one local scope.
    pub fn define(&mut self, name: String, value: Object) {
        self.values.insert(name, value);
    }

    pub fn get(&self, name: &Token) -> Result<Object, Error> {
        if let Some(value) = self.values.get(&*name.lexeme) {
            Ok(value.clone())
        } else if let Some(ref enclosing) = self.enclosing {
            enclosing.borrow().get(name)
        } else {
            Err(Self::undefined(name))
        }
    }

    // Assignment never creates a binding; it rebinds the innermost existing
    // one or fails.
    pub fn assign(&mut self, name: &Token, value: Object) -> Result<(), Error> {
        if self.values.contains_key(&*name.lexeme) {
            self.values.insert(name.lexeme.clone(), value);
            Ok(())
        } else if let Some(ref enclosing) = self.enclosing {
            enclosing.borrow_mut().assign(name, value)
        } else {
            Err(Self::undefined(name))
        }
    }

    // The resolver has already computed how many scopes up the binding lives,
    // so these jump there directly instead of searching the chain.
    pub fn get_at(&self, distance: usize, name: &Token) -> Result<Object, Error> {
        if distance == 0 {
            return self.values.get(&*name.lexeme).cloned().ok_or_else(|| Self::undefined(name));
        }
        let ancestor = self.ancestor(distance);
        let value = ancestor
            .borrow()
            .values
            .get(&*name.lexeme)
            .cloned()
            .ok_or_else(|| Self::undefined(name));
        value
    }

    pub fn assign_at(&mut self, distance: usize, name: &Token, value: Object) -> Result<(), Error> {
        if distance == 0 {
            if self.values.contains_key(&*name.lexeme) {
                self.values.insert(name.lexeme.clone(), value);
                return Ok(());
            }
            return Err(Self::undefined(name));
        }
        let ancestor = self.ancestor(distance);
        let mut environment = ancestor.borrow_mut();
        if environment.values.contains_key(&*name.lexeme) {
            environment.values.insert(name.lexeme.clone(), value);
            Ok(())
        } else {
            Err(Self::undefined(name))
        }
    }

    // distance must be >= 1 and within the chain; the resolver guarantees
    // both, since it only records depths for scopes it has seen enclosing the
    // reference.
    fn ancestor(&self, distance: usize) -> Rc<RefCell<Environment>> {
        let mut environment = Rc::clone(
            self.enclosing
                .as_ref()
                .expect("resolved depth points past the environment chain"),
        );
        for _ in 1..distance {
            let enclosing = Rc::clone(
                environment
                    .borrow()
                    .enclosing
                    .as_ref()
                    .expect("resolved depth points past the environment chain"),
            );
            environment = enclosing;
        }
        environment
    }

    fn undefined(name: &Token) -> Error {
        Error::Runtime {
            token: name.clone(),
            message: format!("Undefined variable '{}'.", name.lexeme),
        }
    }
}
