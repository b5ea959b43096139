use std::cell::RefCell;
use std::collections::HashMap;
use std::mem;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::environment::Environment;
use crate::error::Error;
use crate::function::Function;
use crate::object::Object;
use crate::syntax::{expr, stmt};
use crate::syntax::{Expr, LiteralValue, Stmt};
use crate::token::{Token, TokenType};

// Walks the statement tree against a chain of environments. `environment` is
// the innermost scope of whatever is currently executing; `globals` stays
// pinned to the outermost one so unresolved names can fall back to it.
// `locals` is the resolver's side-table: expression id to the number of
// environments between the reference and its binding.
pub struct Interpreter {
    pub globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    locals: HashMap<usize, usize>,
}

fn clock_native(_arguments: &[Object]) -> Object {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is set before the epoch");
    Object::Number(now.as_millis() as f64 / 1000.0)
}

impl Interpreter {
    pub fn new() -> Self {
        let globals = Rc::new(RefCell::new(Environment::new()));
        globals.borrow_mut().define(
            "clock".to_string(),
            Object::Callable(Function::Native {
                arity: 0,
                body: clock_native,
            }),
        );

        Interpreter {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
        }
    }

    // Runs a program. Runtime errors (and a Return that somehow escaped the
    // resolver) surface as Err; the driver reports them.
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<(), Error> {
        for statement in statements {
            self.execute(statement)?;
        }
        Ok(())
    }

    // Called by the resolver as it walks the tree.
    pub fn resolve(&mut self, expr_id: usize, depth: usize) {
        self.locals.insert(expr_id, depth);
    }

    #[cfg(test)]
    pub fn locals(&self) -> &HashMap<usize, usize> {
        &self.locals
    }

    fn execute(&mut self, statement: &Stmt) -> Result<(), Error> {
        statement.accept(self)
    }

    fn evaluate(&mut self, expression: &Expr) -> Result<Object, Error> {
        expression.accept(self)
    }

    // Runs the statements with `environment` as the innermost scope. The
    // previous scope pointer must be restored on every exit path: normal
    // completion, runtime error, or a Return unwinding through.
    pub fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Rc<RefCell<Environment>>,
    ) -> Result<(), Error> {
        let previous = mem::replace(&mut self.environment, environment);

        let mut result = Ok(());
        for statement in statements {
            result = self.execute(statement);
            if result.is_err() {
                break;
            }
        }

        self.environment = previous;
        result
    }

    // Resolved references jump straight to their scope; everything else is a
    // global.
    fn look_up_variable(&self, expr_id: usize, name: &Token) -> Result<Object, Error> {
        if let Some(&distance) = self.locals.get(&expr_id) {
            self.environment.borrow().get_at(distance, name)
        } else {
            self.globals.borrow().get(name)
        }
    }

    fn stringify(&self, object: &Object) -> String {
        match object {
            Object::Boolean(b) => b.to_string(),
            Object::Callable(function) => function.to_string(),
            Object::Null => "nil".to_string(),
            // f64's Display already drops the ".0" of whole-valued floats.
            Object::Number(n) => n.to_string(),
            Object::String(s) => s.clone(),
        }
    }

    // nil and false are falsy; every other value, zero and the empty string
    // included, is truthy.
    fn is_truthy(&self, object: &Object) -> bool {
        match object {
            Object::Null => false,
            Object::Boolean(b) => *b,
            _ => true,
        }
    }

    fn is_equal(&self, left: &Object, right: &Object) -> bool {
        left.equals(right)
    }

    fn number_operand_error<R>(&self, operator: &Token) -> Result<R, Error> {
        Err(Error::Runtime {
            token: operator.clone(),
            message: "Operand must be a number".to_string(),
        })
    }
}

impl expr::Visitor<Object> for Interpreter {
    fn visit_assign_expr(&mut self, id: usize, name: &Token, value: &Expr) -> Result<Object, Error> {
        let value = self.evaluate(value)?;

        if let Some(&distance) = self.locals.get(&id) {
            self.environment
                .borrow_mut()
                .assign_at(distance, name, value.clone())?;
        } else {
            self.globals.borrow_mut().assign(name, value.clone())?;
        }

        // Assignment is an expression; it yields the assigned value.
        Ok(value)
    }

    fn visit_binary_expr(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<Object, Error> {
        let left = self.evaluate(left)?;
        let right = self.evaluate(right)?;

        match operator.token_type {
            TokenType::Minus => match (left, right) {
                (Object::Number(left), Object::Number(right)) => Ok(Object::Number(left - right)),
                _ => self.number_operand_error(operator),
            },
            TokenType::Slash => match (left, right) {
                (Object::Number(left), Object::Number(right)) => {
                    if right == 0.0 {
                        Err(Error::Runtime {
                            token: operator.clone(),
                            message: "divide by zero".to_string(),
                        })
                    } else {
                        Ok(Object::Number(left / right))
                    }
                }
                _ => self.number_operand_error(operator),
            },
            TokenType::Star => match (left, right) {
                (Object::Number(left), Object::Number(right)) => Ok(Object::Number(left * right)),
                _ => self.number_operand_error(operator),
            },
            // Plus works for two numbers and for two strings; nothing is
            // coerced.
            TokenType::Plus => match (left, right) {
                (Object::Number(left), Object::Number(right)) => Ok(Object::Number(left + right)),
                (Object::String(left), Object::String(right)) => {
                    Ok(Object::String(left + &right))
                }
                _ => Err(Error::Runtime {
                    token: operator.clone(),
                    message: "Operands must be two numbers or two strings".to_string(),
                }),
            },
            TokenType::Greater => match (left, right) {
                (Object::Number(left), Object::Number(right)) => Ok(Object::Boolean(left > right)),
                _ => self.number_operand_error(operator),
            },
            TokenType::GreaterEqual => match (left, right) {
                (Object::Number(left), Object::Number(right)) => Ok(Object::Boolean(left >= right)),
                _ => self.number_operand_error(operator),
            },
            TokenType::Less => match (left, right) {
                (Object::Number(left), Object::Number(right)) => Ok(Object::Boolean(left < right)),
                _ => self.number_operand_error(operator),
            },
            TokenType::LessEqual => match (left, right) {
                (Object::Number(left), Object::Number(right)) => Ok(Object::Boolean(left <= right)),
                _ => self.number_operand_error(operator),
            },
            TokenType::BangEqual => Ok(Object::Boolean(!self.is_equal(&left, &right))),
            TokenType::EqualEqual => Ok(Object::Boolean(self.is_equal(&left, &right))),
            _ => unreachable!("parser only builds binary nodes for binary operators"),
        }
    }

    fn visit_call_expr(
        &mut self,
        callee: &Expr,
        paren: &Token,
        arguments: &[Expr],
    ) -> Result<Object, Error> {
        let callee = self.evaluate(callee)?;

        let mut evaluated = Vec::with_capacity(arguments.len());
        for argument in arguments {
            evaluated.push(self.evaluate(argument)?);
        }

        let Object::Callable(function) = callee else {
            return Err(Error::Runtime {
                token: paren.clone(),
                message: "Can only call functions and classes.".to_string(),
            });
        };

        if evaluated.len() != function.arity() {
            return Err(Error::Runtime {
                token: paren.clone(),
                message: format!(
                    "Expected {} arguments but got {}.",
                    function.arity(),
                    evaluated.len()
                ),
            });
        }

        function.call(self, &evaluated)
    }

    fn visit_grouping_expr(&mut self, expression: &Expr) -> Result<Object, Error> {
        self.evaluate(expression)
    }

    fn visit_literal_expr(&mut self, value: &LiteralValue) -> Result<Object, Error> {
        Ok(match value {
            LiteralValue::Boolean(b) => Object::Boolean(*b),
            LiteralValue::Null => Object::Null,
            LiteralValue::Number(n) => Object::Number(*n),
            LiteralValue::String(s) => Object::String(s.clone()),
        })
    }

    // Short-circuit: the right side only runs when the left side does not
    // already decide, and the result is whichever operand decided - not a
    // coerced boolean.
    fn visit_logical_expr(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<Object, Error> {
        let left = self.evaluate(left)?;

        if operator.token_type == TokenType::Or {
            if self.is_truthy(&left) {
                return Ok(left);
            }
        } else if !self.is_truthy(&left) {
            return Ok(left);
        }

        self.evaluate(right)
    }

    fn visit_unary_expr(&mut self, operator: &Token, right: &Expr) -> Result<Object, Error> {
        let right = self.evaluate(right)?;

        match operator.token_type {
            TokenType::Minus => match right {
                Object::Number(n) => Ok(Object::Number(-n)),
                _ => self.number_operand_error(operator),
            },
            TokenType::Bang => Ok(Object::Boolean(!self.is_truthy(&right))),
            _ => unreachable!("parser only builds unary nodes for ! and -"),
        }
    }

    fn visit_variable_expr(&mut self, id: usize, name: &Token) -> Result<Object, Error> {
        self.look_up_variable(id, name)
    }
}

impl stmt::Visitor<()> for Interpreter {
    fn visit_block_stmt(&mut self, statements: &[Stmt]) -> Result<(), Error> {
        let environment = Rc::new(RefCell::new(Environment::from(&self.environment)));
        self.execute_block(statements, environment)
    }

    fn visit_expression_stmt(&mut self, expression: &Expr) -> Result<(), Error> {
        self.evaluate(expression)?;
        Ok(())
    }

    // Declaring a function does not touch its body; it just packages the
    // declaration with the environment current right now. That environment,
    // not the future caller's, is what the body will close over.
    fn visit_function_stmt(
        &mut self,
        name: &Token,
        params: &[Token],
        body: &[Stmt],
    ) -> Result<(), Error> {
        let function = Function::User {
            name: name.clone(),
            params: params.to_vec(),
            body: body.to_vec(),
            closure: Rc::clone(&self.environment),
        };
        self.environment
            .borrow_mut()
            .define(name.lexeme.clone(), Object::Callable(function));
        Ok(())
    }

    fn visit_if_stmt(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: &Option<Stmt>,
    ) -> Result<(), Error> {
        let condition = self.evaluate(condition)?;
        if self.is_truthy(&condition) {
            self.execute(then_branch)
        } else if let Some(else_branch) = else_branch {
            self.execute(else_branch)
        } else {
            Ok(())
        }
    }

    fn visit_null_stmt(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn visit_print_stmt(&mut self, expression: &Expr) -> Result<(), Error> {
        let value = self.evaluate(expression)?;
        println!("{}", self.stringify(&value));
        Ok(())
    }

    // Return rides the error channel so it unwinds through any nesting; the
    // call boundary in Function::call is the only catch site.
    fn visit_return_stmt(&mut self, _keyword: &Token, value: &Option<Expr>) -> Result<(), Error> {
        let value = match value {
            Some(value) => self.evaluate(value)?,
            None => Object::Null,
        };
        Err(Error::Return { value })
    }

    fn visit_var_stmt(&mut self, name: &Token, initializer: &Option<Expr>) -> Result<(), Error> {
        let value = match initializer {
            Some(initializer) => self.evaluate(initializer)?,
            None => Object::Null,
        };
        self.environment
            .borrow_mut()
            .define(name.lexeme.clone(), value);
        Ok(())
    }

    fn visit_while_stmt(&mut self, condition: &Expr, body: &Stmt) -> Result<(), Error> {
        loop {
            let condition = self.evaluate(condition)?;
            if !self.is_truthy(&condition) {
                return Ok(());
            }
            self.execute(body)?;
        }
    }
}
