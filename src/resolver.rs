use std::collections::HashMap;
use std::mem;

use crate::error::{parser_error, Error};
use crate::interpreter::Interpreter;
use crate::syntax::{expr, stmt};
use crate::syntax::{Expr, LiteralValue, Stmt};
use crate::token::Token;

// Tracks whether the code being visited sits inside a function declaration,
// so a stray top-level return can be rejected statically.
#[derive(Clone)]
enum FunctionType {
    None,
    Function,
}

// A single static pass between parsing and execution. For every variable
// read or assignment it finds the scope holding the binding and tells the
// interpreter how many environments up the chain that is. Only local block
// scopes live on the stack: top-level bindings are dynamic, so a name missing
// from every scope is assumed global and left out of the side-table.
//
// Each scope maps a name to "has its initializer finished resolving" - the
// false window is what catches `var a = a;`.
pub struct Resolver<'i> {
    interpreter: &'i mut Interpreter,
    scopes: Vec<HashMap<String, bool>>,
    current_function: FunctionType,
    pub had_error: bool,
}

impl<'i> Resolver<'i> {
    pub fn new(interpreter: &'i mut Interpreter) -> Self {
        Resolver {
            interpreter,
            scopes: Vec::new(),
            current_function: FunctionType::None,
            had_error: false,
        }
    }

    pub fn resolve_stmts(&mut self, statements: &[Stmt]) {
        for statement in statements {
            self.resolve_stmt(statement);
        }
    }

    fn resolve_stmt(&mut self, statement: &Stmt) {
        let _ = statement.accept(self);
    }

    fn resolve_expr(&mut self, expression: &Expr) {
        let _ = expression.accept(self);
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    // Declaring marks the name as existing-but-not-ready in the innermost
    // scope; defining flips it to ready once the initializer has resolved.
    fn declare(&mut self, name: &Token) {
        if self.scopes.is_empty() {
            return;
        }
        if self.scopes.last().is_some_and(|scope| scope.contains_key(&name.lexeme)) {
            self.error(name, "Already a variable with this name in this scope.");
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), false);
        }
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }

    // Innermost scope outward: the first scope containing the name wins, and
    // its distance from the top of the stack is what the interpreter will
    // walk at runtime.
    fn resolve_local(&mut self, id: usize, name: &Token) {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(&name.lexeme) {
                self.interpreter.resolve(id, depth);
                return;
            }
        }
    }

    // Unlike execution, resolution enters a function body eagerly, right at
    // the declaration.
    fn resolve_function(&mut self, params: &[Token], body: &[Stmt], function_type: FunctionType) {
        let enclosing_function = mem::replace(&mut self.current_function, function_type);
        self.begin_scope();
        for param in params {
            self.declare(param);
            self.define(param);
        }
        self.resolve_stmts(body);
        self.end_scope();
        self.current_function = enclosing_function;
    }

    fn error(&mut self, token: &Token, message: &str) {
        parser_error(token, message);
        self.had_error = true;
    }
}

impl<'i> expr::Visitor<()> for Resolver<'i> {
    fn visit_assign_expr(&mut self, id: usize, name: &Token, value: &Expr) -> Result<(), Error> {
        // The assigned value may itself reference variables, so it resolves
        // first.
        self.resolve_expr(value);
        self.resolve_local(id, name);
        Ok(())
    }

    fn visit_binary_expr(
        &mut self,
        left: &Expr,
        _operator: &Token,
        right: &Expr,
    ) -> Result<(), Error> {
        self.resolve_expr(left);
        self.resolve_expr(right);
        Ok(())
    }

    fn visit_call_expr(
        &mut self,
        callee: &Expr,
        _paren: &Token,
        arguments: &[Expr],
    ) -> Result<(), Error> {
        self.resolve_expr(callee);
        for argument in arguments {
            self.resolve_expr(argument);
        }
        Ok(())
    }

    fn visit_grouping_expr(&mut self, expression: &Expr) -> Result<(), Error> {
        self.resolve_expr(expression);
        Ok(())
    }

    fn visit_literal_expr(&mut self, _value: &LiteralValue) -> Result<(), Error> {
        Ok(())
    }

    // Static analysis does no short-circuiting; both sides resolve.
    fn visit_logical_expr(
        &mut self,
        left: &Expr,
        _operator: &Token,
        right: &Expr,
    ) -> Result<(), Error> {
        self.resolve_expr(left);
        self.resolve_expr(right);
        Ok(())
    }

    fn visit_unary_expr(&mut self, _operator: &Token, right: &Expr) -> Result<(), Error> {
        self.resolve_expr(right);
        Ok(())
    }

    fn visit_variable_expr(&mut self, id: usize, name: &Token) -> Result<(), Error> {
        // Declared but not yet defined means the variable is being read
        // inside its own initializer.
        if let Some(scope) = self.scopes.last() {
            if scope.get(&name.lexeme) == Some(&false) {
                self.error(name, "Can't read local variable in its own initializer.");
            }
        }
        self.resolve_local(id, name);
        Ok(())
    }
}

impl<'i> stmt::Visitor<()> for Resolver<'i> {
    fn visit_block_stmt(&mut self, statements: &[Stmt]) -> Result<(), Error> {
        self.begin_scope();
        self.resolve_stmts(statements);
        self.end_scope();
        Ok(())
    }

    fn visit_expression_stmt(&mut self, expression: &Expr) -> Result<(), Error> {
        self.resolve_expr(expression);
        Ok(())
    }

    // The name is defined eagerly, before the body resolves, so the function
    // can recursively refer to itself.
    fn visit_function_stmt(
        &mut self,
        name: &Token,
        params: &[Token],
        body: &[Stmt],
    ) -> Result<(), Error> {
        self.declare(name);
        self.define(name);

        self.resolve_function(params, body, FunctionType::Function);
        Ok(())
    }

    fn visit_if_stmt(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: &Option<Stmt>,
    ) -> Result<(), Error> {
        self.resolve_expr(condition);
        self.resolve_stmt(then_branch);
        if let Some(else_branch) = else_branch {
            self.resolve_stmt(else_branch);
        }
        Ok(())
    }

    fn visit_null_stmt(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn visit_print_stmt(&mut self, expression: &Expr) -> Result<(), Error> {
        self.resolve_expr(expression);
        Ok(())
    }

    fn visit_return_stmt(&mut self, keyword: &Token, value: &Option<Expr>) -> Result<(), Error> {
        if let FunctionType::None = self.current_function {
            self.error(keyword, "Cannot return from top-level code.");
        }

        if let Some(value) = value {
            self.resolve_expr(value);
        }
        Ok(())
    }

    // Declaring and defining are split so that the initializer resolves while
    // the new name exists but is unreadable.
    fn visit_var_stmt(&mut self, name: &Token, initializer: &Option<Expr>) -> Result<(), Error> {
        self.declare(name);
        if let Some(initializer) = initializer {
            self.resolve_expr(initializer);
        }
        self.define(name);
        Ok(())
    }

    // The body resolves exactly once, not per iteration.
    fn visit_while_stmt(&mut self, condition: &Expr, body: &Stmt) -> Result<(), Error> {
        self.resolve_expr(condition);
        self.resolve_stmt(body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::scanner::Scanner;
    use pretty_assertions::assert_eq;

    // Resolves a program and hands back the interpreter whose side-table was
    // populated, plus whether any static error was reported.
    fn resolve(source: &str) -> (Interpreter, bool) {
        let mut scanner = Scanner::new(source.to_string());
        let tokens = scanner.scan_tokens();
        let statements = Parser::new(tokens).parse();

        let mut interpreter = Interpreter::new();
        let mut resolver = Resolver::new(&mut interpreter);
        resolver.resolve_stmts(&statements);
        let had_error = resolver.had_error;
        (interpreter, had_error)
    }

    fn depths(interpreter: &Interpreter) -> Vec<usize> {
        let mut depths: Vec<usize> = interpreter.locals().values().copied().collect();
        depths.sort_unstable();
        depths
    }

    #[test]
    fn globals_stay_out_of_the_side_table() {
        let (interpreter, had_error) = resolve("var a = 1; print a;");
        assert!(!had_error);
        assert!(interpreter.locals().is_empty());
    }

    #[test]
    fn local_read_in_the_same_scope_resolves_to_depth_zero() {
        let (interpreter, had_error) = resolve("{ var a = 1; print a; }");
        assert!(!had_error);
        assert_eq!(depths(&interpreter), vec![0]);
    }

    #[test]
    fn nested_block_adds_one_hop() {
        let (interpreter, had_error) = resolve("{ var a = 1; { print a; } }");
        assert!(!had_error);
        assert_eq!(depths(&interpreter), vec![1]);
    }

    #[test]
    fn parameters_resolve_inside_the_function_scope() {
        let (interpreter, had_error) = resolve("fun f(a) { print a; }");
        assert!(!had_error);
        assert_eq!(depths(&interpreter), vec![0]);
    }

    #[test]
    fn closure_reads_skip_the_function_scope() {
        // `a` lives two scopes above the body of `inner`: inner's own scope,
        // then outer's.
        let (interpreter, had_error) = resolve("fun outer() { var a = 1; fun inner() { print a; } }");
        assert!(!had_error);
        assert_eq!(depths(&interpreter), vec![1]);
    }

    #[test]
    fn assignment_targets_are_resolved_too() {
        let (interpreter, had_error) = resolve("{ var a = 1; { a = 2; } }");
        assert!(!had_error);
        assert_eq!(depths(&interpreter), vec![1]);
    }

    #[test]
    fn shadowing_resolves_to_the_nearest_binding() {
        let (interpreter, had_error) = resolve("{ var a = 1; { var a = 2; print a; } }");
        assert!(!had_error);
        // The print sees the inner a at depth 0; nothing reaches the outer.
        assert_eq!(depths(&interpreter), vec![0]);
    }

    #[test]
    fn reading_a_local_in_its_own_initializer_is_an_error() {
        let (_, had_error) = resolve("{ var a = 1; { var a = a; } }");
        assert!(had_error);
    }

    #[test]
    fn global_initializer_may_reference_the_outer_binding() {
        // At top level the scope stack is empty, so the two-phase check does
        // not apply.
        let (_, had_error) = resolve("var a = 1; var a = a;");
        assert!(!had_error);
    }

    #[test]
    fn redeclaring_in_the_same_local_scope_is_an_error() {
        let (_, had_error) = resolve("{ var a = 1; var a = 2; }");
        assert!(had_error);
    }

    #[test]
    fn duplicate_parameters_are_an_error() {
        let (_, had_error) = resolve("fun f(a, a) { print a; }");
        assert!(had_error);
    }

    #[test]
    fn top_level_return_is_an_error() {
        let (_, had_error) = resolve("return 1;");
        assert!(had_error);
    }

    #[test]
    fn return_inside_a_nested_function_is_fine() {
        let (_, had_error) = resolve("fun f() { fun g() { return 1; } return 2; }");
        assert!(!had_error);
    }

    #[test]
    fn function_may_reference_itself() {
        let (interpreter, had_error) = resolve("fun f() { fun g() { g(); } }");
        assert!(!had_error);
        // g resolves to the enclosing function scope of f's body.
        assert_eq!(depths(&interpreter), vec![1]);
    }
}
