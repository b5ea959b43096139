use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{parser_error, Error};
use crate::syntax::{Expr, LiteralValue, Stmt};
use crate::token::{Token, TokenType};

// Variable-referencing expressions get a process-wide monotonic id so the
// resolver side-table stays collision-free across REPL lines; a closure made
// on an earlier line keeps its entries alive.
static NEXT_EXPR_ID: AtomicUsize = AtomicUsize::new(0);

fn next_expr_id() -> usize {
    NEXT_EXPR_ID.fetch_add(1, Ordering::Relaxed)
}

pub struct Parser<'t> {
    tokens: &'t Vec<Token>,
    current: usize,
}

// Consumes the current token and yields true if it has one of the given
// types.
macro_rules! match_token {
    ( $sel:ident, $( $x:expr ),* ) => {
        {
            if $( $sel.check($x) )||* {
                $sel.advance();
                true
            } else {
                false
            }
        }
    };
}

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    // program        → declaration* EOF ;
    //
    // Never fails: every syntax error is reported to the sink and recovered
    // from, so one pass surfaces as many errors as possible. The driver
    // checks the sink's flag before running anything.
    pub fn parse(&mut self) -> Vec<Stmt> {
        let mut statements: Vec<Stmt> = Vec::new();
        while !self.is_at_end() {
            statements.push(self.declaration());
        }
        statements
    }

    // declaration    → funDecl | varDecl | statement ;
    fn declaration(&mut self) -> Stmt {
        let statement = if match_token!(self, TokenType::Fun) {
            self.function("function")
        } else if match_token!(self, TokenType::Var) {
            self.var_declaration()
        } else {
            self.statement()
        };

        // Panic-mode recovery: drop the broken statement, skip to the next
        // statement boundary, and leave a Null placeholder behind.
        match statement {
            Ok(statement) => statement,
            Err(_) => {
                self.synchronize();
                Stmt::Null
            }
        }
    }

    // funDecl        → "fun" function ;
    // function       → IDENTIFIER "(" parameters? ")" block ;
    // parameters     → IDENTIFIER ( "," IDENTIFIER )* ;
    fn function(&mut self, kind: &str) -> Result<Stmt, Error> {
        let name = self.consume(
            TokenType::Identifier,
            format!("Expect {kind} name.").as_str(),
        )?;

        self.consume(
            TokenType::LeftParen,
            format!("Expect '(' after {kind} name.").as_str(),
        )?;
        let mut params: Vec<Token> = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                if params.len() >= 255 {
                    // Reported but not thrown: the parser still knows exactly
                    // where it is in the grammar.
                    self.error(self.peek(), "Can't have more than 255 parameters.");
                }

                params.push(self.consume(TokenType::Identifier, "Expect parameter name.")?);

                if !match_token!(self, TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after parameters.")?;

        self.consume(
            TokenType::LeftBrace,
            format!("Expect '{{' before {kind} body.").as_str(),
        )?;
        let body = self.block()?;
        Ok(Stmt::Function { name, params, body })
    }

    // varDecl        → "var" IDENTIFIER ( "=" expression )? ";" ;
    fn var_declaration(&mut self) -> Result<Stmt, Error> {
        let name = self.consume(TokenType::Identifier, "Expect variable name.")?;
        let initializer = if match_token!(self, TokenType::Equal) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(
            TokenType::Semicolon,
            "Expect ';' after variable declaration.",
        )?;

        Ok(Stmt::Var { name, initializer })
    }

    // statement      → exprStmt | printStmt | block | ifStmt | whileStmt
    //                | forStmt | returnStmt ;
    fn statement(&mut self) -> Result<Stmt, Error> {
        if match_token!(self, TokenType::For) {
            self.for_statement()
        } else if match_token!(self, TokenType::If) {
            self.if_statement()
        } else if match_token!(self, TokenType::Print) {
            self.print_statement()
        } else if match_token!(self, TokenType::Return) {
            self.return_statement()
        } else if match_token!(self, TokenType::While) {
            self.while_statement()
        } else if match_token!(self, TokenType::LeftBrace) {
            Ok(Stmt::Block {
                statements: self.block()?,
            })
        } else {
            self.expression_statement()
        }
    }

    // block          → "{" declaration* "}" ;
    fn block(&mut self) -> Result<Vec<Stmt>, Error> {
        let mut statements: Vec<Stmt> = Vec::new();

        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            statements.push(self.declaration());
        }

        self.consume(TokenType::RightBrace, "Expect '}' after block.")?;
        Ok(statements)
    }

    // ifStmt         → "if" "(" expression ")" statement ( "else" statement )? ;
    // The else binds to the nearest preceding if.
    fn if_statement(&mut self) -> Result<Stmt, Error> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'if'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after if condition.")?;

        let then_branch = Box::new(self.statement()?);

        let else_branch = Box::new(if match_token!(self, TokenType::Else) {
            Some(self.statement()?)
        } else {
            None
        });

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    // whileStmt      → "while" "(" expression ")" statement ;
    fn while_statement(&mut self) -> Result<Stmt, Error> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'while'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after condition.")?;
        let body = self.statement()?;

        Ok(Stmt::While {
            condition,
            body: Box::new(body),
        })
    }

    // forStmt        → "for" "(" ( varDecl | exprStmt | ";" )
    //                  expression? ";" expression? ")" statement ;
    //
    // There is no For node: the clauses desugar into a while loop, with the
    // increment appended to a synthetic block around the body and the whole
    // thing wrapped in a block holding the initializer.
    fn for_statement(&mut self) -> Result<Stmt, Error> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'.")?;

        let initializer = if match_token!(self, TokenType::Semicolon) {
            None
        } else if match_token!(self, TokenType::Var) {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if !self.check(TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(TokenType::Semicolon, "Expect ';' after loop condition.")?;

        let increment = if !self.check(TokenType::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(TokenType::RightParen, "Expect ')' after for clauses.")?;

        let mut body = self.statement()?;

        if let Some(increment) = increment {
            body = Stmt::Block {
                statements: vec![
                    body,
                    Stmt::Expression {
                        expression: increment,
                    },
                ],
            };
        }

        body = Stmt::While {
            condition: condition.unwrap_or(Expr::Literal {
                value: LiteralValue::Boolean(true),
            }),
            body: Box::new(body),
        };

        if let Some(initializer) = initializer {
            body = Stmt::Block {
                statements: vec![initializer, body],
            };
        }

        Ok(body)
    }

    // returnStmt     → "return" expression? ";" ;
    fn return_statement(&mut self) -> Result<Stmt, Error> {
        let keyword = self.previous().clone();
        let value = if !self.check(TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(TokenType::Semicolon, "Expect ';' after return value.")?;
        Ok(Stmt::Return { keyword, value })
    }

    // printStmt      → "print" expression ";" ;
    fn print_statement(&mut self) -> Result<Stmt, Error> {
        let value = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' after value.")?;
        Ok(Stmt::Print { expression: value })
    }

    // exprStmt       → expression ";" ;
    fn expression_statement(&mut self) -> Result<Stmt, Error> {
        let value = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' after expression.")?;
        Ok(Stmt::Expression { expression: value })
    }

    // expression     → assignment ;
    fn expression(&mut self) -> Result<Expr, Error> {
        self.assignment()
    }

    // assignment     → IDENTIFIER "=" assignment | logic_or ;
    //
    // The left side is parsed as an ordinary expression first and only
    // reclassified as an assignment target when an '=' follows. Assignment is
    // right-associative, so the right side recurses instead of looping.
    fn assignment(&mut self) -> Result<Expr, Error> {
        let expr = self.logic_or()?;

        if match_token!(self, TokenType::Equal) {
            let equals = self.previous().clone();
            let value = Box::new(self.assignment()?);

            if let Expr::Variable { name, .. } = expr {
                return Ok(Expr::Assign {
                    id: next_expr_id(),
                    name,
                    value,
                });
            }

            // Not thrown: the parser is in a perfectly coherent state, the
            // left side just isn't assignable. The caller keeps the LHS.
            self.error(&equals, "Invalid assignment target.");
        }

        Ok(expr)
    }

    // logic_or       → logic_and ( "or" logic_and )* ;
    fn logic_or(&mut self) -> Result<Expr, Error> {
        let mut expr = self.logic_and()?;

        while match_token!(self, TokenType::Or) {
            let operator = self.previous().clone();
            let right = self.logic_and()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    // logic_and      → equality ( "and" equality )* ;
    fn logic_and(&mut self) -> Result<Expr, Error> {
        let mut expr = self.equality()?;

        while match_token!(self, TokenType::And) {
            let operator = self.previous().clone();
            let right = self.equality()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    // equality       → comparison ( ( "!=" | "==" ) comparison )* ;
    fn equality(&mut self) -> Result<Expr, Error> {
        let mut expr = self.comparison()?;

        while match_token!(self, TokenType::BangEqual, TokenType::EqualEqual) {
            let operator = self.previous().clone();
            let right = self.comparison()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    // comparison     → term ( ( ">" | ">=" | "<" | "<=" ) term )* ;
    fn comparison(&mut self) -> Result<Expr, Error> {
        let mut expr = self.term()?;

        while match_token!(
            self,
            TokenType::Greater,
            TokenType::GreaterEqual,
            TokenType::Less,
            TokenType::LessEqual
        ) {
            let operator = self.previous().clone();
            let right = self.term()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    // term           → factor ( ( "-" | "+" ) factor )* ;
    fn term(&mut self) -> Result<Expr, Error> {
        let mut expr = self.factor()?;

        while match_token!(self, TokenType::Minus, TokenType::Plus) {
            let operator = self.previous().clone();
            let right = self.factor()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    // factor         → unary ( ( "/" | "*" ) unary )* ;
    fn factor(&mut self) -> Result<Expr, Error> {
        let mut expr = self.unary()?;

        while match_token!(self, TokenType::Slash, TokenType::Star) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    // unary          → ( "!" | "-" ) unary | call ;
    fn unary(&mut self) -> Result<Expr, Error> {
        if match_token!(self, TokenType::Bang, TokenType::Minus) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            return Ok(Expr::Unary {
                operator,
                right: Box::new(right),
            });
        }

        self.call()
    }

    // call           → primary ( "(" arguments? ")" )* ;
    fn call(&mut self) -> Result<Expr, Error> {
        let mut expr = self.primary()?;

        while match_token!(self, TokenType::LeftParen) {
            expr = self.finish_call(expr)?;
        }

        Ok(expr)
    }

    // arguments      → expression ( "," expression )* ;
    fn finish_call(&mut self, callee: Expr) -> Result<Expr, Error> {
        let mut arguments: Vec<Expr> = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                if arguments.len() >= 255 {
                    self.error(self.peek(), "Can't have more than 255 arguments.");
                }

                arguments.push(self.expression()?);

                if !match_token!(self, TokenType::Comma) {
                    break;
                }
            }
        }

        let paren = self.consume(TokenType::RightParen, "Expect ')' after arguments.")?;

        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        })
    }

    // primary        → "false" | "true" | "nil" | NUMBER | STRING
    //                | IDENTIFIER | "(" expression ")" ;
    fn primary(&mut self) -> Result<Expr, Error> {
        let expr = match &self.peek().token_type {
            TokenType::False => Expr::Literal {
                value: LiteralValue::Boolean(false),
            },
            TokenType::True => Expr::Literal {
                value: LiteralValue::Boolean(true),
            },
            TokenType::Nil => Expr::Literal {
                value: LiteralValue::Null,
            },
            TokenType::Number { literal } => Expr::Literal {
                value: LiteralValue::Number(*literal),
            },
            TokenType::String { literal } => Expr::Literal {
                value: LiteralValue::String(literal.clone()),
            },
            TokenType::Identifier => Expr::Variable {
                id: next_expr_id(),
                name: self.peek().clone(),
            },
            TokenType::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(TokenType::RightParen, "Expect ')' after expression.")?;
                return Ok(Expr::Grouping {
                    expression: Box::new(expr),
                });
            }
            _ => return Err(self.error(self.peek(), "Expect expression.")),
        };

        self.advance();

        Ok(expr)
    }

    // After a syntax error, discard tokens until a plausible statement
    // boundary: just past a ';', or just before a keyword that starts a
    // declaration or statement.
    fn synchronize(&mut self) {
        self.advance();

        while !self.is_at_end() {
            if self.previous().token_type == TokenType::Semicolon {
                return;
            }

            match self.peek().token_type {
                TokenType::Class
                | TokenType::Fun
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return => return,
                _ => self.advance(),
            };
        }
    }

    // True if the current token has the given type; never consumes it.
    fn check(&self, token_type: TokenType) -> bool {
        if self.is_at_end() {
            return false;
        }
        self.peek().token_type == token_type
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.current)
            .expect("token stream ends in Eof")
    }

    fn previous(&self) -> &Token {
        self.tokens
            .get(self.current - 1)
            .expect("no token has been consumed yet")
    }

    fn consume(&mut self, token_type: TokenType, message: &str) -> Result<Token, Error> {
        if self.check(token_type) {
            Ok(self.advance().clone())
        } else {
            Err(self.error(self.peek(), message))
        }
    }

    fn error(&self, token: &Token, message: &str) -> Error {
        parser_error(token, message);
        Error::Parse
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast_printer::AstPrinter;
    use crate::scanner::Scanner;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Vec<Stmt> {
        let mut scanner = Scanner::new(source.to_string());
        let tokens = scanner.scan_tokens();
        Parser::new(tokens).parse()
    }

    // Parses a single expression statement and renders the expression.
    fn parse_expr(source: &str) -> String {
        let statements = parse(&format!("{source};"));
        assert_eq!(statements.len(), 1);
        match &statements[0] {
            Stmt::Expression { expression } => AstPrinter.print(expression),
            other => panic!("expected an expression statement, got {other:?}"),
        }
    }

    #[test]
    fn factor_binds_tighter_than_term() {
        assert_eq!(parse_expr("1 + 2 * 3"), "(+ 1 (* 2 3))");
    }

    #[test]
    fn binary_operators_are_left_associative() {
        assert_eq!(parse_expr("8 - 4 - 2"), "(- (- 8 4) 2)");
        assert_eq!(parse_expr("8 / 4 / 2"), "(/ (/ 8 4) 2)");
    }

    #[test]
    fn comparison_binds_tighter_than_equality() {
        assert_eq!(parse_expr("1 < 2 == true"), "(== (< 1 2) true)");
    }

    #[test]
    fn logic_or_is_looser_than_logic_and() {
        assert_eq!(parse_expr("a or b and c"), "(or a (and b c))");
    }

    #[test]
    fn assignment_is_right_associative() {
        assert_eq!(parse_expr("a = b = 1"), "(= a (= b 1))");
    }

    #[test]
    fn grouping_overrides_precedence() {
        assert_eq!(parse_expr("(1 + 2) * 3"), "(* (group (+ 1 2)) 3)");
    }

    #[test]
    fn unary_chains_nest_rightward() {
        assert_eq!(parse_expr("!!true"), "(! (! true))");
        assert_eq!(parse_expr("--1"), "(- (- 1))");
    }

    #[test]
    fn calls_chain_leftward() {
        assert_eq!(parse_expr("f(1)(2, 3)"), "(call (call f 1) 2 3)");
    }

    #[test]
    fn invalid_assignment_target_keeps_the_left_side() {
        // Reported to the sink, but the parse continues with the LHS intact.
        assert_eq!(parse_expr("1 = 2"), "1");
    }

    #[test]
    fn for_desugars_into_while() {
        let statements = parse("for (var i = 0; i < 3; i = i + 1) print i;");
        assert_eq!(statements.len(), 1);

        // { var i = 0; while (i < 3) { print i; i = i + 1; } }
        let Stmt::Block { statements } = &statements[0] else {
            panic!("expected the initializer block");
        };
        assert_eq!(statements.len(), 2);
        assert!(matches!(statements[0], Stmt::Var { .. }));

        let Stmt::While { condition, body } = &statements[1] else {
            panic!("expected the desugared while");
        };
        assert_eq!(AstPrinter.print(condition), "(< i 3)");

        let Stmt::Block { statements } = body.as_ref() else {
            panic!("expected the increment block");
        };
        assert_eq!(statements.len(), 2);
        assert!(matches!(statements[0], Stmt::Print { .. }));
        let Stmt::Expression { expression } = &statements[1] else {
            panic!("expected the increment expression statement");
        };
        assert_eq!(AstPrinter.print(expression), "(= i (+ i 1))");
    }

    #[test]
    fn for_without_condition_loops_on_true() {
        let statements = parse("for (;;) print 1;");
        let Stmt::While { condition, body } = &statements[0] else {
            panic!("expected a bare while, got {:?}", statements[0]);
        };
        assert_eq!(AstPrinter.print(condition), "true");
        assert!(matches!(body.as_ref(), Stmt::Print { .. }));
    }

    #[test]
    fn if_else_binds_to_nearest_if() {
        let statements = parse("if (a) if (b) print 1; else print 2;");
        let Stmt::If { else_branch, then_branch, .. } = &statements[0] else {
            panic!("expected an if");
        };
        assert!(else_branch.is_none());
        let Stmt::If { else_branch, .. } = then_branch.as_ref() else {
            panic!("expected a nested if");
        };
        assert!(else_branch.is_some());
    }

    #[test]
    fn return_value_is_optional() {
        let statements = parse("fun f() { return; } fun g() { return 1; }");
        let Stmt::Function { body, .. } = &statements[0] else {
            panic!("expected a function");
        };
        assert!(matches!(body[0], Stmt::Return { value: None, .. }));
        let Stmt::Function { body, .. } = &statements[1] else {
            panic!("expected a function");
        };
        assert!(matches!(body[0], Stmt::Return { value: Some(_), .. }));
    }

    #[test]
    fn syntax_error_synchronizes_to_the_next_statement() {
        // The broken declaration collapses to a Null placeholder and parsing
        // resumes at 'print'.
        let statements = parse("var = 1; print 2;");
        assert_eq!(statements.len(), 2);
        assert!(matches!(statements[0], Stmt::Null));
        assert!(matches!(statements[1], Stmt::Print { .. }));
    }

    #[test]
    fn error_inside_block_does_not_eat_the_rest_of_the_file() {
        let statements = parse("{ var 1; } print 2;");
        assert!(matches!(statements.last(), Some(Stmt::Print { .. })));
    }

    #[test]
    fn empty_program_parses_to_nothing() {
        assert!(parse("").is_empty());
    }

    #[test]
    fn printed_shape_is_stable_across_independent_parses() {
        // Expression ids differ between parses; the printed tree must not.
        let source = "(1 + 2) * -3 < x == true and done or fallback";
        assert_eq!(parse_expr(source), parse_expr(source));
    }

    #[test]
    fn variable_and_assign_ids_are_distinct() {
        let statements = parse("a = a;");
        let Stmt::Expression { expression } = &statements[0] else {
            panic!("expected an expression statement");
        };
        let Expr::Assign { id, value, .. } = expression else {
            panic!("expected an assignment");
        };
        let Expr::Variable { id: value_id, .. } = value.as_ref() else {
            panic!("expected a variable read on the right");
        };
        assert_ne!(id, value_id);
    }
}
