use crate::error::Error;
use crate::syntax::{expr, Expr, LiteralValue};
use crate::token::Token;

// Renders an expression tree as a parenthesized prefix string, e.g.
// "(* (- 123) (group 45.67))". Debugging aid only; nothing in the pipeline
// depends on it.
pub struct AstPrinter;

impl AstPrinter {
    pub fn print(&mut self, expr: &Expr) -> String {
        expr.accept(self).expect("printing an expression cannot fail")
    }

    fn parenthesize(&mut self, name: &str, exprs: &[&Expr]) -> String {
        let mut builder = String::new();

        builder.push('(');
        builder.push_str(name);
        for expr in exprs {
            builder.push(' ');
            builder.push_str(&self.print(expr));
        }
        builder.push(')');

        builder
    }
}

impl expr::Visitor<String> for AstPrinter {
    fn visit_assign_expr(
        &mut self,
        _id: usize,
        name: &Token,
        value: &Expr,
    ) -> Result<String, Error> {
        Ok(self.parenthesize(&format!("= {}", name.lexeme), &[value]))
    }

    fn visit_binary_expr(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<String, Error> {
        Ok(self.parenthesize(&operator.lexeme, &[left, right]))
    }

    fn visit_call_expr(
        &mut self,
        callee: &Expr,
        _paren: &Token,
        arguments: &[Expr],
    ) -> Result<String, Error> {
        let mut exprs = vec![callee];
        exprs.extend(arguments.iter());
        Ok(self.parenthesize("call", &exprs))
    }

    fn visit_grouping_expr(&mut self, expression: &Expr) -> Result<String, Error> {
        Ok(self.parenthesize("group", &[expression]))
    }

    fn visit_literal_expr(&mut self, value: &LiteralValue) -> Result<String, Error> {
        Ok(match value {
            LiteralValue::Boolean(b) => b.to_string(),
            LiteralValue::Null => "nil".to_string(),
            LiteralValue::Number(n) => n.to_string(),
            LiteralValue::String(s) => s.clone(),
        })
    }

    fn visit_logical_expr(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<String, Error> {
        Ok(self.parenthesize(&operator.lexeme, &[left, right]))
    }

    fn visit_unary_expr(&mut self, operator: &Token, right: &Expr) -> Result<String, Error> {
        Ok(self.parenthesize(&operator.lexeme, &[right]))
    }

    fn visit_variable_expr(&mut self, _id: usize, name: &Token) -> Result<String, Error> {
        Ok(name.lexeme.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;
    use pretty_assertions::assert_eq;

    #[test]
    fn prints_nested_expressions() {
        let expression = Expr::Binary {
            left: Box::new(Expr::Unary {
                operator: Token::new(TokenType::Minus, "-", 1),
                right: Box::new(Expr::Literal {
                    value: LiteralValue::Number(123.0),
                }),
            }),
            operator: Token::new(TokenType::Star, "*", 1),
            right: Box::new(Expr::Grouping {
                expression: Box::new(Expr::Literal {
                    value: LiteralValue::Number(45.67),
                }),
            }),
        };

        assert_eq!(AstPrinter.print(&expression), "(* (- 123) (group 45.67))");
    }

    #[test]
    fn prints_assignment_and_variables() {
        let expression = Expr::Assign {
            id: 0,
            name: Token::new(TokenType::Identifier, "a", 1),
            value: Box::new(Expr::Variable {
                id: 1,
                name: Token::new(TokenType::Identifier, "b", 1),
            }),
        };

        assert_eq!(AstPrinter.print(&expression), "(= a b)");
    }
}
