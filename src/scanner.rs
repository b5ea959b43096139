use crate::error::error;
use crate::token::{Token, TokenType, KEYWORDS};

// Turns source text into the token stream the parser consumes. The stream
// always ends in an Eof token. Errors (stray characters, unterminated
// strings) are reported to the sink and scanning continues, so one pass can
// surface every lexical problem in a file.
pub struct Scanner {
    source: Vec<char>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: i32,
}

impl Scanner {
    pub fn new(source: String) -> Self {
        Self {
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
        }
    }

    pub fn scan_tokens(&mut self) -> &Vec<Token> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token();
        }

        self.tokens.push(Token::new(TokenType::Eof, "", self.line));
        &self.tokens
    }

    fn scan_token(&mut self) {
        let c = self.advance();
        match c {
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            '{' => self.add_token(TokenType::LeftBrace),
            '}' => self.add_token(TokenType::RightBrace),
            ',' => self.add_token(TokenType::Comma),
            '.' => self.add_token(TokenType::Dot),
            '-' => self.add_token(TokenType::Minus),
            '+' => self.add_token(TokenType::Plus),
            ';' => self.add_token(TokenType::Semicolon),
            '*' => self.add_token(TokenType::Star),

            '!' => {
                let token_type = if self.advance_if('=') {
                    TokenType::BangEqual
                } else {
                    TokenType::Bang
                };
                self.add_token(token_type);
            }
            '=' => {
                let token_type = if self.advance_if('=') {
                    TokenType::EqualEqual
                } else {
                    TokenType::Equal
                };
                self.add_token(token_type);
            }
            '<' => {
                let token_type = if self.advance_if('=') {
                    TokenType::LessEqual
                } else {
                    TokenType::Less
                };
                self.add_token(token_type);
            }
            '>' => {
                let token_type = if self.advance_if('=') {
                    TokenType::GreaterEqual
                } else {
                    TokenType::Greater
                };
                self.add_token(token_type);
            }

            '/' => {
                if self.advance_if('/') {
                    // A line comment runs to the end of the line.
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else {
                    self.add_token(TokenType::Slash);
                }
            }

            ' ' | '\t' | '\r' => (),

            '\n' => self.line += 1,

            '"' => self.string(),

            c => {
                if c.is_ascii_digit() {
                    self.number();
                } else if c.is_alphabetic() || c == '_' {
                    self.identifier();
                } else {
                    error(self.line, "Unexpected character.");
                }
            }
        }
    }

    // Strings are double-quoted and may span lines.
    fn string(&mut self) {
        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_at_end() {
            error(self.line, "Unterminated string.");
            return;
        }

        // The closing quote.
        self.advance();

        // Trim the surrounding quotes.
        let literal = self.lexeme_range(self.start + 1, self.current - 1);
        self.add_token(TokenType::String { literal });
    }

    // One optional decimal point, digits required on both sides. A trailing
    // dot is left for the call grammar rather than folded into the number.
    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let literal: f64 = self
            .lexeme_range(self.start, self.current)
            .parse()
            .expect("scanned number lexeme must parse as f64");

        self.add_token(TokenType::Number { literal });
    }

    // Exactly one token per identifier, classified as a keyword when the
    // lexeme is in the reserved-word table.
    fn identifier(&mut self) {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let text = self.lexeme_range(self.start, self.current);
        let token_type = KEYWORDS
            .get(text.as_str())
            .cloned()
            .unwrap_or(TokenType::Identifier);

        self.add_token(token_type);
    }

    fn lexeme_range(&self, start: usize, end: usize) -> String {
        self.source[start..end].iter().collect()
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;
        c
    }

    // Consumes the current character only if it is the expected one.
    fn advance_if(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.source[self.current] != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn peek(&self) -> char {
        self.source.get(self.current).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.source.get(self.current + 1).copied().unwrap_or('\0')
    }

    fn add_token(&mut self, token_type: TokenType) {
        let text = self.lexeme_range(self.start, self.current);
        self.tokens.push(Token::new(token_type, &text, self.line));
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scan(source: &str) -> Vec<Token> {
        let mut scanner = Scanner::new(source.to_string());
        scanner.scan_tokens().clone()
    }

    fn types(source: &str) -> Vec<TokenType> {
        scan(source).into_iter().map(|t| t.token_type).collect()
    }

    #[test]
    fn scans_punctuation_and_operators() {
        assert_eq!(
            types("(){},.-+;*/ ! != = == > >= < <="),
            vec![
                TokenType::LeftParen,
                TokenType::RightParen,
                TokenType::LeftBrace,
                TokenType::RightBrace,
                TokenType::Comma,
                TokenType::Dot,
                TokenType::Minus,
                TokenType::Plus,
                TokenType::Semicolon,
                TokenType::Star,
                TokenType::Slash,
                TokenType::Bang,
                TokenType::BangEqual,
                TokenType::Equal,
                TokenType::EqualEqual,
                TokenType::Greater,
                TokenType::GreaterEqual,
                TokenType::Less,
                TokenType::LessEqual,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn one_token_per_identifier() {
        assert_eq!(
            types("fun foo"),
            vec![TokenType::Fun, TokenType::Identifier, TokenType::Eof]
        );
    }

    #[test]
    fn keywords_are_classified() {
        assert_eq!(
            types("and or if else while for var nil class"),
            vec![
                TokenType::And,
                TokenType::Or,
                TokenType::If,
                TokenType::Else,
                TokenType::While,
                TokenType::For,
                TokenType::Var,
                TokenType::Nil,
                TokenType::Class,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn keyword_prefix_is_still_an_identifier() {
        assert_eq!(
            types("orchid fortune"),
            vec![TokenType::Identifier, TokenType::Identifier, TokenType::Eof]
        );
    }

    #[test]
    fn decodes_number_literals() {
        assert_eq!(
            types("123 45.67"),
            vec![
                TokenType::Number { literal: 123.0 },
                TokenType::Number { literal: 45.67 },
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn trailing_dot_is_not_part_of_a_number() {
        assert_eq!(
            types("123."),
            vec![
                TokenType::Number { literal: 123.0 },
                TokenType::Dot,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn decodes_string_literals_without_quotes() {
        let tokens = scan("\"hi there\"");
        assert_eq!(
            tokens[0].token_type,
            TokenType::String {
                literal: "hi there".to_string()
            }
        );
        assert_eq!(tokens[0].lexeme, "\"hi there\"");
    }

    #[test]
    fn strings_may_span_lines() {
        let tokens = scan("\"a\nb\"\nvar");
        assert_eq!(
            tokens[0].token_type,
            TokenType::String {
                literal: "a\nb".to_string()
            }
        );
        // One line inside the string, one after it.
        assert_eq!(tokens[1].line, 3);
    }

    #[test]
    fn line_comments_are_skipped() {
        assert_eq!(
            types("1 // the rest is ignored ;;;\n2"),
            vec![
                TokenType::Number { literal: 1.0 },
                TokenType::Number { literal: 2.0 },
                TokenType::Eof,
            ]
        );
    }
}
