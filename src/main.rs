mod ast_printer;
mod environment;
mod error;
mod function;
mod interpreter;
mod object;
mod parser;
mod resolver;
mod scanner;
mod syntax;
mod token;

use std::env;
use std::fs::File;
use std::io::{self, BufRead, Read, Write};
use std::process::exit;

use error::Error;
use interpreter::Interpreter;
use parser::Parser;
use resolver::Resolver;
use scanner::Scanner;

// One interpreter per process: REPL lines share globals and the resolver
// side-table, which is what lets a function defined on one line be called on
// the next.
struct Lox {
    interpreter: Interpreter,
}

impl Lox {
    fn new() -> Self {
        Lox {
            interpreter: Interpreter::new(),
        }
    }

    fn run_file(&mut self, file_path: &str) -> Result<(), Error> {
        let mut file = File::open(file_path)?;
        let mut contents = String::new();

        file.read_to_string(&mut contents)?;

        self.run(contents);

        if error::had_error() {
            exit(65);
        }
        if error::had_runtime_error() {
            exit(70);
        }

        Ok(())
    }

    fn run_prompt(&mut self) -> Result<(), Error> {
        let stdin = io::stdin();
        let mut handle = stdin.lock();

        loop {
            print!("> ");
            io::stdout().flush()?;

            let mut line = String::new();
            if handle.read_line(&mut line)? == 0 {
                break;
            }

            self.run(line);

            // A bad line must not poison the next one.
            error::reset();
        }

        Ok(())
    }

    fn run(&mut self, source: String) {
        let mut scanner = Scanner::new(source);
        let tokens = scanner.scan_tokens();

        let mut parser = Parser::new(tokens);
        let statements = parser.parse();

        // Code with a syntax error is never going to run, so there is no
        // value in resolving it.
        if error::had_error() {
            return;
        }

        let mut resolver = Resolver::new(&mut self.interpreter);
        resolver.resolve_stmts(&statements);

        if resolver.had_error {
            return;
        }

        match self.interpreter.interpret(&statements) {
            Ok(()) => (),
            Err(Error::Runtime { token, message }) => error::runtime_error(&token, &message),
            // The resolver rejects top-level returns, and neither Parse nor
            // Io errors originate in the interpreter.
            Err(other) => unreachable!("interpreter returned {other}"),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    let mut lox = Lox::new();
    match &args[..] {
        [_, file_path] => lox.run_file(file_path)?,
        [_] => lox.run_prompt()?,
        _ => {
            eprintln!("Usage: treelox [script]");
            exit(64);
        }
    }
    Ok(())
}
