use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::object::Object;
use crate::token::{Token, TokenType};

// One error type for the whole pipeline. Return is not a fault: it is the
// non-local exit a `return` statement uses to unwind to the nearest call
// boundary, riding the same Result channel as runtime errors so that no
// intervening block or loop can swallow it. Only Function::call catches it.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Parse,
    Runtime { token: Token, message: String },
    Return { value: Object },
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "{err}"),
            Error::Parse => write!(f, "parse error"),
            Error::Runtime { message, .. } => write!(f, "{message}"),
            Error::Return { .. } => write!(f, "return outside a function call"),
        }
    }
}

impl std::error::Error for Error {}

// The driver consults these after a run to pick an exit code, and resets them
// between REPL lines. They mirror the hadError / hadRuntimeError pair every
// jlox port carries; atomics because the diagnostic sink is reachable from
// free functions rather than threaded through every component.
static HAD_ERROR: AtomicBool = AtomicBool::new(false);
static HAD_RUNTIME_ERROR: AtomicBool = AtomicBool::new(false);

pub fn had_error() -> bool {
    HAD_ERROR.load(Ordering::Relaxed)
}

pub fn had_runtime_error() -> bool {
    HAD_RUNTIME_ERROR.load(Ordering::Relaxed)
}

pub fn reset() {
    HAD_ERROR.store(false, Ordering::Relaxed);
    HAD_RUNTIME_ERROR.store(false, Ordering::Relaxed);
}

// Scanner-level diagnostics only know a line number.
pub fn error(line: i32, message: &str) {
    report(line, "", message);
}

// Parser and resolver diagnostics carry the offending token so the report can
// point at its lexeme.
pub fn parser_error(token: &Token, message: &str) {
    if token.token_type == TokenType::Eof {
        report(token.line, " at end", message);
    } else {
        report(token.line, &format!(" at '{}'", token.lexeme), message);
    }
}

pub fn runtime_error(token: &Token, message: &str) {
    eprintln!("{}\n[line {}]", message, token.line);
    HAD_RUNTIME_ERROR.store(true, Ordering::Relaxed);
}

fn report(line: i32, where_: &str, message: &str) {
    eprintln!("[line {line}] Error{where_}: {message}");
    HAD_ERROR.store(true, Ordering::Relaxed);
}
