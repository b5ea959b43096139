use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

// Every reserved word of the language, including the ones this snapshot only
// reserves (class, super, this). The scanner classifies identifiers through
// this table, so a word listed here can never be used as a variable name.
const KEYWORDS: &[(&str, &str)] = &[
    ("and", "And"),
    ("class", "Class"),
    ("else", "Else"),
    ("false", "False"),
    ("for", "For"),
    ("fun", "Fun"),
    ("if", "If"),
    ("nil", "Nil"),
    ("or", "Or"),
    ("print", "Print"),
    ("return", "Return"),
    ("super", "Super"),
    ("this", "This"),
    ("true", "True"),
    ("var", "Var"),
    ("while", "While"),
];

fn main() {
    let path = Path::new(&env::var("OUT_DIR").unwrap()).join("keywords.rs");
    let mut file = BufWriter::new(File::create(&path).unwrap());

    let mut map = phf_codegen::Map::new();
    for (word, variant) in KEYWORDS {
        map.entry(*word, format!("TokenType::{variant}").as_str());
    }

    writeln!(
        &mut file,
        "pub static KEYWORDS: phf::Map<&'static str, TokenType> = {};",
        map.build()
    )
    .unwrap();
}
