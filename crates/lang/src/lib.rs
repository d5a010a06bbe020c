//! iris-lang: the build-script language front-end.
//!
//! Source text flows through three stages:
//!
//! ```text
//! &str -> lexer::tokenize -> parser::parse -> interp::Interpreter::execute -> BuildConfig
//! ```
//!
//! The tokenizer and parser are plain recursive descent with one token of
//! lookahead; the interpreter walks the tree and materializes an
//! `iris_core::BuildConfig` from block-scoped variable conventions.

pub mod ast;
pub mod env;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod value;

pub use interp::{EvalError, Interpreter, OutputSink, StdoutSink};
pub use lexer::LexError;
pub use parser::{parse, parse_file, ParseError};
pub use value::Value;
