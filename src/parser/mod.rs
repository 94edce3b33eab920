//! Parser Module
//!
//! Tokenizes command lines and builds the pipeline AST.

pub mod lexer;
pub mod parser;

pub use lexer::{Lexer, RedirOp, Token};
pub use parser::{is_input_complete, parse, Parser};
