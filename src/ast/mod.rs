//! Abstract Syntax Tree (AST) Types for Command Lines
//!
//! This module defines the AST the parser produces and the executor consumes.
//!
//! Architecture:
//!   Input → Lexer → Parser → AST → Expansion → Executor → Output

pub mod types;

pub use types::*;
