//! The Cesium compiler.
//!
//! Cesium is a small statically-typed procedural language with a primitive
//! form of dataflow reactivity. This crate turns Cesium source text into a
//! class file for a JVM-style stack machine, in four stages:
//!
//! - Lexer: source text to tokens
//! - Parser: tokens to an AST
//! - Optimizer: constant folding and dead-branch elimination
//! - Emitter: slot allocation, type inference, and bytecode lowering
//!
//! The pipeline is strictly sequential; each stage completes before the
//! next begins and the first error aborts compilation.

pub mod ast;
pub mod emitter;
pub mod error;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod token;

use tracing::debug;

pub use error::{Error, Result};

/// Compiles Cesium source text into class-file bytes for the given program
/// name.
pub fn compile(source: &str, class_name: &str) -> Result<Vec<u8>> {
    let tokens = lexer::lex(source)?;
    debug!(tokens = tokens.len(), "lexed");

    let program = parser::parse(tokens)?;
    debug!(statements = program.statements.len(), "parsed");

    let program = optimizer::simplify(&program);
    debug!(statements = program.statements.len(), "simplified");

    emitter::emit(&program, class_name)
}
