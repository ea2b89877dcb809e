//! `zyth` library crate.
//!
//! Ahead-of-time compiler from a statically-typed Python subset to Zig.
//! High-level layout:
//! - frontend: `lexer` + `parser` produce the AST (`ast`)
//! - `analyzer`: coarse type tags, reassignment sets, allocator-need flags
//! - `emitter`: AST + analysis → a self-contained Zig module (embedded
//!   runtime value library included)
//! - `compiler`: digest cache and the `zig build-exe` subprocess
//! - `fixtures` + `harness`: the fixture-driven test runner behind
//!   `zyth test`
pub mod analyzer;
pub mod ast;
pub mod compiler;
pub mod emitter;
pub mod fixtures;
pub mod harness;
pub mod lexer;
pub mod parser;
pub mod token;
