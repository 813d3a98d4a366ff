//! minic — a compiler for a small statically-typed imperative language
//!
//! The language has integers, floats, booleans, strings, the usual
//! operators, `if`/`while`/`for`, user-defined functions and a builtin
//! `print`. Compilation is a linear pipeline:
//!
//! ```text
//! source → [parsing] → AST → [type_checking] → typed AST
//!        → [lowering] → IR tree → textual LLVM IR
//! ```
//!
//! Each stage accumulates diagnostics instead of failing fast; a non-empty
//! diagnostic set gates the next stage. The emitted IR is plain text that
//! an external `llc` + C compiler turn into a native executable.

pub mod ast;
pub mod common;
pub mod ir;
pub mod lowering;
pub mod parsing;
pub mod type_checking;

pub use common::Type;
pub use lowering::lower;
pub use parsing::{lex, parse};
pub use type_checking::type_check;
