//! Parsing
//!
//! This module is responsible for turning the source code from its string
//! form into an AST. The main interface is [parse] which takes a string
//! and produces an [`crate::ast::UntypedProgram`].
//!
//! Internally, parsing works in two phases:
//! - the [lexer] scans the source text and turns it into a stream of tokens
//! - the [parser] builds the AST from these tokens, collecting errors and
//!   recovering at statement boundaries instead of giving up
//!
//! Lexical problems travel as `ILLEGAL` tokens and surface here as parse
//! errors with the token's position.

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::ast::UntypedProgram;

mod lexer;
mod parser;
pub mod symbol_table;
mod token;

pub use lexer::Lexer;
pub use parser::Parser;
pub use token::{Token, TokenKind};

/// A syntax error with the position of the offending token
#[derive(Debug, Clone, Error, Diagnostic)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub column: u32,
    pub lexeme: String,

    #[label("here")]
    pub span: SourceSpan,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, token: &Token) -> Self {
        Self {
            message: message.into(),
            line: token.line,
            column: token.column,
            lexeme: token.lexeme.clone(),
            span: (token.offset, token.lexeme.len().max(1)).into(),
        }
    }
}

/// Tokenize source code; the buffer always ends with a single EOF token
pub fn lex(source: &str) -> Vec<Token> {
    Lexer::tokenize(source)
}

/// Parse source code into an AST
///
/// Succeeds only when no errors were recorded; the best-effort AST of a
/// failed parse is dropped since later stages are gated anyway.
pub fn parse(source: &str) -> Result<UntypedProgram, Vec<ParseError>> {
    let (program, errors) = Parser::new(lex(source)).parse();
    if errors.is_empty() {
        Ok(program)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_program_parses() {
        let program = parse("int x = 1;\nprint(x);").unwrap();
        assert_eq!(program.len(), 2);
    }

    #[test]
    fn errors_gate_the_result() {
        let errors = parse("int x = ;").unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn error_positions_are_one_based() {
        let errors = parse("@").unwrap_err();
        assert_eq!((errors[0].line, errors[0].column), (1, 1));
        assert_eq!(errors[0].lexeme, "@");
    }
}
