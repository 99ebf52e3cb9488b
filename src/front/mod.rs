//! Front end: lexer, token stream, surface AST, and recursive-descent
//! parser (spec §4.0). Deliberately the smallest piece of the pipeline —
//! the engineering budget is spent on the type checker and the backend.

pub mod token;
pub mod lexer;
pub mod ast;
pub mod parser;

use crate::error::CompileError;

/// Lex and parse a complete source string into a [`ast::Program`]. Stops at
/// the first lexical or syntactic error.
pub fn parse(source: &str) -> Result<ast::Program, CompileError> {
  let toks = lexer::Lexer::new(source).tokenize()?;
  parser::parse_program(&toks)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_end_to_end() {
    let prog = parse("fn add(x: Int, y: Int): Int { return x + y; }").unwrap();
    assert_eq!(prog.decls.len(), 1);
  }

  #[test]
  fn surfaces_lex_errors() {
    assert!(parse("let x = $;").is_err());
  }
}
