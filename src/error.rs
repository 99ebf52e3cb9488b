//! Diagnostic error types.
//!
//! Four kinds: lexing and parsing are bundled together here as a single
//! "the core was never entered" failure, plus semantic and type-inference
//! errors, each carrying a [`Span`] for rendering `file:line:col: message`.

use std::fmt;
use thiserror::Error;
use crate::symbol::Span;

#[derive(Debug, Error)]
pub enum CompileError {
  #[error("{span}: {message}")]
  Lex { span: Span, message: String },
  #[error("{span}: {message}")]
  Parse { span: Span, message: String },
  #[error("{span}: {message}")]
  Semantic { span: Span, message: String },
  #[error("{span}: {message}")]
  TypeInference { span: Span, message: String },
}

impl CompileError {
  #[must_use] pub fn lex(span: Span, message: impl Into<String>) -> Self {
    CompileError::Lex { span, message: message.into() }
  }

  #[must_use] pub fn parse(span: Span, message: impl Into<String>) -> Self {
    CompileError::Parse { span, message: message.into() }
  }

  #[must_use] pub fn semantic(span: Span, message: impl Into<String>) -> Self {
    CompileError::Semantic { span, message: message.into() }
  }

  #[must_use] pub fn type_inference(span: Span, message: impl Into<String>) -> Self {
    CompileError::TypeInference { span, message: message.into() }
  }

  #[must_use] pub fn span(&self) -> Span {
    match *self {
      CompileError::Lex { span, .. }
      | CompileError::Parse { span, .. }
      | CompileError::Semantic { span, .. }
      | CompileError::TypeInference { span, .. } => span,
    }
  }

  /// Render a one-line diagnostic with the offending source line quoted
  /// beneath it and a caret at the column, in the style expected by the CLI
  /// driver (spec §6: "prints a formatted diagnostic to stderr").
  #[must_use] pub fn render(&self, file: &str, source: &str) -> String {
    let span = self.span();
    let line_text = source.lines().nth(span.line.saturating_sub(1) as usize).unwrap_or("");
    let caret_col = span.col.saturating_sub(1) as usize;
    let mut out = format!("{file}:{self}\n");
    out.push_str(&format!("  {line_text}\n"));
    out.push_str(&format!("  {}^\n", " ".repeat(caret_col)));
    out
  }
}

pub type Result<T> = std::result::Result<T, CompileError>;

/// Helper for rendering non-exhaustive internal descriptions (e.g. "expected
/// one of X, Y, found Z") without every caller building a `String` by hand.
pub(crate) fn expected(what: impl fmt::Display, found: impl fmt::Display) -> String {
  format!("expected {what}, found {found}")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn render_points_at_column() {
    let err = CompileError::parse(Span::new(4, 5, 1, 5), "unexpected token");
    let rendered = err.render("test.spl", "let x = ;");
    assert!(rendered.contains("unexpected token"));
    assert!(rendered.contains("let x = ;"));
    assert!(rendered.contains("^"));
  }
}
