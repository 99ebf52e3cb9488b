//! Hand-written, single-pass lexer (spec §4.0).
//!
//! Grounded in the original `lexer_transform.cpp`/`tokens.hpp`: no
//! backtracking, one token of lookahead via the current character, spans
//! tracked as byte offsets plus 1-based line/column.

use crate::error::CompileError;
use crate::symbol::{intern, Span};
use super::token::{Token, TokenKind};

pub struct Lexer<'a> {
  src: &'a [u8],
  pos: u32,
  line: u32,
  col: u32,
}

impl<'a> Lexer<'a> {
  #[must_use] pub fn new(src: &'a str) -> Self {
    Self { src: src.as_bytes(), pos: 0, line: 1, col: 1 }
  }

  pub fn tokenize(mut self) -> Result<Vec<Token>, CompileError> {
    let mut out = Vec::new();
    loop {
      let tok = self.next_token()?;
      let eof = tok.kind == TokenKind::Eof;
      out.push(tok);
      if eof { break }
    }
    Ok(out)
  }

  fn peek(&self) -> u8 { self.src.get(self.pos as usize).copied().unwrap_or(0) }
  fn peek_at(&self, n: usize) -> u8 { self.src.get(self.pos as usize + n).copied().unwrap_or(0) }

  fn bump(&mut self) -> u8 {
    let c = self.peek();
    self.pos += 1;
    if c == b'\n' { self.line += 1; self.col = 1 } else { self.col += 1 }
    c
  }

  fn here(&self) -> Span { Span::new(self.pos, self.pos, self.line, self.col) }

  fn skip_trivia(&mut self) {
    loop {
      match self.peek() {
        b' ' | b'\t' | b'\r' | b'\n' => { self.bump(); }
        b'/' if self.peek_at(1) == b'/' => {
          while self.peek() != b'\n' && self.peek() != 0 { self.bump(); }
        }
        _ => break,
      }
    }
  }

  fn next_token(&mut self) -> Result<Token, CompileError> {
    self.skip_trivia();
    let start = self.here();

    macro_rules! tok { ($kind:expr) => { Ok(Token { kind: $kind, span: start }) } }

    let c = self.peek();
    if c == 0 { return tok!(TokenKind::Eof) }

    if c.is_ascii_digit() {
      let mut n: i64 = 0;
      while self.peek().is_ascii_digit() {
        let d = i64::from(self.bump() - b'0');
        n = n.checked_mul(10).and_then(|n| n.checked_add(d))
          .ok_or_else(|| CompileError::lex(start, "integer literal overflows i64"))?;
      }
      return Ok(Token { kind: TokenKind::Int(n), span: start.to(self.here()) })
    }

    if c.is_ascii_alphabetic() || c == b'_' {
      let begin = self.pos as usize;
      while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' { self.bump(); }
      let text = std::str::from_utf8(&self.src[begin..self.pos as usize]).unwrap();
      let span = start.to(self.here());
      let kind = match text {
        "fn" => TokenKind::Fn,
        "data" => TokenKind::Data,
        "struct" => TokenKind::Struct,
        "impl" => TokenKind::Impl,
        "let" => TokenKind::Let,
        "var" => TokenKind::Var,
        "return" => TokenKind::Return,
        "break" => TokenKind::Break,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "foreach" => TokenKind::Foreach,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "do" => TokenKind::Do,
        "match" => TokenKind::Match,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "_" => TokenKind::Underscore,
        _ => TokenKind::Ident(intern(text)),
      };
      return Ok(Token { kind, span })
    }

    if c == b'"' {
      self.bump();
      let begin = self.pos as usize;
      while self.peek() != b'"' {
        if self.peek() == 0 {
          return Err(CompileError::lex(start, "unterminated string literal"))
        }
        self.bump();
      }
      let text = std::str::from_utf8(&self.src[begin..self.pos as usize]).unwrap().to_owned();
      self.bump();
      return Ok(Token { kind: TokenKind::Str(intern(&text)), span: start.to(self.here()) })
    }

    macro_rules! two {
      ($second:expr, $two:expr, $one:expr) => {{
        self.bump();
        if self.peek() == $second { self.bump(); tok!($two) } else { tok!($one) }
      }}
    }

    match c {
      b'(' => { self.bump(); tok!(TokenKind::LParen) }
      b')' => { self.bump(); tok!(TokenKind::RParen) }
      b'{' => { self.bump(); tok!(TokenKind::LBrace) }
      b'}' => { self.bump(); tok!(TokenKind::RBrace) }
      b'[' => { self.bump(); tok!(TokenKind::LBracket) }
      b']' => { self.bump(); tok!(TokenKind::RBracket) }
      b',' => { self.bump(); tok!(TokenKind::Comma) }
      b';' => { self.bump(); tok!(TokenKind::Semi) }
      b'+' => { self.bump(); tok!(TokenKind::Plus) }
      b'-' => two!(b'>', TokenKind::Arrow, TokenKind::Minus),
      b'*' => { self.bump(); tok!(TokenKind::Star) }
      b'/' => { self.bump(); tok!(TokenKind::Slash) }
      b'%' => { self.bump(); tok!(TokenKind::Percent) }
      b'&' => { self.bump(); tok!(TokenKind::Amp) }
      b'|' => { self.bump(); tok!(TokenKind::Pipe) }
      b'.' => two!(b'.', TokenKind::DotDot, TokenKind::Dot),
      b':' => two!(b'=', TokenKind::ColonEq, TokenKind::Colon),
      b'=' => {
        self.bump();
        match self.peek() {
          b'>' => { self.bump(); tok!(TokenKind::FatArrow) }
          b'=' => { self.bump(); tok!(TokenKind::EqEq) }
          _ => tok!(TokenKind::Eq),
        }
      }
      b'!' => {
        self.bump();
        if self.peek() == b'=' { self.bump(); tok!(TokenKind::Ne) }
        else { Err(CompileError::lex(start, "expected '=' after '!'")) }
      }
      b'<' => two!(b'=', TokenKind::Le, TokenKind::Lt),
      b'>' => two!(b'=', TokenKind::Ge, TokenKind::Gt),
      other => Err(CompileError::lex(start, format!("unexpected character '{}'", other as char))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(src: &str) -> Vec<TokenKind> {
    Lexer::new(src).tokenize().unwrap().into_iter().map(|t| t.kind).collect()
  }

  #[test]
  fn lexes_integers_and_identifiers() {
    let ks = kinds("let x = 42;");
    assert_eq!(ks, vec![
      TokenKind::Let, TokenKind::Ident(intern("x")), TokenKind::Eq,
      TokenKind::Int(42), TokenKind::Semi, TokenKind::Eof,
    ]);
  }

  #[test]
  fn lexes_range_and_comparisons() {
    let ks = kinds("1..4 <= >=");
    assert_eq!(ks, vec![
      TokenKind::Int(1), TokenKind::DotDot, TokenKind::Int(4),
      TokenKind::Le, TokenKind::Ge, TokenKind::Eof,
    ]);
  }

  #[test]
  fn skips_line_comments() {
    let ks = kinds("1 // comment\n2");
    assert_eq!(ks, vec![TokenKind::Int(1), TokenKind::Int(2), TokenKind::Eof]);
  }

  #[test]
  fn rejects_unterminated_string() {
    assert!(Lexer::new("\"abc").tokenize().is_err());
  }

  #[test]
  fn rejects_unknown_character() {
    assert!(Lexer::new("$").tokenize().is_err());
  }
}
