//! Global string interner and source spans.
//!
//! Every identifier that flows through the pipeline — variable names, type
//! names, constructor names, field names — is interned once here and
//! referred to everywhere else as a cheap, `Copy` [`Symbol`]. This mirrors
//! the usual arena-interner pattern: a thread-local table keyed by string
//! content, returning small `Copy` handles, minus any primitive-keyword
//! machinery since this crate's keyword set is handled by the lexer.

use std::cell::RefCell;
use std::fmt;
use hashbrown::HashMap;

/// An interned string. Two `Symbol`s are equal iff their underlying strings
/// are equal; comparing symbols is just comparing `u32`s.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

struct Interner {
  strings: Vec<String>,
  lookup: HashMap<String, Symbol>,
}

impl Interner {
  fn new() -> Self { Self { strings: Vec::new(), lookup: HashMap::new() } }

  fn intern(&mut self, s: &str) -> Symbol {
    if let Some(&sym) = self.lookup.get(s) { return sym }
    let id = self.strings.len() as u32;
    let sym = Symbol(id);
    self.strings.push(s.to_owned());
    self.lookup.insert(s.to_owned(), sym);
    sym
  }

  fn resolve(&self, sym: Symbol) -> &str { &self.strings[sym.0 as usize] }
}

thread_local! {
  static INTERNER: RefCell<Interner> = RefCell::new(Interner::new());
}

/// Intern a string, returning its `Symbol`. Idempotent.
pub fn intern(s: &str) -> Symbol {
  INTERNER.with(|i| i.borrow_mut().intern(s))
}

impl Symbol {
  /// Look up the original string. Borrows the thread-local interner only
  /// for the duration of the callback, to avoid returning a reference into
  /// a `RefCell`.
  #[must_use] pub fn as_str(self) -> String {
    INTERNER.with(|i| i.borrow().resolve(self).to_owned())
  }

  /// The wildcard pattern name `_`, which suppresses binding (spec §4.2).
  #[must_use] pub fn is_wildcard(self) -> bool { self.as_str() == "_" }
}

impl fmt::Display for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str()) }
}

impl fmt::Debug for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:?}", self.as_str()) }
}

/// A byte-offset range into the source text, plus 1-based line/column of its
/// start, used for every diagnostic and for splicing the prelude in front of
/// user source without losing accurate positions.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Span {
  pub start: u32,
  pub end: u32,
  pub line: u32,
  pub col: u32,
}

impl Span {
  #[must_use] pub fn new(start: u32, end: u32, line: u32, col: u32) -> Self {
    Self { start, end, line, col }
  }

  /// Merge two spans into the smallest span containing both; takes the
  /// earlier line/col as the merged position.
  #[must_use] pub fn to(self, other: Span) -> Span {
    if self.start <= other.start {
      Span::new(self.start, other.end.max(self.end), self.line, self.col)
    } else {
      other.to(self)
    }
  }
}

impl fmt::Display for Span {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}:{}", self.line, self.col) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interning_is_idempotent() {
    let a = intern("foo");
    let b = intern("foo");
    let c = intern("bar");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.as_str(), "foo");
  }

  #[test]
  fn wildcard_detection() {
    assert!(intern("_").is_wildcard());
    assert!(!intern("x").is_wildcard());
  }

  #[test]
  fn span_merge_takes_earlier_start() {
    let a = Span::new(10, 20, 2, 3);
    let b = Span::new(5, 8, 1, 1);
    let m = a.to(b);
    assert_eq!(m.start, 5);
    assert_eq!(m.end, 20);
  }
}
