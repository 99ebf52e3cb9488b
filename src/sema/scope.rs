//! Scope stack and symbol table (spec §3 "Symbols", §4.2).

use hashbrown::HashMap;
use crate::symbol::Symbol;
use crate::types::Type;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SymbolKind {
  Variable,
  Function,
  Type,
  TypeConstructor,
  Member,
  Method,
  Constructor,
}

#[derive(Clone, Debug)]
pub struct SymbolInfo {
  pub name: Symbol,
  pub kind: SymbolKind,
  pub ty: Type,
  pub is_param: bool,
  pub is_static: bool,
  pub offset: Option<u32>,
  pub is_external: bool,
  pub is_builtin: bool,
}

impl SymbolInfo {
  #[must_use] pub fn variable(name: Symbol, ty: Type) -> Self {
    Self { name, kind: SymbolKind::Variable, ty, is_param: false, is_static: false, offset: None, is_external: false, is_builtin: false }
  }

  #[must_use] pub fn param(name: Symbol, ty: Type, offset: u32) -> Self {
    Self { name, kind: SymbolKind::Variable, ty, is_param: true, is_static: false, offset: Some(offset), is_external: false, is_builtin: false }
  }

  #[must_use] pub fn function(name: Symbol, ty: Type) -> Self {
    Self { name, kind: SymbolKind::Function, ty, is_param: false, is_static: false, offset: None, is_external: false, is_builtin: false }
  }

  #[must_use] pub fn builtin_function(name: Symbol, ty: Type) -> Self {
    Self { is_builtin: true, ..Self::function(name, ty) }
  }

  #[must_use] pub fn external_function(name: Symbol, ty: Type) -> Self {
    Self { is_external: true, ..Self::function(name, ty) }
  }
}

struct Scope {
  symbols: HashMap<Symbol, SymbolInfo>,
}

/// A stack of lexical scopes searched innermost-first, matching the
/// semantic analyzer's single-pass AST walk (spec §4.2). Type-parameter
/// bindings are *not* tracked here — they're short-lived, per-declaration
/// substitution environments threaded explicitly through the analyzer
/// (see `sema::analyzer::TypeEnv`), since their lifetime doesn't follow the
/// lexical block structure this stack models.
pub struct ScopeStack {
  scopes: Vec<Scope>,
}

impl ScopeStack {
  #[must_use] pub fn new() -> Self {
    Self { scopes: vec![Scope { symbols: HashMap::new() }] }
  }

  pub fn push(&mut self) {
    self.scopes.push(Scope { symbols: HashMap::new() });
  }

  pub fn pop(&mut self) {
    assert!(self.scopes.len() > 1, "cannot pop the root scope");
    self.scopes.pop();
  }

  pub fn define(&mut self, info: SymbolInfo) {
    self.scopes.last_mut().unwrap().symbols.insert(info.name, info);
  }

  /// Define a symbol at the outermost scope regardless of current nesting —
  /// used for function, constructor, and type symbols, which are always
  /// globally visible no matter which pass registers them.
  pub fn define_global(&mut self, info: SymbolInfo) {
    self.scopes[0].symbols.insert(info.name, info);
  }

  #[must_use] pub fn lookup(&self, name: Symbol) -> Option<&SymbolInfo> {
    self.scopes.iter().rev().find_map(|s| s.symbols.get(&name))
  }

  /// True if `name` is already bound in the *current* (innermost) scope —
  /// used to reject redefinition within one block/parameter list.
  #[must_use] pub fn defined_locally(&self, name: Symbol) -> bool {
    self.scopes.last().unwrap().symbols.contains_key(&name)
  }

  /// True at the outermost (program-level) scope only — used to forbid
  /// nested function declarations (spec §4.2 "Forbid nesting").
  #[must_use] pub fn at_top_level(&self) -> bool {
    self.scopes.len() == 1
  }
}

impl Default for ScopeStack {
  fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symbol::intern;
  use crate::types::TypeContext;

  #[test]
  fn inner_scope_shadows_outer() {
    let ctx = TypeContext::new();
    let mut scopes = ScopeStack::new();
    scopes.define(SymbolInfo::variable(intern("x"), ctx.int.clone()));
    scopes.push();
    scopes.define(SymbolInfo::variable(intern("x"), ctx.bool_.clone()));
    assert!(matches!(scopes.lookup(intern("x")).unwrap().ty, Type::Base(_)));
    scopes.pop();
    assert!(matches!(scopes.lookup(intern("x")).unwrap().ty, Type::Base(_)));
  }

  #[test]
  fn detects_local_redefinition() {
    let ctx = TypeContext::new();
    let mut scopes = ScopeStack::new();
    scopes.define(SymbolInfo::variable(intern("x"), ctx.int.clone()));
    assert!(scopes.defined_locally(intern("x")));
    assert!(!scopes.defined_locally(intern("y")));
  }
}
