//! Owns every value and function minted while lowering one program to TAC
//! (spec §4.3; `original_source/h/context.hpp`).
//!
//! The original's `TACContext` owns `Value*`/`Function*` behind
//! `new`/`delete` and a private `_values` vector for teardown. Here a single
//! flat `Vec<Value>` is the arena and every value is addressed by the
//! stable [`ValueId`] index handed back at creation — the same convention
//! `TypeContext` uses for type variables (see DESIGN.md). Functions are
//! addressed the same way, by [`FunctionId`].

use hashbrown::HashMap;
use crate::symbol::Symbol;
use super::block::BasicBlock;
use super::function::Function;
use super::instruction::BlockId;
use super::value::{GlobalTag, Value, ValueId, ValueKind};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FunctionId(pub u32);

pub struct TACContext {
  values: Vec<Value>,
  pub functions: Vec<Function>,
  pub globals: Vec<ValueId>,
  pub static_strings: Vec<(ValueId, String)>,
  pub externs: Vec<ValueId>,
  next_seq: i64,
  int_cache: HashMap<i64, ValueId>,
}

impl TACContext {
  #[must_use] pub fn new() -> Self {
    Self {
      values: Vec::new(),
      functions: Vec::new(),
      globals: Vec::new(),
      static_strings: Vec::new(),
      externs: Vec::new(),
      next_seq: 0,
      int_cache: HashMap::new(),
    }
  }

  fn push_value(&mut self, kind: ValueKind) -> ValueId {
    let id = ValueId(self.values.len() as u32);
    let seq = self.next_seq;
    self.next_seq += 1;
    self.values.push(Value { id, kind, seq });
    id
  }

  #[must_use] pub fn value(&self, id: ValueId) -> &Value {
    &self.values[id.0 as usize]
  }

  /// Deduplicated integer constant (spec §4.3 "unique `ConstantInt`s").
  pub fn make_constant_int(&mut self, v: i64) -> ValueId {
    if let Some(&id) = self.int_cache.get(&v) { return id }
    let id = self.push_value(ValueKind::ConstantInt(v));
    self.int_cache.insert(v, id);
    id
  }

  /// Canonical tagged `true` (spec §4.4 "Booleans": `true`=3).
  pub fn true_value(&mut self) -> ValueId { self.make_constant_int(3) }
  /// Canonical tagged `false` (spec §4.4 "Booleans": `false`=1).
  pub fn false_value(&mut self) -> ValueId { self.make_constant_int(1) }
  pub fn zero(&mut self) -> ValueId { self.make_constant_int(0) }
  pub fn one(&mut self) -> ValueId { self.make_constant_int(1) }

  pub fn make_argument(&mut self, name: Symbol, index: u32) -> ValueId {
    self.push_value(ValueKind::Argument { name, index })
  }

  pub fn make_local(&mut self, name: Option<Symbol>) -> ValueId {
    self.push_value(ValueKind::Local { name })
  }

  pub fn make_temp(&mut self) -> ValueId {
    self.push_value(ValueKind::Temp)
  }

  pub fn make_global(&mut self, name: Symbol) -> ValueId {
    let id = self.push_value(ValueKind::Global { tag: GlobalTag::Variable, name });
    self.globals.push(id);
    id
  }

  pub fn make_static_string(&mut self, name: Symbol, contents: String) -> ValueId {
    let id = self.push_value(ValueKind::Global { tag: GlobalTag::Static, name });
    self.static_strings.push((id, contents));
    id
  }

  pub fn make_extern(&mut self, name: Symbol) -> ValueId {
    let id = self.push_value(ValueKind::Global { tag: GlobalTag::Function, name });
    self.externs.push(id);
    id
  }

  /// Create a new function. External (foreign) functions get no entry
  /// block — they have no body to lower.
  pub fn make_function(&mut self, name: Symbol, is_external: bool) -> FunctionId {
    let entry = BlockId(0);
    let mut f = Function { name, is_external, params: Vec::new(), locals: Vec::new(), temps: Vec::new(), blocks: Vec::new(), entry };
    if !is_external {
      f.blocks.push(BasicBlock::new(entry));
    }
    self.functions.push(f);
    FunctionId((self.functions.len() - 1) as u32)
  }

  #[must_use] pub fn function(&self, id: FunctionId) -> &Function {
    &self.functions[id.0 as usize]
  }

  #[must_use] pub fn function_mut(&mut self, id: FunctionId) -> &mut Function {
    &mut self.functions[id.0 as usize]
  }

  pub fn make_block(&mut self, func: FunctionId) -> BlockId {
    let f = self.function_mut(func);
    let id = BlockId(f.blocks.len() as u32);
    f.blocks.push(BasicBlock::new(id));
    id
  }
}

impl Default for TACContext {
  fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symbol::intern;

  #[test]
  fn integer_constants_are_deduplicated() {
    let mut ctx = TACContext::new();
    let a = ctx.make_constant_int(42);
    let b = ctx.make_constant_int(42);
    assert_eq!(a, b);
  }

  #[test]
  fn canonical_booleans_match_spec_encoding() {
    let mut ctx = TACContext::new();
    let t = ctx.true_value();
    let f = ctx.false_value();
    assert!(matches!(ctx.value(t).kind, ValueKind::ConstantInt(3)));
    assert!(matches!(ctx.value(f).kind, ValueKind::ConstantInt(1)));
  }

  #[test]
  fn function_gets_a_single_entry_block() {
    let mut ctx = TACContext::new();
    let f = ctx.make_function(intern("main"), false);
    assert_eq!(ctx.function(f).blocks.len(), 1);
    assert_eq!(ctx.function(f).entry, BlockId(0));
  }

  #[test]
  fn external_function_has_no_blocks() {
    let mut ctx = TACContext::new();
    let f = ctx.make_function(intern("gcAllocate"), true);
    assert!(ctx.function(f).blocks.is_empty());
  }
}
