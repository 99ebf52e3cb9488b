//! Basic blocks (spec §4.3; `original_source/h/basic_block.hpp`).

use smallvec::SmallVec;
use super::instruction::{BlockId, Inst};

pub struct BasicBlock {
  pub id: BlockId,
  pub insts: Vec<Inst>,
  pub preds: SmallVec<[BlockId; 4]>,
  pub succs: SmallVec<[BlockId; 2]>,
}

impl BasicBlock {
  #[must_use] pub fn new(id: BlockId) -> Self {
    Self { id, insts: Vec::new(), preds: SmallVec::new(), succs: SmallVec::new() }
  }

  pub fn append(&mut self, inst: Inst) {
    debug_assert!(!self.is_terminated(), "appended instruction after a terminator in block {}", self.id.0);
    self.insts.push(inst);
  }

  pub fn prepend(&mut self, inst: Inst) {
    self.insts.insert(0, inst);
  }

  #[must_use] pub fn is_terminated(&self) -> bool {
    self.insts.last().is_some_and(Inst::is_terminator)
  }

  #[must_use] pub fn terminator(&self) -> Option<&Inst> {
    self.insts.last().filter(|i| i.is_terminator())
  }

  pub fn add_predecessor(&mut self, block: BlockId) {
    if !self.preds.contains(&block) { self.preds.push(block) }
  }

  pub fn add_successor(&mut self, block: BlockId) {
    if !self.succs.contains(&block) { self.succs.push(block) }
  }
}
