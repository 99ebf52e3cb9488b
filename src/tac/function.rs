//! TAC functions (spec §4.3; `original_source/h/function.hpp`,
//! `h/tac_program.hpp`).

use crate::symbol::Symbol;
use super::block::BasicBlock;
use super::instruction::BlockId;
use super::value::ValueId;

pub struct Function {
  pub name: Symbol,
  pub is_external: bool,
  pub params: Vec<ValueId>,
  pub locals: Vec<ValueId>,
  pub temps: Vec<ValueId>,
  pub blocks: Vec<BasicBlock>,
  pub entry: BlockId,
}

impl Function {
  #[must_use] pub fn block(&self, id: BlockId) -> &BasicBlock {
    &self.blocks[id.0 as usize]
  }

  #[must_use] pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
    &mut self.blocks[id.0 as usize]
  }

  /// Blocks in the order they were created (not necessarily reverse
  /// postorder); `ssa::dominance` computes its own traversal order.
  pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
    self.blocks.iter().map(|b| b.id)
  }
}
