//! Backward liveness dataflow over machine blocks (spec §4.8 "Liveness";
//! `original_source/h/reg_alloc.hpp`'s `gatherDefinitions`/`gatherUses`/
//! `computeLiveness`).
//!
//! Machine blocks carry no explicit successor list (unlike TAC's
//! `BasicBlock`), so this recovers the CFG from each block's terminating
//! `Jmp`/`Jcc` instructions before iterating the dataflow to a fixed point.

use hashbrown::{HashMap, HashSet};
use crate::tac::BlockId;
use crate::machine::{MachineBlock, MachineFunction, MachineInst, Operand};

pub struct Liveness {
  pub live_in: HashMap<BlockId, HashSet<Operand>>,
  pub live_out: HashMap<BlockId, HashSet<Operand>>,
}

impl Liveness {
  #[must_use] pub fn live_across(&self, block: BlockId, inst_index: usize, insts: &[MachineInst]) -> HashSet<Operand> {
    let mut live = self.live_out.get(&block).cloned().unwrap_or_default();
    for inst in insts[inst_index + 1..].iter().rev() {
      if let Some(d) = inst.def() { live.remove(&d); }
      for u in inst.uses() { live.insert(u); }
    }
    live
  }
}

pub fn successors(block: &MachineBlock) -> Vec<BlockId> {
  let mut v = Vec::new();
  for inst in &block.insts {
    match inst {
      MachineInst::Jmp(t) => v.push(*t),
      MachineInst::Jcc { target, .. } => v.push(*target),
      _ => {}
    }
  }
  v
}

#[must_use] pub fn compute(mf: &MachineFunction) -> Liveness {
  let succs: HashMap<BlockId, Vec<BlockId>> = mf.blocks.iter().map(|b| (b.id, successors(b))).collect();
  let mut live_in: HashMap<BlockId, HashSet<Operand>> = mf.blocks.iter().map(|b| (b.id, HashSet::new())).collect();
  let mut live_out: HashMap<BlockId, HashSet<Operand>> = mf.blocks.iter().map(|b| (b.id, HashSet::new())).collect();

  loop {
    let mut changed = false;
    for b in mf.blocks.iter().rev() {
      let mut out: HashSet<Operand> = HashSet::new();
      for s in &succs[&b.id] {
        out.extend(live_in[s].iter().copied());
      }
      let mut live = out.clone();
      for inst in b.insts.iter().rev() {
        if let Some(d) = inst.def() { live.remove(&d); }
        for u in inst.uses() { live.insert(u); }
      }
      if live != live_in[&b.id] { live_in.insert(b.id, live); changed = true; }
      if out != live_out[&b.id] { live_out.insert(b.id, out); changed = true; }
    }
    if !changed { break }
  }
  Liveness { live_in, live_out }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::machine::{HardReg, VReg, OperandClass};

  fn label_block(id: u32, insts: Vec<MachineInst>) -> MachineBlock {
    MachineBlock { id: BlockId(id), insts }
  }

  #[test]
  fn a_value_defined_and_used_in_the_same_block_is_not_live_out() {
    let v = Operand::Virtual(VReg(0), OperandClass::Scalar);
    let block = label_block(0, vec![
      MachineInst::Label(BlockId(0)),
      MachineInst::MovRd { dst: v, src: Operand::Immediate(1) },
      MachineInst::MovRd { dst: Operand::Hardware(HardReg::Rax), src: v },
      MachineInst::Ret,
    ]);
    let mf = MachineFunction { name: crate::symbol::intern("f"), blocks: vec![block], entry: BlockId(0), vreg_count: 1 };
    let live = compute(&mf);
    assert!(!live.live_out[&BlockId(0)].contains(&v));
  }

  #[test]
  fn a_value_used_across_a_jump_is_live_into_the_successor() {
    let v = Operand::Virtual(VReg(0), OperandClass::Scalar);
    let entry = label_block(0, vec![
      MachineInst::Label(BlockId(0)),
      MachineInst::MovRd { dst: v, src: Operand::Immediate(1) },
      MachineInst::Jmp(BlockId(1)),
    ]);
    let tail = label_block(1, vec![
      MachineInst::Label(BlockId(1)),
      MachineInst::MovRd { dst: Operand::Hardware(HardReg::Rax), src: v },
      MachineInst::Ret,
    ]);
    let mf = MachineFunction { name: crate::symbol::intern("f"), blocks: vec![entry, tail], entry: BlockId(0), vreg_count: 1 };
    let live = compute(&mf);
    assert!(live.live_in[&BlockId(1)].contains(&v));
    assert!(live.live_out[&BlockId(0)].contains(&v));
  }
}
