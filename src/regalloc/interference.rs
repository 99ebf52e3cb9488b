//! Interference graph construction (spec §4.8 "Interference graph";
//! `original_source/h/reg_alloc.hpp`'s `computeInterference`).
//!
//! A definition interferes with everything live immediately after it,
//! except the source of the `MovRd` that defines it — leaving that pair
//! uncolored-but-unconnected is what lets `coalesce` merge them later
//! instead of the allocator being forced to give them different colors.

use hashbrown::{HashMap, HashSet};
use crate::machine::{MachineFunction, MachineInst, Operand};
use super::liveness::Liveness;

pub struct InterferenceGraph {
  pub edges: HashMap<Operand, HashSet<Operand>>,
  /// `(dst, src)` pairs of register-to-register `MovRd`s — coalescing
  /// candidates.
  pub moves: Vec<(Operand, Operand)>,
}

impl InterferenceGraph {
  fn touch(&mut self, r: Operand) {
    self.edges.entry(r).or_default();
  }

  fn add_edge(&mut self, a: Operand, b: Operand) {
    if a == b { return }
    self.edges.entry(a).or_default().insert(b);
    self.edges.entry(b).or_default().insert(a);
  }
}

#[must_use] pub fn build(mf: &MachineFunction, live: &Liveness) -> InterferenceGraph {
  let mut g = InterferenceGraph { edges: HashMap::new(), moves: Vec::new() };

  for b in &mf.blocks {
    let mut live_now: HashSet<Operand> = live.live_out.get(&b.id).cloned().unwrap_or_default();

    for inst in b.insts.iter().rev() {
      let move_src = match inst {
        MachineInst::MovRd { dst, src } if dst.is_register() && src.is_register() => {
          g.moves.push((*dst, *src));
          Some(*src)
        }
        _ => None,
      };

      if let Some(d) = inst.def() {
        if d.is_register() {
          g.touch(d);
          for &l in &live_now {
            if !l.is_register() || l == d { continue }
            if move_src == Some(l) { continue }
            g.add_edge(d, l);
          }
        }
      }

      if let Some(d) = inst.def() { live_now.remove(&d); }
      for u in inst.uses() {
        if u.is_register() {
          g.touch(u);
          live_now.insert(u);
        }
      }
    }
  }
  g
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::machine::{HardReg, OperandClass, VReg};
  use crate::tac::BlockId;
  use crate::machine::MachineBlock;
  use super::super::liveness;

  #[test]
  fn two_values_simultaneously_live_interfere() {
    let a = Operand::Virtual(VReg(0), OperandClass::Scalar);
    let b = Operand::Virtual(VReg(1), OperandClass::Scalar);
    let block = MachineBlock { id: BlockId(0), insts: vec![
      MachineInst::Label(BlockId(0)),
      MachineInst::MovRd { dst: a, src: Operand::Immediate(1) },
      MachineInst::MovRd { dst: b, src: Operand::Immediate(2) },
      MachineInst::Binary { op: crate::machine::Opcode::Add, dst: a, src: b },
      MachineInst::MovRd { dst: Operand::Hardware(HardReg::Rax), src: a },
      MachineInst::Ret,
    ] };
    let mf = MachineFunction { name: crate::symbol::intern("f"), blocks: vec![block], entry: BlockId(0), vreg_count: 2 };
    let live = liveness::compute(&mf);
    let g = build(&mf, &live);
    assert!(g.edges[&a].contains(&b));
  }

  #[test]
  fn a_plain_copy_does_not_interfere_with_its_own_source() {
    let a = Operand::Virtual(VReg(0), OperandClass::Scalar);
    let b = Operand::Virtual(VReg(1), OperandClass::Scalar);
    let block = MachineBlock { id: BlockId(0), insts: vec![
      MachineInst::Label(BlockId(0)),
      MachineInst::MovRd { dst: a, src: Operand::Immediate(1) },
      MachineInst::MovRd { dst: b, src: a },
      MachineInst::MovRd { dst: Operand::Hardware(HardReg::Rax), src: b },
      MachineInst::Ret,
    ] };
    let mf = MachineFunction { name: crate::symbol::intern("f"), blocks: vec![block], entry: BlockId(0), vreg_count: 2 };
    let live = liveness::compute(&mf);
    let g = build(&mf, &live);
    assert!(!g.edges[&b].contains(&a));
  }
}
