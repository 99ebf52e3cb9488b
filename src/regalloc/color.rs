//! Graph coloring (spec §4.8 "Coloring"; `original_source/h/reg_alloc.hpp`'s
//! `tryColorGraph`/`colorGraph`/`findColorFor`/`spillVariable`).
//!
//! A simplify/select worklist coloring: repeatedly remove a node with
//! fewer than [`crate::machine::ALLOCATABLE`]`.len()` colorable neighbors
//! (always safely colorable once its neighbors are), falling back to an
//! optimistic highest-degree pick when no such node remains. Popping the
//! stack assigns the lowest color not already taken by a colored
//! neighbor; a node with none free is spilled rather than retried — this
//! crate does one allocation pass instead of the original's
//! spill-and-rerun loop (see DESIGN.md).

use hashbrown::{HashMap, HashSet};
use crate::machine::{HardReg, Operand, ALLOCATABLE};
use super::interference::InterferenceGraph;

pub struct Coloring {
  pub assignment: HashMap<Operand, HardReg>,
  pub spilled: HashSet<Operand>,
}

fn colorable(op: &Operand) -> bool {
  matches!(op, Operand::Virtual(..)) || matches!(op, Operand::Hardware(h) if ALLOCATABLE.contains(h))
}

fn degree(graph: &InterferenceGraph, remaining: &HashSet<Operand>, n: Operand) -> usize {
  graph.edges.get(&n).map_or(0, |neighbors| {
    neighbors.iter()
      .filter(|x| colorable(x) && (matches!(x, Operand::Hardware(_)) || remaining.contains(x)))
      .count()
  })
}

#[must_use] pub fn color_graph(graph: &InterferenceGraph) -> Coloring {
  let colors = ALLOCATABLE.len();
  let mut remaining: HashSet<Operand> = graph.edges.keys().copied().filter(|o| matches!(o, Operand::Virtual(..))).collect();
  let mut stack: Vec<Operand> = Vec::new();

  while !remaining.is_empty() {
    if let Some(&low) = remaining.iter().find(|&&n| degree(graph, &remaining, n) < colors) {
      stack.push(low);
      remaining.remove(&low);
      continue;
    }
    let spill = *remaining.iter().max_by_key(|&&n| degree(graph, &remaining, n)).unwrap();
    stack.push(spill);
    remaining.remove(&spill);
  }

  let mut assignment: HashMap<Operand, HardReg> = ALLOCATABLE.iter().map(|&hw| (Operand::Hardware(hw), hw)).collect();
  let mut spilled: HashSet<Operand> = HashSet::new();

  while let Some(n) = stack.pop() {
    let used: HashSet<HardReg> = graph.edges.get(&n).into_iter().flatten()
      .filter_map(|nb| assignment.get(nb).copied())
      .collect();
    match ALLOCATABLE.iter().find(|hw| !used.contains(hw)) {
      Some(&hw) => { assignment.insert(n, hw); }
      None => { spilled.insert(n); }
    }
  }

  Coloring { assignment, spilled }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::machine::{MachineBlock, MachineFunction, MachineInst, OperandClass, VReg};
  use crate::tac::BlockId;
  use super::super::{interference, liveness};

  #[test]
  fn two_simultaneously_live_values_get_different_colors() {
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
    let graph = interference::build(&mf, &live);
    let coloring = color_graph(&graph);
    assert!(coloring.spilled.is_empty());
    assert_ne!(coloring.assignment[&a], coloring.assignment[&b]);
  }
}
