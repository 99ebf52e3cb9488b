//! Conservative move coalescing (spec §4.8 "Move coalescing"): merge a
//! `MovRd`'s destination into its source whenever the two don't
//! interfere, so the copy can be dropped once both names agree on a
//! single color.

use hashbrown::HashMap;
use crate::machine::Operand;
use super::interference::InterferenceGraph;

pub struct Coalesced {
  /// Maps every coalesced-away operand to the representative it was
  /// merged into; representatives map to themselves implicitly (absent
  /// from this map).
  pub alias: HashMap<Operand, Operand>,
  pub graph: InterferenceGraph,
}

impl Coalesced {
  #[must_use] pub fn resolve(&self, op: Operand) -> Operand {
    self.alias.get(&op).copied().unwrap_or(op)
  }
}

fn find(alias: &HashMap<Operand, Operand>, mut x: Operand) -> Operand {
  while let Some(&p) = alias.get(&x) {
    if p == x { break }
    x = p;
  }
  x
}

#[must_use] pub fn coalesce(mut graph: InterferenceGraph) -> Coalesced {
  let mut alias: HashMap<Operand, Operand> = HashMap::new();
  let moves = graph.moves.clone();

  for (dst, src) in moves {
    let rd = find(&alias, dst);
    let rs = find(&alias, src);
    if rd == rs { continue }
    let interferes = graph.edges.get(&rd).is_some_and(|s| s.contains(&rs));
    if interferes { continue }

    // A hardware register's identity is fixed — always fold the virtual
    // name into it, never the other way round.
    let (keep, drop) = match (rd, rs) {
      (Operand::Hardware(_), _) => (rd, rs),
      (_, Operand::Hardware(_)) => (rs, rd),
      _ => (rd, rs),
    };
    alias.insert(drop, keep);

    if let Some(neighbors) = graph.edges.remove(&drop) {
      for n in neighbors {
        if n == keep { continue }
        if let Some(set) = graph.edges.get_mut(&n) {
          set.remove(&drop);
          set.insert(keep);
        }
        graph.edges.entry(keep).or_default().insert(n);
      }
    }
  }

  let keys: Vec<Operand> = alias.keys().copied().collect();
  for k in keys {
    let root = find(&alias, k);
    alias.insert(k, root);
  }

  Coalesced { alias, graph }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::machine::{MachineBlock, MachineFunction, MachineInst, OperandClass, VReg};
  use crate::tac::BlockId;
  use super::super::liveness;

  #[test]
  fn a_copy_between_non_interfering_values_is_coalesced() {
    let a = Operand::Virtual(VReg(0), OperandClass::Scalar);
    let b = Operand::Virtual(VReg(1), OperandClass::Scalar);
    let block = MachineBlock { id: BlockId(0), insts: vec![
      MachineInst::Label(BlockId(0)),
      MachineInst::MovRd { dst: a, src: Operand::Immediate(1) },
      MachineInst::MovRd { dst: b, src: a },
      MachineInst::MovRd { dst: Operand::Hardware(crate::machine::HardReg::Rax), src: b },
      MachineInst::Ret,
    ] };
    let mf = MachineFunction { name: crate::symbol::intern("f"), blocks: vec![block], entry: BlockId(0), vreg_count: 2 };
    let live = liveness::compute(&mf);
    let graph = super::super::interference::build(&mf, &live);
    let coalesced = coalesce(graph);
    assert_eq!(coalesced.resolve(b), coalesced.resolve(a));
  }
}
