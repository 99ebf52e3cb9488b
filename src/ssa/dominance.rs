//! Dominators and dominance frontiers, computed the way
//! `original_source/src/ir/to_ssa.hpp` documents it (`findDominators`,
//! `getImmediateDominators`, `getDominanceFrontiers`): iterated forward
//! data-flow over a reverse-postorder block ordering, the algorithm UT
//! Austin's CS380C compiler materials (cited in the original's own
//! comments) attribute to Cooper, Harvey & Kennedy's "A Simple, Fast
//! Dominance Algorithm".

use bit_set::BitSet;
use hashbrown::HashMap;
use crate::tac::{BlockId, Function};

pub struct DominatorTree {
  entry: BlockId,
  rpo: Vec<BlockId>,
  rpo_index: HashMap<BlockId, usize>,
  idom: HashMap<BlockId, BlockId>,
}

impl DominatorTree {
  #[must_use] pub fn compute(func: &Function) -> Self {
    let entry = func.entry;
    let rpo = reverse_postorder(func, entry);
    let rpo_index: HashMap<BlockId, usize> = rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();

    let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
    idom.insert(entry, entry);
    let mut changed = true;
    while changed {
      changed = false;
      for &b in &rpo {
        if b == entry { continue }
        let mut new_idom: Option<BlockId> = None;
        for &p in &func.block(b).preds {
          if !idom.contains_key(&p) { continue }
          new_idom = Some(match new_idom {
            None => p,
            Some(cur) => intersect(cur, p, &idom, &rpo_index),
          });
        }
        if let Some(ni) = new_idom {
          if idom.get(&b) != Some(&ni) {
            idom.insert(b, ni);
            changed = true;
          }
        }
      }
    }

    Self { entry, rpo, rpo_index, idom }
  }

  /// `None` for the entry block (it has no strict dominator) or for a
  /// block unreachable from the entry.
  #[must_use] pub fn idom(&self, b: BlockId) -> Option<BlockId> {
    if b == self.entry { return None }
    self.idom.get(&b).copied()
  }

  #[must_use] pub fn is_reachable(&self, b: BlockId) -> bool {
    b == self.entry || self.idom.contains_key(&b)
  }

  /// Every block reachable from the entry, in reverse postorder.
  #[must_use] pub fn reachable_blocks(&self) -> &[BlockId] { &self.rpo }

  #[must_use] pub fn dominates(&self, a: BlockId, mut b: BlockId) -> bool {
    loop {
      if a == b { return true }
      if b == self.entry { return a == self.entry }
      match self.idom.get(&b) {
        Some(&p) => b = p,
        None => return false,
      }
    }
  }

  /// Children of each block in the dominator tree, used to drive the
  /// rename walk in `ssa::to_ssa`.
  #[must_use] pub fn children(&self) -> HashMap<BlockId, Vec<BlockId>> {
    let mut children: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
    for &b in &self.rpo {
      if b == self.entry { continue }
      if let Some(&p) = self.idom.get(&b) {
        children.entry(p).or_default().push(b);
      }
    }
    children
  }

  /// Dominance frontier of every reachable block (`h/to_ssa.hpp`'s
  /// `getDominanceFrontiers`): the classic "b dominates a predecessor of f
  /// but does not strictly dominate f" definition.
  #[must_use] pub fn dominance_frontier(&self, func: &Function) -> HashMap<BlockId, Vec<BlockId>> {
    let mut df: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
    for b in func.block_ids() { df.insert(b, Vec::new()); }
    for &b in &self.rpo {
      let preds = &func.block(b).preds;
      if preds.len() < 2 { continue }
      let Some(&idom_b) = self.idom.get(&b) else { continue };
      for &p in preds {
        if !self.is_reachable(p) { continue }
        let mut runner = p;
        while runner != idom_b {
          let set = df.entry(runner).or_default();
          if !set.contains(&b) { set.push(b); }
          match self.idom.get(&runner) {
            Some(&next) => runner = next,
            None => break,
          }
        }
      }
    }
    df
  }
}

fn intersect(mut a: BlockId, mut b: BlockId, idom: &HashMap<BlockId, BlockId>, rpo_index: &HashMap<BlockId, usize>) -> BlockId {
  while a != b {
    while rpo_index[&a] > rpo_index[&b] { a = idom[&a]; }
    while rpo_index[&b] > rpo_index[&a] { b = idom[&b]; }
  }
  a
}

/// Reverse postorder over the CFG reachable from `entry`. Unreachable
/// blocks (a match's dead fallthrough, say) are simply absent.
fn reverse_postorder(func: &Function, entry: BlockId) -> Vec<BlockId> {
  let mut visited = BitSet::with_capacity(func.blocks.len());
  let mut postorder = Vec::with_capacity(func.blocks.len());
  let mut stack: Vec<(BlockId, usize)> = vec![(entry, 0)];
  visited.insert(entry.0 as usize);
  while let Some(&mut (b, ref mut next)) = stack.last_mut() {
    let succs = &func.block(b).succs;
    if *next < succs.len() {
      let s = succs[*next];
      *next += 1;
      if visited.insert(s.0 as usize) { stack.push((s, 0)); }
    } else {
      postorder.push(b);
      stack.pop();
    }
  }
  postorder.reverse();
  postorder
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tac::BasicBlock;
  use crate::symbol::intern;

  /// entry -> (left, right) -> join
  fn diamond() -> Function {
    let entry = BlockId(0);
    let mut f = Function { name: intern("f"), is_external: false, params: Vec::new(), locals: Vec::new(), temps: Vec::new(), blocks: Vec::new(), entry };
    for i in 0..4 { f.blocks.push(BasicBlock::new(BlockId(i))); }
    f.block_mut(BlockId(0)).add_successor(BlockId(1));
    f.block_mut(BlockId(0)).add_successor(BlockId(2));
    f.block_mut(BlockId(1)).add_predecessor(BlockId(0));
    f.block_mut(BlockId(2)).add_predecessor(BlockId(0));
    f.block_mut(BlockId(1)).add_successor(BlockId(3));
    f.block_mut(BlockId(2)).add_successor(BlockId(3));
    f.block_mut(BlockId(3)).add_predecessor(BlockId(1));
    f.block_mut(BlockId(3)).add_predecessor(BlockId(2));
    f
  }

  #[test]
  fn entry_dominates_every_block() {
    let f = diamond();
    let dom = DominatorTree::compute(&f);
    for i in 0..4 { assert!(dom.dominates(BlockId(0), BlockId(i))); }
  }

  #[test]
  fn join_block_is_only_dominated_by_entry() {
    let f = diamond();
    let dom = DominatorTree::compute(&f);
    assert_eq!(dom.idom(BlockId(3)), Some(BlockId(0)));
  }

  #[test]
  fn branches_are_in_each_others_dominance_frontier() {
    let f = diamond();
    let dom = DominatorTree::compute(&f);
    let df = dom.dominance_frontier(&f);
    assert!(df[&BlockId(1)].contains(&BlockId(3)));
    assert!(df[&BlockId(2)].contains(&BlockId(3)));
  }
}
