//! SSA construction (spec §4.5; `original_source/h/to_ssa.hpp`'s `ToSSA`):
//! place φ nodes at the iterated dominance frontiers of every local
//! variable's definitions, then rename by a dominator-tree walk that
//! maintains a per-variable stack of the current SSA name.
//!
//! Only `Local`-kind values are SSA candidates here: a `let`/pattern/loop
//! binding gets exactly one stable slot from `tac::codegen` and every
//! reassignment re-emits `Assign` into that same slot (see DESIGN.md
//! "Non-SSA variable model in `tac::codegen`"). `Argument`s are defined
//! once at function entry and never reassigned, so they're already in SSA
//! form; `Temp`s are minted fresh by every instruction that produces one.

use bit_set::BitSet;
use hashbrown::HashMap;
use smallvec::SmallVec;
use crate::tac::{rewrite, BlockId, FunctionId, Inst, TACContext, ValueId, ValueKind};
use super::dominance::DominatorTree;

/// Run SSA construction over every non-external function.
pub fn run(ctx: &mut TACContext) {
  for i in 0..ctx.functions.len() {
    let fid = FunctionId(i as u32);
    if !ctx.function(fid).is_external { to_ssa(ctx, fid); }
  }
}

pub fn to_ssa(ctx: &mut TACContext, func: FunctionId) {
  log::debug!("to_ssa: {}", ctx.function(func).name);
  let dom = DominatorTree::compute(ctx.function(func));

  let mut defs: HashMap<ValueId, Vec<BlockId>> = HashMap::new();
  for b in ctx.function(func).block_ids() {
    if !dom.is_reachable(b) { continue }
    for inst in &ctx.function(func).block(b).insts {
      if let Some(d) = inst.dest() {
        if matches!(ctx.value(d).kind, ValueKind::Local { .. }) {
          defs.entry(d).or_default().push(b);
        }
      }
    }
  }

  let frontier = dom.dominance_frontier(ctx.function(func));
  // phi_vars[block][i] names the original variable the i-th Phi in that
  // block's instruction list stands for; kept in lockstep with `prepend`
  // always inserting at index 0.
  let mut phi_vars: HashMap<BlockId, Vec<ValueId>> = HashMap::new();
  let mut phi_count = 0usize;

  for (&var, def_blocks) in &defs {
    let mut has_phi = BitSet::with_capacity(ctx.function(func).blocks.len());
    let mut worklist: Vec<BlockId> = def_blocks.clone();
    while let Some(b) = worklist.pop() {
      let Some(targets) = frontier.get(&b) else { continue };
      for &f in targets {
        if has_phi.insert(f.0 as usize) {
          let preds = ctx.function(func).block(f).preds.clone();
          let incoming: SmallVec<[(BlockId, ValueId); 4]> = preds.iter().map(|&p| (p, var)).collect();
          ctx.function_mut(func).block_mut(f).prepend(Inst::Phi { dest: var, incoming });
          phi_vars.entry(f).or_default().insert(0, var);
          phi_count += 1;
          worklist.push(f);
        }
      }
    }
  }
  log::trace!("to_ssa: placed {} phi(s) in {}", phi_count, ctx.function(func).name);

  let children = dom.children();
  let mut stacks: HashMap<ValueId, Vec<ValueId>> = HashMap::new();
  rename(ctx, func, &children, &phi_vars, ctx.function(func).entry, &mut stacks);

  kill_dead_phis(ctx, func);
}

fn current(stacks: &HashMap<ValueId, Vec<ValueId>>, v: ValueId) -> ValueId {
  stacks.get(&v).and_then(|s| s.last()).copied().unwrap_or(v)
}

fn rename(
  ctx: &mut TACContext,
  func: FunctionId,
  children: &HashMap<BlockId, Vec<BlockId>>,
  phi_vars: &HashMap<BlockId, Vec<ValueId>>,
  block: BlockId,
  stacks: &mut HashMap<ValueId, Vec<ValueId>>,
) {
  let mut pushed: Vec<ValueId> = Vec::new();
  let n = ctx.function(func).block(block).insts.len();

  for i in 0..n {
    let is_phi = matches!(ctx.function(func).block(block).insts[i], Inst::Phi { .. });
    if is_phi {
      let orig = phi_vars[&block][i];
      let fresh = ctx.make_local(ctx.value(orig).name());
      stacks.entry(orig).or_default().push(fresh);
      pushed.push(orig);
      rewrite::set_dest(&mut ctx.function_mut(func).block_mut(block).insts[i], fresh);
      continue;
    }

    {
      let inst = &mut ctx.function_mut(func).block_mut(block).insts[i];
      rewrite::replace_uses(inst, |v| current(stacks, v));
    }
    if let Some(orig) = ctx.function(func).block(block).insts[i].dest() {
      if matches!(ctx.value(orig).kind, ValueKind::Local { .. }) {
        let fresh = ctx.make_local(ctx.value(orig).name());
        stacks.entry(orig).or_default().push(fresh);
        pushed.push(orig);
        rewrite::set_dest(&mut ctx.function_mut(func).block_mut(block).insts[i], fresh);
      }
    }
  }

  let succs = ctx.function(func).block(block).succs.clone();
  for s in succs {
    let Some(vars) = phi_vars.get(&s) else { continue };
    let vars = vars.clone();
    for (i, &var) in vars.iter().enumerate() {
      let val = current(stacks, var);
      if let Inst::Phi { incoming, .. } = &mut ctx.function_mut(func).block_mut(s).insts[i] {
        for (pred, v) in incoming.iter_mut() {
          if *pred == block { *v = val; }
        }
      }
    }
  }

  if let Some(kids) = children.get(&block) {
    for &k in kids { rename(ctx, func, children, phi_vars, k, stacks); }
  }

  for orig in pushed { stacks.get_mut(&orig).unwrap().pop(); }
}

/// Prune φs whose destination is never used, iterating to a fixed point
/// since removing one φ can make another dead (`h/to_ssa.hpp`'s
/// `killDeadPhis`).
fn kill_dead_phis(ctx: &mut TACContext, func: FunctionId) {
  loop {
    let mut used: hashbrown::HashSet<ValueId> = hashbrown::HashSet::new();
    for b in ctx.function(func).block_ids() {
      for inst in &ctx.function(func).block(b).insts {
        for u in inst.uses() { used.insert(u); }
        if let Inst::Phi { incoming, .. } = inst {
          for (_, v) in incoming { used.insert(*v); }
        }
      }
    }
    let mut changed = false;
    for b in ctx.function(func).block_ids() {
      ctx.function_mut(func).block_mut(b).insts.retain(|inst| {
        if let Inst::Phi { dest, .. } = inst {
          if !used.contains(dest) { changed = true; return false }
        }
        true
      });
    }
    if !changed { break }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::front;
  use crate::sema;
  use crate::tac::codegen;

  fn lower(src: &str) -> (TACContext, FunctionId) {
    let program = front::parse(src).unwrap();
    let (hir, types) = sema::analyze(&program).unwrap();
    let ctx = codegen::lower(&hir, &types);
    let fid = ctx.functions.iter().position(|f| f.name.as_str() == "main").unwrap();
    (ctx, FunctionId(fid as u32))
  }

  #[test]
  fn if_join_gets_a_phi_after_to_ssa() {
    let (mut ctx, fid) = lower("fn main(): Int { let x: Int = 0; if true { x = 1; } else { x = 2; } return x; }");
    to_ssa(&mut ctx, fid);
    let has_phi = ctx.function(fid).block_ids()
      .any(|b| ctx.function(fid).block(b).insts.iter().any(|i| matches!(i, Inst::Phi { .. })));
    assert!(has_phi);
  }

  #[test]
  fn straight_line_function_gets_no_phis() {
    let (mut ctx, fid) = lower("fn main(): Int { let x: Int = 1; let y: Int = 2; return x + y; }");
    to_ssa(&mut ctx, fid);
    let has_phi = ctx.function(fid).block_ids()
      .any(|b| ctx.function(fid).block(b).insts.iter().any(|i| matches!(i, Inst::Phi { .. })));
    assert!(!has_phi);
  }

  #[test]
  fn every_local_def_is_renamed_to_a_distinct_value() {
    let (mut ctx, fid) = lower("fn main(): Int { let x: Int = 0; x = x + 1; x = x + 1; return x; }");
    to_ssa(&mut ctx, fid);
    let mut dests = Vec::new();
    for b in ctx.function(fid).block_ids() {
      for inst in &ctx.function(fid).block(b).insts {
        if let Some(d) = inst.dest() {
          if matches!(ctx.value(d).kind, ValueKind::Local { .. }) { dests.push(d); }
        }
      }
    }
    let unique: std::collections::HashSet<_> = dests.iter().collect();
    assert_eq!(unique.len(), dests.len());
  }
}
