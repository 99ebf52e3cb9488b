//! Out-of-SSA translation (spec §4.5 "Out of SSA"): for every
//! `d = φ(…,(pᵢ, vᵢ),…)`, allocate a fresh temp `t`, insert `t ← vᵢ` before
//! the terminator of each predecessor `pᵢ`, and replace the φ with
//! `d ← t`. The extra copy avoids the lost-copy and swap problems that
//! copying straight into `d` in each predecessor would create; redundant
//! copies are cleaned up by register-allocator move coalescing
//! (`regalloc::coalesce`), not here.

use crate::tac::{BlockId, FunctionId, Inst, TACContext};

pub fn run(ctx: &mut TACContext) {
  for i in 0..ctx.functions.len() {
    let fid = FunctionId(i as u32);
    if !ctx.function(fid).is_external { from_ssa(ctx, fid); }
  }
}

pub fn from_ssa(ctx: &mut TACContext, func: FunctionId) {
  log::debug!("from_ssa: {}", ctx.function(func).name);
  let mut eliminated = 0usize;

  for b in ctx.function(func).block_ids() {
    let phis: Vec<Inst> = {
      let insts = &mut ctx.function_mut(func).block_mut(b).insts;
      let mut phis = Vec::new();
      while matches!(insts.first(), Some(Inst::Phi { .. })) {
        phis.push(insts.remove(0));
      }
      phis
    };
    if phis.is_empty() { continue }

    for phi in phis {
      let Inst::Phi { dest, incoming } = phi else { unreachable!() };
      let t = ctx.make_temp();
      for (pred, v) in incoming {
        insert_copy_before_terminator(ctx, func, pred, t, v);
      }
      ctx.function_mut(func).block_mut(b).prepend(Inst::Assign { dest, value: t });
      eliminated += 1;
    }
  }
  log::trace!("from_ssa: eliminated {} phi(s) in {}", eliminated, ctx.function(func).name);
}

fn insert_copy_before_terminator(ctx: &mut TACContext, func: FunctionId, block: BlockId, dest: crate::tac::ValueId, value: crate::tac::ValueId) {
  let insts = &mut ctx.function_mut(func).block_mut(block).insts;
  let at = if insts.last().is_some_and(Inst::is_terminator) { insts.len() - 1 } else { insts.len() };
  insts.insert(at, Inst::Assign { dest, value });
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::front;
  use crate::sema;
  use crate::ssa::to_ssa;
  use crate::tac::codegen;

  fn lower(src: &str) -> (TACContext, FunctionId) {
    let program = front::parse(src).unwrap();
    let (hir, types) = sema::analyze(&program).unwrap();
    let ctx = codegen::lower(&hir, &types);
    let fid = ctx.functions.iter().position(|f| f.name.as_str() == "main").unwrap();
    (ctx, FunctionId(fid as u32))
  }

  #[test]
  fn no_phis_remain_after_from_ssa() {
    let (mut ctx, fid) = lower("fn main(): Int { let x: Int = 0; if true { x = 1; } else { x = 2; } return x; }");
    to_ssa::to_ssa(&mut ctx, fid);
    from_ssa(&mut ctx, fid);
    let has_phi = ctx.function(fid).block_ids()
      .any(|b| ctx.function(fid).block(b).insts.iter().any(|i| matches!(i, Inst::Phi { .. })));
    assert!(!has_phi);
  }

  #[test]
  fn every_block_still_ends_in_one_terminator() {
    let (mut ctx, fid) = lower("fn main(): Int { let x: Int = 0; if true { x = 1; } else { x = 2; } return x; }");
    to_ssa::to_ssa(&mut ctx, fid);
    from_ssa(&mut ctx, fid);
    for b in ctx.function(fid).block_ids() {
      assert!(ctx.function(fid).block(b).is_terminated(), "block {} has no terminator", b.0);
    }
  }
}
