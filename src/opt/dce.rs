//! Dead value elimination (spec §4.6): a pure instruction (`Assign`, `Load`,
//! `Phi`, `BinaryOp` — the original's Copy/IndexedLoad/Phi/BinaryOperation/
//! Tag/Untag list, minus the Tag/Untag nodes this IR doesn't have) whose
//! destination has no uses is removed. Iterates to a fixed point since
//! removing one dead value can make another one dead.

use hashbrown::HashSet;
use crate::tac::{FunctionId, Inst, TACContext, ValueId};

pub fn run(ctx: &mut TACContext) {
  for i in 0..ctx.functions.len() {
    let fid = FunctionId(i as u32);
    if !ctx.function(fid).is_external { dead_value_elimination(ctx, fid); }
  }
}

pub fn dead_value_elimination(ctx: &mut TACContext, func: FunctionId) -> bool {
  log::debug!("dce: {}", ctx.function(func).name);
  let mut changed_any = false;
  let mut removed_total = 0usize;

  loop {
    let mut used: HashSet<ValueId> = HashSet::new();
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
        if is_pure(inst) {
          if let Some(d) = inst.dest() {
            if !used.contains(&d) {
              changed = true;
              removed_total += 1;
              return false;
            }
          }
        }
        true
      });
    }

    if changed { changed_any = true } else { break }
  }

  log::trace!("dce: removed {} dead value(s) in {}", removed_total, ctx.function(func).name);
  changed_any
}

fn is_pure(inst: &Inst) -> bool {
  matches!(inst, Inst::Assign { .. } | Inst::Load { .. } | Inst::Phi { .. } | Inst::BinaryOp { .. })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tac::{BinOp, BlockId};

  #[test]
  fn removes_an_unused_binary_op() {
    let mut ctx = TACContext::new();
    let fid = ctx.make_function(crate::symbol::intern("f"), false);
    let a = ctx.make_constant_int(1);
    let b = ctx.make_constant_int(2);
    let dead = ctx.make_temp();
    ctx.function_mut(fid).block_mut(BlockId(0)).append(Inst::BinaryOp { dest: dead, lhs: a, op: BinOp::Add, rhs: b });
    ctx.function_mut(fid).block_mut(BlockId(0)).append(Inst::Return(Some(a)));
    assert!(dead_value_elimination(&mut ctx, fid));
    assert_eq!(ctx.function(fid).block(BlockId(0)).insts.len(), 1);
  }

  #[test]
  fn keeps_calls_even_when_unused() {
    let mut ctx = TACContext::new();
    let fid = ctx.make_function(crate::symbol::intern("f"), false);
    let print = crate::symbol::intern("print");
    let zero = ctx.make_constant_int(0);
    let dest = ctx.make_temp();
    ctx.function_mut(fid).block_mut(BlockId(0)).append(Inst::Call { dest: Some(dest), foreign: true, func: print, args: vec![zero], ccall: true });
    ctx.function_mut(fid).block_mut(BlockId(0)).append(Inst::Return(None));
    assert!(!dead_value_elimination(&mut ctx, fid));
    assert_eq!(ctx.function(fid).block(BlockId(0)).insts.len(), 2);
  }
}
