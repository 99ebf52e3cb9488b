//! Constant folding (spec §4.6; `original_source/src/constant_folding.cpp`).
//! Folds a `BinaryOp` of two `ConstantInt`s into a single constant and
//! rewires every use of the old destination to it. Division by zero is an
//! assertion, not a `CompileError` — by the time the optimizer runs the
//! program has already passed semantic analysis (spec §7).
//!
//! This IR has no dedicated `Tag`/`Untag` instructions (`tac::codegen`
//! inlines both as `BinaryOp` sequences), so folding those away falls out
//! of the same `BinaryOp` case instead of needing its own visit, per
//! DESIGN.md's "Boolean `not` via arithmetic" precedent.

use hashbrown::HashMap;
use crate::tac::{rewrite, BinOp, BlockId, FunctionId, Inst, TACContext, ValueId, ValueKind};

pub fn run(ctx: &mut TACContext) {
  for i in 0..ctx.functions.len() {
    let fid = FunctionId(i as u32);
    if !ctx.function(fid).is_external { constant_fold(ctx, fid); }
  }
}

/// Returns whether anything folded, so callers can iterate passes to a
/// fixed point alongside DCE.
pub fn constant_fold(ctx: &mut TACContext, func: FunctionId) -> bool {
  log::debug!("constant_fold: {}", ctx.function(func).name);

  let mut candidates: Vec<(BlockId, usize, ValueId, ValueId, BinOp, ValueId)> = Vec::new();
  for b in ctx.function(func).block_ids() {
    for (i, inst) in ctx.function(func).block(b).insts.iter().enumerate() {
      if let Inst::BinaryOp { dest, lhs, op, rhs } = inst {
        candidates.push((b, i, *dest, *lhs, *op, *rhs));
      }
    }
  }

  let mut folds: HashMap<ValueId, ValueId> = HashMap::new();
  for (b, i, dest, lhs, op, rhs) in candidates {
    let (Some(l), Some(r)) = (as_const(ctx, lhs), as_const(ctx, rhs)) else { continue };
    let folded = eval(op, l, r);
    let c = ctx.make_constant_int(folded);
    ctx.function_mut(func).block_mut(b).insts[i] = Inst::Assign { dest, value: c };
    folds.insert(dest, c);
  }

  if !folds.is_empty() {
    for b in ctx.function(func).block_ids() {
      let n = ctx.function(func).block(b).insts.len();
      for i in 0..n {
        let inst = &mut ctx.function_mut(func).block_mut(b).insts[i];
        rewrite::replace_uses(inst, |v| folds.get(&v).copied().unwrap_or(v));
      }
    }
  }

  log::trace!("constant_fold: folded {} instruction(s) in {}", folds.len(), ctx.function(func).name);
  !folds.is_empty()
}

fn as_const(ctx: &TACContext, v: ValueId) -> Option<i64> {
  match ctx.value(v).kind {
    ValueKind::ConstantInt(n) => Some(n),
    _ => None,
  }
}

/// Two's-complement 64-bit evaluation (spec §8 invariant #4).
fn eval(op: BinOp, l: i64, r: i64) -> i64 {
  match op {
    BinOp::Add => l.wrapping_add(r),
    BinOp::Sub => l.wrapping_sub(r),
    BinOp::Mul => l.wrapping_mul(r),
    BinOp::And => l & r,
    BinOp::Or => l | r,
    BinOp::Shl => {
      assert!((0..64).contains(&r), "shift amount out of range in constant folding");
      l.wrapping_shl(r as u32)
    }
    BinOp::Shr => {
      assert!((0..64).contains(&r), "shift amount out of range in constant folding");
      l.wrapping_shr(r as u32)
    }
    BinOp::Div => {
      assert!(r != 0, "division by zero in constant folding");
      l.wrapping_div(r)
    }
    BinOp::Mod => {
      assert!(r != 0, "modulo by zero in constant folding");
      l.wrapping_rem(r)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn folds_addition_of_two_constants() {
    let mut ctx = TACContext::new();
    let fid = ctx.make_function(crate::symbol::intern("f"), false);
    let a = ctx.make_constant_int(1);
    let b = ctx.make_constant_int(2);
    let dest = ctx.make_temp();
    ctx.function_mut(fid).block_mut(BlockId(0)).append(Inst::BinaryOp { dest, lhs: a, op: BinOp::Add, rhs: b });
    ctx.function_mut(fid).block_mut(BlockId(0)).append(Inst::Return(Some(dest)));
    assert!(constant_fold(&mut ctx, fid));
    match &ctx.function(fid).block(BlockId(0)).insts[1] {
      Inst::Return(Some(v)) => assert!(matches!(ctx.value(*v).kind, ValueKind::ConstantInt(3))),
      _ => unreachable!(),
    }
  }

  #[test]
  fn leaves_non_constant_operations_alone() {
    let mut ctx = TACContext::new();
    let fid = ctx.make_function(crate::symbol::intern("f"), false);
    let arg = ctx.make_argument(crate::symbol::intern("x"), 0);
    let one = ctx.make_constant_int(1);
    let dest = ctx.make_temp();
    ctx.function_mut(fid).block_mut(BlockId(0)).append(Inst::BinaryOp { dest, lhs: arg, op: BinOp::Add, rhs: one });
    ctx.function_mut(fid).block_mut(BlockId(0)).append(Inst::Return(Some(dest)));
    assert!(!constant_fold(&mut ctx, fid));
  }
}
