//! IR optimizers that run between SSA construction and SSA elimination
//! (spec §4.6): constant folding, dead value elimination, and tag elision.
//! `driver::compile` iterates constant folding and DCE to a fixed point
//! before running tag elision once, matching the original pass pipeline's
//! "fold, then sweep dead values, then shrink tag traffic" ordering.

pub mod constant_fold;
pub mod dce;
pub mod tag_elision;

use crate::tac::{FunctionId, TACContext};

/// Run the full optimizer pipeline over one function: fold and sweep to a
/// fixed point, then elide tags once (tag elision can itself expose more
/// dead values, so a final DCE sweep follows).
pub fn optimize(ctx: &mut TACContext, func: FunctionId) {
  if ctx.function(func).is_external { return }
  loop {
    let folded = constant_fold::constant_fold(ctx, func);
    let swept = dce::dead_value_elimination(ctx, func);
    if !folded && !swept { break }
  }
  if tag_elision::tag_elision(ctx, func) {
    dce::dead_value_elimination(ctx, func);
  }
}

pub fn run(ctx: &mut TACContext) {
  for i in 0..ctx.functions.len() {
    optimize(ctx, FunctionId(i as u32));
  }
}
