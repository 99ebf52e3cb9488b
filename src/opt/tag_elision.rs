//! Tag elision (spec §4.6 "Tag elision"; `original_source/h/tag_elision.hpp`,
//! `src/ir/tag_elision.cpp`). The original hangs this pass off dedicated
//! `TagInst`/`UntagInst` nodes; `tac::codegen` instead inlines both as
//! `BinaryOp` sequences (`Shl`+`Add` to tag, `Shr` to untag — see
//! DESIGN.md), so here a "tagged" value is one consumed by an untag-shaped
//! `BinaryOp { op: Shr, rhs: 1 }`.
//!
//! Candidates are grouped into connected components by the relation "they
//! appear together as a φ's incoming values" (`original_source`'s
//! `GatherVariables`), then, for components under the 20-node cap, every
//! subset is costed by brute force and the cheapest is chosen (ties
//! broken toward the smaller set) — the same bounded power-set search
//! `src/ir/tag_elision.cpp`'s `getUntagCost` drives.

use hashbrown::HashMap;
use crate::tac::{BinOp, BlockId, FunctionId, Inst, TACContext, ValueId, ValueKind};

const MAX_COMPONENT: usize = 20;

struct UntagSite { block: BlockId, index: usize, dest: ValueId }

pub fn run(ctx: &mut TACContext) {
  for i in 0..ctx.functions.len() {
    let fid = FunctionId(i as u32);
    if !ctx.function(fid).is_external { tag_elision(ctx, fid); }
  }
}

pub fn tag_elision(ctx: &mut TACContext, func: FunctionId) -> bool {
  log::debug!("tag_elision: {}", ctx.function(func).name);

  let sites = find_untag_sites(ctx, func);
  if sites.is_empty() { return false }

  let (components, phi_pairs) = group_components(ctx, func, &sites);

  let mut chosen: Vec<ValueId> = Vec::new();
  for members in components.values() {
    if members.len() > MAX_COMPONENT {
      log::trace!("tag_elision: skipping a {}-value component in {} (over the {} cap)", members.len(), ctx.function(func).name, MAX_COMPONENT);
      continue;
    }
    chosen.extend(best_subset(members, &phi_pairs));
  }

  if chosen.is_empty() {
    log::trace!("tag_elision: nothing elided in {}", ctx.function(func).name);
    return false;
  }

  for v in &chosen {
    let site = &sites[v];
    ctx.function_mut(func).block_mut(site.block).insts[site.index] = Inst::Assign { dest: site.dest, value: *v };
  }
  log::trace!("tag_elision: elided {} untag site(s) in {}", chosen.len(), ctx.function(func).name);
  true
}

fn find_untag_sites(ctx: &TACContext, func: FunctionId) -> HashMap<ValueId, UntagSite> {
  let mut sites = HashMap::new();
  for b in ctx.function(func).block_ids() {
    for (i, inst) in ctx.function(func).block(b).insts.iter().enumerate() {
      if let Inst::BinaryOp { dest, lhs, op: BinOp::Shr, rhs } = inst {
        if matches!(ctx.value(*rhs).kind, ValueKind::ConstantInt(1)) {
          sites.insert(*lhs, UntagSite { block: b, index: i, dest: *dest });
        }
      }
    }
  }
  sites
}

/// Connected components over tagged candidates (union-find, merged along
/// φ edges) plus the full list of φ-adjacent value pairs, which
/// `best_subset` also needs to price cross-boundary edges against values
/// outside the component (e.g. a literal that stays tagged).
fn group_components(
  ctx: &TACContext,
  func: FunctionId,
  sites: &HashMap<ValueId, UntagSite>,
) -> (HashMap<ValueId, Vec<ValueId>>, Vec<(ValueId, ValueId)>) {
  let mut parent: HashMap<ValueId, ValueId> = sites.keys().map(|&v| (v, v)).collect();
  let mut phi_pairs: Vec<(ValueId, ValueId)> = Vec::new();

  for b in ctx.function(func).block_ids() {
    for inst in &ctx.function(func).block(b).insts {
      if let Inst::Phi { incoming, .. } = inst {
        let vals: Vec<ValueId> = incoming.iter().map(|(_, v)| *v).collect();
        for w in vals.windows(2) {
          phi_pairs.push((w[0], w[1]));
          if sites.contains_key(&w[0]) && sites.contains_key(&w[1]) {
            union(&mut parent, w[0], w[1]);
          }
        }
      }
    }
  }

  let mut components: HashMap<ValueId, Vec<ValueId>> = HashMap::new();
  let keys: Vec<ValueId> = sites.keys().copied().collect();
  for v in keys {
    let root = find(&mut parent, v);
    components.entry(root).or_default().push(v);
  }
  (components, phi_pairs)
}

fn find(parent: &mut HashMap<ValueId, ValueId>, v: ValueId) -> ValueId {
  let p = parent[&v];
  if p == v { return v }
  let root = find(parent, p);
  parent.insert(v, root);
  root
}

fn union(parent: &mut HashMap<ValueId, ValueId>, a: ValueId, b: ValueId) {
  let (ra, rb) = (find(parent, a), find(parent, b));
  if ra != rb { parent.insert(ra, rb); }
}

/// Brute-force power-set search over `members`: converting a value to a
/// native untagged representation saves one `Shr` instruction at its own
/// untag site (cost -1) but costs +1 for every φ edge that would then
/// cross a tagged/untagged boundary.
fn best_subset(members: &[ValueId], phi_pairs: &[(ValueId, ValueId)]) -> Vec<ValueId> {
  let n = members.len();
  if n == 0 { return Vec::new() }
  let index: HashMap<ValueId, usize> = members.iter().enumerate().map(|(i, &v)| (v, i)).collect();

  let mut best_cost = 0i64;
  let mut best: Vec<ValueId> = Vec::new();
  for mask in 0u32..(1u32 << n) {
    let mut cost: i64 = -(mask.count_ones() as i64);
    for &(a, b) in phi_pairs {
      let a_idx = index.get(&a).copied();
      let b_idx = index.get(&b).copied();
      if a_idx.is_none() && b_idx.is_none() { continue }
      let a_in = a_idx.is_some_and(|i| mask & (1 << i) != 0);
      let b_in = b_idx.is_some_and(|i| mask & (1 << i) != 0);
      match (a_idx, b_idx) {
        (Some(_), Some(_)) => if a_in != b_in { cost += 1 },
        (Some(_), None) => if a_in { cost += 1 },
        (None, Some(_)) => if b_in { cost += 1 },
        (None, None) => unreachable!(),
      }
    }
    let size = mask.count_ones() as usize;
    if cost < best_cost || (cost == best_cost && size < best.len()) {
      best_cost = cost;
      best = (0..n).filter(|&i| mask & (1 << i) != 0).map(|i| members[i]).collect();
    }
  }
  best
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn elides_a_standalone_untag_site() {
    let mut ctx = TACContext::new();
    let fid = ctx.make_function(crate::symbol::intern("f"), false);
    let arg = ctx.make_argument(crate::symbol::intern("x"), 0);
    let one = ctx.make_constant_int(1);
    let untagged = ctx.make_temp();
    ctx.function_mut(fid).block_mut(BlockId(0)).append(Inst::BinaryOp { dest: untagged, lhs: arg, op: BinOp::Shr, rhs: one });
    ctx.function_mut(fid).block_mut(BlockId(0)).append(Inst::Return(Some(untagged)));
    assert!(tag_elision(&mut ctx, fid));
    match &ctx.function(fid).block(BlockId(0)).insts[0] {
      Inst::Assign { value, .. } => assert_eq!(*value, arg),
      _ => panic!("untag site was not rewritten to a copy"),
    }
  }

  #[test]
  fn leaves_function_with_no_untags_alone() {
    let mut ctx = TACContext::new();
    let fid = ctx.make_function(crate::symbol::intern("f"), false);
    let a = ctx.make_constant_int(1);
    ctx.function_mut(fid).block_mut(BlockId(0)).append(Inst::Return(Some(a)));
    assert!(!tag_elision(&mut ctx, fid));
  }
}
