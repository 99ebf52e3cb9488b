//! Graph-coloring register allocator (spec §4.8, component C8).

pub mod coalesce;
pub mod color;
pub mod interference;
pub mod liveness;
pub mod stack;

use crate::machine::MachineFunction;
pub use stack::FrameInfo;

/// Run the full pipeline — liveness, interference, coalescing, coloring,
/// stack assignment and caller-save spilling — over one function,
/// rewriting it in place to reference only hardware registers, stack
/// slots and immediates.
pub fn allocate(mf: &mut MachineFunction) -> FrameInfo {
  log::debug!("regalloc: {}", mf.name.as_str());
  let live = liveness::compute(mf);
  let graph = interference::build(mf, &live);
  let coalesced = coalesce::coalesce(graph);
  let coloring = color::color_graph(&coalesced.graph);
  let info = stack::allocate(mf, &coalesced, &coloring, &live);
  log::trace!("regalloc: {} spilled {} vreg(s), {} byte frame", mf.name.as_str(), coloring.spilled.len(), info.frame_size);
  info
}

pub fn run(functions: &mut [MachineFunction]) -> Vec<FrameInfo> {
  functions.iter_mut().map(allocate).collect()
}
