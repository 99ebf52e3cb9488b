//! Final register/stack rewrite and caller-save spilling (spec §4.8
//! "Stack allocation"/"Caller-save around calls", §4.9 stack map;
//! `original_source/h/reg_alloc.hpp`'s `assignStackLocations`/
//! `allocateStack`/`spillAroundCalls`).
//!
//! Two scratch hardware registers outside [`crate::machine::ALLOCATABLE`]
//! carry a colorer-spilled value across the one instruction that touches
//! it: `r15` for an instruction's ordinary operand, `rax`/`rdx` for a
//! memory operand's base/index (kept separate so an instruction with both
//! a spilled value and a spilled address doesn't need a third register).
//! This crate does a single allocation pass rather than the original's
//! spill-and-rerun loop; see DESIGN.md.
//!
//! Caller-save spilling is unified with stack-map construction: every
//! register live across a call gets a dedicated slot it's stored into
//! before the call and reloaded from after, and the subset of those
//! slots backing a `Reference`-classed value is, by construction, exactly
//! the GC root set invariant #7 asks the stack map to report for that
//! call site.

use hashbrown::HashMap;
use crate::machine::{CallTarget, HardReg, Mem, MachineFunction, MachineInst, Opcode, Operand, OperandClass, VReg};
use super::coalesce::Coalesced;
use super::color::Coloring;
use super::liveness::Liveness;

const WORD: i32 = 8;
const VALUE_SCRATCH: HardReg = HardReg::R15;
const ADDR_BASE_SCRATCH: HardReg = HardReg::Rax;
const ADDR_INDEX_SCRATCH: HardReg = HardReg::Rdx;

pub struct StackMapEntry {
  pub call_id: u32,
  /// `rbp`-relative offsets holding a reference live across this call.
  pub offsets: Vec<i32>,
}

pub struct FrameInfo {
  pub frame_size: i32,
  pub stack_map: Vec<StackMapEntry>,
}

struct Frame {
  offsets: HashMap<Operand, i32>,
  next: i32,
}

impl Frame {
  fn slot_for(&mut self, op: Operand) -> i32 {
    if let Some(&off) = self.offsets.get(&op) { return off }
    let off = self.next;
    self.next -= WORD;
    self.offsets.insert(op, off);
    off
  }
}

pub fn allocate(mf: &mut MachineFunction, coalesced: &Coalesced, coloring: &Coloring, live: &Liveness) -> FrameInfo {
  let mut spilled: Vec<Operand> = coloring.spilled.iter().copied().collect();
  spilled.sort_by_key(|o| match o { Operand::Virtual(VReg(n), _) => *n, _ => u32::MAX });

  let mut frame = Frame { offsets: HashMap::new(), next: -WORD };
  for v in spilled { frame.slot_for(v); }

  let call_saves = gather_call_saves(mf, coalesced, coloring, live);
  rewrite_registers(mf, coalesced, coloring, &mut frame);
  let stack_map = insert_call_saves(mf, &call_saves, &mut frame);

  let used = (-frame.next - WORD).max(0);
  let frame_size = (used + 15) / 16 * 16;
  if frame_size > 0 {
    insert_stack_alloc(mf, frame_size);
  }
  FrameInfo { frame_size, stack_map }
}

/// `sub rsp, frame_size` right after the prologue's `mov rbp,rsp` — the
/// epilogue's `mov rsp,rbp` tears it back down unconditionally, so no
/// matching `add` is needed there.
fn insert_stack_alloc(mf: &mut MachineFunction, frame_size: i32) {
  let entry = mf.entry;
  let Some(block) = mf.blocks.iter_mut().find(|b| b.id == entry) else { return };
  let pos = block.insts.iter()
    .position(|i| matches!(i, MachineInst::MovRd { dst: Operand::Hardware(HardReg::Rbp), src: Operand::Hardware(HardReg::Rsp) }))
    .map_or(0, |p| p + 1);
  block.insts.insert(pos, MachineInst::Binary {
    op: Opcode::Sub,
    dst: Operand::Hardware(HardReg::Rsp),
    src: Operand::Immediate(i64::from(frame_size)),
  });
}

/// For every call site, the set of `(hardware register, class)` pairs
/// that must survive it — every virtual register live immediately after
/// the call that the colorer gave a real register to (a colorer-spilled
/// one is already in memory and needs no protecting). Computed against
/// the original, pre-rewrite instruction stream, since that's what
/// `Liveness` was built from.
fn gather_call_saves(mf: &MachineFunction, coalesced: &Coalesced, coloring: &Coloring, live: &Liveness) -> HashMap<u32, Vec<(HardReg, OperandClass)>> {
  let mut saves: HashMap<u32, Vec<(HardReg, OperandClass)>> = HashMap::new();

  for block in &mf.blocks {
    for (i, inst) in block.insts.iter().enumerate() {
      let MachineInst::Call { id, .. } = inst else { continue };
      let live_after = live.live_across(block.id, i, &block.insts);

      let mut seen: Vec<HardReg> = Vec::new();
      let mut entries = Vec::new();
      for op in live_after {
        let (hw, class) = match op {
          Operand::Virtual(_, class) => {
            let rep = coalesced.resolve(op);
            if coloring.spilled.contains(&rep) { continue }
            let Some(&hw) = coloring.assignment.get(&rep) else { continue };
            (hw, class)
          }
          Operand::Hardware(hw) => (hw, OperandClass::Scalar),
          _ => continue,
        };
        if hw == HardReg::Rax || seen.contains(&hw) { continue }
        seen.push(hw);
        entries.push((hw, class));
      }
      saves.insert(*id, entries);
    }
  }
  saves
}

fn hardware_of(op: Operand, coalesced: &Coalesced, coloring: &Coloring) -> Option<HardReg> {
  match op {
    Operand::Hardware(h) => Some(h),
    Operand::Virtual(..) => coloring.assignment.get(&coalesced.resolve(op)).copied(),
    _ => None,
  }
}

fn use_operand(op: Operand, coalesced: &Coalesced, coloring: &Coloring, frame: &mut Frame, scratch: HardReg, out: &mut Vec<MachineInst>) -> Operand {
  let resolved = coalesced.resolve(op);
  match resolved {
    Operand::Virtual(..) if coloring.spilled.contains(&resolved) => {
      let off = frame.slot_for(resolved);
      out.push(MachineInst::MovRm { dst: Operand::Hardware(scratch), addr: mem_at(off) });
      Operand::Hardware(scratch)
    }
    Operand::Virtual(..) => Operand::Hardware(hardware_of(op, coalesced, coloring).expect("every non-spilled vreg must be colored")),
    other => other,
  }
}

fn def_operand(op: Operand, coalesced: &Coalesced, coloring: &Coloring, frame: &mut Frame, scratch: HardReg, out: &mut Vec<MachineInst>) -> Operand {
  let resolved = coalesced.resolve(op);
  match resolved {
    Operand::Virtual(..) if coloring.spilled.contains(&resolved) => {
      let off = frame.slot_for(resolved);
      out.push(MachineInst::MovMd { addr: mem_at(off), src: Operand::Hardware(scratch) });
      Operand::Hardware(scratch)
    }
    Operand::Virtual(..) => Operand::Hardware(hardware_of(op, coalesced, coloring).expect("every non-spilled vreg must be colored")),
    other => other,
  }
}

fn mem_at(off: i32) -> Mem {
  Mem { base: Operand::Hardware(HardReg::Rbp), offset: off, index: None, scale: 1 }
}

fn resolve_mem(addr: Mem, coalesced: &Coalesced, coloring: &Coloring, frame: &mut Frame, before: &mut Vec<MachineInst>) -> Mem {
  let base = use_operand(addr.base, coalesced, coloring, frame, ADDR_BASE_SCRATCH, before);
  let index = addr.index.map(|i| use_operand(i, coalesced, coloring, frame, ADDR_INDEX_SCRATCH, before));
  Mem { base, offset: addr.offset, index, scale: addr.scale }
}

fn resolve_inst(inst: MachineInst, coalesced: &Coalesced, coloring: &Coloring, frame: &mut Frame) -> Vec<MachineInst> {
  let mut before: Vec<MachineInst> = Vec::new();
  let mut after: Vec<MachineInst> = Vec::new();

  let resolved = match inst {
    MachineInst::Comment(_) | MachineInst::Label(_) | MachineInst::Cqo
    | MachineInst::Jmp(_) | MachineInst::Jcc { .. } | MachineInst::Ret => { before.push(inst); return before }

    MachineInst::MovRd { dst, src } => {
      let src = use_operand(src, coalesced, coloring, frame, VALUE_SCRATCH, &mut before);
      let dst = def_operand(dst, coalesced, coloring, frame, VALUE_SCRATCH, &mut after);
      MachineInst::MovRd { dst, src }
    }
    MachineInst::Lea { dst, addr } => {
      let addr = resolve_mem(addr, coalesced, coloring, frame, &mut before);
      let dst = def_operand(dst, coalesced, coloring, frame, VALUE_SCRATCH, &mut after);
      MachineInst::Lea { dst, addr }
    }
    MachineInst::MovRm { dst, addr } => {
      let addr = resolve_mem(addr, coalesced, coloring, frame, &mut before);
      let dst = def_operand(dst, coalesced, coloring, frame, VALUE_SCRATCH, &mut after);
      MachineInst::MovRm { dst, addr }
    }
    MachineInst::MovMd { addr, src } => {
      let addr = resolve_mem(addr, coalesced, coloring, frame, &mut before);
      let src = use_operand(src, coalesced, coloring, frame, VALUE_SCRATCH, &mut before);
      MachineInst::MovMd { addr, src }
    }
    MachineInst::Binary { op, dst, src } => {
      let src = use_operand(src, coalesced, coloring, frame, VALUE_SCRATCH, &mut before);
      let dst_use = use_operand(dst, coalesced, coloring, frame, VALUE_SCRATCH, &mut before);
      let dst = def_operand(dst, coalesced, coloring, frame, VALUE_SCRATCH, &mut after);
      debug_assert_eq!(dst_use, dst, "a Binary's dst is read-modify-write; its resolved location can't change mid-instruction");
      MachineInst::Binary { op, dst, src }
    }
    MachineInst::Shift { op, dst, amount } => {
      let dst_use = use_operand(dst, coalesced, coloring, frame, VALUE_SCRATCH, &mut before);
      let dst = def_operand(dst, coalesced, coloring, frame, VALUE_SCRATCH, &mut after);
      debug_assert_eq!(dst_use, dst);
      MachineInst::Shift { op, dst, amount }
    }
    MachineInst::Idiv { src } => {
      let src = use_operand(src, coalesced, coloring, frame, VALUE_SCRATCH, &mut before);
      MachineInst::Idiv { src }
    }
    MachineInst::Cmp { lhs, rhs } => {
      let lhs = use_operand(lhs, coalesced, coloring, frame, VALUE_SCRATCH, &mut before);
      let rhs = use_operand(rhs, coalesced, coloring, frame, ADDR_BASE_SCRATCH, &mut before);
      MachineInst::Cmp { lhs, rhs }
    }
    MachineInst::Test { lhs, rhs } => {
      let lhs = use_operand(lhs, coalesced, coloring, frame, VALUE_SCRATCH, &mut before);
      let rhs = use_operand(rhs, coalesced, coloring, frame, ADDR_BASE_SCRATCH, &mut before);
      MachineInst::Test { lhs, rhs }
    }
    MachineInst::Call { target, id } => {
      let target = match target {
        CallTarget::Indirect(op) => CallTarget::Indirect(use_operand(op, coalesced, coloring, frame, VALUE_SCRATCH, &mut before)),
        direct => direct,
      };
      MachineInst::Call { target, id }
    }
    MachineInst::Push(op) => MachineInst::Push(use_operand(op, coalesced, coloring, frame, VALUE_SCRATCH, &mut before)),
    MachineInst::Pop(op) => MachineInst::Pop(def_operand(op, coalesced, coloring, frame, VALUE_SCRATCH, &mut after)),
  };

  before.push(resolved);
  before.extend(after);
  before
}

fn rewrite_registers(mf: &mut MachineFunction, coalesced: &Coalesced, coloring: &Coloring, frame: &mut Frame) {
  for block in &mut mf.blocks {
    let mut rewritten = Vec::with_capacity(block.insts.len());
    for inst in block.insts.drain(..) {
      rewritten.extend(resolve_inst(inst, coalesced, coloring, frame));
    }
    block.insts = rewritten;
  }
}

/// Thread the saves computed by [`gather_call_saves`] around each
/// (already hardware-register-rewritten) `Call`, using one dedicated slot
/// per hardware register rather than per original virtual register — the
/// same register may shelter different values at different call sites.
fn insert_call_saves(mf: &mut MachineFunction, call_saves: &HashMap<u32, Vec<(HardReg, OperandClass)>>, frame: &mut Frame) -> Vec<StackMapEntry> {
  let mut stack_map = Vec::new();

  for block in &mut mf.blocks {
    let mut rewritten = Vec::with_capacity(block.insts.len());
    for inst in block.insts.drain(..) {
      let MachineInst::Call { id, .. } = &inst else {
        rewritten.push(inst);
        continue;
      };
      let saves = call_saves.get(id).cloned().unwrap_or_default();
      let mut reference_offsets = Vec::new();
      for &(hw, class) in &saves {
        let off = frame.slot_for(Operand::Hardware(hw));
        rewritten.push(MachineInst::MovMd { addr: mem_at(off), src: Operand::Hardware(hw) });
        if class == OperandClass::Reference { reference_offsets.push(off); }
      }
      let call_id = *id;
      rewritten.push(inst);
      for &(hw, _) in saves.iter().rev() {
        let off = frame.offsets[&Operand::Hardware(hw)];
        rewritten.push(MachineInst::MovRm { dst: Operand::Hardware(hw), addr: mem_at(off) });
      }
      stack_map.push(StackMapEntry { call_id, offsets: reference_offsets });
    }
    block.insts = rewritten;
  }

  stack_map
}
