//! Machine instructions and the per-function container `machine::select`
//! lowers TAC into (spec §4.7; `original_source/h/machine_instruction.hpp`'s
//! `MachineInstruction` subclasses, `h/basic_block.hpp`'s block shape reused
//! at this lower level too).

use crate::symbol::Symbol;
use crate::tac::BlockId;
use super::opcode::Opcode;
use super::operand::Operand;

/// `[base + offset (+ index * scale)]` addressing (spec §4.7/§4.9 operand
/// formatting). `index`/`scale` are only present for the indexed loads and
/// stores TAC's `Load`/`Store` produce.
#[derive(Clone, Debug)]
pub struct Mem {
  pub base: Operand,
  pub offset: i32,
  pub index: Option<Operand>,
  pub scale: i32,
}

#[derive(Clone, Debug)]
pub enum CallTarget {
  Direct(Symbol),
  Indirect(Operand),
}

#[derive(Clone, Debug)]
pub enum MachineInst {
  Comment(String),
  /// A block boundary marker; `codegen::asm_printer` turns this into a
  /// `function_block:` label.
  Label(BlockId),
  MovRd { dst: Operand, src: Operand },
  MovRm { dst: Operand, addr: Mem },
  MovMd { addr: Mem, src: Operand },
  Lea { dst: Operand, addr: Mem },
  /// Two-operand form (`dst op= src`): `Add`, `Sub`, `And`, `Or`, `Imul`.
  /// `dst` must already hold the left operand — instruction selection
  /// emits a `MovRd` first when it doesn't.
  Binary { op: Opcode, dst: Operand, src: Operand },
  /// `Sal`/`Sar` by a constant shift count (spec §4.7: shift amounts are
  /// always literal in this language, never a runtime value).
  Shift { op: Opcode, dst: Operand, amount: i64 },
  Cqo,
  Idiv { src: Operand },
  Cmp { lhs: Operand, rhs: Operand },
  Test { lhs: Operand, rhs: Operand },
  Jmp(BlockId),
  Jcc { op: Opcode, target: BlockId },
  /// `id` numbers call sites within a function for the `.CSn` labels
  /// `codegen::asm_printer` emits and `codegen::stack_map` indexes by
  /// (spec §4.9).
  Call { target: CallTarget, id: u32 },
  Push(Operand),
  Pop(Operand),
  Ret,
}

impl MachineInst {
  /// Operands read, including implicit hardware-register reads (e.g.
  /// `Idiv`'s `rax:rdx` dividend) — needed by `regalloc::liveness`.
  #[must_use] pub fn uses(&self) -> Vec<Operand> {
    match self {
      MachineInst::Comment(_) | MachineInst::Label(_) | MachineInst::Cqo
      | MachineInst::Jmp(_) | MachineInst::Jcc { .. } | MachineInst::Ret => Vec::new(),
      MachineInst::MovRd { src, .. } => vec![*src],
      MachineInst::Lea { addr, .. } | MachineInst::MovRm { addr, .. } => mem_operands(addr),
      MachineInst::MovMd { addr, src } => { let mut v = mem_operands(addr); v.push(*src); v }
      MachineInst::Binary { dst, src, .. } => vec![*dst, *src],
      MachineInst::Shift { dst, .. } => vec![*dst],
      MachineInst::Idiv { src } => vec![*src],
      MachineInst::Cmp { lhs, rhs } | MachineInst::Test { lhs, rhs } => vec![*lhs, *rhs],
      MachineInst::Call { target, .. } => match target {
        CallTarget::Direct(_) => Vec::new(),
        CallTarget::Indirect(op) => vec![*op],
      },
      MachineInst::Push(op) => vec![*op],
      MachineInst::Pop(_) => Vec::new(),
    }
  }

  /// The operand written, if any (`Idiv`/`Cqo` write fixed hardware
  /// registers directly and aren't reported here — `select` emits an
  /// explicit `MovRd` out of `rax`/`rdx` for the TAC destination).
  #[must_use] pub fn def(&self) -> Option<Operand> {
    match self {
      MachineInst::MovRd { dst, .. } | MachineInst::MovRm { dst, .. } | MachineInst::Lea { dst, .. }
      | MachineInst::Binary { dst, .. } | MachineInst::Shift { dst, .. } => Some(*dst),
      MachineInst::Pop(op) => Some(*op),
      _ => None,
    }
  }
}

fn mem_operands(addr: &Mem) -> Vec<Operand> {
  let mut v = vec![addr.base];
  if let Some(i) = addr.index { v.push(i) }
  v
}

pub struct MachineBlock {
  pub id: BlockId,
  pub insts: Vec<MachineInst>,
}

pub struct MachineFunction {
  pub name: Symbol,
  pub blocks: Vec<MachineBlock>,
  pub entry: BlockId,
  /// One past the highest vreg number `select` minted; `regalloc` sizes
  /// its per-vreg tables from this.
  pub vreg_count: u32,
}

impl MachineFunction {
  #[must_use] pub fn block(&self, id: BlockId) -> &MachineBlock {
    self.blocks.iter().find(|b| b.id == id).expect("machine block id out of range")
  }
}
