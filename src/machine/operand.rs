//! Machine operands (spec §4.7, §4.8; `original_source/h/machine_instruction.hpp`'s
//! `MachineOperand` hierarchy). Where the original dispatches through a
//! `MachineOperand*` base class with `isVreg`/`isHreg`/`isAddress` virtual
//! predicates, here the same closed set of operand shapes is a plain enum.

use crate::symbol::Symbol;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct VReg(pub u32);

/// Hardware registers. `Rbp`/`Rsp` are never allocator targets — they're
/// only ever written directly by prologue/epilogue and stack-slot
/// addressing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub enum HardReg {
  Rax,
  Rbx,
  Rcx,
  Rdx,
  Rsi,
  Rdi,
  R8,
  R9,
  R10,
  R11,
  R12,
  R13,
  R14,
  R15,
  Rbp,
  Rsp,
}

impl HardReg {
  #[must_use] pub fn name(self) -> &'static str {
    use HardReg::*;
    match self {
      Rax => "rax", Rbx => "rbx", Rcx => "rcx", Rdx => "rdx", Rsi => "rsi", Rdi => "rdi",
      R8 => "r8", R9 => "r9", R10 => "r10", R11 => "r11", R12 => "r12", R13 => "r13",
      R14 => "r14", R15 => "r15", Rbp => "rbp", Rsp => "rsp",
    }
  }
}

/// The six general-purpose colours `regalloc` has to work with (spec
/// §4.8: "Uses six general-purpose colours"). Chosen to avoid the fixed
/// argument/return registers so instruction selection doesn't have to
/// fight the allocator over them.
pub const ALLOCATABLE: [HardReg; 6] = [HardReg::Rbx, HardReg::R10, HardReg::R11, HardReg::R12, HardReg::R13, HardReg::R14];

/// System V argument registers used for `regpass` calls (spec §4.4).
pub const ARG_REGS: [HardReg; 6] = [HardReg::Rdi, HardReg::Rsi, HardReg::Rdx, HardReg::Rcx, HardReg::R8, HardReg::R9];

/// Whether an operand holds a GC-visible heap pointer, needed by
/// `codegen::stack_map` to decide which live registers at a call site are
/// roots (spec §4.9). Tracked per vreg by `machine::select` from the TAC
/// value it was selected from: the result of a constructor/`gcAllocate`
/// call, or anything loaded through a reference-typed base, is a
/// `Reference`; everything else (tagged integers, booleans, raw untagged
/// words) is `Scalar`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum OperandClass {
  Scalar,
  Reference,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct StackSlot(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Operand {
  Virtual(VReg, OperandClass),
  Hardware(HardReg),
  Immediate(i64),
  /// Resolved to an explicit `rbp`-relative offset once `regalloc::stack`
  /// lays out the frame.
  Stack(StackSlot),
  /// A function or global symbol, printed as `@name` (spec §4.9).
  Address(Symbol),
}

impl Operand {
  #[must_use] pub fn is_register(&self) -> bool {
    matches!(self, Operand::Virtual(..) | Operand::Hardware(_))
  }

  #[must_use] pub fn class(&self) -> OperandClass {
    match self {
      Operand::Virtual(_, c) => *c,
      _ => OperandClass::Scalar,
    }
  }

  #[must_use] pub fn vreg(&self) -> Option<VReg> {
    match self { Operand::Virtual(v, _) => Some(*v), _ => None }
  }

  /// A 64-bit immediate that doesn't fit a sign-extended 32-bit field —
  /// most x86-64 arithmetic/compare opcodes can't take one directly and
  /// need it preloaded into a scratch register first (spec §4.7 "64-bit
  /// immediates that don't fit in 32 bits are widened through a vreg").
  #[must_use] pub fn needs_widening(&self) -> bool {
    matches!(self, Operand::Immediate(n) if *n < i64::from(i32::MIN) || *n > i64::from(i32::MAX))
  }
}
