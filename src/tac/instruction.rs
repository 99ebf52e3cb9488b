//! TAC instruction set (spec §4.3, §4.4; `original_source/h/tac_instruction.hpp`).
//!
//! The original forms an intrusive doubly-linked list of `Instruction*` per
//! `BasicBlock`, dispatched through a visitor macro. Here each
//! [`super::block::BasicBlock`] just owns a `Vec<Inst>` in order, which gives
//! the same "walk a block's instructions in source order" access pattern
//! the optimizers need without raw `prev`/`next` pointers.

use smallvec::SmallVec;
use crate::symbol::Symbol;
use super::value::ValueId;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct BlockId(pub u32);

/// Relational operator tested by [`Inst::ConditionalJump`]. The original's
/// `TACConditionalJump` stores this as a generic `op` field alongside the
/// two compared values.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RelOp {
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
}

/// `original_source/h/tac_instruction.hpp`'s `BinaryOperation` enum,
/// renamed to drop the `T`/`U` prefixes that distinguished tagged-integer
/// from untagged-word ops in the original encoding; this crate always
/// operates on untagged words inside a `BinaryOp` (the code generator
/// untags operands before emitting one, per spec §4.4).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinOp {
  Add,
  Sub,
  Mul,
  Div,
  Mod,
  And,
  Or,
  Shr,
  Shl,
}

#[derive(Debug)]
pub enum Inst {
  Comment(String),
  /// Compare `lhs op rhs` and branch, without materializing a boolean
  /// value — used for `if`/`while` conditions and match tag dispatch.
  ConditionalJump { lhs: ValueId, op: RelOp, rhs: ValueId, if_true: BlockId, if_false: BlockId },
  /// Branch on a tagged boolean value's truthiness.
  JumpIf { cond: ValueId, if_true: BlockId, if_false: BlockId },
  Assign { dest: ValueId, value: ValueId },
  Return(Option<ValueId>),
  Jump(BlockId),
  Call { dest: Option<ValueId>, foreign: bool, func: Symbol, args: Vec<ValueId>, ccall: bool },
  IndirectCall { dest: Option<ValueId>, func: ValueId, args: Vec<ValueId> },
  /// `dest = [base + offset (+ index * scale)]` (`TACRightIndexedAssignment`).
  Load { dest: ValueId, base: ValueId, offset: i32, index: Option<ValueId>, scale: i32 },
  /// `[base + offset] = value` (`TACLeftIndexedAssignment`).
  Store { base: ValueId, offset: i32, value: ValueId },
  BinaryOp { dest: ValueId, lhs: ValueId, op: BinOp, rhs: ValueId },
  /// Not present in the original TAC set (it targets SSA machine IR
  /// instead); introduced here by `ssa::to_ssa` and eliminated by
  /// `ssa::from_ssa` (spec §4.5).
  Phi { dest: ValueId, incoming: SmallVec<[(BlockId, ValueId); 4]> },
  /// Terminates a statically-unreachable path — the fall-through of a
  /// match's last tag test (spec §4.4 "Match").
  Unreachable,
}

impl Inst {
  #[must_use] pub fn is_terminator(&self) -> bool {
    matches!(self, Inst::Jump(_) | Inst::ConditionalJump { .. } | Inst::JumpIf { .. } | Inst::Return(_) | Inst::Unreachable)
  }

  /// Every block this instruction can transfer control to, if it's a
  /// terminator (`h/basic_block.hpp`'s `getTargets`).
  #[must_use] pub fn targets(&self) -> SmallVec<[BlockId; 2]> {
    match self {
      Inst::Jump(target) => SmallVec::from_slice(&[*target]),
      Inst::ConditionalJump { if_true, if_false, .. } | Inst::JumpIf { if_true, if_false, .. } =>
        SmallVec::from_slice(&[*if_true, *if_false]),
      _ => SmallVec::new(),
    }
  }

  /// The destination value this instruction defines, if any — used by
  /// liveness/DCE to find a value's unique definition site.
  #[must_use] pub fn dest(&self) -> Option<ValueId> {
    match self {
      Inst::Assign { dest, .. }
      | Inst::Load { dest, .. }
      | Inst::BinaryOp { dest, .. }
      | Inst::Phi { dest, .. } => Some(*dest),
      Inst::Call { dest, .. } | Inst::IndirectCall { dest, .. } => *dest,
      _ => None,
    }
  }

  /// Every value this instruction reads, not counting a `Phi`'s incoming
  /// values (those are per-predecessor and handled specially by SSA
  /// elimination).
  #[must_use] pub fn uses(&self) -> SmallVec<[ValueId; 4]> {
    let mut v = SmallVec::new();
    match self {
      Inst::Comment(_) | Inst::Jump(_) | Inst::Unreachable | Inst::Phi { .. } => {}
      Inst::ConditionalJump { lhs, rhs, .. } => { v.push(*lhs); v.push(*rhs); }
      Inst::JumpIf { cond, .. } => v.push(*cond),
      Inst::Assign { value, .. } => v.push(*value),
      Inst::Return(value) => v.extend(*value),
      Inst::Call { args, .. } => v.extend(args.iter().copied()),
      Inst::IndirectCall { func, args, .. } => { v.push(*func); v.extend(args.iter().copied()); }
      Inst::Load { base, index, .. } => { v.push(*base); v.extend(*index); }
      Inst::Store { base, value, .. } => { v.push(*base); v.push(*value); }
      Inst::BinaryOp { lhs, rhs, .. } => { v.push(*lhs); v.push(*rhs); }
    }
    v
  }
}
