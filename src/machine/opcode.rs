//! Abstract x86-64 opcodes (spec §4.7; `original_source/h/machine_instruction.hpp`'s
//! `Opcode` enum). Postfix codes on the move opcodes follow the original:
//! `r` register, `m` indirect memory, `d` either immediate or register
//! ("direct").

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Opcode {
  Add,
  And,
  Or,
  Call,
  Cmp,
  Cqo,
  Div,
  Idiv,
  Imul,
  Inc,
  Je,
  Jg,
  Jge,
  Jl,
  Jle,
  Jmp,
  Jne,
  Lea,
  MovRd,
  MovRm,
  MovMd,
  Pop,
  Push,
  Ret,
  Sal,
  Sar,
  Sub,
  Test,
}

impl Opcode {
  #[must_use] pub fn mnemonic(self) -> &'static str {
    use Opcode::*;
    match self {
      Add => "add", And => "and", Or => "or", Call => "call", Cmp => "cmp", Cqo => "cqo",
      Div => "div", Idiv => "idiv", Imul => "imul", Inc => "inc",
      Je => "je", Jg => "jg", Jge => "jge", Jl => "jl", Jle => "jle", Jmp => "jmp", Jne => "jne",
      Lea => "lea", MovRd | MovRm | MovMd => "mov",
      Pop => "pop", Push => "push", Ret => "ret", Sal => "sal", Sar => "sar", Sub => "sub", Test => "test",
    }
  }
}

/// `RelOp` from TAC's `ConditionalJump` (`tac::RelOp`) mapped onto the
/// conditional-jump opcode that tests it directly (spec §4.7 "JumpIf").
#[must_use] pub fn jump_opcode(op: crate::tac::RelOp) -> Opcode {
  use crate::tac::RelOp;
  match op {
    RelOp::Eq => Opcode::Je,
    RelOp::Ne => Opcode::Jne,
    RelOp::Lt => Opcode::Jl,
    RelOp::Le => Opcode::Jle,
    RelOp::Gt => Opcode::Jg,
    RelOp::Ge => Opcode::Jge,
  }
}
