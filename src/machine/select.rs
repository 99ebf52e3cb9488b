//! Instruction selection: TAC to machine IR (spec §4.7;
//! `original_source/h/build_vcode.hpp`/`src/build_vcode.cpp`, lowered
//! per-instruction the way a mid-IR-to-vcode selection pass typically is).
//!
//! Runs after `ssa::from_ssa`, so no `Inst::Phi` reaches here. TAC values
//! map 1:1 onto virtual registers; constants and globals lower to
//! `Operand::Immediate`/`Operand::Address` directly instead of occupying a
//! vreg.

use hashbrown::HashMap;
use crate::symbol;
use crate::tac::{BinOp, FunctionId, Inst, TACContext, ValueId, ValueKind};
use super::inst::{CallTarget, Mem, MachineBlock, MachineFunction, MachineInst};
use super::opcode::{jump_opcode, Opcode};
use super::operand::{Operand, OperandClass, VReg, ARG_REGS, HardReg};

pub fn run(ctx: &TACContext) -> Vec<MachineFunction> {
  (0..ctx.functions.len())
    .map(|i| FunctionId(i as u32))
    .filter(|f| !ctx.function(*f).is_external)
    .map(|f| select_function(ctx, f))
    .collect()
}

struct Selector<'a> {
  ctx: &'a TACContext,
  func: FunctionId,
  classes: HashMap<ValueId, OperandClass>,
  vregs: HashMap<ValueId, VReg>,
  next_vreg: u32,
  call_sites: u32,
}

pub fn select_function(ctx: &TACContext, func: FunctionId) -> MachineFunction {
  let f = ctx.function(func);
  log::debug!("select: {}", f.name.as_str());

  let mut sel = Selector { ctx, func, classes: classify(ctx, func), vregs: HashMap::new(), next_vreg: 0, call_sites: 0 };

  let mut blocks = Vec::with_capacity(f.blocks.len());
  for b in f.block_ids() {
    let mut insts = Vec::new();
    insts.push(MachineInst::Label(b));
    if b == f.entry {
      sel.prologue(&mut insts);
    }
    for inst in &f.block(b).insts {
      sel.select_inst(inst, &mut insts);
    }
    blocks.push(MachineBlock { id: b, insts });
  }

  log::trace!("select: {} lowered to {} vreg(s), {} call site(s)", f.name.as_str(), sel.next_vreg, sel.call_sites);
  MachineFunction { name: f.name, blocks, entry: f.entry, vreg_count: sel.next_vreg }
}

/// A value is `Reference`-classed if it's defined by a call (every heap
/// object is born from a `gcAllocate`-backed constructor or closure call)
/// or copied/loaded from one — propagated to a fixed point since `Assign`
/// chains can forward a reference through several locals (spec §4.9, the
/// reference-typed stack-slot set the stack map needs).
fn classify(ctx: &TACContext, func: FunctionId) -> HashMap<ValueId, OperandClass> {
  let mut classes: HashMap<ValueId, OperandClass> = HashMap::new();
  let f = ctx.function(func);
  if f.is_external { return classes }

  for b in f.block_ids() {
    for inst in &f.block(b).insts {
      if let Inst::Call { dest: Some(d), .. } | Inst::IndirectCall { dest: Some(d), .. } = inst {
        classes.insert(*d, OperandClass::Reference);
      }
    }
  }

  loop {
    let mut changed = false;
    for b in f.block_ids() {
      for inst in &f.block(b).insts {
        match inst {
          Inst::Assign { dest, value } if classes.get(value) == Some(&OperandClass::Reference) => {
            if classes.insert(*dest, OperandClass::Reference) != Some(OperandClass::Reference) { changed = true }
          }
          Inst::Load { dest, base, .. } if classes.get(base) == Some(&OperandClass::Reference) => {
            if classes.insert(*dest, OperandClass::Reference) != Some(OperandClass::Reference) { changed = true }
          }
          _ => {}
        }
      }
    }
    if !changed { break }
  }
  classes
}

impl<'a> Selector<'a> {
  fn class_of(&self, v: ValueId) -> OperandClass {
    self.classes.get(&v).copied().unwrap_or(OperandClass::Scalar)
  }

  fn fresh_vreg(&mut self) -> VReg {
    let id = VReg(self.next_vreg);
    self.next_vreg += 1;
    id
  }

  fn operand(&mut self, v: ValueId) -> Operand {
    match &self.ctx.value(v).kind {
      ValueKind::ConstantInt(n) => Operand::Immediate(*n),
      ValueKind::Global { name, .. } => Operand::Address(*name),
      ValueKind::Local { .. } | ValueKind::Argument { .. } | ValueKind::Temp => {
        let class = self.class_of(v);
        if let Some(vreg) = self.vregs.get(&v) {
          return Operand::Virtual(*vreg, class);
        }
        let vreg = self.fresh_vreg();
        self.vregs.insert(v, vreg);
        Operand::Virtual(vreg, class)
      }
    }
  }

  /// `push rbp; mov rbp,rsp`, then move each incoming argument out of its
  /// System V register (or, past the sixth, its caller-pushed stack slot
  /// at `[rbp+16+8k]`) into the vreg `select_inst` will reference for that
  /// parameter throughout the function body.
  fn prologue(&mut self, insts: &mut Vec<MachineInst>) {
    insts.push(MachineInst::Push(Operand::Hardware(HardReg::Rbp)));
    insts.push(MachineInst::MovRd { dst: Operand::Hardware(HardReg::Rbp), src: Operand::Hardware(HardReg::Rsp) });
    let params = self.ctx.function(self.func).params.clone();
    for (i, p) in params.into_iter().enumerate() {
      let dst = self.operand(p);
      let src = if i < ARG_REGS.len() {
        Operand::Hardware(ARG_REGS[i])
      } else {
        let offset = 16 + 8 * (i as i32 - ARG_REGS.len() as i32);
        insts.push(MachineInst::MovRm {
          dst,
          addr: Mem { base: Operand::Hardware(HardReg::Rbp), offset, index: None, scale: 1 },
        });
        continue;
      };
      insts.push(MachineInst::MovRd { dst, src });
    }
  }

  fn epilogue(&self, insts: &mut Vec<MachineInst>) {
    insts.push(MachineInst::MovRd { dst: Operand::Hardware(HardReg::Rsp), src: Operand::Hardware(HardReg::Rbp) });
    insts.push(MachineInst::Pop(Operand::Hardware(HardReg::Rbp)));
    insts.push(MachineInst::Ret);
  }

  fn select_inst(&mut self, inst: &Inst, out: &mut Vec<MachineInst>) {
    match inst {
      Inst::Comment(s) => out.push(MachineInst::Comment(s.clone())),

      Inst::ConditionalJump { lhs, op, rhs, if_true, if_false } => {
        let lhs = self.operand(*lhs);
        let rhs = self.operand(*rhs);
        out.push(MachineInst::Cmp { lhs, rhs });
        out.push(MachineInst::Jcc { op: jump_opcode(*op), target: *if_true });
        out.push(MachineInst::Jmp(*if_false));
      }

      Inst::JumpIf { cond, if_true, if_false } => {
        let cond = self.operand(*cond);
        out.push(MachineInst::Cmp { lhs: cond, rhs: Operand::Immediate(1) });
        out.push(MachineInst::Jcc { op: Opcode::Je, target: *if_false });
        out.push(MachineInst::Jmp(*if_true));
      }

      Inst::Assign { dest, value } => {
        let src = self.operand(*value);
        let dst = self.operand(*dest);
        out.push(MachineInst::MovRd { dst, src });
      }

      Inst::Return(value) => {
        if let Some(v) = value {
          let src = self.operand(*v);
          out.push(MachineInst::MovRd { dst: Operand::Hardware(HardReg::Rax), src });
        }
        self.epilogue(out);
      }

      Inst::Jump(target) => out.push(MachineInst::Jmp(*target)),

      Inst::Call { dest, foreign: _, func, args, ccall } => {
        let id = self.call_sites;
        self.call_sites += 1;
        if *ccall {
          // `ccall(target, args in rdi..r9)`: target goes in rdi, the
          // forwarded arguments shift down into the next five registers.
          out.push(MachineInst::Lea { dst: Operand::Hardware(HardReg::Rdi), addr: Mem { base: Operand::Address(*func), offset: 0, index: None, scale: 1 } });
          let shifted = [HardReg::Rsi, HardReg::Rdx, HardReg::Rcx, HardReg::R8, HardReg::R9];
          for (i, a) in args.iter().take(5).enumerate() {
            let src = self.operand(*a);
            out.push(MachineInst::MovRd { dst: Operand::Hardware(shifted[i]), src });
          }
          out.push(MachineInst::Call { target: CallTarget::Direct(symbol::intern("ccall")), id });
        } else {
          self.emit_call_args(args, out);
          out.push(MachineInst::Call { target: CallTarget::Direct(*func), id });
          if args.len() > 6 {
            let extra = (args.len() - 6) as i64;
            let padded = extra + (extra % 2);
            out.push(MachineInst::Binary { op: Opcode::Add, dst: Operand::Hardware(HardReg::Rsp), src: Operand::Immediate(padded * 8) });
          }
        }
        if let Some(d) = dest {
          let dst = self.operand(*d);
          out.push(MachineInst::MovRd { dst, src: Operand::Hardware(HardReg::Rax) });
        }
      }

      Inst::IndirectCall { dest, func, args } => {
        let id = self.call_sites;
        self.call_sites += 1;
        self.emit_call_args(args, out);
        let target = self.operand(*func);
        out.push(MachineInst::Call { target: CallTarget::Indirect(target), id });
        if args.len() > 6 {
          let extra = (args.len() - 6) as i64;
          let padded = extra + (extra % 2);
          out.push(MachineInst::Binary { op: Opcode::Add, dst: Operand::Hardware(HardReg::Rsp), src: Operand::Immediate(padded * 8) });
        }
        if let Some(d) = dest {
          let dst = self.operand(*d);
          out.push(MachineInst::MovRd { dst, src: Operand::Hardware(HardReg::Rax) });
        }
      }

      Inst::Load { dest, base, offset, index, scale } => {
        let base = self.operand(*base);
        let index = index.map(|i| self.operand(i));
        let dst = self.operand(*dest);
        out.push(MachineInst::MovRm { dst, addr: Mem { base, offset: *offset, index, scale: *scale } });
      }

      Inst::Store { base, offset, value } => {
        let base = self.operand(*base);
        let src = self.operand(*value);
        out.push(MachineInst::MovMd { addr: Mem { base, offset: *offset, index: None, scale: 1 }, src });
      }

      Inst::BinaryOp { dest, lhs, op, rhs } => self.select_binary(*dest, *lhs, *op, *rhs, out),

      Inst::Phi { .. } => unreachable!("ssa::from_ssa must run before instruction selection"),

      Inst::Unreachable => {}
    }
  }

  fn emit_call_args(&mut self, args: &[ValueId], out: &mut Vec<MachineInst>) {
    let (regpass, stacked) = if args.len() > 6 { args.split_at(6) } else { (args, &[][..]) };
    if !stacked.is_empty() {
      let extra = stacked.len();
      if extra % 2 == 1 {
        out.push(MachineInst::Push(Operand::Immediate(0)));
      }
      for a in stacked.iter().rev() {
        let src = self.operand(*a);
        out.push(MachineInst::Push(src));
      }
    }
    for (i, a) in regpass.iter().enumerate() {
      let src = self.operand(*a);
      out.push(MachineInst::MovRd { dst: Operand::Hardware(ARG_REGS[i]), src });
    }
  }

  fn select_binary(&mut self, dest: ValueId, lhs: ValueId, op: BinOp, rhs: ValueId, out: &mut Vec<MachineInst>) {
    match op {
      BinOp::Add | BinOp::Sub | BinOp::And | BinOp::Or => {
        let lhs_op = self.operand(lhs);
        let dst = self.operand(dest);
        out.push(MachineInst::MovRd { dst, src: lhs_op });
        let rhs_op = self.operand(rhs);
        let code = match op { BinOp::Add => Opcode::Add, BinOp::Sub => Opcode::Sub, BinOp::And => Opcode::And, BinOp::Or => Opcode::Or, _ => unreachable!() };
        out.push(MachineInst::Binary { op: code, dst, src: rhs_op });
      }
      BinOp::Mul => {
        let lhs_op = self.operand(lhs);
        let dst = self.operand(dest);
        out.push(MachineInst::MovRd { dst, src: lhs_op });
        let rhs_op = self.operand(rhs);
        out.push(MachineInst::Binary { op: Opcode::Imul, dst, src: rhs_op });
      }
      BinOp::Shl | BinOp::Shr => {
        let amount = match &self.ctx.value(rhs).kind {
          ValueKind::ConstantInt(n) => *n,
          _ => unreachable!("shift amounts are always constant in this language (spec \u{a7}4.7)"),
        };
        let lhs_op = self.operand(lhs);
        let dst = self.operand(dest);
        out.push(MachineInst::MovRd { dst, src: lhs_op });
        out.push(MachineInst::Shift { op: if op == BinOp::Shl { Opcode::Sal } else { Opcode::Sar }, dst, amount });
      }
      BinOp::Div | BinOp::Mod => {
        let lhs_op = self.operand(lhs);
        out.push(MachineInst::MovRd { dst: Operand::Hardware(HardReg::Rax), src: lhs_op });
        out.push(MachineInst::Cqo);
        let rhs_op = self.operand(rhs);
        let divisor = if matches!(rhs_op, Operand::Immediate(_)) {
          let scratch = self.fresh_vreg();
          let scratch_op = Operand::Virtual(scratch, OperandClass::Scalar);
          out.push(MachineInst::MovRd { dst: scratch_op, src: rhs_op });
          scratch_op
        } else {
          rhs_op
        };
        out.push(MachineInst::Idiv { src: divisor });
        let dst = self.operand(dest);
        let result_reg = if op == BinOp::Div { HardReg::Rax } else { HardReg::Rdx };
        out.push(MachineInst::MovRd { dst, src: Operand::Hardware(result_reg) });
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::front;
  use crate::sema;
  use crate::ssa;
  use crate::opt;
  use crate::tac::codegen;

  fn lower(src: &str) -> (TACContext, FunctionId) {
    let program = front::parse(src).unwrap();
    let (hir, types) = sema::analyze(&program).unwrap();
    let mut ctx = codegen::lower(&hir, &types);
    ssa::to_ssa::run(&mut ctx);
    opt::run(&mut ctx);
    ssa::from_ssa::run(&mut ctx);
    let fid = ctx.functions.iter().position(|f| f.name.as_str() == "main").unwrap();
    (ctx, FunctionId(fid as u32))
  }

  #[test]
  fn every_block_gets_a_label_and_ends_in_a_terminator_shaped_instruction() {
    let (ctx, fid) = lower("fn main(): Int { return 1 + 2; }");
    let mf = select_function(&ctx, fid);
    for b in &mf.blocks {
      assert!(matches!(b.insts.first(), Some(MachineInst::Label(_))));
      assert!(matches!(b.insts.last(), Some(MachineInst::Ret) | Some(MachineInst::Jmp(_)) | Some(MachineInst::Jcc { .. })));
    }
  }

  #[test]
  fn a_call_site_gets_a_distinct_id() {
    let (ctx, fid) = lower("fn id(x: Int): Int { return x; } fn main(): Int { return id(1) + id(2); }");
    let mf = select_function(&ctx, fid);
    let ids: Vec<u32> = mf.blocks.iter().flat_map(|b| &b.insts).filter_map(|i| match i {
      MachineInst::Call { id, .. } => Some(*id),
      _ => None,
    }).collect();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
  }
}
