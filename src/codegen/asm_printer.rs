//! NASM text emission (spec §4.9 "Asm printer"; `original_source/src/asm_printer.cpp`).
//!
//! Runs after `regalloc::run` has rewritten every function to reference
//! only hardware registers, stack slots and immediates — no `Operand::Virtual`
//! may reach here.

use std::collections::BTreeSet;
use crate::machine::{CallTarget, MachineFunction, MachineInst, Mem, Operand};
use crate::regalloc::FrameInfo;
use crate::tac::{BlockId, TACContext};
use super::stack_map::{self, call_site_label};

/// The per-block label `machine::select` leaves as each block's first
/// instruction (`MachineInst::Label`) and `Jmp`/`Jcc` target.
#[must_use] pub fn block_label(function_name: &str, id: BlockId) -> String {
  format!("{function_name}.B{}", id.0)
}

fn operand_text(op: &Operand) -> String {
  match op {
    Operand::Hardware(h) => h.name().to_owned(),
    Operand::Immediate(n) => n.to_string(),
    Operand::Address(sym) => sym.as_str(),
    Operand::Virtual(..) => unreachable!("asm_printer runs after regalloc; no virtual registers may remain"),
    Operand::Stack(_) => unreachable!("Operand::Stack is never constructed; regalloc addresses spills through Mem{{base:Rbp,..}} instead"),
  }
}

fn mem_text(m: &Mem) -> String {
  let mut s = format!("[{}", operand_text(&m.base));
  if let Some(idx) = &m.index {
    s.push('+');
    s.push_str(&operand_text(idx));
    s.push('*');
    s.push_str(&m.scale.to_string());
  }
  if m.offset > 0 {
    s.push('+');
    s.push_str(&m.offset.to_string());
  } else if m.offset < 0 {
    s.push_str(&m.offset.to_string());
  }
  s.push(']');
  s
}

fn nasm_string_literal(s: &str) -> String {
  format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn emit_inst(fname: &str, inst: &MachineInst, out: &mut String) {
  match inst {
    MachineInst::Comment(s) => out.push_str(&format!("  ; {s}\n")),
    MachineInst::Label(id) => out.push_str(&format!("{}:\n", block_label(fname, *id))),
    MachineInst::MovRd { dst, src } => out.push_str(&format!("  mov {}, {}\n", operand_text(dst), operand_text(src))),
    MachineInst::MovRm { dst, addr } => out.push_str(&format!("  mov {}, {}\n", operand_text(dst), mem_text(addr))),
    MachineInst::MovMd { addr, src } => out.push_str(&format!("  mov {}, {}\n", mem_text(addr), operand_text(src))),
    MachineInst::Lea { dst, addr } => out.push_str(&format!("  lea {}, {}\n", operand_text(dst), mem_text(addr))),
    MachineInst::Binary { op, dst, src } => out.push_str(&format!("  {} {}, {}\n", op.mnemonic(), operand_text(dst), operand_text(src))),
    MachineInst::Shift { op, dst, amount } => out.push_str(&format!("  {} {}, {}\n", op.mnemonic(), operand_text(dst), amount)),
    MachineInst::Cqo => out.push_str("  cqo\n"),
    MachineInst::Idiv { src } => out.push_str(&format!("  idiv {}\n", operand_text(src))),
    MachineInst::Cmp { lhs, rhs } => out.push_str(&format!("  cmp {}, {}\n", operand_text(lhs), operand_text(rhs))),
    MachineInst::Test { lhs, rhs } => out.push_str(&format!("  test {}, {}\n", operand_text(lhs), operand_text(rhs))),
    MachineInst::Jmp(id) => out.push_str(&format!("  jmp {}\n", block_label(fname, *id))),
    MachineInst::Jcc { op, target } => out.push_str(&format!("  {} {}\n", op.mnemonic(), block_label(fname, *target))),
    MachineInst::Call { target, id } => {
      match target {
        CallTarget::Direct(sym) => out.push_str(&format!("  call {}\n", sym.as_str())),
        CallTarget::Indirect(op) => out.push_str(&format!("  call {}\n", operand_text(op))),
      }
      out.push_str(&format!("{}:\n", call_site_label(fname, *id)));
    }
    MachineInst::Push(op) => out.push_str(&format!("  push {}\n", operand_text(op))),
    MachineInst::Pop(op) => out.push_str(&format!("  pop {}\n", operand_text(op))),
    MachineInst::Ret => out.push_str("  ret\n"),
  }
}

/// Emit a complete NASM translation unit: `.text` with one label per
/// function/block and per-call-site `.CSn` labels, and `.data` with global
/// storage cells, static strings, `__stackMap` and `__globalVarTable` (spec
/// §4.9, §6).
#[must_use] pub fn print_program(ctx: &TACContext, functions: &[MachineFunction], frames: &[FrameInfo]) -> String {
  log::debug!("codegen::asm_printer: printing {} function(s)", functions.len());
  let mut out = String::new();

  let mut externs: BTreeSet<String> = ctx.externs.iter()
    .filter_map(|id| ctx.value(*id).name())
    .map(|s| s.as_str())
    .collect();
  // Fixed runtime symbols referenced directly by instruction selection and
  // the static-string layout, not routed through `TACContext::make_extern`.
  externs.insert("ccall".to_owned());
  externs.insert("STRING_TAG".to_owned());
  for e in &externs { out.push_str(&format!("extern {e}\n")); }
  out.push('\n');

  for mf in functions {
    out.push_str(&format!("global {}\n", mf.name.as_str()));
  }
  let has_main = functions.iter().any(|mf| mf.name.as_str() == "main");
  if has_main { out.push_str("global splmain\n"); }
  out.push('\n');

  out.push_str("section .text\n");
  for mf in functions {
    let fname = mf.name.as_str();
    if fname == "main" { out.push_str("splmain:\n"); }
    out.push_str(&format!("{fname}:\n"));
    for block in &mf.blocks {
      for inst in &block.insts {
        emit_inst(&fname, inst, &mut out);
      }
    }
    out.push('\n');
  }

  out.push_str("section .data\n");
  for g in &ctx.globals {
    let name = ctx.value(*g).name().expect("global must be named").as_str();
    out.push_str(&format!("{name}: dq 0\n"));
  }
  for (id, contents) in &ctx.static_strings {
    let name = ctx.value(*id).name().expect("static string must be named").as_str();
    out.push_str(&format!("{name}:\n  dq STRING_TAG, 0\n  db {}, 0\n", nasm_string_literal(contents)));
  }

  let mut all_entries = Vec::new();
  for (mf, frame) in functions.iter().zip(frames) {
    all_entries.extend(stack_map::entries(&mf.name.as_str(), frame));
  }
  out.push_str("__stackMap:\n");
  out.push_str(&format!("  dq {}\n", all_entries.len()));
  for e in &all_entries {
    out.push_str(&format!("  dq {}\n", e.label));
    out.push_str(&format!("  dq {}\n", e.offsets.len()));
    for off in &e.offsets { out.push_str(&format!("  dq {off}\n")); }
  }

  // §4.9 "Globals of reference type are additionally emitted into
  // `__globalVarTable`". This crate has no per-global reference/scalar
  // classification (only machine vregs carry `OperandClass`), so every
  // user global variable is conservatively listed as a potential root; see
  // DESIGN.md.
  out.push_str("__globalVarTable:\n");
  out.push_str(&format!("  dq {}\n", ctx.globals.len()));
  for g in &ctx.globals {
    let name = ctx.value(*g).name().expect("global must be named").as_str();
    out.push_str(&format!("  dq {name}\n"));
  }
  out.push_str("  dq 0\n");

  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::front;
  use crate::machine;
  use crate::opt;
  use crate::regalloc;
  use crate::sema;
  use crate::ssa;
  use crate::tac::codegen;

  fn compile(src: &str) -> (TACContext, Vec<MachineFunction>, Vec<FrameInfo>) {
    let program = front::parse(src).unwrap();
    let (hir, types) = sema::analyze(&program).unwrap();
    let mut ctx = codegen::lower(&hir, &types);
    ssa::to_ssa::run(&mut ctx);
    opt::run(&mut ctx);
    ssa::from_ssa::run(&mut ctx);
    let mut functions = machine::select::run(&ctx);
    let frames = regalloc::run(&mut functions);
    (ctx, functions, frames)
  }

  #[test]
  fn entry_point_is_aliased_to_splmain() {
    let (ctx, functions, frames) = compile("fn main(): Int { return 1 + 2; }");
    let asm = print_program(&ctx, &functions, &frames);
    assert!(asm.contains("global splmain"));
    assert!(asm.contains("splmain:\nmain:\n"));
  }

  #[test]
  fn call_sites_get_labels_indexed_by_the_stack_map() {
    let (ctx, functions, frames) = compile("fn id(x: Int): Int { return x; } fn main(): Int { return id(1); }");
    let asm = print_program(&ctx, &functions, &frames);
    assert!(asm.contains("main.CS0:"));
    assert!(asm.contains("__stackMap:"));
  }
}
