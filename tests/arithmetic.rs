//! Scenario 1: operator precedence survives the full pipeline down to NASM
//! text. `1 + 2*3` must fold (or at least lower) to the same value as
//! `7`, and the emitted program must expose the entry point and a call to
//! the runtime `print`.

use splc::{compile_to_asm, CompileOptions};

#[test]
fn arithmetic_precedence_compiles_to_nasm() {
  let src = "fn main(): Unit { print(1 + 2 * 3); }";
  let asm = compile_to_asm(src, &CompileOptions::default()).unwrap();

  assert!(asm.contains("global splmain"));
  assert!(asm.contains("splmain:"));
  assert!(asm.contains("extern print") || asm.contains("extern ccall"));
  assert!(asm.contains("section .text"));
  assert!(asm.contains("section .data"));
}

#[test]
fn constant_subexpression_is_folded_before_codegen() {
  // `2*3` has no side effects, so the optimizer should collapse it to a
  // single immediate rather than emitting a multiply.
  let src = "fn main(): Unit { print(1 + 2 * 3); }";
  let asm = compile_to_asm(src, &CompileOptions::default()).unwrap();
  assert!(!asm.to_lowercase().contains("imul"));
}
