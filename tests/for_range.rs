//! Scenario 6: `for i in lo..hi do { ... }` lowers to a counted loop with
//! an inclusive-to-exclusive bound check (`ForRange` in `tac::codegen`).

use splc::{compile_to_asm, CompileOptions};

#[test]
fn for_range_loop_compiles_to_nasm() {
  let src = "\
fn main(): Unit {
  for i in 1..4 do { print(i); }
}
";
  let asm = compile_to_asm(src, &CompileOptions::default()).unwrap();
  assert!(asm.contains("global splmain"));
  assert!(asm.contains("main.B"));
}

#[test]
fn for_range_bounds_must_be_integers() {
  let src = "\
fn main(): Unit {
  for i in true..4 do { print(i); }
}
";
  let err = compile_to_asm(src, &CompileOptions::default()).unwrap_err();
  assert!(matches!(err, splc::CompileError::Semantic { .. }));
}
