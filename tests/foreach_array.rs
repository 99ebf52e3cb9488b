//! Scenario 3: `foreach` over an array literal lowers to an indexed loop
//! against the array's length header field (see `tac::codegen::lower_foreach`).

use splc::{compile_to_asm, CompileOptions};

#[test]
fn foreach_over_array_literal_compiles_to_a_loop() {
  let src = "\
fn main(): Unit {
  foreach x in [1, 2, 3] do { print(x); }
}
";
  let asm = compile_to_asm(src, &CompileOptions::default()).unwrap();
  assert!(asm.contains("global splmain"));
  // The loop header, body and exit blocks must each get their own label.
  assert!(asm.contains("main.B"));
}

#[test]
fn foreach_over_a_non_array_value_is_rejected() {
  let src = "\
fn main(): Unit {
  foreach x in 1 do { print(x); }
}
";
  let err = compile_to_asm(src, &CompileOptions::default()).unwrap_err();
  assert!(matches!(err, splc::CompileError::Semantic { .. }));
}
