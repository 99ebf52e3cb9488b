//! Scenario 2: a user-declared sum type compiles through constructor
//! tagging, pattern matching and unification.

use splc::{compile_to_asm, CompileOptions};

#[test]
fn maybe_match_resolves_to_a_single_compiled_program() {
  let src = "\
data Maybe a = Just(a) | None

fn double_or_zero(m: Maybe(Int)): Int {
  match m {
    Just(x) => x * 2,
    None => 0,
  }
}

fn main(): Unit {
  print(double_or_zero(Just(21)));
}
";
  let asm = compile_to_asm(src, &CompileOptions::default()).unwrap();
  assert!(asm.contains("global splmain"));
  assert!(asm.contains("double_or_zero"));
}

#[test]
fn non_exhaustive_match_is_a_semantic_error() {
  let src = "\
data Maybe a = Just(a) | None

fn unwrap_or(m: Maybe(Int), d: Int): Int {
  match m {
    Just(x) => x,
  }
}

fn main(): Unit {}
";
  let err = compile_to_asm(src, &CompileOptions::default()).unwrap_err();
  assert!(matches!(err, splc::CompileError::Semantic { .. }));
}
