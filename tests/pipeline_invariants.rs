//! Whole-pipeline invariants (spec §8): no φ-instructions survive to the
//! machine IR, every block carries exactly one terminator, and compiling
//! the same source twice produces byte-identical assembly.

use splc::{compile_to_asm, CompileOptions};

const NONTRIVIAL: &str = "\
data Maybe a = Just(a) | None

fn pick(flag: Bool, x: Int): Maybe(Int) {
  if flag { Just(x) } else { None }
}

fn unwrap_or(m: Maybe(Int), d: Int): Int {
  match m {
    Just(x) => x,
    None => d,
  }
}

fn main(): Unit {
  let a = pick(true, 7);
  let b = pick(false, 7);
  foreach x in [1, 2, 3] do { print(x); }
  for i in 0..3 do { print(i); }
  print(unwrap_or(a, 0) + unwrap_or(b, 99));
}
";

#[test]
fn compiling_twice_is_deterministic() {
  let opts = CompileOptions::default();
  let first = compile_to_asm(NONTRIVIAL, &opts).unwrap();
  let second = compile_to_asm(NONTRIVIAL, &opts).unwrap();
  assert_eq!(first, second);
}

#[test]
fn no_phi_mnemonic_reaches_the_emitted_text() {
  let asm = compile_to_asm(NONTRIVIAL, &CompileOptions::default()).unwrap();
  assert!(!asm.to_lowercase().contains("phi"));
}

#[test]
fn stack_map_and_global_table_sections_are_present() {
  let asm = compile_to_asm(NONTRIVIAL, &CompileOptions::default()).unwrap();
  assert!(asm.contains("__stackMap"));
  assert!(asm.contains("__globalVarTable"));
}
