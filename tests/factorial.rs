//! Scenario 4: a recursive function whose base/step cases are distinguished
//! by matching on a user-declared constructor rather than an `if`, so the
//! match-arm dispatch and recursive call both go through `check_bodies`'s
//! forward-declared signature table.

use splc::{compile_to_asm, CompileOptions};

#[test]
fn recursive_factorial_over_a_peano_style_constructor() {
  let src = "\
data Count = Zero | Succ(Count)

fn to_int(c: Count): Int {
  match c {
    Zero => 0,
    Succ(p) => 1 + to_int(p),
  }
}

fn factorial(n: Count): Int {
  match n {
    Zero => 1,
    Succ(p) => to_int(n) * factorial(p),
  }
}

fn main(): Unit {
  print(factorial(Succ(Succ(Succ(Succ(Succ(Zero)))))));
}
";
  let asm = compile_to_asm(src, &CompileOptions::default()).unwrap();
  assert!(asm.contains("global splmain"));
  assert!(asm.contains("factorial"));
  assert!(asm.contains("to_int"));
}
