//! Scope stack, typed AST (HIR), and the HM-inference semantic analyzer
//! (spec §4.2).

pub mod analyzer;
pub mod hir;
pub mod scope;

use crate::error::CompileError;
use crate::front::ast;
use crate::types::TypeContext;

/// Run the semantic analyzer over a parsed program, producing the typed
/// HIR plus the [`TypeContext`] that owns every type and type variable it
/// minted. Used by the driver between parsing and TAC codegen.
pub fn analyze(program: &ast::Program) -> Result<(hir::Program, TypeContext), CompileError> {
  analyzer::analyze(program)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn analyzes_a_small_program() {
    let program = crate::front::parse("fn main(): Int { return 0; }").unwrap();
    let (hir, _ctx) = analyze(&program).unwrap();
    assert_eq!(hir.functions.len(), 1);
  }
}
