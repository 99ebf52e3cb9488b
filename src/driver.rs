//! Stage orchestration: source text to NASM text, with a `log::debug!` per
//! pipeline stage (spec §4.11; `original_source/src/driver.cpp`'s top-level
//! `compile` function, which calls each pass in the same order).

use crate::codegen;
use crate::error::CompileError;
use crate::front;
use crate::machine;
use crate::opt;
use crate::prelude;
use crate::regalloc;
use crate::sema;
use crate::ssa;
use crate::tac::codegen as tac_codegen;

#[derive(Clone, Debug, Default)]
pub struct CompileOptions {
  pub no_prelude: bool,
}

/// Run the full pipeline over `source` in-process, with no file I/O (spec
/// §6 "Library API"). The CLI driver (`main.rs`) is the only caller that
/// touches the filesystem.
pub fn compile_to_asm(source: &str, options: &CompileOptions) -> Result<String, CompileError> {
  let full_source = prelude::prepend(source, !options.no_prelude);

  log::debug!("driver: parsing {} byte(s)", full_source.len());
  let program = front::parse(&full_source)?;
  log::trace!("driver: parsed {} top-level declaration(s)", program.decls.len());

  log::debug!("driver: running semantic analysis");
  let (hir, types) = sema::analyze(&program)?;
  log::trace!("driver: analyzed {} function(s)", hir.functions.len());

  log::debug!("driver: lowering to TAC");
  let mut ctx = tac_codegen::lower(&hir, &types);

  log::debug!("driver: to-SSA");
  ssa::to_ssa::run(&mut ctx);

  log::debug!("driver: running IR optimizers");
  opt::run(&mut ctx);

  log::debug!("driver: from-SSA");
  ssa::from_ssa::run(&mut ctx);

  log::debug!("driver: selecting machine instructions");
  let mut functions = machine::select::run(&ctx);
  log::trace!("driver: selected {} function(s)", functions.len());

  log::debug!("driver: running register allocation");
  let frames = regalloc::run(&mut functions);

  log::debug!("driver: printing NASM");
  let asm = codegen::print_program(&ctx, &functions, &frames);
  log::trace!("driver: emitted {} byte(s) of assembly", asm.len());

  Ok(asm)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn compiles_a_trivial_program_to_nasm_text() {
    let asm = compile_to_asm("fn main(): Int { return 1 + 2 * 3; }", &CompileOptions::default()).unwrap();
    assert!(asm.contains("global splmain"));
    assert!(asm.contains("section .data"));
  }

  #[test]
  fn surfaces_semantic_errors_instead_of_panicking() {
    let err = compile_to_asm("fn main(): Int { return y; }", &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::Semantic { .. }));
  }

  #[test]
  fn no_prelude_still_compiles_self_contained_programs() {
    let opts = CompileOptions { no_prelude: true };
    let asm = compile_to_asm("fn main(): Int { return 1; }", &opts).unwrap();
    assert!(asm.contains("splmain"));
  }
}
